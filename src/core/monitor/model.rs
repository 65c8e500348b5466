use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NetwatchError;

/// Cumulative OS counters for one interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

impl InterfaceCounters {
    /// A counter lower than the prior read starts a new counting epoch.
    pub fn is_reset_from(&self, prev: &InterfaceCounters) -> bool {
        self.bytes_sent < prev.bytes_sent
            || self.bytes_recv < prev.bytes_recv
            || self.packets_sent < prev.packets_sent
            || self.packets_recv < prev.packets_recv
    }
}

/// One tick's reading for an interface, with derived rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSample {
    pub interface: String,
    pub timestamp: DateTime<Utc>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub rate_up_mbps: f64,
    pub rate_down_mbps: f64,
    /// Incremented every time the OS counters restart.
    #[serde(default)]
    pub epoch: u32,
}

impl InterfaceSample {
    pub fn counters(&self) -> InterfaceCounters {
        InterfaceCounters {
            bytes_sent: self.bytes_sent,
            bytes_recv: self.bytes_recv,
            packets_sent: self.packets_sent,
            packets_recv: self.packets_recv,
        }
    }

    pub fn total_rate_mbps(&self) -> f64 {
        self.rate_up_mbps + self.rate_down_mbps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other => "OTHER",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = NetwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            "ICMP" => Ok(Protocol::Icmp),
            "OTHER" => Ok(Protocol::Other),
            other => Err(NetwatchError::other(format!("unknown protocol: {}", other))),
        }
    }
}

/// Traffic direction relative to this host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Local to remote ("up")
    Outbound,
    /// Remote to local ("down")
    Inbound,
}

/// Flow identity: (protocol, local ip, local port, remote ip, remote port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub protocol: Protocol,
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{}",
            self.protocol, self.local_ip, self.local_port, self.remote_ip, self.remote_port
        )
    }
}

/// A packet observed by a capture backend, already oriented local/remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketEvent {
    pub timestamp: DateTime<Utc>,
    pub protocol: Protocol,
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub size: u32,
    pub direction: Direction,
}

impl PacketEvent {
    pub fn key(&self) -> FlowKey {
        FlowKey {
            protocol: self.protocol,
            local_ip: self.local_ip,
            local_port: self.local_port,
            remote_ip: self.remote_ip,
            remote_port: self.remote_port,
        }
    }
}

/// Live or persisted state of one 5-tuple flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSession {
    pub key: FlowKey,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub packets_up: u64,
    pub packets_down: u64,
    pub process_name: Option<String>,
    pub process_pid: Option<u32>,
    pub start_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl FlowSession {
    pub fn new(key: FlowKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            bytes_up: 0,
            bytes_down: 0,
            packets_up: 0,
            packets_down: 0,
            process_name: None,
            process_pid: None,
            start_time: at,
            last_seen: at,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_up + self.bytes_down
    }
}

/// Aggregate over all live flows to one remote ip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostStat {
    pub ip: IpAddr,
    pub hostname: Option<String>,
    pub total_bytes_up: u64,
    pub total_bytes_down: u64,
    pub packets_up: u64,
    pub packets_down: u64,
    pub flow_count: u32,
    pub last_seen: DateTime<Utc>,
}

impl HostStat {
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes_up + self.total_bytes_down
    }
}

/// Ordering used by top-host queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOrder {
    TotalBytes,
    Upload,
    Download,
}

/// Acquisition strategy currently feeding the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorMode {
    /// Interface counters only
    Basic,
    /// Interface counters plus raw packet capture
    Deep,
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorMode::Basic => f.write_str("basic"),
            MonitorMode::Deep => f.write_str("deep"),
        }
    }
}
