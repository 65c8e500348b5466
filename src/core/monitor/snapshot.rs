//! Per-tick output handed to the presentation layer.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::aggregator::top_hosts;
use super::alerts::AlertTrigger;
use super::history::HistoryPoint;
use super::model::{FlowSession, HostOrder, HostStat, InterfaceSample, MonitorMode};

/// Outcome of the tick's persistence step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PersistStatus {
    /// No repository attached
    Disabled,
    Committed,
    /// The write failed; the batch is carried into the next tick
    Deferred { pending_ticks: u32 },
}

/// Complete view of one tick
#[derive(Debug, Clone, Serialize)]
pub struct TickSnapshot {
    pub timestamp: DateTime<Utc>,
    pub tick: u64,
    pub mode: MonitorMode,
    /// Set while running in a weaker mode than requested
    pub downgrade_reason: Option<String>,
    /// Per-interface readings; rates here are the displayed (smoothed) ones
    pub interfaces: Vec<InterfaceSample>,
    pub flows: Vec<FlowSession>,
    pub hosts: Vec<HostStat>,
    pub triggers: Vec<AlertTrigger>,
    /// Capture events discarded since the current capture session started
    pub dropped_events: u64,
    pub history: Vec<HistoryPoint>,
    pub persistence: PersistStatus,
}

impl TickSnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            tick: 0,
            mode: MonitorMode::Basic,
            downgrade_reason: None,
            interfaces: Vec::new(),
            flows: Vec::new(),
            hosts: Vec::new(),
            triggers: Vec::new(),
            dropped_events: 0,
            history: Vec::new(),
            persistence: PersistStatus::Disabled,
        }
    }

    pub fn total_up_mbps(&self) -> f64 {
        self.interfaces.iter().map(|s| s.rate_up_mbps).sum()
    }

    pub fn total_down_mbps(&self) -> f64 {
        self.interfaces.iter().map(|s| s.rate_down_mbps).sum()
    }

    pub fn top_hosts(&self, count: usize, order: HostOrder) -> Vec<HostStat> {
        top_hosts(&self.hosts, count, order)
    }

    pub fn flows_for_remote(&self, remote_ip: IpAddr) -> Vec<&FlowSession> {
        self.flows
            .iter()
            .filter(|flow| flow.key.remote_ip == remote_ip)
            .collect()
    }
}

impl Default for TickSnapshot {
    fn default() -> Self {
        Self::empty(Utc::now())
    }
}
