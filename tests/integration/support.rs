//! Scripted counter sources and capture backends for driving the controller
//! tick by tick.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use netwatch::core::config::{AppConfig, MonitorSettings};
use netwatch::core::monitor::{
    event_channel, CaptureBackend, CaptureCapability, CaptureProvider, CounterSampler,
    CounterSource, Direction, Drained, EventReceiver, EventSender, InterfaceCounters,
    MonitorController, PacketEvent, Protocol,
};
use netwatch::error::{NetwatchError, Result};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

/// Counter source whose readings the test sets between ticks
#[derive(Clone, Default)]
pub struct FakeCounters {
    readings: Arc<Mutex<BTreeMap<String, InterfaceCounters>>>,
    failing: Arc<AtomicBool>,
}

impl FakeCounters {
    pub fn set(&self, name: &str, bytes_sent: u64, bytes_recv: u64) {
        self.readings.lock().insert(
            name.to_string(),
            InterfaceCounters {
                bytes_sent,
                bytes_recv,
                packets_sent: bytes_sent / 100,
                packets_recv: bytes_recv / 100,
            },
        );
    }

    pub fn remove(&self, name: &str) {
        self.readings.lock().remove(name);
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sampler(&self) -> CounterSampler {
        CounterSampler::new(Box::new(self.clone()))
    }
}

impl CounterSource for FakeCounters {
    fn read_counters(&mut self) -> Result<Vec<(String, InterfaceCounters)>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NetwatchError::other("counters unreadable"));
        }
        Ok(self
            .readings
            .lock()
            .iter()
            .map(|(name, counters)| (name.clone(), *counters))
            .collect())
    }
}

/// Shared handle onto the backend a [`ScriptedProvider`] created
#[derive(Clone, Default)]
pub struct CaptureHandle {
    sender: Arc<Mutex<Option<EventSender>>>,
    running: Arc<AtomicBool>,
    starts: Arc<Mutex<u32>>,
}

impl CaptureHandle {
    /// Queue an event as the capture thread would.
    pub fn push(&self, event: PacketEvent) {
        if let Some(sender) = self.sender.lock().as_ref() {
            sender.send(event);
        }
    }

    /// Simulate the capture thread dying.
    pub fn kill(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> u32 {
        *self.starts.lock()
    }
}

pub struct ScriptedProvider {
    pub capability: CaptureCapability,
    pub fail_start: bool,
    pub handle: CaptureHandle,
}

impl ScriptedProvider {
    pub fn capable() -> Self {
        Self {
            capability: CaptureCapability {
                has_privilege: true,
                driver_available: true,
                driver_message: "scripted".to_string(),
            },
            fail_start: false,
            handle: CaptureHandle::default(),
        }
    }

    pub fn unprivileged() -> Self {
        let mut provider = Self::capable();
        provider.capability.has_privilege = false;
        provider
    }
}

impl CaptureProvider for ScriptedProvider {
    fn capability(&self) -> CaptureCapability {
        self.capability.clone()
    }

    fn create_backend(&self, queue_capacity: usize) -> Result<Box<dyn CaptureBackend>> {
        let (tx, rx) = event_channel(queue_capacity);
        *self.handle.sender.lock() = Some(tx);

        Ok(Box::new(ScriptedBackend {
            receiver: rx,
            fail_start: self.fail_start,
            handle: self.handle.clone(),
        }))
    }
}

struct ScriptedBackend {
    receiver: EventReceiver,
    fail_start: bool,
    handle: CaptureHandle,
}

impl CaptureBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn start(&mut self, _interface_filter: &[String]) -> Result<()> {
        if self.fail_start {
            return Err(NetwatchError::permission_denied("socket refused"));
        }
        *self.handle.starts.lock() += 1;
        self.handle.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn events(&mut self) -> Drained {
        self.receiver.drain()
    }

    fn stop(&mut self) {
        self.handle.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.handle.running.load(Ordering::SeqCst)
    }
}

pub fn remote(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(93, 184, 216, last))
}

pub fn packet(
    remote_ip: IpAddr,
    remote_port: u16,
    size: u32,
    direction: Direction,
    timestamp: DateTime<Utc>,
) -> PacketEvent {
    PacketEvent {
        timestamp,
        protocol: Protocol::Tcp,
        local_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
        local_port: 50000,
        remote_ip,
        remote_port,
        size,
        direction,
    }
}

pub fn deep_config() -> AppConfig {
    AppConfig {
        deep_capture_enabled: true,
        ..AppConfig::default()
    }
}

pub fn controller(
    config: AppConfig,
    settings: MonitorSettings,
    counters: &FakeCounters,
    provider: ScriptedProvider,
) -> MonitorController {
    MonitorController::new(config, settings, counters.sampler(), Box::new(provider)).unwrap()
}
