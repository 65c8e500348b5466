//! Raw capture over `pnet::datalink`.
//!
//! pnet opens AF_PACKET sockets on Linux and goes through the Npcap driver
//! on Windows; both feed the same reader threads.

use std::collections::HashSet;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use pnet::datalink::{self, Channel::Ethernet, Config as PnetConfig, DataLinkReceiver, NetworkInterface};
use pnet::util::MacAddr;
use sysinfo::Networks;

use super::decode::decode_frame;
use crate::core::monitor::capture::{event_channel, CaptureBackend, Drained, EventReceiver, EventSender};
use crate::error::{NetwatchError, Result};

const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct DatalinkBackend {
    name: &'static str,
    sender: EventSender,
    receiver: EventReceiver,
    running: Arc<AtomicBool>,
    alive: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl DatalinkBackend {
    pub fn new(name: &'static str, queue_capacity: usize) -> Self {
        let (sender, receiver) = event_channel(queue_capacity);
        Self {
            name,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicUsize::new(0)),
            workers: Vec::new(),
        }
    }

    fn open(interface: &NetworkInterface) -> Result<Box<dyn DataLinkReceiver>> {
        let config = PnetConfig {
            read_timeout: Some(READ_TIMEOUT),
            ..PnetConfig::default()
        };

        match datalink::channel(interface, config) {
            Ok(Ethernet(_tx, rx)) => Ok(rx),
            Ok(_) => Err(NetwatchError::capture_unavailable(format!(
                "{}: unsupported channel type",
                interface.name
            ))),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(
                NetwatchError::permission_denied(format!("{}: {}", interface.name, e)),
            ),
            Err(e) => Err(NetwatchError::capture_unavailable(format!(
                "{}: {}",
                interface.name, e
            ))),
        }
    }
}

/// Hardware addresses of the selected interfaces, as named by sysinfo.
///
/// On Windows pnet names adapters `\Device\NPF_{GUID}` while the counter
/// sampler sees friendly aliases, so the MAC is what ties the two together.
fn selected_macs(filter: &[String]) -> HashSet<[u8; 6]> {
    if filter.is_empty() {
        return HashSet::new();
    }

    Networks::new_with_refreshed_list()
        .iter()
        .filter(|(name, _)| filter.iter().any(|selected| selected == *name))
        .map(|(_, data)| data.mac_address().0)
        .filter(|mac| *mac != [0; 6])
        .collect()
}

fn is_selected(iface: &NetworkInterface, filter: &[String], macs: &HashSet<[u8; 6]>) -> bool {
    filter.is_empty()
        || filter
            .iter()
            .any(|name| *name == iface.name || *name == iface.description)
        || iface
            .mac
            .is_some_and(|mac| mac != MacAddr::zero() && macs.contains(&mac.octets()))
}

/// Interfaces worth capturing on: up, not loopback, with an address.
fn capture_targets(
    interfaces: &[NetworkInterface],
    filter: &[String],
    macs: &HashSet<[u8; 6]>,
) -> Vec<NetworkInterface> {
    interfaces
        .iter()
        .filter(|iface| is_selected(iface, filter, macs))
        .filter(|iface| !iface.is_loopback() && !iface.ips.is_empty())
        .filter(|iface| iface.is_up() || cfg!(windows))
        .cloned()
        .collect()
}

impl CaptureBackend for DatalinkBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, interface_filter: &[String]) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let interfaces = datalink::interfaces();
        let local_addrs: Arc<HashSet<IpAddr>> = Arc::new(
            interfaces
                .iter()
                .flat_map(|iface| iface.ips.iter().map(|net| net.ip()))
                .collect(),
        );

        let targets = capture_targets(&interfaces, interface_filter, &selected_macs(interface_filter));
        if targets.is_empty() {
            if !interface_filter.is_empty() {
                return Err(NetwatchError::interface_vanished(format!(
                    "none of {} is available for capture",
                    interface_filter.join(", ")
                )));
            }
            return Err(NetwatchError::capture_unavailable("no capturable interface found"));
        }

        // Open every channel before spawning so a failure leaves nothing running
        let mut opened = Vec::new();
        let mut first_error = None;
        for iface in &targets {
            match Self::open(iface) {
                Ok(rx) => opened.push((iface.name.clone(), rx)),
                Err(e) => {
                    log::warn!("Skipping {} for capture: {}", iface.name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if opened.is_empty() {
            return Err(first_error
                .unwrap_or_else(|| NetwatchError::capture_unavailable("no channel could be opened")));
        }

        self.running.store(true, Ordering::SeqCst);

        for (name, rx) in opened {
            let running = Arc::clone(&self.running);
            let alive = Arc::clone(&self.alive);
            let sender = self.sender.clone();
            let local_addrs = Arc::clone(&local_addrs);

            alive.fetch_add(1, Ordering::SeqCst);
            let spawned = std::thread::Builder::new()
                .name(format!("capture-{}", name))
                .spawn({
                    let alive = Arc::clone(&alive);
                    move || {
                        read_loop(&name, rx, &running, &sender, &local_addrs);
                        alive.fetch_sub(1, Ordering::SeqCst);
                    }
                });

            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    alive.fetch_sub(1, Ordering::SeqCst);
                    log::warn!("Could not spawn capture thread: {}", e);
                }
            }
        }

        if self.workers.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            return Err(NetwatchError::capture_unavailable("no capture thread could be started"));
        }

        log::info!(
            "{} capture started on {} interface(s)",
            self.name,
            self.workers.len()
        );
        Ok(())
    }

    fn events(&mut self) -> Drained {
        self.receiver.drain()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("A capture thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.alive.load(Ordering::SeqCst) > 0
    }
}

impl Drop for DatalinkBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    interface: &str,
    mut rx: Box<dyn DataLinkReceiver>,
    running: &AtomicBool,
    sender: &EventSender,
    local_addrs: &HashSet<IpAddr>,
) {
    while running.load(Ordering::Relaxed) {
        match rx.next() {
            Ok(frame) => {
                if let Some(event) = decode_frame(frame, local_addrs, Utc::now()) {
                    sender.send(event);
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                log::warn!("Capture on {} stopped: {}", interface, e);
                break;
            }
        }
    }
    log::debug!("Capture thread for {} exited", interface);
}
