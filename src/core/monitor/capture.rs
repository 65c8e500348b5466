//! Capture backend abstraction and the bounded event channel between a
//! background producer and the tick loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::model::PacketEvent;
use crate::error::Result;

/// Trait for packet capture backends
///
/// Implementations live in the platform layer (Npcap on Windows, AF_PACKET
/// on Linux). A backend owns its producer threads; the tick loop only ever
/// drains the receiving half of the event channel.
pub trait CaptureBackend: Send {
    /// Short backend identifier for logs and status
    fn name(&self) -> &'static str;

    /// Start producing events for the given interfaces (empty = all).
    ///
    /// Missing drivers and insufficient privilege are reported as
    /// recoverable acquisition errors.
    fn start(&mut self, interface_filter: &[String]) -> Result<()>;

    /// Take every event queued since the previous call
    fn events(&mut self) -> Drained;

    /// Stop all producers and wait for them to exit
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// What the host offers for Deep mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureCapability {
    pub has_privilege: bool,
    pub driver_available: bool,
    /// Human readable driver status
    pub driver_message: String,
}

/// Factory for capture backends, chosen once at startup.
pub trait CaptureProvider: Send {
    fn capability(&self) -> CaptureCapability;

    /// Build a backend whose event queue holds `queue_capacity` events.
    fn create_backend(&self, queue_capacity: usize) -> Result<Box<dyn CaptureBackend>>;
}

/// Result of draining the event channel once
#[derive(Debug, Clone, Default)]
pub struct Drained {
    pub events: Vec<PacketEvent>,
    /// Total events discarded since the channel was created
    pub dropped_total: u64,
}

#[derive(Debug)]
struct EventQueue {
    events: Mutex<VecDeque<PacketEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

/// Producer half of the capture channel. Never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    queue: Arc<EventQueue>,
}

/// Consumer half of the capture channel
#[derive(Debug)]
pub struct EventReceiver {
    queue: Arc<EventQueue>,
}

/// Bounded channel that drops the oldest unread event on overflow.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let capacity = capacity.max(1);
    let queue = Arc::new(EventQueue {
        events: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
        capacity,
        dropped: AtomicU64::new(0),
    });

    (
        EventSender {
            queue: Arc::clone(&queue),
        },
        EventReceiver { queue },
    )
}

impl EventSender {
    pub fn send(&self, event: PacketEvent) {
        let mut events = self.queue.events.lock();
        if events.len() >= self.queue.capacity {
            events.pop_front();
            self.queue.dropped.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
    }
}

impl EventReceiver {
    pub fn drain(&self) -> Drained {
        let events: Vec<PacketEvent> = {
            let mut queue = self.queue.events.lock();
            queue.drain(..).collect()
        };

        Drained {
            events,
            dropped_total: self.queue.dropped.load(Ordering::Relaxed),
        }
    }
}
