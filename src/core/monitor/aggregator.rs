//! Live flow table and per-remote-host aggregates.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};

use super::model::{Direction, FlowKey, FlowSession, HostOrder, HostStat, PacketEvent};

/// Resolves remote addresses to hostnames without blocking the caller.
pub trait HostnameLookup {
    fn lookup(&self, ip: IpAddr) -> Option<String>;
}

/// Owner of the live flow table.
///
/// The table is authoritative until a flow has been flushed to storage;
/// host aggregates are always recomputed from it.
#[derive(Debug, Default)]
pub struct FlowAggregator {
    flows: HashMap<FlowKey, FlowSession>,
    dirty: HashSet<FlowKey>,
}

impl FlowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold packet events into the flow table.
    ///
    /// Events are already oriented local/remote, so a reply lands on the
    /// same row as the request and only moves its "down" counters.
    pub fn ingest<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a PacketEvent>,
    {
        for event in events {
            let key = event.key();
            let flow = self
                .flows
                .entry(key)
                .or_insert_with(|| FlowSession::new(key, event.timestamp));

            match event.direction {
                Direction::Outbound => {
                    flow.bytes_up += u64::from(event.size);
                    flow.packets_up += 1;
                }
                Direction::Inbound => {
                    flow.bytes_down += u64::from(event.size);
                    flow.packets_down += 1;
                }
            }

            // Capture threads may deliver slightly out of order
            if event.timestamp > flow.last_seen {
                flow.last_seen = event.timestamp;
            }
            if event.timestamp < flow.start_time {
                flow.start_time = event.timestamp;
            }

            self.dirty.insert(key);
        }
    }

    /// Flows whose last activity is older than `window` at `now`.
    ///
    /// They stay in the table until [`FlowAggregator::evict`] is called,
    /// which the caller does once their final state is persisted.
    pub fn stale_flows(&self, now: DateTime<Utc>, window: Duration) -> Vec<FlowSession> {
        let Some(cutoff) = now.checked_sub_signed(window) else {
            return Vec::new();
        };
        let mut stale: Vec<FlowSession> = self
            .flows
            .values()
            .filter(|flow| flow.last_seen < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|flow| flow.key);
        stale
    }

    /// Remove flushed flows from the live table.
    pub fn evict(&mut self, keys: &[FlowKey]) {
        for key in keys {
            self.flows.remove(key);
            self.dirty.remove(key);
        }
    }

    /// Live flows changed since the previous call.
    pub fn take_dirty(&mut self) -> Vec<FlowSession> {
        let mut changed: Vec<FlowSession> = self
            .dirty
            .drain()
            .filter_map(|key| self.flows.get(&key).cloned())
            .collect();
        changed.sort_by_key(|flow| flow.key);
        changed
    }

    /// Current flows and their host aggregates.
    ///
    /// Passing `None` for `hostnames` withholds hostnames entirely.
    pub fn snapshot(&self, hostnames: Option<&dyn HostnameLookup>) -> (Vec<FlowSession>, Vec<HostStat>) {
        let mut flows: Vec<FlowSession> = self.flows.values().cloned().collect();
        flows.sort_by(|a, b| b.total_bytes().cmp(&a.total_bytes()).then(a.key.cmp(&b.key)));

        let hosts = fold_hosts(&flows, hostnames);
        (flows, hosts)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Hand every live flow over for a final flush and empty the table.
    pub fn drain_all(&mut self) -> Vec<FlowSession> {
        self.dirty.clear();
        let mut flows: Vec<FlowSession> = self.flows.drain().map(|(_, flow)| flow).collect();
        flows.sort_by_key(|flow| flow.key);
        flows
    }

    pub fn clear(&mut self) {
        self.flows.clear();
        self.dirty.clear();
    }
}

/// Sum flows per remote ip.
pub fn fold_hosts(flows: &[FlowSession], hostnames: Option<&dyn HostnameLookup>) -> Vec<HostStat> {
    let mut hosts: BTreeMap<IpAddr, HostStat> = BTreeMap::new();

    for flow in flows {
        let host = hosts.entry(flow.key.remote_ip).or_insert_with(|| HostStat {
            ip: flow.key.remote_ip,
            hostname: None,
            total_bytes_up: 0,
            total_bytes_down: 0,
            packets_up: 0,
            packets_down: 0,
            flow_count: 0,
            last_seen: flow.last_seen,
        });

        host.total_bytes_up += flow.bytes_up;
        host.total_bytes_down += flow.bytes_down;
        host.packets_up += flow.packets_up;
        host.packets_down += flow.packets_down;
        host.flow_count += 1;
        if flow.last_seen > host.last_seen {
            host.last_seen = flow.last_seen;
        }
    }

    if let Some(resolver) = hostnames {
        for host in hosts.values_mut() {
            host.hostname = resolver.lookup(host.ip);
        }
    }

    hosts.into_values().collect()
}

/// The `count` busiest hosts under the given ordering.
pub fn top_hosts(hosts: &[HostStat], count: usize, order: HostOrder) -> Vec<HostStat> {
    let mut sorted = hosts.to_vec();
    match order {
        HostOrder::TotalBytes => sorted.sort_by(|a, b| b.total_bytes().cmp(&a.total_bytes())),
        HostOrder::Upload => sorted.sort_by(|a, b| b.total_bytes_up.cmp(&a.total_bytes_up)),
        HostOrder::Download => sorted.sort_by(|a, b| b.total_bytes_down.cmp(&a.total_bytes_down)),
    }
    sorted.truncate(count);
    sorted
}
