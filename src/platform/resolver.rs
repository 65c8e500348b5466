//! Reverse DNS off the tick path.
//!
//! `lookup` only ever reads the cache. Misses are queued to a background
//! thread and show up on a later tick.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::monitor::aggregator::HostnameLookup;

const DEFAULT_CACHE_SIZE: usize = 4096;

#[derive(Debug, Default)]
struct Cache {
    names: HashMap<IpAddr, Option<String>>,
    order: VecDeque<IpAddr>,
    in_flight: HashSet<IpAddr>,
    capacity: usize,
}

impl Cache {
    fn insert(&mut self, ip: IpAddr, name: Option<String>) {
        self.in_flight.remove(&ip);
        if self.names.insert(ip, name).is_none() {
            self.order.push_back(ip);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.names.remove(&oldest);
            }
        }
    }
}

/// Cached, non-blocking reverse DNS resolver
pub struct DnsResolver {
    cache: Arc<Mutex<Cache>>,
    requests: Mutex<Sender<IpAddr>>,
}

impl DnsResolver {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_lookup(capacity, reverse_lookup)
    }

    /// Resolver using `resolve` in place of the system resolver.
    pub fn with_lookup<F>(capacity: usize, resolve: F) -> Self
    where
        F: Fn(IpAddr) -> Option<String> + Send + 'static,
    {
        let cache = Arc::new(Mutex::new(Cache {
            capacity: capacity.max(1),
            ..Cache::default()
        }));
        let (tx, rx) = mpsc::channel();

        let worker_cache = Arc::clone(&cache);
        let spawned = std::thread::Builder::new()
            .name("dns-resolver".to_string())
            .spawn(move || resolve_loop(rx, worker_cache, resolve));
        if let Err(e) = spawned {
            log::warn!("Hostname resolution disabled: {}", e);
        }

        Self {
            cache,
            requests: Mutex::new(tx),
        }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HostnameLookup for DnsResolver {
    fn lookup(&self, ip: IpAddr) -> Option<String> {
        let mut cache = self.cache.lock();
        if let Some(name) = cache.names.get(&ip) {
            return name.clone();
        }

        if cache.in_flight.insert(ip) && self.requests.lock().send(ip).is_err() {
            cache.in_flight.remove(&ip);
        }
        None
    }
}

fn resolve_loop<F>(requests: Receiver<IpAddr>, cache: Arc<Mutex<Cache>>, resolve: F)
where
    F: Fn(IpAddr) -> Option<String>,
{
    // Ends once the resolver (the only sender) is dropped
    for ip in requests {
        let name = resolve(ip);
        log::trace!("Resolved {} -> {:?}", ip, name);
        cache.lock().insert(ip, name);
    }
}

/// System reverse lookup; a bare echo of the address counts as no name.
pub fn reverse_lookup(ip: IpAddr) -> Option<String> {
    match dns_lookup::lookup_addr(&ip) {
        Ok(name) if name != ip.to_string() => Some(name),
        _ => None,
    }
}
