use std::collections::BTreeMap;

use sysinfo::Networks;

use crate::error::Result;

use super::model::InterfaceCounters;

/// Source of cumulative per-interface counters.
///
/// The OS-backed implementation is [`SysinfoCounterSource`]; tests supply
/// scripted sources.
pub trait CounterSource: Send {
    /// Read the current cumulative counters of every interface.
    fn read_counters(&mut self) -> Result<Vec<(String, InterfaceCounters)>>;
}

/// Counter source backed by `sysinfo::Networks`
pub struct SysinfoCounterSource {
    networks: Networks,
}

impl SysinfoCounterSource {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoCounterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SysinfoCounterSource {
    fn read_counters(&mut self) -> Result<Vec<(String, InterfaceCounters)>> {
        // Drop interfaces that disappeared since the last refresh
        self.networks.refresh(true);

        Ok(self
            .networks
            .iter()
            .map(|(name, data)| {
                (
                    name.to_string(),
                    InterfaceCounters {
                        bytes_sent: data.total_transmitted(),
                        bytes_recv: data.total_received(),
                        packets_sent: data.total_packets_transmitted(),
                        packets_recv: data.total_packets_received(),
                    },
                )
            })
            .collect())
    }
}

/// Reads interface counters once per tick, restricted to the selected set.
pub struct CounterSampler {
    source: Box<dyn CounterSource>,
}

impl CounterSampler {
    pub fn new(source: Box<dyn CounterSource>) -> Self {
        Self { source }
    }

    /// Sampler over the real OS counters.
    pub fn system() -> Self {
        Self::new(Box::new(SysinfoCounterSource::new()))
    }

    /// Cumulative counters keyed by interface name.
    ///
    /// An empty `selection` means every interface.
    pub fn sample(&mut self, selection: &[String]) -> Result<BTreeMap<String, InterfaceCounters>> {
        let readings = self.source.read_counters()?;

        Ok(readings
            .into_iter()
            .filter(|(name, _)| selection.is_empty() || selection.iter().any(|s| s == name))
            .collect())
    }

    /// Names of every interface the source currently reports.
    pub fn interface_names(&mut self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .source
            .read_counters()?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        Ok(names)
    }
}
