//! Mode selection and the per-tick pipeline.
//!
//! The controller owns every piece of cross-tick state (previous counter
//! readings, the flow table, alert state, the pending write batch) so that a
//! mode switch can reset all of it in one place.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::aggregator::{FlowAggregator, HostnameLookup};
use super::alerts::{self, AlertRule, RuleState};
use super::capture::{CaptureBackend, CaptureProvider};
use super::history::RateHistory;
use super::model::{InterfaceCounters, InterfaceSample, MonitorMode};
use super::rate::{compute_rate, smooth_rate, Rate};
use super::sampler::CounterSampler;
use super::snapshot::{PersistStatus, TickSnapshot};
use crate::core::config::{AppConfig, MonitorSettings};
use crate::error::Result;
use crate::storage::{PruneReport, Repository, TickBatch};

/// Outcome of [`select_mode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDecision {
    pub mode: MonitorMode,
    /// Why Deep was requested but not granted
    pub downgrade_reason: Option<String>,
}

/// Deep mode needs the user's request, privilege and a working driver.
pub fn select_mode(has_privilege: bool, driver_available: bool, prefer_deep: bool) -> ModeDecision {
    let basic = |reason: Option<&str>| ModeDecision {
        mode: MonitorMode::Basic,
        downgrade_reason: reason.map(String::from),
    };

    if !prefer_deep {
        basic(None)
    } else if !has_privilege {
        basic(Some("deep capture requires elevated privileges"))
    } else if !driver_available {
        basic(Some("no packet capture driver available"))
    } else {
        ModeDecision {
            mode: MonitorMode::Deep,
            downgrade_reason: None,
        }
    }
}

/// The acquisition strategy currently feeding the pipeline
enum Acquisition {
    Basic,
    Deep(Box<dyn CaptureBackend>),
}

#[derive(Debug, Clone, Copy)]
struct PreviousReading {
    counters: InterfaceCounters,
    at: DateTime<Utc>,
    epoch: u32,
}

pub struct MonitorController {
    config: AppConfig,
    settings: MonitorSettings,
    sampler: CounterSampler,
    capture: Box<dyn CaptureProvider>,
    acquisition: Acquisition,
    downgrade_reason: Option<String>,
    aggregator: FlowAggregator,
    previous: HashMap<String, PreviousReading>,
    displayed: HashMap<String, Rate>,
    history: RateHistory,
    rules: Vec<AlertRule>,
    rule_states: HashMap<String, RuleState>,
    repository: Option<Repository>,
    pending: Option<TickBatch>,
    hostnames: Option<Arc<dyn HostnameLookup + Send + Sync>>,
    dropped_events: u64,
    sampler_failing: bool,
    ticks: u64,
}

impl MonitorController {
    pub fn new(
        config: AppConfig,
        settings: MonitorSettings,
        sampler: CounterSampler,
        capture: Box<dyn CaptureProvider>,
    ) -> Result<Self> {
        config.validate()?;
        settings.validate()?;

        Ok(Self {
            history: RateHistory::with_window(config.chart_history_seconds),
            config,
            settings,
            sampler,
            capture,
            acquisition: Acquisition::Basic,
            downgrade_reason: None,
            aggregator: FlowAggregator::new(),
            previous: HashMap::new(),
            displayed: HashMap::new(),
            rules: Vec::new(),
            rule_states: HashMap::new(),
            repository: None,
            pending: None,
            hostnames: None,
            dropped_events: 0,
            sampler_failing: false,
            ticks: 0,
        })
    }

    /// Persist every tick to `repository`.
    ///
    /// Flows left open by an earlier run are closed first; they cannot be
    /// live in this process.
    pub fn with_repository(mut self, repository: Repository) -> Result<Self> {
        repository.set_busy_timeout(self.settings.persist_budget())?;
        let orphaned = repository.close_open_flows()?;
        if orphaned > 0 {
            log::info!("Closed {} flows left open by a previous run", orphaned);
        }
        if self.config.privacy_no_hostname {
            repository.forget_hostnames()?;
        }
        self.repository = Some(repository);
        Ok(self)
    }

    pub fn with_hostnames(mut self, lookup: Arc<dyn HostnameLookup + Send + Sync>) -> Self {
        self.hostnames = Some(lookup);
        self
    }

    /// Replace the alert rule set. Invalid rules are rejected as a whole.
    pub fn set_rules(&mut self, rules: Vec<AlertRule>) -> Result<()> {
        for rule in &rules {
            rule.validate()?;
        }
        self.rules = rules;
        Ok(())
    }

    /// Reload rules from the attached repository.
    pub fn reload_rules(&mut self) -> Result<()> {
        if let Some(repository) = &self.repository {
            let rules = repository.list_rules()?;
            self.set_rules(rules)?;
        }
        Ok(())
    }

    /// Choose the acquisition mode and start capture if it applies.
    pub fn start(&mut self) -> ModeDecision {
        self.enter_mode()
    }

    pub fn mode(&self) -> MonitorMode {
        match self.acquisition {
            Acquisition::Basic => MonitorMode::Basic,
            Acquisition::Deep(_) => MonitorMode::Deep,
        }
    }

    pub fn downgrade_reason(&self) -> Option<&str> {
        self.downgrade_reason.as_deref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn repository(&self) -> Option<&Repository> {
        self.repository.as_ref()
    }

    /// Number of live flows in the table
    pub fn live_flow_count(&self) -> usize {
        self.aggregator.len()
    }

    pub fn pending_ticks(&self) -> usize {
        self.pending.as_ref().map_or(0, TickBatch::ticks)
    }

    fn enter_mode(&mut self) -> ModeDecision {
        let capability = self.capture.capability();
        let mut decision = select_mode(
            capability.has_privilege,
            capability.driver_available,
            self.config.deep_capture_enabled,
        );

        self.acquisition = Acquisition::Basic;

        if decision.mode == MonitorMode::Deep {
            let started = self
                .capture
                .create_backend(self.settings.capture_queue_capacity)
                .and_then(|mut backend| {
                    backend.start(&self.config.interface_selection)?;
                    Ok(backend)
                });

            match started {
                Ok(backend) => {
                    log::info!("Deep mode active ({} capture)", backend.name());
                    self.acquisition = Acquisition::Deep(backend);
                }
                Err(e) => {
                    if e.is_acquisition() {
                        log::warn!("Capture failed to start, running in basic mode: {}", e);
                    } else {
                        log::error!("Capture backend error, running in basic mode: {}", e);
                    }
                    decision = ModeDecision {
                        mode: MonitorMode::Basic,
                        downgrade_reason: Some(e.to_string()),
                    };
                }
            }
        } else if let Some(reason) = &decision.downgrade_reason {
            log::warn!("Deep capture unavailable, running in basic mode: {}", reason);
        } else {
            log::info!("Basic mode active");
        }

        self.downgrade_reason = decision.downgrade_reason.clone();
        decision
    }

    /// Run one tick at the current wall-clock time.
    pub fn tick(&mut self) -> Result<TickSnapshot> {
        self.tick_at(Utc::now())
    }

    /// Run one tick as if the clock read `now`.
    ///
    /// Only a corrupted store is returned as an error; everything else is
    /// logged and folded into the snapshot.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickSnapshot> {
        self.ticks += 1;
        let mut batch = TickBatch::new();

        let samples = self.sample_interfaces(now);
        self.drain_capture(&mut batch);

        let stale = self.aggregator.stale_flows(now, self.settings.flow_staleness());
        let changed = self.aggregator.take_dirty();

        let lookup: Option<&dyn HostnameLookup> = match &self.hostnames {
            Some(lookup) if !self.config.privacy_no_hostname => Some(lookup.as_ref()),
            _ => None,
        };
        let (flows, hosts) = self.aggregator.snapshot(lookup);

        let interfaces = self.displayed_samples(&samples);
        let total = interfaces.iter().fold(Rate::ZERO, |acc, s| Rate {
            up_mbps: acc.up_mbps + s.rate_up_mbps,
            down_mbps: acc.down_mbps + s.rate_down_mbps,
        });
        self.history.push(now, total);

        let mut snapshot = TickSnapshot {
            timestamp: now,
            tick: self.ticks,
            mode: self.mode(),
            downgrade_reason: self.downgrade_reason.clone(),
            interfaces,
            flows,
            hosts,
            triggers: Vec::new(),
            dropped_events: self.dropped_events,
            history: self.history.points(),
            persistence: PersistStatus::Disabled,
        };

        snapshot.triggers = alerts::evaluate(&self.rules, &snapshot, &mut self.rule_states);

        let touched: BTreeSet<IpAddr> = changed
            .iter()
            .chain(stale.iter())
            .map(|flow| flow.key.remote_ip)
            .collect();

        batch.push_samples(samples);
        for flow in changed {
            batch.upsert_flow(flow, false);
        }
        for flow in stale {
            batch.upsert_flow(flow, true);
        }
        for host in snapshot.hosts.iter().filter(|h| touched.contains(&h.ip)) {
            batch.upsert_host(host.clone());
        }
        for trigger in &snapshot.triggers {
            batch.push_trigger(trigger.clone());
        }

        snapshot.persistence = self.persist(batch)?;

        log::trace!(
            "Tick {}: {} interfaces, {} flows, {} hosts",
            snapshot.tick,
            snapshot.interfaces.len(),
            snapshot.flows.len(),
            snapshot.hosts.len()
        );

        Ok(snapshot)
    }

    /// Raw samples for this tick, rates computed from the measured gap.
    fn sample_interfaces(&mut self, now: DateTime<Utc>) -> Vec<InterfaceSample> {
        let readings = match self.sampler.sample(&self.config.interface_selection) {
            Ok(readings) => {
                if self.sampler_failing {
                    log::info!("Interface counters readable again");
                    self.sampler_failing = false;
                }
                readings
            }
            Err(e) => {
                if !self.sampler_failing {
                    log::warn!("Failed to read interface counters: {}", e);
                    self.sampler_failing = true;
                }
                return Vec::new();
            }
        };

        let vanished: Vec<String> = self
            .previous
            .keys()
            .filter(|name| !readings.contains_key(*name))
            .cloned()
            .collect();
        for name in vanished {
            log::warn!("Interface {} vanished, removing it from the sample set", name);
            self.previous.remove(&name);
            self.displayed.remove(&name);
        }

        let mut samples = Vec::with_capacity(readings.len());
        for (name, counters) in readings {
            let prev = self.previous.get(&name).copied();

            let mut epoch = prev.map_or(0, |p| p.epoch);
            if let Some(p) = &prev {
                if counters.is_reset_from(&p.counters) {
                    epoch += 1;
                    log::debug!("Counters of {} restarted (epoch {})", name, epoch);
                }
            }

            let elapsed = prev
                .and_then(|p| (now - p.at).num_microseconds())
                .map_or(0.0, |us| us as f64 / 1_000_000.0);
            let rate = compute_rate(prev.as_ref().map(|p| &p.counters), &counters, elapsed);

            self.previous.insert(
                name.clone(),
                PreviousReading {
                    counters,
                    at: now,
                    epoch,
                },
            );

            samples.push(InterfaceSample {
                interface: name,
                timestamp: now,
                bytes_sent: counters.bytes_sent,
                bytes_recv: counters.bytes_recv,
                packets_sent: counters.packets_sent,
                packets_recv: counters.packets_recv,
                rate_up_mbps: rate.up_mbps,
                rate_down_mbps: rate.down_mbps,
                epoch,
            });
        }

        samples
    }

    fn displayed_samples(&mut self, samples: &[InterfaceSample]) -> Vec<InterfaceSample> {
        let alpha = self.settings.rate_smoothing;

        samples
            .iter()
            .map(|sample| {
                let raw = Rate {
                    up_mbps: sample.rate_up_mbps,
                    down_mbps: sample.rate_down_mbps,
                };
                let shown = match self.displayed.get(&sample.interface) {
                    Some(prev) => smooth_rate(*prev, raw, alpha),
                    None => raw,
                };
                self.displayed.insert(sample.interface.clone(), shown);

                InterfaceSample {
                    rate_up_mbps: shown.up_mbps,
                    rate_down_mbps: shown.down_mbps,
                    ..sample.clone()
                }
            })
            .collect()
    }

    fn drain_capture(&mut self, batch: &mut TickBatch) {
        let Acquisition::Deep(backend) = &mut self.acquisition else {
            return;
        };

        let drained = backend.events();
        self.dropped_events = drained.dropped_total;
        self.aggregator.ingest(&drained.events);

        if !backend.is_running() {
            let reason = format!("{} capture stopped unexpectedly", backend.name());
            log::warn!("{}, switching to basic mode", reason);
            self.leave_deep(batch);
            self.reset_state();
            self.downgrade_reason = Some(reason);
        }
    }

    /// Stop capture, keep what it already queued and hand every live flow to
    /// `batch` as closed.
    fn leave_deep(&mut self, batch: &mut TickBatch) {
        if let Acquisition::Deep(mut backend) =
            std::mem::replace(&mut self.acquisition, Acquisition::Basic)
        {
            backend.stop();
            let rest = backend.events();
            self.aggregator.ingest(&rest.events);
        }

        for flow in self.aggregator.drain_all() {
            batch.upsert_flow(flow, true);
        }
    }

    fn reset_state(&mut self) {
        self.aggregator.clear();
        self.previous.clear();
        self.displayed.clear();
        self.history.clear();
        self.rule_states.clear();
        self.dropped_events = 0;
    }

    /// Write `batch`, merged behind anything still pending.
    fn persist(&mut self, batch: TickBatch) -> Result<PersistStatus> {
        let Some(repository) = self.repository.as_mut() else {
            self.aggregator.evict(&batch.closed_keys());
            return Ok(PersistStatus::Disabled);
        };

        let mut batch = match self.pending.take() {
            Some(mut pending) => {
                pending.merge(batch);
                pending
            }
            None => batch,
        };

        let started = Instant::now();
        match repository.write_tick(&batch) {
            Ok(()) => {
                let elapsed = started.elapsed();
                if elapsed > self.settings.persist_budget() {
                    log::warn!(
                        "Slow disk: tick commit took {} ms (budget {} ms)",
                        elapsed.as_millis(),
                        self.settings.persist_budget_ms
                    );
                }
                self.aggregator.evict(&batch.closed_keys());
                Ok(PersistStatus::Committed)
            }
            Err(e) if e.is_fatal() => {
                log::error!("Storage is corrupted: {}", e);
                Err(e)
            }
            Err(e) => {
                let dropped = batch.bound(self.settings.max_pending_ticks);
                if dropped > 0 {
                    log::warn!("Discarded {} unpersisted samples from the oldest ticks", dropped);
                }
                let pending_ticks = batch.ticks() as u32;
                log::warn!(
                    "Could not persist tick, retrying next tick ({} pending): {}",
                    pending_ticks,
                    e
                );
                self.pending = Some(batch);
                Ok(PersistStatus::Deferred { pending_ticks })
            }
        }
    }

    /// Apply a new configuration between ticks.
    ///
    /// An invalid configuration is rejected and the current one stays in
    /// effect. Changing the deep-capture flag or the interface selection
    /// flushes the flow table and restarts acquisition.
    pub fn apply_config(&mut self, config: AppConfig) -> Result<()> {
        config.validate()?;

        let restart = config.deep_capture_enabled != self.config.deep_capture_enabled
            || config.interface_selection != self.config.interface_selection;

        if config.privacy_no_hostname && !self.config.privacy_no_hostname {
            if let Some(repository) = &self.repository {
                match repository.forget_hostnames() {
                    Ok(erased) => log::info!("Erased {} stored hostnames", erased),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => log::warn!("Could not erase stored hostnames: {}", e),
                }
            }
        }

        self.history.set_window(config.chart_history_seconds);
        self.config = config;

        if restart {
            self.switch_mode()?;
        }
        Ok(())
    }

    /// Flush and reset all per-mode state, then re-select the mode.
    pub fn switch_mode(&mut self) -> Result<ModeDecision> {
        log::info!("Restarting acquisition");

        let mut batch = TickBatch::new();
        self.leave_deep(&mut batch);
        self.persist(batch)?;
        self.reset_state();

        Ok(self.enter_mode())
    }

    /// Apply retention. Returns `None` when the store is missing or busy.
    pub fn prune(&mut self, now: DateTime<Utc>) -> Result<Option<PruneReport>> {
        let days = self.config.effective_retention_days();
        let Some(repository) = self.repository.as_mut() else {
            return Ok(None);
        };

        match repository.prune_older_than(days, now) {
            Ok(report) => {
                if report.total() > 0 {
                    log::debug!(
                        "Pruned {} samples, {} flows, {} hosts, {} triggers older than {} days",
                        report.samples,
                        report.flows,
                        report.hosts,
                        report.triggers,
                        days
                    );
                }
                Ok(Some(report))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log::warn!("Retention pass skipped: {}", e);
                Ok(None)
            }
        }
    }

    /// Stop capture first, then flush every live flow as closed.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut batch = TickBatch::new();
        self.leave_deep(&mut batch);

        match self.persist(batch)? {
            PersistStatus::Deferred { pending_ticks } => {
                log::warn!("Shutting down with {} ticks not persisted", pending_ticks);
            }
            _ => log::debug!("Final flush complete"),
        }

        self.pending = None;
        self.reset_state();
        Ok(())
    }
}

impl Drop for MonitorController {
    fn drop(&mut self) {
        if let Acquisition::Deep(backend) = &mut self.acquisition {
            backend.stop();
        }
    }
}
