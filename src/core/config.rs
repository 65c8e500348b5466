use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};

use crate::error::{NetwatchError, Result};

pub const MIN_SAMPLING_INTERVAL_MS: u64 = 100;
pub const MAX_SAMPLING_INTERVAL_MS: u64 = 60_000;
pub const MAX_RETENTION_DAYS: u32 = 3650;
pub const MIN_CHART_HISTORY_SECONDS: u64 = 10;
pub const MAX_CHART_HISTORY_SECONDS: u64 = 86_400;
/// Longest inactivity window a live flow may have (one year).
pub const MAX_FLOW_STALENESS_SECS: u64 = 365 * 86_400;

/// Retention ceiling applied when `privacy_limit_retention` is set.
pub const PRIVACY_RETENTION_CAP_DAYS: u32 = 7;

/// Application configuration, persisted as the single `app_config` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default)]
    pub deep_capture_enabled: bool,
    /// Interfaces to monitor. Empty means all.
    #[serde(default)]
    pub interface_selection: Vec<String>,
    #[serde(default)]
    pub privacy_no_hostname: bool,
    #[serde(default = "default_true")]
    pub privacy_limit_retention: bool,
    #[serde(default = "default_chart_history_seconds")]
    pub chart_history_seconds: u64,
}

fn default_sampling_interval_ms() -> u64 {
    1000
}

fn default_retention_days() -> u32 {
    30
}

fn default_chart_history_seconds() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: default_sampling_interval_ms(),
            retention_days: default_retention_days(),
            deep_capture_enabled: false,
            interface_selection: Vec::new(),
            privacy_no_hostname: false,
            privacy_limit_retention: true,
            chart_history_seconds: default_chart_history_seconds(),
        }
    }
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLING_INTERVAL_MS..=MAX_SAMPLING_INTERVAL_MS)
            .contains(&self.sampling_interval_ms)
        {
            return Err(NetwatchError::config(format!(
                "sampling_interval_ms must be between {} and {} (got {})",
                MIN_SAMPLING_INTERVAL_MS, MAX_SAMPLING_INTERVAL_MS, self.sampling_interval_ms
            )));
        }

        if self.retention_days == 0 || self.retention_days > MAX_RETENTION_DAYS {
            return Err(NetwatchError::config(format!(
                "retention_days must be between 1 and {} (got {})",
                MAX_RETENTION_DAYS, self.retention_days
            )));
        }

        if !(MIN_CHART_HISTORY_SECONDS..=MAX_CHART_HISTORY_SECONDS)
            .contains(&self.chart_history_seconds)
        {
            return Err(NetwatchError::config(format!(
                "chart_history_seconds must be between {} and {} (got {})",
                MIN_CHART_HISTORY_SECONDS, MAX_CHART_HISTORY_SECONDS, self.chart_history_seconds
            )));
        }

        if let Some(bad) = self
            .interface_selection
            .iter()
            .find(|name| name.trim().is_empty() || name.contains(','))
        {
            return Err(NetwatchError::config(format!(
                "invalid interface name in selection: {:?}",
                bad
            )));
        }

        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    /// Retention actually enforced by pruning.
    pub fn effective_retention_days(&self) -> u32 {
        if self.privacy_limit_retention {
            self.retention_days.min(PRIVACY_RETENTION_CAP_DAYS)
        } else {
            self.retention_days
        }
    }

    /// True when `name` passes the interface selection filter.
    pub fn selects_interface(&self, name: &str) -> bool {
        self.interface_selection.is_empty() || self.interface_selection.iter().any(|i| i == name)
    }

    /// Apply a `key=value` update, returning a validated copy.
    ///
    /// The receiver is left untouched so the prior configuration stays in
    /// effect when the update is rejected.
    pub fn with_update(&self, key: &str, value: &str) -> Result<AppConfig> {
        let mut next = self.clone();

        match key {
            "sampling_interval_ms" => next.sampling_interval_ms = parse_value(key, value)?,
            "retention_days" => next.retention_days = parse_value(key, value)?,
            "deep_capture_enabled" => next.deep_capture_enabled = parse_bool(key, value)?,
            "interface_selection" => {
                next.interface_selection = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "privacy_no_hostname" => next.privacy_no_hostname = parse_bool(key, value)?,
            "privacy_limit_retention" => next.privacy_limit_retention = parse_bool(key, value)?,
            "chart_history_seconds" => next.chart_history_seconds = parse_value(key, value)?,
            other => {
                return Err(NetwatchError::config(format!(
                    "unknown configuration key: {}",
                    other
                )))
            }
        }

        next.validate()?;
        Ok(next)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| NetwatchError::config(format!("malformed value for {}: {:?}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(NetwatchError::config(format!(
            "malformed boolean for {}: {:?}",
            key, value
        ))),
    }
}

/// Pipeline tuning that is independent of the persisted `AppConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Inactivity after which a live flow is flushed and evicted.
    pub flow_staleness_secs: u64,
    pub capture_queue_capacity: usize,
    pub prune_interval_secs: u64,
    /// Upper bound for one tick's commit before it is reported as slow.
    pub persist_budget_ms: u64,
    /// Ticks of unpersisted samples kept while the store is unavailable.
    pub max_pending_ticks: usize,
    /// Exponential smoothing factor for displayed rates (1.0 = raw).
    pub rate_smoothing: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            flow_staleness_secs: 120,
            capture_queue_capacity: 10_000,
            prune_interval_secs: 60,
            persist_budget_ms: 500,
            max_pending_ticks: 30,
            rate_smoothing: 1.0,
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.flow_staleness_secs == 0 || self.flow_staleness_secs > MAX_FLOW_STALENESS_SECS {
            return Err(NetwatchError::config(format!(
                "flow_staleness_secs must be between 1 and {} (got {})",
                MAX_FLOW_STALENESS_SECS, self.flow_staleness_secs
            )));
        }
        if self.capture_queue_capacity == 0 {
            return Err(NetwatchError::config("capture_queue_capacity must be positive"));
        }
        if self.prune_interval_secs == 0 {
            return Err(NetwatchError::config("prune_interval_secs must be positive"));
        }
        if self.max_pending_ticks == 0 {
            return Err(NetwatchError::config("max_pending_ticks must be positive"));
        }
        if !(self.rate_smoothing > 0.0 && self.rate_smoothing <= 1.0) {
            return Err(NetwatchError::config(format!(
                "rate_smoothing must be in (0, 1] (got {})",
                self.rate_smoothing
            )));
        }
        Ok(())
    }

    pub fn flow_staleness(&self) -> chrono::Duration {
        let secs = self.flow_staleness_secs.min(MAX_FLOW_STALENESS_SECS) as i64;
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn persist_budget(&self) -> Duration {
        Duration::from_millis(self.persist_budget_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// Default location of the SQLite store.
pub fn default_database_path() -> AnyResult<PathBuf> {
    let data_dir = dirs::data_dir().with_context(|| "Could not determine data directory")?;

    Ok(data_dir.join("netwatch").join("netwatch.db"))
}
