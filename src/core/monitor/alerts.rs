//! Threshold alert rules.
//!
//! Each rule is evaluated against the tick snapshot. A rule fires once its
//! condition has held continuously for the configured duration, then stays
//! silent until the condition clears and holds again.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::TickSnapshot;
use crate::error::{NetwatchError, Result};

/// Quantity a rule watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    UploadRateMbps,
    DownloadRateMbps,
    TotalRateMbps,
    ActiveFlows,
    ActiveHosts,
    DroppedEvents,
}

impl AlertMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertMetric::UploadRateMbps => "upload_rate_mbps",
            AlertMetric::DownloadRateMbps => "download_rate_mbps",
            AlertMetric::TotalRateMbps => "total_rate_mbps",
            AlertMetric::ActiveFlows => "active_flows",
            AlertMetric::ActiveHosts => "active_hosts",
            AlertMetric::DroppedEvents => "dropped_events",
        }
    }

    /// Rate metrics honour the rule's interface filter.
    pub fn is_per_interface(&self) -> bool {
        matches!(
            self,
            AlertMetric::UploadRateMbps | AlertMetric::DownloadRateMbps | AlertMetric::TotalRateMbps
        )
    }
}

impl fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertMetric {
    type Err = NetwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "upload_rate_mbps" => Ok(AlertMetric::UploadRateMbps),
            "download_rate_mbps" => Ok(AlertMetric::DownloadRateMbps),
            "total_rate_mbps" => Ok(AlertMetric::TotalRateMbps),
            "active_flows" => Ok(AlertMetric::ActiveFlows),
            "active_hosts" => Ok(AlertMetric::ActiveHosts),
            "dropped_events" => Ok(AlertMetric::DroppedEvents),
            other => Err(NetwatchError::config(format!("unknown alert metric: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "==",
        }
    }

    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Greater => value > threshold,
            Operator::GreaterOrEqual => value >= threshold,
            Operator::Less => value < threshold,
            Operator::LessOrEqual => value <= threshold,
            Operator::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = NetwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            ">" => Ok(Operator::Greater),
            ">=" => Ok(Operator::GreaterOrEqual),
            "<" => Ok(Operator::Less),
            "<=" => Ok(Operator::LessOrEqual),
            "==" => Ok(Operator::Equal),
            other => Err(NetwatchError::config(format!("unknown operator: {}", other))),
        }
    }
}

/// Alert rule definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    pub metric: AlertMetric,
    pub operator: Operator,
    pub threshold: f64,
    /// Seconds the condition must hold before firing
    pub duration_seconds: u64,
    pub enabled: bool,
    /// Restrict rate metrics to one interface. `None` sums all interfaces.
    pub interface_filter: Option<String>,
}

impl AlertRule {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(NetwatchError::config("alert rule name must not be empty"));
        }
        if !self.threshold.is_finite() {
            return Err(NetwatchError::config(format!(
                "alert rule {}: threshold must be a finite number",
                self.name
            )));
        }
        if self.duration_seconds > i64::MAX as u64 / 1000 {
            return Err(NetwatchError::config(format!(
                "alert rule {}: duration is out of range",
                self.name
            )));
        }
        if let Some(filter) = &self.interface_filter {
            if filter.trim().is_empty() {
                return Err(NetwatchError::config(format!(
                    "alert rule {}: interface filter must not be blank",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn hold_duration(&self) -> Duration {
        Duration::seconds(self.duration_seconds as i64)
    }
}

/// Record of a rule firing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTrigger {
    pub rule_name: String,
    pub triggered_at: DateTime<Utc>,
    pub interface: Option<String>,
    pub value: f64,
}

/// Per-rule evaluation state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleState {
    /// Start of the current uninterrupted run of the condition holding
    pub condition_since: Option<DateTime<Utc>>,
    /// Set once the rule fired for the current run
    pub fired: bool,
}

/// Current value of a rule's metric, or `None` when it cannot be observed
/// (e.g. the filtered interface is not reporting).
pub fn metric_value(rule: &AlertRule, snapshot: &TickSnapshot) -> Option<f64> {
    if rule.metric.is_per_interface() {
        let selected = snapshot.interfaces.iter().filter(|sample| {
            rule.interface_filter
                .as_deref()
                .map_or(true, |name| sample.interface == name)
        });

        let mut seen = false;
        let mut total = 0.0;
        for sample in selected {
            seen = true;
            total += match rule.metric {
                AlertMetric::UploadRateMbps => sample.rate_up_mbps,
                AlertMetric::DownloadRateMbps => sample.rate_down_mbps,
                _ => sample.total_rate_mbps(),
            };
        }

        return if seen || rule.interface_filter.is_none() {
            Some(total)
        } else {
            None
        };
    }

    match rule.metric {
        AlertMetric::ActiveFlows => Some(snapshot.flows.len() as f64),
        AlertMetric::ActiveHosts => Some(snapshot.hosts.len() as f64),
        AlertMetric::DroppedEvents => Some(snapshot.dropped_events as f64),
        _ => None,
    }
}

/// Evaluate enabled rules against one snapshot and return new triggers.
pub fn evaluate(
    rules: &[AlertRule],
    snapshot: &TickSnapshot,
    states: &mut HashMap<String, RuleState>,
) -> Vec<AlertTrigger> {
    let now = snapshot.timestamp;
    let mut fired = Vec::new();

    states.retain(|name, _| rules.iter().any(|r| r.enabled && &r.name == name));

    for rule in rules.iter().filter(|r| r.enabled) {
        let value = metric_value(rule, snapshot);
        let holds = value.is_some_and(|v| rule.operator.compare(v, rule.threshold));
        let state = states.entry(rule.name.clone()).or_default();

        if !holds {
            *state = RuleState::default();
            continue;
        }

        let since = *state.condition_since.get_or_insert(now);
        if !state.fired && now - since >= rule.hold_duration() {
            state.fired = true;
            let value = value.unwrap_or_default();
            log::info!(
                "Alert '{}' fired: {} {} {} (observed {:.3})",
                rule.name,
                rule.metric,
                rule.operator,
                rule.threshold,
                value
            );
            fired.push(AlertTrigger {
                rule_name: rule.name.clone(),
                triggered_at: now,
                interface: rule.interface_filter.clone(),
                value,
            });
        }
    }

    fired
}
