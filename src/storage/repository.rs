//! Time-series repository over SQLite.
//!
//! One [`TickBatch`] commits as one transaction. Flows carry a `closed`
//! marker: rows still live in the aggregator stay open and are never pruned.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;

use super::schema;
use crate::core::config::AppConfig;
use crate::core::monitor::alerts::{AlertRule, AlertTrigger};
use crate::core::monitor::model::{FlowKey, FlowSession, HostStat, InterfaceSample, Protocol};
use crate::error::{NetwatchError, Result};

/// A flow row together with its open/closed state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    #[serde(flatten)]
    pub flow: FlowSession,
    /// Set once the flow left the live table
    pub closed: bool,
}

/// Everything one tick (or a run of failed ticks) needs to write.
#[derive(Debug, Clone, Default)]
pub struct TickBatch {
    samples: VecDeque<Vec<InterfaceSample>>,
    flows: BTreeMap<FlowKey, FlowRecord>,
    hosts: BTreeMap<IpAddr, HostStat>,
    triggers: Vec<AlertTrigger>,
}

impl TickBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_samples(&mut self, samples: Vec<InterfaceSample>) {
        self.samples.push_back(samples);
    }

    pub fn upsert_flow(&mut self, flow: FlowSession, closed: bool) {
        self.flows.insert(flow.key, FlowRecord { flow, closed });
    }

    pub fn upsert_host(&mut self, host: HostStat) {
        self.hosts.insert(host.ip, host);
    }

    pub fn push_trigger(&mut self, trigger: AlertTrigger) {
        self.triggers.push(trigger);
    }

    /// Fold a newer batch into this one. Newer flow and host rows win.
    pub fn merge(&mut self, newer: TickBatch) {
        self.samples.extend(newer.samples);
        self.flows.extend(newer.flows);
        self.hosts.extend(newer.hosts);
        self.triggers.extend(newer.triggers);
    }

    /// Drop the oldest ticks' samples beyond `max_ticks`; returns how many
    /// samples were discarded.
    pub fn bound(&mut self, max_ticks: usize) -> usize {
        let mut dropped = 0;
        while self.samples.len() > max_ticks.max(1) {
            if let Some(tick) = self.samples.pop_front() {
                dropped += tick.len();
            }
        }
        dropped
    }

    /// Number of ticks folded into this batch
    pub fn ticks(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> impl Iterator<Item = &InterfaceSample> {
        self.samples.iter().flatten()
    }

    pub fn flows(&self) -> impl Iterator<Item = &FlowRecord> {
        self.flows.values()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &HostStat> {
        self.hosts.values()
    }

    pub fn triggers(&self) -> &[AlertTrigger] {
        &self.triggers
    }

    /// Keys of flows written as closed
    pub fn closed_keys(&self) -> Vec<FlowKey> {
        self.flows
            .values()
            .filter(|record| record.closed)
            .map(|record| record.flow.key)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.iter().all(Vec::is_empty)
            && self.flows.is_empty()
            && self.hosts.is_empty()
            && self.triggers.is_empty()
    }
}

/// Rows removed by one retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub samples: usize,
    pub flows: usize,
    pub hosts: usize,
    pub triggers: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.samples + self.flows + self.hosts + self.triggers
    }
}

/// Closed time interval used by range queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(NetwatchError::config(format!(
                "range start {} is after its end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// The last `window` up to `now`
    pub fn last(window: Duration, now: DateTime<Utc>) -> Result<Self> {
        let from = now.checked_sub_signed(window).ok_or_else(|| {
            NetwatchError::config(format!("window of {} reaches before the supported range", window))
        })?;
        Self::new(from, now)
    }
}

/// Persisted entity a range query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEntity {
    Samples,
    Flows,
    Hosts,
    Triggers,
}

impl FromStr for QueryEntity {
    type Err = NetwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "samples" => Ok(QueryEntity::Samples),
            "flows" => Ok(QueryEntity::Flows),
            "hosts" => Ok(QueryEntity::Hosts),
            "triggers" => Ok(QueryEntity::Triggers),
            other => Err(NetwatchError::config(format!("unknown entity: {}", other))),
        }
    }
}

impl fmt::Display for QueryEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryEntity::Samples => "samples",
            QueryEntity::Flows => "flows",
            QueryEntity::Hosts => "hosts",
            QueryEntity::Triggers => "triggers",
        };
        f.write_str(name)
    }
}

/// Rows returned by [`Repository::query_range`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRows {
    Samples(Vec<InterfaceSample>),
    Flows(Vec<FlowRecord>),
    Hosts(Vec<HostStat>),
    Triggers(Vec<AlertTrigger>),
}

impl QueryRows {
    pub fn len(&self) -> usize {
        match self {
            QueryRows::Samples(rows) => rows.len(),
            QueryRows::Flows(rows) => rows.len(),
            QueryRows::Hosts(rows) => rows.len(),
            QueryRows::Triggers(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One JSON document per row
    pub fn to_json_lines(&self) -> Result<Vec<String>> {
        fn encode<T: Serialize>(rows: &[T]) -> Result<Vec<String>> {
            rows.iter()
                .map(|row| serde_json::to_string(row).map_err(NetwatchError::from))
                .collect()
        }

        match self {
            QueryRows::Samples(rows) => encode(rows),
            QueryRows::Flows(rows) => encode(rows),
            QueryRows::Hosts(rows) => encode(rows),
            QueryRows::Triggers(rows) => encode(rows),
        }
    }
}

/// Owner of every persisted row
pub struct Repository {
    conn: Connection,
    path: PathBuf,
}

impl Repository {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        Self::initialize(conn, path)
    }

    /// Private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, PathBuf::from(":memory:"))
    }

    fn initialize(mut conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if check != "ok" {
            return Err(NetwatchError::storage_corrupted(format!(
                "{}: integrity check failed: {}",
                path.display(),
                check
            )));
        }

        let version = schema::migrate(&mut conn)?;
        log::debug!("Opened {} at schema version {}", path.display(), version);

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bound how long a write waits on a locked database.
    pub fn set_busy_timeout(&self, timeout: StdDuration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Commit one tick's rows atomically.
    pub fn write_tick(&mut self, batch: &TickBatch) -> Result<()> {
        let tx = self.conn.transaction()?;

        for sample in batch.samples() {
            insert_sample(&tx, sample)?;
        }
        for record in batch.flows() {
            upsert_flow_row(&tx, &record.flow, record.closed)?;
        }
        for host in batch.hosts() {
            upsert_host_row(&tx, host)?;
        }
        for trigger in batch.triggers() {
            insert_trigger(&tx, trigger)?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn append_sample(&self, sample: &InterfaceSample) -> Result<()> {
        insert_sample(&self.conn, sample)
    }

    pub fn upsert_flow(&self, flow: &FlowSession, closed: bool) -> Result<()> {
        upsert_flow_row(&self.conn, flow, closed)
    }

    pub fn upsert_host(&self, host: &HostStat) -> Result<()> {
        upsert_host_row(&self.conn, host)
    }

    pub fn append_alert_trigger(&self, trigger: &AlertTrigger) -> Result<()> {
        insert_trigger(&self.conn, trigger)
    }

    /// Mark flows left open by a previous run as closed.
    pub fn close_open_flows(&self) -> Result<usize> {
        Ok(self
            .conn
            .execute("UPDATE flow_sessions SET closed = 1 WHERE closed = 0", [])?)
    }

    /// Delete historical rows older than `days`.
    pub fn prune_older_than(&mut self, days: u32, now: DateTime<Utc>) -> Result<PruneReport> {
        let cutoff = Duration::try_days(i64::from(days))
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                NetwatchError::config(format!("retention of {} days is out of range", days))
            })?;
        self.prune_before(cutoff)
    }

    /// Delete rows strictly older than `cutoff`. Open flows, and hosts that
    /// still have one, are kept regardless of age.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<PruneReport> {
        let cutoff = format_timestamp(cutoff);
        let tx = self.conn.transaction()?;

        let report = PruneReport {
            samples: tx.execute(
                "DELETE FROM interface_samples WHERE timestamp < ?1",
                params![cutoff],
            )?,
            flows: tx.execute(
                "DELETE FROM flow_sessions WHERE closed = 1 AND last_seen < ?1",
                params![cutoff],
            )?,
            hosts: tx.execute(
                r#"
                DELETE FROM host_stats
                WHERE last_seen < ?1
                  AND ip NOT IN (SELECT remote_ip FROM flow_sessions WHERE closed = 0)
                "#,
                params![cutoff],
            )?,
            triggers: tx.execute(
                "DELETE FROM alert_triggers WHERE triggered_at < ?1",
                params![cutoff],
            )?,
        };

        tx.commit()?;
        Ok(report)
    }

    pub fn query_range(
        &self,
        entity: QueryEntity,
        range: &TimeRange,
        interface: Option<&str>,
    ) -> Result<QueryRows> {
        Ok(match entity {
            QueryEntity::Samples => QueryRows::Samples(self.query_samples(range, interface)?),
            QueryEntity::Flows => QueryRows::Flows(self.query_flows(range)?),
            QueryEntity::Hosts => QueryRows::Hosts(self.query_hosts(range)?),
            QueryEntity::Triggers => QueryRows::Triggers(self.query_triggers(range)?),
        })
    }

    pub fn query_samples(
        &self,
        range: &TimeRange,
        interface: Option<&str>,
    ) -> Result<Vec<InterfaceSample>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT interface, timestamp, bytes_sent, bytes_recv, packets_sent, packets_recv,
                   rate_up_mbps, rate_down_mbps, epoch
            FROM interface_samples
            WHERE timestamp >= ?1 AND timestamp <= ?2
              AND (?3 IS NULL OR interface = ?3)
            ORDER BY timestamp ASC, interface ASC
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![format_timestamp(range.from), format_timestamp(range.to), interface],
                |row| {
                    Ok(InterfaceSample {
                        interface: row.get(0)?,
                        timestamp: timestamp_column(row, 1)?,
                        bytes_sent: row.get::<_, i64>(2)? as u64,
                        bytes_recv: row.get::<_, i64>(3)? as u64,
                        packets_sent: row.get::<_, i64>(4)? as u64,
                        packets_recv: row.get::<_, i64>(5)? as u64,
                        rate_up_mbps: row.get(6)?,
                        rate_down_mbps: row.get(7)?,
                        epoch: row.get(8)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// Flows active at any point inside the range
    pub fn query_flows(&self, range: &TimeRange) -> Result<Vec<FlowRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT protocol, local_ip, local_port, remote_ip, remote_port,
                   bytes_up, bytes_down, packets_up, packets_down,
                   process_name, process_pid, start_time, last_seen, closed
            FROM flow_sessions
            WHERE last_seen >= ?1 AND start_time <= ?2
            ORDER BY last_seen DESC
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![format_timestamp(range.from), format_timestamp(range.to)],
                |row| {
                    Ok(FlowRecord {
                        flow: FlowSession {
                            key: FlowKey {
                                protocol: parsed_column::<Protocol>(row, 0)?,
                                local_ip: parsed_column::<IpAddr>(row, 1)?,
                                local_port: row.get(2)?,
                                remote_ip: parsed_column::<IpAddr>(row, 3)?,
                                remote_port: row.get(4)?,
                            },
                            bytes_up: row.get::<_, i64>(5)? as u64,
                            bytes_down: row.get::<_, i64>(6)? as u64,
                            packets_up: row.get::<_, i64>(7)? as u64,
                            packets_down: row.get::<_, i64>(8)? as u64,
                            process_name: row.get(9)?,
                            process_pid: row.get(10)?,
                            start_time: timestamp_column(row, 11)?,
                            last_seen: timestamp_column(row, 12)?,
                        },
                        closed: row.get(13)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    pub fn query_hosts(&self, range: &TimeRange) -> Result<Vec<HostStat>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT ip, hostname, total_bytes_up, total_bytes_down, packets_up, packets_down,
                   flow_count, last_seen
            FROM host_stats
            WHERE last_seen >= ?1 AND last_seen <= ?2
            ORDER BY last_seen DESC
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![format_timestamp(range.from), format_timestamp(range.to)],
                |row| {
                    Ok(HostStat {
                        ip: parsed_column::<IpAddr>(row, 0)?,
                        hostname: row.get(1)?,
                        total_bytes_up: row.get::<_, i64>(2)? as u64,
                        total_bytes_down: row.get::<_, i64>(3)? as u64,
                        packets_up: row.get::<_, i64>(4)? as u64,
                        packets_down: row.get::<_, i64>(5)? as u64,
                        flow_count: row.get(6)?,
                        last_seen: timestamp_column(row, 7)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    pub fn query_triggers(&self, range: &TimeRange) -> Result<Vec<AlertTrigger>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.name, t.triggered_at, t.interface, t.value
            FROM alert_triggers t
            JOIN alert_rules r ON r.id = t.rule_id
            WHERE t.triggered_at >= ?1 AND t.triggered_at <= ?2
            ORDER BY t.triggered_at DESC
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![format_timestamp(range.from), format_timestamp(range.to)],
                |row| {
                    Ok(AlertTrigger {
                        rule_name: row.get(0)?,
                        triggered_at: timestamp_column(row, 1)?,
                        interface: row.get(2)?,
                        value: row.get(3)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    pub fn list_rules(&self) -> Result<Vec<AlertRule>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, metric, operator, threshold, duration_seconds, enabled, interface_filter
            FROM alert_rules
            ORDER BY name ASC
            "#,
        )?;

        let rules = stmt
            .query_map([], |row| {
                Ok(AlertRule {
                    name: row.get(0)?,
                    metric: parsed_column(row, 1)?,
                    operator: parsed_column(row, 2)?,
                    threshold: row.get(3)?,
                    duration_seconds: row.get::<_, i64>(4)?.max(0) as u64,
                    enabled: row.get(5)?,
                    interface_filter: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rules)
    }

    /// Insert a new rule. Names are unique.
    pub fn add_rule(&self, rule: &AlertRule) -> Result<()> {
        rule.validate()?;

        let inserted = self.conn.execute(
            r#"
            INSERT INTO alert_rules (
                name, metric, operator, threshold, duration_seconds, enabled, interface_filter
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                rule.name,
                rule.metric.as_str(),
                rule.operator.as_str(),
                rule.threshold,
                rule.duration_seconds as i64,
                rule.enabled,
                rule.interface_filter,
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(err) if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => Err(
                NetwatchError::config(format!("alert rule '{}' already exists", rule.name)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete a rule and its triggers. Returns false if it did not exist.
    pub fn remove_rule(&self, name: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM alert_rules WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }

    pub fn set_rule_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE alert_rules SET enabled = ?2 WHERE name = ?1",
            params![name, enabled],
        )?;
        Ok(updated > 0)
    }

    pub fn load_config(&self) -> Result<Option<AppConfig>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT sampling_interval_ms, retention_days, deep_capture_enabled,
                       interface_selection, privacy_no_hostname, privacy_limit_retention,
                       chart_history_seconds
                FROM app_config WHERE id = 1
                "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((interval, retention, deep, selection, no_hostname, limit_retention, chart)) = row
        else {
            return Ok(None);
        };

        let config = AppConfig {
            sampling_interval_ms: interval.max(0) as u64,
            retention_days: u32::try_from(retention).unwrap_or(0),
            deep_capture_enabled: deep,
            interface_selection: serde_json::from_str(&selection)?,
            privacy_no_hostname: no_hostname,
            privacy_limit_retention: limit_retention,
            chart_history_seconds: chart.max(0) as u64,
        };
        config.validate()?;
        Ok(Some(config))
    }

    /// Stored configuration, or the defaults when none was saved yet.
    pub fn load_config_or_default(&self) -> Result<AppConfig> {
        Ok(self.load_config()?.unwrap_or_default())
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;

        self.conn.execute(
            r#"
            INSERT INTO app_config (
                id, sampling_interval_ms, retention_days, deep_capture_enabled,
                interface_selection, privacy_no_hostname, privacy_limit_retention,
                chart_history_seconds
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                sampling_interval_ms = excluded.sampling_interval_ms,
                retention_days = excluded.retention_days,
                deep_capture_enabled = excluded.deep_capture_enabled,
                interface_selection = excluded.interface_selection,
                privacy_no_hostname = excluded.privacy_no_hostname,
                privacy_limit_retention = excluded.privacy_limit_retention,
                chart_history_seconds = excluded.chart_history_seconds
            "#,
            params![
                config.sampling_interval_ms as i64,
                config.retention_days,
                config.deep_capture_enabled,
                serde_json::to_string(&config.interface_selection)?,
                config.privacy_no_hostname,
                config.privacy_limit_retention,
                config.chart_history_seconds as i64,
            ],
        )?;

        if config.privacy_no_hostname {
            self.forget_hostnames()?;
        }
        Ok(())
    }

    /// Erase every stored hostname. Host totals are kept.
    pub fn forget_hostnames(&self) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE host_stats SET hostname = NULL WHERE hostname IS NOT NULL",
            [],
        )?)
    }
}

fn insert_sample(conn: &Connection, sample: &InterfaceSample) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO interface_samples (
            interface, timestamp, bytes_sent, bytes_recv, packets_sent, packets_recv,
            rate_up_mbps, rate_down_mbps, epoch
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            sample.interface,
            format_timestamp(sample.timestamp),
            sample.bytes_sent as i64,
            sample.bytes_recv as i64,
            sample.packets_sent as i64,
            sample.packets_recv as i64,
            sample.rate_up_mbps,
            sample.rate_down_mbps,
            sample.epoch,
        ],
    )?;
    Ok(())
}

fn upsert_flow_row(conn: &Connection, flow: &FlowSession, closed: bool) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO flow_sessions (
            protocol, local_ip, local_port, remote_ip, remote_port,
            bytes_up, bytes_down, packets_up, packets_down,
            process_name, process_pid, start_time, last_seen, closed
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(protocol, local_ip, local_port, remote_ip, remote_port) DO UPDATE SET
            bytes_up = excluded.bytes_up,
            bytes_down = excluded.bytes_down,
            packets_up = excluded.packets_up,
            packets_down = excluded.packets_down,
            process_name = COALESCE(excluded.process_name, process_name),
            process_pid = COALESCE(excluded.process_pid, process_pid),
            start_time = excluded.start_time,
            last_seen = excluded.last_seen,
            closed = excluded.closed
        "#,
        params![
            flow.key.protocol.as_str(),
            flow.key.local_ip.to_string(),
            flow.key.local_port,
            flow.key.remote_ip.to_string(),
            flow.key.remote_port,
            flow.bytes_up as i64,
            flow.bytes_down as i64,
            flow.packets_up as i64,
            flow.packets_down as i64,
            flow.process_name,
            flow.process_pid,
            format_timestamp(flow.start_time),
            format_timestamp(flow.last_seen),
            closed,
        ],
    )?;
    Ok(())
}

fn upsert_host_row(conn: &Connection, host: &HostStat) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO host_stats (
            ip, hostname, total_bytes_up, total_bytes_down, packets_up, packets_down,
            flow_count, last_seen
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(ip) DO UPDATE SET
            hostname = excluded.hostname,
            total_bytes_up = excluded.total_bytes_up,
            total_bytes_down = excluded.total_bytes_down,
            packets_up = excluded.packets_up,
            packets_down = excluded.packets_down,
            flow_count = excluded.flow_count,
            last_seen = excluded.last_seen
        "#,
        params![
            host.ip.to_string(),
            host.hostname,
            host.total_bytes_up as i64,
            host.total_bytes_down as i64,
            host.packets_up as i64,
            host.packets_down as i64,
            host.flow_count,
            format_timestamp(host.last_seen),
        ],
    )?;
    Ok(())
}

fn insert_trigger(conn: &Connection, trigger: &AlertTrigger) -> Result<()> {
    let inserted = conn.execute(
        r#"
        INSERT INTO alert_triggers (rule_id, triggered_at, interface, value)
        SELECT id, ?2, ?3, ?4 FROM alert_rules WHERE name = ?1
        "#,
        params![
            trigger.rule_name,
            format_timestamp(trigger.triggered_at),
            trigger.interface,
            trigger.value,
        ],
    )?;

    if inserted == 0 {
        log::debug!(
            "Dropped trigger for rule '{}': rule no longer exists",
            trigger.rule_name
        );
    }
    Ok(())
}

/// Fixed-width UTC text so lexical order matches time order.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_column(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parsed_column<T>(row: &Row<'_>, column: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(column)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}
