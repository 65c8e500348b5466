//! SQLite schema and migrations
//!
//! Every migration is applied at most once and recorded in `schema_version`.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Latest schema version this build writes
pub const SCHEMA_VERSION: i64 = 2;

const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS interface_samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        interface TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        bytes_sent INTEGER NOT NULL,
        bytes_recv INTEGER NOT NULL,
        packets_sent INTEGER NOT NULL,
        packets_recv INTEGER NOT NULL,
        rate_up_mbps REAL NOT NULL,
        rate_down_mbps REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS flow_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        protocol TEXT NOT NULL,
        local_ip TEXT NOT NULL,
        local_port INTEGER NOT NULL,
        remote_ip TEXT NOT NULL,
        remote_port INTEGER NOT NULL,
        bytes_up INTEGER NOT NULL DEFAULT 0,
        bytes_down INTEGER NOT NULL DEFAULT 0,
        packets_up INTEGER NOT NULL DEFAULT 0,
        packets_down INTEGER NOT NULL DEFAULT 0,
        process_name TEXT,
        process_pid INTEGER,
        start_time TEXT NOT NULL,
        last_seen TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS host_stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ip TEXT NOT NULL UNIQUE,
        hostname TEXT,
        total_bytes_up INTEGER NOT NULL DEFAULT 0,
        total_bytes_down INTEGER NOT NULL DEFAULT 0,
        packets_up INTEGER NOT NULL DEFAULT 0,
        packets_down INTEGER NOT NULL DEFAULT 0,
        flow_count INTEGER NOT NULL DEFAULT 0,
        last_seen TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS alert_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        metric TEXT NOT NULL,
        operator TEXT NOT NULL,
        threshold REAL NOT NULL,
        duration_seconds INTEGER NOT NULL DEFAULT 0,
        enabled INTEGER NOT NULL DEFAULT 1,
        interface_filter TEXT
    );

    CREATE TABLE IF NOT EXISTS alert_triggers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rule_id INTEGER NOT NULL,
        triggered_at TEXT NOT NULL,
        interface TEXT,
        value REAL NOT NULL,
        FOREIGN KEY (rule_id) REFERENCES alert_rules(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS app_config (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        sampling_interval_ms INTEGER NOT NULL,
        retention_days INTEGER NOT NULL,
        deep_capture_enabled INTEGER NOT NULL,
        interface_selection TEXT NOT NULL DEFAULT '[]',
        privacy_no_hostname INTEGER NOT NULL DEFAULT 0,
        privacy_limit_retention INTEGER NOT NULL DEFAULT 1,
        chart_history_seconds INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_samples_interface_time
        ON interface_samples(interface, timestamp DESC);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_flows_tuple
        ON flow_sessions(protocol, local_ip, local_port, remote_ip, remote_port);
    CREATE INDEX IF NOT EXISTS idx_flows_remote ON flow_sessions(remote_ip);
    CREATE INDEX IF NOT EXISTS idx_flows_last_seen ON flow_sessions(last_seen DESC);
    CREATE INDEX IF NOT EXISTS idx_hosts_last_seen ON host_stats(last_seen DESC);
    CREATE INDEX IF NOT EXISTS idx_triggers_time ON alert_triggers(triggered_at DESC);
"#;

// Counter epochs on samples and the open/closed marker on flows
const MIGRATION_V2: &str = r#"
    ALTER TABLE interface_samples ADD COLUMN epoch INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE flow_sessions ADD COLUMN closed INTEGER NOT NULL DEFAULT 0;
    CREATE INDEX IF NOT EXISTS idx_flows_open ON flow_sessions(closed) WHERE closed = 0;
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1), (2, MIGRATION_V2)];

/// Bring the database up to [`SCHEMA_VERSION`].
pub fn migrate(conn: &mut Connection) -> Result<i64> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );
        "#,
    )?;

    let mut current = current_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        log::debug!("Applied schema migration {}", version);
        current = *version;
    }

    Ok(current)
}

pub fn current_version(conn: &Connection) -> Result<i64> {
    let version: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}
