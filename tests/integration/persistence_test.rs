use std::net::IpAddr;
use std::sync::Arc;

use chrono::Duration;
use rusqlite::Connection;
use tempfile::TempDir;

use netwatch::core::config::{AppConfig, MonitorSettings};
use netwatch::core::monitor::{
    Direction, FlowSession, HostnameLookup, MonitorController, PersistStatus,
};
use netwatch::storage::{QueryEntity, Repository, TimeRange};

use super::support::{at, controller, deep_config, packet, remote, FakeCounters, ScriptedProvider};

fn everything() -> TimeRange {
    TimeRange::new(at(-365 * 24 * 3600), at(365 * 24 * 3600)).unwrap()
}

fn deep_with_store(
    settings: MonitorSettings,
    repository: Repository,
) -> (MonitorController, super::support::CaptureHandle, FakeCounters) {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);
    let provider = ScriptedProvider::capable();
    let handle = provider.handle.clone();

    let mut monitor = controller(deep_config(), settings, &counters, provider)
        .with_repository(repository)
        .unwrap();
    monitor.start();
    (monitor, handle, counters)
}

#[test]
fn test_samples_persist_every_tick() {
    let (mut monitor, _handle, counters) =
        deep_with_store(MonitorSettings::default(), Repository::open_in_memory().unwrap());

    assert_eq!(
        monitor.tick_at(at(0)).unwrap().persistence,
        PersistStatus::Committed
    );
    counters.set("eth0", 125_000, 0);
    monitor.tick_at(at(1)).unwrap();

    let samples = monitor
        .repository()
        .unwrap()
        .query_samples(&everything(), Some("eth0"))
        .unwrap();
    assert_eq!(samples.len(), 2);
    // Stored rates are the raw ones
    assert!(samples
        .iter()
        .any(|s| (s.rate_up_mbps - 1.0).abs() < 1e-9));
}

#[test]
fn test_stale_flow_is_flushed_closed_then_evicted() {
    let (mut monitor, handle, _counters) =
        deep_with_store(MonitorSettings::default(), Repository::open_in_memory().unwrap());

    handle.push(packet(remote(1), 443, 1000, Direction::Outbound, at(0)));
    monitor.tick_at(at(1)).unwrap();
    assert_eq!(monitor.live_flow_count(), 1);

    let flows = monitor.repository().unwrap().query_flows(&everything()).unwrap();
    assert_eq!(flows.len(), 1);
    assert!(!flows[0].closed);

    // Still inside the 120 s window
    monitor.tick_at(at(100)).unwrap();
    assert_eq!(monitor.live_flow_count(), 1);

    monitor.tick_at(at(121)).unwrap();
    assert_eq!(monitor.live_flow_count(), 0);

    let flows = monitor.repository().unwrap().query_flows(&everything()).unwrap();
    assert_eq!(flows.len(), 1);
    assert!(flows[0].closed);
    assert_eq!(flows[0].flow.bytes_up, 1000);
}

#[test]
fn test_flow_stays_live_while_store_is_locked() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("netwatch.db");

    let settings = MonitorSettings {
        persist_budget_ms: 20,
        ..MonitorSettings::default()
    };
    let (mut monitor, handle, _counters) =
        deep_with_store(settings, Repository::open(&path).unwrap());

    handle.push(packet(remote(2), 443, 500, Direction::Inbound, at(0)));
    monitor.tick_at(at(1)).unwrap();

    let blocker = Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    // Flow is stale but the flush cannot commit: it must not be evicted
    let snapshot = monitor.tick_at(at(200)).unwrap();
    assert!(matches!(
        snapshot.persistence,
        PersistStatus::Deferred { pending_ticks: 1 }
    ));
    assert_eq!(monitor.live_flow_count(), 1);
    assert_eq!(monitor.pending_ticks(), 1);

    blocker.execute_batch("COMMIT;").unwrap();

    let snapshot = monitor.tick_at(at(201)).unwrap();
    assert_eq!(snapshot.persistence, PersistStatus::Committed);
    assert_eq!(monitor.pending_ticks(), 0);
    assert_eq!(monitor.live_flow_count(), 0);

    let flows = monitor.repository().unwrap().query_flows(&everything()).unwrap();
    assert_eq!(flows.len(), 1);
    assert!(flows[0].closed);

    // Samples from the deferred tick were kept and written
    let samples = monitor
        .repository()
        .unwrap()
        .query_samples(&everything(), None)
        .unwrap();
    assert_eq!(samples.len(), 3);
}

#[test]
fn test_prune_never_removes_live_flow() {
    let settings = MonitorSettings {
        flow_staleness_secs: 100 * 24 * 3600,
        ..MonitorSettings::default()
    };
    let (mut monitor, handle, _counters) =
        deep_with_store(settings, Repository::open_in_memory().unwrap());

    let old = at(0) - Duration::days(40);
    handle.push(packet(remote(3), 993, 200, Direction::Inbound, old));
    monitor.tick_at(at(0)).unwrap();

    let mut config = monitor.config().clone();
    config.retention_days = 30;
    config.privacy_limit_retention = false;
    monitor.apply_config(config).unwrap();
    assert_eq!(monitor.live_flow_count(), 1);

    let report = monitor.prune(at(0)).unwrap().unwrap();
    assert_eq!(report.flows, 0);
    assert_eq!(report.hosts, 0);

    let flows = monitor.repository().unwrap().query_flows(&everything()).unwrap();
    assert_eq!(flows.len(), 1);
    assert!(!flows[0].closed);
}

#[test]
fn test_prune_applies_privacy_retention_cap() {
    let (mut monitor, _handle, _counters) =
        deep_with_store(MonitorSettings::default(), Repository::open_in_memory().unwrap());

    monitor.tick_at(at(0) - Duration::days(10)).unwrap();
    monitor.tick_at(at(0) - Duration::days(3)).unwrap();

    // Default config: 30 days, capped to 7 by the privacy limit
    let report = monitor.prune(at(0)).unwrap().unwrap();
    assert_eq!(report.samples, 1);
}

#[test]
fn test_shutdown_flushes_live_flows_as_closed() {
    let (mut monitor, handle, _counters) =
        deep_with_store(MonitorSettings::default(), Repository::open_in_memory().unwrap());

    handle.push(packet(remote(4), 443, 800, Direction::Outbound, at(0)));
    monitor.tick_at(at(1)).unwrap();

    // Queued after the last tick, still picked up by the final flush
    handle.push(packet(remote(4), 443, 200, Direction::Outbound, at(1)));
    monitor.shutdown().unwrap();

    assert!(!handle.is_running());
    let flows = monitor.repository().unwrap().query_flows(&everything()).unwrap();
    assert_eq!(flows.len(), 1);
    assert!(flows[0].closed);
    assert_eq!(flows[0].flow.bytes_up, 1000);
}

#[test]
fn test_reopen_closes_orphaned_flows() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("netwatch.db");

    {
        let repository = Repository::open(&path).unwrap();
        let key = packet(remote(5), 80, 1, Direction::Outbound, at(0)).key();
        repository.upsert_flow(&FlowSession::new(key, at(0)), false).unwrap();
    }

    let counters = FakeCounters::default();
    let monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    )
    .with_repository(Repository::open(&path).unwrap())
    .unwrap();

    let flows = monitor.repository().unwrap().query_flows(&everything()).unwrap();
    assert_eq!(flows.len(), 1);
    assert!(flows[0].closed);
}

#[test]
fn test_corrupted_database_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("netwatch.db");
    std::fs::write(&path, "this is not a sqlite database\n".repeat(200)).unwrap();

    let err = Repository::open(&path).err().unwrap();
    assert!(err.is_fatal(), "unexpected error: {}", err);
}

#[test]
fn test_query_rows_as_json_lines() {
    let (mut monitor, handle, _counters) =
        deep_with_store(MonitorSettings::default(), Repository::open_in_memory().unwrap());

    handle.push(packet(remote(6), 53, 90, Direction::Outbound, at(0)));
    monitor.tick_at(at(1)).unwrap();

    let repository = monitor.repository().unwrap();
    let rows = repository
        .query_range(QueryEntity::Hosts, &everything(), None)
        .unwrap();
    assert_eq!(rows.len(), 1);

    let lines = rows.to_json_lines().unwrap();
    let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(value["ip"], "93.184.216.6");
    assert_eq!(value["total_bytes_up"], 90);
}

struct FixedNames;

impl HostnameLookup for FixedNames {
    fn lookup(&self, _ip: IpAddr) -> Option<String> {
        Some("example.org".to_string())
    }
}

#[test]
fn test_enabling_hostname_privacy_erases_stored_names() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);
    let provider = ScriptedProvider::capable();
    let handle = provider.handle.clone();

    let mut monitor = controller(deep_config(), MonitorSettings::default(), &counters, provider)
        .with_repository(Repository::open_in_memory().unwrap())
        .unwrap()
        .with_hostnames(Arc::new(FixedNames));
    monitor.start();

    handle.push(packet(remote(7), 443, 300, Direction::Outbound, at(0)));
    monitor.tick_at(at(1)).unwrap();

    let hosts = monitor.repository().unwrap().query_hosts(&everything()).unwrap();
    assert_eq!(hosts[0].hostname.as_deref(), Some("example.org"));

    let mut config = monitor.config().clone();
    config.privacy_no_hostname = true;
    monitor.apply_config(config).unwrap();

    let hosts = monitor.repository().unwrap().query_hosts(&everything()).unwrap();
    assert_eq!(hosts.len(), 1);
    assert!(hosts[0].hostname.is_none());
    assert_eq!(hosts[0].total_bytes_up, 300);

    // Later ticks keep the names out
    handle.push(packet(remote(7), 443, 100, Direction::Outbound, at(2)));
    monitor.tick_at(at(2)).unwrap();
    let hosts = monitor.repository().unwrap().query_hosts(&everything()).unwrap();
    assert!(hosts[0].hostname.is_none());
}
