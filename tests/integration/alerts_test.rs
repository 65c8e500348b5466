use netwatch::core::config::{AppConfig, MonitorSettings};
use netwatch::core::monitor::{AlertMetric, AlertRule, Direction, Operator};
use netwatch::storage::{Repository, TimeRange};

use super::support::{at, controller, deep_config, packet, remote, FakeCounters, ScriptedProvider};

fn download_rule(duration_seconds: u64) -> AlertRule {
    AlertRule {
        name: "busy-download".to_string(),
        metric: AlertMetric::DownloadRateMbps,
        operator: Operator::Greater,
        threshold: 0.5,
        duration_seconds,
        enabled: true,
        interface_filter: None,
    }
}

#[test]
fn test_rule_fires_once_after_hold_duration_and_persists() {
    let repository = Repository::open_in_memory().unwrap();
    repository.add_rule(&download_rule(2)).unwrap();

    let counters = FakeCounters::default();
    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    )
    .with_repository(repository)
    .unwrap();
    monitor.reload_rules().unwrap();
    monitor.start();

    let mut fired = Vec::new();
    for second in 0..6u64 {
        // Steady 1 Mbps download
        counters.set("eth0", 0, second * 125_000);
        let snapshot = monitor.tick_at(at(second as i64)).unwrap();
        fired.extend(snapshot.triggers.into_iter().map(|t| (second, t)));
    }

    // True from t=1, held for 2 s at t=3
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].0, 3);
    assert_eq!(fired[0].1.rule_name, "busy-download");
    assert!((fired[0].1.value - 1.0).abs() < 1e-9);

    let range = TimeRange::new(at(0), at(10)).unwrap();
    let stored = monitor.repository().unwrap().query_triggers(&range).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].triggered_at, at(3));
}

#[test]
fn test_rule_rearms_after_condition_clears() {
    let counters = FakeCounters::default();
    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.set_rules(vec![download_rule(0)]).unwrap();
    monitor.start();

    let mut total = 0u64;
    let mut fired_at = Vec::new();
    // Busy, busy, idle, busy
    for (second, busy) in [(0, false), (1, true), (2, true), (3, false), (4, true)] {
        if busy {
            total += 125_000;
        }
        counters.set("eth0", 0, total);
        let snapshot = monitor.tick_at(at(second)).unwrap();
        if !snapshot.triggers.is_empty() {
            fired_at.push(second);
        }
    }

    assert_eq!(fired_at, vec![1, 4]);
}

#[test]
fn test_interface_filter_limits_rule_scope() {
    let counters = FakeCounters::default();
    let mut rule = download_rule(0);
    rule.interface_filter = Some("wlan0".to_string());

    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.set_rules(vec![rule]).unwrap();
    monitor.start();

    counters.set("eth0", 0, 0);
    counters.set("wlan0", 0, 0);
    monitor.tick_at(at(0)).unwrap();

    // Only eth0 is busy
    counters.set("eth0", 0, 250_000);
    let snapshot = monitor.tick_at(at(1)).unwrap();
    assert!(snapshot.triggers.is_empty());

    counters.set("wlan0", 0, 250_000);
    let snapshot = monitor.tick_at(at(2)).unwrap();
    assert_eq!(snapshot.triggers.len(), 1);
    assert_eq!(snapshot.triggers[0].interface.as_deref(), Some("wlan0"));
}

#[test]
fn test_active_flow_rule_in_deep_mode() {
    let counters = FakeCounters::default();
    let provider = ScriptedProvider::capable();
    let handle = provider.handle.clone();

    let rule = AlertRule {
        name: "many-flows".to_string(),
        metric: AlertMetric::ActiveFlows,
        operator: Operator::GreaterOrEqual,
        threshold: 2.0,
        duration_seconds: 0,
        enabled: true,
        interface_filter: None,
    };

    let mut monitor = controller(deep_config(), MonitorSettings::default(), &counters, provider);
    monitor.set_rules(vec![rule]).unwrap();
    monitor.start();

    handle.push(packet(remote(1), 443, 10, Direction::Outbound, at(0)));
    assert!(monitor.tick_at(at(0)).unwrap().triggers.is_empty());

    handle.push(packet(remote(2), 443, 10, Direction::Outbound, at(1)));
    let snapshot = monitor.tick_at(at(1)).unwrap();
    assert_eq!(snapshot.triggers.len(), 1);
    assert_eq!(snapshot.triggers[0].value, 2.0);
}

#[test]
fn test_disabled_rule_never_fires() {
    let counters = FakeCounters::default();
    let mut rule = download_rule(0);
    rule.enabled = false;

    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.set_rules(vec![rule]).unwrap();
    monitor.start();

    counters.set("eth0", 0, 0);
    monitor.tick_at(at(0)).unwrap();
    counters.set("eth0", 0, 1_000_000);
    assert!(monitor.tick_at(at(1)).unwrap().triggers.is_empty());
}

#[test]
fn test_invalid_rule_set_is_rejected() {
    let counters = FakeCounters::default();
    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );

    let mut rule = download_rule(0);
    rule.threshold = f64::NAN;
    assert!(monitor.set_rules(vec![download_rule(0), rule]).is_err());
}
