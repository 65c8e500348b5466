use netwatch::core::config::{AppConfig, MonitorSettings};
use netwatch::core::monitor::{Direction, MonitorMode, PersistStatus};

use super::support::{at, controller, deep_config, packet, remote, FakeCounters, ScriptedProvider};

#[test]
fn test_first_tick_reports_zero_then_measured_rate() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);

    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.start();

    let first = monitor.tick_at(at(0)).unwrap();
    assert_eq!(first.interfaces.len(), 1);
    assert_eq!(first.interfaces[0].rate_down_mbps, 0.0);
    assert_eq!(first.persistence, PersistStatus::Disabled);

    // 125000 bytes in one second is exactly 1 Mbps
    counters.set("eth0", 0, 125_000);
    let second = monitor.tick_at(at(1)).unwrap();
    assert!((second.interfaces[0].rate_down_mbps - 1.0).abs() < 1e-9);
    assert_eq!(second.interfaces[0].rate_up_mbps, 0.0);
}

#[test]
fn test_rate_uses_measured_gap_not_nominal_interval() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);

    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.start();
    monitor.tick_at(at(0)).unwrap();

    // A late tick: two seconds elapsed for a 1000 ms interval
    counters.set("eth0", 250_000, 0);
    let snapshot = monitor.tick_at(at(2)).unwrap();
    assert!((snapshot.interfaces[0].rate_up_mbps - 1.0).abs() < 1e-9);
}

#[test]
fn test_counter_reset_yields_zero_and_new_epoch() {
    let counters = FakeCounters::default();
    counters.set("eth0", 1_000_000, 1_000_000);

    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.start();
    monitor.tick_at(at(0)).unwrap();

    counters.set("eth0", 10, 10);
    let snapshot = monitor.tick_at(at(1)).unwrap();
    let sample = &snapshot.interfaces[0];
    assert_eq!(sample.rate_up_mbps, 0.0);
    assert_eq!(sample.rate_down_mbps, 0.0);
    assert_eq!(sample.epoch, 1);
}

#[test]
fn test_vanished_interface_leaves_sample_set() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);
    counters.set("usb0", 0, 0);

    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.start();
    assert_eq!(monitor.tick_at(at(0)).unwrap().interfaces.len(), 2);

    counters.remove("usb0");
    let snapshot = monitor.tick_at(at(1)).unwrap();
    assert_eq!(snapshot.interfaces.len(), 1);
    assert_eq!(snapshot.interfaces[0].interface, "eth0");

    // Coming back counts as a first reading again
    counters.set("usb0", 500_000, 0);
    let snapshot = monitor.tick_at(at(2)).unwrap();
    let usb = snapshot
        .interfaces
        .iter()
        .find(|s| s.interface == "usb0")
        .unwrap();
    assert_eq!(usb.rate_up_mbps, 0.0);
}

#[test]
fn test_unreadable_counters_do_not_stop_ticks() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);

    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.start();

    counters.fail(true);
    let snapshot = monitor.tick_at(at(0)).unwrap();
    assert!(snapshot.interfaces.is_empty());

    counters.fail(false);
    assert_eq!(monitor.tick_at(at(1)).unwrap().interfaces.len(), 1);
}

#[test]
fn test_interface_selection_filters_samples() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);
    counters.set("wlan0", 0, 0);

    let config = AppConfig {
        interface_selection: vec!["wlan0".to_string()],
        ..AppConfig::default()
    };
    let mut monitor = controller(
        config,
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.start();

    let snapshot = monitor.tick_at(at(0)).unwrap();
    assert_eq!(snapshot.interfaces.len(), 1);
    assert_eq!(snapshot.interfaces[0].interface, "wlan0");
}

#[test]
fn test_missing_privilege_downgrades_to_basic() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);

    let provider = ScriptedProvider::unprivileged();
    let handle = provider.handle.clone();
    let mut monitor = controller(deep_config(), MonitorSettings::default(), &counters, provider);

    let decision = monitor.start();
    assert_eq!(decision.mode, MonitorMode::Basic);
    assert!(decision.downgrade_reason.is_some());
    assert_eq!(handle.starts(), 0);

    let snapshot = monitor.tick_at(at(0)).unwrap();
    assert_eq!(snapshot.mode, MonitorMode::Basic);
    assert!(snapshot.downgrade_reason.is_some());
    assert!(snapshot.flows.is_empty());
    assert!(snapshot.hosts.is_empty());
}

#[test]
fn test_capture_start_failure_downgrades_to_basic() {
    let counters = FakeCounters::default();
    let mut provider = ScriptedProvider::capable();
    provider.fail_start = true;

    let mut monitor = controller(deep_config(), MonitorSettings::default(), &counters, provider);
    let decision = monitor.start();

    assert_eq!(decision.mode, MonitorMode::Basic);
    assert!(decision
        .downgrade_reason
        .unwrap()
        .contains("socket refused"));
}

#[test]
fn test_basic_requested_never_starts_capture() {
    let counters = FakeCounters::default();
    let provider = ScriptedProvider::capable();
    let handle = provider.handle.clone();

    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        provider,
    );
    let decision = monitor.start();

    assert_eq!(decision.mode, MonitorMode::Basic);
    assert!(decision.downgrade_reason.is_none());
    assert_eq!(handle.starts(), 0);
}

#[test]
fn test_deep_mode_aggregates_flows_and_hosts() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);
    let provider = ScriptedProvider::capable();
    let handle = provider.handle.clone();

    let mut monitor = controller(deep_config(), MonitorSettings::default(), &counters, provider);
    assert_eq!(monitor.start().mode, MonitorMode::Deep);

    let host = remote(34);
    handle.push(packet(host, 443, 600, Direction::Outbound, at(0)));
    handle.push(packet(host, 443, 1400, Direction::Inbound, at(0)));
    handle.push(packet(host, 80, 100, Direction::Outbound, at(0)));
    handle.push(packet(remote(35), 443, 50, Direction::Inbound, at(0)));

    let snapshot = monitor.tick_at(at(1)).unwrap();
    assert_eq!(snapshot.mode, MonitorMode::Deep);
    assert_eq!(snapshot.flows.len(), 3);
    assert_eq!(snapshot.hosts.len(), 2);

    let stat = snapshot.hosts.iter().find(|h| h.ip == host).unwrap();
    assert_eq!(stat.total_bytes_up, 700);
    assert_eq!(stat.total_bytes_down, 1400);
    assert_eq!(stat.flow_count, 2);

    // Host totals equal the sum over its flows
    let flows = snapshot.flows_for_remote(host);
    let up: u64 = flows.iter().map(|f| f.bytes_up).sum();
    let down: u64 = flows.iter().map(|f| f.bytes_down).sum();
    assert_eq!((up, down), (stat.total_bytes_up, stat.total_bytes_down));
}

#[test]
fn test_full_queue_drops_oldest_and_counts_them() {
    let counters = FakeCounters::default();
    let provider = ScriptedProvider::capable();
    let handle = provider.handle.clone();

    let settings = MonitorSettings {
        capture_queue_capacity: 1000,
        ..MonitorSettings::default()
    };
    let mut monitor = controller(deep_config(), settings, &counters, provider);
    monitor.start();

    for _ in 0..1500 {
        handle.push(packet(remote(1), 443, 10, Direction::Inbound, at(0)));
    }

    let snapshot = monitor.tick_at(at(1)).unwrap();
    assert_eq!(snapshot.dropped_events, 500);
    assert_eq!(snapshot.flows.len(), 1);
    assert_eq!(snapshot.flows[0].packets_down, 1000);
}

#[test]
fn test_dead_capture_falls_back_to_basic() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);
    let provider = ScriptedProvider::capable();
    let handle = provider.handle.clone();

    let mut monitor = controller(deep_config(), MonitorSettings::default(), &counters, provider);
    monitor.start();
    handle.push(packet(remote(7), 22, 64, Direction::Outbound, at(0)));
    monitor.tick_at(at(0)).unwrap();
    assert_eq!(monitor.live_flow_count(), 1);

    handle.kill();
    let snapshot = monitor.tick_at(at(1)).unwrap();
    assert_eq!(snapshot.mode, MonitorMode::Basic);
    assert!(snapshot
        .downgrade_reason
        .as_deref()
        .unwrap()
        .contains("stopped unexpectedly"));
    assert_eq!(monitor.live_flow_count(), 0);

    // Basic ticks keep going
    counters.set("eth0", 125_000, 0);
    let snapshot = monitor.tick_at(at(2)).unwrap();
    assert_eq!(snapshot.mode, MonitorMode::Basic);
    assert_eq!(snapshot.interfaces.len(), 1);
}

#[test]
fn test_mode_switch_resets_pipeline_state() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);
    let provider = ScriptedProvider::capable();
    let handle = provider.handle.clone();

    let mut monitor = controller(deep_config(), MonitorSettings::default(), &counters, provider);
    monitor.start();

    handle.push(packet(remote(9), 443, 500, Direction::Outbound, at(0)));
    monitor.tick_at(at(0)).unwrap();
    counters.set("eth0", 125_000, 0);
    let before = monitor.tick_at(at(1)).unwrap();
    assert!(before.interfaces[0].rate_up_mbps > 0.0);
    assert!(!before.history.is_empty());

    let mut config = monitor.config().clone();
    config.deep_capture_enabled = false;
    monitor.apply_config(config).unwrap();

    assert_eq!(monitor.mode(), MonitorMode::Basic);
    assert_eq!(monitor.live_flow_count(), 0);
    assert!(!handle.is_running());

    // No rate is computed across the switch
    counters.set("eth0", 250_000, 0);
    let after = monitor.tick_at(at(2)).unwrap();
    assert_eq!(after.interfaces[0].rate_up_mbps, 0.0);
    assert_eq!(after.history.len(), 1);
    assert!(after.flows.is_empty());
}

#[test]
fn test_invalid_config_keeps_previous() {
    let counters = FakeCounters::default();
    let mut monitor = controller(
        AppConfig::default(),
        MonitorSettings::default(),
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.start();

    let mut bad = monitor.config().clone();
    bad.sampling_interval_ms = 10;
    assert!(monitor.apply_config(bad).is_err());
    assert_eq!(monitor.config().sampling_interval_ms, 1000);
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let counters = FakeCounters::default();
    let config = AppConfig {
        retention_days: 0,
        ..AppConfig::default()
    };

    let result = netwatch::core::monitor::MonitorController::new(
        config,
        MonitorSettings::default(),
        counters.sampler(),
        Box::new(ScriptedProvider::capable()),
    );
    assert!(result.is_err());
}

#[test]
fn test_smoothing_applies_to_display_only() {
    let counters = FakeCounters::default();
    counters.set("eth0", 0, 0);

    let settings = MonitorSettings {
        rate_smoothing: 0.5,
        ..MonitorSettings::default()
    };
    let mut monitor = controller(
        AppConfig::default(),
        settings,
        &counters,
        ScriptedProvider::capable(),
    );
    monitor.start();
    monitor.tick_at(at(0)).unwrap();

    counters.set("eth0", 0, 125_000);
    let first = monitor.tick_at(at(1)).unwrap();
    // Halfway between the previous 0 and the raw 1 Mbps
    assert!((first.interfaces[0].rate_down_mbps - 0.5).abs() < 1e-9);

    // Idle second: the displayed rate decays instead of dropping to zero
    let second = monitor.tick_at(at(2)).unwrap();
    assert!((second.interfaces[0].rate_down_mbps - 0.25).abs() < 1e-9);
}
