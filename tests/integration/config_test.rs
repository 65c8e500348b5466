use netwatch::core::config::{AppConfig, MonitorSettings};
use netwatch::core::monitor::{AlertMetric, AlertRule, Operator};
use netwatch::storage::Repository;
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = AppConfig::default();
    assert_eq!(config.sampling_interval_ms, 1000);
    assert_eq!(config.retention_days, 30);
    assert!(!config.deep_capture_enabled);
    assert!(config.interface_selection.is_empty());
    assert!(config.privacy_limit_retention);
    assert_eq!(config.effective_retention_days(), 7);
}

#[test]
fn test_config_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data").join("netwatch.db");

    {
        let repository = Repository::open(&path).unwrap();
        assert!(repository.load_config().unwrap().is_none());

        let updated = AppConfig::default()
            .with_update("interface_selection", "eth0, wlan0")
            .unwrap()
            .with_update("deep_capture_enabled", "yes")
            .unwrap();
        repository.save_config(&updated).unwrap();
    }

    let repository = Repository::open(&path).unwrap();
    let loaded = repository.load_config().unwrap().unwrap();
    assert_eq!(loaded.interface_selection, vec!["eth0", "wlan0"]);
    assert!(loaded.deep_capture_enabled);
}

#[test]
fn test_out_of_range_values_are_rejected() {
    let config = AppConfig::default();

    assert!(config.with_update("sampling_interval_ms", "99").is_err());
    assert!(config.with_update("sampling_interval_ms", "60001").is_err());
    assert!(config.with_update("retention_days", "0").is_err());
    assert!(config.with_update("chart_history_seconds", "5").is_err());
    assert!(config.with_update("sampling_interval_ms", "fast").is_err());
    assert!(config.with_update("no_such_key", "1").is_err());

    // Boundaries are accepted
    assert!(config.with_update("sampling_interval_ms", "100").is_ok());
    assert!(config.with_update("retention_days", "1").is_ok());
}

#[test]
fn test_rejected_update_keeps_stored_config() {
    let repository = Repository::open_in_memory().unwrap();
    let good = AppConfig::default()
        .with_update("sampling_interval_ms", "500")
        .unwrap();
    repository.save_config(&good).unwrap();

    let current = repository.load_config_or_default().unwrap();
    assert!(current.with_update("sampling_interval_ms", "0").is_err());

    assert_eq!(
        repository.load_config_or_default().unwrap().sampling_interval_ms,
        500
    );
}

#[test]
fn test_monitor_settings_validation() {
    assert!(MonitorSettings::default().validate().is_ok());

    let zero_queue = MonitorSettings {
        capture_queue_capacity: 0,
        ..MonitorSettings::default()
    };
    assert!(zero_queue.validate().is_err());

    let bad_smoothing = MonitorSettings {
        rate_smoothing: 1.5,
        ..MonitorSettings::default()
    };
    assert!(bad_smoothing.validate().is_err());
}

#[test]
fn test_rule_management_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let repository = Repository::open(temp_dir.path().join("netwatch.db")).unwrap();

    let rule = AlertRule {
        name: "upload-spike".to_string(),
        metric: AlertMetric::UploadRateMbps,
        operator: Operator::GreaterOrEqual,
        threshold: 20.0,
        duration_seconds: 30,
        enabled: true,
        interface_filter: Some("eth0".to_string()),
    };
    repository.add_rule(&rule).unwrap();
    assert!(repository.add_rule(&rule).is_err());

    assert_eq!(repository.list_rules().unwrap(), vec![rule.clone()]);

    assert!(repository.set_rule_enabled("upload-spike", false).unwrap());
    assert!(!repository.list_rules().unwrap()[0].enabled);
    assert!(!repository.set_rule_enabled("missing", true).unwrap());

    assert!(repository.remove_rule("upload-spike").unwrap());
    assert!(repository.list_rules().unwrap().is_empty());
    assert!(!repository.remove_rule("upload-spike").unwrap());
}
