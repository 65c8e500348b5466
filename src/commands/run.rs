//! Live monitoring command.
//!
//! Builds the pipeline, hands it to the tick runtime and prints every new
//! snapshot until Ctrl+C (or `--duration`) ends the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::config::{AppConfig, MonitorSettings};
use crate::core::monitor::{CounterSampler, MonitorController, MonitorRuntime, TickSnapshot};
use crate::platform::{get_capture_provider, DnsResolver};
use crate::ui::render_snapshot;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Execute the run command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let repository = super::open_repository(matches)?;
    let stored = repository
        .load_config_or_default()
        .context("Failed to load configuration")?;

    let config = apply_overrides(stored, matches)?;
    let settings = settings_from(matches)?;
    let json_output = matches.get_flag("json");
    let limit = matches
        .get_one::<u64>("duration")
        .map(|secs| Duration::from_secs(*secs));

    let mut controller = MonitorController::new(
        config,
        settings,
        CounterSampler::system(),
        get_capture_provider(),
    )
    .context("Invalid monitor configuration")?
    .with_repository(repository)
    .context("Failed to prepare database")?;

    if !controller.config().privacy_no_hostname {
        controller = controller.with_hostnames(Arc::new(DnsResolver::new()));
    }
    controller
        .reload_rules()
        .context("Failed to load alert rules")?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::Relaxed);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    let mut runtime = MonitorRuntime::new(controller).context("Failed to start monitor")?;

    if !json_output {
        println!("{}", "Monitoring network traffic...".cyan().bold());
        println!("{}", "Press Ctrl+C to stop".dimmed());
    }

    let started = Instant::now();
    while running.load(Ordering::Relaxed) && !runtime.is_finished() {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }

        if runtime.snapshot_rx.has_changed().unwrap_or(false) {
            let snapshot = runtime.snapshot_rx.borrow_and_update().clone();
            if snapshot.tick > 0 {
                print_snapshot(&snapshot, json_output)?;
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    runtime.shutdown().context("Monitoring stopped with an error")?;

    if !json_output {
        println!("{}", "Monitor stopped, all flows flushed.".green());
    }
    Ok(())
}

fn print_snapshot(snapshot: &TickSnapshot, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        render_snapshot(snapshot);
    }
    Ok(())
}

/// Per-run overrides of the persisted configuration. Not saved.
fn apply_overrides(mut config: AppConfig, matches: &ArgMatches) -> Result<AppConfig> {
    if let Some(interval) = matches.get_one::<u64>("interval") {
        config.sampling_interval_ms = *interval;
    }
    if matches.get_flag("deep") {
        config.deep_capture_enabled = true;
    }
    if matches.get_flag("basic") {
        config.deep_capture_enabled = false;
    }
    if let Some(interfaces) = matches.get_many::<String>("interface") {
        config.interface_selection = interfaces.cloned().collect();
    }

    config.validate().context("Invalid command line override")?;
    Ok(config)
}

fn settings_from(matches: &ArgMatches) -> Result<MonitorSettings> {
    let mut settings = MonitorSettings::default();

    if let Some(secs) = matches.get_one::<u64>("staleness") {
        settings.flow_staleness_secs = *secs;
    }
    if let Some(capacity) = matches.get_one::<usize>("queue-capacity") {
        settings.capture_queue_capacity = *capacity;
    }
    if let Some(factor) = matches.get_one::<f64>("smoothing") {
        settings.rate_smoothing = *factor;
    }

    settings.validate()?;
    Ok(settings)
}
