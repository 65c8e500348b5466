use anyhow::{Context, Result};
use colored::Colorize;

use crate::core::config::AppConfig;

pub fn handle_config(matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", sub_matches)) => show_config(sub_matches),
        Some(("set", sub_matches)) => set_value(sub_matches),
        Some(("reset", sub_matches)) => reset_config(sub_matches),
        _ => {
            println!("Use 'netwatch config --help' for more information.");
            Ok(())
        }
    }
}

fn show_config(matches: &clap::ArgMatches) -> Result<()> {
    let repository = super::open_repository(matches)?;
    let stored = repository.load_config().context("Failed to load configuration")?;

    if matches.get_flag("json") {
        let config = stored.unwrap_or_default();
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if stored.is_none() {
        println!(
            "{}",
            "No configuration saved yet, showing defaults.".dimmed()
        );
    }
    print_config(&stored.unwrap_or_default());
    Ok(())
}

/// Validate and persist a single `key value` update.
///
/// A rejected value leaves the stored configuration untouched.
fn set_value(matches: &clap::ArgMatches) -> Result<()> {
    let key = matches
        .get_one::<String>("key")
        .context("Key argument is required")?;
    let value = matches
        .get_one::<String>("value")
        .context("Value argument is required")?;

    let repository = super::open_repository(matches)?;
    let current = repository
        .load_config_or_default()
        .context("Failed to load configuration")?;

    let updated = match current.with_update(key, value) {
        Ok(updated) => updated,
        Err(e) => {
            println!("{} {}", "✗ Rejected:".red().bold(), e);
            return Err(e.into());
        }
    };

    repository
        .save_config(&updated)
        .context("Failed to save configuration")?;

    println!("{} {} = {}", "✓ Updated".green(), key.bold(), value.cyan());
    if key == "retention_days" && updated.effective_retention_days() < updated.retention_days {
        println!(
            "{}",
            format!(
                "Privacy retention limit is on: data is kept for {} days",
                updated.effective_retention_days()
            )
            .yellow()
        );
    }
    Ok(())
}

fn reset_config(matches: &clap::ArgMatches) -> Result<()> {
    let repository = super::open_repository(matches)?;
    repository
        .save_config(&AppConfig::default())
        .context("Failed to save configuration")?;

    println!("{}", "✓ Configuration reset to defaults".green());
    Ok(())
}

fn print_config(config: &AppConfig) {
    let interfaces = if config.interface_selection.is_empty() {
        "all".to_string()
    } else {
        config.interface_selection.join(", ")
    };

    println!("\n{}", "Configuration".bold().green());
    println!("{}", "-".repeat(13));
    println!("  sampling_interval_ms     {}", config.sampling_interval_ms);
    println!(
        "  retention_days           {} (effective {})",
        config.retention_days,
        config.effective_retention_days()
    );
    println!("  deep_capture_enabled     {}", config.deep_capture_enabled);
    println!("  interface_selection      {}", interfaces);
    println!("  privacy_no_hostname      {}", config.privacy_no_hostname);
    println!("  privacy_limit_retention  {}", config.privacy_limit_retention);
    println!("  chart_history_seconds    {}", config.chart_history_seconds);
    println!();
}
