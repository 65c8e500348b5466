use anyhow::{Context, Result};
use chrono::Utc;
use clap::ArgMatches;
use colored::Colorize;

/// Execute the prune command
///
/// Without `--days`, the configured retention (after the privacy cap) applies.
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let mut repository = super::open_repository(matches)?;

    let days = match matches.get_one::<u32>("days") {
        Some(days) => *days,
        None => repository
            .load_config_or_default()
            .context("Failed to load configuration")?
            .effective_retention_days(),
    };
    if days == 0 {
        anyhow::bail!("Retention must be at least 1 day");
    }

    let report = repository
        .prune_older_than(days, Utc::now())
        .context("Failed to prune database")?;

    println!(
        "{}",
        format!("Removed rows older than {} days", days).green().bold()
    );
    println!("  Samples:  {}", report.samples);
    println!("  Flows:    {}", report.flows);
    println!("  Hosts:    {}", report.hosts);
    println!("  Triggers: {}", report.triggers);

    if report.total() == 0 {
        println!("{}", "Nothing to remove.".dimmed());
    }
    Ok(())
}
