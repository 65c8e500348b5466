use anyhow::{Context, Result};
use colored::Colorize;

use crate::core::monitor::{AlertMetric, AlertRule, Operator};

pub fn handle_rules(matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("list", sub_matches)) => list_rules(sub_matches),
        Some(("add", sub_matches)) => add_rule(sub_matches),
        Some(("remove", sub_matches)) => remove_rule(sub_matches),
        Some(("enable", sub_matches)) => set_enabled(sub_matches, true),
        Some(("disable", sub_matches)) => set_enabled(sub_matches, false),
        _ => {
            println!("Use 'netwatch rules --help' for more information.");
            Ok(())
        }
    }
}

fn list_rules(matches: &clap::ArgMatches) -> Result<()> {
    let repository = super::open_repository(matches)?;
    let rules = repository.list_rules().context("Failed to load alert rules")?;

    if matches.get_flag("json") {
        for rule in &rules {
            println!("{}", serde_json::to_string(rule)?);
        }
        return Ok(());
    }

    if rules.is_empty() {
        println!("{}", "No alert rules defined.".yellow());
        println!(
            "  {}",
            "netwatch rules add high-download --metric download_rate_mbps --op '>' --threshold 50"
                .dimmed()
        );
        return Ok(());
    }

    println!("\n{}", "Alert rules".bold().green());
    println!("{}", "-".repeat(11));
    for rule in &rules {
        let state = if rule.enabled {
            "on ".green()
        } else {
            "off".dimmed()
        };
        let scope = rule
            .interface_filter
            .as_deref()
            .map(|i| format!(" [{}]", i))
            .unwrap_or_default();
        println!(
            "  {} {:<24} {} {} {} for {}s{}",
            state,
            rule.name.bold(),
            rule.metric.as_str(),
            rule.operator.as_str(),
            rule.threshold,
            rule.duration_seconds,
            scope
        );
    }
    println!();
    Ok(())
}

fn add_rule(matches: &clap::ArgMatches) -> Result<()> {
    let rule = rule_from(matches)?;

    let repository = super::open_repository(matches)?;
    repository.add_rule(&rule)?;

    println!("{} {}", "✓ Added rule".green(), rule.name.bold());
    Ok(())
}

fn remove_rule(matches: &clap::ArgMatches) -> Result<()> {
    let name = matches
        .get_one::<String>("name")
        .context("Name argument is required")?;

    let repository = super::open_repository(matches)?;
    if !repository.remove_rule(name)? {
        anyhow::bail!("No alert rule named '{}'", name);
    }

    println!("{} {}", "✓ Removed rule".green(), name.bold());
    Ok(())
}

fn set_enabled(matches: &clap::ArgMatches, enabled: bool) -> Result<()> {
    let name = matches
        .get_one::<String>("name")
        .context("Name argument is required")?;

    let repository = super::open_repository(matches)?;
    if !repository.set_rule_enabled(name, enabled)? {
        anyhow::bail!("No alert rule named '{}'", name);
    }

    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!("{} {}", format!("✓ {} rule", verb).green(), name.bold());
    Ok(())
}

/// Build a rule from `rules add` arguments
pub fn rule_from(matches: &clap::ArgMatches) -> Result<AlertRule> {
    let name = matches
        .get_one::<String>("name")
        .context("Name argument is required")?;
    let metric: AlertMetric = matches
        .get_one::<String>("metric")
        .context("Metric argument is required")?
        .parse()?;
    let operator: Operator = matches
        .get_one::<String>("op")
        .context("Operator argument is required")?
        .parse()?;
    let threshold = *matches
        .get_one::<f64>("threshold")
        .context("Threshold argument is required")?;
    let duration_seconds = matches.get_one::<u64>("duration").copied().unwrap_or(0);

    let rule = AlertRule {
        name: name.clone(),
        metric,
        operator,
        threshold,
        duration_seconds,
        enabled: !matches.get_flag("disabled"),
        interface_filter: matches.get_one::<String>("interface").cloned(),
    };
    rule.validate()?;

    if rule.interface_filter.is_some() && !rule.metric.is_per_interface() {
        println!(
            "{}",
            format!(
                "Note: {} is host-wide, the interface filter is ignored",
                rule.metric.as_str()
            )
            .yellow()
        );
    }
    Ok(rule)
}
