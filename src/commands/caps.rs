use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::core::monitor::CounterSampler;
use crate::platform::{capabilities, CapabilityReport};

#[derive(Serialize)]
struct CapsOutput {
    #[serde(flatten)]
    report: CapabilityReport,
    interfaces: Vec<String>,
}

/// Execute the caps command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let report = capabilities();
    let interfaces = CounterSampler::system()
        .interface_names()
        .context("Failed to list network interfaces")?;

    if matches.get_flag("json") {
        let output = CapsOutput { report, interfaces };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("\n{}", "CAPTURE CAPABILITIES".bold().bright_cyan());
    println!("{}", "=".repeat(40));
    println!("  Platform:          {}", report.platform);
    println!("  Elevated:          {}", yes_no(report.is_elevated));
    println!("  Capture privilege: {}", yes_no(report.capture_privilege));
    println!(
        "  Backend:           {}",
        report.backend.unwrap_or("none")
    );
    println!("  Driver:            {}", yes_no(report.driver_available));
    println!("  {}", report.driver_message.dimmed());

    if report.deep_capture_possible {
        println!("\n{}", "✓ Deep capture is available".green().bold());
    } else {
        println!(
            "\n{}",
            "Deep capture unavailable, monitoring will run in basic mode".yellow()
        );
        if !report.capture_privilege {
            println!(
                "  {}",
                "Run as administrator/root or grant CAP_NET_RAW to enable it".dimmed()
            );
        }
    }

    println!("\n{}", "Interfaces".bold().green());
    println!("{}", "-".repeat(10));
    if interfaces.is_empty() {
        println!("  {}", "No interfaces found".dimmed());
    }
    for name in &interfaces {
        println!("  {}", name);
    }
    println!();
    Ok(())
}

fn yes_no(value: bool) -> ColoredString {
    if value {
        "yes".green()
    } else {
        "no".red()
    }
}
