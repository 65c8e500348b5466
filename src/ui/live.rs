use colored::*;

use super::formatters::{format_bytes, format_rate, format_timestamp};
use crate::core::monitor::{HistoryPoint, HostOrder, MonitorMode, PersistStatus, TickSnapshot};

/// Rows printed for hosts and flows in the live view
const TOP_ROWS: usize = 5;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Print one tick as a compact terminal block
pub fn render_snapshot(snapshot: &TickSnapshot) {
    let mode = match snapshot.mode {
        MonitorMode::Basic => "BASIC".yellow().bold(),
        MonitorMode::Deep => "DEEP".green().bold(),
    };

    println!(
        "\n{} {}  {}  tick {}",
        "NETWATCH".bold().bright_cyan(),
        mode,
        format_timestamp(snapshot.timestamp).dimmed(),
        snapshot.tick
    );
    if let Some(reason) = &snapshot.downgrade_reason {
        println!("  {} {}", "Downgraded:".yellow(), reason);
    }
    println!("{}", "=".repeat(72));

    print_interfaces(snapshot);

    if snapshot.mode == MonitorMode::Deep {
        print_hosts(snapshot);
        print_flows(snapshot);
        if snapshot.dropped_events > 0 {
            println!(
                "  {} {} capture events dropped",
                "!".yellow().bold(),
                snapshot.dropped_events
            );
        }
    }

    for trigger in &snapshot.triggers {
        let scope = trigger
            .interface
            .as_deref()
            .map(|i| format!(" on {}", i))
            .unwrap_or_default();
        println!(
            "  {} {}{} (value {:.2})",
            "ALERT".red().bold(),
            trigger.rule_name.bold(),
            scope,
            trigger.value
        );
    }

    if let PersistStatus::Deferred { pending_ticks } = snapshot.persistence {
        println!(
            "  {}",
            format!("Storage unavailable, {} ticks pending", pending_ticks).yellow()
        );
    }
}

fn print_section_header(title: &str) {
    println!("\n{}", title.bold().green());
    println!("{}", "-".repeat(title.len()));
}

fn print_interfaces(snapshot: &TickSnapshot) {
    print_section_header("Interfaces");

    if snapshot.interfaces.is_empty() {
        println!("  {}", "No interfaces sampled".dimmed());
        return;
    }

    for sample in &snapshot.interfaces {
        println!(
            "  {:<16} {} {:>12}  {} {:>12}",
            sample.interface,
            "↑".cyan(),
            format_rate(sample.rate_up_mbps),
            "↓".magenta(),
            format_rate(sample.rate_down_mbps)
        );
    }

    println!(
        "  {:<16} {} {:>12}  {} {:>12}  {}",
        "total".bold(),
        "↑".cyan(),
        format_rate(snapshot.total_up_mbps()),
        "↓".magenta(),
        format_rate(snapshot.total_down_mbps()),
        sparkline(&snapshot.history).dimmed()
    );
}

fn print_hosts(snapshot: &TickSnapshot) {
    print_section_header("Top hosts");

    let hosts = snapshot.top_hosts(TOP_ROWS, HostOrder::TotalBytes);
    if hosts.is_empty() {
        println!("  {}", "No traffic captured yet".dimmed());
        return;
    }

    for host in hosts {
        let name = host.hostname.clone().unwrap_or_else(|| host.ip.to_string());
        println!(
            "  {:<40} ↑ {:>9}  ↓ {:>9}  {} flows",
            name,
            format_bytes(host.total_bytes_up),
            format_bytes(host.total_bytes_down),
            host.flow_count
        );
    }
}

fn print_flows(snapshot: &TickSnapshot) {
    print_section_header("Active flows");

    let mut flows: Vec<_> = snapshot.flows.iter().collect();
    flows.sort_by(|a, b| b.total_bytes().cmp(&a.total_bytes()));

    for flow in flows.into_iter().take(TOP_ROWS) {
        println!(
            "  {:<4} {}:{} -> {}:{}  {}",
            flow.key.protocol.as_str(),
            flow.key.local_ip,
            flow.key.local_port,
            flow.key.remote_ip,
            flow.key.remote_port,
            format_bytes(flow.total_bytes()).dimmed()
        );
    }

    if snapshot.flows.len() > TOP_ROWS {
        println!(
            "  {}",
            format!("... and {} more", snapshot.flows.len() - TOP_ROWS).dimmed()
        );
    }
}

/// Render the combined up+down history as a one-line chart
fn sparkline(history: &[HistoryPoint]) -> String {
    let totals: Vec<f64> = history
        .iter()
        .rev()
        .take(32)
        .map(|p| p.up_mbps + p.down_mbps)
        .collect();

    let peak = totals.iter().cloned().fold(0.0_f64, f64::max);
    if peak <= 0.0 {
        return String::new();
    }

    totals
        .iter()
        .rev()
        .map(|value| {
            let level = ((value / peak) * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}
