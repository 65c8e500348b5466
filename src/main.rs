use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

use netwatch::commands;
use netwatch::core::config::{MAX_FLOW_STALENESS_SECS, MAX_RETENTION_DAYS};

fn main() -> Result<()> {
    netwatch::init_logging();

    let matches = build_cli().get_matches();

    if matches.get_flag("version") {
        println!("netwatch version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match matches.subcommand() {
        Some(("run", sub_matches)) => commands::run(sub_matches)?,
        Some(("caps", sub_matches)) => commands::caps(sub_matches)?,
        Some(("query", sub_matches)) => commands::query(sub_matches)?,
        Some(("prune", sub_matches)) => commands::prune(sub_matches)?,
        Some(("config", sub_matches)) => commands::config::handle_config(sub_matches)?,
        Some(("rules", sub_matches)) => commands::rules::handle_rules(sub_matches)?,
        Some(("version", _)) => {
            println!("netwatch version {}", env!("CARGO_PKG_VERSION"));
        }
        _ => {
            println!("Welcome to netwatch!");
            println!("Use 'netwatch --help' for more information.");
        }
    }

    Ok(())
}

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .help("Output as JSON")
        .action(ArgAction::SetTrue)
}

fn rule_name_arg() -> Arg {
    Arg::new("name")
        .help("Rule name")
        .required(true)
        .index(1)
}

fn build_cli() -> Command {
    Command::new("netwatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Host network monitor: interface rates, flows, hosts and alerts")
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('v')
                .short_alias('V')
                .long("version")
                .help("Print version information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .help("SQLite database file (defaults to the user data directory)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Monitor network traffic live")
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .value_name("MS")
                        .help("Sampling interval in milliseconds (100-60000)")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("deep")
                        .long("deep")
                        .help("Request deep capture (flows and hosts)")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("basic"),
                )
                .arg(
                    Arg::new("basic")
                        .long("basic")
                        .help("Interface counters only")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("interface")
                        .short('n')
                        .long("interface")
                        .value_name("NAME")
                        .help("Only monitor this interface (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("staleness")
                        .long("staleness")
                        .value_name("SECONDS")
                        .help("Inactivity before a flow is closed (default: 120)")
                        .value_parser(clap::value_parser!(u64).range(1..=MAX_FLOW_STALENESS_SECS)),
                )
                .arg(
                    Arg::new("queue-capacity")
                        .long("queue-capacity")
                        .value_name("EVENTS")
                        .help("Capture queue size before oldest events are dropped (default: 10000)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("smoothing")
                        .long("smoothing")
                        .value_name("FACTOR")
                        .help("Smoothing factor for displayed rates, 1.0 = raw (default: 1.0)")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("duration")
                        .short('d')
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(json_flag().help("Print each snapshot as a JSON line")),
        )
        .subcommand(
            Command::new("caps")
                .about("Show capture capabilities and interfaces")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("query")
                .about("Print stored rows as JSON lines")
                .arg(
                    Arg::new("entity")
                        .help("What to query")
                        .required(true)
                        .value_parser(["samples", "flows", "hosts", "triggers"])
                        .index(1),
                )
                .arg(
                    Arg::new("since")
                        .short('s')
                        .long("since")
                        .value_name("MINUTES")
                        .help("Window length in minutes (default: 60)")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("RFC3339")
                        .help("Range start, e.g. 2024-05-01T10:00:00Z"),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_name("RFC3339")
                        .help("Range end (defaults to now)"),
                )
                .arg(
                    Arg::new("interface")
                        .short('n')
                        .long("interface")
                        .value_name("NAME")
                        .help("Only samples of this interface"),
                ),
        )
        .subcommand(
            Command::new("prune")
                .about("Delete stored data older than the retention period")
                .arg(
                    Arg::new("days")
                        .long("days")
                        .value_name("DAYS")
                        .help("Override the configured retention")
                        .value_parser(
                            clap::value_parser!(u32).range(1..=i64::from(MAX_RETENTION_DAYS)),
                        ),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Show or change configuration (use 'netwatch config --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the current configuration")
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("set")
                        .about("Set a configuration value")
                        .long_about("Set a configuration value\n\nKEYS:\n    sampling_interval_ms     100-60000\n    retention_days           1-3650\n    deep_capture_enabled     true|false\n    interface_selection      comma separated names, empty for all\n    privacy_no_hostname      true|false\n    privacy_limit_retention  true|false (caps retention at 7 days)\n    chart_history_seconds    10-86400")
                        .arg(Arg::new("key").help("Configuration key").required(true).index(1))
                        .arg(Arg::new("value").help("New value").required(true).index(2)),
                )
                .subcommand(Command::new("reset").about("Restore default configuration")),
        )
        .subcommand(
            Command::new("rules")
                .about("Manage alert rules (use 'netwatch rules --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("list")
                        .about("List alert rules")
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("add")
                        .about("Add an alert rule")
                        .arg(rule_name_arg())
                        .arg(
                            Arg::new("metric")
                                .short('m')
                                .long("metric")
                                .required(true)
                                .help("Metric to watch")
                                .value_parser([
                                    "upload_rate_mbps",
                                    "download_rate_mbps",
                                    "total_rate_mbps",
                                    "active_flows",
                                    "active_hosts",
                                    "dropped_events",
                                ]),
                        )
                        .arg(
                            Arg::new("op")
                                .short('o')
                                .long("op")
                                .required(true)
                                .help("Comparison operator")
                                .value_parser([">", ">=", "<", "<=", "=="]),
                        )
                        .arg(
                            Arg::new("threshold")
                                .short('t')
                                .long("threshold")
                                .required(true)
                                .allow_negative_numbers(true)
                                .value_parser(clap::value_parser!(f64)),
                        )
                        .arg(
                            Arg::new("duration")
                                .short('d')
                                .long("duration")
                                .value_name("SECONDS")
                                .help("Seconds the condition must hold (default: 0)")
                                .value_parser(clap::value_parser!(u64)),
                        )
                        .arg(
                            Arg::new("interface")
                                .short('n')
                                .long("interface")
                                .value_name("NAME")
                                .help("Restrict rate metrics to one interface"),
                        )
                        .arg(
                            Arg::new("disabled")
                                .long("disabled")
                                .help("Create the rule disabled")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Delete an alert rule and its triggers")
                        .arg(rule_name_arg()),
                )
                .subcommand(
                    Command::new("enable")
                        .about("Enable an alert rule")
                        .arg(rule_name_arg()),
                )
                .subcommand(
                    Command::new("disable")
                        .about("Disable an alert rule")
                        .arg(rule_name_arg()),
                ),
        )
        .subcommand(Command::new("version").about("Shows version information"))
}
