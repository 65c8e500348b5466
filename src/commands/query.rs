use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::ArgMatches;

use crate::storage::{QueryEntity, TimeRange};

/// Execute the query command, printing one JSON document per row
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let entity: QueryEntity = matches
        .get_one::<String>("entity")
        .context("Entity argument is required")?
        .parse()?;

    let range = time_range(matches, Utc::now())?;
    let interface = matches.get_one::<String>("interface").map(String::as_str);

    let repository = super::open_repository(matches)?;
    let rows = repository
        .query_range(entity, &range, interface)
        .with_context(|| format!("Failed to query {}", entity))?;

    log::debug!(
        "{} {} between {} and {}",
        rows.len(),
        entity,
        range.from,
        range.to
    );

    for line in rows.to_json_lines()? {
        println!("{}", line);
    }
    Ok(())
}

/// Range from `--from/--to` (RFC 3339), falling back to the last
/// `--since` minutes ending at `now`.
pub fn time_range(matches: &ArgMatches, now: DateTime<Utc>) -> Result<TimeRange> {
    let from = matches
        .get_one::<String>("from")
        .map(|s| parse_rfc3339(s))
        .transpose()?;
    let to = matches
        .get_one::<String>("to")
        .map(|s| parse_rfc3339(s))
        .transpose()?;

    let since = || matches.get_one::<u64>("since").copied().unwrap_or(60);

    match (from, to) {
        (Some(from), to) => Ok(TimeRange::new(from, to.unwrap_or(now))?),
        (None, Some(to)) => minutes_before(since(), to),
        (None, None) => minutes_before(since(), now),
    }
}

fn minutes_before(minutes: u64, to: DateTime<Utc>) -> Result<TimeRange> {
    let window = i64::try_from(minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .with_context(|| format!("--since {} minutes is out of range", minutes))?;
    Ok(TimeRange::last(window, to)?)
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid RFC 3339 timestamp: {}", value))
}
