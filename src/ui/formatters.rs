use chrono::{DateTime, Local, Utc};

/// Format a rate given in Mbps with an adaptive unit (Kbps, Mbps, Gbps)
pub fn format_rate(mbps: f64) -> String {
    if !mbps.is_finite() || mbps <= 0.0 {
        "0 Kbps".to_string()
    } else if mbps < 1.0 {
        format!("{:.1} Kbps", mbps * 1000.0)
    } else if mbps < 1000.0 {
        format!("{:.2} Mbps", mbps)
    } else {
        format!("{:.2} Gbps", mbps / 1000.0)
    }
}

/// Format a byte count in human-readable format (B, KB, MB, GB)
pub fn format_bytes(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", size as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format timestamp in local time (YYYY-MM-DD HH:MM:SS)
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format a whole number of seconds as `1h 02m`, `3m 05s` or `42s`
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
