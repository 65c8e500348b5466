//! Counter-to-rate conversion.
//!
//! Stateless: the map of previous readings lives with the caller so a mode
//! switch can clear it in one step.

use super::model::InterfaceCounters;

const BITS_PER_BYTE: f64 = 8.0;
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Upload and download rate in Mbps
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rate {
    pub up_mbps: f64,
    pub down_mbps: f64,
}

impl Rate {
    pub const ZERO: Rate = Rate {
        up_mbps: 0.0,
        down_mbps: 0.0,
    };
}

/// Rate between two consecutive readings of the same interface.
///
/// `elapsed_secs` must be the measured gap between the two reads. Returns
/// zero for a first-ever reading (`prev` is `None`), a counter restart, or a
/// non-positive elapsed time.
pub fn compute_rate(
    prev: Option<&InterfaceCounters>,
    curr: &InterfaceCounters,
    elapsed_secs: f64,
) -> Rate {
    let Some(prev) = prev else {
        return Rate::ZERO;
    };

    if curr.is_reset_from(prev) || !elapsed_secs.is_finite() || elapsed_secs <= 0.0 {
        return Rate::ZERO;
    }

    let sent = curr.bytes_sent - prev.bytes_sent;
    let recv = curr.bytes_recv - prev.bytes_recv;

    Rate {
        up_mbps: to_mbps(sent, elapsed_secs),
        down_mbps: to_mbps(recv, elapsed_secs),
    }
}

fn to_mbps(delta_bytes: u64, elapsed_secs: f64) -> f64 {
    BITS_PER_BYTE * delta_bytes as f64 / elapsed_secs / BITS_PER_MEGABIT
}

/// Exponential smoothing for displayed rates. `alpha = 1.0` returns `current`.
pub fn smooth_rate(previous: Rate, current: Rate, alpha: f64) -> Rate {
    let alpha = alpha.clamp(0.0, 1.0);
    Rate {
        up_mbps: alpha * current.up_mbps + (1.0 - alpha) * previous.up_mbps,
        down_mbps: alpha * current.down_mbps + (1.0 - alpha) * previous.down_mbps,
    }
}
