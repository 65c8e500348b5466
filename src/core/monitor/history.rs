use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::rate::Rate;

const DEFAULT_WINDOW_SECONDS: u64 = 300;

/// One chart point: summed rates over the selected interfaces
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub up_mbps: f64,
    pub down_mbps: f64,
}

/// Sliding time window of total rates for the live chart
#[derive(Debug, Clone)]
pub struct RateHistory {
    window: Duration,
    points: VecDeque<HistoryPoint>,
}

impl RateHistory {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW_SECONDS)
    }

    pub fn with_window(seconds: u64) -> Self {
        Self {
            window: window_of(seconds),
            points: VecDeque::new(),
        }
    }

    pub fn set_window(&mut self, seconds: u64) {
        self.window = window_of(seconds);
        if let Some(latest) = self.points.back().map(|p| p.timestamp) {
            self.trim(latest);
        }
    }

    pub fn push(&mut self, timestamp: DateTime<Utc>, rate: Rate) {
        self.points.push_back(HistoryPoint {
            timestamp,
            up_mbps: rate.up_mbps,
            down_mbps: rate.down_mbps,
        });
        self.trim(timestamp);
    }

    fn trim(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = now.checked_sub_signed(self.window) else {
            return;
        };
        while self.points.front().is_some_and(|p| p.timestamp < cutoff) {
            self.points.pop_front();
        }
    }

    pub fn points(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

fn window_of(seconds: u64) -> Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl Default for RateHistory {
    fn default() -> Self {
        Self::new()
    }
}
