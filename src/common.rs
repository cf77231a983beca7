//! Common utilities shared across programs

use crate::stats::Snapshot;
use std::time::{Duration, Instant};

/// Default period of the display tick
pub const DEFAULT_TICK: Duration = Duration::from_millis(80);

/// Fixed-cadence scheduler for the tick handler
///
/// Each call to [`Ticker::wait`] sleeps until the next deadline. When a tick runs
/// late by more than a whole period the schedule restarts from now instead of
/// firing a burst of catch-up ticks.
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the next deadline has passed; advances the schedule if so
    pub fn is_due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.advance(now);
        true
    }

    /// Sleep until the next deadline
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
        }
        self.advance(Instant::now());
    }

    /// Time left until the next deadline
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    fn advance(&mut self, now: Instant) {
        self.next += self.period;
        if self.next + self.period < now {
            self.next = now + self.period;
        }
    }
}

/// Info block lines for a snapshot
pub fn snapshot_lines(snapshot: &Snapshot) -> Vec<String> {
    if snapshot.buffered == 0 {
        return vec![
            "Waiting for data...".to_string(),
            format!("Refreshes: {}", snapshot.refresh_count),
            format!("Status: {}", snapshot.status_label()),
        ];
    }

    vec![
        format!("Total: {}", snapshot.total_captured),
        format!("Display: {}", snapshot.buffered),
        format!("Unique: {}", snapshot.distinct_points),
        format!("Refreshes: {}", snapshot.refresh_count),
        format!("Rate: {:.1} pts/sec", snapshot.capture_rate),
        format!("I range: {}, Q range: {}", snapshot.i_range, snapshot.q_range),
        format!("New: {}", snapshot.new_samples),
        format!("Status: {}", snapshot.status_label()),
    ]
}

/// Parse a 16-bit hexadecimal value, with or without a `0x` prefix
pub fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|_| format!("Invalid 16-bit hex value: {}", s))
}
