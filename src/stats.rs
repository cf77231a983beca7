//! Display-side statistics: bounded point buffer, capture rate and snapshot

use crate::capture::CaptureStatus;
use crate::error::{ConstellationError, Result};
use crate::queue::{Sample, SampleQueue};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Stats window tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsConfig {
    /// Capacity of the display buffer
    pub max_points: usize,
    /// Capacity of the timestamp history used for the rate
    pub history_capacity: usize,
    /// Trailing window for the capture rate
    pub time_window: Duration,
    /// Number of most recent points the I/Q ranges are computed over
    pub recent_span: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            max_points: 1500,
            history_capacity: 100,
            time_window: Duration::from_secs(8),
            recent_span: 100,
        }
    }
}

/// Fixed-capacity ring of the most recent samples
pub struct DisplayBuffer {
    data: VecDeque<Sample>,
    max_points: usize,
}

impl DisplayBuffer {
    /// A zero capacity is raised to one; [`StatsWindow::new`] rejects it instead
    pub fn new(max_points: usize) -> Self {
        let max_points = max_points.max(1);
        Self {
            data: VecDeque::with_capacity(max_points),
            max_points,
        }
    }

    /// Append, evicting the oldest sample once full
    pub fn push(&mut self, sample: Sample) {
        if self.data.len() >= self.max_points {
            self.data.pop_front();
        }
        self.data.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_points
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.data.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.data.back()
    }

    /// The last `n` samples (or fewer), oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Sample> + '_ {
        self.data.iter().skip(self.data.len().saturating_sub(n))
    }

    pub fn distinct_points(&self) -> usize {
        self.data.iter().map(Sample::point).collect::<HashSet<_>>().len()
    }
}

/// Per-tick summary handed to the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snapshot {
    pub total_captured: u64,
    pub buffered: usize,
    pub distinct_points: usize,
    pub refresh_count: u64,
    /// Points per second over the trailing window
    pub capture_rate: f64,
    /// max(I) - min(I) over the most recent points
    pub i_range: u16,
    pub q_range: u16,
    /// Samples drained from the queue on this tick
    pub new_samples: usize,
    pub running: bool,
}

impl Snapshot {
    pub fn status_label(&self) -> &'static str {
        if self.running {
            "Running"
        } else {
            "Paused"
        }
    }
}

/// Consumer side of the pipeline, refreshed once per tick
pub struct StatsWindow {
    queue: SampleQueue,
    buffer: DisplayBuffer,
    history: VecDeque<Instant>,
    config: StatsConfig,
    total_captured: u64,
}

impl StatsWindow {
    pub fn new(queue: SampleQueue, config: StatsConfig) -> Result<Self> {
        if config.max_points == 0 {
            return Err(ConstellationError::InvalidParameter(
                "display buffer must hold at least 1 point".to_string(),
            ));
        }

        Ok(Self {
            queue,
            buffer: DisplayBuffer::new(config.max_points),
            history: VecDeque::with_capacity(config.history_capacity),
            config,
            total_captured: 0,
        })
    }

    pub fn queue(&self) -> &SampleQueue {
        &self.queue
    }

    pub fn buffer(&self) -> &DisplayBuffer {
        &self.buffer
    }

    pub fn total_captured(&self) -> u64 {
        self.total_captured
    }

    /// Move everything queued into the display buffer and timestamp history
    ///
    /// Returns the number of samples moved.
    pub fn drain(&mut self) -> usize {
        let drained = self.queue.drain_all();
        for sample in &drained {
            self.buffer.push(*sample);
            if self.config.history_capacity > 0 {
                if self.history.len() >= self.config.history_capacity {
                    self.history.pop_front();
                }
                self.history.push_back(sample.timestamp);
            }
        }
        self.total_captured += drained.len() as u64;
        drained.len()
    }

    /// Points per second seen in the history within the trailing window
    pub fn capture_rate(&self, now: Instant) -> f64 {
        let window = self.config.time_window;
        if window.is_zero() {
            return 0.0;
        }
        let recent = self
            .history
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < window)
            .count();
        recent as f64 / window.as_secs_f64()
    }

    /// I and Q spans over the most recent points
    pub fn recent_ranges(&self) -> (u16, u16) {
        let mut recent = self.buffer.recent(self.config.recent_span).peekable();
        if recent.peek().is_none() {
            return (0, 0);
        }

        let (mut i_min, mut i_max, mut q_min, mut q_max) = (i8::MAX, i8::MIN, i8::MAX, i8::MIN);
        for sample in recent {
            i_min = i_min.min(sample.i);
            i_max = i_max.max(sample.i);
            q_min = q_min.min(sample.q);
            q_max = q_max.max(sample.q);
        }
        (span(i_min, i_max), span(q_min, q_max))
    }

    /// Drain, recompute and summarise
    pub fn tick(&mut self, now: Instant, capture: &CaptureStatus) -> Snapshot {
        let new_samples = self.drain();
        let (i_range, q_range) = self.recent_ranges();

        Snapshot {
            total_captured: self.total_captured,
            buffered: self.buffer.len(),
            distinct_points: self.buffer.distinct_points(),
            refresh_count: capture.refresh_count,
            capture_rate: self.capture_rate(now),
            i_range,
            q_range,
            new_samples,
            running: capture.running,
        }
    }

    /// Empty the display buffer and reset the running total
    ///
    /// Samples still in the queue are kept and show up on the next tick.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.total_captured = 0;
    }
}

fn span(min: i8, max: i8) -> u16 {
    (i16::from(max) - i16::from(min)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: i8, q: i8, timestamp: Instant) -> Sample {
        Sample::new(i, q, timestamp)
    }

    fn window_with(config: StatsConfig) -> StatsWindow {
        StatsWindow::new(SampleQueue::new(), config).unwrap()
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let now = Instant::now();
        let mut buffer = DisplayBuffer::new(3);
        for i in 0..5 {
            buffer.push(sample(i, 0, now));
            assert!(buffer.len() <= 3);
        }
        let kept: Vec<i8> = buffer.iter().map(|s| s.i).collect();
        assert_eq!(kept, vec![2, 3, 4]);
        assert_eq!(buffer.latest().map(|s| s.i), Some(4));
    }

    #[test]
    fn test_buffer_recent() {
        let now = Instant::now();
        let mut buffer = DisplayBuffer::new(10);
        for i in 0..6 {
            buffer.push(sample(i, 0, now));
        }
        let recent: Vec<i8> = buffer.recent(2).map(|s| s.i).collect();
        assert_eq!(recent, vec![4, 5]);
        assert_eq!(buffer.recent(100).count(), 6);
    }

    #[test]
    fn test_distinct_points() {
        let now = Instant::now();
        let mut buffer = DisplayBuffer::new(10);
        buffer.push(sample(1, 1, now));
        buffer.push(sample(1, 1, now));
        buffer.push(sample(1, -1, now));
        assert_eq!(buffer.distinct_points(), 2);
    }

    #[test]
    fn test_tick_drains_queue() {
        let now = Instant::now();
        let mut stats = window_with(StatsConfig::default());
        stats.queue().push(sample(45, -50, now));
        stats.queue().push(sample(-15, 15, now));

        let status = CaptureStatus {
            running: true,
            refresh_count: 4,
            captured: 2,
        };
        let snap = stats.tick(now, &status);
        assert_eq!(snap.new_samples, 2);
        assert_eq!(snap.total_captured, 2);
        assert_eq!(snap.buffered, 2);
        assert_eq!(snap.distinct_points, 2);
        assert_eq!(snap.refresh_count, 4);
        assert_eq!(snap.i_range, 60);
        assert_eq!(snap.q_range, 65);
        assert!(snap.running);
        assert_eq!(snap.status_label(), "Running");

        let snap = stats.tick(now, &status);
        assert_eq!(snap.new_samples, 0);
        assert_eq!(snap.total_captured, 2);
    }

    #[test]
    fn test_buffer_never_exceeds_max_points() {
        let now = Instant::now();
        let mut stats = window_with(StatsConfig {
            max_points: 50,
            ..StatsConfig::default()
        });
        for i in 0..120 {
            stats.queue().push(sample(i as i8, 0, now));
        }
        let snap = stats.tick(now, &CaptureStatus::default());
        assert_eq!(snap.buffered, 50);
        assert_eq!(snap.total_captured, 120);
        assert_eq!(stats.buffer().iter().next().map(|s| s.i), Some(70));
    }

    #[test]
    fn test_rate_empty_history() {
        let stats = window_with(StatsConfig::default());
        assert_eq!(stats.capture_rate(Instant::now()), 0.0);
    }

    #[test]
    fn test_rate_counts_trailing_window() {
        let start = Instant::now();
        let mut stats = window_with(StatsConfig::default());
        for _ in 0..4 {
            stats.queue().push(sample(0, 0, start));
        }
        for _ in 0..12 {
            stats.queue().push(sample(0, 0, start + Duration::from_secs(5)));
        }
        stats.drain();

        assert_eq!(stats.capture_rate(start + Duration::from_secs(5)), 16.0 / 8.0);
        // First four fall out of the 8 s window
        assert_eq!(stats.capture_rate(start + Duration::from_secs(9)), 12.0 / 8.0);
        assert_eq!(stats.capture_rate(start + Duration::from_secs(14)), 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let now = Instant::now();
        let mut stats = window_with(StatsConfig::default());
        for _ in 0..250 {
            stats.queue().push(sample(0, 0, now));
        }
        stats.drain();
        // Only the last 100 timestamps are kept
        assert_eq!(stats.capture_rate(now), 100.0 / 8.0);
    }

    #[test]
    fn test_ranges_use_recent_points_only() {
        let now = Instant::now();
        let mut stats = window_with(StatsConfig::default());
        stats.queue().push(sample(-128, 127, now));
        for _ in 0..100 {
            stats.queue().push(sample(10, 20, now));
        }
        stats.drain();
        assert_eq!(stats.recent_ranges(), (0, 0));

        stats.queue().push(sample(127, -128, now));
        stats.drain();
        assert_eq!(stats.recent_ranges(), (117, 148));
    }

    #[test]
    fn test_full_scale_range() {
        let now = Instant::now();
        let mut stats = window_with(StatsConfig::default());
        stats.queue().push(sample(-128, -128, now));
        stats.queue().push(sample(127, 127, now));
        stats.drain();
        assert_eq!(stats.recent_ranges(), (255, 255));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = StatsConfig {
            max_points: 0,
            ..StatsConfig::default()
        };
        let result = StatsWindow::new(SampleQueue::new(), config);
        assert!(matches!(result, Err(ConstellationError::InvalidParameter(_))));
    }

    #[test]
    fn test_clear_ignores_pending_queue() {
        let now = Instant::now();
        let mut stats = window_with(StatsConfig::default());
        stats.queue().push(sample(1, 1, now));
        stats.drain();
        stats.queue().push(sample(2, 2, now));

        stats.clear();
        assert_eq!(stats.buffer().len(), 0);
        assert_eq!(stats.total_captured(), 0);
        assert_eq!(stats.queue().len(), 1);

        let snap = stats.tick(now, &CaptureStatus::default());
        assert_eq!(snap.buffered, 1);
        assert_eq!(snap.total_captured, 1);
        assert_eq!(snap.status_label(), "Paused");
    }
}
