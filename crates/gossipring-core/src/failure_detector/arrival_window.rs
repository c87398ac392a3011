//! Bounded inter-arrival interval window (C3, §2).

use std::collections::VecDeque;

/// Tracks inter-arrival intervals (nanoseconds) for one endpoint, bounded
/// to `sample_size` entries. Intervals longer than `max_interval_nanos`
/// are discarded rather than recorded, matching the original's
/// `MAX_INTERVAL_IN_NANO` clamp — a single long pause (e.g. GC, a laptop
/// closing the lid) must not poison the mean for a long time afterwards.
#[derive(Debug, Clone)]
pub struct ArrivalWindow {
    intervals: VecDeque<u64>,
    sample_size: usize,
    max_interval_nanos: u64,
    last_arrival_nanos: Option<u64>,
    seed_interval_nanos: u64,
}

impl ArrivalWindow {
    pub fn new(sample_size: usize, max_interval_nanos: u64, seed_interval_nanos: u64) -> Self {
        Self {
            intervals: VecDeque::with_capacity(sample_size),
            sample_size,
            max_interval_nanos,
            last_arrival_nanos: None,
            seed_interval_nanos,
        }
    }

    /// Record an arrival at `now_nanos`. The first arrival only seeds
    /// `last_arrival_nanos`; intervals only start from the second one.
    pub fn add(&mut self, now_nanos: u64) {
        if let Some(last) = self.last_arrival_nanos {
            if now_nanos > last {
                let interval = now_nanos - last;
                if interval <= self.max_interval_nanos {
                    if self.intervals.len() == self.sample_size {
                        self.intervals.pop_front();
                    }
                    self.intervals.push_back(interval);
                }
            }
        }
        self.last_arrival_nanos = Some(now_nanos);
    }

    pub fn last_arrival_nanos(&self) -> Option<u64> {
        self.last_arrival_nanos
    }

    /// Mean of the recorded intervals, falling back to the seed interval
    /// (`2 * gossip_period`) when the window is empty (§2 edge case: first
    /// suspicion before enough samples exist).
    pub fn mean_nanos(&self) -> f64 {
        if self.intervals.is_empty() {
            return self.seed_interval_nanos as f64;
        }
        let sum: u64 = self.intervals.iter().sum();
        sum as f64 / self.intervals.len() as f64
    }

    pub fn sample_len(&self) -> usize {
        self.intervals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_uses_seed() {
        let w = ArrivalWindow::new(10, 1_000_000_000, 2_000);
        assert_eq!(w.mean_nanos(), 2_000.0);
    }

    #[test]
    fn records_intervals_between_arrivals() {
        let mut w = ArrivalWindow::new(10, 1_000_000_000, 2_000);
        w.add(0);
        w.add(100);
        w.add(300);
        assert_eq!(w.sample_len(), 2);
        assert_eq!(w.mean_nanos(), 150.0);
    }

    #[test]
    fn discards_intervals_over_max() {
        let mut w = ArrivalWindow::new(10, 50, 2_000);
        w.add(0);
        w.add(1_000); // interval 1000 > max 50, discarded
        assert_eq!(w.sample_len(), 0);
        assert_eq!(w.last_arrival_nanos(), Some(1_000));
    }

    #[test]
    fn bounded_window_drops_oldest() {
        let mut w = ArrivalWindow::new(2, 1_000_000_000, 2_000);
        w.add(0);
        w.add(10);
        w.add(30);
        w.add(70);
        assert_eq!(w.sample_len(), 2);
    }
}
