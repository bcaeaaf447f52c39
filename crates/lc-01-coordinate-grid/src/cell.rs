//! Per-cell statistics.

use crate::{SUCCESS_EMA_ALPHA, WINDOW_SECONDS};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Counters and the operations window for one grid cell.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CellStats {
    /// Contracts currently OPEN/ACCEPTED/IN_TRANSIT in this cell.
    pub active_contracts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Timestamp of the most recent operation (seconds).
    pub last_activity: f64,
    /// Exponential moving success rate in [0, 1].
    pub ema_success_rate: f64,
    /// Rolling mean of delivery durations in seconds.
    pub avg_duration_s: f64,
    /// Operation timestamps inside the rolling window.
    window: VecDeque<f64>,
}

impl CellStats {
    /// Drop window samples older than the horizon and report the remaining
    /// count.
    pub fn prune_window(&mut self, now: f64) -> usize {
        while let Some(&oldest) = self.window.front() {
            if now - oldest > WINDOW_SECONDS {
                self.window.pop_front();
            } else {
                break;
            }
        }
        self.window.len()
    }

    /// Record one operation at `now`. The caller has already checked the cap.
    pub fn record_op(&mut self, now: f64) {
        self.window.push_back(now);
        self.last_activity = now;
    }

    /// Fold one delivery outcome into the moving success rate.
    pub fn record_outcome(&mut self, success: bool, duration_s: f64) {
        let sample = if success { 1.0 } else { 0.0 };
        self.ema_success_rate =
            SUCCESS_EMA_ALPHA * sample + (1.0 - SUCCESS_EMA_ALPHA) * self.ema_success_rate;
        if success {
            self.successes += 1;
            // Rolling mean over completed deliveries only.
            let n = self.successes as f64;
            self.avg_duration_s += (duration_s - self.avg_duration_s) / n;
        } else {
            self.failures += 1;
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_prunes_old_samples() {
        let mut stats = CellStats::default();
        stats.record_op(0.0);
        stats.record_op(30.0);
        stats.record_op(59.0);
        assert_eq!(stats.prune_window(61.0), 2);
        assert_eq!(stats.prune_window(200.0), 0);
    }

    #[test]
    fn test_ema_moves_toward_outcomes() {
        let mut stats = CellStats::default();
        for _ in 0..50 {
            stats.record_outcome(true, 100.0);
        }
        assert!(stats.ema_success_rate > 0.9);
        for _ in 0..50 {
            stats.record_outcome(false, 0.0);
        }
        assert!(stats.ema_success_rate < 0.1);
    }

    #[test]
    fn test_avg_duration_is_mean_of_successes() {
        let mut stats = CellStats::default();
        stats.record_outcome(true, 100.0);
        stats.record_outcome(true, 200.0);
        stats.record_outcome(false, 9999.0);
        assert!((stats.avg_duration_s - 150.0).abs() < 1e-9);
    }
}
