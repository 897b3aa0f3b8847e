//! Trend classification over a pair of window averages.
//!
//! Pure functions only: the scheduler recomputes the trend on every snapshot
//! from the aggregator's `(current average, previous average)` pair.

use serde::Serialize;

pub const DEFAULT_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendResult {
    pub direction: TrendDirection,
    /// Magnitude of the change, rounded to a whole percent.
    pub percentage: u32,
}

impl TrendResult {
    pub fn stable() -> Self {
        Self {
            direction: TrendDirection::Stable,
            percentage: 0,
        }
    }
}

/// Compare the current window average against the previous one.
///
/// A zero previous average means there is no prior window to compare against,
/// so the result is `stable, 0%` rather than a fabricated trend. Deltas within
/// `epsilon` of zero are reported stable to avoid flapping on noise.
pub fn classify(current: f64, previous: f64, epsilon: f64) -> TrendResult {
    if previous == 0.0 {
        return TrendResult::stable();
    }

    let delta = (current - previous) / previous;
    let direction = if delta > epsilon {
        TrendDirection::Up
    } else if delta < -epsilon {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    };

    TrendResult {
        direction,
        percentage: (delta.abs() * 100.0).round() as u32,
    }
}
