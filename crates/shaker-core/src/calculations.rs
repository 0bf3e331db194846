//! Screen utilization, screen life and drop detection heuristics.
//!
//! These are proportional placeholder models driven by configurable
//! coefficients. They are not physical estimates of screen wear.

use serde::{Deserialize, Serialize};

use crate::formatting::round_to;

/// Default absolute load change (percentage points) that counts as a drop.
pub const DEFAULT_DROP_THRESHOLD: f64 = 5.0;
/// Default multiplier turning unused utilization into remaining screen life.
pub const DEFAULT_SCREEN_LIFE_FACTOR: f64 = 1.5;

/// Tunable coefficients of the heuristic models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicCoefficients {
    pub drop_threshold: f64,
    pub screen_life_factor: f64,
}

impl Default for HeuristicCoefficients {
    fn default() -> Self {
        Self {
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            screen_life_factor: DEFAULT_SCREEN_LIFE_FACTOR,
        }
    }
}

/// `round(avg_load / 100 * threshold, 2)`.
pub fn utilization(avg_load: f64, threshold: f64) -> f64 {
    round_to(avg_load / 100.0 * threshold, 2)
}

/// `round((100 - screen_utilization) * factor, 1)`.
pub fn screen_life_remaining(screen_utilization: f64, factor: f64) -> f64 {
    round_to((100.0 - screen_utilization) * factor, 1)
}

/// Mark each load whose absolute change from the previous one exceeds
/// `threshold`. The first element has no predecessor and is never a drop.
pub fn drop_flags(loads: &[f64], threshold: f64) -> Vec<bool> {
    let mut flags = Vec::with_capacity(loads.len());
    let mut previous: Option<f64> = None;
    for &load in loads {
        let flag = previous.is_some_and(|prev| (load - prev).abs() > threshold);
        flags.push(flag);
        previous = Some(load);
    }
    flags
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Largest value, `None` for an empty iterator.
pub fn max_value(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values.into_iter().fold(None, |acc, v| match acc {
        Some(m) if m >= v => Some(m),
        _ => Some(v),
    })
}
