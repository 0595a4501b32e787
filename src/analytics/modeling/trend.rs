use crate::analytics::config::TrendParams;
use crate::analytics::error::{Signal, SkipReason};

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Least-squares slope of `values` against their index.
pub(crate) fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean) * (x - x_mean);
    }
    if den.abs() < 1e-12 {
        0.0
    } else {
        num / den
    }
}

fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

pub struct TrendAnalyzer {
    params: TrendParams,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}

impl TrendAnalyzer {
    pub fn new(params: TrendParams) -> Self {
        Self { params }
    }

    /// mean(last 5) − mean(the 5 before). Fewer than 10 samples yields no signal.
    pub fn learning_velocity(&self, scores: &[f64]) -> Signal<f64> {
        let window = self.params.velocity_window.max(1);
        let required = window * 2;
        if scores.len() < required {
            return Signal::Skipped(SkipReason::InsufficientHistory {
                required,
                available: scores.len(),
            });
        }

        let recent = tail(scores, window);
        let start = scores.len() - window * 2;
        let earlier = &scores[start..start + window];
        Signal::Computed(mean(recent) - mean(earlier))
    }

    /// `max(0, 1 − σ/μ)` over the most recent scores.
    pub fn consistency(&self, scores: &[f64]) -> Signal<f64> {
        if scores.len() < 2 {
            return Signal::Skipped(SkipReason::InsufficientHistory {
                required: 2,
                available: scores.len(),
            });
        }

        let window = tail(scores, self.params.consistency_window.max(2));
        let m = mean(window);
        if m.abs() < f64::EPSILON {
            return Signal::Skipped(SkipReason::ZeroMean);
        }
        let value = 1.0 - std_dev(window) / m;
        Signal::Computed(value.clamp(0.0, 1.0))
    }
}
