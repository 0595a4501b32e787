use crate::analytics::config::DifficultyParams;
use crate::analytics::error::ValidationError;
use crate::analytics::modeling::trend::mean;
use crate::analytics::types::{DifficultyAdjustmentDecision, DifficultyReason};

/// Rule table from average accuracy and short-term trend to a raw delta.
pub fn base_adjustment(average: f64, trend: f64) -> (f64, DifficultyReason) {
    if average >= 0.85 {
        if trend >= 0.0 {
            (0.2, DifficultyReason::HighAccuracyPositiveTrend)
        } else {
            (0.1, DifficultyReason::HighAccuracyNegativeTrend)
        }
    } else if average >= 0.65 {
        if trend > 0.1 {
            (0.1, DifficultyReason::GoodAccuracyImproving)
        } else if trend < -0.1 {
            (-0.1, DifficultyReason::GoodAccuracyDeclining)
        } else {
            (0.0, DifficultyReason::StablePerformance)
        }
    } else if average >= 0.45 {
        (-0.3, DifficultyReason::ModerateAccuracy)
    } else {
        (-0.5, DifficultyReason::LowAccuracy)
    }
}

pub struct DifficultyPolicy {
    params: DifficultyParams,
}

impl Default for DifficultyPolicy {
    fn default() -> Self {
        Self::new(DifficultyParams::default())
    }
}

impl DifficultyPolicy {
    pub fn new(params: DifficultyParams) -> Self {
        Self { params }
    }

    /// mean(last 3) − mean(previous 3); zero below six samples.
    pub fn short_trend(&self, samples: &[f64]) -> f64 {
        let w = self.params.trend_window.max(1);
        if samples.len() < w * 2 {
            return 0.0;
        }
        let n = samples.len();
        mean(&samples[n - w..]) - mean(&samples[n - 2 * w..n - w])
    }

    /// `accuracies` are ordered oldest first; only the most recent window is used.
    pub fn recommend(
        &self,
        current: f64,
        accuracies: &[f64],
        has_learning_pattern: bool,
    ) -> Result<DifficultyAdjustmentDecision, ValidationError> {
        let (min, max) = (self.params.min_difficulty, self.params.max_difficulty);
        if !current.is_finite() || current < min || current > max {
            return Err(ValidationError::DifficultyOutOfRange(current));
        }

        let confidence = if has_learning_pattern {
            self.params.pattern_confidence
        } else {
            self.params.base_confidence
        };

        let skip = accuracies.len().saturating_sub(self.params.sample_window);
        let samples: Vec<f64> = accuracies[skip..]
            .iter()
            .map(|a| if a.is_nan() { 0.0 } else { a.clamp(0.0, 1.0) })
            .collect();

        if samples.is_empty() {
            return Ok(DifficultyAdjustmentDecision {
                current,
                recommended: current,
                delta: 0.0,
                reason: DifficultyReason::InsufficientData,
                confidence,
                average_accuracy: 0.0,
                trend: 0.0,
                sample_count: 0,
                struggle_penalty_applied: false,
            });
        }

        let average = mean(&samples);
        let trend = self.short_trend(&samples);
        let (mut delta, reason) = base_adjustment(average, trend);

        let struggle = samples.len() >= self.params.struggle_min_samples
            && average < self.params.struggle_threshold;
        if struggle {
            delta -= self.params.struggle_penalty;
        }

        // Unrounded so that `recommended == current + delta` holds exactly up to float error.
        let recommended = (current + delta).clamp(min, max);

        Ok(DifficultyAdjustmentDecision {
            current,
            recommended,
            delta: recommended - current,
            reason,
            confidence,
            average_accuracy: average,
            trend,
            sample_count: samples.len(),
            struggle_penalty_applied: struggle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_high_accuracy_positive_trend() {
        let policy = DifficultyPolicy::default();
        let samples = [0.9; 10];
        let d = policy.recommend(2.0, &samples, false).unwrap();
        assert!(approx(d.recommended, 2.2));
        assert!(approx(d.delta, 0.2));
        assert_eq!(d.reason, DifficultyReason::HighAccuracyPositiveTrend);
        assert_eq!(d.reason.as_str(), "high accuracy, positive trend");
        assert_eq!(d.confidence, 0.6);
        assert!(!d.struggle_penalty_applied);
    }

    #[test]
    fn test_high_accuracy_negative_trend() {
        let policy = DifficultyPolicy::default();
        let samples = [1.0, 1.0, 1.0, 0.9, 0.85, 0.85];
        let d = policy.recommend(3.0, &samples, true).unwrap();
        assert_eq!(d.reason, DifficultyReason::HighAccuracyNegativeTrend);
        assert!(approx(d.recommended, 3.1));
        assert_eq!(d.confidence, 0.8);
    }

    #[test]
    fn test_rule_table_boundaries() {
        assert_eq!(base_adjustment(0.85, 0.0).0, 0.2);
        assert_eq!(base_adjustment(0.8499, 0.0), (0.0, DifficultyReason::StablePerformance));
        assert_eq!(base_adjustment(0.7, 0.11).1, DifficultyReason::GoodAccuracyImproving);
        assert_eq!(base_adjustment(0.7, 0.1).1, DifficultyReason::StablePerformance);
        assert_eq!(base_adjustment(0.7, -0.1).1, DifficultyReason::StablePerformance);
        assert_eq!(base_adjustment(0.7, -0.11), (-0.1, DifficultyReason::GoodAccuracyDeclining));
        assert_eq!(base_adjustment(0.65, 0.0).1, DifficultyReason::StablePerformance);
        assert_eq!(base_adjustment(0.6499, 0.0), (-0.3, DifficultyReason::ModerateAccuracy));
        assert_eq!(base_adjustment(0.45, 0.0).0, -0.3);
        assert_eq!(base_adjustment(0.4499, 0.0), (-0.5, DifficultyReason::LowAccuracy));
    }

    #[test]
    fn test_struggle_penalty_needs_five_samples() {
        let policy = DifficultyPolicy::default();
        let four = policy.recommend(3.0, &[0.5; 4], false).unwrap();
        assert!(approx(four.recommended, 2.7));
        assert!(!four.struggle_penalty_applied);

        let five = policy.recommend(3.0, &[0.5; 5], false).unwrap();
        assert!(approx(five.recommended, 2.6));
        assert!(five.struggle_penalty_applied);

        let low = policy.recommend(3.0, &[0.2; 8], false).unwrap();
        assert!(approx(low.recommended, 2.4));
        assert_eq!(low.reason, DifficultyReason::LowAccuracy);
    }

    #[test]
    fn test_result_clamped_to_range() {
        let policy = DifficultyPolicy::default();
        let top = policy.recommend(5.0, &[1.0; 10], false).unwrap();
        assert_eq!(top.recommended, 5.0);
        assert_eq!(top.delta, 0.0);

        let bottom = policy.recommend(1.2, &[0.1; 10], false).unwrap();
        assert_eq!(bottom.recommended, 1.0);
        assert!(approx(bottom.delta, -0.2));
    }

    #[test]
    fn test_only_last_ten_samples_count() {
        let policy = DifficultyPolicy::default();
        let mut samples = vec![0.0; 20];
        samples.extend([0.95; 10]);
        let d = policy.recommend(2.0, &samples, false).unwrap();
        assert_eq!(d.sample_count, 10);
        assert_eq!(d.reason, DifficultyReason::HighAccuracyPositiveTrend);
    }

    #[test]
    fn test_short_trend_window() {
        let policy = DifficultyPolicy::default();
        assert_eq!(policy.short_trend(&[0.1, 0.9, 0.9, 0.9, 0.9]), 0.0);
        let t = policy.short_trend(&[0.5, 0.5, 0.5, 0.8, 0.8, 0.8]);
        assert!((t - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_empty_samples_keep_current() {
        let policy = DifficultyPolicy::default();
        let d = policy.recommend(3.5, &[], false).unwrap();
        assert_eq!(d.recommended, 3.5);
        assert_eq!(d.reason, DifficultyReason::InsufficientData);
    }

    #[test]
    fn test_out_of_range_current_is_rejected() {
        let policy = DifficultyPolicy::default();
        assert_eq!(
            policy.recommend(0.5, &[0.9], false).unwrap_err(),
            ValidationError::DifficultyOutOfRange(0.5)
        );
        assert!(policy.recommend(f64::NAN, &[0.9], false).is_err());
        assert!(policy.recommend(5.01, &[0.9], false).is_err());
    }

    #[test]
    fn test_recommended_equals_current_plus_delta_near_bounds() {
        let policy = DifficultyPolicy::default();
        let stable = policy.recommend(4.996, &[0.7; 6], false).unwrap();
        assert_eq!(stable.reason, DifficultyReason::StablePerformance);
        assert_eq!(stable.recommended, 4.996);
        assert_eq!(stable.delta, 0.0);

        for (current, samples) in [(4.996, [1.0; 6]), (1.004, [0.1; 6]), (2.345, [0.9; 6])] {
            let d = policy.recommend(current, &samples, false).unwrap();
            assert!((d.recommended - (d.current + d.delta)).abs() < 1e-12);
            assert!((1.0..=5.0).contains(&d.recommended));
        }
    }
}
