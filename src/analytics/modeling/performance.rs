use crate::analytics::config::PerformanceWeights;
use crate::analytics::types::PerformanceMetrics;

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Composite score of one activity: 0.4·accuracy + 0.2·speed + 0.2·engagement + 0.2·completion.
pub fn overall_score(metrics: &PerformanceMetrics) -> f64 {
    weighted_score(metrics, &PerformanceWeights::default())
}

pub fn weighted_score(metrics: &PerformanceMetrics, weights: &PerformanceWeights) -> f64 {
    let score = weights.accuracy * unit(metrics.accuracy)
        + weights.speed * unit(metrics.speed_score)
        + weights.engagement * unit(metrics.engagement_score)
        + weights.completion * unit(metrics.completion_rate);
    unit(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(accuracy: f64, speed: f64, engagement: f64, completion: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            accuracy,
            speed_score: speed,
            engagement_score: engagement,
            completion_rate: completion,
            ..Default::default()
        }
    }

    #[test]
    fn test_perfect_activity_scores_one() {
        assert!((overall_score(&metrics(1.0, 1.0, 1.0, 1.0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weights_applied() {
        let score = overall_score(&metrics(0.5, 1.0, 0.0, 1.0));
        assert!((score - (0.2 + 0.2 + 0.0 + 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_inputs_clamped_before_combination() {
        let score = overall_score(&metrics(3.0, -1.0, f64::NAN, 1.0));
        assert!((score - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_zero_metrics() {
        assert_eq!(overall_score(&PerformanceMetrics::default()), 0.0);
    }
}
