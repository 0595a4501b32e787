use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::config::{PerformanceWeights, SkillParams, TrendParams};
use crate::analytics::error::{AnalyticsError, ValidationError};
use crate::analytics::modeling::performance::weighted_score;
use crate::analytics::modeling::trend::TrendAnalyzer;
use crate::analytics::types::{
    ActivityRecord, HistoryEntry, MasteryIndicator, SkillCategory, SkillProfile,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillUpdate {
    pub activity_id: String,
    pub overall_score: f64,
    pub previous_level: f64,
    pub new_level: f64,
    pub previous_category: SkillCategory,
    pub new_category: SkillCategory,
    pub confidence_delta: f64,
    pub learning_velocity: f64,
    pub consistency_score: f64,
}

impl SkillUpdate {
    pub fn category_changed(&self) -> bool {
        self.previous_category != self.new_category
    }
}

pub struct SkillEstimator {
    params: SkillParams,
    weights: PerformanceWeights,
    trend: TrendAnalyzer,
}

impl Default for SkillEstimator {
    fn default() -> Self {
        Self::new(
            SkillParams::default(),
            PerformanceWeights::default(),
            TrendParams::default(),
        )
    }
}

impl SkillEstimator {
    pub fn new(params: SkillParams, weights: PerformanceWeights, trend: TrendParams) -> Self {
        Self {
            params,
            weights,
            trend: TrendAnalyzer::new(trend),
        }
    }

    pub fn params(&self) -> &SkillParams {
        &self.params
    }

    pub fn create_profile(&self, user_id: &str, topic_id: &str, now: DateTime<Utc>) -> SkillProfile {
        SkillProfile {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            skill_level: 0.0,
            confidence_score: self.params.initial_confidence.clamp(0.0, 1.0),
            activities_attempted: 0,
            activities_completed: 0,
            total_time_minutes: 0.0,
            last_practiced: None,
            performance_history: VecDeque::with_capacity(self.params.history_capacity),
            learning_velocity: 0.0,
            consistency_score: 0.0,
            mastery_indicators: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds one completed activity into `profile`. Not idempotent: applying the same
    /// record twice moves the EMA twice.
    pub fn apply(
        &self,
        profile: &mut SkillProfile,
        record: &ActivityRecord,
    ) -> Result<SkillUpdate, ValidationError> {
        if !record.is_completed() {
            return Err(ValidationError::NotCompleted(record.id.clone()));
        }
        if record.user_id != profile.user_id || record.topic_id != profile.topic_id {
            return Err(ValidationError::ProfileMismatch {
                activity_id: record.id.clone(),
                user_id: profile.user_id.clone(),
                topic_id: profile.topic_id.clone(),
            });
        }

        let completed_at = record
            .completed_at
            .ok_or_else(|| ValidationError::NotCompleted(record.id.clone()))?;
        let overall = weighted_score(&record.metrics, &self.weights);
        let accuracy = record.metrics.accuracy.clamp(0.0, 1.0);
        let duration = record.duration_minutes.unwrap_or(0.0).max(0.0);

        let previous_level = profile.skill_level;
        let previous_category = profile.skill_category();
        let alpha = self.params.ema_alpha;
        profile.skill_level = (alpha * overall + (1.0 - alpha) * previous_level).clamp(0.0, 1.0);

        let previous_confidence = profile.confidence_score;
        if accuracy >= self.params.high_accuracy {
            profile.confidence_score += self.params.confidence_gain;
        } else if accuracy < self.params.low_accuracy {
            profile.confidence_score -= self.params.confidence_loss;
        }
        profile.confidence_score = profile.confidence_score.clamp(0.0, 1.0);

        profile.activities_attempted += 1;
        profile.activities_completed += 1;
        profile.total_time_minutes += duration;
        profile.last_practiced = Some(completed_at);
        profile.updated_at = completed_at;

        profile.performance_history.push_back(HistoryEntry {
            timestamp: completed_at,
            activity_id: record.id.clone(),
            composite_score: overall,
            accuracy,
            duration_minutes: duration,
        });
        while profile.performance_history.len() > self.params.history_capacity {
            profile.performance_history.pop_front();
        }

        for objective in &record.objectives {
            let indicator = profile
                .mastery_indicators
                .entry(objective.clone())
                .or_insert(MasteryIndicator {
                    attempts: 0,
                    successes: 0,
                    last_attempt: completed_at,
                });
            indicator.attempts += 1;
            if accuracy >= self.params.mastery_success_accuracy {
                indicator.successes += 1;
            }
            indicator.last_attempt = completed_at;
        }

        self.refresh_trends(profile);

        Ok(SkillUpdate {
            activity_id: record.id.clone(),
            overall_score: overall,
            previous_level,
            new_level: profile.skill_level,
            previous_category,
            new_category: profile.skill_category(),
            confidence_delta: profile.confidence_score - previous_confidence,
            learning_velocity: profile.learning_velocity,
            consistency_score: profile.consistency_score,
        })
    }

    /// Update-only path: the profile must already exist in `profiles`.
    pub fn apply_existing(
        &self,
        profiles: &mut HashMap<String, SkillProfile>,
        record: &ActivityRecord,
    ) -> Result<SkillUpdate, AnalyticsError> {
        let profile = profiles.get_mut(&record.topic_id).ok_or_else(|| {
            AnalyticsError::NotFound(format!(
                "skill profile {}/{}",
                record.user_id, record.topic_id
            ))
        })?;
        Ok(self.apply(profile, record)?)
    }

    pub fn refresh_trends(&self, profile: &mut SkillProfile) {
        let scores = profile.history_scores();
        profile.learning_velocity = self.trend.learning_velocity(&scores).or_default();
        profile.consistency_score = self.trend.consistency(&scores).or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::types::{ActivityStatus, NewActivity, PerformanceMetrics};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 16, 0, 0).unwrap()
    }

    fn completed(id: &str, accuracy: f64, score: f64, offset_min: i64) -> ActivityRecord {
        let mut record = ActivityRecord::create(
            NewActivity {
                activity_id: Some(id.to_string()),
                user_id: "kid".to_string(),
                topic_id: "addition".to_string(),
                activity_type: "drill".to_string(),
                title: format!("drill {id}"),
                difficulty: None,
                objectives: vec!["carry-the-one".to_string()],
            },
            t0(),
        );
        let start = t0() + Duration::minutes(offset_min);
        record.start(start).unwrap();
        record.metrics = PerformanceMetrics {
            accuracy,
            speed_score: score,
            engagement_score: score,
            ..Default::default()
        };
        record.complete(start + Duration::minutes(5)).unwrap();
        record
    }

    #[test]
    fn test_first_and_second_perfect_activity() {
        let estimator = SkillEstimator::default();
        let mut profile = estimator.create_profile("kid", "addition", t0());
        assert_eq!(profile.skill_category(), SkillCategory::NotAttempted);

        let update = estimator
            .apply(&mut profile, &completed("a1", 1.0, 1.0, 0))
            .unwrap();
        assert!((update.overall_score - 1.0).abs() < 1e-12);
        assert!((profile.skill_level - 0.7).abs() < 1e-12);
        assert_eq!(profile.skill_category(), SkillCategory::Proficient);
        assert!(update.category_changed());

        estimator
            .apply(&mut profile, &completed("a2", 1.0, 1.0, 10))
            .unwrap();
        assert!((profile.skill_level - 0.91).abs() < 1e-12);
        assert_eq!(profile.skill_category(), SkillCategory::Mastered);
    }

    #[test]
    fn test_reapplying_same_activity_moves_level_again() {
        let estimator = SkillEstimator::default();
        let mut profile = estimator.create_profile("kid", "addition", t0());
        let record = completed("same", 1.0, 1.0, 0);
        estimator.apply(&mut profile, &record).unwrap();
        let after_first = profile.skill_level;
        estimator.apply(&mut profile, &record).unwrap();
        assert!(profile.skill_level > after_first);
        assert_eq!(profile.activities_completed, 2);
    }

    #[test]
    fn test_confidence_adjustments() {
        let estimator = SkillEstimator::default();
        let mut profile = estimator.create_profile("kid", "addition", t0());

        estimator.apply(&mut profile, &completed("hi", 0.8, 0.5, 0)).unwrap();
        assert!((profile.confidence_score - 0.6).abs() < 1e-12);

        estimator.apply(&mut profile, &completed("mid", 0.6, 0.5, 10)).unwrap();
        assert!((profile.confidence_score - 0.6).abs() < 1e-12);

        estimator.apply(&mut profile, &completed("lo", 0.49, 0.5, 20)).unwrap();
        assert!((profile.confidence_score - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let estimator = SkillEstimator::default();
        let mut profile = estimator.create_profile("kid", "addition", t0());
        for i in 0..12 {
            estimator
                .apply(&mut profile, &completed(&format!("x{i}"), 1.0, 1.0, i * 10))
                .unwrap();
        }
        assert_eq!(profile.confidence_score, 1.0);

        for i in 0..30 {
            estimator
                .apply(&mut profile, &completed(&format!("y{i}"), 0.0, 0.0, 200 + i * 10))
                .unwrap();
        }
        assert_eq!(profile.confidence_score, 0.0);
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let estimator = SkillEstimator::default();
        let mut profile = estimator.create_profile("kid", "addition", t0());
        for i in 0..25 {
            estimator
                .apply(&mut profile, &completed(&format!("h{i}"), 0.7, 0.7, i * 10))
                .unwrap();
        }
        assert_eq!(profile.performance_history.len(), 20);
        assert_eq!(profile.performance_history.front().unwrap().activity_id, "h5");
        assert_eq!(profile.performance_history.back().unwrap().activity_id, "h24");
        assert_eq!(profile.activities_completed, 25);
        assert!((profile.total_time_minutes - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_mastery_indicators_track_objectives() {
        let estimator = SkillEstimator::default();
        let mut profile = estimator.create_profile("kid", "addition", t0());
        estimator.apply(&mut profile, &completed("m1", 0.9, 0.5, 0)).unwrap();
        estimator.apply(&mut profile, &completed("m2", 0.5, 0.5, 10)).unwrap();

        let indicator = &profile.mastery_indicators["carry-the-one"];
        assert_eq!(indicator.attempts, 2);
        assert_eq!(indicator.successes, 1);
        assert!((indicator.success_rate() - 0.5).abs() < 1e-12);
        assert_eq!(indicator.last_attempt, t0() + Duration::minutes(15));
    }

    #[test]
    fn test_rejects_incomplete_and_foreign_records() {
        let estimator = SkillEstimator::default();
        let mut profile = estimator.create_profile("kid", "addition", t0());

        let mut running = completed("r", 0.9, 0.9, 0);
        running.status = ActivityStatus::InProgress;
        assert!(matches!(
            estimator.apply(&mut profile, &running),
            Err(ValidationError::NotCompleted(_))
        ));

        let mut other_topic = completed("o", 0.9, 0.9, 0);
        other_topic.topic_id = "subtraction".to_string();
        assert!(matches!(
            estimator.apply(&mut profile, &other_topic),
            Err(ValidationError::ProfileMismatch { .. })
        ));
        assert_eq!(profile.activities_completed, 0);
    }

    #[test]
    fn test_apply_existing_requires_profile() {
        let estimator = SkillEstimator::default();
        let mut profiles = HashMap::new();
        let err = estimator
            .apply_existing(&mut profiles, &completed("n", 0.9, 0.9, 0))
            .unwrap_err();
        assert!(err.is_not_found());

        profiles.insert(
            "addition".to_string(),
            estimator.create_profile("kid", "addition", t0()),
        );
        assert!(estimator
            .apply_existing(&mut profiles, &completed("n", 0.9, 0.9, 0))
            .is_ok());
    }

    #[test]
    fn test_trends_refresh_after_updates() {
        let estimator = SkillEstimator::default();
        let mut profile = estimator.create_profile("kid", "addition", t0());
        for i in 0..5 {
            estimator
                .apply(&mut profile, &completed(&format!("lo{i}"), 0.2, 0.2, i * 10))
                .unwrap();
        }
        assert_eq!(profile.learning_velocity, 0.0);
        for i in 0..5 {
            estimator
                .apply(&mut profile, &completed(&format!("hi{i}"), 1.0, 1.0, 100 + i * 10))
                .unwrap();
        }
        assert!(profile.learning_velocity > 0.0);
        assert!(profile.consistency_score > 0.0 && profile.consistency_score < 1.0);
    }
}
