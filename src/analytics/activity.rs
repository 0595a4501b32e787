use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::error::ValidationError;
use crate::analytics::types::{
    ActivityRecord, ActivityStatus, MetricsUpdate, NewActivity, PerformanceMetrics,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interaction {
    HelpRequested,
    HintUsed,
    Attempt,
    Error { code: String },
    Feedback { rating: u8 },
    TimeSpent { seconds: u64 },
    Metrics(MetricsUpdate),
}

impl ActivityRecord {
    pub fn create(input: NewActivity, now: DateTime<Utc>) -> Self {
        let id = input
            .activity_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            id,
            user_id: input.user_id,
            topic_id: input.topic_id,
            activity_type: input.activity_type,
            title: input.title,
            difficulty: input.difficulty,
            objectives: input.objectives,
            status: ActivityStatus::NotStarted,
            created_at: now,
            started_at: None,
            completed_at: None,
            paused_at: None,
            last_interaction: None,
            duration_minutes: None,
            metrics: PerformanceMetrics::default(),
            error_count: 0,
            feedback_rating: None,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.transition(&[ActivityStatus::NotStarted], ActivityStatus::InProgress)?;
        self.started_at = Some(now);
        self.last_interaction = Some(now);
        Ok(())
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.transition(&[ActivityStatus::InProgress], ActivityStatus::Paused)?;
        self.paused_at = Some(now);
        self.last_interaction = Some(now);
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.transition(&[ActivityStatus::Paused], ActivityStatus::InProgress)?;
        self.paused_at = None;
        self.last_interaction = Some(now);
        Ok(())
    }

    /// Finalizes the record. Duration and completion are fixed here and never change again.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.ensure_can_enter(
            &[ActivityStatus::InProgress, ActivityStatus::Paused],
            ActivityStatus::Completed,
        )?;
        let started_at = self
            .started_at
            .ok_or_else(|| ValidationError::MissingStartTime(self.id.clone()))?;
        if now < started_at {
            return Err(ValidationError::InvalidDuration {
                started_at,
                completed_at: now,
            });
        }

        let elapsed = now - started_at;
        self.status = ActivityStatus::Completed;
        self.completed_at = Some(now);
        self.paused_at = None;
        self.last_interaction = Some(now);
        self.duration_minutes = Some(elapsed.num_milliseconds() as f64 / 60_000.0);
        self.metrics.completion_rate = 1.0;
        Ok(())
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.transition(
            &[ActivityStatus::InProgress, ActivityStatus::Paused],
            ActivityStatus::Abandoned,
        )?;
        self.paused_at = None;
        self.last_interaction = Some(now);
        Ok(())
    }

    pub fn apply_interaction(
        &mut self,
        interaction: &Interaction,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if self.status.is_terminal() {
            return Err(ValidationError::InvalidStateTransition {
                from: self.status,
                to: self.status,
            });
        }

        match interaction {
            Interaction::HelpRequested => {
                self.metrics.help_requests = self.metrics.help_requests.saturating_add(1)
            }
            Interaction::HintUsed => {
                self.metrics.hints_used = self.metrics.hints_used.saturating_add(1)
            }
            Interaction::Attempt => self.metrics.attempts = self.metrics.attempts.saturating_add(1),
            Interaction::Error { code } => {
                self.error_count = self.error_count.saturating_add(1);
                tracing::trace!(activity_id = %self.id, code = %code, "activity error recorded");
            }
            Interaction::Feedback { rating } => {
                if !(1..=5).contains(rating) {
                    return Err(ValidationError::InvalidFeedbackRating(*rating));
                }
                self.feedback_rating = Some(*rating);
            }
            Interaction::TimeSpent { seconds } => {
                self.metrics.time_spent_seconds =
                    self.metrics.time_spent_seconds.saturating_add(*seconds);
            }
            Interaction::Metrics(update) => self.apply_metrics(update)?,
        }

        self.last_interaction = Some(now);
        Ok(())
    }

    /// Validates every field before writing any, so a rejected update leaves the record untouched.
    pub fn apply_metrics(&mut self, update: &MetricsUpdate) -> Result<(), ValidationError> {
        let fields = [
            ("accuracy", update.accuracy),
            ("speed_score", update.speed_score),
            ("engagement_score", update.engagement_score),
            ("completion_rate", update.completion_rate),
        ];
        for (metric, value) in fields {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ValidationError::MetricOutOfRange { metric, value });
                }
            }
        }

        if let Some(v) = update.accuracy {
            self.metrics.accuracy = v;
        }
        if let Some(v) = update.speed_score {
            self.metrics.speed_score = v;
        }
        if let Some(v) = update.engagement_score {
            self.metrics.engagement_score = v;
        }
        if let Some(v) = update.completion_rate {
            self.metrics.completion_rate = v;
        }
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.status == ActivityStatus::Completed
    }

    fn transition(
        &mut self,
        allowed_from: &[ActivityStatus],
        to: ActivityStatus,
    ) -> Result<(), ValidationError> {
        self.ensure_can_enter(allowed_from, to)?;
        self.status = to;
        Ok(())
    }

    fn ensure_can_enter(
        &self,
        allowed_from: &[ActivityStatus],
        to: ActivityStatus,
    ) -> Result<(), ValidationError> {
        if self.status.is_terminal() || !allowed_from.contains(&self.status) {
            return Err(ValidationError::InvalidStateTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 15, 0, 0).unwrap()
    }

    fn new_record() -> ActivityRecord {
        ActivityRecord::create(
            NewActivity {
                activity_id: Some("act-1".to_string()),
                user_id: "child-1".to_string(),
                topic_id: "fractions".to_string(),
                activity_type: "quiz".to_string(),
                title: "Halves and quarters".to_string(),
                difficulty: Some(2.0),
                objectives: vec!["compare-fractions".to_string()],
            },
            t0(),
        )
    }

    #[test]
    fn test_full_lifecycle_sets_duration_and_completion() {
        let mut record = new_record();
        record.start(t0()).unwrap();
        assert_eq!(record.status, ActivityStatus::InProgress);
        assert_eq!(record.last_interaction, Some(t0()));

        record.pause(t0() + Duration::minutes(3)).unwrap();
        record.resume(t0() + Duration::minutes(5)).unwrap();
        assert!(record.paused_at.is_none());

        record.complete(t0() + Duration::minutes(12)).unwrap();
        assert!(record.is_completed());
        assert_eq!(record.duration_minutes, Some(12.0));
        assert_eq!(record.metrics.completion_rate, 1.0);
        assert_eq!(record.completed_at, Some(t0() + Duration::minutes(12)));
    }

    #[test]
    fn test_complete_from_paused() {
        let mut record = new_record();
        record.start(t0()).unwrap();
        record.pause(t0() + Duration::minutes(1)).unwrap();
        record.complete(t0() + Duration::minutes(2)).unwrap();
        assert!(record.paused_at.is_none());
        assert!(record.is_completed());
    }

    #[test]
    fn test_complete_before_start_is_invalid_duration() {
        let mut record = new_record();
        record.start(t0()).unwrap();
        let err = record.complete(t0() - Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDuration { .. }));
        assert_eq!(record.status, ActivityStatus::InProgress);
    }

    #[test]
    fn test_complete_without_start_is_rejected() {
        let mut record = new_record();
        let err = record.complete(t0()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidStateTransition {
                from: ActivityStatus::NotStarted,
                to: ActivityStatus::Completed,
            }
        );
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut done = new_record();
        done.start(t0()).unwrap();
        done.complete(t0() + Duration::minutes(1)).unwrap();
        assert!(done.start(t0()).is_err());
        assert!(done.pause(t0()).is_err());
        assert!(done.resume(t0()).is_err());
        assert!(done.abandon(t0()).is_err());
        assert!(done.complete(t0() + Duration::minutes(2)).is_err());
        assert!(done
            .apply_interaction(&Interaction::HintUsed, t0())
            .is_err());

        let mut gone = new_record();
        gone.start(t0()).unwrap();
        gone.abandon(t0() + Duration::minutes(1)).unwrap();
        assert_eq!(gone.status, ActivityStatus::Abandoned);
        assert!(gone.resume(t0()).is_err());
        assert!(gone.complete(t0() + Duration::minutes(2)).is_err());
    }

    #[test]
    fn test_resume_requires_paused() {
        let mut record = new_record();
        record.start(t0()).unwrap();
        assert!(record.resume(t0()).is_err());
    }

    #[test]
    fn test_interactions_update_counters() {
        let mut record = new_record();
        record.start(t0()).unwrap();
        let later = t0() + Duration::minutes(4);
        record.apply_interaction(&Interaction::HelpRequested, later).unwrap();
        record.apply_interaction(&Interaction::HintUsed, later).unwrap();
        record.apply_interaction(&Interaction::Attempt, later).unwrap();
        record.apply_interaction(&Interaction::Attempt, later).unwrap();
        record
            .apply_interaction(&Interaction::Error { code: "timeout".to_string() }, later)
            .unwrap();
        record
            .apply_interaction(&Interaction::TimeSpent { seconds: 90 }, later)
            .unwrap();
        record
            .apply_interaction(&Interaction::Feedback { rating: 4 }, later)
            .unwrap();

        assert_eq!(record.metrics.help_requests, 1);
        assert_eq!(record.metrics.hints_used, 1);
        assert_eq!(record.metrics.attempts, 2);
        assert_eq!(record.error_count, 1);
        assert_eq!(record.metrics.time_spent_seconds, 90);
        assert_eq!(record.feedback_rating, Some(4));
        assert_eq!(record.last_interaction, Some(later));
    }

    #[test]
    fn test_out_of_range_metrics_leave_record_untouched() {
        let mut record = new_record();
        record.start(t0()).unwrap();
        let update = MetricsUpdate {
            accuracy: Some(0.9),
            speed_score: Some(1.2),
            ..Default::default()
        };
        let err = record
            .apply_interaction(&Interaction::Metrics(update), t0())
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MetricOutOfRange {
                metric: "speed_score",
                value: 1.2
            }
        );
        assert_eq!(record.metrics.accuracy, 0.0);
    }

    #[test]
    fn test_feedback_rating_bounds() {
        let mut record = new_record();
        record.start(t0()).unwrap();
        assert_eq!(
            record
                .apply_interaction(&Interaction::Feedback { rating: 0 }, t0())
                .unwrap_err(),
            ValidationError::InvalidFeedbackRating(0)
        );
        assert!(record
            .apply_interaction(&Interaction::Feedback { rating: 6 }, t0())
            .is_err());
    }

    #[test]
    fn test_generated_id_when_missing() {
        let record = ActivityRecord::create(
            NewActivity {
                activity_id: None,
                user_id: "u".to_string(),
                topic_id: "t".to_string(),
                activity_type: "game".to_string(),
                title: "Counting".to_string(),
                difficulty: None,
                objectives: vec![],
            },
            t0(),
        );
        assert!(!record.id.is_empty());
        assert_eq!(record.status, ActivityStatus::NotStarted);
    }

    #[test]
    fn test_counters_saturate_instead_of_overflowing() {
        let mut record = new_record();
        record.start(t0()).unwrap();
        let later = t0() + Duration::minutes(1);
        record
            .apply_interaction(&Interaction::TimeSpent { seconds: u64::MAX }, later)
            .unwrap();
        record
            .apply_interaction(&Interaction::TimeSpent { seconds: 1 }, later)
            .unwrap();
        assert_eq!(record.metrics.time_spent_seconds, u64::MAX);

        record.metrics.help_requests = u32::MAX;
        record.metrics.hints_used = u32::MAX;
        record.metrics.attempts = u32::MAX;
        record.error_count = u32::MAX;
        record.apply_interaction(&Interaction::HelpRequested, later).unwrap();
        record.apply_interaction(&Interaction::HintUsed, later).unwrap();
        record.apply_interaction(&Interaction::Attempt, later).unwrap();
        record
            .apply_interaction(&Interaction::Error { code: "e".to_string() }, later)
            .unwrap();
        assert_eq!(record.metrics.help_requests, u32::MAX);
        assert_eq!(record.metrics.hints_used, u32::MAX);
        assert_eq!(record.metrics.attempts, u32::MAX);
        assert_eq!(record.error_count, u32::MAX);
    }
}
