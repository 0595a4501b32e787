use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::types::ActivityStatus;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl AnalyticsError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: ActivityStatus,
        to: ActivityStatus,
    },
    #[error("invalid duration: completed at {completed_at} before start at {started_at}")]
    InvalidDuration {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    #[error("metric {metric} out of range: {value}")]
    MetricOutOfRange { metric: &'static str, value: f64 },
    #[error("difficulty out of range [1, 5]: {0}")]
    DifficultyOutOfRange(f64),
    #[error("activity {0} is not completed")]
    NotCompleted(String),
    #[error("activity {0} has no start time")]
    MissingStartTime(String),
    #[error("activity {activity_id} does not belong to profile {user_id}/{topic_id}")]
    ProfileMismatch {
        activity_id: String,
        user_id: String,
        topic_id: String,
    },
    #[error("feedback rating must be within 1..=5, got {0}")]
    InvalidFeedbackRating(u8),
    #[error("activity {0} already exists")]
    DuplicateActivity(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientHistory { required: usize, available: usize },
    ZeroMean,
}

/// Outcome of a windowed computation. `Skipped` means "no signal yet", not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Signal<T> {
    Computed(T),
    Skipped(SkipReason),
}

impl<T> Signal<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn computed(self) -> Option<T> {
        match self {
            Self::Computed(value) => Some(value),
            Self::Skipped(_) => None,
        }
    }
}

impl<T: Default> Signal<T> {
    /// Collapses to the documented zero default when skipped.
    pub fn or_default(self) -> T {
        self.computed().unwrap_or_default()
    }
}
