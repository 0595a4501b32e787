use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
    Paused,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub speed_score: f64,
    pub engagement_score: f64,
    pub completion_rate: f64,
    pub help_requests: u32,
    pub hints_used: u32,
    pub attempts: u32,
    pub time_spent_seconds: u64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            accuracy: 0.0,
            speed_score: 0.0,
            engagement_score: 0.0,
            completion_rate: 0.0,
            help_requests: 0,
            hints_used: 0,
            attempts: 0,
            time_spent_seconds: 0,
        }
    }
}

/// Partial metric update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    pub user_id: String,
    pub topic_id: String,
    pub activity_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<f64>,
    #[serde(default)]
    pub objectives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub activity_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<f64>,
    #[serde(default)]
    pub objectives: Vec<String>,
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub last_interaction: Option<DateTime<Utc>>,
    pub duration_minutes: Option<f64>,
    pub metrics: PerformanceMetrics,
    pub error_count: u32,
    pub feedback_rating: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    NotAttempted,
    Novice,
    Developing,
    Proficient,
    Mastered,
}

impl SkillCategory {
    pub fn from_level(level: f64) -> Self {
        if level <= 0.0 || level.is_nan() {
            Self::NotAttempted
        } else if level < 0.3 {
            Self::Novice
        } else if level < 0.5 {
            Self::Developing
        } else if level < 0.8 {
            Self::Proficient
        } else {
            Self::Mastered
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::Novice => "novice",
            Self::Developing => "developing",
            Self::Proficient => "proficient",
            Self::Mastered => "mastered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub activity_id: String,
    pub composite_score: f64,
    pub accuracy: f64,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryIndicator {
    pub attempts: u32,
    pub successes: u32,
    pub last_attempt: DateTime<Utc>,
}

impl MasteryIndicator {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillProfile {
    pub user_id: String,
    pub topic_id: String,
    pub skill_level: f64,
    pub confidence_score: f64,
    pub activities_attempted: u32,
    pub activities_completed: u32,
    pub total_time_minutes: f64,
    pub last_practiced: Option<DateTime<Utc>>,
    pub performance_history: VecDeque<HistoryEntry>,
    pub learning_velocity: f64,
    pub consistency_score: f64,
    pub mastery_indicators: BTreeMap<String, MasteryIndicator>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SkillProfile {
    /// Derived from `skill_level` on every call; there is no stored category.
    pub fn skill_category(&self) -> SkillCategory {
        SkillCategory::from_level(self.skill_level)
    }

    pub fn history_scores(&self) -> Vec<f64> {
        self.performance_history
            .iter()
            .map(|entry| entry.composite_score)
            .collect()
    }

    /// Accuracy of the most recent `limit` completed activities, oldest first.
    pub fn recent_accuracies(&self, limit: usize) -> Vec<f64> {
        let skip = self.performance_history.len().saturating_sub(limit);
        self.performance_history
            .iter()
            .skip(skip)
            .map(|entry| entry.accuracy)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl EngagementLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::VeryHigh
        } else if score >= 0.8 {
            Self::High
        } else if score >= 0.6 {
            Self::Moderate
        } else if score >= 0.4 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    pub fn is_struggling(&self) -> bool {
        matches!(self, Self::Low | Self::VeryLow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotivationState {
    Excited,
    Engaged,
    Neutral,
    Declining,
    Disengaged,
}

impl MotivationState {
    pub fn from_score(score: f64, trend: f64) -> Self {
        if score >= 0.9 && trend > 0.1 {
            Self::Excited
        } else if score >= 0.7 {
            Self::Engaged
        } else if score >= 0.5 && trend >= 0.0 {
            Self::Neutral
        } else if score >= 0.3 || trend < -0.1 {
            Self::Declining
        } else {
            Self::Disengaged
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excited => "excited",
            Self::Engaged => "engaged",
            Self::Neutral => "neutral",
            Self::Declining => "declining",
            Self::Disengaged => "disengaged",
        }
    }

    pub fn is_slipping(&self) -> bool {
        matches!(self, Self::Declining | Self::Disengaged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Elevated,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Elevated
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementProfile {
    pub user_id: String,
    pub window_days: u32,
    pub window_start: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,
    pub total_activities: u32,
    pub started_activities: u32,
    pub completed_activities: u32,
    pub total_time_minutes: f64,
    pub average_session_duration: f64,
    pub completion_rate: f64,
    pub average_accuracy: f64,
    pub improvement_trend: f64,
    pub consistency_score: f64,
    pub early_exits: u32,
    pub long_pauses: u32,
    pub repeated_activities: u32,
    pub voluntary_activities: u32,
    pub exploration_activities: u32,
    pub help_requests: u32,
    pub engagement_score: f64,
    pub motivation_score: f64,
    pub risk_score: f64,
}

impl EngagementProfile {
    pub fn engagement_level(&self) -> EngagementLevel {
        EngagementLevel::from_score(self.engagement_score)
    }

    pub fn motivation_state(&self) -> MotivationState {
        MotivationState::from_score(self.motivation_score, self.improvement_trend)
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyReason {
    InsufficientData,
    HighAccuracyPositiveTrend,
    HighAccuracyNegativeTrend,
    GoodAccuracyImproving,
    GoodAccuracyDeclining,
    StablePerformance,
    ModerateAccuracy,
    LowAccuracy,
}

impl DifficultyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient data",
            Self::HighAccuracyPositiveTrend => "high accuracy, positive trend",
            Self::HighAccuracyNegativeTrend => "high accuracy, negative trend",
            Self::GoodAccuracyImproving => "good accuracy, improving",
            Self::GoodAccuracyDeclining => "good accuracy, declining",
            Self::StablePerformance => "stable performance",
            Self::ModerateAccuracy => "moderate accuracy",
            Self::LowAccuracy => "low accuracy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyAdjustmentDecision {
    pub current: f64,
    pub recommended: f64,
    pub delta: f64,
    pub reason: DifficultyReason,
    pub confidence: f64,
    pub average_accuracy: f64,
    pub trend: f64,
    pub sample_count: usize,
    pub struggle_penalty_applied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamificationElement {
    Points,
    Badges,
    Streaks,
    Leaderboards,
    Challenges,
    Rewards,
    ProgressBars,
    Avatars,
    Story,
}

impl GamificationElement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Badges => "badges",
            Self::Streaks => "streaks",
            Self::Leaderboards => "leaderboards",
            Self::Challenges => "challenges",
            Self::Rewards => "rewards",
            Self::ProgressBars => "progress_bars",
            Self::Avatars => "avatars",
            Self::Story => "story",
        }
    }
}

/// Per-user affinity for each element, roughly in [0,1].
pub type ElementPreferences = BTreeMap<GamificationElement, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingMultipliers {
    pub reward_frequency: f64,
    pub feedback_delay: f64,
    pub challenge_interval: f64,
}

impl Default for TimingMultipliers {
    fn default() -> Self {
        Self {
            reward_frequency: 1.0,
            feedback_delay: 1.0,
            challenge_interval: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionBasis {
    ExactMatch,
    ImprovementTarget,
    DefaultFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRationale {
    pub basis: SelectionBasis,
    pub engagement_level: EngagementLevel,
    pub motivation_state: MotivationState,
    pub score: f64,
    pub candidate_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamificationStrategyDecision {
    pub strategy_id: String,
    pub element_weights: BTreeMap<GamificationElement, f64>,
    pub timing_multipliers: TimingMultipliers,
    pub rationale: StrategyRationale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSnapshot {
    pub topic_id: String,
    pub skill_level: f64,
    pub skill_category: SkillCategory,
    pub confidence_score: f64,
    pub learning_velocity: f64,
    pub consistency_score: f64,
    pub activities_completed: u32,
    pub total_time_minutes: f64,
    pub last_practiced: Option<DateTime<Utc>>,
}

impl From<&SkillProfile> for SkillSnapshot {
    fn from(profile: &SkillProfile) -> Self {
        Self {
            topic_id: profile.topic_id.clone(),
            skill_level: profile.skill_level,
            skill_category: profile.skill_category(),
            confidence_score: profile.confidence_score,
            learning_velocity: profile.learning_velocity,
            consistency_score: profile.consistency_score,
            activities_completed: profile.activities_completed,
            total_time_minutes: profile.total_time_minutes,
            last_practiced: profile.last_practiced,
        }
    }
}

/// Numeric state handed to the report generator. Carries no prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub user_id: String,
    pub generated_at: DateTime<Utc>,
    pub skills: Vec<SkillSnapshot>,
    pub engagement: EngagementProfile,
    pub engagement_level: EngagementLevel,
    pub motivation_state: MotivationState,
    pub risk_level: RiskLevel,
}
