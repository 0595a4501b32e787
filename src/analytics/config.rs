use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceWeights {
    pub accuracy: f64,
    pub speed: f64,
    pub engagement: f64,
    pub completion: f64,
}

impl Default for PerformanceWeights {
    fn default() -> Self {
        Self {
            accuracy: 0.4,
            speed: 0.2,
            engagement: 0.2,
            completion: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillParams {
    /// Weight of the new composite score in the EMA update.
    pub ema_alpha: f64,
    pub initial_confidence: f64,
    pub confidence_gain: f64,
    pub confidence_loss: f64,
    pub high_accuracy: f64,
    pub low_accuracy: f64,
    pub history_capacity: usize,
    pub mastery_success_accuracy: f64,
}

impl Default for SkillParams {
    fn default() -> Self {
        Self {
            ema_alpha: 0.7,
            initial_confidence: 0.5,
            confidence_gain: 0.1,
            confidence_loss: 0.05,
            high_accuracy: 0.8,
            low_accuracy: 0.5,
            history_capacity: 20,
            mastery_success_accuracy: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendParams {
    pub velocity_window: usize,
    pub consistency_window: usize,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            velocity_window: 5,
            consistency_window: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementParams {
    pub window_days: u32,
    pub target_minutes_per_day: f64,
    pub voluntary_threshold: f64,
    pub long_pause_minutes: i64,
    pub help_request_weight: f64,
}

impl Default for EngagementParams {
    fn default() -> Self {
        Self {
            window_days: 7,
            target_minutes_per_day: 20.0,
            voluntary_threshold: 0.8,
            long_pause_minutes: 10,
            help_request_weight: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyParams {
    pub min_difficulty: f64,
    pub max_difficulty: f64,
    pub sample_window: usize,
    pub trend_window: usize,
    pub struggle_min_samples: usize,
    pub struggle_threshold: f64,
    pub struggle_penalty: f64,
    pub base_confidence: f64,
    pub pattern_confidence: f64,
}

impl Default for DifficultyParams {
    fn default() -> Self {
        Self {
            min_difficulty: 1.0,
            max_difficulty: 5.0,
            sample_window: 10,
            trend_window: 3,
            struggle_min_samples: 5,
            struggle_threshold: 0.6,
            struggle_penalty: 0.1,
            base_confidence: 0.6,
            pattern_confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationParams {
    pub preference_weight: f64,
    pub overuse_threshold: u32,
    pub overuse_factor: f64,
    pub prior_success_rate: f64,
    pub default_strategy: String,
}

impl Default for GamificationParams {
    fn default() -> Self {
        Self {
            preference_weight: 0.1,
            overuse_threshold: 10,
            overuse_factor: 0.9,
            prior_success_rate: 0.5,
            default_strategy: "balanced".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_users: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_users: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsConfig {
    pub performance: PerformanceWeights,
    pub skill: SkillParams,
    pub trend: TrendParams,
    pub engagement: EngagementParams,
    pub difficulty: DifficultyParams,
    pub gamification: GamificationParams,
    pub cache: CacheConfig,
}

impl AnalyticsConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ANALYTICS_ENGAGEMENT_WINDOW_DAYS") {
            config.engagement.window_days = val
                .parse()
                .ok()
                .filter(|days: &u32| *days > 0)
                .unwrap_or(config.engagement.window_days);
        }
        if let Ok(val) = std::env::var("ANALYTICS_HISTORY_CAPACITY") {
            config.skill.history_capacity = val
                .parse()
                .ok()
                .filter(|cap: &usize| *cap > 0)
                .unwrap_or(config.skill.history_capacity);
        }
        if let Ok(val) = std::env::var("ANALYTICS_CACHE_MAX_USERS") {
            config.cache.max_users = val
                .parse()
                .ok()
                .filter(|max: &usize| *max > 0)
                .unwrap_or(config.cache.max_users);
        }
        if let Ok(val) = std::env::var("ANALYTICS_LONG_PAUSE_MINUTES") {
            config.engagement.long_pause_minutes =
                val.parse().unwrap_or(config.engagement.long_pause_minutes);
        }

        config
    }
}
