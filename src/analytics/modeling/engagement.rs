use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::analytics::config::{EngagementParams, TrendParams};
use crate::analytics::modeling::trend::{linear_slope, mean, TrendAnalyzer};
use crate::analytics::types::{ActivityRecord, ActivityStatus, EngagementProfile};

const DEFAULT_ENGAGEMENT: f64 = 0.6;
const DEFAULT_MOTIVATION: f64 = 0.5;

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub struct EngagementScorer {
    params: EngagementParams,
    trend: TrendAnalyzer,
}

impl Default for EngagementScorer {
    fn default() -> Self {
        Self::new(EngagementParams::default(), TrendParams::default())
    }
}

impl EngagementScorer {
    pub fn new(params: EngagementParams, trend: TrendParams) -> Self {
        Self {
            params,
            trend: TrendAnalyzer::new(trend),
        }
    }

    pub fn window_days(&self) -> u32 {
        self.params.window_days
    }

    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.params.window_days))
    }

    /// Profile for a user with no activity in the window: moderate engagement, neutral motivation.
    pub fn empty_profile(&self, user_id: &str, now: DateTime<Utc>) -> EngagementProfile {
        EngagementProfile {
            user_id: user_id.to_string(),
            window_days: self.params.window_days,
            window_start: self.window_start(now),
            computed_at: now,
            total_activities: 0,
            started_activities: 0,
            completed_activities: 0,
            total_time_minutes: 0.0,
            average_session_duration: 0.0,
            completion_rate: 0.0,
            average_accuracy: 0.0,
            improvement_trend: 0.0,
            consistency_score: 0.0,
            early_exits: 0,
            long_pauses: 0,
            repeated_activities: 0,
            voluntary_activities: 0,
            exploration_activities: 0,
            help_requests: 0,
            engagement_score: DEFAULT_ENGAGEMENT,
            motivation_score: DEFAULT_MOTIVATION,
            risk_score: 0.0,
        }
    }

    /// Recomputes the whole profile from raw records. Records outside the trailing
    /// window or belonging to other users are ignored.
    pub fn score(
        &self,
        user_id: &str,
        activities: &[ActivityRecord],
        now: DateTime<Utc>,
    ) -> EngagementProfile {
        let window_start = self.window_start(now);
        let mut window: Vec<&ActivityRecord> = activities
            .iter()
            .filter(|a| a.user_id == user_id && a.created_at >= window_start && a.created_at <= now)
            .collect();

        if window.is_empty() {
            return self.empty_profile(user_id, now);
        }
        window.sort_by_key(|a| a.created_at);

        let total = window.len() as u32;
        let started = window.iter().filter(|a| a.started_at.is_some()).count() as u32;

        let mut completed: Vec<&ActivityRecord> =
            window.iter().copied().filter(|a| a.is_completed()).collect();
        completed.sort_by_key(|a| a.completed_at.unwrap_or(a.created_at));
        let completed_count = completed.len() as u32;

        let completion_rate = completed_count as f64 / total as f64;
        let durations: Vec<f64> = completed
            .iter()
            .map(|a| a.duration_minutes.unwrap_or(0.0).max(0.0))
            .collect();
        let accuracies: Vec<f64> = completed.iter().map(|a| unit(a.metrics.accuracy)).collect();
        let average_session_duration = mean(&durations);
        let average_accuracy = mean(&accuracies);
        let improvement_trend = linear_slope(&accuracies);
        let consistency_score = self.trend.consistency(&accuracies).or_default();

        let total_time_minutes: f64 = window
            .iter()
            .map(|a| a.metrics.time_spent_seconds as f64 / 60.0)
            .sum();
        let help_requests = window
            .iter()
            .fold(0u32, |acc, a| acc.saturating_add(a.metrics.help_requests));

        let early_exits = total - completed_count;
        let long_pause = Duration::minutes(self.params.long_pause_minutes);
        let long_pauses = window
            .iter()
            .filter(|a| a.status == ActivityStatus::Paused)
            .filter(|a| a.paused_at.map(|p| now - p >= long_pause).unwrap_or(false))
            .count() as u32;
        let voluntary_activities = window
            .iter()
            .filter(|a| a.metrics.engagement_score >= self.params.voluntary_threshold)
            .count() as u32;
        let distinct_titles: HashSet<&str> = window.iter().map(|a| a.title.as_str()).collect();
        let repeated_activities = total - distinct_titles.len() as u32;
        let distinct_topics: HashSet<&str> = window.iter().map(|a| a.topic_id.as_str()).collect();
        let exploration_activities = distinct_topics.len() as u32;

        let target_minutes = f64::from(self.params.window_days) * self.params.target_minutes_per_day;
        let time_factor = if target_minutes > 0.0 {
            (total_time_minutes / target_minutes).min(1.0)
        } else {
            0.0
        };
        let voluntary_ratio = unit(voluntary_activities as f64 / completed_count.max(1) as f64);

        let base_factors = [completion_rate, time_factor, average_accuracy, voluntary_ratio];
        let engagement_score = unit(mean(&base_factors));

        let trend_factor = unit(0.5 + improvement_trend);
        let motivation_factors = [
            completion_rate,
            time_factor,
            average_accuracy,
            voluntary_ratio,
            trend_factor,
        ];
        let motivation_score = unit(mean(&motivation_factors));

        let risk_factors = [
            unit(early_exits as f64 / started.max(1) as f64),
            unit(1.0 - completion_rate),
            unit(help_requests as f64 / completed_count.max(1) as f64 * self.params.help_request_weight),
        ];
        let risk_score = unit(mean(&risk_factors));

        EngagementProfile {
            user_id: user_id.to_string(),
            window_days: self.params.window_days,
            window_start,
            computed_at: now,
            total_activities: total,
            started_activities: started,
            completed_activities: completed_count,
            total_time_minutes,
            average_session_duration,
            completion_rate,
            average_accuracy,
            improvement_trend,
            consistency_score,
            early_exits,
            long_pauses,
            repeated_activities,
            voluntary_activities,
            exploration_activities,
            help_requests,
            engagement_score,
            motivation_score,
            risk_score,
        }
    }
}
