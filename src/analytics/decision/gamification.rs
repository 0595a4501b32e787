use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::analytics::config::GamificationParams;
use crate::analytics::error::AnalyticsError;
use crate::analytics::types::{
    ElementPreferences, EngagementLevel, GamificationElement as E, GamificationStrategyDecision,
    MotivationState, SelectionBasis, StrategyRationale, TimingMultipliers,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub id: String,
    pub target_engagement: EngagementLevel,
    pub target_motivation: MotivationState,
    pub element_weights: BTreeMap<E, f64>,
    pub timing: TimingMultipliers,
}

impl StrategyDefinition {
    fn new(
        id: &str,
        target: (EngagementLevel, MotivationState),
        weights: &[(E, f64)],
        timing: (f64, f64, f64),
    ) -> Self {
        Self {
            id: id.to_string(),
            target_engagement: target.0,
            target_motivation: target.1,
            element_weights: weights.iter().copied().collect(),
            timing: TimingMultipliers {
                reward_frequency: timing.0,
                feedback_delay: timing.1,
                challenge_interval: timing.2,
            },
        }
    }

    pub fn enabled_elements(&self) -> impl Iterator<Item = E> + '_ {
        self.element_weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(e, _)| *e)
    }

    fn targets(&self, engagement: EngagementLevel, motivation: MotivationState) -> bool {
        self.target_engagement == engagement && self.target_motivation == motivation
    }

    fn targets_improvement(&self) -> bool {
        matches!(
            self.target_engagement,
            EngagementLevel::Moderate | EngagementLevel::High
        ) && matches!(
            self.target_motivation,
            MotivationState::Neutral | MotivationState::Engaged
        )
    }
}

pub fn default_catalog() -> Vec<StrategyDefinition> {
    use EngagementLevel as L;
    use MotivationState as M;
    vec![
        StrategyDefinition::new(
            "balanced",
            (L::Moderate, M::Neutral),
            &[(E::Points, 0.5), (E::Badges, 0.5), (E::ProgressBars, 0.5), (E::Rewards, 0.5), (E::Streaks, 0.3)],
            (1.0, 1.0, 1.0),
        ),
        StrategyDefinition::new(
            "achievement_hunter",
            (L::High, M::Engaged),
            &[(E::Badges, 0.9), (E::Points, 0.7), (E::Challenges, 0.6), (E::ProgressBars, 0.4)],
            (1.0, 1.0, 0.9),
        ),
        StrategyDefinition::new(
            "challenge_seeker",
            (L::VeryHigh, M::Engaged),
            &[(E::Challenges, 1.0), (E::Leaderboards, 0.6), (E::Points, 0.5)],
            (0.8, 1.0, 0.7),
        ),
        StrategyDefinition::new(
            "comeback_quest",
            (L::Low, M::Disengaged),
            &[(E::Story, 0.8), (E::Rewards, 0.7), (E::Avatars, 0.5), (E::ProgressBars, 0.4)],
            (1.4, 0.7, 1.5),
        ),
        StrategyDefinition::new(
            "curiosity_spark",
            (L::Moderate, M::Engaged),
            &[(E::Story, 0.7), (E::Challenges, 0.5), (E::Avatars, 0.4), (E::Badges, 0.3)],
            (1.0, 0.9, 1.1),
        ),
        StrategyDefinition::new(
            "gentle_encouragement",
            (L::Low, M::Declining),
            &[(E::Rewards, 0.8), (E::ProgressBars, 0.8), (E::Points, 0.4)],
            (1.3, 0.8, 1.4),
        ),
        StrategyDefinition::new(
            "momentum_builder",
            (L::VeryHigh, M::Excited),
            &[(E::Streaks, 0.9), (E::Leaderboards, 0.7), (E::Badges, 0.5)],
            (0.9, 1.0, 0.8),
        ),
        StrategyDefinition::new(
            "re_engagement",
            (L::VeryLow, M::Disengaged),
            &[(E::Rewards, 1.0), (E::Story, 0.6), (E::Avatars, 0.6), (E::ProgressBars, 0.3)],
            (1.5, 0.6, 2.0),
        ),
        StrategyDefinition::new(
            "steady_progress",
            (L::High, M::Neutral),
            &[(E::ProgressBars, 0.8), (E::Streaks, 0.6), (E::Points, 0.5)],
            (1.0, 1.0, 1.0),
        ),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub usage_count: u32,
    pub successes: u32,
}

impl StrategyStats {
    /// Success rate shrunk toward `prior` by one pseudo-observation.
    pub fn success_rate(&self, prior: f64) -> f64 {
        (self.successes as f64 + prior) / (self.usage_count as f64 + 1.0)
    }
}

pub struct GamificationSelector {
    params: GamificationParams,
    catalog: BTreeMap<String, StrategyDefinition>,
    stats: RwLock<HashMap<String, StrategyStats>>,
}

impl Default for GamificationSelector {
    fn default() -> Self {
        Self::new(GamificationParams::default())
    }
}

impl GamificationSelector {
    pub fn new(params: GamificationParams) -> Self {
        Self::with_catalog(params, default_catalog())
    }

    /// Catalog entries are keyed and evaluated by id, so ties resolve to the smallest id.
    pub fn with_catalog(params: GamificationParams, catalog: Vec<StrategyDefinition>) -> Self {
        let catalog = catalog.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            params,
            catalog,
            stats: RwLock::new(HashMap::new()),
        }
    }

    pub fn strategy(&self, id: &str) -> Option<&StrategyDefinition> {
        self.catalog.get(id)
    }

    pub fn stats(&self, id: &str) -> StrategyStats {
        self.stats.read().get(id).cloned().unwrap_or_default()
    }

    pub fn record_outcome(&self, id: &str, success: bool) -> Result<StrategyStats, AnalyticsError> {
        if !self.catalog.contains_key(id) {
            return Err(AnalyticsError::NotFound(format!("strategy {id}")));
        }
        let mut stats = self.stats.write();
        let entry = stats.entry(id.to_string()).or_default();
        entry.usage_count += 1;
        if success {
            entry.successes += 1;
        }
        Ok(entry.clone())
    }

    pub fn historical_success_rate(&self, id: &str) -> f64 {
        self.stats(id).success_rate(self.params.prior_success_rate)
    }

    pub fn score(&self, strategy: &StrategyDefinition, preferences: &ElementPreferences) -> f64 {
        let stats = self.stats(&strategy.id);
        let mut score = stats.success_rate(self.params.prior_success_rate);
        for element in strategy.enabled_elements() {
            if let Some(pref) = preferences.get(&element) {
                score += self.params.preference_weight * pref;
            }
        }
        if stats.usage_count > self.params.overuse_threshold {
            score *= self.params.overuse_factor;
        }
        score
    }

    pub fn candidates(
        &self,
        engagement: EngagementLevel,
        motivation: MotivationState,
    ) -> Vec<&StrategyDefinition> {
        let struggling = engagement.is_struggling() && motivation.is_slipping();
        self.catalog
            .values()
            .filter(|s| s.targets(engagement, motivation) || (struggling && s.targets_improvement()))
            .collect()
    }

    pub fn select(
        &self,
        engagement: EngagementLevel,
        motivation: MotivationState,
        preferences: &ElementPreferences,
    ) -> GamificationStrategyDecision {
        let candidates = self.candidates(engagement, motivation);

        let mut best: Option<(&StrategyDefinition, f64)> = None;
        for &candidate in &candidates {
            let score = self.score(candidate, preferences);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((candidate, score)),
            }
        }

        let (strategy, score, basis) = match best {
            Some((s, score)) => {
                let basis = if s.targets(engagement, motivation) {
                    SelectionBasis::ExactMatch
                } else {
                    SelectionBasis::ImprovementTarget
                };
                (s.clone(), score, basis)
            }
            None => {
                let fallback = self.default_strategy();
                let score = self.score(&fallback, preferences);
                (fallback, score, SelectionBasis::DefaultFallback)
            }
        };

        GamificationStrategyDecision {
            strategy_id: strategy.id.clone(),
            element_weights: strategy.element_weights.clone(),
            timing_multipliers: strategy.timing,
            rationale: StrategyRationale {
                basis,
                engagement_level: engagement,
                motivation_state: motivation,
                score,
                candidate_count: candidates.len(),
            },
        }
    }

    fn default_strategy(&self) -> StrategyDefinition {
        self.catalog
            .get(&self.params.default_strategy)
            .cloned()
            .unwrap_or_else(|| {
                StrategyDefinition::new(
                    &self.params.default_strategy,
                    (EngagementLevel::Moderate, MotivationState::Neutral),
                    &[(E::Points, 0.5), (E::Badges, 0.5), (E::ProgressBars, 0.5)],
                    (1.0, 1.0, 1.0),
                )
            })
    }
}
