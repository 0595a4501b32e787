use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::analytics::activity::Interaction;
use crate::analytics::cache::{CacheStats, UserSlot, UserSlots};
use crate::analytics::clock::{Clock, SystemClock};
use crate::analytics::config::AnalyticsConfig;
use crate::analytics::decision::{DifficultyPolicy, GamificationSelector, StrategyStats};
use crate::analytics::error::{AnalyticsError, AnalyticsResult, ValidationError};
use crate::analytics::modeling::{EngagementScorer, SkillEstimator, SkillUpdate};
use crate::analytics::persistence::{
    ActivityRepository, InMemoryActivityRepository, InMemoryProfileRepository, ProfileRepository,
};
use crate::analytics::types::{
    ActivityRecord, DifficultyAdjustmentDecision, ElementPreferences, EngagementProfile,
    GamificationStrategyDecision, MetricsUpdate, NewActivity, ProgressSnapshot, SkillProfile,
    SkillSnapshot,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Start {
        activity: NewActivity,
    },
    Interaction {
        activity_id: String,
        interaction: Interaction,
    },
    Pause {
        activity_id: String,
    },
    Resume {
        activity_id: String,
    },
    Abandon {
        activity_id: String,
    },
    Complete {
        activity_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<MetricsUpdate>,
    },
}

/// One line of an activity stream. `occurred_at` is informational for replays; the
/// engine always stamps with its own clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub activity: ActivityRecord,
    pub skill: SkillProfile,
    pub update: SkillUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    Activity(ActivityRecord),
    Completed(CompletionOutcome),
}

pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    clock: Arc<dyn Clock>,
    profiles: Arc<dyn ProfileRepository>,
    activities: Arc<dyn ActivityRepository>,
    estimator: SkillEstimator,
    engagement: EngagementScorer,
    difficulty: DifficultyPolicy,
    gamification: GamificationSelector,
    slots: UserSlots,
}

impl AnalyticsEngine {
    pub fn new(
        config: AnalyticsConfig,
        clock: Arc<dyn Clock>,
        profiles: Arc<dyn ProfileRepository>,
        activities: Arc<dyn ActivityRepository>,
    ) -> Self {
        let estimator = SkillEstimator::new(
            config.skill.clone(),
            config.performance.clone(),
            config.trend.clone(),
        );
        let engagement = EngagementScorer::new(config.engagement.clone(), config.trend.clone());
        let difficulty = DifficultyPolicy::new(config.difficulty.clone());
        let gamification = GamificationSelector::new(config.gamification.clone());
        let slots = UserSlots::new(config.cache.max_users);

        tracing::info!(
            window_days = config.engagement.window_days,
            history_capacity = config.skill.history_capacity,
            cache_max_users = config.cache.max_users,
            "analytics engine initialized"
        );

        Self {
            config,
            clock,
            profiles,
            activities,
            estimator,
            engagement,
            difficulty,
            gamification,
            slots,
        }
    }

    /// Engine backed by in-memory repositories and the system clock.
    pub fn in_memory(config: AnalyticsConfig) -> Self {
        Self::new(
            config,
            Arc::new(SystemClock),
            Arc::new(InMemoryProfileRepository::new()),
            Arc::new(InMemoryActivityRepository::new()),
        )
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn gamification(&self) -> &GamificationSelector {
        &self.gamification
    }

    pub async fn start_activity(&self, input: NewActivity) -> AnalyticsResult<ActivityRecord> {
        if let Some(difficulty) = input.difficulty {
            let (min, max) = (
                self.config.difficulty.min_difficulty,
                self.config.difficulty.max_difficulty,
            );
            if !difficulty.is_finite() || difficulty < min || difficulty > max {
                return Err(ValidationError::DifficultyOutOfRange(difficulty).into());
            }
        }

        let slot = self.slots.slot(&input.user_id);
        let _guard = slot.lock().await;

        if let Some(id) = input.activity_id.as_deref() {
            if self.activities.load_activity(id).await?.is_some() {
                return Err(ValidationError::DuplicateActivity(id.to_string()).into());
            }
        }

        let now = self.clock.now();
        let mut record = ActivityRecord::create(input, now);
        record.start(now)?;
        self.activities.save_activity(&record).await?;

        tracing::debug!(
            user_id = %record.user_id,
            topic_id = %record.topic_id,
            activity_id = %record.id,
            "activity started"
        );
        Ok(record)
    }

    pub async fn record_interaction(
        &self,
        activity_id: &str,
        interaction: &Interaction,
    ) -> AnalyticsResult<ActivityRecord> {
        self.mutate_activity(activity_id, |record, now| {
            record.apply_interaction(interaction, now)
        })
        .await
    }

    pub async fn pause_activity(&self, activity_id: &str) -> AnalyticsResult<ActivityRecord> {
        self.mutate_activity(activity_id, |record, now| record.pause(now))
            .await
    }

    pub async fn resume_activity(&self, activity_id: &str) -> AnalyticsResult<ActivityRecord> {
        self.mutate_activity(activity_id, |record, now| record.resume(now))
            .await
    }

    pub async fn abandon_activity(&self, activity_id: &str) -> AnalyticsResult<ActivityRecord> {
        let record = self
            .mutate_activity(activity_id, |record, now| record.abandon(now))
            .await?;
        tracing::debug!(user_id = %record.user_id, activity_id = %record.id, "activity abandoned");
        Ok(record)
    }

    /// Finalizes the activity and folds it into the user's skill profile for the topic,
    /// creating the profile on first completion. Both documents are written through to
    /// the repositories before the cache is updated.
    pub async fn complete_activity(
        &self,
        activity_id: &str,
        final_metrics: Option<&MetricsUpdate>,
    ) -> AnalyticsResult<CompletionOutcome> {
        let user_id = self.activity_owner(activity_id).await?;
        let slot = self.slots.slot(&user_id);
        let mut guard = slot.lock().await;

        let original = self.load_activity(activity_id).await?;
        let mut record = original.clone();
        let now = self.clock.now();
        if let Some(update) = final_metrics {
            record.apply_metrics(update)?;
        }
        record.complete(now)?;

        let mut skill = match self
            .cached_skill(&mut guard, &record.user_id, &record.topic_id)
            .await?
        {
            Some(profile) => profile,
            None => self
                .estimator
                .create_profile(&record.user_id, &record.topic_id, now),
        };
        let update = self.estimator.apply(&mut skill, &record)?;

        self.activities.save_activity(&record).await?;
        if let Err(err) = self.profiles.save_skill(&skill).await {
            tracing::warn!(
                user_id = %record.user_id,
                topic_id = %record.topic_id,
                error = %err,
                "failed to persist skill profile, reverting completion"
            );
            // Put the pre-completion record back so the completion can be retried.
            if let Err(revert_err) = self.activities.save_activity(&original).await {
                tracing::warn!(
                    activity_id = %original.id,
                    error = %revert_err,
                    "failed to revert activity after skill save failure"
                );
            }
            return Err(err.into());
        }
        guard.skills.insert(record.topic_id.clone(), skill.clone());

        tracing::debug!(
            user_id = %record.user_id,
            topic_id = %record.topic_id,
            activity_id = %record.id,
            skill_level = skill.skill_level,
            category = skill.skill_category().as_str(),
            "activity completed"
        );
        if update.category_changed() {
            tracing::info!(
                user_id = %record.user_id,
                topic_id = %record.topic_id,
                from = update.previous_category.as_str(),
                to = update.new_category.as_str(),
                "skill category changed"
            );
        }

        Ok(CompletionOutcome {
            activity: record,
            skill,
            update,
        })
    }

    /// Re-applies an already completed activity to an existing profile. Fails with
    /// `NotFound` rather than creating the profile. Not idempotent.
    pub async fn update_skill(&self, activity_id: &str) -> AnalyticsResult<SkillUpdate> {
        let user_id = self.activity_owner(activity_id).await?;
        let slot = self.slots.slot(&user_id);
        let mut guard = slot.lock().await;

        let record = self.load_activity(activity_id).await?;
        self.cached_skill(&mut guard, &record.user_id, &record.topic_id)
            .await?;

        let mut skills = guard.skills.clone();
        let update = self.estimator.apply_existing(&mut skills, &record)?;
        if let Some(profile) = skills.get(&record.topic_id) {
            self.profiles.save_skill(profile).await?;
        }
        guard.skills = skills;
        Ok(update)
    }

    pub async fn skill_profile(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> AnalyticsResult<Option<SkillProfile>> {
        let slot = self.slots.slot(user_id);
        let mut guard = slot.lock().await;
        self.cached_skill(&mut guard, user_id, topic_id).await
    }

    /// Recomputes the engagement profile from the trailing window and persists it.
    pub async fn engagement_profile(&self, user_id: &str) -> AnalyticsResult<EngagementProfile> {
        let slot = self.slots.slot(user_id);
        let _guard = slot.lock().await;
        self.compute_engagement(user_id).await
    }

    pub async fn recommend_difficulty(
        &self,
        user_id: &str,
        topic_id: &str,
        current_difficulty: f64,
    ) -> AnalyticsResult<DifficultyAdjustmentDecision> {
        let slot = self.slots.slot(user_id);
        let mut guard = slot.lock().await;

        let accuracies = self
            .cached_skill(&mut guard, user_id, topic_id)
            .await?
            .map(|p| p.recent_accuracies(self.config.difficulty.sample_window))
            .unwrap_or_default();
        let has_pattern = self.profiles.load_engagement(user_id).await?.is_some();

        let decision = self
            .difficulty
            .recommend(current_difficulty, &accuracies, has_pattern)?;
        tracing::debug!(
            user_id = %user_id,
            topic_id = %topic_id,
            recommended = decision.recommended,
            reason = decision.reason.as_str(),
            "difficulty recommended"
        );
        Ok(decision)
    }

    pub async fn select_gamification(
        &self,
        user_id: &str,
    ) -> AnalyticsResult<GamificationStrategyDecision> {
        let slot = self.slots.slot(user_id);
        let _guard = slot.lock().await;

        let profile = self.compute_engagement(user_id).await?;
        let preferences = self
            .profiles
            .load_preferences(user_id)
            .await?
            .unwrap_or_default();
        let decision = self.gamification.select(
            profile.engagement_level(),
            profile.motivation_state(),
            &preferences,
        );
        tracing::debug!(
            user_id = %user_id,
            strategy_id = %decision.strategy_id,
            "gamification strategy selected"
        );
        Ok(decision)
    }

    pub fn record_strategy_outcome(
        &self,
        strategy_id: &str,
        success: bool,
    ) -> AnalyticsResult<StrategyStats> {
        self.gamification.record_outcome(strategy_id, success)
    }

    /// Preference weights must lie in [0, 1].
    pub async fn set_element_preferences(
        &self,
        user_id: &str,
        preferences: ElementPreferences,
    ) -> AnalyticsResult<()> {
        if let Some(bad) = preferences
            .values()
            .copied()
            .find(|v| !(0.0..=1.0).contains(v))
        {
            return Err(ValidationError::MetricOutOfRange {
                metric: "element_preference",
                value: bad,
            }
            .into());
        }

        let slot = self.slots.slot(user_id);
        let _guard = slot.lock().await;
        self.profiles.save_preferences(user_id, &preferences).await?;
        Ok(())
    }

    pub async fn progress_snapshot(&self, user_id: &str) -> AnalyticsResult<ProgressSnapshot> {
        let slot = self.slots.slot(user_id);
        let _guard = slot.lock().await;

        let engagement = self.compute_engagement(user_id).await?;
        let skills = self
            .profiles
            .list_skills(user_id)
            .await?
            .iter()
            .map(SkillSnapshot::from)
            .collect();

        Ok(ProgressSnapshot {
            user_id: user_id.to_string(),
            generated_at: self.clock.now(),
            skills,
            engagement_level: engagement.engagement_level(),
            motivation_state: engagement.motivation_state(),
            risk_level: engagement.risk_level(),
            engagement,
        })
    }

    pub async fn apply_event(&self, event: &ActivityEvent) -> AnalyticsResult<EventOutcome> {
        match &event.kind {
            EventKind::Start { activity } => {
                if activity.user_id != event.user_id {
                    return Err(ValidationError::ProfileMismatch {
                        activity_id: activity.activity_id.clone().unwrap_or_default(),
                        user_id: event.user_id.clone(),
                        topic_id: activity.topic_id.clone(),
                    }
                    .into());
                }
                self.start_activity(activity.clone())
                    .await
                    .map(EventOutcome::Activity)
            }
            EventKind::Interaction {
                activity_id,
                interaction,
            } => {
                self.ensure_owner(activity_id, &event.user_id).await?;
                self.record_interaction(activity_id, interaction)
                    .await
                    .map(EventOutcome::Activity)
            }
            EventKind::Pause { activity_id } => {
                self.ensure_owner(activity_id, &event.user_id).await?;
                self.pause_activity(activity_id)
                    .await
                    .map(EventOutcome::Activity)
            }
            EventKind::Resume { activity_id } => {
                self.ensure_owner(activity_id, &event.user_id).await?;
                self.resume_activity(activity_id)
                    .await
                    .map(EventOutcome::Activity)
            }
            EventKind::Abandon { activity_id } => {
                self.ensure_owner(activity_id, &event.user_id).await?;
                self.abandon_activity(activity_id)
                    .await
                    .map(EventOutcome::Activity)
            }
            EventKind::Complete {
                activity_id,
                metrics,
            } => {
                self.ensure_owner(activity_id, &event.user_id).await?;
                self.complete_activity(activity_id, metrics.as_ref())
                    .await
                    .map(EventOutcome::Completed)
            }
        }
    }

    /// Users run concurrently; each user's events run strictly in input order. Results
    /// line up with `events`.
    pub async fn process_batch(
        &self,
        events: Vec<ActivityEvent>,
    ) -> Vec<AnalyticsResult<EventOutcome>> {
        let total = events.len();
        let mut per_user: Vec<(String, Vec<(usize, ActivityEvent)>)> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();
        for (idx, event) in events.into_iter().enumerate() {
            let pos = *index_of.entry(event.user_id.clone()).or_insert_with(|| {
                per_user.push((event.user_id.clone(), Vec::new()));
                per_user.len() - 1
            });
            per_user[pos].1.push((idx, event));
        }

        tracing::debug!(events = total, users = per_user.len(), "processing event batch");

        let runs = per_user.into_iter().map(|(_, queue)| async move {
            let mut out = Vec::with_capacity(queue.len());
            for (idx, event) in queue {
                let result = self.apply_event(&event).await;
                if let Err(err) = &result {
                    tracing::warn!(
                        user_id = %event.user_id,
                        error = %err,
                        "event rejected"
                    );
                }
                out.push((idx, result));
            }
            out
        });

        let mut slots: Vec<Option<AnalyticsResult<EventOutcome>>> =
            (0..total).map(|_| None).collect();
        for (idx, result) in join_all(runs).await.into_iter().flatten() {
            slots[idx] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }

    /// Clears cached state for the user; the next access reloads from the repository.
    pub async fn invalidate_user(&self, user_id: &str) {
        if !self.slots.contains(user_id) {
            return;
        }
        let slot = self.slots.slot(user_id);
        slot.lock().await.clear();
        drop(slot);
        self.slots.remove_if_idle(user_id);
        tracing::debug!(user_id = %user_id, "user cache invalidated");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.slots.stats()
    }

    async fn compute_engagement(&self, user_id: &str) -> AnalyticsResult<EngagementProfile> {
        let now = self.clock.now();
        let since = self.engagement.window_start(now);
        let records = self.activities.activities_since(user_id, since).await?;
        let profile = self.engagement.score(user_id, &records, now);
        self.profiles.save_engagement(&profile).await?;
        Ok(profile)
    }

    async fn cached_skill(
        &self,
        slot: &mut UserSlot,
        user_id: &str,
        topic_id: &str,
    ) -> AnalyticsResult<Option<SkillProfile>> {
        if let Some(profile) = slot.skills.get(topic_id) {
            return Ok(Some(profile.clone()));
        }
        let loaded = self.profiles.load_skill(user_id, topic_id).await?;
        if let Some(profile) = &loaded {
            slot.skills.insert(topic_id.to_string(), profile.clone());
        }
        Ok(loaded)
    }

    async fn load_activity(&self, activity_id: &str) -> AnalyticsResult<ActivityRecord> {
        self.activities
            .load_activity(activity_id)
            .await?
            .ok_or_else(|| AnalyticsError::NotFound(format!("activity {activity_id}")))
    }

    async fn activity_owner(&self, activity_id: &str) -> AnalyticsResult<String> {
        Ok(self.load_activity(activity_id).await?.user_id)
    }

    async fn ensure_owner(&self, activity_id: &str, user_id: &str) -> AnalyticsResult<()> {
        let owner = self.activity_owner(activity_id).await?;
        if owner != user_id {
            return Err(AnalyticsError::NotFound(format!(
                "activity {activity_id} for user {user_id}"
            )));
        }
        Ok(())
    }

    async fn mutate_activity<F>(&self, activity_id: &str, op: F) -> AnalyticsResult<ActivityRecord>
    where
        F: FnOnce(&mut ActivityRecord, DateTime<Utc>) -> Result<(), ValidationError>,
    {
        let user_id = self.activity_owner(activity_id).await?;
        let slot = self.slots.slot(&user_id);
        let _guard = slot.lock().await;

        let mut record = self.load_activity(activity_id).await?;
        op(&mut record, self.clock.now())?;
        self.activities.save_activity(&record).await?;
        tracing::trace!(activity_id = %record.id, status = %record.status, "activity updated");
        Ok(record)
    }
}
