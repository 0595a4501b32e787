#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use learning_analytics::analytics::{
    ActivityEvent, AnalyticsConfig, AnalyticsEngine, EventKind, InMemoryActivityRepository,
    InMemoryProfileRepository, ManualClock, MetricsUpdate, NewActivity, ProfileRepository,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 15, 30, 0).unwrap()
}

pub fn engine_with(profiles: Arc<dyn ProfileRepository>) -> (Arc<AnalyticsEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = AnalyticsEngine::new(
        AnalyticsConfig::default(),
        clock.clone(),
        profiles,
        Arc::new(InMemoryActivityRepository::new()),
    );
    (Arc::new(engine), clock)
}

pub fn test_engine() -> (Arc<AnalyticsEngine>, Arc<ManualClock>) {
    engine_with(Arc::new(InMemoryProfileRepository::new()))
}

pub fn new_activity(id: &str, user: &str, topic: &str) -> NewActivity {
    NewActivity {
        activity_id: Some(id.to_string()),
        user_id: user.to_string(),
        topic_id: topic.to_string(),
        activity_type: "exercise".to_string(),
        title: format!("exercise {id}"),
        difficulty: Some(3.0),
        objectives: vec![format!("{topic}-basics")],
    }
}

pub fn metrics(accuracy: f64, speed: f64, engagement: f64) -> MetricsUpdate {
    MetricsUpdate {
        accuracy: Some(accuracy),
        speed_score: Some(speed),
        engagement_score: Some(engagement),
        completion_rate: None,
    }
}

pub fn event(user: &str, kind: EventKind) -> ActivityEvent {
    ActivityEvent {
        user_id: user.to_string(),
        occurred_at: None,
        kind,
    }
}
