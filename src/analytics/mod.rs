pub mod activity;
pub mod cache;
pub mod clock;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod modeling;
pub mod persistence;
pub mod types;

pub use activity::Interaction;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AnalyticsConfig;
pub use engine::{ActivityEvent, AnalyticsEngine, CompletionOutcome, EventKind, EventOutcome};
pub use error::{AnalyticsError, AnalyticsResult, PersistenceError, Signal, SkipReason, ValidationError};
pub use persistence::{
    ActivityRepository, InMemoryActivityRepository, InMemoryProfileRepository,
    JsonFileProfileRepository, ProfileRepository,
};
#[allow(unused_imports)]
pub use types::*;
