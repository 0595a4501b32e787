pub mod engagement;
pub mod performance;
pub mod skill;
pub mod trend;

pub use engagement::EngagementScorer;
pub use performance::{overall_score, weighted_score};
pub use skill::{SkillEstimator, SkillUpdate};
pub use trend::TrendAnalyzer;
