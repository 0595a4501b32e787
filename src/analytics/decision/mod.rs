pub mod difficulty;
pub mod gamification;

pub use difficulty::DifficultyPolicy;
pub use gamification::{GamificationSelector, StrategyDefinition, StrategyStats};
