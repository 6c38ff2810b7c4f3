// Public API
pub use engine::{
    ratio, MarkBuckets, PlayerLegState, Replay, ReplayEngine, RoundContext, ScoreBuckets,
    ScoringRule, Streak, VariantCalculator, VisitOutcome,
};
pub use errors::StatsError;
pub use handlers::{leg_statistics, recalculate_statistics, RecalculateRequest};
pub use models::StatisticsRow;
pub use recalculate::{LegSelection, RecalculationDriver, RecalculationMode, RecalculationReport};
pub use registry::{StatisticsRegistry, StatisticsRegistryBuilder};
pub use service::StatisticsService;

pub mod rules;

// Internal modules
mod engine;
mod errors;
mod handlers;
mod models;
mod recalculate;
mod registry;
mod service;
