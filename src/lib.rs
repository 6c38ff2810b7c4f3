// Library crate for the darts scoring server
// This file exposes the public API for the binary and integration tests

pub mod config;
pub mod darts;
pub mod leg;
pub mod matches;
pub mod repository;
pub mod routes;
pub mod shared;
pub mod stats;

// Re-export commonly used types for easier access in tests
pub use config::AppConfig;
pub use darts::{Dart, Darts, OutshotType, Visit};
pub use leg::{Leg, LegFinished, LegParameters, LegService, NewLeg};
pub use matches::{Match, MatchMode, MatchOutcome, MatchType, NewMatch};
pub use repository::{DartsRepository, InMemoryDartsRepository, PostgresDartsRepository};
pub use shared::{AppError, AppState};
pub use stats::{
    LegSelection, RecalculationDriver, RecalculationMode, StatisticsRow, StatisticsService,
};
