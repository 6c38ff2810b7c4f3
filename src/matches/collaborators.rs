use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::leg::Leg;
use crate::shared::MatchId;

/// Failure reported by a subsystem triggered after a leg or match finishes.
/// These never roll back the finish that triggered them.
#[derive(Debug, Error)]
#[error("{subsystem} failed: {message}")]
pub struct CollaboratorError {
    pub subsystem: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(subsystem: &'static str, message: impl Into<String>) -> Self {
        Self {
            subsystem,
            message: message.into(),
        }
    }
}

/// Rating subsystem, invoked once when a match transitions to finished.
#[async_trait]
pub trait EloRecalculator: Send + Sync {
    async fn recalculate_for_match(&self, match_id: MatchId) -> Result<(), CollaboratorError>;

    async fn recalculate_for_tournament(&self, tournament_id: i64)
        -> Result<(), CollaboratorError>;
}

/// Badge subsystem, invoked after every finished leg.
#[async_trait]
pub trait BadgeChecker: Send + Sync {
    async fn check_leg(&self, leg: &Leg) -> Result<(), CollaboratorError>;
}

/// Elo hook for deployments without a rating service.
pub struct NoOpEloRecalculator;

#[async_trait]
impl EloRecalculator for NoOpEloRecalculator {
    async fn recalculate_for_match(&self, match_id: MatchId) -> Result<(), CollaboratorError> {
        debug!(match_id, "Skipping Elo recalculation for match");
        Ok(())
    }

    async fn recalculate_for_tournament(
        &self,
        tournament_id: i64,
    ) -> Result<(), CollaboratorError> {
        debug!(tournament_id, "Skipping Elo recalculation for tournament");
        Ok(())
    }
}

pub struct NoOpBadgeChecker;

#[async_trait]
impl BadgeChecker for NoOpBadgeChecker {
    async fn check_leg(&self, leg: &Leg) -> Result<(), CollaboratorError> {
        debug!(leg_id = leg.id, "Skipping badge check");
        Ok(())
    }
}
