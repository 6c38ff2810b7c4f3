use thiserror::Error;

use crate::matches::MatchType;
use crate::shared::LegId;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("No scoring rule registered for {0}")]
    UnsupportedMatchType(MatchType),

    #[error("Leg {0} is not finished")]
    LegNotFinished(LegId),

    #[error("Replay error: {0}")]
    Replay(String),
}
