use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::darts::Visit;
use crate::leg::{Leg, NewLeg};
use crate::matches::{Match, MatchOutcome, MatchType, NewMatch, OweEntry};
use crate::shared::{AppError, LegId, MatchId, PlayerId, VisitId};
use crate::stats::StatisticsRow;

// Public API
pub use memory::InMemoryDartsRepository;
pub use postgres::PostgresDartsRepository;

// Internal modules
mod memory;
mod postgres;

/// Filter for "legs of this variant" listings.
#[derive(Debug, Clone, PartialEq)]
pub struct LegQuery {
    pub leg_type: MatchType,
    pub finished_only: bool,
    pub since: Option<DateTime<Utc>>,
}

impl LegQuery {
    pub fn matches(&self, leg: &Leg) -> bool {
        leg.leg_type == self.leg_type
            && (!self.finished_only || leg.is_finished)
            && self.since.map_or(true, |since| leg.created_at >= since)
    }
}

/// Everything written when a leg finishes, committed as one unit.
#[derive(Debug, Clone)]
pub struct LegFinish {
    pub leg_id: LegId,
    pub match_id: MatchId,
    pub visit: Visit,
    pub next_player_id: PlayerId,
    pub winner_id: PlayerId,
    pub finished_at: DateTime<Utc>,
    pub statistics: Vec<StatisticsRow>,
    pub outcome: MatchOutcome,
    pub owes: Vec<OweEntry>,
    pub next_leg: Option<NewLeg>,
}

#[derive(Debug, Clone)]
pub struct LegFinishCommit {
    pub visit: Visit,
    pub next_leg: Option<Leg>,
}

/// Reverse of a [`LegFinish`].
#[derive(Debug, Clone)]
pub struct LegReopen {
    pub leg_id: LegId,
    pub match_id: MatchId,
    /// The finishing visit to remove.
    pub visit_id: VisitId,
    pub current_player_id: PlayerId,
    pub reopen_match: bool,
    /// Owe increments made by the finish, to take back.
    pub owes: Vec<OweEntry>,
    /// Empty successor leg created by the finish.
    pub discard_leg: Option<LegId>,
}

#[derive(Debug, Clone)]
pub struct LegDeletion {
    pub leg_id: LegId,
    pub match_id: MatchId,
    /// Leg the match points at afterwards. `None` deletes the match.
    pub current_leg_id: Option<LegId>,
}

/// Persistence port for matches, legs, visits, statistics and owes.
///
/// Every method is one atomic changeset: either all of its writes land or
/// none do.
#[async_trait]
pub trait DartsRepository: Send + Sync {
    /// Creates the match and its first leg. `first_leg.match_id` is ignored.
    async fn create_match(
        &self,
        new_match: &NewMatch,
        first_leg: &NewLeg,
    ) -> Result<(Match, Leg), AppError>;

    async fn get_match(&self, match_id: MatchId) -> Result<Option<Match>, AppError>;

    /// A leg with its visits in recorded order.
    async fn get_leg(&self, leg_id: LegId) -> Result<Option<Leg>, AppError>;

    /// Legs of a match, oldest first.
    async fn legs_for_match(&self, match_id: MatchId) -> Result<Vec<Leg>, AppError>;

    async fn legs_of_type(&self, query: &LegQuery) -> Result<Vec<Leg>, AppError>;

    /// Inserts a leg and makes it the match's current leg.
    async fn start_leg(&self, new_leg: &NewLeg) -> Result<Leg, AppError>;

    /// Appends a visit to an open leg. Fails with `Conflict` when the leg is
    /// finished or it is not the visit's player's turn.
    async fn insert_visit(
        &self,
        visit: &Visit,
        next_player_id: PlayerId,
    ) -> Result<Visit, AppError>;

    /// Overwrites stored visits of one leg and, when given, replaces the leg's
    /// statistics.
    async fn replace_visits(
        &self,
        leg_id: LegId,
        visits: &[Visit],
        statistics: &[StatisticsRow],
    ) -> Result<(), AppError>;

    async fn delete_last_visit(
        &self,
        leg_id: LegId,
        visit_id: VisitId,
        current_player_id: PlayerId,
    ) -> Result<(), AppError>;

    async fn commit_leg_finish(&self, finish: &LegFinish) -> Result<LegFinishCommit, AppError>;

    async fn commit_leg_reopen(&self, reopen: &LegReopen) -> Result<(), AppError>;

    async fn delete_leg(&self, deletion: &LegDeletion) -> Result<(), AppError>;

    async fn update_player_order(
        &self,
        leg_id: LegId,
        players: &[PlayerId],
        current_player_id: PlayerId,
    ) -> Result<(), AppError>;

    async fn statistics_for_leg(&self, leg_id: LegId) -> Result<Vec<StatisticsRow>, AppError>;

    /// Replaces the stored rows of every `(table, leg)` present in `rows`.
    async fn apply_statistics(&self, rows: &[StatisticsRow]) -> Result<(), AppError>;

    async fn owed(
        &self,
        ower: PlayerId,
        owee: PlayerId,
        owe_type_id: i64,
    ) -> Result<i64, AppError>;

    /// Reduces a debt by `amount`, never below zero. Returns what is still owed.
    async fn payback(
        &self,
        ower: PlayerId,
        owee: PlayerId,
        owe_type_id: i64,
        amount: i64,
    ) -> Result<i64, AppError>;
}
