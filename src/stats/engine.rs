use serde::Serialize;
use std::fmt::Debug;

use super::{models::StatisticsRow, StatsError};
use crate::darts::Visit;
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::shared::PlayerId;

/// Where a visit sits in the replay.
#[derive(Debug, Clone, Copy)]
pub struct RoundContext<'a> {
    pub leg: &'a Leg,
    /// 1-based; advances after every `players.len()` visits.
    pub round: u32,
    pub visit_index: usize,
}

/// Transient per-player state rebuilt on every replay. Never persisted.
#[derive(Debug, Clone)]
pub struct PlayerLegState<S> {
    pub player_id: PlayerId,
    pub current_score: i32,
    pub darts_thrown: u32,
    pub visits: u32,
    pub hits: u32,
    pub state: S,
}

impl<S: Default> PlayerLegState<S> {
    pub fn new(player_id: PlayerId, current_score: i32) -> Self {
        Self {
            player_id,
            current_score,
            darts_thrown: 0,
            visits: 0,
            hits: 0,
            state: S::default(),
        }
    }
}

/// What a rule did with one visit. The engine folds it into the thrower's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitOutcome {
    pub score_delta: i32,
    pub hits: u32,
}

impl VisitOutcome {
    pub fn new(score_delta: i32, hits: u32) -> Self {
        Self { score_delta, hits }
    }

    /// Moves the score to `target` regardless of where it is now.
    pub fn reset_to(current: i32, target: i32, hits: u32) -> Self {
        Self {
            score_delta: target - current,
            hits,
        }
    }
}

/// Variant-specific scoring, replayed over a leg's visits in recorded order.
///
/// Implementations must be pure functions of the leg and its visits so that
/// the live finish path and a later recalculation produce identical rows.
pub trait ScoringRule: Send + Sync {
    type State: Default + Clone + Debug + Send;
    type Board: Default + Debug + Send;
    type Statistics: Serialize;

    fn match_types(&self) -> &'static [MatchType];

    /// Logical statistics table the rows are stored under.
    fn table(&self) -> &'static str;

    fn starting_score(&self, _leg: &Leg, _player_id: PlayerId) -> i32 {
        0
    }

    /// State shared by all players, e.g. which numbers are closed.
    fn new_board(&self, _leg: &Leg) -> Self::Board {
        Self::Board::default()
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        board: &mut Self::Board,
        players: &mut [PlayerLegState<Self::State>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError>;

    fn finalize(
        &self,
        leg: &Leg,
        board: &Self::Board,
        players: &[PlayerLegState<Self::State>],
        index: usize,
    ) -> Self::Statistics;
}

/// Object-safe view of a replay engine, stored in the registry.
pub trait VariantCalculator: Send + Sync {
    fn match_types(&self) -> &'static [MatchType];

    fn table(&self) -> &'static str;

    /// One row per leg player, in the leg's player order.
    fn calculate(&self, leg: &Leg) -> Result<Vec<StatisticsRow>, StatsError>;
}

/// Final state of a replay.
#[derive(Debug)]
pub struct Replay<R: ScoringRule> {
    pub board: R::Board,
    pub players: Vec<PlayerLegState<R::State>>,
}

pub struct ReplayEngine<R> {
    rule: R,
}

impl<R: ScoringRule> ReplayEngine<R> {
    pub fn new(rule: R) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    pub fn replay(&self, leg: &Leg) -> Result<Replay<R>, StatsError> {
        if leg.players.is_empty() {
            return Err(StatsError::Replay(format!("Leg {} has no players", leg.id)));
        }

        let mut players: Vec<PlayerLegState<R::State>> = leg
            .players
            .iter()
            .map(|&player_id| {
                PlayerLegState::new(player_id, self.rule.starting_score(leg, player_id))
            })
            .collect();
        let mut board = self.rule.new_board(leg);
        let player_count = players.len();

        for (visit_index, visit) in leg.visits.iter().enumerate() {
            let current = players
                .iter()
                .position(|p| p.player_id == visit.player_id)
                .ok_or_else(|| {
                    StatsError::Replay(format!(
                        "Visit {} belongs to player {} who is not in leg {}",
                        visit.id, visit.player_id, leg.id
                    ))
                })?;

            let ctx = RoundContext {
                leg,
                round: (visit_index / player_count) as u32 + 1,
                visit_index,
            };
            let outcome = self
                .rule
                .apply(&ctx, &mut board, &mut players, current, visit)?;

            let player = &mut players[current];
            player.current_score += outcome.score_delta;
            player.hits += outcome.hits;
            player.darts_thrown += visit.darts_thrown();
            player.visits += 1;
        }

        Ok(Replay { board, players })
    }

    pub fn statistics(&self, leg: &Leg) -> Result<Vec<R::Statistics>, StatsError> {
        let replay = self.replay(leg)?;
        Ok((0..replay.players.len())
            .map(|index| self.rule.finalize(leg, &replay.board, &replay.players, index))
            .collect())
    }
}

impl<R: ScoringRule> VariantCalculator for ReplayEngine<R> {
    fn match_types(&self) -> &'static [MatchType] {
        self.rule.match_types()
    }

    fn table(&self) -> &'static str {
        self.rule.table()
    }

    fn calculate(&self, leg: &Leg) -> Result<Vec<StatisticsRow>, StatsError> {
        let statistics = self.statistics(leg)?;
        leg.players
            .iter()
            .zip(statistics)
            .map(|(&player_id, stats)| {
                StatisticsRow::from_statistics(self.rule.table(), leg.id, player_id, &stats)
            })
            .collect()
    }
}

/// `numerator / denominator`, or zero when nothing was attempted.
pub fn ratio(numerator: impl Into<f64>, denominator: impl Into<f64>) -> f64 {
    let denominator = denominator.into();
    if denominator == 0.0 {
        0.0
    } else {
        numerator.into() / denominator
    }
}

/// Exclusive visit-score buckets shared by the point-scoring variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBuckets {
    pub score_60s_plus: u32,
    pub score_100s_plus: u32,
    pub score_140s_plus: u32,
    pub score_180s: u32,
}

impl ScoreBuckets {
    pub fn record(&mut self, score: i32) {
        match score {
            180 => self.score_180s += 1,
            140..=179 => self.score_140s_plus += 1,
            100..=139 => self.score_100s_plus += 1,
            60..=99 => self.score_60s_plus += 1,
            _ => {}
        }
    }
}

/// Counts of visits that scored 5 to 9 marks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkBuckets {
    pub marks_5: u32,
    pub marks_6: u32,
    pub marks_7: u32,
    pub marks_8: u32,
    pub marks_9: u32,
}

impl MarkBuckets {
    pub fn record(&mut self, marks: u32) {
        match marks {
            5 => self.marks_5 += 1,
            6 => self.marks_6 += 1,
            7 => self.marks_7 += 1,
            8 => self.marks_8 += 1,
            9 => self.marks_9 += 1,
            _ => {}
        }
    }
}

/// Longest run of consecutive successes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
}

impl Streak {
    pub fn record(&mut self, hit: bool) {
        if hit {
            self.current += 1;
            self.longest = self.longest.max(self.current);
        } else {
            self.current = 0;
        }
    }
}
