use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::darts::{Dart, Visit};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{ratio, PlayerLegState, RoundContext, ScoringRule, VisitOutcome};
use crate::shared::PlayerId;
use crate::stats::StatsError;

/// Lives and elimination order, indexed like the leg's players.
#[derive(Debug, Default)]
pub struct KnockoutBoard {
    lives: Vec<u32>,
    positions: Vec<Option<u32>>,
    /// Visit scores of the round in progress, by player index.
    round_scores: BTreeMap<usize, i32>,
}

impl KnockoutBoard {
    fn active(&self) -> impl Iterator<Item = usize> + '_ {
        self.lives
            .iter()
            .enumerate()
            .filter(|(_, lives)| **lives > 0)
            .map(|(i, _)| i)
    }

    fn round_complete(&self) -> bool {
        self.active().all(|i| self.round_scores.contains_key(&i))
    }

    /// Lowest scorers lose a life unless everyone tied. Returns who lost one.
    fn close_round(&mut self) -> Vec<usize> {
        let scores = std::mem::take(&mut self.round_scores);
        let (Some(lowest), Some(highest)) = (scores.values().min(), scores.values().max()) else {
            return Vec::new();
        };
        if lowest == highest {
            return Vec::new();
        }

        let losers: Vec<usize> = scores
            .iter()
            .filter(|(_, score)| *score == lowest)
            .map(|(i, _)| *i)
            .collect();
        for &i in &losers {
            self.lives[i] -= 1;
        }

        let still_active = self.active().count() as u32;
        for &i in &losers {
            if self.lives[i] == 0 {
                self.positions[i] = Some(still_active + 1);
            }
        }
        losers
    }
}

/// Players of a Knockout leg who have no lives left after its stored visits.
/// Visits from players already out are ignored.
pub fn knocked_out(leg: &Leg) -> BTreeSet<PlayerId> {
    let mut board = KnockoutRule.new_board(leg);
    for visit in &leg.visits {
        let Some(index) = leg.players.iter().position(|p| *p == visit.player_id) else {
            continue;
        };
        if board.lives[index] == 0 {
            continue;
        }
        board.round_scores.insert(index, visit.score());
        if board.round_complete() {
            board.close_round();
        }
    }

    leg.players
        .iter()
        .zip(&board.lives)
        .filter(|(_, lives)| **lives == 0)
        .map(|(player, _)| *player)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct KnockoutState {
    lives_lost: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnockoutStatistics {
    pub score: i32,
    pub lives_remaining: u32,
    pub lives_lost: u32,
    pub final_position: Option<u32>,
    pub ppd: f64,
    pub darts_thrown: u32,
}

/// Every round the lowest visit score loses a life; out of lives is out.
#[derive(Debug, Default)]
pub struct KnockoutRule;

impl ScoringRule for KnockoutRule {
    type State = KnockoutState;
    type Board = KnockoutBoard;
    type Statistics = KnockoutStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::Knockout]
    }

    fn table(&self) -> &'static str {
        "statistics_knockout"
    }

    fn new_board(&self, leg: &Leg) -> KnockoutBoard {
        let players = leg.players.len();
        KnockoutBoard {
            lives: vec![leg.parameters.starting_lives(); players],
            positions: vec![None; players],
            round_scores: BTreeMap::new(),
        }
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        board: &mut KnockoutBoard,
        players: &mut [PlayerLegState<KnockoutState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        if board.lives[current] == 0 {
            return Err(StatsError::Replay(format!(
                "Player {} threw in leg {} after being knocked out",
                players[current].player_id, ctx.leg.id
            )));
        }

        let score = visit.score();
        board.round_scores.insert(current, score);
        if board.round_complete() {
            for loser in board.close_round() {
                players[loser].state.lives_lost += 1;
            }
        }

        let hits = visit.thrown().filter(Dart::is_hit).count() as u32;
        Ok(VisitOutcome::new(score, hits))
    }

    fn finalize(
        &self,
        leg: &Leg,
        board: &KnockoutBoard,
        players: &[PlayerLegState<KnockoutState>],
        index: usize,
    ) -> KnockoutStatistics {
        let player = &players[index];
        let last_standing = board.active().count() == 1 && board.lives[index] > 0;
        let final_position = board.positions[index].or_else(|| {
            (last_standing || leg.winner_id == Some(player.player_id)).then_some(1)
        });

        KnockoutStatistics {
            score: player.current_score,
            lives_remaining: board.lives[index],
            lives_lost: player.state.lives_lost,
            final_position,
            ppd: ratio(player.current_score, player.darts_thrown),
            darts_thrown: player.darts_thrown,
        }
    }
}
