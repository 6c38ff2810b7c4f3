use serde::Serialize;

use crate::darts::Visit;
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::shared::PlayerId;
use crate::stats::engine::{ratio, PlayerLegState, RoundContext, ScoringRule, VisitOutcome};
use crate::stats::StatsError;

const GRID_SIZE: usize = 9;
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// The nine numbers to check out on, row by row.
pub fn grid_numbers(leg: &Leg) -> Vec<i32> {
    if leg.parameters.numbers.len() == GRID_SIZE {
        leg.parameters.numbers.clone()
    } else {
        (0..GRID_SIZE as i32).map(|i| leg.starting_score + i).collect()
    }
}

#[derive(Debug, Default)]
pub struct Grid {
    numbers: Vec<i32>,
    owners: Vec<Option<PlayerId>>,
}

impl Grid {
    fn claimable(&self, score: i32) -> Option<usize> {
        self.numbers
            .iter()
            .zip(&self.owners)
            .position(|(number, owner)| *number == score && owner.is_none())
    }

    fn has_line(&self, player_id: PlayerId) -> bool {
        LINES
            .iter()
            .any(|line| line.iter().all(|&i| self.owners[i] == Some(player_id)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicTacToeStatistics {
    pub fields_claimed: u32,
    pub highest_claimed: Option<i32>,
    pub claim_rate: f64,
    pub three_in_a_row: bool,
    pub darts_thrown: u32,
}

#[derive(Debug, Default)]
pub struct TicTacToeRule;

impl ScoringRule for TicTacToeRule {
    type State = Option<i32>;
    type Board = Grid;
    type Statistics = TicTacToeStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::TicTacToe]
    }

    fn table(&self) -> &'static str {
        "statistics_tic_tac_toe"
    }

    fn new_board(&self, leg: &Leg) -> Grid {
        Grid {
            numbers: grid_numbers(leg),
            owners: vec![None; GRID_SIZE],
        }
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        board: &mut Grid,
        players: &mut [PlayerLegState<Option<i32>>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let score = visit.score();
        let valid_finish = visit
            .last_scoring_dart()
            .is_some_and(|d| d.is_valid_finish(ctx.leg.parameters.outshot));
        let Some(field) = board.claimable(score).filter(|_| valid_finish) else {
            return Ok(VisitOutcome::default());
        };

        let player = &mut players[current];
        board.owners[field] = Some(player.player_id);
        player.state = player.state.max(Some(score));
        Ok(VisitOutcome::new(1, 1))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        board: &Grid,
        players: &[PlayerLegState<Option<i32>>],
        index: usize,
    ) -> TicTacToeStatistics {
        let player = &players[index];
        TicTacToeStatistics {
            fields_claimed: player.current_score as u32,
            highest_claimed: player.state,
            claim_rate: ratio(player.current_score, player.visits),
            three_in_a_row: board.has_line(player.player_id),
            darts_thrown: player.darts_thrown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::engine::ReplayEngine;
    use crate::stats::rules::test_support::leg_of;

    #[test]
    fn default_grid_counts_up_from_starting_score() {
        let leg = leg_of(MatchType::TicTacToe, 20, vec![1], &[]);
        assert_eq!(grid_numbers(&leg), (20..29).collect::<Vec<_>>());
    }

    #[test]
    fn visit_claims_field_with_valid_finish() {
        let leg = leg_of(
            MatchType::TicTacToe,
            20,
            vec![1, 2],
            &[
                (1, ["S10", "D5", "MISS"]),
                (2, ["S10", "S10", "MISS"]),
                (1, ["S1", "D10", "MISS"]),
                (2, ["D10", "MISS", "MISS"]),
            ],
        );

        let stats = ReplayEngine::new(TicTacToeRule).statistics(&leg).unwrap();
        assert_eq!(stats[0].fields_claimed, 2);
        assert_eq!(stats[0].highest_claimed, Some(21));
        // 20 already belongs to player 1; the single-out 20 never counted.
        assert_eq!(stats[1].fields_claimed, 0);
        assert_eq!(stats[1].claim_rate, 0.0);
    }

    #[test]
    fn three_in_a_row_is_detected() {
        let mut leg = leg_of(MatchType::TicTacToe, 0, vec![1], &[]);
        leg.parameters.numbers = vec![2, 4, 6, 8, 10, 12, 14, 16, 18];
        let leg = crate::stats::rules::test_support::with_visits(
            leg,
            &[
                (1, ["D1", "-", "-"]),
                (1, ["D5", "-", "-"]),
                (1, ["D9", "-", "-"]),
            ],
        );

        let stats = ReplayEngine::new(TicTacToeRule).statistics(&leg).unwrap();
        assert_eq!(stats[0].fields_claimed, 3);
        assert!(stats[0].three_in_a_row);
    }
}
