use serde::Serialize;

use crate::darts::Visit;
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{ratio, PlayerLegState, RoundContext, ScoringRule, VisitOutcome};
use crate::stats::StatsError;

const NUMBERS: usize = 20;

#[derive(Debug, Default)]
pub struct ScamBoard {
    stopper: usize,
    /// `closed[n - 1]` for numbers 1 to 20.
    closed: [bool; NUMBERS],
}

impl ScamBoard {
    fn slot(value: Option<u8>) -> Option<usize> {
        match value {
            Some(n @ 1..=20) => Some(usize::from(n) - 1),
            _ => None,
        }
    }

    fn all_closed(&self) -> bool {
        self.closed.iter().all(|c| *c)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScamState {
    stopper_darts: u32,
    numbers_closed: u32,
    scorer_darts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScamStatistics {
    pub score: i32,
    pub scorer_ppd: f64,
    pub stopper_darts: u32,
    pub numbers_closed: u32,
    pub stopper_hit_rate: f64,
    pub darts_thrown: u32,
}

/// One stopper closes 1 to 20 while everyone else scores on what is still
/// open. Once all twenty are closed the next player stops.
#[derive(Debug, Default)]
pub struct ScamRule;

impl ScoringRule for ScamRule {
    type State = ScamState;
    type Board = ScamBoard;
    type Statistics = ScamStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::Scam]
    }

    fn table(&self) -> &'static str {
        "statistics_scam"
    }

    fn apply(
        &self,
        _ctx: &RoundContext<'_>,
        board: &mut ScamBoard,
        players: &mut [PlayerLegState<ScamState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let player_count = players.len();
        let state = &mut players[current].state;

        if current != board.stopper {
            state.scorer_darts += visit.darts_thrown();
            let mut points = 0;
            let mut hits = 0;
            for dart in visit.thrown() {
                if ScamBoard::slot(dart.value).is_some_and(|slot| !board.closed[slot]) {
                    points += dart.score();
                    hits += 1;
                }
            }
            return Ok(VisitOutcome::new(points, hits));
        }

        let mut hits = 0;
        for dart in visit.thrown() {
            if board.all_closed() {
                break;
            }
            state.stopper_darts += 1;
            if let Some(slot) = ScamBoard::slot(dart.value).filter(|slot| !board.closed[*slot]) {
                board.closed[slot] = true;
                state.numbers_closed += 1;
                hits += 1;
            }
        }

        if board.all_closed() {
            board.stopper = (board.stopper + 1) % player_count;
            board.closed = [false; NUMBERS];
        }

        Ok(VisitOutcome::new(0, hits))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &ScamBoard,
        players: &[PlayerLegState<ScamState>],
        index: usize,
    ) -> ScamStatistics {
        let player = &players[index];
        let state = &player.state;
        ScamStatistics {
            score: player.current_score,
            scorer_ppd: ratio(player.current_score, state.scorer_darts),
            stopper_darts: state.stopper_darts,
            numbers_closed: state.numbers_closed,
            stopper_hit_rate: ratio(state.numbers_closed, state.stopper_darts),
            darts_thrown: player.darts_thrown,
        }
    }
}
