use serde::Serialize;

use crate::darts::{Dart, Visit};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{ratio, PlayerLegState, RoundContext, ScoringRule, VisitOutcome};
use crate::stats::StatsError;

#[derive(Debug, Clone, Default)]
pub struct GotchaState {
    times_reset: u32,
    others_reset: u32,
    busts: u32,
    highest_score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GotchaStatistics {
    pub score: i32,
    pub highest_score: i32,
    pub times_reset: u32,
    pub others_reset: u32,
    pub busts: u32,
    pub ppd: f64,
    pub darts_thrown: u32,
}

/// Race up to the starting score. Going past it busts; landing on an
/// opponent's score sends that opponent back to zero.
///
/// Opponents are checked in leg player order so replays stay deterministic
/// with more than two players.
#[derive(Debug, Default)]
pub struct GotchaRule;

impl ScoringRule for GotchaRule {
    type State = GotchaState;
    type Board = ();
    type Statistics = GotchaStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::Gotcha]
    }

    fn table(&self) -> &'static str {
        "statistics_gotcha"
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<GotchaState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let ceiling = ctx.leg.starting_score;
        let points = visit.score();
        let hits = visit.thrown().filter(Dart::is_hit).count() as u32;
        let landed = players[current].current_score + points;

        if landed > ceiling {
            players[current].state.busts += 1;
            return Ok(VisitOutcome::new(0, hits));
        }

        if points > 0 {
            let mut victims = 0;
            for (i, other) in players.iter_mut().enumerate() {
                if i != current && other.current_score > 0 && other.current_score == landed {
                    other.current_score = 0;
                    other.state.times_reset += 1;
                    victims += 1;
                }
            }
            players[current].state.others_reset += victims;
        }

        let state = &mut players[current].state;
        state.highest_score = state.highest_score.max(landed);
        Ok(VisitOutcome::new(points, hits))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<GotchaState>],
        index: usize,
    ) -> GotchaStatistics {
        let player = &players[index];
        let state = &player.state;
        GotchaStatistics {
            score: player.current_score,
            highest_score: state.highest_score,
            times_reset: state.times_reset,
            others_reset: state.others_reset,
            busts: state.busts,
            ppd: ratio(player.current_score, player.darts_thrown),
            darts_thrown: player.darts_thrown,
        }
    }
}
