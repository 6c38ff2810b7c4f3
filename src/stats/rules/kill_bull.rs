use serde::Serialize;

use crate::darts::{Dart, Visit};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::shared::PlayerId;
use crate::stats::engine::{
    ratio, PlayerLegState, RoundContext, ScoringRule, Streak, VisitOutcome,
};
use crate::stats::StatsError;

#[derive(Debug, Clone, Default)]
pub struct KillBullState {
    single_bulls: u32,
    double_bulls: u32,
    times_reset: u32,
    /// Consecutive visits with at least one bull.
    streak: Streak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillBullStatistics {
    pub score: i32,
    pub single_bulls: u32,
    pub double_bulls: u32,
    pub hit_rate: f64,
    pub times_reset: u32,
    pub longest_streak: u32,
    pub darts_thrown: u32,
}

/// Count down from the starting score with bulls only; a visit without a
/// bull starts the player over.
#[derive(Debug, Default)]
pub struct KillBullRule;

impl ScoringRule for KillBullRule {
    type State = KillBullState;
    type Board = ();
    type Statistics = KillBullStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::KillBull]
    }

    fn table(&self) -> &'static str {
        "statistics_kill_bull"
    }

    fn starting_score(&self, leg: &Leg, _player_id: PlayerId) -> i32 {
        leg.starting_score
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<KillBullState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let player = &mut players[current];
        let bulls: Vec<Dart> = visit.thrown().filter(Dart::is_bull).collect();
        player.state.streak.record(!bulls.is_empty());

        if bulls.is_empty() {
            player.state.times_reset += 1;
            return Ok(VisitOutcome::reset_to(
                player.current_score,
                ctx.leg.starting_score,
                0,
            ));
        }

        for dart in &bulls {
            if dart.is_double() {
                player.state.double_bulls += 1;
            } else {
                player.state.single_bulls += 1;
            }
        }
        let points: i32 = bulls.iter().map(Dart::score).sum();
        let points = points.min(player.current_score.max(0));
        Ok(VisitOutcome::new(-points, bulls.len() as u32))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<KillBullState>],
        index: usize,
    ) -> KillBullStatistics {
        let player = &players[index];
        let state = &player.state;
        KillBullStatistics {
            score: player.current_score,
            single_bulls: state.single_bulls,
            double_bulls: state.double_bulls,
            hit_rate: ratio(player.hits, player.darts_thrown),
            times_reset: state.times_reset,
            longest_streak: state.streak.longest,
            darts_thrown: player.darts_thrown,
        }
    }
}
