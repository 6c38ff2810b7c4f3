use serde::Serialize;

use crate::darts::{Dart, Visit};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{
    ratio, PlayerLegState, RoundContext, ScoreBuckets, ScoringRule, VisitOutcome,
};
use crate::stats::StatsError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShootoutStatistics {
    pub score: i32,
    pub ppd: f64,
    pub three_dart_avg: f64,
    pub darts_thrown: u32,
    #[serde(flatten)]
    pub buckets: ScoreBuckets,
}

/// Highest total after a fixed number of visits wins.
#[derive(Debug, Default)]
pub struct ShootoutRule;

impl ScoringRule for ShootoutRule {
    type State = ScoreBuckets;
    type Board = ();
    type Statistics = ShootoutStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::Shootout]
    }

    fn table(&self) -> &'static str {
        "statistics_shootout"
    }

    fn apply(
        &self,
        _ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<ScoreBuckets>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let score = visit.score();
        players[current].state.record(score);
        let hits = visit.thrown().filter(Dart::is_hit).count() as u32;
        Ok(VisitOutcome::new(score, hits))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<ScoreBuckets>],
        index: usize,
    ) -> ShootoutStatistics {
        let player = &players[index];
        let ppd = ratio(player.current_score, player.darts_thrown);
        ShootoutStatistics {
            score: player.current_score,
            ppd,
            three_dart_avg: ppd * 3.0,
            darts_thrown: player.darts_thrown,
            buckets: player.state,
        }
    }
}
