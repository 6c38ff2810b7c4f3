use serde::Serialize;

use crate::darts::Visit;
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{
    ratio, MarkBuckets, PlayerLegState, RoundContext, ScoringRule, VisitOutcome,
};
use crate::stats::StatsError;

#[derive(Debug, Clone, Default)]
pub struct DartsAtXState {
    singles: u32,
    doubles: u32,
    triples: u32,
    buckets: MarkBuckets,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DartsAtXStatistics {
    pub score: i32,
    pub singles: u32,
    pub doubles: u32,
    pub triples: u32,
    pub hit_rate: f64,
    pub darts_thrown: u32,
    #[serde(flatten)]
    pub buckets: MarkBuckets,
}

/// Every dart aims at one number; only hits on it score.
#[derive(Debug, Default)]
pub struct DartsAtXRule;

impl ScoringRule for DartsAtXRule {
    type State = DartsAtXState;
    type Board = ();
    type Statistics = DartsAtXStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::DartsAtX]
    }

    fn table(&self) -> &'static str {
        "statistics_darts_at_x"
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<DartsAtXState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let target = ctx.leg.parameters.target();
        let state = &mut players[current].state;
        let mut points = 0;
        let mut hits = 0;

        for dart in visit.thrown().filter(|d| d.hits(target)) {
            points += dart.score();
            hits += 1;
            match dart.multiplier {
                3 => state.triples += 1,
                2 => state.doubles += 1,
                _ => state.singles += 1,
            }
        }
        state.buckets.record(visit.marks(target));

        Ok(VisitOutcome::new(points, hits))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<DartsAtXState>],
        index: usize,
    ) -> DartsAtXStatistics {
        let player = &players[index];
        let state = &player.state;
        DartsAtXStatistics {
            score: player.current_score,
            singles: state.singles,
            doubles: state.doubles,
            triples: state.triples,
            hit_rate: ratio(player.hits, player.darts_thrown),
            darts_thrown: player.darts_thrown,
            buckets: state.buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::engine::ReplayEngine;
    use crate::stats::rules::test_support::leg_of;

    #[test]
    fn defaults_to_twenty() {
        let leg = leg_of(
            MatchType::DartsAtX,
            0,
            vec![1],
            &[(1, ["T20", "D20", "S1"]), (1, ["S20", "MISS", "T5"])],
        );

        let stats = ReplayEngine::new(DartsAtXRule).statistics(&leg).unwrap();
        assert_eq!(stats[0].score, 120);
        assert_eq!(stats[0].triples, 1);
        assert_eq!(stats[0].doubles, 1);
        assert_eq!(stats[0].singles, 1);
        assert_eq!(stats[0].buckets.marks_5, 1);
        assert_eq!(stats[0].hit_rate, 0.5);
    }

    #[test]
    fn honours_configured_target() {
        let mut leg = leg_of(MatchType::DartsAtX, 0, vec![1], &[]);
        leg.parameters.target = Some(19);
        let leg = crate::stats::rules::test_support::with_visits(
            leg,
            &[(1, ["T19", "T19", "T19"])],
        );

        let stats = ReplayEngine::new(DartsAtXRule).statistics(&leg).unwrap();
        assert_eq!(stats[0].score, 171);
        assert_eq!(stats[0].buckets.marks_9, 1);
    }
}
