use serde::Serialize;
use std::collections::BTreeMap;

use crate::darts::{Visit, BULL};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{
    ratio, MarkBuckets, PlayerLegState, RoundContext, ScoringRule, VisitOutcome,
};
use crate::stats::StatsError;

pub const CRICKET_NUMBERS: [u8; 7] = [15, 16, 17, 18, 19, 20, BULL];
const MARKS_TO_CLOSE: u32 = 3;
const FIRST_NINE_VISITS: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct CricketState {
    marks: BTreeMap<u8, u32>,
    total_marks: u32,
    first_nine_marks: u32,
    buckets: MarkBuckets,
}

impl CricketState {
    fn marks_on(&self, number: u8) -> u32 {
        self.marks.get(&number).copied().unwrap_or_default()
    }

    fn has_closed(&self, number: u8) -> bool {
        self.marks_on(number) >= MARKS_TO_CLOSE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CricketStatistics {
    pub score: i32,
    pub total_marks: u32,
    pub rounds: u32,
    pub mpr: f64,
    pub first_nine_mpr: f64,
    pub darts_thrown: u32,
    #[serde(flatten)]
    pub buckets: MarkBuckets,
}

#[derive(Debug, Default)]
pub struct CricketRule;

impl ScoringRule for CricketRule {
    type State = CricketState;
    type Board = ();
    type Statistics = CricketStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::Cricket]
    }

    fn table(&self) -> &'static str {
        "statistics_cricket"
    }

    fn apply(
        &self,
        _ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<CricketState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let solo = players.len() == 1;
        let mut points = 0;
        let mut visit_marks = 0;
        let mut hits = 0;

        for dart in visit.thrown() {
            let Some(number) = dart.value.filter(|v| CRICKET_NUMBERS.contains(v)) else {
                continue;
            };
            let marks = dart.marks(number);
            let open_elsewhere = solo
                || players
                    .iter()
                    .enumerate()
                    .any(|(i, p)| i != current && !p.state.has_closed(number));

            let state = &mut players[current].state;
            let before = state.marks_on(number);
            let closing = marks.min(MARKS_TO_CLOSE.saturating_sub(before));
            let excess = marks - closing;
            if excess > 0 && open_elsewhere {
                points += i32::from(number) * excess as i32;
            }
            state.marks.insert(number, before + marks);

            visit_marks += marks;
            hits += 1;
        }

        let player = &mut players[current];
        let state = &mut player.state;
        state.total_marks += visit_marks;
        state.buckets.record(visit_marks);
        if player.visits < FIRST_NINE_VISITS {
            state.first_nine_marks += visit_marks;
        }

        Ok(VisitOutcome::new(points, hits))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<CricketState>],
        index: usize,
    ) -> CricketStatistics {
        let player = &players[index];
        let state = &player.state;
        CricketStatistics {
            score: player.current_score,
            total_marks: state.total_marks,
            rounds: player.visits,
            mpr: ratio(state.total_marks, player.visits),
            first_nine_mpr: ratio(state.first_nine_marks, player.visits.min(FIRST_NINE_VISITS)),
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
    fn marks_beyond_closing_score_while_opponent_is_open() {
        let leg = leg_of(
            MatchType::Cricket,
            0,
            vec![1, 2],
            &[
                (1, ["T20", "T20", "S1"]),
                (2, ["S19", "MISS", "MISS"]),
            ],
        );

        let stats = ReplayEngine::new(CricketRule).statistics(&leg).unwrap();
        assert_eq!(stats[0].score, 60);
        assert_eq!(stats[0].total_marks, 6);
        assert_eq!(stats[0].buckets.marks_6, 1);
        assert_eq!(stats[0].mpr, 6.0);
        assert_eq!(stats[1].total_marks, 1);
    }

    #[test]
    fn number_closed_by_everyone_stops_scoring() {
        let leg = leg_of(
            MatchType::Cricket,
            0,
            vec![1, 2],
            &[
                (1, ["T20", "MISS", "MISS"]),
                (2, ["T20", "S20", "MISS"]),
                (1, ["T20", "MISS", "MISS"]),
            ],
        );

        let stats = ReplayEngine::new(CricketRule).statistics(&leg).unwrap();
        assert_eq!(stats[0].score, 0);
        assert_eq!(stats[1].score, 0);
        assert_eq!(stats[0].total_marks, 6);
        assert_eq!(stats[1].total_marks, 4);
    }

    #[test]
    fn bull_counts_as_cricket_number() {
        let leg = leg_of(
            MatchType::Cricket,
            0,
            vec![1, 2],
            &[(1, ["DBULL", "DBULL", "BULL"])],
        );

        let stats = ReplayEngine::new(CricketRule).statistics(&leg).unwrap();
        assert_eq!(stats[0].total_marks, 5);
        assert_eq!(stats[0].score, 50);
        assert_eq!(stats[0].buckets.marks_5, 1);
    }
}
