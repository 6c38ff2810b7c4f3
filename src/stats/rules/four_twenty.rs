use serde::Serialize;
use std::collections::BTreeMap;

use crate::darts::{Visit, BULL};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{
    ratio, PlayerLegState, RoundContext, ScoringRule, Streak, VisitOutcome,
};
use crate::stats::StatsError;

const ROUNDS: u32 = 21;

/// Double of the round number, the double bull in the last round.
pub fn four_twenty_target(round: u32) -> Option<u8> {
    match round {
        1..=20 => u8::try_from(round).ok(),
        ROUNDS => Some(BULL),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct FourTwentyState {
    hits_by_target: BTreeMap<u8, u32>,
    streak: Streak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FourTwentyStatistics {
    pub score: i32,
    pub hits: u32,
    pub hit_rate: f64,
    pub longest_streak: u32,
    pub darts_thrown: u32,
    pub hit_rates: BTreeMap<String, f64>,
}

/// 420: doubles 1 to 20 and the double bull, 420 points for a perfect game.
#[derive(Debug, Default)]
pub struct FourTwentyRule;

impl ScoringRule for FourTwentyRule {
    type State = FourTwentyState;
    type Board = ();
    type Statistics = FourTwentyStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::FourTwenty]
    }

    fn table(&self) -> &'static str {
        "statistics_420"
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<FourTwentyState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let Some(target) = four_twenty_target(ctx.round) else {
            return Ok(VisitOutcome::default());
        };
        let state = &mut players[current].state;
        let mut points = 0;
        let mut hits = 0;

        for dart in visit.thrown() {
            let hit = dart.hits(target) && dart.is_double();
            state.streak.record(hit);
            if hit {
                points += dart.score();
                hits += 1;
            }
        }
        *state.hits_by_target.entry(target).or_default() += hits;

        Ok(VisitOutcome::new(points, hits))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<FourTwentyState>],
        index: usize,
    ) -> FourTwentyStatistics {
        let player = &players[index];
        let state = &player.state;
        FourTwentyStatistics {
            score: player.current_score,
            hits: player.hits,
            hit_rate: ratio(player.hits, player.darts_thrown),
            longest_streak: state.streak.longest,
            darts_thrown: player.darts_thrown,
            hit_rates: state
                .hits_by_target
                .iter()
                .map(|(target, hits)| (target.to_string(), ratio(*hits, 3u32)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::engine::ReplayEngine;
    use crate::stats::rules::test_support::leg_of;

    #[test]
    fn only_the_round_double_scores() {
        let leg = leg_of(
            MatchType::FourTwenty,
            0,
            vec![1],
            &[(1, ["D1", "S1", "D1"]), (1, ["T2", "D2", "D3"])],
        );

        let stats = ReplayEngine::new(FourTwentyRule).statistics(&leg).unwrap();
        assert_eq!(stats[0].score, 8);
        assert_eq!(stats[0].hits, 3);
        assert_eq!(stats[0].hit_rates.get("2"), Some(&(1.0 / 3.0)));
    }

    #[test]
    fn final_round_is_double_bull() {
        assert_eq!(four_twenty_target(21), Some(BULL));
        assert_eq!(four_twenty_target(22), None);
    }
}
