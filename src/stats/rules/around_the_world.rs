use serde::Serialize;
use std::collections::BTreeMap;

use crate::darts::{Visit, BULL};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{
    ratio, PlayerLegState, RoundContext, ScoringRule, Streak, VisitOutcome,
};
use crate::stats::StatsError;

const DARTS_PER_ROUND: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct RoundTargetState {
    hits_by_target: BTreeMap<u8, u32>,
    streak: Streak,
    shanghai: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AroundTheWorldStatistics {
    pub score: i32,
    pub darts_thrown: u32,
    pub hits: u32,
    pub hit_rate: f64,
    pub longest_streak: u32,
    /// Round in which single, double and triple of the round number landed.
    pub shanghai: Option<u32>,
    /// Per target: hits / 3.
    pub hit_rates: BTreeMap<String, f64>,
}

/// The round number is the target. Around-the-World ends on the bull in
/// round 21; Shanghai stops after 20 and flags a single+double+triple visit.
#[derive(Debug)]
pub struct AroundTheWorldRule {
    shanghai: bool,
}

impl AroundTheWorldRule {
    pub fn around_the_world() -> Self {
        Self { shanghai: false }
    }

    pub fn shanghai() -> Self {
        Self { shanghai: true }
    }

    fn last_round(&self) -> u32 {
        if self.shanghai {
            20
        } else {
            21
        }
    }

    pub fn target_for_round(&self, round: u32) -> Option<u8> {
        match round {
            1..=20 => u8::try_from(round).ok(),
            21 if round <= self.last_round() => Some(BULL),
            _ => None,
        }
    }
}

/// Single, double and triple of `target` in one visit.
pub fn is_shanghai(visit: &Visit, target: u8) -> bool {
    let hits: Vec<_> = visit.thrown().filter(|d| d.hits(target)).collect();
    hits.iter().any(|d| d.is_single())
        && hits.iter().any(|d| d.is_double())
        && hits.iter().any(|d| d.is_triple())
}

impl ScoringRule for AroundTheWorldRule {
    type State = RoundTargetState;
    type Board = ();
    type Statistics = AroundTheWorldStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        if self.shanghai {
            &[MatchType::Shanghai]
        } else {
            &[MatchType::AroundTheWorld]
        }
    }

    fn table(&self) -> &'static str {
        if self.shanghai {
            "statistics_shanghai"
        } else {
            "statistics_around_the_world"
        }
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<RoundTargetState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let Some(target) = self.target_for_round(ctx.round) else {
            return Ok(VisitOutcome::default());
        };
        let state = &mut players[current].state;
        let mut points = 0;
        let mut hits = 0;

        for dart in visit.thrown() {
            let hit = dart.hits(target);
            state.streak.record(hit);
            if hit {
                points += dart.score();
                hits += 1;
            }
        }
        *state.hits_by_target.entry(target).or_default() += hits;

        if self.shanghai && state.shanghai.is_none() && is_shanghai(visit, target) {
            state.shanghai = Some(ctx.round);
        }

        Ok(VisitOutcome::new(points, hits))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<RoundTargetState>],
        index: usize,
    ) -> AroundTheWorldStatistics {
        let player = &players[index];
        let state = &player.state;
        let hit_rates = state
            .hits_by_target
            .iter()
            .map(|(target, hits)| (target.to_string(), ratio(*hits, DARTS_PER_ROUND)))
            .collect();

        AroundTheWorldStatistics {
            score: player.current_score,
            darts_thrown: player.darts_thrown,
            hits: player.hits,
            hit_rate: ratio(player.hits, player.darts_thrown),
            longest_streak: state.streak.longest,
            shanghai: state.shanghai,
            hit_rates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::engine::ReplayEngine;
    use crate::stats::rules::test_support::leg_of;

    #[test]
    fn scores_only_the_round_number() {
        let leg = leg_of(
            MatchType::AroundTheWorld,
            0,
            vec![1, 2],
            &[
                (1, ["S1", "T1", "S2"]),
                (2, ["MISS", "MISS", "D1"]),
                (1, ["S2", "S1", "MISS"]),
                (2, ["T2", "T2", "T2"]),
            ],
        );

        let stats = ReplayEngine::new(AroundTheWorldRule::around_the_world())
            .statistics(&leg)
            .unwrap();
        assert_eq!(stats[0].score, 6);
        assert_eq!(stats[0].hits, 3);
        assert_eq!(stats[0].hit_rates.get("1"), Some(&(2.0 / 3.0)));
        assert_eq!(stats[0].shanghai, None);
        assert_eq!(stats[1].score, 20);
        assert_eq!(stats[1].longest_streak, 4);
    }

    #[test]
    fn shanghai_is_flagged_with_its_round() {
        let leg = leg_of(
            MatchType::Shanghai,
            0,
            vec![1],
            &[(1, ["S1", "MISS", "MISS"]), (1, ["T2", "S2", "D2"])],
        );

        let stats = ReplayEngine::new(AroundTheWorldRule::shanghai())
            .statistics(&leg)
            .unwrap();
        assert_eq!(stats[0].shanghai, Some(2));
        assert_eq!(stats[0].score, 13);
    }

    #[test]
    fn bull_round_only_in_around_the_world() {
        assert_eq!(
            AroundTheWorldRule::around_the_world().target_for_round(21),
            Some(BULL)
        );
        assert_eq!(AroundTheWorldRule::shanghai().target_for_round(21), None);
        assert_eq!(AroundTheWorldRule::shanghai().target_for_round(20), Some(20));
    }
}
