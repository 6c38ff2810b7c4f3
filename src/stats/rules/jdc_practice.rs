use serde::Serialize;

use crate::darts::{Visit, BULL};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{ratio, PlayerLegState, RoundContext, ScoringRule, VisitOutcome};
use crate::stats::StatsError;

use super::around_the_world::is_shanghai;

pub const SHANGHAI_BONUS: i32 = 100;
pub const DOUBLE_POINTS: i32 = 50;
/// D1 to D20 plus the bull.
const DOUBLE_TARGETS: u32 = 21;

/// What one JDC practice round asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JdcRound {
    Shanghai(u8),
    /// Three consecutive doubles, one per dart.
    Doubles([u8; 3]),
}

pub fn jdc_round(round: u32) -> Option<JdcRound> {
    match round {
        1..=6 => Some(JdcRound::Shanghai(9 + round as u8)),
        7..=13 => {
            let first = (round - 7) * 3 + 1;
            let target = |n: u32| if n > 20 { BULL } else { n as u8 };
            Some(JdcRound::Doubles([
                target(first),
                target(first + 1),
                target(first + 2),
            ]))
        }
        14..=19 => Some(JdcRound::Shanghai(round as u8 + 1)),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct JdcState {
    shanghais: u32,
    doubles_hit: u32,
    shanghai_points: i32,
    doubles_points: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JdcPracticeStatistics {
    pub score: i32,
    pub shanghai_score: i32,
    pub doubles_score: i32,
    pub shanghai_count: u32,
    pub doubles_hit: u32,
    pub doubles_hit_rate: f64,
    pub ppd: f64,
    pub darts_thrown: u32,
}

/// JDC challenge: Shanghai on 10-15, a doubles ladder, Shanghai on 15-20.
#[derive(Debug, Default)]
pub struct JdcPracticeRule;

impl ScoringRule for JdcPracticeRule {
    type State = JdcState;
    type Board = ();
    type Statistics = JdcPracticeStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::JdcPractice]
    }

    fn table(&self) -> &'static str {
        "statistics_jdc_practice"
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<JdcState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let state = &mut players[current].state;
        match jdc_round(ctx.round) {
            Some(JdcRound::Shanghai(target)) => {
                let mut points: i32 = visit
                    .thrown()
                    .filter(|d| d.hits(target))
                    .map(|d| d.score())
                    .sum();
                let hits = visit.thrown().filter(|d| d.hits(target)).count() as u32;
                if is_shanghai(visit, target) {
                    state.shanghais += 1;
                    points += SHANGHAI_BONUS;
                }
                state.shanghai_points += points;
                Ok(VisitOutcome::new(points, hits))
            }
            Some(JdcRound::Doubles(targets)) => {
                let hits = visit
                    .darts()
                    .iter()
                    .zip(targets)
                    .filter(|(dart, target)| dart.hits(*target) && dart.is_double())
                    .count() as u32;
                let points = hits as i32 * DOUBLE_POINTS;
                state.doubles_hit += hits;
                state.doubles_points += points;
                Ok(VisitOutcome::new(points, hits))
            }
            None => Ok(VisitOutcome::default()),
        }
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<JdcState>],
        index: usize,
    ) -> JdcPracticeStatistics {
        let player = &players[index];
        let state = &player.state;
        JdcPracticeStatistics {
            score: player.current_score,
            shanghai_score: state.shanghai_points,
            doubles_score: state.doubles_points,
            shanghai_count: state.shanghais,
            doubles_hit: state.doubles_hit,
            doubles_hit_rate: ratio(state.doubles_hit, DOUBLE_TARGETS),
            ppd: ratio(player.current_score, player.darts_thrown),
            darts_thrown: player.darts_thrown,
        }
    }
}
