use serde::Serialize;
use std::collections::BTreeMap;

use crate::darts::{Visit, BULL};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::shared::PlayerId;
use crate::stats::engine::{
    ratio, PlayerLegState, RoundContext, ScoringRule, Streak, VisitOutcome,
};
use crate::stats::StatsError;

/// 1 through 20, then the bull.
pub fn clock_targets() -> impl Iterator<Item = u8> {
    (1..=20).chain(std::iter::once(BULL))
}

fn next_target(target: u8) -> Option<u8> {
    match target {
        1..=19 => Some(target + 1),
        20 => Some(BULL),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClockState {
    attempts: BTreeMap<u8, u32>,
    completed: bool,
    streak: Streak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AroundTheClockStatistics {
    /// Number currently aimed at; the bull once 20 is done.
    pub current_target: i32,
    pub targets_hit: u32,
    pub completed: bool,
    pub darts_thrown: u32,
    pub hit_rate: f64,
    pub longest_streak: u32,
    /// Per target: 1 / darts needed, or 0 when not yet hit.
    pub hit_rates: BTreeMap<String, f64>,
}

/// Hit each number in order; the current score is the number being aimed at.
#[derive(Debug, Default)]
pub struct AroundTheClockRule;

impl ScoringRule for AroundTheClockRule {
    type State = ClockState;
    type Board = ();
    type Statistics = AroundTheClockStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::AroundTheClock]
    }

    fn table(&self) -> &'static str {
        "statistics_around_the_clock"
    }

    fn starting_score(&self, _leg: &Leg, _player_id: PlayerId) -> i32 {
        1
    }

    fn apply(
        &self,
        _ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<ClockState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let player = &mut players[current];
        let start = player.current_score;
        let mut target = u8::try_from(start)
            .map_err(|_| StatsError::Replay(format!("Invalid clock target {start}")))?;
        let state = &mut player.state;
        let mut hits = 0;

        for dart in visit.thrown() {
            if state.completed {
                break;
            }
            *state.attempts.entry(target).or_default() += 1;
            let hit = dart.hits(target);
            state.streak.record(hit);
            if !hit {
                continue;
            }
            hits += 1;
            match next_target(target) {
                Some(next) => target = next,
                None => state.completed = true,
            }
        }

        Ok(VisitOutcome::new(i32::from(target) - start, hits))
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<ClockState>],
        index: usize,
    ) -> AroundTheClockStatistics {
        let player = &players[index];
        let state = &player.state;
        let hit_rates = clock_targets()
            .filter_map(|target| {
                let attempts = *state.attempts.get(&target)?;
                let hit = state.completed || i32::from(target) < player.current_score;
                Some((target.to_string(), if hit { ratio(1, attempts) } else { 0.0 }))
            })
            .collect();

        AroundTheClockStatistics {
            current_target: player.current_score,
            targets_hit: player.hits,
            completed: state.completed,
            darts_thrown: player.darts_thrown,
            hit_rate: ratio(player.hits, player.darts_thrown),
            longest_streak: state.streak.longest,
            hit_rates,
        }
    }
}
