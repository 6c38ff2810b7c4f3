use serde::Serialize;

use crate::darts::{Dart, Visit};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::stats::engine::{
    ratio, PlayerLegState, RoundContext, ScoringRule, Streak, VisitOutcome,
};
use crate::stats::StatsError;

/// What counts as a hit in one Bermuda Triangle round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BermudaTarget {
    Number(u8),
    AnyDouble,
    AnyTriple,
    Bull,
    DoubleBull,
}

impl BermudaTarget {
    pub fn is_hit(self, dart: &Dart) -> bool {
        match self {
            BermudaTarget::Number(n) => dart.hits(n),
            BermudaTarget::AnyDouble => dart.is_double(),
            BermudaTarget::AnyTriple => dart.is_triple(),
            BermudaTarget::Bull => dart.is_bull(),
            BermudaTarget::DoubleBull => dart.is_bull() && dart.is_double(),
        }
    }
}

pub const BERMUDA_TARGETS: [BermudaTarget; 13] = [
    BermudaTarget::Number(12),
    BermudaTarget::Number(13),
    BermudaTarget::Number(14),
    BermudaTarget::AnyDouble,
    BermudaTarget::Number(15),
    BermudaTarget::Number(16),
    BermudaTarget::Number(17),
    BermudaTarget::AnyTriple,
    BermudaTarget::Number(18),
    BermudaTarget::Number(19),
    BermudaTarget::Number(20),
    BermudaTarget::Bull,
    BermudaTarget::DoubleBull,
];

pub fn bermuda_target(round: u32) -> Option<BermudaTarget> {
    let index = usize::try_from(round).ok()?.checked_sub(1)?;
    BERMUDA_TARGETS.get(index).copied()
}

#[derive(Debug, Clone, Default)]
pub struct BermudaState {
    rounds_halved: u32,
    highest_score: i32,
    streak: Streak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BermudaTriangleStatistics {
    pub score: i32,
    pub highest_score: i32,
    pub hits: u32,
    pub hit_rate: f64,
    pub rounds_halved: u32,
    pub longest_streak: u32,
    pub darts_thrown: u32,
}

/// Fixed 13-round target table; a round without a hit halves the score.
#[derive(Debug, Default)]
pub struct BermudaTriangleRule;

impl ScoringRule for BermudaTriangleRule {
    type State = BermudaState;
    type Board = ();
    type Statistics = BermudaTriangleStatistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::BermudaTriangle]
    }

    fn table(&self) -> &'static str {
        "statistics_bermuda_triangle"
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<BermudaState>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let Some(target) = bermuda_target(ctx.round) else {
            return Ok(VisitOutcome::default());
        };
        let player = &mut players[current];
        let mut points = 0;
        let mut hits = 0;

        for dart in visit.thrown() {
            let hit = target.is_hit(&dart);
            player.state.streak.record(hit);
            if hit {
                points += dart.score();
                hits += 1;
            }
        }

        let outcome = if hits == 0 {
            player.state.rounds_halved += 1;
            let current_score = player.current_score;
            VisitOutcome::reset_to(current_score, current_score.div_euclid(2), 0)
        } else {
            VisitOutcome::new(points, hits)
        };
        player.state.highest_score = player
            .state
            .highest_score
            .max(player.current_score + outcome.score_delta);

        Ok(outcome)
    }

    fn finalize(
        &self,
        _leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<BermudaState>],
        index: usize,
    ) -> BermudaTriangleStatistics {
        let player = &players[index];
        BermudaTriangleStatistics {
            score: player.current_score,
            highest_score: player.state.highest_score,
            hits: player.hits,
            hit_rate: ratio(player.hits, player.darts_thrown),
            rounds_halved: player.state.rounds_halved,
            longest_streak: player.state.streak.longest,
            darts_thrown: player.darts_thrown,
        }
    }
}
