use serde::Serialize;

use crate::darts::{segment_distance, Dart, Visit};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::shared::PlayerId;
use crate::stats::engine::{
    ratio, PlayerLegState, RoundContext, ScoreBuckets, ScoringRule, VisitOutcome,
};
use crate::stats::StatsError;

/// Remaining score from which darts are graded for accuracy.
pub const ACCURACY_THRESHOLD: i32 = 171;
const FIRST_NINE_VISITS: u32 = 3;

/// Points for landing `n` segments away from the aimed number.
const ACCURACY_POINTS: [u32; 4] = [100, 70, 30, 5];

#[derive(Debug, Clone, Default)]
pub struct X01State {
    scored: i32,
    first_nine_score: i32,
    first_nine_darts: u32,
    checkout_attempts: u32,
    checkout: Option<i32>,
    buckets: ScoreBuckets,
    accuracy_20: Accuracy,
    accuracy_19: Accuracy,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accuracy {
    darts: u32,
    points: u32,
}

impl Accuracy {
    fn value(&self) -> Option<f64> {
        (self.darts > 0).then(|| ratio(self.points, self.darts))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct X01Statistics {
    pub ppd: f64,
    pub ppd_score: i32,
    pub three_dart_avg: f64,
    pub first_nine_ppd: f64,
    pub first_nine_ppd_score: i32,
    pub first_nine_three_dart_avg: f64,
    pub checkout_percentage: Option<f64>,
    pub checkout_attempts: u32,
    pub checkout: Option<i32>,
    pub darts_thrown: u32,
    #[serde(flatten)]
    pub buckets: ScoreBuckets,
    pub accuracy_20: Option<f64>,
    pub accuracy_19: Option<f64>,
    pub overall_accuracy: Option<f64>,
}

/// Countdown scoring for X01 and X01 Handicap.
#[derive(Debug, Default)]
pub struct X01Rule;

impl X01Rule {
    fn grade_accuracy(state: &mut X01State, dart: Dart) {
        let value = dart.value.unwrap_or(0);
        let aimed = if value == 0 || dart.is_bull() {
            (20, None)
        } else {
            let to_20 = segment_distance(value, 20);
            let to_19 = segment_distance(value, 19);
            match (to_20, to_19) {
                (Some(a), Some(b)) if b < a => (19, Some(b)),
                (distance, _) => (20, distance),
            }
        };

        let points = aimed
            .1
            .and_then(|distance| ACCURACY_POINTS.get(distance).copied())
            .unwrap_or(0);
        let bucket = if aimed.0 == 19 {
            &mut state.accuracy_19
        } else {
            &mut state.accuracy_20
        };
        bucket.darts += 1;
        bucket.points += points;
    }
}

impl ScoringRule for X01Rule {
    type State = X01State;
    type Board = ();
    type Statistics = X01Statistics;

    fn match_types(&self) -> &'static [MatchType] {
        &[MatchType::X01, MatchType::X01Handicap]
    }

    fn table(&self) -> &'static str {
        "statistics_x01"
    }

    fn starting_score(&self, leg: &Leg, player_id: PlayerId) -> i32 {
        leg.player_starting_score(player_id)
    }

    fn apply(
        &self,
        ctx: &RoundContext<'_>,
        _board: &mut (),
        players: &mut [PlayerLegState<X01State>],
        current: usize,
        visit: &Visit,
    ) -> Result<VisitOutcome, StatsError> {
        let outshot = ctx.leg.parameters.outshot;
        let player = &mut players[current];
        let remaining = player.current_score;
        let score = visit.score();

        let mut before_dart = remaining;
        for dart in visit.thrown() {
            if before_dart >= ACCURACY_THRESHOLD {
                Self::grade_accuracy(&mut player.state, dart);
            }
            before_dart -= dart.score();
        }

        let state = &mut player.state;
        state.checkout_attempts += visit.checkout_attempts(remaining, outshot);
        state.scored += score;
        state.buckets.record(score);
        if player.visits < FIRST_NINE_VISITS {
            state.first_nine_score += score;
            state.first_nine_darts += visit.darts_thrown();
        }
        if visit.is_checkout(remaining, outshot) {
            state.checkout = Some(score);
        }

        let hits = visit.thrown().filter(Dart::is_hit).count() as u32;
        Ok(VisitOutcome::new(-score, hits))
    }

    fn finalize(
        &self,
        leg: &Leg,
        _board: &(),
        players: &[PlayerLegState<X01State>],
        index: usize,
    ) -> X01Statistics {
        let player = &players[index];
        let state = &player.state;
        let ppd = ratio(state.scored, player.darts_thrown);
        let first_nine_ppd = ratio(state.first_nine_score, state.first_nine_darts);

        let is_winner = leg.winner_id == Some(player.player_id);
        let checkout_percentage = (is_winner && state.checkout.is_some())
            .then(|| ratio(100, state.checkout_attempts.max(1)));

        let overall = Accuracy {
            darts: state.accuracy_20.darts + state.accuracy_19.darts,
            points: state.accuracy_20.points + state.accuracy_19.points,
        };

        X01Statistics {
            ppd,
            ppd_score: state.scored,
            three_dart_avg: ppd * 3.0,
            first_nine_ppd,
            first_nine_ppd_score: state.first_nine_score,
            first_nine_three_dart_avg: first_nine_ppd * 3.0,
            checkout_percentage,
            checkout_attempts: state.checkout_attempts,
            checkout: if is_winner { state.checkout } else { None },
            darts_thrown: player.darts_thrown,
            buckets: state.buckets,
            accuracy_20: state.accuracy_20.value(),
            accuracy_19: state.accuracy_19.value(),
            overall_accuracy: overall.value(),
        }
    }
}
