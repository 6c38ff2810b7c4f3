use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dart::{Dart, DartError, OutshotType};
use crate::shared::{LegId, PlayerId, VisitId};

/// Three darts thrown by one player in one turn, before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Darts {
    pub first: Dart,
    pub second: Dart,
    pub third: Dart,
}

impl Darts {
    pub fn new(first: Dart, second: Dart, third: Dart) -> Self {
        Self {
            first,
            second,
            third,
        }
    }

    /// Parses three darts from notation, e.g. `["T20", "S5", "MISS"]`.
    pub fn parse(codes: [&str; 3]) -> Result<Self, DartError> {
        Ok(Self::new(
            codes[0].parse()?,
            codes[1].parse()?,
            codes[2].parse()?,
        ))
    }

    pub fn validate(&self) -> Result<(), DartError> {
        self.first.validate()?;
        self.second.validate()?;
        self.third.validate()
    }
}

/// A stored turn: exactly three dart slots attributed to one player in one leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    pub leg_id: LegId,
    pub player_id: PlayerId,
    pub first: Dart,
    pub second: Dart,
    pub third: Dart,
    pub is_bust: bool,
    pub created_at: DateTime<Utc>,
}

impl Visit {
    /// Builds an unsaved visit; the repository assigns `id`.
    pub fn new(leg_id: LegId, player_id: PlayerId, darts: Darts) -> Self {
        Self {
            id: 0,
            leg_id,
            player_id,
            first: darts.first.normalized(),
            second: darts.second.normalized(),
            third: darts.third.normalized(),
            is_bust: false,
            created_at: Utc::now(),
        }
    }

    pub fn darts(&self) -> [Dart; 3] {
        [self.first, self.second, self.third]
    }

    pub fn darts_mut(&mut self) -> [&mut Dart; 3] {
        [&mut self.first, &mut self.second, &mut self.third]
    }

    /// Darts actually thrown, in order.
    pub fn thrown(&self) -> impl Iterator<Item = Dart> {
        self.darts().into_iter().filter(Dart::is_thrown)
    }

    pub fn darts_thrown(&self) -> u32 {
        self.thrown().count() as u32
    }

    /// Points counted towards the turn. A bust counts nothing.
    pub fn score(&self) -> i32 {
        if self.is_bust {
            0
        } else {
            self.raw_score()
        }
    }

    /// Sum of every thrown dart, bust or not.
    pub fn raw_score(&self) -> i32 {
        self.thrown().map(|d| d.score()).sum()
    }

    /// Marks on `target` across the thrown darts.
    pub fn marks(&self, target: u8) -> u32 {
        self.thrown().map(|d| d.marks(target)).sum()
    }

    /// Applies the darts in order against `current_score`.
    ///
    /// The first busting dart keeps its value but voids every later dart; a
    /// dart that checks out voids the rest of the visit the same way. Without
    /// a bust or checkout, unthrown slots become explicit misses.
    pub fn set_is_bust(&mut self, current_score: i32, outshot: OutshotType) {
        let mut remaining = current_score;
        let mut ended = false;
        let mut is_bust = false;

        for dart in self.darts_mut() {
            if ended {
                *dart = Dart::not_thrown();
                continue;
            }
            if !dart.is_thrown() {
                *dart = Dart::miss();
                continue;
            }
            if dart.is_bust(remaining, outshot) {
                is_bust = true;
                ended = true;
                continue;
            }
            remaining -= dart.score();
            if remaining == 0 {
                ended = true;
            }
        }

        self.is_bust = is_bust;
    }

    /// Turns unthrown slots into explicit misses, for variants without busts.
    pub fn fill_misses(&mut self) {
        for dart in self.darts_mut() {
            if !dart.is_thrown() {
                *dart = Dart::miss();
            }
        }
        self.is_bust = false;
    }

    /// Whether the visit zeroes `current_score` with a legal finishing dart.
    pub fn is_checkout(&self, current_score: i32, outshot: OutshotType) -> bool {
        if self.is_bust || self.score() != current_score {
            return false;
        }
        self.last_scoring_dart()
            .is_some_and(|d| d.is_valid_finish(outshot))
    }

    /// Darts thrown at a score that a single dart could have finished.
    pub fn checkout_attempts(&self, current_score: i32, outshot: OutshotType) -> u32 {
        let mut remaining = current_score;
        let mut attempts = 0;
        for dart in self.thrown() {
            if remaining <= 0 {
                break;
            }
            if dart.is_checkout_attempt(remaining, outshot) {
                attempts += 1;
            }
            if dart.is_bust(remaining, outshot) {
                break;
            }
            remaining -= dart.score();
        }
        attempts
    }

    pub fn last_scoring_dart(&self) -> Option<Dart> {
        self.thrown().filter(|d| d.score() > 0).last()
    }
}
