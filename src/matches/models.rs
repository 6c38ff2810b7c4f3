use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, FromRepr};

use crate::shared::{LegId, MatchId, PlayerId};

/// Every game variant the scorer knows. Ids match the stored `match_type` column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    FromRepr,
)]
#[repr(i16)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    X01 = 1,
    Shootout = 2,
    X01Handicap = 3,
    Cricket = 4,
    DartsAtX = 5,
    AroundTheWorld = 6,
    Shanghai = 7,
    AroundTheClock = 8,
    TicTacToe = 9,
    BermudaTriangle = 10,
    FourTwenty = 11,
    KillBull = 12,
    Gotcha = 13,
    JdcPractice = 14,
    Knockout = 15,
    Scam = 16,
}

impl MatchType {
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Variants where the live engine applies bust and checkout rules.
    pub fn is_countdown(self) -> bool {
        matches!(self, MatchType::X01 | MatchType::X01Handicap)
    }

    /// Variants whose legs carry a per-player handicap.
    pub fn uses_handicap(self) -> bool {
        matches!(self, MatchType::X01Handicap)
    }

    /// Variants where the leg goes to the highest score rather than the
    /// player who threw the final visit.
    pub fn winner_by_highest_score(self) -> bool {
        matches!(self, MatchType::Shootout)
    }
}

/// Leg count rules for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMode {
    pub wins_required: u32,
    /// Total legs after which the match ends even without a winner.
    pub legs_required: Option<u32>,
}

impl MatchMode {
    pub fn best_of(legs: u32) -> Self {
        Self {
            wins_required: legs / 2 + 1,
            legs_required: None,
        }
    }
}

/// Stake owed by losers of a match, e.g. a round of drinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OweType {
    pub id: i64,
    pub item: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub match_type: MatchType,
    pub mode: MatchMode,
    pub players: Vec<PlayerId>,
    pub legs: Vec<LegId>,
    pub current_leg_id: Option<LegId>,
    pub winner_id: Option<PlayerId>,
    pub is_finished: bool,
    pub owe_type: Option<OweType>,
    pub tournament_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a match together with its first leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMatch {
    pub match_type: MatchType,
    pub mode: MatchMode,
    pub players: Vec<PlayerId>,
    pub starting_score: i32,
    #[serde(default)]
    pub parameters: crate::leg::LegParameters,
    #[serde(default)]
    pub handicaps: BTreeMap<PlayerId, i32>,
    #[serde(default)]
    pub owe_type: Option<OweType>,
    #[serde(default)]
    pub tournament_id: Option<i64>,
}

/// Result of evaluating a match against its finished legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    InProgress,
    Won(PlayerId),
    Draw,
}

impl MatchOutcome {
    pub fn is_finished(self) -> bool {
        !matches!(self, MatchOutcome::InProgress)
    }

    pub fn winner(self) -> Option<PlayerId> {
        match self {
            MatchOutcome::Won(player) => Some(player),
            _ => None,
        }
    }
}

/// One `+1` owed from a losing player to the match winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OweEntry {
    pub ower: PlayerId,
    pub owee: PlayerId,
    pub owe_type_id: i64,
}
