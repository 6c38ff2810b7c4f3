use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::darts::{OutshotType, Visit};
use crate::matches::MatchType;
use crate::shared::{LegId, MatchId, PlayerId};

pub const DEFAULT_DARTS_AT_X_TARGET: u8 = 20;
pub const DEFAULT_KNOCKOUT_LIVES: u32 = 3;

/// Variant settings that change how a leg is scored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegParameters {
    #[serde(default)]
    pub outshot: OutshotType,
    /// Number aimed at in Darts-at-X.
    #[serde(default)]
    pub target: Option<u8>,
    /// Tic-Tac-Toe grid, row by row.
    #[serde(default)]
    pub numbers: Vec<i32>,
    #[serde(default)]
    pub starting_lives: Option<u32>,
}

impl LegParameters {
    pub fn target(&self) -> u8 {
        self.target.unwrap_or(DEFAULT_DARTS_AT_X_TARGET)
    }

    pub fn starting_lives(&self) -> u32 {
        self.starting_lives.unwrap_or(DEFAULT_KNOCKOUT_LIVES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegState {
    AwaitingFirstVisit,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub id: LegId,
    pub match_id: MatchId,
    pub leg_type: MatchType,
    pub starting_score: i32,
    pub parameters: LegParameters,
    /// Throwing order.
    pub players: Vec<PlayerId>,
    pub handicaps: BTreeMap<PlayerId, i32>,
    pub current_player_id: PlayerId,
    pub winner_id: Option<PlayerId>,
    pub is_finished: bool,
    /// Append-only, in throwing order. This order drives every replay.
    pub visits: Vec<Visit>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Leg {
    pub fn state(&self) -> LegState {
        if self.is_finished {
            LegState::Finished
        } else if self.visits.is_empty() {
            LegState::AwaitingFirstVisit
        } else {
            LegState::InProgress
        }
    }

    pub fn handicap(&self, player_id: PlayerId) -> i32 {
        self.handicaps.get(&player_id).copied().unwrap_or_default()
    }

    /// Points a player needs at the start of a countdown leg.
    pub fn player_starting_score(&self, player_id: PlayerId) -> i32 {
        self.starting_score + self.handicap(player_id)
    }

    /// Sum of the player's counted visits; bust visits contribute nothing.
    pub fn scored(&self, player_id: PlayerId) -> i32 {
        self.visits
            .iter()
            .filter(|v| v.player_id == player_id)
            .map(Visit::score)
            .sum()
    }

    /// Points left for a countdown player.
    pub fn remaining(&self, player_id: PlayerId) -> i32 {
        self.player_starting_score(player_id) - self.scored(player_id)
    }

    /// Points left before a given visit, used when correcting history.
    pub fn remaining_before(&self, player_id: PlayerId, visit_index: usize) -> i32 {
        let scored: i32 = self.visits[..visit_index.min(self.visits.len())]
            .iter()
            .filter(|v| v.player_id == player_id)
            .map(Visit::score)
            .sum();
        self.player_starting_score(player_id) - scored
    }

    /// Next player after `player_id` in round-robin order for whom
    /// `may_throw` holds. Falls back to `player_id` when nobody else may throw.
    pub fn next_player_where(
        &self,
        player_id: PlayerId,
        may_throw: impl Fn(PlayerId) -> bool,
    ) -> Option<PlayerId> {
        let position = self.players.iter().position(|p| *p == player_id)?;
        let count = self.players.len();
        (1..=count)
            .map(|offset| self.players[(position + offset) % count])
            .find(|p| *p == player_id || may_throw(*p))
    }

    pub fn last_visit(&self) -> Option<&Visit> {
        self.visits.last()
    }

    pub fn has_player(&self, player_id: PlayerId) -> bool {
        self.players.contains(&player_id)
    }
}

/// Everything needed to insert a leg row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLeg {
    pub match_id: MatchId,
    pub leg_type: MatchType,
    pub starting_score: i32,
    pub parameters: LegParameters,
    pub players: Vec<PlayerId>,
    pub handicaps: BTreeMap<PlayerId, i32>,
}

impl NewLeg {
    /// The next leg of a match: the first thrower moves to the end.
    pub fn following(previous: &Leg, starting_score: i32, players: &[PlayerId]) -> Self {
        let mut players = players.to_vec();
        if !players.is_empty() {
            players.rotate_left(1);
        }
        let handicaps = if previous.leg_type.uses_handicap() {
            previous.handicaps.clone()
        } else {
            BTreeMap::new()
        };

        Self {
            match_id: previous.match_id,
            leg_type: previous.leg_type,
            starting_score,
            parameters: previous.parameters.clone(),
            players,
            handicaps,
        }
    }

    pub fn into_leg(self, id: LegId, created_at: DateTime<Utc>) -> Leg {
        let current_player_id = self.players.first().copied().unwrap_or_default();
        Leg {
            id,
            match_id: self.match_id,
            leg_type: self.leg_type,
            starting_score: self.starting_score,
            parameters: self.parameters,
            players: self.players,
            handicaps: self.handicaps,
            current_player_id,
            winner_id: None,
            is_finished: false,
            visits: Vec::new(),
            created_at,
            finished_at: None,
        }
    }
}
