use serde::{Deserialize, Serialize};

use super::models::Leg;
use crate::darts::{DartError, Darts};
use crate::matches::Match;
use crate::shared::PlayerId;

/// Three darts in notation, e.g. `["T20", "D16", "MISS"]`
#[derive(Debug, Clone, Deserialize)]
pub struct DartsPayload(pub [String; 3]);

impl DartsPayload {
    pub fn parse(&self) -> Result<Darts, DartError> {
        let [first, second, third] = &self.0;
        Darts::parse([first.as_str(), second.as_str(), third.as_str()])
    }
}

/// Request payload for recording or finishing a visit
#[derive(Debug, Deserialize)]
pub struct VisitRequest {
    pub player_id: PlayerId,
    pub darts: DartsPayload,
}

/// Request payload for correcting a stored visit
#[derive(Debug, Deserialize)]
pub struct ModifyVisitRequest {
    pub darts: DartsPayload,
}

#[derive(Debug, Deserialize)]
pub struct NewLegRequest {
    pub starting_score: i32,
    pub players: Vec<PlayerId>,
}

#[derive(Debug, Deserialize)]
pub struct PlayerOrderRequest {
    pub players: Vec<PlayerId>,
}

#[derive(Debug, Deserialize)]
pub struct PaybackRequest {
    pub ower: PlayerId,
    pub owee: PlayerId,
    pub owe_type_id: i64,
    pub amount: i64,
}

/// Response for a newly started match
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchStartedResponse {
    #[serde(rename = "match")]
    pub game: Match,
    pub leg: Leg,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OweResponse {
    pub ower: PlayerId,
    pub owee: PlayerId,
    pub owe_type_id: i64,
    pub amount: i64,
}
