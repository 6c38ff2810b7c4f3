use std::collections::BTreeMap;

use super::models::{Match, MatchMode, MatchOutcome, OweEntry};
use crate::shared::PlayerId;

/// Decides whether a match is over given the winners of its finished legs,
/// in the order the legs were played.
///
/// A player reaching `wins_required` wins immediately. Otherwise, once
/// `legs_required` legs have been played, the match is drawn.
pub fn is_match_finished(mode: &MatchMode, leg_winners: &[PlayerId]) -> MatchOutcome {
    let mut wins: BTreeMap<PlayerId, u32> = BTreeMap::new();
    for winner in leg_winners {
        let count = wins.entry(*winner).or_default();
        *count += 1;
        if *count >= mode.wins_required {
            return MatchOutcome::Won(*winner);
        }
    }

    match mode.legs_required {
        Some(required) if leg_winners.len() as u32 >= required => MatchOutcome::Draw,
        _ => MatchOutcome::InProgress,
    }
}

/// Owe increments for every non-winning player of a finished match.
pub fn owe_entries(game: &Match, outcome: MatchOutcome) -> Vec<OweEntry> {
    let (Some(owe_type), Some(winner)) = (&game.owe_type, outcome.winner()) else {
        return Vec::new();
    };

    game.players
        .iter()
        .filter(|player| **player != winner)
        .map(|player| OweEntry {
            ower: *player,
            owee: winner,
            owe_type_id: owe_type.id,
        })
        .collect()
}
