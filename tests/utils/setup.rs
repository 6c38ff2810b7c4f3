use std::collections::BTreeMap;
use std::sync::Arc;

use dartscore::{
    leg::{Leg, LegParameters},
    matches::{Match, MatchMode, MatchType, NewMatch, OweType},
    repository::InMemoryDartsRepository,
    shared::PlayerId,
    AppState,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub repository: Arc<InMemoryDartsRepository>,
    pub state: AppState,
    pub game: Match,
    pub leg: Leg,
}

pub struct TestSetupBuilder {
    match_type: MatchType,
    players: Vec<PlayerId>,
    starting_score: i32,
    mode: MatchMode,
    owe_type: Option<OweType>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            match_type: MatchType::X01,
            players: vec![1, 2],
            starting_score: 301,
            mode: MatchMode::best_of(1),
            owe_type: None,
        }
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    pub fn with_players(mut self, players: Vec<PlayerId>) -> Self {
        self.players = players;
        self
    }

    pub fn with_starting_score(mut self, starting_score: i32) -> Self {
        self.starting_score = starting_score;
        self
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn best_of(self, legs: u32) -> Self {
        self.with_mode(MatchMode::best_of(legs))
    }

    pub fn with_beer_stake(mut self) -> Self {
        self.owe_type = Some(OweType {
            id: 1,
            item: "Beer".to_string(),
        });
        self
    }

    pub async fn build(self) -> TestSetup {
        let repository = Arc::new(InMemoryDartsRepository::new());
        let state = AppState::new(repository.clone());

        let (game, leg) = state
            .leg_service
            .start_match(NewMatch {
                match_type: self.match_type,
                mode: self.mode,
                players: self.players,
                starting_score: self.starting_score,
                parameters: LegParameters::default(),
                handicaps: BTreeMap::new(),
                owe_type: self.owe_type,
                tournament_id: None,
            })
            .await
            .expect("match should start");

        TestSetup {
            repository,
            state,
            game,
            leg,
        }
    }
}
