use dartscore::{
    darts::Darts,
    leg::{LegFinished, LegService},
    shared::{LegId, PlayerId},
};

// ============================================================================
// Leg Scripts
// ============================================================================

/// Visits to throw in order, optionally ending with the visit that finishes
/// the leg.
pub struct LegScript {
    visits: Vec<(PlayerId, [&'static str; 3])>,
    finish: Option<(PlayerId, [&'static str; 3])>,
}

impl LegScript {
    pub fn new() -> Self {
        Self {
            visits: vec![],
            finish: None,
        }
    }

    pub fn visit(mut self, player_id: PlayerId, codes: [&'static str; 3]) -> Self {
        self.visits.push((player_id, codes));
        self
    }

    /// Same visit `times` times in a row for each listed player, alternating.
    pub fn rounds(mut self, times: usize, players: &[(PlayerId, [&'static str; 3])]) -> Self {
        for _ in 0..times {
            self.visits.extend_from_slice(players);
        }
        self
    }

    pub fn finish(mut self, player_id: PlayerId, codes: [&'static str; 3]) -> Self {
        self.finish = Some((player_id, codes));
        self
    }

    pub async fn play(self, service: &LegService, leg_id: LegId) -> Option<LegFinished> {
        for (player_id, codes) in self.visits {
            service
                .add_visit(leg_id, player_id, darts(codes))
                .await
                .expect("visit should be recorded");
        }

        match self.finish {
            Some((player_id, codes)) => Some(
                service
                    .finish_leg(leg_id, player_id, darts(codes))
                    .await
                    .expect("leg should finish"),
            ),
            None => None,
        }
    }
}

pub fn darts(codes: [&str; 3]) -> Darts {
    Darts::parse(codes).expect("valid dart notation")
}
