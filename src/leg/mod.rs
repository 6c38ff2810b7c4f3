// Public API
pub use handlers::{
    add_visit, change_player_order, delete_leg, finish_leg, get_leg, get_match, modify_visit,
    new_leg, owed, payback, start_match, undo_last_visit, undo_leg_finish,
};
pub use models::{
    Leg, LegParameters, LegState, NewLeg, DEFAULT_DARTS_AT_X_TARGET, DEFAULT_KNOCKOUT_LIVES,
};
pub use service::{LegFinished, LegService, LegServiceBuilder};
pub use types::{
    DartsPayload, MatchStartedResponse, ModifyVisitRequest, NewLegRequest, OweResponse,
    PaybackRequest, PlayerOrderRequest, VisitRequest,
};

// Internal modules
mod handlers;
mod models;
mod service;
mod types;
