use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::leg;
use crate::shared::AppState;
use crate::stats;

/// Every HTTP route, wired to the shared state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/match", post(leg::start_match))
        .route("/match/:match_id", get(leg::get_match))
        .route("/match/:match_id/leg", post(leg::new_leg))
        .route("/leg/:leg_id", get(leg::get_leg).delete(leg::delete_leg))
        .route("/leg/:leg_id/visit", post(leg::add_visit))
        .route("/leg/:leg_id/visit/last", delete(leg::undo_last_visit))
        .route("/leg/:leg_id/visit/:visit_id", put(leg::modify_visit))
        .route("/leg/:leg_id/finish", post(leg::finish_leg))
        .route("/leg/:leg_id/undo", post(leg::undo_leg_finish))
        .route("/leg/:leg_id/order", put(leg::change_player_order))
        .route("/leg/:leg_id/statistics", get(stats::leg_statistics))
        .route(
            "/statistics/recalculate",
            post(stats::recalculate_statistics),
        )
        .route("/owes/:ower/:owee/:owe_type_id", get(leg::owed))
        .route("/owes/payback", post(leg::payback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
