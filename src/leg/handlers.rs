use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument};

use super::{
    models::Leg,
    service::LegFinished,
    types::{
        MatchStartedResponse, ModifyVisitRequest, NewLegRequest, OweResponse, PaybackRequest,
        PlayerOrderRequest, VisitRequest,
    },
};
use crate::darts::Visit;
use crate::matches::{Match, NewMatch};
use crate::shared::{AppError, AppState, LegId, MatchId, PlayerId, VisitId};

/// HTTP handler for starting a match with its first leg
///
/// POST /match
#[instrument(name = "start_match", skip(state, request))]
pub async fn start_match(
    State(state): State<AppState>,
    Json(request): Json<NewMatch>,
) -> Result<Json<MatchStartedResponse>, AppError> {
    info!(match_type = %request.match_type, players = request.players.len(), "Starting match");

    let (game, leg) = state.leg_service.start_match(request).await?;

    info!(match_id = game.id, leg_id = leg.id, "Match started successfully");
    Ok(Json(MatchStartedResponse { game, leg }))
}

/// GET /match/:match_id
#[instrument(name = "get_match", skip(state))]
pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
) -> Result<Json<Match>, AppError> {
    Ok(Json(state.leg_service.get_match(match_id).await?))
}

/// HTTP handler for starting the next leg of a match
///
/// POST /match/:match_id/leg
#[instrument(name = "new_leg", skip(state, request))]
pub async fn new_leg(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
    Json(request): Json<NewLegRequest>,
) -> Result<Json<Leg>, AppError> {
    let leg = state
        .leg_service
        .new_leg(match_id, request.starting_score, request.players)
        .await?;
    Ok(Json(leg))
}

/// GET /leg/:leg_id
#[instrument(name = "get_leg", skip(state))]
pub async fn get_leg(
    State(state): State<AppState>,
    Path(leg_id): Path<LegId>,
) -> Result<Json<Leg>, AppError> {
    Ok(Json(state.leg_service.get_leg(leg_id).await?))
}

/// HTTP handler for recording a visit
///
/// POST /leg/:leg_id/visit
/// Returns the stored visit with its bust flag applied
#[instrument(name = "add_visit", skip(state, request))]
pub async fn add_visit(
    State(state): State<AppState>,
    Path(leg_id): Path<LegId>,
    Json(request): Json<VisitRequest>,
) -> Result<Json<Visit>, AppError> {
    let darts = request.darts.parse()?;
    let visit = state
        .leg_service
        .add_visit(leg_id, request.player_id, darts)
        .await?;

    info!(
        leg_id,
        player_id = request.player_id,
        score = visit.score(),
        "Visit added"
    );
    Ok(Json(visit))
}

/// HTTP handler for the visit that ends a leg
///
/// POST /leg/:leg_id/finish
#[instrument(name = "finish_leg", skip(state, request))]
pub async fn finish_leg(
    State(state): State<AppState>,
    Path(leg_id): Path<LegId>,
    Json(request): Json<VisitRequest>,
) -> Result<Json<LegFinished>, AppError> {
    let darts = request.darts.parse()?;
    let finished = state
        .leg_service
        .finish_leg(leg_id, request.player_id, darts)
        .await?;

    info!(leg_id, winner_id = ?finished.leg.winner_id, "Leg finished via HTTP");
    Ok(Json(finished))
}

/// POST /leg/:leg_id/undo
#[instrument(name = "undo_leg_finish", skip(state))]
pub async fn undo_leg_finish(
    State(state): State<AppState>,
    Path(leg_id): Path<LegId>,
) -> Result<Json<Leg>, AppError> {
    Ok(Json(state.leg_service.undo_leg_finish(leg_id).await?))
}

/// DELETE /leg/:leg_id/visit/last
#[instrument(name = "undo_last_visit", skip(state))]
pub async fn undo_last_visit(
    State(state): State<AppState>,
    Path(leg_id): Path<LegId>,
) -> Result<Json<Leg>, AppError> {
    Ok(Json(state.leg_service.undo_last_visit(leg_id).await?))
}

/// PUT /leg/:leg_id/visit/:visit_id
#[instrument(name = "modify_visit", skip(state, request))]
pub async fn modify_visit(
    State(state): State<AppState>,
    Path((leg_id, visit_id)): Path<(LegId, VisitId)>,
    Json(request): Json<ModifyVisitRequest>,
) -> Result<Json<Visit>, AppError> {
    let darts = request.darts.parse()?;
    Ok(Json(
        state
            .leg_service
            .modify_visit(leg_id, visit_id, darts)
            .await?,
    ))
}

/// DELETE /leg/:leg_id
#[instrument(name = "delete_leg", skip(state))]
pub async fn delete_leg(
    State(state): State<AppState>,
    Path(leg_id): Path<LegId>,
) -> Result<StatusCode, AppError> {
    state.leg_service.delete_leg(leg_id).await?;
    info!(leg_id, "Leg deleted via HTTP");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /leg/:leg_id/order
#[instrument(name = "change_player_order", skip(state, request))]
pub async fn change_player_order(
    State(state): State<AppState>,
    Path(leg_id): Path<LegId>,
    Json(request): Json<PlayerOrderRequest>,
) -> Result<Json<Leg>, AppError> {
    Ok(Json(
        state
            .leg_service
            .change_player_order(leg_id, request.players)
            .await?,
    ))
}

/// GET /owes/:ower/:owee/:owe_type_id
#[instrument(name = "owed", skip(state))]
pub async fn owed(
    State(state): State<AppState>,
    Path((ower, owee, owe_type_id)): Path<(PlayerId, PlayerId, i64)>,
) -> Result<Json<OweResponse>, AppError> {
    let amount = state.leg_service.owed(ower, owee, owe_type_id).await?;
    Ok(Json(OweResponse {
        ower,
        owee,
        owe_type_id,
        amount,
    }))
}

/// POST /owes/payback
#[instrument(name = "payback", skip(state, request))]
pub async fn payback(
    State(state): State<AppState>,
    Json(request): Json<PaybackRequest>,
) -> Result<Json<OweResponse>, AppError> {
    let amount = state
        .leg_service
        .payback(request.ower, request.owee, request.owe_type_id, request.amount)
        .await?;
    Ok(Json(OweResponse {
        ower: request.ower,
        owee: request.owee,
        owe_type_id: request.owe_type_id,
        amount,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryDartsRepository;
    use axum::{
        body::Body,
        http::Request,
        routing::{get, post},
        Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/match", post(start_match))
            .route("/leg/:leg_id", get(get_leg))
            .route("/leg/:leg_id/visit", post(add_visit))
            .route("/leg/:leg_id/finish", post(finish_leg))
            .with_state(state)
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn start(state: &AppState) -> MatchStartedResponse {
        let body = r#"{
            "match_type": "x01",
            "mode": {"wins_required": 1, "legs_required": null},
            "players": [1, 2],
            "starting_score": 40
        }"#;
        let response = app(state.clone())
            .oneshot(json_request("POST", "/match", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_start_match_handler() {
        let state = AppState::new(Arc::new(InMemoryDartsRepository::new()));

        let started = start(&state).await;

        assert_eq!(started.leg.match_id, started.game.id);
        assert_eq!(started.leg.current_player_id, 1);
        assert_eq!(started.game.current_leg_id, Some(started.leg.id));
    }

    #[tokio::test]
    async fn test_add_visit_handler_parses_notation() {
        let state = AppState::new(Arc::new(InMemoryDartsRepository::new()));
        let started = start(&state).await;

        let uri = format!("/leg/{}/visit", started.leg.id);
        let body = r#"{"player_id": 1, "darts": ["S20", "S10", "MISS"]}"#;
        let response = app(state.clone())
            .oneshot(json_request("POST", &uri, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let visit: Visit = serde_json::from_slice(&body).unwrap();
        assert_eq!(visit.score(), 30);
        assert_eq!(visit.player_id, 1);
    }

    #[tokio::test]
    async fn test_add_visit_handler_rejects_bad_notation() {
        let state = AppState::new(Arc::new(InMemoryDartsRepository::new()));
        let started = start(&state).await;

        let uri = format!("/leg/{}/visit", started.leg.id);
        let body = r#"{"player_id": 1, "darts": ["T25", "S10", "MISS"]}"#;
        let response = app(state)
            .oneshot(json_request("POST", &uri, body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_finish_leg_handler_conflicts_on_non_checkout() {
        let state = AppState::new(Arc::new(InMemoryDartsRepository::new()));
        let started = start(&state).await;

        let uri = format!("/leg/{}/finish", started.leg.id);
        let body = r#"{"player_id": 1, "darts": ["S20", "MISS", "MISS"]}"#;
        let response = app(state.clone())
            .oneshot(json_request("POST", &uri, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = r#"{"player_id": 1, "darts": ["D20", "MISS", "MISS"]}"#;
        let response = app(state)
            .oneshot(json_request("POST", &uri, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["leg"]["winner_id"], 1);
        assert_eq!(value["outcome"]["Won"], 1);
    }

    #[tokio::test]
    async fn test_get_leg_handler_not_found() {
        let state = AppState::new(Arc::new(InMemoryDartsRepository::new()));

        let request = Request::builder()
            .uri("/leg/77")
            .body(Body::empty())
            .unwrap();
        let response = app(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
