use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::darts::DartError;
use crate::leg::LegService;
use crate::repository::DartsRepository;
use crate::stats::{RecalculationDriver, StatisticsService, StatsError};

pub type PlayerId = i64;
pub type LegId = i64;
pub type MatchId = i64;
pub type VisitId = i64;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub leg_service: Arc<LegService>,
    pub statistics: Arc<StatisticsService>,
    pub recalculation: Arc<RecalculationDriver>,
}

impl AppState {
    /// Wires the services around one persistence port.
    pub fn new(repository: Arc<dyn DartsRepository>) -> Self {
        let statistics = Arc::new(StatisticsService::new(Arc::clone(&repository)));
        let leg_service = Arc::new(
            LegService::builder(Arc::clone(&repository), Arc::clone(&statistics)).build(),
        );
        let recalculation = Arc::new(RecalculationDriver::new(
            repository,
            Arc::clone(&statistics),
        ));

        Self {
            leg_service,
            statistics,
            recalculation,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl From<DartError> for AppError {
    fn from(err: DartError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<StatsError> for AppError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::UnsupportedMatchType(_) | StatsError::LegNotFinished(_) => {
                AppError::Conflict(err.to_string())
            }
            StatsError::Replay(msg) => {
                tracing::error!(error = %msg, "Statistics replay failed");
                AppError::Internal
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
