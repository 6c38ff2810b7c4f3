use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument};

use super::{
    models::StatisticsRow,
    recalculate::{LegSelection, RecalculationMode, RecalculationReport},
};
use crate::matches::MatchType;
use crate::shared::{AppError, AppState, LegId};

/// Request payload for a recalculation run
///
/// Either `leg_ids` or `leg_type` selects the legs. Runs are dry unless
/// `dry_run` is set to false.
#[derive(Debug, Deserialize)]
pub struct RecalculateRequest {
    #[serde(default)]
    pub leg_ids: Option<Vec<LegId>>,
    #[serde(default)]
    pub leg_type: Option<MatchType>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub finished_only: bool,
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

impl RecalculateRequest {
    fn selection(&self) -> Result<LegSelection, AppError> {
        match (&self.leg_ids, self.leg_type) {
            (Some(ids), None) if !ids.is_empty() => Ok(LegSelection::Ids(ids.clone())),
            (None, Some(leg_type)) => Ok(LegSelection::Variant {
                leg_type,
                since: self.since,
                finished_only: self.finished_only,
            }),
            _ => Err(AppError::BadRequest(
                "Give either leg_ids or leg_type".to_string(),
            )),
        }
    }

    fn mode(&self) -> RecalculationMode {
        if self.dry_run {
            RecalculationMode::DryRun
        } else {
            RecalculationMode::Apply
        }
    }
}

/// HTTP handler for the statistics stored for a leg
///
/// GET /leg/:leg_id/statistics
#[instrument(name = "leg_statistics", skip(state))]
pub async fn leg_statistics(
    State(state): State<AppState>,
    Path(leg_id): Path<LegId>,
) -> Result<Json<Vec<StatisticsRow>>, AppError> {
    let rows = state.statistics.stored_statistics(leg_id).await?;
    Ok(Json(rows))
}

/// HTTP handler for rebuilding statistics from visit history
///
/// POST /statistics/recalculate
#[instrument(name = "recalculate_statistics", skip(state))]
pub async fn recalculate_statistics(
    State(state): State<AppState>,
    Json(request): Json<RecalculateRequest>,
) -> Result<Json<RecalculationReport>, AppError> {
    let selection = request.selection()?;
    let mode = request.mode();
    info!(?mode, "Recalculating statistics");

    let report = state.recalculation.run(selection, mode).await?;
    Ok(Json(report))
}
