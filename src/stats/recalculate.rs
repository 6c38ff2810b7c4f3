use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{models::StatisticsRow, service::StatisticsService};
use crate::matches::MatchType;
use crate::repository::{DartsRepository, LegQuery};
use crate::shared::{AppError, LegId};

/// Which legs a recalculation run replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LegSelection {
    Ids(Vec<LegId>),
    Variant {
        leg_type: MatchType,
        since: Option<DateTime<Utc>>,
        finished_only: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalculationMode {
    /// Log the pending updates and write nothing.
    #[default]
    DryRun,
    /// Write every pending update in one batch.
    Apply,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecalculationReport {
    pub mode: RecalculationMode,
    /// Legs that were replayed.
    pub legs: Vec<LegId>,
    /// Selected legs that are not finished yet.
    pub skipped: Vec<LegId>,
    pub updates: Vec<StatisticsRow>,
}

/// Rebuilds stored statistics from visit history for a batch of legs.
pub struct RecalculationDriver {
    repository: Arc<dyn DartsRepository>,
    statistics: Arc<StatisticsService>,
}

impl RecalculationDriver {
    pub fn new(repository: Arc<dyn DartsRepository>, statistics: Arc<StatisticsService>) -> Self {
        Self {
            repository,
            statistics,
        }
    }

    /// Replays every selected leg, then either logs or applies the result.
    ///
    /// All legs are replayed before anything is written, so one failing leg
    /// leaves the stored statistics untouched.
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        selection: LegSelection,
        mode: RecalculationMode,
    ) -> Result<RecalculationReport, AppError> {
        let legs = match &selection {
            LegSelection::Ids(ids) => {
                let mut legs = Vec::with_capacity(ids.len());
                for id in ids {
                    let leg = self
                        .repository
                        .get_leg(*id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("Leg {} not found", id)))?;
                    legs.push(leg);
                }
                legs
            }
            LegSelection::Variant {
                leg_type,
                since,
                finished_only,
            } => {
                self.repository
                    .legs_of_type(&LegQuery {
                        leg_type: *leg_type,
                        finished_only: *finished_only,
                        since: *since,
                    })
                    .await?
            }
        };

        let mut report = RecalculationReport {
            mode,
            legs: Vec::new(),
            skipped: Vec::new(),
            updates: Vec::new(),
        };
        for leg in &legs {
            if !leg.is_finished {
                warn!(leg_id = leg.id, "Skipping unfinished leg");
                report.skipped.push(leg.id);
                continue;
            }
            let rows = self.statistics.calculate_for_leg(leg)?;
            report.legs.push(leg.id);
            report.updates.extend(rows);
        }

        match mode {
            RecalculationMode::DryRun => {
                for row in &report.updates {
                    info!(
                        target: "recalculation",
                        leg_id = row.leg_id,
                        player_id = row.player_id,
                        statement = %row,
                        "Pending statistics update"
                    );
                }
            }
            RecalculationMode::Apply => {
                if !report.updates.is_empty() {
                    self.repository.apply_statistics(&report.updates).await?;
                }
            }
        }

        info!(
            legs = report.legs.len(),
            skipped = report.skipped.len(),
            updates = report.updates.len(),
            ?mode,
            "Recalculation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::darts::{Darts, Visit};
    use crate::leg::{LegParameters, NewLeg};
    use crate::matches::{MatchMode, MatchOutcome, NewMatch};
    use crate::repository::{InMemoryDartsRepository, LegFinish};
    use std::collections::BTreeMap;

    async fn cricket_leg(repository: &InMemoryDartsRepository, finish: bool) -> LegId {
        let new_match = NewMatch {
            match_type: MatchType::Cricket,
            mode: MatchMode::best_of(1),
            players: vec![1, 2],
            starting_score: 0,
            parameters: LegParameters::default(),
            handicaps: BTreeMap::new(),
            owe_type: None,
            tournament_id: None,
        };
        let first_leg = NewLeg {
            match_id: 0,
            leg_type: MatchType::Cricket,
            starting_score: 0,
            parameters: LegParameters::default(),
            players: vec![1, 2],
            handicaps: BTreeMap::new(),
        };
        let (_, leg) = repository.create_match(&new_match, &first_leg).await.unwrap();

        let mut visit = Visit::new(leg.id, 1, Darts::parse(["T20", "T20", "S19"]).unwrap());
        visit.fill_misses();
        if finish {
            repository
                .commit_leg_finish(&LegFinish {
                    leg_id: leg.id,
                    match_id: leg.match_id,
                    visit,
                    next_player_id: 2,
                    winner_id: 1,
                    finished_at: Utc::now(),
                    statistics: Vec::new(),
                    outcome: MatchOutcome::Won(1),
                    owes: Vec::new(),
                    next_leg: None,
                })
                .await
                .unwrap();
        } else {
            repository.insert_visit(&visit, 2).await.unwrap();
        }
        leg.id
    }

    fn driver(repository: Arc<InMemoryDartsRepository>) -> RecalculationDriver {
        let statistics = Arc::new(StatisticsService::new(repository.clone()));
        RecalculationDriver::new(repository, statistics)
    }

    #[tokio::test]
    async fn dry_run_writes_nothing_and_repeats_exactly() {
        let repository = Arc::new(InMemoryDartsRepository::new());
        let leg_id = cricket_leg(&repository, true).await;
        let driver = driver(repository.clone());

        let first = driver
            .run(LegSelection::Ids(vec![leg_id]), RecalculationMode::DryRun)
            .await
            .unwrap();
        let second = driver
            .run(LegSelection::Ids(vec![leg_id]), RecalculationMode::DryRun)
            .await
            .unwrap();

        assert_eq!(first.updates.len(), 2);
        let rendered: Vec<String> = first.updates.iter().map(ToString::to_string).collect();
        let again: Vec<String> = second.updates.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, again);
        assert!(repository.statistics_for_leg(leg_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_stores_rows_for_selected_variant() {
        let repository = Arc::new(InMemoryDartsRepository::new());
        let finished = cricket_leg(&repository, true).await;
        let open = cricket_leg(&repository, false).await;
        let driver = driver(repository.clone());

        let report = driver
            .run(
                LegSelection::Variant {
                    leg_type: MatchType::Cricket,
                    since: None,
                    finished_only: false,
                },
                RecalculationMode::Apply,
            )
            .await
            .unwrap();

        assert_eq!(report.legs, vec![finished]);
        assert_eq!(report.skipped, vec![open]);
        let stored = repository.statistics_for_leg(finished).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|row| row.table == "statistics_cricket"));
    }

    #[tokio::test]
    async fn unknown_leg_aborts_the_run() {
        let repository = Arc::new(InMemoryDartsRepository::new());
        let leg_id = cricket_leg(&repository, true).await;
        let driver = driver(repository.clone());

        let result = driver
            .run(LegSelection::Ids(vec![leg_id, 404]), RecalculationMode::Apply)
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(repository.statistics_for_leg(leg_id).await.unwrap().is_empty());
    }
}
