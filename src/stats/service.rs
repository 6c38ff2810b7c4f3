use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{models::StatisticsRow, registry::StatisticsRegistry, StatsError};
use crate::leg::Leg;
use crate::matches::MatchType;
use crate::repository::DartsRepository;
use crate::shared::{AppError, LegId};

/// Derives variant statistics for finished legs.
pub struct StatisticsService {
    repository: Arc<dyn DartsRepository>,
    registry: Arc<StatisticsRegistry>,
}

impl StatisticsService {
    pub fn new(repository: Arc<dyn DartsRepository>) -> Self {
        Self::with_registry(repository, Arc::new(StatisticsRegistry::default()))
    }

    pub fn with_registry(
        repository: Arc<dyn DartsRepository>,
        registry: Arc<StatisticsRegistry>,
    ) -> Self {
        Self {
            repository,
            registry,
        }
    }

    pub fn registry(&self) -> &StatisticsRegistry {
        &self.registry
    }

    pub fn table_for(&self, match_type: MatchType) -> Result<&'static str, StatsError> {
        self.registry.table_for(match_type)
    }

    /// Replays a finished leg. Used by the live finish path before commit and
    /// by recalculation, so both always produce the same rows.
    pub fn calculate_for_leg(&self, leg: &Leg) -> Result<Vec<StatisticsRow>, StatsError> {
        if !leg.is_finished {
            return Err(StatsError::LegNotFinished(leg.id));
        }
        let rows = self.registry.calculate(leg)?;
        debug!(
            leg_id = leg.id,
            leg_type = %leg.leg_type,
            rows = rows.len(),
            "Calculated leg statistics"
        );
        Ok(rows)
    }

    /// Loads a leg and replays it without storing anything.
    #[instrument(skip(self))]
    pub async fn calculate_statistics(&self, leg_id: LegId) -> Result<Vec<StatisticsRow>, AppError> {
        let leg = self
            .repository
            .get_leg(leg_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Leg {} not found", leg_id)))?;

        Ok(self.calculate_for_leg(&leg)?)
    }

    /// Rows currently stored for a leg.
    #[instrument(skip(self))]
    pub async fn stored_statistics(&self, leg_id: LegId) -> Result<Vec<StatisticsRow>, AppError> {
        if self.repository.get_leg(leg_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Leg {} not found", leg_id)));
        }
        let rows = self.repository.statistics_for_leg(leg_id).await?;
        info!(leg_id, rows = rows.len(), "Loaded stored leg statistics");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::darts::{Darts, Visit};
    use crate::leg::{LegParameters, NewLeg};
    use crate::matches::{MatchMode, MatchOutcome, NewMatch};
    use crate::repository::{InMemoryDartsRepository, LegFinish};
    use chrono::Utc;
    use std::collections::BTreeMap;

    async fn stored_leg(repository: &InMemoryDartsRepository, finished: bool) -> Leg {
        let new_match = NewMatch {
            match_type: MatchType::Shootout,
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
            leg_type: MatchType::Shootout,
            starting_score: 0,
            parameters: LegParameters::default(),
            players: vec![1, 2],
            handicaps: BTreeMap::new(),
        };
        let (_, leg) = repository.create_match(&new_match, &first_leg).await.unwrap();

        let mut visit = Visit::new(leg.id, 1, Darts::parse(["T20", "T20", "T20"]).unwrap());
        visit.fill_misses();
        repository.insert_visit(&visit, 2).await.unwrap();

        if finished {
            let mut last = Visit::new(leg.id, 2, Darts::parse(["MISS", "MISS", "MISS"]).unwrap());
            last.fill_misses();
            repository
                .commit_leg_finish(&LegFinish {
                    leg_id: leg.id,
                    match_id: leg.match_id,
                    visit: last,
                    next_player_id: 1,
                    winner_id: 1,
                    finished_at: Utc::now(),
                    statistics: Vec::new(),
                    outcome: MatchOutcome::Won(1),
                    owes: Vec::new(),
                    next_leg: None,
                })
                .await
                .unwrap();
        }
        repository.get_leg(leg.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn calculates_rows_for_finished_leg() {
        let repository = Arc::new(InMemoryDartsRepository::new());
        let leg = stored_leg(&repository, true).await;
        let service = StatisticsService::new(repository.clone());

        let rows = service.calculate_statistics(leg.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].table, "statistics_shootout");
        assert_eq!(rows[0].get_i64("score"), Some(180));
        assert_eq!(rows[1].get_i64("score"), Some(0));
    }

    #[tokio::test]
    async fn unfinished_leg_is_rejected() {
        let repository = Arc::new(InMemoryDartsRepository::new());
        let leg = stored_leg(&repository, false).await;
        let service = StatisticsService::new(repository);

        let result = service.calculate_statistics(leg.id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn unknown_leg_is_not_found() {
        let service = StatisticsService::new(Arc::new(InMemoryDartsRepository::new()));
        assert!(matches!(
            service.calculate_statistics(99).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.stored_statistics(99).await,
            Err(AppError::NotFound(_))
        ));
    }
}
