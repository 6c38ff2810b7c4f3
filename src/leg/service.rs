use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use super::models::{Leg, NewLeg};
use crate::darts::{Darts, OutshotType, Visit};
use crate::matches::{
    is_match_finished, owe_entries, BadgeChecker, EloRecalculator, Match, MatchOutcome,
    MatchType, NewMatch, NoOpBadgeChecker, NoOpEloRecalculator,
};
use crate::repository::{DartsRepository, LegDeletion, LegFinish, LegReopen};
use crate::shared::{AppError, LegId, MatchId, PlayerId, VisitId};
use crate::stats::rules::knocked_out;
use crate::stats::StatisticsService;

/// Result of a finished leg.
#[derive(Debug, Clone, Serialize)]
pub struct LegFinished {
    pub leg: Leg,
    pub outcome: MatchOutcome,
    /// Leg created for the rest of the match, if it goes on.
    pub next_leg: Option<Leg>,
}

/// Live scoring: the leg state machine and the match rules around it.
///
/// Mutations on the same leg run one at a time; different legs never wait on
/// each other.
pub struct LegService {
    repository: Arc<dyn DartsRepository>,
    statistics: Arc<StatisticsService>,
    elo: Arc<dyn EloRecalculator>,
    badges: Arc<dyn BadgeChecker>,
    leg_mutexes: Arc<RwLock<HashMap<LegId, Arc<AsyncMutex<()>>>>>,
}

impl LegService {
    pub fn builder(
        repository: Arc<dyn DartsRepository>,
        statistics: Arc<StatisticsService>,
    ) -> LegServiceBuilder {
        LegServiceBuilder::new(repository, statistics)
    }

    #[instrument(skip(self, new_match), fields(match_type = %new_match.match_type))]
    pub async fn start_match(&self, new_match: NewMatch) -> Result<(Match, Leg), AppError> {
        validate_players(&new_match.players)?;
        if new_match.mode.wins_required == 0 {
            return Err(AppError::BadRequest(
                "wins_required must be at least 1".to_string(),
            ));
        }
        if new_match.mode.legs_required == Some(0) {
            return Err(AppError::BadRequest(
                "legs_required must be at least 1".to_string(),
            ));
        }
        if new_match.match_type.is_countdown() && new_match.starting_score <= 0 {
            return Err(AppError::BadRequest(format!(
                "{} needs a positive starting score",
                new_match.match_type
            )));
        }
        if new_match.parameters.starting_lives == Some(0) {
            return Err(AppError::BadRequest(
                "starting_lives must be at least 1".to_string(),
            ));
        }
        if let Some(stranger) = new_match
            .handicaps
            .keys()
            .find(|p| !new_match.players.contains(p))
        {
            return Err(AppError::BadRequest(format!(
                "Handicap given for player {} who is not playing",
                stranger
            )));
        }

        let first_leg = NewLeg {
            match_id: 0,
            leg_type: new_match.match_type,
            starting_score: new_match.starting_score,
            parameters: new_match.parameters.clone(),
            players: new_match.players.clone(),
            handicaps: new_match.handicaps.clone(),
        };
        let (game, leg) = self.repository.create_match(&new_match, &first_leg).await?;

        info!(match_id = game.id, leg_id = leg.id, "Match started");
        Ok((game, leg))
    }

    /// Starts the next leg of a match. The first thrower moves to the end of
    /// `players`.
    #[instrument(skip(self))]
    pub async fn new_leg(
        &self,
        match_id: MatchId,
        starting_score: i32,
        players: Vec<PlayerId>,
    ) -> Result<Leg, AppError> {
        validate_players(&players)?;
        let game = self.get_match(match_id).await?;
        ensure_same_players(
            &players,
            &game.players,
            "Leg players must be the match's players",
        )?;
        if game.is_finished {
            return Err(AppError::Conflict(format!(
                "Match {} is already finished",
                match_id
            )));
        }

        let current_leg_id = game.current_leg_id.ok_or_else(|| {
            AppError::Conflict(format!("Match {} has no leg to follow", match_id))
        })?;
        let current = self.get_leg(current_leg_id).await?;
        if !current.is_finished {
            return Err(AppError::Conflict(format!(
                "Leg {} is still in progress",
                current.id
            )));
        }

        let leg = self
            .repository
            .start_leg(&NewLeg::following(&current, starting_score, &players))
            .await?;

        info!(leg_id = leg.id, first_player = leg.current_player_id, "New leg started");
        Ok(leg)
    }

    pub async fn get_leg(&self, leg_id: LegId) -> Result<Leg, AppError> {
        self.repository
            .get_leg(leg_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Leg {} not found", leg_id)))
    }

    pub async fn get_match(&self, match_id: MatchId) -> Result<Match, AppError> {
        self.repository
            .get_match(match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Match {} not found", match_id)))
    }

    /// Records a visit that does not end the leg.
    #[instrument(skip(self, darts))]
    pub async fn add_visit(
        &self,
        leg_id: LegId,
        player_id: PlayerId,
        darts: Darts,
    ) -> Result<Visit, AppError> {
        darts.validate()?;
        let leg_lock = self.leg_lock(leg_id).await;
        let _guard = leg_lock.lock().await;

        let leg = self.get_leg(leg_id).await?;
        ensure_open(&leg)?;
        ensure_turn(&leg, player_id)?;

        let mut visit = Visit::new(leg_id, player_id, darts);
        if leg.leg_type.is_countdown() {
            let remaining = leg.remaining(player_id);
            visit.set_is_bust(remaining, leg.parameters.outshot);
            if !visit.is_bust && visit.score() == remaining {
                return Err(AppError::Conflict(format!(
                    "Visit checks out leg {}; finish the leg instead",
                    leg_id
                )));
            }
        } else {
            visit.fill_misses();
        }

        let next_player_id = following_player(&leg, &visit);
        let visit = self.repository.insert_visit(&visit, next_player_id).await?;
        debug!(
            visit_id = visit.id,
            score = visit.score(),
            is_bust = visit.is_bust,
            next_player_id,
            "Visit recorded"
        );
        Ok(visit)
    }

    /// Records the final visit, stores statistics and settles the match.
    #[instrument(skip(self, darts))]
    pub async fn finish_leg(
        &self,
        leg_id: LegId,
        player_id: PlayerId,
        darts: Darts,
    ) -> Result<LegFinished, AppError> {
        darts.validate()?;
        let leg_lock = self.leg_lock(leg_id).await;
        let _guard = leg_lock.lock().await;

        let leg = self.get_leg(leg_id).await?;
        ensure_open(&leg)?;
        ensure_turn(&leg, player_id)?;
        let game = self.get_match(leg.match_id).await?;
        if game.is_finished {
            return Err(AppError::Conflict(format!(
                "Match {} is already finished",
                game.id
            )));
        }

        let mut visit = Visit::new(leg_id, player_id, darts);
        if leg.leg_type.is_countdown() {
            let remaining = leg.remaining(player_id);
            visit.set_is_bust(remaining, leg.parameters.outshot);
            if visit.is_bust || visit.score() != remaining {
                return Err(AppError::Conflict(format!(
                    "Visit does not check out {} remaining",
                    remaining
                )));
            }
        } else {
            visit.fill_misses();
        }

        let next_player_id = following_player(&leg, &visit);
        let mut finished = leg.clone();
        finished.visits.push(visit.clone());
        let winner_id = if leg.leg_type.winner_by_highest_score() {
            highest_scorer(&finished)
        } else {
            player_id
        };
        finished.is_finished = true;
        finished.winner_id = Some(winner_id);
        finished.finished_at = Some(Utc::now());
        finished.current_player_id = next_player_id;

        let statistics = self.statistics.calculate_for_leg(&finished)?;

        let leg_winners: Vec<PlayerId> = self
            .repository
            .legs_for_match(game.id)
            .await?
            .iter()
            .filter_map(|l| if l.id == leg_id { Some(winner_id) } else { l.winner_id })
            .collect();
        let outcome = is_match_finished(&game.mode, &leg_winners);
        let next_leg = (!outcome.is_finished() && game.current_leg_id == Some(leg_id))
            .then(|| NewLeg::following(&leg, leg.starting_score, &leg.players));

        let commit = self
            .repository
            .commit_leg_finish(&LegFinish {
                leg_id,
                match_id: game.id,
                visit,
                next_player_id,
                winner_id,
                finished_at: finished.finished_at.unwrap_or_else(Utc::now),
                statistics,
                outcome,
                owes: owe_entries(&game, outcome),
                next_leg,
            })
            .await?;
        if let Some(last) = finished.visits.last_mut() {
            *last = commit.visit;
        }

        info!(winner_id, outcome = ?outcome, "Leg finished");
        self.notify_finished(&finished, &game, outcome).await;

        Ok(LegFinished {
            leg: finished,
            outcome,
            next_leg: commit.next_leg,
        })
    }

    /// Reverses exactly one finish: the final visit, the flags, the statistics,
    /// the owes and the empty leg created after it.
    #[instrument(skip(self))]
    pub async fn undo_leg_finish(&self, leg_id: LegId) -> Result<Leg, AppError> {
        let leg_lock = self.leg_lock(leg_id).await;
        let _guard = leg_lock.lock().await;

        let leg = self.get_leg(leg_id).await?;
        if !leg.is_finished {
            return Err(AppError::Conflict(format!(
                "Leg {} was never finished",
                leg_id
            )));
        }
        let last = leg.last_visit().cloned().ok_or_else(|| {
            AppError::Conflict(format!("Leg {} has no visits to undo", leg_id))
        })?;
        let game = self.get_match(leg.match_id).await?;

        let legs = self.repository.legs_for_match(game.id).await?;
        let successors: Vec<&Leg> = legs.iter().filter(|l| l.id > leg_id).collect();
        let discard_leg = match successors.as_slice() {
            [] => None,
            [next] if next.visits.is_empty() => Some(next.id),
            _ => {
                return Err(AppError::Conflict(format!(
                    "Leg {} is already followed by play",
                    leg_id
                )))
            }
        };

        let owes = if game.is_finished {
            let outcome = game.winner_id.map_or(MatchOutcome::Draw, MatchOutcome::Won);
            owe_entries(&game, outcome)
        } else {
            Vec::new()
        };

        self.repository
            .commit_leg_reopen(&LegReopen {
                leg_id,
                match_id: game.id,
                visit_id: last.id,
                current_player_id: last.player_id,
                reopen_match: game.is_finished,
                owes,
                discard_leg,
            })
            .await?;
        if let Some(discarded) = discard_leg {
            self.clear_leg_lock(discarded).await;
        }

        info!(reopened_match = game.is_finished, ?discard_leg, "Leg finish undone");
        self.get_leg(leg_id).await
    }

    /// Takes back the latest visit of a leg still in play.
    #[instrument(skip(self))]
    pub async fn undo_last_visit(&self, leg_id: LegId) -> Result<Leg, AppError> {
        let leg_lock = self.leg_lock(leg_id).await;
        let _guard = leg_lock.lock().await;

        let leg = self.get_leg(leg_id).await?;
        ensure_open(&leg)?;
        let last = leg
            .last_visit()
            .ok_or_else(|| AppError::Conflict(format!("Leg {} has no visits", leg_id)))?;

        self.repository
            .delete_last_visit(leg_id, last.id, last.player_id)
            .await?;
        debug!(visit_id = last.id, "Last visit removed");
        self.get_leg(leg_id).await
    }

    /// Corrects the darts of a stored visit.
    #[instrument(skip(self, darts))]
    pub async fn modify_visit(
        &self,
        leg_id: LegId,
        visit_id: VisitId,
        darts: Darts,
    ) -> Result<Visit, AppError> {
        darts.validate()?;
        let leg_lock = self.leg_lock(leg_id).await;
        let _guard = leg_lock.lock().await;

        let mut leg = self.get_leg(leg_id).await?;
        let index = leg
            .visits
            .iter()
            .position(|v| v.id == visit_id)
            .ok_or_else(|| AppError::NotFound(format!("Visit {} not found", visit_id)))?;
        let original = &leg.visits[index];

        let mut corrected = Visit::new(leg_id, original.player_id, darts);
        corrected.id = original.id;
        corrected.created_at = original.created_at;
        if !leg.leg_type.is_countdown() {
            corrected.fill_misses();
        }

        // Countdown busts depend on every earlier visit, so everything from
        // the corrected visit on is rescored. Darts voided by a bust stay lost.
        let mut changed = Vec::new();
        for position in index..leg.visits.len() {
            let mut visit = if position == index {
                corrected.clone()
            } else {
                leg.visits[position].clone()
            };
            if leg.leg_type.is_countdown() {
                visit.set_is_bust(
                    leg.remaining_before(visit.player_id, position),
                    leg.parameters.outshot,
                );
            }
            if position == index || visit != leg.visits[position] {
                changed.push(visit.clone());
            }
            leg.visits[position] = visit;
        }

        if leg.leg_type.is_countdown() {
            ensure_countdown_consistent(&leg)?;
        }
        let statistics = if leg.is_finished {
            self.statistics.calculate_for_leg(&leg)?
        } else {
            Vec::new()
        };

        self.repository
            .replace_visits(leg_id, &changed, &statistics)
            .await?;
        let visit = leg.visits[index].clone();
        info!(
            score = visit.score(),
            is_bust = visit.is_bust,
            rescored = changed.len() - 1,
            "Visit corrected"
        );
        Ok(visit)
    }

    /// Removes a leg. The match moves back to its latest finished leg, or is
    /// removed with it when none is left.
    #[instrument(skip(self))]
    pub async fn delete_leg(&self, leg_id: LegId) -> Result<(), AppError> {
        {
            let leg_lock = self.leg_lock(leg_id).await;
            let _guard = leg_lock.lock().await;

            let leg = self.get_leg(leg_id).await?;
            let game = self.get_match(leg.match_id).await?;

            let current_leg_id = if game.current_leg_id == Some(leg_id) {
                self.repository
                    .legs_for_match(game.id)
                    .await?
                    .iter()
                    .rev()
                    .find(|l| l.id != leg_id && l.is_finished)
                    .map(|l| l.id)
            } else {
                game.current_leg_id
            };

            self.repository
                .delete_leg(&LegDeletion {
                    leg_id,
                    match_id: game.id,
                    current_leg_id,
                })
                .await?;
            info!(match_id = game.id, ?current_leg_id, "Leg deleted");
        }

        self.clear_leg_lock(leg_id).await;
        Ok(())
    }

    /// Rewrites the throwing order; the first player still in the leg throws
    /// next.
    #[instrument(skip(self))]
    pub async fn change_player_order(
        &self,
        leg_id: LegId,
        players: Vec<PlayerId>,
    ) -> Result<Leg, AppError> {
        let leg_lock = self.leg_lock(leg_id).await;
        let _guard = leg_lock.lock().await;

        let leg = self.get_leg(leg_id).await?;
        ensure_open(&leg)?;

        ensure_same_players(
            &players,
            &leg.players,
            "New order must contain exactly the leg's players",
        )?;

        let out = eliminated(&leg);
        let current_player_id = players
            .iter()
            .copied()
            .find(|p| !out.contains(p))
            .unwrap_or(players[0]);
        self.repository
            .update_player_order(leg_id, &players, current_player_id)
            .await?;
        info!(current_player_id, "Player order changed");
        self.get_leg(leg_id).await
    }

    pub async fn owed(
        &self,
        ower: PlayerId,
        owee: PlayerId,
        owe_type_id: i64,
    ) -> Result<i64, AppError> {
        self.repository.owed(ower, owee, owe_type_id).await
    }

    #[instrument(skip(self))]
    pub async fn payback(
        &self,
        ower: PlayerId,
        owee: PlayerId,
        owe_type_id: i64,
        amount: i64,
    ) -> Result<i64, AppError> {
        if amount <= 0 {
            return Err(AppError::BadRequest(
                "Payback amount must be positive".to_string(),
            ));
        }
        let remaining = self
            .repository
            .payback(ower, owee, owe_type_id, amount)
            .await?;
        info!(remaining, "Owe paid back");
        Ok(remaining)
    }

    async fn notify_finished(&self, leg: &Leg, game: &Match, outcome: MatchOutcome) {
        if let Err(e) = self.badges.check_leg(leg).await {
            error!(error = %e, leg_id = leg.id, "Badge check failed");
        }
        if !outcome.is_finished() {
            return;
        }

        let result = match game.tournament_id {
            Some(tournament_id) => self.elo.recalculate_for_tournament(tournament_id).await,
            None => self.elo.recalculate_for_match(game.id).await,
        };
        if let Err(e) = result {
            warn!(error = %e, match_id = game.id, "Elo recalculation failed");
        }
    }

    async fn leg_lock(&self, leg_id: LegId) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.leg_mutexes.read().await;
            if let Some(lock) = guard.get(&leg_id) {
                return lock.clone();
            }
        }

        let mut guard = self.leg_mutexes.write().await;
        guard
            .entry(leg_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn clear_leg_lock(&self, leg_id: LegId) {
        let mut guard = self.leg_mutexes.write().await;
        guard.remove(&leg_id);
    }
}

fn validate_players(players: &[PlayerId]) -> Result<(), AppError> {
    if players.is_empty() {
        return Err(AppError::BadRequest("At least one player is required".to_string()));
    }
    let distinct: BTreeSet<&PlayerId> = players.iter().collect();
    if distinct.len() != players.len() {
        return Err(AppError::BadRequest("Players must be distinct".to_string()));
    }
    Ok(())
}

fn ensure_open(leg: &Leg) -> Result<(), AppError> {
    if leg.is_finished {
        return Err(AppError::Conflict(format!(
            "Leg {} is already finished",
            leg.id
        )));
    }
    Ok(())
}

fn ensure_same_players(
    given: &[PlayerId],
    expected: &[PlayerId],
    message: &str,
) -> Result<(), AppError> {
    let mut given = given.to_vec();
    let mut expected = expected.to_vec();
    given.sort_unstable();
    expected.sort_unstable();
    if given != expected {
        return Err(AppError::BadRequest(message.to_string()));
    }
    Ok(())
}

/// Players who may no longer throw in this leg.
fn eliminated(leg: &Leg) -> BTreeSet<PlayerId> {
    if leg.leg_type == MatchType::Knockout {
        knocked_out(leg)
    } else {
        BTreeSet::new()
    }
}

fn ensure_turn(leg: &Leg, player_id: PlayerId) -> Result<(), AppError> {
    if !leg.has_player(player_id) {
        return Err(AppError::NotFound(format!(
            "Player {} is not in leg {}",
            player_id, leg.id
        )));
    }
    if eliminated(leg).contains(&player_id) {
        return Err(AppError::Conflict(format!(
            "Player {} is knocked out of leg {}",
            player_id, leg.id
        )));
    }
    if leg.current_player_id != player_id {
        return Err(AppError::Conflict(format!(
            "It is player {}'s turn in leg {}",
            leg.current_player_id, leg.id
        )));
    }
    Ok(())
}

/// Who throws after `visit` once it is on the board.
fn following_player(leg: &Leg, visit: &Visit) -> PlayerId {
    let out = if leg.leg_type == MatchType::Knockout {
        let mut after = leg.clone();
        after.visits.push(visit.clone());
        knocked_out(&after)
    } else {
        BTreeSet::new()
    };
    leg.next_player_where(visit.player_id, |p| !out.contains(&p))
        .unwrap_or(visit.player_id)
}

/// First player in throwing order with the highest total.
fn highest_scorer(leg: &Leg) -> PlayerId {
    let mut best: Option<(PlayerId, i32)> = None;
    for player in &leg.players {
        let scored = leg.scored(*player);
        if best.map_or(true, |(_, top)| scored > top) {
            best = Some((*player, scored));
        }
    }
    best.map(|(player, _)| player).unwrap_or_default()
}

/// A corrected countdown history must still end where it did: an open leg
/// has nobody on zero, a finished one has its winner on exactly zero. Nobody
/// may be left on a score the outshot can never finish.
fn ensure_countdown_consistent(leg: &Leg) -> Result<(), AppError> {
    let needs_double = matches!(
        leg.parameters.outshot,
        OutshotType::Double | OutshotType::Master
    );
    for player in &leg.players {
        let remaining = leg.remaining(*player);
        let is_winner = leg.winner_id == Some(*player);
        let consistent = if is_winner {
            remaining == 0
        } else {
            remaining > 1 || (remaining == 1 && !needs_double)
        };
        if !consistent {
            return Err(AppError::Conflict(format!(
                "Correction leaves player {} on {}",
                player, remaining
            )));
        }
    }
    Ok(())
}

pub struct LegServiceBuilder {
    repository: Arc<dyn DartsRepository>,
    statistics: Arc<StatisticsService>,
    elo: Arc<dyn EloRecalculator>,
    badges: Arc<dyn BadgeChecker>,
}

impl LegServiceBuilder {
    fn new(repository: Arc<dyn DartsRepository>, statistics: Arc<StatisticsService>) -> Self {
        Self {
            repository,
            statistics,
            elo: Arc::new(NoOpEloRecalculator),
            badges: Arc::new(NoOpBadgeChecker),
        }
    }

    pub fn with_elo(mut self, elo: Arc<dyn EloRecalculator>) -> Self {
        self.elo = elo;
        self
    }

    pub fn with_badges(mut self, badges: Arc<dyn BadgeChecker>) -> Self {
        self.badges = badges;
        self
    }

    pub fn build(self) -> LegService {
        LegService {
            repository: self.repository,
            statistics: self.statistics,
            elo: self.elo,
            badges: self.badges,
            leg_mutexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leg::LegParameters;
    use crate::matches::{CollaboratorError, MatchMode, MatchType, OweType};
    use crate::repository::InMemoryDartsRepository;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingElo {
        matches: Mutex<Vec<MatchId>>,
        tournaments: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl EloRecalculator for RecordingElo {
        async fn recalculate_for_match(&self, match_id: MatchId) -> Result<(), CollaboratorError> {
            self.matches.lock().unwrap().push(match_id);
            Ok(())
        }

        async fn recalculate_for_tournament(
            &self,
            tournament_id: i64,
        ) -> Result<(), CollaboratorError> {
            self.tournaments.lock().unwrap().push(tournament_id);
            Ok(())
        }
    }

    struct FailingBadges;

    #[async_trait]
    impl BadgeChecker for FailingBadges {
        async fn check_leg(&self, _leg: &Leg) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::new("badges", "unavailable"))
        }
    }

    struct Fixture {
        repository: Arc<InMemoryDartsRepository>,
        elo: Arc<RecordingElo>,
        service: LegService,
    }

    fn fixture() -> Fixture {
        let repository = Arc::new(InMemoryDartsRepository::new());
        let statistics = Arc::new(StatisticsService::new(repository.clone()));
        let elo = Arc::new(RecordingElo::default());
        let service = LegService::builder(repository.clone(), statistics)
            .with_elo(elo.clone())
            .with_badges(Arc::new(FailingBadges))
            .build();
        Fixture {
            repository,
            elo,
            service,
        }
    }

    fn x01_match(starting_score: i32, legs: u32) -> NewMatch {
        NewMatch {
            match_type: MatchType::X01,
            mode: MatchMode::best_of(legs),
            players: vec![1, 2],
            starting_score,
            parameters: LegParameters::default(),
            handicaps: BTreeMap::new(),
            owe_type: Some(OweType {
                id: 3,
                item: "Beer".into(),
            }),
            tournament_id: None,
        }
    }

    fn darts(codes: [&str; 3]) -> Darts {
        Darts::parse(codes).unwrap()
    }

    #[tokio::test]
    async fn visits_rotate_turns_and_bust_against_remaining() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(101, 1)).await.unwrap();

        let first = f.service.add_visit(leg.id, 1, darts(["T20", "S1", "MISS"])).await.unwrap();
        assert_eq!(first.score(), 61);

        let bust = f
            .service
            .add_visit(leg.id, 2, darts(["T20", "T20", "S1"]))
            .await
            .unwrap();
        assert!(bust.is_bust);
        assert_eq!(bust.score(), 0);

        let leg = f.service.get_leg(leg.id).await.unwrap();
        assert_eq!(leg.current_player_id, 1);
        assert_eq!(leg.remaining(1), 40);
        assert_eq!(leg.remaining(2), 101);
    }

    #[tokio::test]
    async fn second_visit_in_a_row_is_refused() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(301, 1)).await.unwrap();
        f.service.add_visit(leg.id, 1, darts(["S20", "S20", "S20"])).await.unwrap();

        let again = f.service.add_visit(leg.id, 1, darts(["S20", "S20", "S20"])).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let leg = f.service.get_leg(leg.id).await.unwrap();
        assert_eq!(leg.visits.len(), 1);
        assert_eq!(leg.current_player_id, 2);
    }

    #[tokio::test]
    async fn finishing_out_of_turn_is_refused() {
        let f = fixture();
        let mut new_match = x01_match(0, 1);
        new_match.match_type = MatchType::AroundTheWorld;
        let (_, leg) = f.service.start_match(new_match).await.unwrap();
        f.service.add_visit(leg.id, 1, darts(["S1", "S1", "S1"])).await.unwrap();

        let early = f.service.finish_leg(leg.id, 1, darts(["S2", "S2", "S2"])).await;
        assert!(matches!(early, Err(AppError::Conflict(_))));

        let finished = f
            .service
            .finish_leg(leg.id, 2, darts(["S1", "MISS", "MISS"]))
            .await
            .unwrap();
        assert_eq!(finished.leg.visits.len(), 2);
        assert_eq!(finished.leg.winner_id, Some(2));
    }

    fn knockout_match(players: Vec<PlayerId>, lives: u32) -> NewMatch {
        let mut new_match = x01_match(0, 1);
        new_match.match_type = MatchType::Knockout;
        new_match.players = players;
        new_match.parameters.starting_lives = Some(lives);
        new_match
    }

    #[tokio::test]
    async fn knocked_out_players_lose_their_turn() {
        let f = fixture();
        let (_, leg) = f
            .service
            .start_match(knockout_match(vec![1, 2, 3], 1))
            .await
            .unwrap();

        f.service.add_visit(leg.id, 1, darts(["S20", "MISS", "MISS"])).await.unwrap();
        f.service.add_visit(leg.id, 2, darts(["S1", "MISS", "MISS"])).await.unwrap();
        f.service.add_visit(leg.id, 3, darts(["S20", "MISS", "MISS"])).await.unwrap();
        assert_eq!(f.service.get_leg(leg.id).await.unwrap().current_player_id, 1);

        f.service.add_visit(leg.id, 1, darts(["S5", "MISS", "MISS"])).await.unwrap();
        assert_eq!(f.service.get_leg(leg.id).await.unwrap().current_player_id, 3);

        let knocked_out = f.service.add_visit(leg.id, 2, darts(["S5", "MISS", "MISS"])).await;
        assert!(matches!(knocked_out, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn last_player_standing_finishes_a_knockout_leg() {
        let f = fixture();
        let (_, leg) = f
            .service
            .start_match(knockout_match(vec![1, 2], 1))
            .await
            .unwrap();
        f.service.add_visit(leg.id, 1, darts(["S1", "MISS", "MISS"])).await.unwrap();
        f.service.add_visit(leg.id, 2, darts(["T20", "MISS", "MISS"])).await.unwrap();
        assert_eq!(f.service.get_leg(leg.id).await.unwrap().current_player_id, 2);

        let knocked_out = f.service.add_visit(leg.id, 1, darts(["S5", "MISS", "MISS"])).await;
        assert!(matches!(knocked_out, Err(AppError::Conflict(_))));

        let finished = f
            .service
            .finish_leg(leg.id, 2, darts(["S20", "MISS", "MISS"]))
            .await
            .unwrap();
        assert_eq!(finished.leg.winner_id, Some(2));
        assert_eq!(f.repository.statistics_for_leg(leg.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn checkout_must_go_through_finish() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(40, 1)).await.unwrap();

        let result = f.service.add_visit(leg.id, 1, darts(["D20", "MISS", "MISS"])).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let not_out = f.service.finish_leg(leg.id, 1, darts(["S20", "MISS", "MISS"])).await;
        assert!(matches!(not_out, Err(AppError::Conflict(_))));
        assert!(f.service.get_leg(leg.id).await.unwrap().visits.is_empty());
    }

    #[tokio::test]
    async fn invalid_darts_are_rejected_before_anything_changes() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(301, 1)).await.unwrap();

        let bad = Darts::new(
            crate::darts::Dart {
                value: Some(21),
                multiplier: 1,
            },
            crate::darts::Dart::miss(),
            crate::darts::Dart::miss(),
        );
        let result = f.service.add_visit(leg.id, 1, bad).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let stranger = f.service.add_visit(leg.id, 9, darts(["S1", "S1", "S1"])).await;
        assert!(matches!(stranger, Err(AppError::NotFound(_))));
        assert!(f.service.get_leg(leg.id).await.unwrap().visits.is_empty());
    }

    #[tokio::test]
    async fn finishing_a_leg_starts_the_next_one_rotated() {
        let f = fixture();
        let (game, leg) = f.service.start_match(x01_match(40, 3)).await.unwrap();

        let finished = f
            .service
            .finish_leg(leg.id, 1, darts(["D20", "T20", "T20"]))
            .await
            .unwrap();

        assert_eq!(finished.outcome, MatchOutcome::InProgress);
        assert_eq!(finished.leg.winner_id, Some(1));
        let last = finished.leg.visits.last().unwrap();
        assert_eq!(last.darts_thrown(), 1);
        let next = finished.next_leg.unwrap();
        assert_eq!(next.players, vec![2, 1]);
        assert_eq!(next.current_player_id, 2);

        let game = f.service.get_match(game.id).await.unwrap();
        assert_eq!(game.current_leg_id, Some(next.id));
        assert_eq!(f.repository.statistics_for_leg(leg.id).await.unwrap().len(), 2);
        assert!(f.elo.matches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn winning_the_match_settles_owes_and_elo_once() {
        let f = fixture();
        let (game, leg) = f.service.start_match(x01_match(40, 1)).await.unwrap();
        f.service.add_visit(leg.id, 1, darts(["S1", "MISS", "MISS"])).await.unwrap();

        let finished = f
            .service
            .finish_leg(leg.id, 2, darts(["D20", "MISS", "MISS"]))
            .await
            .unwrap();

        assert_eq!(finished.outcome, MatchOutcome::Won(2));
        assert!(finished.next_leg.is_none());
        assert_eq!(f.service.owed(1, 2, 3).await.unwrap(), 1);
        assert_eq!(*f.elo.matches.lock().unwrap(), vec![game.id]);

        let again = f.service.finish_leg(leg.id, 2, darts(["D20", "MISS", "MISS"])).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn tournament_matches_recalculate_the_tournament() {
        let f = fixture();
        let mut new_match = x01_match(40, 1);
        new_match.tournament_id = Some(12);
        let (_, leg) = f.service.start_match(new_match).await.unwrap();

        f.service
            .finish_leg(leg.id, 1, darts(["D20", "MISS", "MISS"]))
            .await
            .unwrap();

        assert_eq!(*f.elo.tournaments.lock().unwrap(), vec![12]);
        assert!(f.elo.matches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undo_restores_the_pre_finish_leg() {
        let f = fixture();
        let (game, leg) = f.service.start_match(x01_match(100, 1)).await.unwrap();
        f.service.add_visit(leg.id, 1, darts(["T20", "MISS", "MISS"])).await.unwrap();
        f.service.add_visit(leg.id, 2, darts(["S1", "S1", "S1"])).await.unwrap();
        let before = f.service.get_leg(leg.id).await.unwrap();

        f.service
            .finish_leg(leg.id, 1, darts(["D20", "MISS", "MISS"]))
            .await
            .unwrap();
        let reopened = f.service.undo_leg_finish(leg.id).await.unwrap();

        assert_eq!(reopened.visits, before.visits);
        assert!(!reopened.is_finished);
        assert_eq!(reopened.winner_id, None);
        assert_eq!(reopened.current_player_id, 1);
        assert!(f.repository.statistics_for_leg(leg.id).await.unwrap().is_empty());
        assert_eq!(f.service.owed(2, 1, 3).await.unwrap(), 0);
        assert!(!f.service.get_match(game.id).await.unwrap().is_finished);

        let twice = f.service.undo_leg_finish(leg.id).await;
        assert!(matches!(twice, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn undo_is_refused_once_the_next_leg_is_in_play() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(40, 3)).await.unwrap();
        let finished = f
            .service
            .finish_leg(leg.id, 1, darts(["D20", "MISS", "MISS"]))
            .await
            .unwrap();
        let next = finished.next_leg.unwrap();
        f.service.add_visit(next.id, 2, darts(["S1", "MISS", "MISS"])).await.unwrap();

        let result = f.service.undo_leg_finish(leg.id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn shootout_goes_to_the_highest_total() {
        let f = fixture();
        let mut new_match = x01_match(0, 1);
        new_match.match_type = MatchType::Shootout;
        let (_, leg) = f.service.start_match(new_match).await.unwrap();

        f.service.add_visit(leg.id, 1, darts(["S20", "S20", "S20"])).await.unwrap();
        let finished = f
            .service
            .finish_leg(leg.id, 2, darts(["S1", "S1", "S1"]))
            .await
            .unwrap();

        assert_eq!(finished.leg.winner_id, Some(1));
        assert_eq!(finished.outcome, MatchOutcome::Won(1));
    }

    #[tokio::test]
    async fn modify_visit_rescores_against_the_earlier_ledger() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(100, 1)).await.unwrap();
        let visit = f.service.add_visit(leg.id, 1, darts(["S20", "S20", "S20"])).await.unwrap();
        f.service.add_visit(leg.id, 2, darts(["S1", "S1", "S1"])).await.unwrap();

        let corrected = f
            .service
            .modify_visit(leg.id, visit.id, darts(["T20", "S20", "MISS"]))
            .await
            .unwrap();
        assert_eq!(corrected.score(), 80);
        assert_eq!(f.service.get_leg(leg.id).await.unwrap().remaining(1), 20);

        let zeroed = f
            .service
            .modify_visit(leg.id, visit.id, darts(["T20", "D20", "MISS"]))
            .await;
        assert!(matches!(zeroed, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn modify_visit_rescores_every_later_visit() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(100, 1)).await.unwrap();
        let first = f.service.add_visit(leg.id, 1, darts(["S20", "S20", "S20"])).await.unwrap();
        f.service.add_visit(leg.id, 2, darts(["S1", "S1", "S1"])).await.unwrap();
        let later = f
            .service
            .add_visit(leg.id, 1, darts(["S20", "S10", "MISS"]))
            .await
            .unwrap();
        assert!(!later.is_bust);
        assert_eq!(f.service.get_leg(leg.id).await.unwrap().remaining(1), 10);

        f.service
            .modify_visit(leg.id, first.id, darts(["T20", "S20", "MISS"]))
            .await
            .unwrap();

        let leg = f.service.get_leg(leg.id).await.unwrap();
        assert!(leg.visits[2].is_bust);
        assert_eq!(leg.visits[2].score(), 0);
        assert_eq!(leg.remaining(1), 20);
    }

    #[test]
    fn a_score_of_one_cannot_be_left_under_double_out() {
        let mut leg = crate::leg::NewLeg {
            match_id: 1,
            leg_type: MatchType::X01,
            starting_score: 41,
            parameters: LegParameters::default(),
            players: vec![1],
            handicaps: BTreeMap::new(),
        }
        .into_leg(1, Utc::now());
        leg.visits.push(Visit::new(1, 1, darts(["S20", "S20", "MISS"])));
        assert!(matches!(
            ensure_countdown_consistent(&leg),
            Err(AppError::Conflict(_))
        ));

        leg.parameters.outshot = OutshotType::Any;
        assert!(ensure_countdown_consistent(&leg).is_ok());
    }

    #[tokio::test]
    async fn undo_last_visit_hands_the_turn_back() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(301, 1)).await.unwrap();
        f.service.add_visit(leg.id, 1, darts(["S20", "S20", "S20"])).await.unwrap();

        let leg = f.service.undo_last_visit(leg.id).await.unwrap();
        assert!(leg.visits.is_empty());
        assert_eq!(leg.current_player_id, 1);

        let empty = f.service.undo_last_visit(leg.id).await;
        assert!(matches!(empty, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn player_order_must_be_a_permutation() {
        let f = fixture();
        let (_, leg) = f.service.start_match(x01_match(301, 1)).await.unwrap();

        let wrong = f.service.change_player_order(leg.id, vec![2, 3]).await;
        assert!(matches!(wrong, Err(AppError::BadRequest(_))));

        let leg = f.service.change_player_order(leg.id, vec![2, 1]).await.unwrap();
        assert_eq!(leg.players, vec![2, 1]);
        assert_eq!(leg.current_player_id, 2);
    }

    #[tokio::test]
    async fn deleting_the_first_leg_removes_the_match() {
        let f = fixture();
        let (game, leg) = f.service.start_match(x01_match(301, 1)).await.unwrap();

        f.service.delete_leg(leg.id).await.unwrap();

        assert!(matches!(
            f.service.get_match(game.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(f.repository.match_count(), 0);
    }

    #[tokio::test]
    async fn deleting_the_current_leg_points_back_to_the_last_finished_one() {
        let f = fixture();
        let (game, leg) = f.service.start_match(x01_match(40, 3)).await.unwrap();
        let next = f
            .service
            .finish_leg(leg.id, 1, darts(["D20", "MISS", "MISS"]))
            .await
            .unwrap()
            .next_leg
            .unwrap();

        f.service.delete_leg(next.id).await.unwrap();

        let game = f.service.get_match(game.id).await.unwrap();
        assert_eq!(game.legs, vec![leg.id]);
        assert_eq!(game.current_leg_id, Some(leg.id));
    }

    #[tokio::test]
    async fn new_leg_follows_a_finished_leg_only() {
        let f = fixture();
        let mut new_match = x01_match(40, 3);
        new_match.match_type = MatchType::X01Handicap;
        new_match.handicaps = BTreeMap::from([(2, 20)]);
        let (game, leg) = f.service.start_match(new_match).await.unwrap();

        let early = f.service.new_leg(game.id, 40, vec![1, 2]).await;
        assert!(matches!(early, Err(AppError::Conflict(_))));
        let strangers = f.service.new_leg(game.id, 40, vec![7, 8]).await;
        assert!(matches!(strangers, Err(AppError::BadRequest(_))));

        let finished = f
            .service
            .finish_leg(leg.id, 1, darts(["D20", "MISS", "MISS"]))
            .await
            .unwrap();
        assert_eq!(finished.next_leg.unwrap().handicap(2), 20);
    }

    #[tokio::test]
    async fn start_match_validates_players_and_mode() {
        let f = fixture();

        let mut empty = x01_match(301, 1);
        empty.players.clear();
        assert!(matches!(
            f.service.start_match(empty).await,
            Err(AppError::BadRequest(_))
        ));

        let mut repeated = x01_match(301, 1);
        repeated.players = vec![1, 1];
        assert!(matches!(
            f.service.start_match(repeated).await,
            Err(AppError::BadRequest(_))
        ));

        let mut no_wins = x01_match(301, 1);
        no_wins.mode.wins_required = 0;
        assert!(matches!(
            f.service.start_match(no_wins).await,
            Err(AppError::BadRequest(_))
        ));

        assert!(matches!(
            f.service.start_match(knockout_match(vec![1, 2], 0)).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn payback_requires_a_positive_amount() {
        let f = fixture();
        assert!(matches!(
            f.service.payback(1, 2, 3, 0).await,
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(f.service.payback(1, 2, 3, 2).await.unwrap(), 0);
    }
}
