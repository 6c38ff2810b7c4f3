use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::{DartsRepository, LegDeletion, LegFinish, LegFinishCommit, LegQuery, LegReopen};
use crate::darts::Visit;
use crate::leg::{Leg, NewLeg};
use crate::matches::{Match, NewMatch, OweEntry};
use crate::shared::{AppError, LegId, MatchId, PlayerId, VisitId};
use crate::stats::StatisticsRow;

type StatisticsKey = (LegId, String, PlayerId);
type OweKey = (PlayerId, PlayerId, i64);

#[derive(Default)]
struct Store {
    last_match_id: MatchId,
    last_leg_id: LegId,
    last_visit_id: VisitId,
    matches: BTreeMap<MatchId, Match>,
    legs: BTreeMap<LegId, Leg>,
    statistics: BTreeMap<StatisticsKey, StatisticsRow>,
    owes: BTreeMap<OweKey, i64>,
}

impl Store {
    fn leg(&self, leg_id: LegId) -> Result<&Leg, AppError> {
        self.legs.get(&leg_id).ok_or_else(|| {
            warn!(leg_id, "Leg not found in memory");
            AppError::NotFound(format!("Leg {} not found", leg_id))
        })
    }

    fn leg_mut(&mut self, leg_id: LegId) -> Result<&mut Leg, AppError> {
        self.legs
            .get_mut(&leg_id)
            .ok_or_else(|| AppError::NotFound(format!("Leg {} not found", leg_id)))
    }

    fn match_mut(&mut self, match_id: MatchId) -> Result<&mut Match, AppError> {
        self.matches
            .get_mut(&match_id)
            .ok_or_else(|| AppError::NotFound(format!("Match {} not found", match_id)))
    }

    fn require_match(&self, match_id: MatchId) -> Result<(), AppError> {
        if self.matches.contains_key(&match_id) {
            Ok(())
        } else {
            warn!(match_id, "Match not found in memory");
            Err(AppError::NotFound(format!("Match {} not found", match_id)))
        }
    }

    fn next_visit_id(&mut self) -> VisitId {
        self.last_visit_id += 1;
        self.last_visit_id
    }

    fn insert_leg(&mut self, new_leg: &NewLeg, match_id: MatchId) -> Leg {
        self.last_leg_id += 1;
        let mut new_leg = new_leg.clone();
        new_leg.match_id = match_id;
        let leg = new_leg.into_leg(self.last_leg_id, Utc::now());
        self.legs.insert(leg.id, leg.clone());
        leg
    }

    fn clear_statistics(&mut self, leg_id: LegId) {
        self.statistics.retain(|(leg, _, _), _| *leg != leg_id);
    }

    fn add_owe(&mut self, entry: &OweEntry, delta: i64) {
        let owed = self
            .owes
            .entry((entry.ower, entry.owee, entry.owe_type_id))
            .or_default();
        *owed = (*owed + delta).max(0);
    }
}

/// In-memory implementation of DartsRepository for development and testing
///
/// Data is lost when the application restarts. Every changeset checks its
/// preconditions before touching the store, so a failed call leaves nothing
/// half-written.
pub struct InMemoryDartsRepository {
    store: Mutex<Store>,
}

impl Default for InMemoryDartsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDartsRepository {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
        }
    }

    pub fn match_count(&self) -> usize {
        self.store.lock().unwrap().matches.len()
    }

    pub fn leg_count(&self) -> usize {
        self.store.lock().unwrap().legs.len()
    }
}

#[async_trait]
impl DartsRepository for InMemoryDartsRepository {
    #[instrument(skip(self, new_match, first_leg))]
    async fn create_match(
        &self,
        new_match: &NewMatch,
        first_leg: &NewLeg,
    ) -> Result<(Match, Leg), AppError> {
        let mut store = self.store.lock().unwrap();
        store.last_match_id += 1;
        let match_id = store.last_match_id;
        let leg = store.insert_leg(first_leg, match_id);

        let game = Match {
            id: match_id,
            match_type: new_match.match_type,
            mode: new_match.mode,
            players: new_match.players.clone(),
            legs: vec![leg.id],
            current_leg_id: Some(leg.id),
            winner_id: None,
            is_finished: false,
            owe_type: new_match.owe_type.clone(),
            tournament_id: new_match.tournament_id,
            created_at: Utc::now(),
        };
        store.matches.insert(match_id, game.clone());

        debug!(match_id, leg_id = leg.id, "Created match in memory");
        Ok((game, leg))
    }

    async fn get_match(&self, match_id: MatchId) -> Result<Option<Match>, AppError> {
        Ok(self.store.lock().unwrap().matches.get(&match_id).cloned())
    }

    async fn get_leg(&self, leg_id: LegId) -> Result<Option<Leg>, AppError> {
        Ok(self.store.lock().unwrap().legs.get(&leg_id).cloned())
    }

    async fn legs_for_match(&self, match_id: MatchId) -> Result<Vec<Leg>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .legs
            .values()
            .filter(|leg| leg.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn legs_of_type(&self, query: &LegQuery) -> Result<Vec<Leg>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .legs
            .values()
            .filter(|leg| query.matches(leg))
            .cloned()
            .collect())
    }

    #[instrument(skip(self, new_leg), fields(match_id = new_leg.match_id))]
    async fn start_leg(&self, new_leg: &NewLeg) -> Result<Leg, AppError> {
        let mut store = self.store.lock().unwrap();
        store.require_match(new_leg.match_id)?;

        let leg = store.insert_leg(new_leg, new_leg.match_id);
        let game = store.match_mut(new_leg.match_id)?;
        game.legs.push(leg.id);
        game.current_leg_id = Some(leg.id);

        debug!(leg_id = leg.id, "Started leg in memory");
        Ok(leg)
    }

    #[instrument(skip(self, visit), fields(leg_id = visit.leg_id, player_id = visit.player_id))]
    async fn insert_visit(
        &self,
        visit: &Visit,
        next_player_id: PlayerId,
    ) -> Result<Visit, AppError> {
        let mut store = self.store.lock().unwrap();
        ensure_turn(store.leg(visit.leg_id)?, visit)?;

        let mut stored = visit.clone();
        stored.id = store.next_visit_id();
        let leg = store.leg_mut(visit.leg_id)?;
        leg.visits.push(stored.clone());
        leg.current_player_id = next_player_id;

        debug!(visit_id = stored.id, "Inserted visit in memory");
        Ok(stored)
    }

    #[instrument(skip(self, visits, statistics), fields(visits = visits.len()))]
    async fn replace_visits(
        &self,
        leg_id: LegId,
        visits: &[Visit],
        statistics: &[StatisticsRow],
    ) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        let stored = &store.leg(leg_id)?.visits;
        let positions = visits
            .iter()
            .map(|visit| {
                stored
                    .iter()
                    .position(|v| v.id == visit.id)
                    .ok_or_else(|| AppError::NotFound(format!("Visit {} not found", visit.id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let leg = store.leg_mut(leg_id)?;
        for (position, visit) in positions.into_iter().zip(visits) {
            leg.visits[position] = visit.clone();
        }
        if !statistics.is_empty() {
            store.clear_statistics(leg_id);
            for row in statistics {
                store
                    .statistics
                    .insert((row.leg_id, row.table.clone(), row.player_id), row.clone());
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_last_visit(
        &self,
        leg_id: LegId,
        visit_id: VisitId,
        current_player_id: PlayerId,
    ) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        let leg = store.leg_mut(leg_id)?;
        if leg.visits.last().map(|v| v.id) != Some(visit_id) {
            return Err(AppError::Conflict(format!(
                "Visit {} is not the last visit of leg {}",
                visit_id, leg_id
            )));
        }
        leg.visits.pop();
        leg.current_player_id = current_player_id;
        Ok(())
    }

    #[instrument(skip(self, finish), fields(leg_id = finish.leg_id))]
    async fn commit_leg_finish(&self, finish: &LegFinish) -> Result<LegFinishCommit, AppError> {
        let mut store = self.store.lock().unwrap();
        ensure_turn(store.leg(finish.leg_id)?, &finish.visit)?;
        store.require_match(finish.match_id)?;

        let mut visit = finish.visit.clone();
        visit.id = store.next_visit_id();
        let leg = store.leg_mut(finish.leg_id)?;
        leg.visits.push(visit.clone());
        leg.current_player_id = finish.next_player_id;
        leg.winner_id = Some(finish.winner_id);
        leg.is_finished = true;
        leg.finished_at = Some(finish.finished_at);

        store.clear_statistics(finish.leg_id);
        for row in &finish.statistics {
            store
                .statistics
                .insert((row.leg_id, row.table.clone(), row.player_id), row.clone());
        }

        if finish.outcome.is_finished() {
            let game = store.match_mut(finish.match_id)?;
            game.is_finished = true;
            game.winner_id = finish.outcome.winner();
            for entry in &finish.owes {
                store.add_owe(entry, 1);
            }
        }

        let next_leg = finish.next_leg.as_ref().map(|new_leg| {
            let leg = store.insert_leg(new_leg, finish.match_id);
            if let Some(game) = store.matches.get_mut(&finish.match_id) {
                game.legs.push(leg.id);
                game.current_leg_id = Some(leg.id);
            }
            leg
        });

        debug!(
            visit_id = visit.id,
            next_leg_id = next_leg.as_ref().map(|l| l.id),
            "Committed leg finish in memory"
        );
        Ok(LegFinishCommit { visit, next_leg })
    }

    #[instrument(skip(self, reopen), fields(leg_id = reopen.leg_id))]
    async fn commit_leg_reopen(&self, reopen: &LegReopen) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        let leg = store.leg(reopen.leg_id)?;
        if !leg.is_finished || leg.visits.last().map(|v| v.id) != Some(reopen.visit_id) {
            return Err(AppError::Conflict(format!(
                "Leg {} cannot be reopened",
                reopen.leg_id
            )));
        }
        store.require_match(reopen.match_id)?;
        if let Some(discard) = reopen.discard_leg {
            if !store.leg(discard)?.visits.is_empty() {
                return Err(AppError::Conflict(format!(
                    "Leg {} already has visits",
                    discard
                )));
            }
        }

        let leg = store.leg_mut(reopen.leg_id)?;
        leg.visits.pop();
        leg.is_finished = false;
        leg.winner_id = None;
        leg.finished_at = None;
        leg.current_player_id = reopen.current_player_id;
        store.clear_statistics(reopen.leg_id);

        if reopen.reopen_match {
            let game = store.match_mut(reopen.match_id)?;
            game.is_finished = false;
            game.winner_id = None;
        }
        for entry in &reopen.owes {
            store.add_owe(entry, -1);
        }

        if let Some(discard) = reopen.discard_leg {
            store.legs.remove(&discard);
            let game = store.match_mut(reopen.match_id)?;
            game.legs.retain(|id| *id != discard);
        }
        store.match_mut(reopen.match_id)?.current_leg_id = Some(reopen.leg_id);

        debug!("Reopened leg in memory");
        Ok(())
    }

    #[instrument(skip(self, deletion), fields(leg_id = deletion.leg_id))]
    async fn delete_leg(&self, deletion: &LegDeletion) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        store.leg(deletion.leg_id)?;
        store.require_match(deletion.match_id)?;

        store.legs.remove(&deletion.leg_id);
        store.clear_statistics(deletion.leg_id);
        match deletion.current_leg_id {
            Some(current) => {
                let game = store.match_mut(deletion.match_id)?;
                game.legs.retain(|id| *id != deletion.leg_id);
                game.current_leg_id = Some(current);
            }
            None => {
                store.matches.remove(&deletion.match_id);
                let orphans: Vec<LegId> = store
                    .legs
                    .values()
                    .filter(|leg| leg.match_id == deletion.match_id)
                    .map(|leg| leg.id)
                    .collect();
                for leg_id in orphans {
                    store.legs.remove(&leg_id);
                    store.clear_statistics(leg_id);
                }
                debug!(match_id = deletion.match_id, "Deleted match with its last leg");
            }
        }
        Ok(())
    }

    async fn update_player_order(
        &self,
        leg_id: LegId,
        players: &[PlayerId],
        current_player_id: PlayerId,
    ) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        let leg = store.leg_mut(leg_id)?;
        leg.players = players.to_vec();
        leg.current_player_id = current_player_id;
        Ok(())
    }

    async fn statistics_for_leg(&self, leg_id: LegId) -> Result<Vec<StatisticsRow>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .statistics
            .iter()
            .filter(|((leg, _, _), _)| *leg == leg_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn apply_statistics(&self, rows: &[StatisticsRow]) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        for row in rows {
            store.leg(row.leg_id)?;
        }

        for row in rows {
            let (leg_id, table) = (row.leg_id, row.table.as_str());
            store
                .statistics
                .retain(|(leg, t, _), _| !(*leg == leg_id && t == table));
        }
        for row in rows {
            store
                .statistics
                .insert((row.leg_id, row.table.clone(), row.player_id), row.clone());
        }
        Ok(())
    }

    async fn owed(
        &self,
        ower: PlayerId,
        owee: PlayerId,
        owe_type_id: i64,
    ) -> Result<i64, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .owes
            .get(&(ower, owee, owe_type_id))
            .copied()
            .unwrap_or_default())
    }

    async fn payback(
        &self,
        ower: PlayerId,
        owee: PlayerId,
        owe_type_id: i64,
        amount: i64,
    ) -> Result<i64, AppError> {
        let mut store = self.store.lock().unwrap();
        let entry = OweEntry {
            ower,
            owee,
            owe_type_id,
        };
        store.add_owe(&entry, -amount);
        Ok(store.owes[&(ower, owee, owe_type_id)])
    }
}

/// A visit may only land on an open leg, from the player whose turn it is.
fn ensure_turn(leg: &Leg, visit: &Visit) -> Result<(), AppError> {
    if leg.is_finished {
        return Err(AppError::Conflict(format!(
            "Leg {} is already finished",
            leg.id
        )));
    }
    if leg.current_player_id != visit.player_id {
        return Err(AppError::Conflict(format!(
            "It is player {}'s turn in leg {}",
            leg.current_player_id, leg.id
        )));
    }
    Ok(())
}
