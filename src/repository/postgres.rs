use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, instrument, warn};

use super::{DartsRepository, LegDeletion, LegFinish, LegFinishCommit, LegQuery, LegReopen};
use crate::darts::{Dart, Visit};
use crate::leg::{Leg, LegParameters, NewLeg};
use crate::matches::{Match, MatchMode, MatchType, NewMatch, OweEntry, OweType};
use crate::shared::{AppError, LegId, MatchId, PlayerId, VisitId};
use crate::stats::StatisticsRow;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const LEG_COLUMNS: &str = "id, match_id, leg_type, starting_score, parameters, players, \
    handicaps, current_player_id, winner_id, is_finished, created_at, finished_at";

const VISIT_COLUMNS: &str = "id, leg_id, player_id, first_value, first_multiplier, \
    second_value, second_multiplier, third_value, third_multiplier, is_bust, created_at";

const MATCH_COLUMNS: &str = "id, match_type, wins_required, legs_required, players, \
    current_leg_id, winner_id, is_finished, owe_type_id, owe_item, tournament_id, created_at";

fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        warn!(error = %e, action, "Database operation failed");
        AppError::DatabaseError(e.to_string())
    }
}

fn corrupt(message: String) -> AppError {
    warn!(%message, "Stored row failed to decode");
    AppError::DatabaseError(message)
}

fn match_type_from_row(row: &PgRow, column: &str) -> Result<MatchType, AppError> {
    let id: i16 = row.get(column);
    MatchType::from_repr(id).ok_or_else(|| corrupt(format!("Unknown match type id {}", id)))
}

fn dart_from_row(row: &PgRow, slot: &str) -> Result<Dart, AppError> {
    let value: Option<i16> = row.get(format!("{slot}_value").as_str());
    let multiplier: i16 = row.get(format!("{slot}_multiplier").as_str());

    let value = value
        .map(u8::try_from)
        .transpose()
        .map_err(|_| corrupt(format!("Dart value out of range in {slot}")))?;
    let multiplier = u8::try_from(multiplier)
        .map_err(|_| corrupt(format!("Dart multiplier out of range in {slot}")))?;
    Dart::new(value, multiplier).map_err(|e| corrupt(e.to_string()))
}

fn visit_from_row(row: &PgRow) -> Result<Visit, AppError> {
    Ok(Visit {
        id: row.get("id"),
        leg_id: row.get("leg_id"),
        player_id: row.get("player_id"),
        first: dart_from_row(row, "first")?,
        second: dart_from_row(row, "second")?,
        third: dart_from_row(row, "third")?,
        is_bust: row.get("is_bust"),
        created_at: row.get("created_at"),
    })
}

fn leg_from_row(row: &PgRow) -> Result<Leg, AppError> {
    let Json(parameters): Json<LegParameters> = row.get("parameters");
    let Json(handicaps): Json<BTreeMap<PlayerId, i32>> = row.get("handicaps");

    Ok(Leg {
        id: row.get("id"),
        match_id: row.get("match_id"),
        leg_type: match_type_from_row(row, "leg_type")?,
        starting_score: row.get("starting_score"),
        parameters,
        players: row.get("players"),
        handicaps,
        current_player_id: row.get("current_player_id"),
        winner_id: row.get("winner_id"),
        is_finished: row.get("is_finished"),
        visits: Vec::new(),
        created_at: row.get("created_at"),
        finished_at: row.get("finished_at"),
    })
}

fn match_from_row(row: &PgRow, legs: Vec<LegId>) -> Result<Match, AppError> {
    let wins_required: i32 = row.get("wins_required");
    let legs_required: Option<i32> = row.get("legs_required");
    let owe_type_id: Option<i64> = row.get("owe_type_id");
    let owe_item: Option<String> = row.get("owe_item");

    Ok(Match {
        id: row.get("id"),
        match_type: match_type_from_row(row, "match_type")?,
        mode: MatchMode {
            wins_required: wins_required.max(0) as u32,
            legs_required: legs_required.map(|l| l.max(0) as u32),
        },
        players: row.get("players"),
        legs,
        current_leg_id: row.get("current_leg_id"),
        winner_id: row.get("winner_id"),
        is_finished: row.get("is_finished"),
        owe_type: owe_type_id
            .zip(owe_item)
            .map(|(id, item)| OweType { id, item }),
        tournament_id: row.get("tournament_id"),
        created_at: row.get("created_at"),
    })
}

async fn insert_leg(
    conn: &mut PgConnection,
    new_leg: &NewLeg,
    match_id: MatchId,
) -> Result<Leg, AppError> {
    let current_player_id = new_leg.players.first().copied().unwrap_or_default();
    let sql = format!(
        "INSERT INTO legs (match_id, leg_type, starting_score, parameters, players, handicaps, \
         current_player_id) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {LEG_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(match_id)
        .bind(new_leg.leg_type.id())
        .bind(new_leg.starting_score)
        .bind(Json(&new_leg.parameters))
        .bind(&new_leg.players)
        .bind(Json(&new_leg.handicaps))
        .bind(current_player_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("insert leg"))?;

    sqlx::query("UPDATE matches SET current_leg_id = $2 WHERE id = $1")
        .bind(match_id)
        .bind(row.get::<LegId, _>("id"))
        .execute(&mut *conn)
        .await
        .map_err(db_error("point match at leg"))?;

    leg_from_row(&row)
}

async fn insert_visit_row(conn: &mut PgConnection, visit: &Visit) -> Result<Visit, AppError> {
    let sql = format!(
        "INSERT INTO visits (leg_id, player_id, first_value, first_multiplier, second_value, \
         second_multiplier, third_value, third_multiplier, is_bust, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {VISIT_COLUMNS}"
    );
    let [first, second, third] = visit.darts();
    let row = sqlx::query(&sql)
        .bind(visit.leg_id)
        .bind(visit.player_id)
        .bind(first.value.map(i16::from))
        .bind(i16::from(first.multiplier))
        .bind(second.value.map(i16::from))
        .bind(i16::from(second.multiplier))
        .bind(third.value.map(i16::from))
        .bind(i16::from(third.multiplier))
        .bind(visit.is_bust)
        .bind(visit.created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("insert visit"))?;

    visit_from_row(&row)
}

async fn replace_statistics(
    conn: &mut PgConnection,
    rows: &[StatisticsRow],
) -> Result<(), AppError> {
    let scopes: BTreeSet<(&str, LegId)> = rows
        .iter()
        .map(|row| (row.table.as_str(), row.leg_id))
        .collect();
    for (table, leg_id) in scopes {
        sqlx::query("DELETE FROM leg_statistics WHERE table_name = $1 AND leg_id = $2")
            .bind(table)
            .bind(leg_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error("clear statistics"))?;
    }

    for row in rows {
        sqlx::query(
            "INSERT INTO leg_statistics (table_name, leg_id, player_id, fields) VALUES ($1, $2, $3, $4)",
        )
        .bind(&row.table)
        .bind(row.leg_id)
        .bind(row.player_id)
        .bind(Json(&row.fields))
        .execute(&mut *conn)
        .await
        .map_err(db_error("insert statistics"))?;
    }
    Ok(())
}

/// Locks the leg row for the rest of the transaction and checks the visit
/// may still be appended: the leg is open and it is the player's turn.
async fn lock_leg_for_visit(conn: &mut PgConnection, visit: &Visit) -> Result<(), AppError> {
    let row = sqlx::query(
        "SELECT current_player_id, is_finished FROM legs WHERE id = $1 FOR UPDATE",
    )
    .bind(visit.leg_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error("lock leg"))?;
    let Some(row) = row else {
        warn!("Leg not found for visit");
        return Err(AppError::NotFound(format!("Leg {} not found", visit.leg_id)));
    };

    let is_finished: bool = row.get("is_finished");
    if is_finished {
        warn!("Leg already finished");
        return Err(AppError::Conflict(format!(
            "Leg {} is already finished",
            visit.leg_id
        )));
    }
    let current_player_id: PlayerId = row.get("current_player_id");
    if current_player_id != visit.player_id {
        warn!(current_player_id, "Visit out of turn");
        return Err(AppError::Conflict(format!(
            "It is player {}'s turn in leg {}",
            current_player_id, visit.leg_id
        )));
    }
    Ok(())
}

async fn clear_leg_statistics(conn: &mut PgConnection, leg_id: LegId) -> Result<(), AppError> {
    sqlx::query("DELETE FROM leg_statistics WHERE leg_id = $1")
        .bind(leg_id)
        .execute(&mut *conn)
        .await
        .map_err(db_error("clear leg statistics"))?;
    Ok(())
}

async fn adjust_owe(
    conn: &mut PgConnection,
    entry: &OweEntry,
    delta: i64,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO owes (ower, owee, owe_type_id, amount) VALUES ($1, $2, $3, GREATEST($4, 0)) \
         ON CONFLICT (ower, owee, owe_type_id) \
         DO UPDATE SET amount = GREATEST(owes.amount + $4, 0)",
    )
    .bind(entry.ower)
    .bind(entry.owee)
    .bind(entry.owe_type_id)
    .bind(delta)
    .execute(&mut *conn)
    .await
    .map_err(db_error("adjust owe"))?;
    Ok(())
}

/// PostgreSQL implementation of DartsRepository
///
/// Each changeset runs in a single transaction.
pub struct PostgresDartsRepository {
    pool: PgPool,
}

impl PostgresDartsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates any missing tables.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), AppError> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error("migrate schema"))?;
        }
        info!("Database schema is up to date");
        Ok(())
    }

    async fn visits_for(&self, leg_ids: &[LegId]) -> Result<HashMap<LegId, Vec<Visit>>, AppError> {
        let sql = format!("SELECT {VISIT_COLUMNS} FROM visits WHERE leg_id = ANY($1) ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(leg_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetch visits"))?;

        let mut visits: HashMap<LegId, Vec<Visit>> = HashMap::new();
        for row in &rows {
            let visit = visit_from_row(row)?;
            visits.entry(visit.leg_id).or_default().push(visit);
        }
        Ok(visits)
    }

    async fn legs_from_rows(&self, rows: &[PgRow]) -> Result<Vec<Leg>, AppError> {
        let mut legs = rows.iter().map(leg_from_row).collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<LegId> = legs.iter().map(|leg| leg.id).collect();
        let mut visits = self.visits_for(&ids).await?;
        for leg in &mut legs {
            leg.visits = visits.remove(&leg.id).unwrap_or_default();
        }
        Ok(legs)
    }
}

#[async_trait]
impl DartsRepository for PostgresDartsRepository {
    #[instrument(skip(self, new_match, first_leg))]
    async fn create_match(
        &self,
        new_match: &NewMatch,
        first_leg: &NewLeg,
    ) -> Result<(Match, Leg), AppError> {
        debug!(match_type = %new_match.match_type, "Creating match in database");
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let (owe_type_id, owe_item) = match &new_match.owe_type {
            Some(owe) => (Some(owe.id), Some(owe.item.clone())),
            None => (None, None),
        };
        let sql = format!(
            "INSERT INTO matches (match_type, wins_required, legs_required, players, owe_type_id, \
             owe_item, tournament_id) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MATCH_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new_match.match_type.id())
            .bind(new_match.mode.wins_required as i32)
            .bind(new_match.mode.legs_required.map(|l| l as i32))
            .bind(&new_match.players)
            .bind(owe_type_id)
            .bind(owe_item)
            .bind(new_match.tournament_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("insert match"))?;

        let match_id: MatchId = row.get("id");
        let leg = insert_leg(&mut tx, first_leg, match_id).await?;
        tx.commit().await.map_err(db_error("commit"))?;

        let mut game = match_from_row(&row, vec![leg.id])?;
        game.current_leg_id = Some(leg.id);
        debug!(match_id, leg_id = leg.id, "Match created successfully in database");
        Ok((game, leg))
    }

    #[instrument(skip(self))]
    async fn get_match(&self, match_id: MatchId) -> Result<Option<Match>, AppError> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch match"))?
        else {
            debug!("Match not found in database");
            return Ok(None);
        };

        let legs: Vec<LegId> = sqlx::query("SELECT id FROM legs WHERE match_id = $1 ORDER BY id")
            .bind(match_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetch match legs"))?
            .iter()
            .map(|r| r.get("id"))
            .collect();

        match_from_row(&row, legs).map(Some)
    }

    #[instrument(skip(self))]
    async fn get_leg(&self, leg_id: LegId) -> Result<Option<Leg>, AppError> {
        let sql = format!("SELECT {LEG_COLUMNS} FROM legs WHERE id = $1");
        let rows = sqlx::query(&sql)
            .bind(leg_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetch leg"))?;

        Ok(self.legs_from_rows(&rows).await?.pop())
    }

    #[instrument(skip(self))]
    async fn legs_for_match(&self, match_id: MatchId) -> Result<Vec<Leg>, AppError> {
        let sql = format!("SELECT {LEG_COLUMNS} FROM legs WHERE match_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(match_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetch match legs"))?;

        self.legs_from_rows(&rows).await
    }

    #[instrument(skip(self))]
    async fn legs_of_type(&self, query: &LegQuery) -> Result<Vec<Leg>, AppError> {
        let sql = format!(
            "SELECT {LEG_COLUMNS} FROM legs WHERE leg_type = $1 AND (NOT $2 OR is_finished) \
             AND ($3::timestamptz IS NULL OR created_at >= $3) ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(query.leg_type.id())
            .bind(query.finished_only)
            .bind(query.since)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetch legs of type"))?;

        debug!(legs = rows.len(), "Fetched legs of type");
        self.legs_from_rows(&rows).await
    }

    #[instrument(skip(self, new_leg), fields(match_id = new_leg.match_id))]
    async fn start_leg(&self, new_leg: &NewLeg) -> Result<Leg, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;
        let exists = sqlx::query("SELECT id FROM matches WHERE id = $1 FOR UPDATE")
            .bind(new_leg.match_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("lock match"))?;
        if exists.is_none() {
            warn!("Match not found for new leg");
            return Err(AppError::NotFound(format!(
                "Match {} not found",
                new_leg.match_id
            )));
        }

        let leg = insert_leg(&mut tx, new_leg, new_leg.match_id).await?;
        tx.commit().await.map_err(db_error("commit"))?;
        debug!(leg_id = leg.id, "Leg started in database");
        Ok(leg)
    }

    #[instrument(skip(self, visit), fields(leg_id = visit.leg_id, player_id = visit.player_id))]
    async fn insert_visit(
        &self,
        visit: &Visit,
        next_player_id: PlayerId,
    ) -> Result<Visit, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;
        lock_leg_for_visit(&mut tx, visit).await?;
        sqlx::query("UPDATE legs SET current_player_id = $2 WHERE id = $1")
            .bind(visit.leg_id)
            .bind(next_player_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("advance current player"))?;

        let stored = insert_visit_row(&mut tx, visit).await?;
        tx.commit().await.map_err(db_error("commit"))?;
        debug!(visit_id = stored.id, "Visit stored in database");
        Ok(stored)
    }

    #[instrument(skip(self, visits, statistics), fields(visits = visits.len()))]
    async fn replace_visits(
        &self,
        leg_id: LegId,
        visits: &[Visit],
        statistics: &[StatisticsRow],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;
        for visit in visits {
            let [first, second, third] = visit.darts();
            let result = sqlx::query(
                "UPDATE visits SET first_value = $3, first_multiplier = $4, second_value = $5, \
                 second_multiplier = $6, third_value = $7, third_multiplier = $8, is_bust = $9 \
                 WHERE id = $1 AND leg_id = $2",
            )
            .bind(visit.id)
            .bind(leg_id)
            .bind(first.value.map(i16::from))
            .bind(i16::from(first.multiplier))
            .bind(second.value.map(i16::from))
            .bind(i16::from(second.multiplier))
            .bind(third.value.map(i16::from))
            .bind(i16::from(third.multiplier))
            .bind(visit.is_bust)
            .execute(&mut *tx)
            .await
            .map_err(db_error("update visit"))?;

            if result.rows_affected() == 0 {
                warn!(visit_id = visit.id, "Visit not found for update");
                return Err(AppError::NotFound(format!("Visit {} not found", visit.id)));
            }
        }

        if !statistics.is_empty() {
            clear_leg_statistics(&mut tx, leg_id).await?;
            replace_statistics(&mut tx, statistics).await?;
        }
        tx.commit().await.map_err(db_error("commit"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_last_visit(
        &self,
        leg_id: LegId,
        visit_id: VisitId,
        current_player_id: PlayerId,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;
        let result = sqlx::query(
            "DELETE FROM visits WHERE id = $2 AND leg_id = $1 \
             AND id = (SELECT MAX(id) FROM visits WHERE leg_id = $1)",
        )
        .bind(leg_id)
        .bind(visit_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("delete visit"))?;

        if result.rows_affected() == 0 {
            warn!("Visit is not the last of its leg");
            return Err(AppError::Conflict(format!(
                "Visit {} is not the last visit of leg {}",
                visit_id, leg_id
            )));
        }

        sqlx::query("UPDATE legs SET current_player_id = $2 WHERE id = $1")
            .bind(leg_id)
            .bind(current_player_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("rewind current player"))?;
        tx.commit().await.map_err(db_error("commit"))?;
        Ok(())
    }

    #[instrument(skip(self, finish), fields(leg_id = finish.leg_id))]
    async fn commit_leg_finish(&self, finish: &LegFinish) -> Result<LegFinishCommit, AppError> {
        debug!("Committing leg finish");
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;
        lock_leg_for_visit(&mut tx, &finish.visit).await?;

        let result = sqlx::query(
            "UPDATE legs SET is_finished = TRUE, winner_id = $2, finished_at = $3, \
             current_player_id = $4 WHERE id = $1 AND NOT is_finished",
        )
        .bind(finish.leg_id)
        .bind(finish.winner_id)
        .bind(finish.finished_at)
        .bind(finish.next_player_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("finish leg"))?;
        if result.rows_affected() == 0 {
            warn!("Leg missing or already finished");
            return Err(AppError::Conflict(format!(
                "Leg {} is already finished",
                finish.leg_id
            )));
        }

        let visit = insert_visit_row(&mut tx, &finish.visit).await?;
        clear_leg_statistics(&mut tx, finish.leg_id).await?;
        replace_statistics(&mut tx, &finish.statistics).await?;

        if finish.outcome.is_finished() {
            sqlx::query("UPDATE matches SET is_finished = TRUE, winner_id = $2 WHERE id = $1")
                .bind(finish.match_id)
                .bind(finish.outcome.winner())
                .execute(&mut *tx)
                .await
                .map_err(db_error("finish match"))?;
            for entry in &finish.owes {
                adjust_owe(&mut tx, entry, 1).await?;
            }
        }

        let next_leg = match &finish.next_leg {
            Some(new_leg) => Some(insert_leg(&mut tx, new_leg, finish.match_id).await?),
            None => None,
        };

        tx.commit().await.map_err(db_error("commit"))?;
        debug!(visit_id = visit.id, "Leg finish committed");
        Ok(LegFinishCommit { visit, next_leg })
    }

    #[instrument(skip(self, reopen), fields(leg_id = reopen.leg_id))]
    async fn commit_leg_reopen(&self, reopen: &LegReopen) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let result = sqlx::query(
            "DELETE FROM visits WHERE id = $2 AND leg_id = $1 \
             AND id = (SELECT MAX(id) FROM visits WHERE leg_id = $1)",
        )
        .bind(reopen.leg_id)
        .bind(reopen.visit_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("delete finishing visit"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Leg {} cannot be reopened",
                reopen.leg_id
            )));
        }

        let result = sqlx::query(
            "UPDATE legs SET is_finished = FALSE, winner_id = NULL, finished_at = NULL, \
             current_player_id = $2 WHERE id = $1 AND is_finished",
        )
        .bind(reopen.leg_id)
        .bind(reopen.current_player_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("reopen leg"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Leg {} is not finished",
                reopen.leg_id
            )));
        }
        clear_leg_statistics(&mut tx, reopen.leg_id).await?;

        if reopen.reopen_match {
            sqlx::query("UPDATE matches SET is_finished = FALSE, winner_id = NULL WHERE id = $1")
                .bind(reopen.match_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("reopen match"))?;
        }
        for entry in &reopen.owes {
            adjust_owe(&mut tx, entry, -1).await?;
        }

        if let Some(discard) = reopen.discard_leg {
            let result = sqlx::query(
                "DELETE FROM legs WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM visits WHERE leg_id = $1)",
            )
            .bind(discard)
            .execute(&mut *tx)
            .await
            .map_err(db_error("discard next leg"))?;
            if result.rows_affected() == 0 {
                return Err(AppError::Conflict(format!(
                    "Leg {} already has visits",
                    discard
                )));
            }
        }

        sqlx::query("UPDATE matches SET current_leg_id = $2 WHERE id = $1")
            .bind(reopen.match_id)
            .bind(reopen.leg_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("point match at leg"))?;

        tx.commit().await.map_err(db_error("commit"))?;
        debug!("Leg reopened in database");
        Ok(())
    }

    #[instrument(skip(self, deletion), fields(leg_id = deletion.leg_id))]
    async fn delete_leg(&self, deletion: &LegDeletion) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let result = sqlx::query("DELETE FROM legs WHERE id = $1 AND match_id = $2")
            .bind(deletion.leg_id)
            .bind(deletion.match_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete leg"))?;
        if result.rows_affected() == 0 {
            warn!("Leg not found for deletion");
            return Err(AppError::NotFound(format!(
                "Leg {} not found",
                deletion.leg_id
            )));
        }

        match deletion.current_leg_id {
            Some(current) => {
                sqlx::query("UPDATE matches SET current_leg_id = $2 WHERE id = $1")
                    .bind(deletion.match_id)
                    .bind(current)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("point match at leg"))?;
            }
            None => {
                sqlx::query("DELETE FROM matches WHERE id = $1")
                    .bind(deletion.match_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("delete match"))?;
            }
        }

        tx.commit().await.map_err(db_error("commit"))?;
        debug!("Leg deleted from database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_player_order(
        &self,
        leg_id: LegId,
        players: &[PlayerId],
        current_player_id: PlayerId,
    ) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE legs SET players = $2, current_player_id = $3 WHERE id = $1")
                .bind(leg_id)
                .bind(players)
                .bind(current_player_id)
                .execute(&self.pool)
                .await
                .map_err(db_error("update player order"))?;

        if result.rows_affected() == 0 {
            warn!("Leg not found for player order update");
            return Err(AppError::NotFound(format!("Leg {} not found", leg_id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn statistics_for_leg(&self, leg_id: LegId) -> Result<Vec<StatisticsRow>, AppError> {
        let rows = sqlx::query(
            "SELECT table_name, leg_id, player_id, fields FROM leg_statistics \
             WHERE leg_id = $1 ORDER BY table_name, player_id",
        )
        .bind(leg_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch statistics"))?;

        Ok(rows
            .iter()
            .map(|row| {
                let Json(fields): Json<BTreeMap<String, serde_json::Value>> = row.get("fields");
                StatisticsRow {
                    table: row.get("table_name"),
                    leg_id: row.get("leg_id"),
                    player_id: row.get("player_id"),
                    fields,
                }
            })
            .collect())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn apply_statistics(&self, rows: &[StatisticsRow]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;
        replace_statistics(&mut tx, rows).await?;
        tx.commit().await.map_err(db_error("commit"))?;
        info!("Applied statistics rows");
        Ok(())
    }

    async fn owed(
        &self,
        ower: PlayerId,
        owee: PlayerId,
        owe_type_id: i64,
    ) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT amount FROM owes WHERE ower = $1 AND owee = $2 AND owe_type_id = $3",
        )
        .bind(ower)
        .bind(owee)
        .bind(owe_type_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch owe"))?;

        Ok(row.map(|r| r.get("amount")).unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn payback(
        &self,
        ower: PlayerId,
        owee: PlayerId,
        owe_type_id: i64,
        amount: i64,
    ) -> Result<i64, AppError> {
        let row = sqlx::query(
            "UPDATE owes SET amount = GREATEST(amount - $4, 0) \
             WHERE ower = $1 AND owee = $2 AND owe_type_id = $3 RETURNING amount",
        )
        .bind(ower)
        .bind(owee)
        .bind(owe_type_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("pay back owe"))?;

        Ok(row.map(|r| r.get("amount")).unwrap_or_default())
    }
}
