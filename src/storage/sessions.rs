use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::AppError;
use crate::model::{Session, SessionCard, SessionCardStatus, SessionStatus, TrainingDate};
use crate::session::{SessionPlan, requeue_position};
use crate::storage::{date_col, ts, ts_col};

const SESSION_COLUMNS: &str = "id, collection_id, training_date, status,
    new_cards, review_cards, learning_cards,
    total_views, success_responses, failed_responses, score, created_at";

const SESSION_CARD_COLUMNS: &str = "id, session_id, card_id, position, planned_review_time, status";

const PENDING: u8 = 0;

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        training_date: date_col(row, 2)?,
        status: SessionStatus::from_i64(row.get(3)?),
        new_cards: row.get(4)?,
        review_cards: row.get(5)?,
        learning_cards: row.get(6)?,
        total_views: row.get(7)?,
        success_responses: row.get(8)?,
        failed_responses: row.get(9)?,
        score: row.get(10)?,
        created_at: ts_col(row, 11)?,
    })
}

fn session_card_from_row(row: &Row<'_>) -> rusqlite::Result<SessionCard> {
    Ok(SessionCard {
        id: row.get(0)?,
        session_id: row.get(1)?,
        card_id: row.get(2)?,
        position: row.get(3)?,
        planned_review_time: ts_col(row, 4)?,
        status: SessionCardStatus::from_u8(row.get(5)?),
    })
}

// ── Session operations ───────────────────────────────────────────────────

/// Insert a Started session and one queue row per planned card. The caller
/// owns the transaction.
pub fn insert_session(
    conn: &Connection,
    collection_id: i64,
    date: TrainingDate,
    plan: &SessionPlan,
    now: DateTime<Utc>,
) -> Result<Session, AppError> {
    conn.execute(
        "INSERT INTO sessions (collection_id, training_date, status,
                               new_cards, review_cards, learning_cards, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            collection_id,
            date.to_string(),
            SessionStatus::Started.to_i64(),
            plan.new_cards,
            plan.review_cards,
            plan.learning_cards,
            ts(now),
        ],
    )?;
    let session_id = conn.last_insert_rowid();

    let mut stmt = conn.prepare(
        "INSERT INTO session_cards (session_id, card_id, position, planned_review_time, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for planned in &plan.queue {
        stmt.execute(params![
            session_id,
            planned.card_id,
            planned.position,
            ts(planned.planned_review_time),
            PENDING,
        ])?;
    }

    get_session(conn, session_id)
}

pub fn get_session(conn: &Connection, session_id: i64) -> Result<Session, AppError> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
        params![session_id],
        session_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::SessionNotFound(session_id),
        other => AppError::Persistence(other),
    })
}

/// The collection's session for a day, Started or Completed. Abandoned
/// sessions are skipped so the day can be rebuilt.
pub fn find_session_for_day(
    conn: &Connection,
    collection_id: i64,
    date: TrainingDate,
) -> Result<Option<Session>, AppError> {
    let session = conn
        .query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE collection_id = ?1 AND training_date = ?2 AND status != ?3
                 ORDER BY id DESC LIMIT 1"
            ),
            params![collection_id, date.to_string(), SessionStatus::Abandoned.to_i64()],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

/// Most recent sessions of a collection, newest first.
pub fn list_sessions(
    conn: &Connection,
    collection_id: i64,
    limit: u32,
) -> Result<Vec<Session>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions
         WHERE collection_id = ?1
         ORDER BY training_date DESC, id DESC
         LIMIT ?2"
    ))?;
    let sessions = stmt
        .query_map(params![collection_id, limit], session_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sessions)
}

pub fn set_session_status(
    conn: &Connection,
    session_id: i64,
    status: SessionStatus,
) -> Result<(), AppError> {
    let n = conn.execute(
        "UPDATE sessions SET status = ?1 WHERE id = ?2",
        params![status.to_i64(), session_id],
    )?;
    if n == 0 {
        return Err(AppError::SessionNotFound(session_id));
    }
    Ok(())
}

/// Count one response against the session's running counters.
pub fn record_response(
    conn: &Connection,
    session_id: i64,
    success: bool,
    score: i64,
) -> Result<(), AppError> {
    let n = conn.execute(
        "UPDATE sessions SET
            total_views = total_views + 1,
            success_responses = success_responses + ?1,
            failed_responses = failed_responses + ?2,
            score = score + ?3
         WHERE id = ?4",
        params![i64::from(success), i64::from(!success), score, session_id],
    )?;
    if n == 0 {
        return Err(AppError::SessionNotFound(session_id));
    }
    Ok(())
}

// ── Queue operations ─────────────────────────────────────────────────────

/// Pending occurrences in queue order.
pub fn pending_queue(conn: &Connection, session_id: i64) -> Result<Vec<SessionCard>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_CARD_COLUMNS} FROM session_cards
         WHERE session_id = ?1 AND status = ?2
         ORDER BY position, id"
    ))?;
    let queue = stmt
        .query_map(params![session_id, PENDING], session_card_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(queue)
}

pub fn next_pending(conn: &Connection, session_id: i64) -> Result<Option<SessionCard>, AppError> {
    let next = conn
        .query_row(
            &format!(
                "SELECT {SESSION_CARD_COLUMNS} FROM session_cards
                 WHERE session_id = ?1 AND status = ?2
                 ORDER BY position, id LIMIT 1"
            ),
            params![session_id, PENDING],
            session_card_from_row,
        )
        .optional()?;
    Ok(next)
}

/// Earliest pending occurrence of `card_id` in the session.
pub fn pending_occurrence(
    conn: &Connection,
    session_id: i64,
    card_id: i64,
) -> Result<Option<SessionCard>, AppError> {
    let occurrence = conn
        .query_row(
            &format!(
                "SELECT {SESSION_CARD_COLUMNS} FROM session_cards
                 WHERE session_id = ?1 AND card_id = ?2 AND status = ?3
                 ORDER BY position, id LIMIT 1"
            ),
            params![session_id, card_id, PENDING],
            session_card_from_row,
        )
        .optional()?;
    Ok(occurrence)
}

pub fn count_pending(conn: &Connection, session_id: i64) -> Result<u32, AppError> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM session_cards WHERE session_id = ?1 AND status = ?2",
        params![session_id, PENDING],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub fn set_occurrence_status(
    conn: &Connection,
    occurrence_id: i64,
    status: SessionCardStatus,
) -> Result<(), AppError> {
    conn.execute(
        "UPDATE session_cards SET status = ?1 WHERE id = ?2",
        params![status.to_u8(), occurrence_id],
    )?;
    Ok(())
}

/// Mark every pending occurrence of a card Postponed. Returns how many there were.
pub fn postpone_occurrences(
    conn: &Connection,
    session_id: i64,
    card_id: i64,
) -> Result<usize, AppError> {
    let n = conn.execute(
        "UPDATE session_cards SET status = ?1
         WHERE session_id = ?2 AND card_id = ?3 AND status = ?4",
        params![
            SessionCardStatus::Postponed.to_u8(),
            session_id,
            card_id,
            PENDING
        ],
    )?;
    Ok(n)
}

/// Put a failed card back into the queue behind the next two pending
/// occurrences, shifting the rows after it down by one.
pub fn requeue_card(
    conn: &Connection,
    session_id: i64,
    card_id: i64,
    planned_review_time: DateTime<Utc>,
) -> Result<SessionCard, AppError> {
    let pending: Vec<i64> = pending_queue(conn, session_id)?
        .iter()
        .map(|occ| occ.position)
        .collect();
    let last: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position), -1) FROM session_cards WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    let position = requeue_position(&pending, last);

    conn.execute(
        "UPDATE session_cards SET position = position + 1
         WHERE session_id = ?1 AND position >= ?2",
        params![session_id, position],
    )?;
    conn.execute(
        "INSERT INTO session_cards (session_id, card_id, position, planned_review_time, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, card_id, position, ts(planned_review_time), PENDING],
    )?;
    let id = conn.last_insert_rowid();

    Ok(SessionCard {
        id,
        session_id,
        card_id,
        position,
        planned_review_time,
        status: SessionCardStatus::Pending,
    })
}
