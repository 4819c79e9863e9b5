//! Training flow: find or build the day's session, serve cards, apply grades,
//! complete or reset. Every write path runs in one transaction; validation
//! happens before anything is written.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::engine::{Scheduler, SchedulerSettings};
use crate::error::AppError;
use crate::model::{
    CollectionTrainingData, Grade, QueuedCard, ReviewLog, Session, SessionCardStatus,
    SessionStatus, SessionView, TrainingDate,
};
use crate::session::{plan_session, score_delta};
use crate::storage::{repo, sessions};

fn ensure_started(session: &Session) -> Result<(), AppError> {
    match session.status {
        SessionStatus::Started => Ok(()),
        other => Err(AppError::InvalidState(format!(
            "session {} is {:?}",
            session.id, other
        ))),
    }
}

fn view(conn: &Connection, session: Session) -> Result<SessionView, AppError> {
    let queue = sessions::pending_queue(conn, session.id)?;
    Ok(SessionView { session, queue })
}

/// Return the collection's session for `date`, or build a new one from the
/// current ledger. A Completed session is returned as is, so quotas hold for
/// the whole day; only an Abandoned one lets the day be rebuilt. A session
/// with nothing to study is completed at once.
pub fn start_or_resume_session(
    conn: &Connection,
    collection_id: i64,
    date: TrainingDate,
    now: DateTime<Utc>,
) -> Result<SessionView, AppError> {
    repo::get_collection(conn, collection_id)?;

    if let Some(session) = sessions::find_session_for_day(conn, collection_id, date)? {
        debug!(session_id = session.id, status = ?session.status, "resuming session");
        return view(conn, session);
    }

    let tx = conn.unchecked_transaction()?;
    let data = repo::get_training_data(&tx, collection_id)?;
    let cards = repo::list_cards(&tx, collection_id)?;
    let plan = plan_session(&cards, &data, date, now);

    let mut session = sessions::insert_session(&tx, collection_id, date, &plan, now)?;
    if plan.is_empty() {
        sessions::set_session_status(&tx, session.id, SessionStatus::Completed)?;
        session.status = SessionStatus::Completed;
    }
    tx.commit()?;

    info!(
        session_id = session.id,
        collection_id,
        %date,
        new = plan.new_cards,
        review = plan.review_cards,
        learning = plan.learning_cards,
        "session created"
    );
    view(conn, session)
}

/// Head of the session's queue, or `None` once every occurrence is handled.
pub fn next_card(conn: &Connection, session_id: i64) -> Result<Option<QueuedCard>, AppError> {
    let session = sessions::get_session(conn, session_id)?;
    ensure_started(&session)?;
    match sessions::next_pending(conn, session_id)? {
        Some(occurrence) => {
            let card = repo::get_card(conn, occurrence.card_id)?;
            Ok(Some(QueuedCard { occurrence, card }))
        }
        None => Ok(None),
    }
}

/// Apply a grade to a queued card: ledger, review log, session counters and
/// queue change together or not at all.
pub fn submit_grade(
    conn: &Connection,
    settings: &SchedulerSettings,
    session_id: i64,
    card_id: i64,
    grade: Grade,
    now: DateTime<Utc>,
    review_duration_ms: i64,
) -> Result<Session, AppError> {
    if review_duration_ms < 0 {
        return Err(AppError::Validation(format!(
            "review duration must not be negative, got {review_duration_ms}"
        )));
    }
    let session = sessions::get_session(conn, session_id)?;
    if let Err(e) = ensure_started(&session) {
        warn!(session_id, card_id, "grade rejected: {e}");
        return Err(e);
    }
    let card = repo::get_card(conn, card_id)?;
    if card.collection_id != session.collection_id {
        return Err(AppError::Validation(format!(
            "card {card_id} does not belong to collection {}",
            session.collection_id
        )));
    }
    let Some(occurrence) = sessions::pending_occurrence(conn, session_id, card_id)? else {
        warn!(session_id, card_id, "grade rejected: card not queued");
        return Err(AppError::InvalidState(format!(
            "card {card_id} has no pending occurrence in session {session_id}"
        )));
    };

    let model = repo::collection_scheduler(conn, session.collection_id)?;
    let scheduled = Scheduler::new(model, settings).schedule(&card.learning, grade, now);
    let entry = ReviewLog {
        id: 0,
        card_id,
        card_state: scheduled.previous_state,
        grade,
        review_duration_ms,
        scheduled_review_time: scheduled.due,
        stability: scheduled.next.stability,
        difficulty: scheduled.next.difficulty,
        ease_factor: scheduled.next.ease_factor,
        created_at: now,
    };

    let tx = conn.unchecked_transaction()?;
    repo::save_learning_state(&tx, card_id, &scheduled.next)?;
    repo::append_review(&tx, &entry)?;
    sessions::record_response(
        &tx,
        session_id,
        grade.is_success(),
        score_delta(scheduled.previous_state, grade),
    )?;
    sessions::set_occurrence_status(&tx, occurrence.id, SessionCardStatus::Resolved)?;
    if grade == Grade::Again {
        let requeued = sessions::requeue_card(&tx, session_id, card_id, scheduled.due)?;
        debug!(session_id, card_id, position = requeued.position, "card re-queued");
    }
    let updated = sessions::get_session(&tx, session_id)?;
    tx.commit()?;

    debug!(
        session_id,
        card_id,
        ?grade,
        from = ?scheduled.previous_state,
        to = ?scheduled.next.state,
        due = %scheduled.due,
        "grade applied"
    );
    Ok(updated)
}

/// Drop a card from the rest of the session without touching its ledger.
pub fn postpone_card(conn: &Connection, session_id: i64, card_id: i64) -> Result<Session, AppError> {
    let session = sessions::get_session(conn, session_id)?;
    ensure_started(&session)?;
    repo::get_card(conn, card_id)?;
    let n = sessions::postpone_occurrences(conn, session_id, card_id)?;
    if n == 0 {
        return Err(AppError::InvalidState(format!(
            "card {card_id} has no pending occurrence in session {session_id}"
        )));
    }
    debug!(session_id, card_id, occurrences = n, "card postponed");
    Ok(session)
}

/// Streak after training on `date`, given the last day trained before.
fn next_streak(streak: u32, last: Option<TrainingDate>, date: TrainingDate) -> (u32, TrainingDate) {
    match last {
        Some(l) if l == date => (streak, date),
        Some(l) if l > date => (streak, l),
        Some(l) if l == date.previous() => (streak + 1, date),
        _ => (1, date),
    }
}

/// Close a session whose queue is exhausted and fold its counters into the
/// collection's totals. Completing a Completed session changes nothing, and a
/// session with no views leaves totals and streak alone.
pub fn complete_session(conn: &Connection, session_id: i64) -> Result<Session, AppError> {
    let session = sessions::get_session(conn, session_id)?;
    match session.status {
        SessionStatus::Completed => return Ok(session),
        SessionStatus::Abandoned => {
            return Err(AppError::InvalidState(format!(
                "session {session_id} was abandoned"
            )));
        }
        SessionStatus::Started => {}
    }
    let pending = sessions::count_pending(conn, session_id)?;
    if pending > 0 {
        return Err(AppError::InvalidState(format!(
            "session {session_id} still has {pending} queued cards"
        )));
    }

    if session.total_views == 0 {
        sessions::set_session_status(conn, session_id, SessionStatus::Completed)?;
        info!(session_id, "session completed without views");
        return sessions::get_session(conn, session_id);
    }

    let tx = conn.unchecked_transaction()?;
    sessions::set_session_status(&tx, session_id, SessionStatus::Completed)?;
    let mut data = repo::get_training_data(&tx, session.collection_id)?;
    data.total_card_views += i64::from(session.total_views);
    data.total_success_responses += i64::from(session.success_responses);
    data.total_failed_responses += i64::from(session.failed_responses);
    data.total_score += session.score;
    let (streak, last) = next_streak(data.streak, data.last_training_date, session.training_date);
    data.streak = streak;
    data.last_training_date = Some(last);
    repo::save_training_totals(&tx, &data)?;
    let completed = sessions::get_session(&tx, session_id)?;
    tx.commit()?;

    info!(
        session_id,
        views = completed.total_views,
        score = completed.score,
        streak,
        "session completed"
    );
    Ok(completed)
}

/// Abandon a Started session; the next start for the same day builds afresh.
pub fn reset_session(conn: &Connection, session_id: i64) -> Result<Session, AppError> {
    let session = sessions::get_session(conn, session_id)?;
    ensure_started(&session)?;
    sessions::set_session_status(conn, session_id, SessionStatus::Abandoned)?;
    info!(session_id, "session reset");
    sessions::get_session(conn, session_id)
}

pub fn get_training_data(
    conn: &Connection,
    collection_id: i64,
) -> Result<CollectionTrainingData, AppError> {
    repo::get_training_data(conn, collection_id)
}

/// Store new quotas. Counters and streak in `data` are ignored.
pub fn update_training_data(
    conn: &Connection,
    data: &CollectionTrainingData,
) -> Result<CollectionTrainingData, AppError> {
    data.validate()?;
    repo::update_quotas(conn, data.collection_id, &data.quotas())
}
