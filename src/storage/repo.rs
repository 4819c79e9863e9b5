use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

use crate::error::AppError;
use crate::model::{
    Card, CardMedia, CardState, Collection, CollectionOverview, CollectionTrainingData,
    DailyQuotas, Grade, ImportResult, LearningState, NewCard, ReviewLog, SchedulerModel,
    TrainingDate,
};
use crate::storage::{opt_date_col, opt_ts_col, ts, ts_col};

const COLLECTION_COLUMNS: &str = "c.id, c.name, c.description, c.scheduler, c.created_at,
    (SELECT COUNT(*) FROM cards WHERE collection_id = c.id)";

const CARD_COLUMNS: &str = "id, collection_id, front, back,
    front_image, back_image, front_audio, back_audio, hide, priority,
    state, learning_step, ease_factor, stability, difficulty, interval_days,
    repeat_time, prev_repeat_time, successful_repeats, failed_repeats, reps, lapses,
    created_at";

const REVIEW_COLUMNS: &str = "r.id, r.card_id, r.card_state, r.grade, r.review_duration_ms,
    r.scheduled_review_time, r.stability, r.difficulty, r.ease_factor, r.created_at";

fn not_found(e: rusqlite::Error, missing: AppError) -> AppError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => missing,
        other => AppError::Persistence(other),
    }
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
    let scheduler: String = row.get(3)?;
    Ok(Collection {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        scheduler: scheduler
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        created_at: ts_col(row, 4)?,
        card_count: row.get(5)?,
    })
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        media: CardMedia {
            front_image: row.get(4)?,
            back_image: row.get(5)?,
            front_audio: row.get(6)?,
            back_audio: row.get(7)?,
        },
        hide: row.get(8)?,
        priority: row.get(9)?,
        learning: LearningState {
            state: CardState::from_u8(row.get(10)?),
            learning_step: row.get(11)?,
            ease_factor: row.get(12)?,
            stability: row.get(13)?,
            difficulty: row.get(14)?,
            interval_days: row.get(15)?,
            repeat_time: opt_ts_col(row, 16)?,
            prev_repeat_time: opt_ts_col(row, 17)?,
            successful_repeats: row.get(18)?,
            failed_repeats: row.get(19)?,
            reps: row.get(20)?,
            lapses: row.get(21)?,
        },
        created_at: ts_col(row, 22)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewLog> {
    let grade: u32 = row.get(3)?;
    Ok(ReviewLog {
        id: row.get(0)?,
        card_id: row.get(1)?,
        card_state: CardState::from_u8(row.get(2)?),
        grade: Grade::from_u32(grade)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(e)))?,
        review_duration_ms: row.get(4)?,
        scheduled_review_time: ts_col(row, 5)?,
        stability: row.get(6)?,
        difficulty: row.get(7)?,
        ease_factor: row.get(8)?,
        created_at: ts_col(row, 9)?,
    })
}

fn training_data_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionTrainingData> {
    Ok(CollectionTrainingData {
        collection_id: row.get(0)?,
        max_new_cards: row.get(1)?,
        max_review_cards: row.get(2)?,
        max_learning_cards: row.get(3)?,
        total_card_views: row.get(4)?,
        total_success_responses: row.get(5)?,
        total_failed_responses: row.get(6)?,
        total_score: row.get(7)?,
        streak: row.get(8)?,
        last_training_date: opt_date_col(row, 9)?,
    })
}

// ── Collection operations ────────────────────────────────────────────────

/// Create a collection and seed its training data with `quotas`.
pub fn create_collection(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    scheduler: SchedulerModel,
    quotas: &DailyQuotas,
) -> Result<Collection, AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("collection name must not be empty".into()));
    }
    quotas.validate()?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO collections (name, description, scheduler) VALUES (?1, ?2, ?3)",
        params![name.trim(), description, scheduler.as_str()],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO training_data (collection_id, max_new_cards, max_review_cards, max_learning_cards)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            id,
            quotas.max_new_cards,
            quotas.max_review_cards,
            quotas.max_learning_cards
        ],
    )?;
    let collection = get_collection(&tx, id)?;
    tx.commit()?;
    Ok(collection)
}

pub fn get_collection(conn: &Connection, id: i64) -> Result<Collection, AppError> {
    conn.query_row(
        &format!("SELECT {COLLECTION_COLUMNS} FROM collections c WHERE c.id = ?1"),
        params![id],
        collection_from_row,
    )
    .map_err(|e| not_found(e, AppError::CollectionNotFound(id)))
}

pub fn list_collections(conn: &Connection) -> Result<Vec<Collection>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLLECTION_COLUMNS} FROM collections c ORDER BY c.name"
    ))?;
    let collections = stmt
        .query_map([], collection_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(collections)
}

/// Which memory model schedules this collection.
pub fn collection_scheduler(conn: &Connection, id: i64) -> Result<SchedulerModel, AppError> {
    Ok(get_collection(conn, id)?.scheduler)
}

pub fn update_collection(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
    scheduler: Option<SchedulerModel>,
) -> Result<Collection, AppError> {
    let tx = conn.unchecked_transaction()?;
    get_collection(&tx, id)?;

    if let Some(n) = name {
        if n.trim().is_empty() {
            return Err(AppError::Validation("collection name must not be empty".into()));
        }
        tx.execute(
            "UPDATE collections SET name = ?1 WHERE id = ?2",
            params![n.trim(), id],
        )?;
    }
    if let Some(d) = description {
        tx.execute(
            "UPDATE collections SET description = ?1 WHERE id = ?2",
            params![d, id],
        )?;
    }
    if let Some(s) = scheduler {
        tx.execute(
            "UPDATE collections SET scheduler = ?1 WHERE id = ?2",
            params![s.as_str(), id],
        )?;
    }

    let collection = get_collection(&tx, id)?;
    tx.commit()?;
    Ok(collection)
}

/// Delete a collection with its cards, sessions and review history.
pub fn delete_collection(conn: &Connection, id: i64) -> Result<(), AppError> {
    let n = conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(AppError::CollectionNotFound(id));
    }
    Ok(())
}

// ── Card operations ──────────────────────────────────────────────────────

fn validate_card(card: &NewCard) -> Result<(), AppError> {
    if card.front.trim().is_empty() || card.back.trim().is_empty() {
        return Err(AppError::Validation("card front and back must not be empty".into()));
    }
    Ok(())
}

fn insert_card(conn: &Connection, collection_id: i64, card: &NewCard) -> Result<i64, AppError> {
    validate_card(card)?;
    conn.execute(
        "INSERT INTO cards (collection_id, front, back, front_image, back_image,
                            front_audio, back_audio, priority)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            collection_id,
            card.front,
            card.back,
            card.media.front_image,
            card.media.back_image,
            card.media.front_audio,
            card.media.back_audio,
            card.priority,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn add_card(conn: &Connection, collection_id: i64, card: &NewCard) -> Result<i64, AppError> {
    get_collection(conn, collection_id)?;
    insert_card(conn, collection_id, card)
}

/// Add several cards in one transaction; either all land or none.
pub fn add_cards(
    conn: &Connection,
    collection_id: i64,
    cards: &[NewCard],
) -> Result<Vec<i64>, AppError> {
    let tx = conn.unchecked_transaction()?;
    get_collection(&tx, collection_id)?;
    let mut ids = Vec::with_capacity(cards.len());
    for card in cards {
        ids.push(insert_card(&tx, collection_id, card)?);
    }
    tx.commit()?;
    Ok(ids)
}

/// Import cards, skipping any whose front and back already exist in the collection.
pub fn import_cards(
    conn: &Connection,
    collection_id: i64,
    cards: &[NewCard],
) -> Result<ImportResult, AppError> {
    let total = cards.len();
    let tx = conn.unchecked_transaction()?;
    get_collection(&tx, collection_id)?;

    let mut existing: HashSet<(String, String)> = HashSet::new();
    {
        let mut stmt = tx.prepare("SELECT front, back FROM cards WHERE collection_id = ?1")?;
        let rows = stmt.query_map(params![collection_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            existing.insert(row?);
        }
    }

    let mut imported = 0;
    for card in cards {
        let key = (card.front.clone(), card.back.clone());
        if existing.contains(&key) {
            continue;
        }
        insert_card(&tx, collection_id, card)?;
        existing.insert(key);
        imported += 1;
    }

    tx.commit()?;
    Ok(ImportResult {
        imported,
        skipped: total - imported,
        total,
    })
}

pub fn get_card(conn: &Connection, card_id: i64) -> Result<Card, AppError> {
    conn.query_row(
        &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
        params![card_id],
        card_from_row,
    )
    .map_err(|e| not_found(e, AppError::CardNotFound(card_id)))
}

/// All cards of a collection in creation order, hidden ones included.
pub fn list_cards(conn: &Connection, collection_id: i64) -> Result<Vec<Card>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CARD_COLUMNS} FROM cards WHERE collection_id = ?1 ORDER BY id"
    ))?;
    let cards = stmt
        .query_map(params![collection_id], card_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cards)
}

/// Edit card content. Learning state is left alone.
pub fn edit_card(
    conn: &Connection,
    card_id: i64,
    front: Option<&str>,
    back: Option<&str>,
    media: Option<&CardMedia>,
) -> Result<Card, AppError> {
    let tx = conn.unchecked_transaction()?;
    get_card(&tx, card_id)?;

    if let Some(f) = front {
        if f.trim().is_empty() {
            return Err(AppError::Validation("card front must not be empty".into()));
        }
        tx.execute("UPDATE cards SET front = ?1 WHERE id = ?2", params![f, card_id])?;
    }
    if let Some(b) = back {
        if b.trim().is_empty() {
            return Err(AppError::Validation("card back must not be empty".into()));
        }
        tx.execute("UPDATE cards SET back = ?1 WHERE id = ?2", params![b, card_id])?;
    }
    if let Some(m) = media {
        tx.execute(
            "UPDATE cards SET front_image = ?1, back_image = ?2, front_audio = ?3, back_audio = ?4
             WHERE id = ?5",
            params![m.front_image, m.back_image, m.front_audio, m.back_audio, card_id],
        )?;
    }

    let card = get_card(&tx, card_id)?;
    tx.commit()?;
    Ok(card)
}

/// Hidden cards keep their learning state but are never scheduled.
pub fn set_card_hidden(conn: &Connection, card_id: i64, hide: bool) -> Result<Card, AppError> {
    let n = conn.execute(
        "UPDATE cards SET hide = ?1 WHERE id = ?2",
        params![hide, card_id],
    )?;
    if n == 0 {
        return Err(AppError::CardNotFound(card_id));
    }
    get_card(conn, card_id)
}

pub fn delete_card(conn: &Connection, card_id: i64) -> Result<(), AppError> {
    let n = conn.execute("DELETE FROM cards WHERE id = ?1", params![card_id])?;
    if n == 0 {
        return Err(AppError::CardNotFound(card_id));
    }
    Ok(())
}

/// Write a card's learning state. Only the grading path calls this.
pub fn save_learning_state(
    conn: &Connection,
    card_id: i64,
    learning: &LearningState,
) -> Result<(), AppError> {
    let n = conn.execute(
        "UPDATE cards SET
            state = ?1, learning_step = ?2, ease_factor = ?3, stability = ?4,
            difficulty = ?5, interval_days = ?6, repeat_time = ?7, prev_repeat_time = ?8,
            successful_repeats = ?9, failed_repeats = ?10, reps = ?11, lapses = ?12
         WHERE id = ?13",
        params![
            learning.state.to_u8(),
            learning.learning_step,
            learning.ease_factor,
            learning.stability,
            learning.difficulty,
            learning.interval_days,
            learning.repeat_time.map(ts),
            learning.prev_repeat_time.map(ts),
            learning.successful_repeats,
            learning.failed_repeats,
            learning.reps,
            learning.lapses,
            card_id,
        ],
    )?;
    if n == 0 {
        return Err(AppError::CardNotFound(card_id));
    }
    Ok(())
}

/// Card counts by learning phase, plus how many are due before the end of `date`.
pub fn collection_overview(
    conn: &Connection,
    collection_id: i64,
    date: TrainingDate,
) -> Result<CollectionOverview, AppError> {
    get_collection(conn, collection_id)?;
    let overview = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(hide = 0 AND state = 0), 0),
                COALESCE(SUM(hide = 0 AND state = 1), 0),
                COALESCE(SUM(hide = 0 AND state = 2), 0),
                COALESCE(SUM(hide = 0 AND state = 3), 0),
                COALESCE(SUM(hide), 0),
                COALESCE(SUM(hide = 0 AND state != 0 AND repeat_time < ?2), 0)
         FROM cards WHERE collection_id = ?1",
        params![collection_id, ts(date.end())],
        |row| {
            Ok(CollectionOverview {
                collection_id,
                total: row.get(0)?,
                new: row.get(1)?,
                learning: row.get(2)?,
                review: row.get(3)?,
                relearning: row.get(4)?,
                hidden: row.get(5)?,
                due: row.get(6)?,
            })
        },
    )?;
    Ok(overview)
}

// ── Training data operations ─────────────────────────────────────────────

pub fn get_training_data(
    conn: &Connection,
    collection_id: i64,
) -> Result<CollectionTrainingData, AppError> {
    conn.query_row(
        "SELECT collection_id, max_new_cards, max_review_cards, max_learning_cards,
                total_card_views, total_success_responses, total_failed_responses,
                total_score, streak, last_training_date
         FROM training_data WHERE collection_id = ?1",
        params![collection_id],
        training_data_from_row,
    )
    .map_err(|e| not_found(e, AppError::CollectionNotFound(collection_id)))
}

/// Change the daily quotas. Cumulative counters are owned by the training flow.
pub fn update_quotas(
    conn: &Connection,
    collection_id: i64,
    quotas: &DailyQuotas,
) -> Result<CollectionTrainingData, AppError> {
    quotas.validate()?;
    let n = conn.execute(
        "UPDATE training_data
         SET max_new_cards = ?1, max_review_cards = ?2, max_learning_cards = ?3
         WHERE collection_id = ?4",
        params![
            quotas.max_new_cards,
            quotas.max_review_cards,
            quotas.max_learning_cards,
            collection_id
        ],
    )?;
    if n == 0 {
        return Err(AppError::CollectionNotFound(collection_id));
    }
    get_training_data(conn, collection_id)
}

/// Write the cumulative counters and streak of a collection.
pub fn save_training_totals(
    conn: &Connection,
    data: &CollectionTrainingData,
) -> Result<(), AppError> {
    let n = conn.execute(
        "UPDATE training_data SET
            total_card_views = ?1, total_success_responses = ?2, total_failed_responses = ?3,
            total_score = ?4, streak = ?5, last_training_date = ?6
         WHERE collection_id = ?7",
        params![
            data.total_card_views,
            data.total_success_responses,
            data.total_failed_responses,
            data.total_score,
            data.streak,
            data.last_training_date.map(|d| d.to_string()),
            data.collection_id,
        ],
    )?;
    if n == 0 {
        return Err(AppError::CollectionNotFound(data.collection_id));
    }
    Ok(())
}

// ── Review log operations ────────────────────────────────────────────────

/// Append one grading event. The `id` of `entry` is ignored.
pub fn append_review(conn: &Connection, entry: &ReviewLog) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO review_log (card_id, card_state, grade, review_duration_ms,
                                 scheduled_review_time, stability, difficulty, ease_factor,
                                 created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.card_id,
            entry.card_state.to_u8(),
            entry.grade.as_u32(),
            entry.review_duration_ms,
            ts(entry.scheduled_review_time),
            entry.stability,
            entry.difficulty,
            entry.ease_factor,
            ts(entry.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Review history of one card, newest first.
pub fn card_history(conn: &Connection, card_id: i64) -> Result<Vec<ReviewLog>, AppError> {
    get_card(conn, card_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVIEW_COLUMNS} FROM review_log r
         WHERE r.card_id = ?1 ORDER BY r.created_at DESC, r.id DESC"
    ))?;
    let logs = stmt
        .query_map(params![card_id], review_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

/// Reviews of a collection's cards with `from <= created_at < to`, oldest first.
pub fn collection_reviews(
    conn: &Connection,
    collection_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<ReviewLog>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVIEW_COLUMNS} FROM review_log r
         JOIN cards c ON c.id = r.card_id
         WHERE c.collection_id = ?1 AND r.created_at >= ?2 AND r.created_at < ?3
         ORDER BY r.created_at, r.id"
    ))?;
    let logs = stmt
        .query_map(params![collection_id, ts(from), ts(to)], review_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        conn
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    /// Helper: create a collection with one card, returning (collection_id, card_id).
    fn seed_one_card(conn: &Connection) -> (i64, i64) {
        let c = create_collection(conn, "spanish", None, SchedulerModel::Fsrs, &DailyQuotas::default())
            .unwrap();
        let card_id = add_card(conn, c.id, &NewCard::text("hola", "hello")).unwrap();
        (c.id, card_id)
    }

    fn review_entry(card_id: i64, created: &str) -> ReviewLog {
        ReviewLog {
            id: 0,
            card_id,
            card_state: CardState::New,
            grade: Grade::Good,
            review_duration_ms: 1200,
            scheduled_review_time: at(created) + chrono::Duration::minutes(10),
            stability: Some(3.2),
            difficulty: Some(5.1),
            ease_factor: 2.5,
            created_at: at(created),
        }
    }

    // ── Collection tests ───────────────────────────────────────────────

    #[test]
    fn create_collection_seeds_training_data() {
        let conn = test_conn();
        let quotas = DailyQuotas {
            max_new_cards: 5,
            max_review_cards: 6,
            max_learning_cards: 7,
        };
        let c = create_collection(&conn, "geo", Some("capitals"), SchedulerModel::Legacy, &quotas)
            .unwrap();
        assert_eq!(c.scheduler, SchedulerModel::Legacy);
        assert_eq!(c.card_count, 0);

        let data = get_training_data(&conn, c.id).unwrap();
        assert_eq!(data.quotas(), quotas);
        assert_eq!(data.streak, 0);
        assert_eq!(data.last_training_date, None);
    }

    #[test]
    fn duplicate_collection_name_is_a_persistence_error() {
        let conn = test_conn();
        let q = DailyQuotas::default();
        create_collection(&conn, "dup", None, SchedulerModel::Fsrs, &q).unwrap();
        let err = create_collection(&conn, "dup", None, SchedulerModel::Fsrs, &q).unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)), "got: {err:?}");
    }

    #[test]
    fn update_collection_rolls_back_when_a_later_step_fails() {
        let conn = test_conn();
        let c = create_collection(&conn, "orig", Some("v1"), SchedulerModel::Fsrs, &DailyQuotas::default())
            .unwrap();

        conn.execute_batch(
            "CREATE TRIGGER reject_description
             BEFORE UPDATE OF description ON collections
             WHEN NEW.description LIKE '%__reject__%'
             BEGIN
                 SELECT RAISE(ABORT, 'forced description failure');
             END;",
        )
        .unwrap();

        let result = update_collection(&conn, c.id, Some("renamed"), Some("__reject__"), None);
        assert!(result.is_err());

        let after = get_collection(&conn, c.id).unwrap();
        assert_eq!(after.name, "orig", "rename must have been rolled back");
        assert_eq!(after.description.as_deref(), Some("v1"));
    }

    #[test]
    fn update_collection_changes_model() {
        let conn = test_conn();
        let (cid, _) = seed_one_card(&conn);
        let c = update_collection(&conn, cid, None, None, Some(SchedulerModel::Legacy)).unwrap();
        assert_eq!(c.scheduler, SchedulerModel::Legacy);
        assert_eq!(c.card_count, 1);
    }

    #[test]
    fn deleting_a_collection_cascades() {
        let conn = test_conn();
        let (cid, card_id) = seed_one_card(&conn);
        append_review(&conn, &review_entry(card_id, "2024-05-01T09:00:00Z")).unwrap();
        delete_collection(&conn, cid).unwrap();

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM review_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(matches!(get_card(&conn, card_id), Err(AppError::CardNotFound(_))));
        assert!(matches!(
            get_training_data(&conn, cid),
            Err(AppError::CollectionNotFound(_))
        ));
    }

    // ── Card tests ─────────────────────────────────────────────────────

    #[test]
    fn new_card_starts_unscheduled() {
        let conn = test_conn();
        let (_, card_id) = seed_one_card(&conn);
        let card = get_card(&conn, card_id).unwrap();
        assert_eq!(card.learning, LearningState::default());
        assert_eq!(card.learning.repeat_time, None);
        assert!(!card.hide);
    }

    #[test]
    fn add_card_to_missing_collection_is_not_found() {
        let conn = test_conn();
        let err = add_card(&conn, 77, &NewCard::text("a", "b")).unwrap_err();
        assert!(matches!(err, AppError::CollectionNotFound(77)), "got: {err:?}");
    }

    #[test]
    fn add_cards_is_all_or_nothing() {
        let conn = test_conn();
        let (cid, _) = seed_one_card(&conn);
        let batch = vec![NewCard::text("uno", "one"), NewCard::text("", "two")];
        let err = add_cards(&conn, cid, &batch).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(list_cards(&conn, cid).unwrap().len(), 1);
    }

    #[test]
    fn import_skips_duplicates_in_store_and_batch() {
        let conn = test_conn();
        let (cid, _) = seed_one_card(&conn);
        let batch = vec![
            NewCard::text("hola", "hello"),
            NewCard::text("adios", "bye"),
            NewCard::text("adios", "bye"),
        ];
        let result = import_cards(&conn, cid, &batch).unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.total, 3);
    }

    #[test]
    fn edit_card_keeps_learning_state() {
        let conn = test_conn();
        let (_, card_id) = seed_one_card(&conn);
        let learning = LearningState {
            state: CardState::Review,
            interval_days: 4,
            repeat_time: Some(at("2024-05-05T09:00:00Z")),
            prev_repeat_time: Some(at("2024-05-01T09:00:00Z")),
            reps: 2,
            successful_repeats: 2,
            ..LearningState::default()
        };
        save_learning_state(&conn, card_id, &learning).unwrap();

        let media = CardMedia {
            front_image: Some(9),
            ..CardMedia::default()
        };
        let card = edit_card(&conn, card_id, None, Some("hi"), Some(&media)).unwrap();
        assert_eq!(card.front, "hola");
        assert_eq!(card.back, "hi");
        assert_eq!(card.media.front_image, Some(9));
        assert_eq!(card.learning, learning);
    }

    #[test]
    fn hide_and_unhide() {
        let conn = test_conn();
        let (_, card_id) = seed_one_card(&conn);
        assert!(set_card_hidden(&conn, card_id, true).unwrap().hide);
        assert!(!set_card_hidden(&conn, card_id, false).unwrap().hide);
        assert!(matches!(
            set_card_hidden(&conn, 404, true),
            Err(AppError::CardNotFound(404))
        ));
    }

    #[test]
    fn get_card_returns_card_not_found_for_missing_card() {
        let conn = test_conn();
        let err = get_card(&conn, 9999).unwrap_err();
        assert!(matches!(err, AppError::CardNotFound(9999)), "got: {err:?}");
    }

    #[test]
    fn get_card_returns_persistence_error_on_schema_issue() {
        let conn = Connection::open_in_memory().unwrap();
        let err = get_card(&conn, 1).unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)), "got: {err:?}");
    }

    #[test]
    fn overview_counts_by_state_and_due() {
        let conn = test_conn();
        let (cid, _) = seed_one_card(&conn);
        let second = add_card(&conn, cid, &NewCard::text("gato", "cat")).unwrap();
        let third = add_card(&conn, cid, &NewCard::text("perro", "dog")).unwrap();
        save_learning_state(
            &conn,
            second,
            &LearningState {
                state: CardState::Review,
                interval_days: 1,
                repeat_time: Some(at("2024-05-01T18:00:00Z")),
                ..LearningState::default()
            },
        )
        .unwrap();
        set_card_hidden(&conn, third, true).unwrap();

        let day: TrainingDate = "2024-05-01".parse().unwrap();
        let overview = collection_overview(&conn, cid, day).unwrap();
        assert_eq!(overview.total, 3);
        assert_eq!(overview.new, 1);
        assert_eq!(overview.review, 1);
        assert_eq!(overview.hidden, 1);
        assert_eq!(overview.due, 1);
    }

    // ── Training data tests ────────────────────────────────────────────

    #[test]
    fn quotas_above_limit_are_rejected_and_nothing_changes() {
        let conn = test_conn();
        let (cid, _) = seed_one_card(&conn);
        let bad = DailyQuotas {
            max_new_cards: 10_000,
            ..DailyQuotas::default()
        };
        assert!(matches!(update_quotas(&conn, cid, &bad), Err(AppError::Validation(_))));
        assert_eq!(get_training_data(&conn, cid).unwrap().quotas(), DailyQuotas::default());
    }

    #[test]
    fn training_totals_round_trip() {
        let conn = test_conn();
        let (cid, _) = seed_one_card(&conn);
        let mut data = get_training_data(&conn, cid).unwrap();
        data.total_card_views = 12;
        data.total_score = 40;
        data.streak = 3;
        data.last_training_date = Some("2024-05-01".parse().unwrap());
        save_training_totals(&conn, &data).unwrap();
        assert_eq!(get_training_data(&conn, cid).unwrap(), data);
    }

    // ── Review log tests ───────────────────────────────────────────────

    #[test]
    fn card_history_is_newest_first() {
        let conn = test_conn();
        let (_, card_id) = seed_one_card(&conn);
        append_review(&conn, &review_entry(card_id, "2024-05-01T09:00:00Z")).unwrap();
        append_review(&conn, &review_entry(card_id, "2024-05-03T09:00:00Z")).unwrap();
        let history = card_history(&conn, card_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].created_at, at("2024-05-03T09:00:00Z"));
        assert_eq!(history[1].grade, Grade::Good);
    }

    #[test]
    fn collection_reviews_respects_the_range() {
        let conn = test_conn();
        let (cid, card_id) = seed_one_card(&conn);
        for day in ["2024-04-30T23:59:59Z", "2024-05-01T00:00:00Z", "2024-05-02T00:00:00Z"] {
            append_review(&conn, &review_entry(card_id, day)).unwrap();
        }
        let logs = collection_reviews(
            &conn,
            cid,
            at("2024-05-01T00:00:00Z"),
            at("2024-05-02T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].created_at, at("2024-05-01T00:00:00Z"));
    }
}
