pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod session;
pub mod stats;
pub mod storage;
pub mod training;

pub use model as models;

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use config::Config;
use engine::SchedulerSettings;
use error::AppError;
use model::{
    Card, CardMedia, Collection, CollectionOverview, CollectionTrainingData, DailyQuotas, Grade,
    ImportResult, NewCard, QueuedCard, ReviewLog, SchedulerModel, Session, SessionView,
    TrainingDate,
};
use stats::CollectionStats;

/// Main entry point for the kbox library.
///
/// Wraps a SQLite connection plus the scheduling settings and exposes every
/// collection, card and training operation. "Now" and "today" are always
/// supplied by the caller.
pub struct Kbox {
    conn: Connection,
    settings: SchedulerSettings,
    default_quotas: DailyQuotas,
    default_model: SchedulerModel,
}

impl Kbox {
    /// Open (or create) the database named by `config` and initialize the schema.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Self::open(&config.database.path, config)
    }

    /// Open (or create) a database at the given path.
    pub fn open(db_path: &Path, config: &Config) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, config)
    }

    /// Open an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, AppError> {
        Self::with_connection(Connection::open_in_memory()?, &Config::default())
    }

    fn with_connection(conn: Connection, config: &Config) -> Result<Self, AppError> {
        let settings = config.scheduler_settings()?;
        config.training.validate()?;
        storage::db::init_db(&conn)?;
        Ok(Self {
            conn,
            settings,
            default_quotas: config.training,
            default_model: config.scheduler.default_model,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    // ── Collection operations ────────────────────────────────────────────

    /// Create a collection; `scheduler` defaults to the configured model.
    pub fn create_collection(
        &self,
        name: &str,
        description: Option<&str>,
        scheduler: Option<SchedulerModel>,
    ) -> Result<Collection, AppError> {
        storage::repo::create_collection(
            &self.conn,
            name,
            description,
            scheduler.unwrap_or(self.default_model),
            &self.default_quotas,
        )
    }

    pub fn list_collections(&self) -> Result<Vec<Collection>, AppError> {
        storage::repo::list_collections(&self.conn)
    }

    pub fn get_collection(&self, id: i64) -> Result<Collection, AppError> {
        storage::repo::get_collection(&self.conn, id)
    }

    pub fn update_collection(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
        scheduler: Option<SchedulerModel>,
    ) -> Result<Collection, AppError> {
        storage::repo::update_collection(&self.conn, id, name, description, scheduler)
    }

    pub fn delete_collection(&self, id: i64) -> Result<(), AppError> {
        storage::repo::delete_collection(&self.conn, id)
    }

    pub fn collection_overview(
        &self,
        id: i64,
        date: TrainingDate,
    ) -> Result<CollectionOverview, AppError> {
        storage::repo::collection_overview(&self.conn, id, date)
    }

    // ── Card operations ──────────────────────────────────────────────────

    /// Add a single card to a collection. Returns the new card's ID.
    pub fn add_card(&self, collection_id: i64, card: &NewCard) -> Result<i64, AppError> {
        storage::repo::add_card(&self.conn, collection_id, card)
    }

    /// Add multiple cards in a single transaction. Returns their IDs.
    pub fn add_cards(&self, collection_id: i64, cards: &[NewCard]) -> Result<Vec<i64>, AppError> {
        storage::repo::add_cards(&self.conn, collection_id, cards)
    }

    /// Import cards, skipping duplicates (matched by front and back).
    pub fn import_cards(
        &self,
        collection_id: i64,
        cards: &[NewCard],
    ) -> Result<ImportResult, AppError> {
        storage::repo::import_cards(&self.conn, collection_id, cards)
    }

    pub fn get_card(&self, card_id: i64) -> Result<Card, AppError> {
        storage::repo::get_card(&self.conn, card_id)
    }

    pub fn list_cards(&self, collection_id: i64) -> Result<Vec<Card>, AppError> {
        storage::repo::get_collection(&self.conn, collection_id)?;
        storage::repo::list_cards(&self.conn, collection_id)
    }

    pub fn edit_card(
        &self,
        card_id: i64,
        front: Option<&str>,
        back: Option<&str>,
        media: Option<&CardMedia>,
    ) -> Result<Card, AppError> {
        storage::repo::edit_card(&self.conn, card_id, front, back, media)
    }

    pub fn set_card_hidden(&self, card_id: i64, hide: bool) -> Result<Card, AppError> {
        storage::repo::set_card_hidden(&self.conn, card_id, hide)
    }

    pub fn delete_card(&self, card_id: i64) -> Result<(), AppError> {
        storage::repo::delete_card(&self.conn, card_id)
    }

    /// Review history of a card, newest first.
    pub fn card_history(&self, card_id: i64) -> Result<Vec<ReviewLog>, AppError> {
        storage::repo::card_history(&self.conn, card_id)
    }

    // ── Training operations ──────────────────────────────────────────────

    pub fn start_or_resume_session(
        &self,
        collection_id: i64,
        date: TrainingDate,
        now: DateTime<Utc>,
    ) -> Result<SessionView, AppError> {
        training::start_or_resume_session(&self.conn, collection_id, date, now)
    }

    pub fn next_card(&self, session_id: i64) -> Result<Option<QueuedCard>, AppError> {
        training::next_card(&self.conn, session_id)
    }

    pub fn submit_grade(
        &self,
        session_id: i64,
        card_id: i64,
        grade: Grade,
        now: DateTime<Utc>,
        review_duration_ms: i64,
    ) -> Result<Session, AppError> {
        training::submit_grade(
            &self.conn,
            &self.settings,
            session_id,
            card_id,
            grade,
            now,
            review_duration_ms,
        )
    }

    pub fn postpone_card(&self, session_id: i64, card_id: i64) -> Result<Session, AppError> {
        training::postpone_card(&self.conn, session_id, card_id)
    }

    pub fn complete_session(&self, session_id: i64) -> Result<Session, AppError> {
        training::complete_session(&self.conn, session_id)
    }

    pub fn reset_session(&self, session_id: i64) -> Result<Session, AppError> {
        training::reset_session(&self.conn, session_id)
    }

    pub fn get_session(&self, session_id: i64) -> Result<Session, AppError> {
        storage::sessions::get_session(&self.conn, session_id)
    }

    /// Recent sessions of a collection, newest first.
    pub fn list_sessions(&self, collection_id: i64, limit: u32) -> Result<Vec<Session>, AppError> {
        storage::repo::get_collection(&self.conn, collection_id)?;
        storage::sessions::list_sessions(&self.conn, collection_id, limit)
    }

    pub fn get_training_data(&self, collection_id: i64) -> Result<CollectionTrainingData, AppError> {
        training::get_training_data(&self.conn, collection_id)
    }

    pub fn update_training_data(
        &self,
        data: &CollectionTrainingData,
    ) -> Result<CollectionTrainingData, AppError> {
        training::update_training_data(&self.conn, data)
    }

    // ── Statistics ───────────────────────────────────────────────────────

    pub fn collection_reviews(
        &self,
        collection_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReviewLog>, AppError> {
        storage::repo::collection_reviews(&self.conn, collection_id, from, to)
    }

    pub fn collection_stats(
        &self,
        collection_id: i64,
        today: TrainingDate,
        days: u32,
    ) -> Result<CollectionStats, AppError> {
        stats::collection_stats(&self.conn, collection_id, today, days)
    }

    pub fn weekly_activity(
        &self,
        collection_id: i64,
        today: TrainingDate,
        weeks: u32,
    ) -> Result<Vec<Vec<stats::DayCount>>, AppError> {
        storage::repo::get_collection(&self.conn, collection_id)?;
        stats::weekly_activity(&self.conn, collection_id, today, weeks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    /// End-to-end through the facade: build a day's session, study it, finish it,
    /// and see the next day's review come due.
    #[test]
    fn a_day_of_training_round_trip() {
        let kbox = Kbox::in_memory().unwrap();
        let c = kbox.create_collection("verbs", None, None).unwrap();
        assert_eq!(c.scheduler, SchedulerModel::Fsrs);
        kbox.add_cards(c.id, &[NewCard::text("ser", "to be"), NewCard::text("ir", "to go")])
            .unwrap();

        let now = at("2024-05-01T09:00:00Z");
        let today = TrainingDate::of(now);
        let view = kbox.start_or_resume_session(c.id, today, now).unwrap();
        let sid = view.session.id;

        while let Some(next) = kbox.next_card(sid).unwrap() {
            kbox.submit_grade(sid, next.card.id, Grade::Easy, now, 1500).unwrap();
        }
        let done = kbox.complete_session(sid).unwrap();
        assert_eq!(done.total_views, 2);

        let stats = kbox.collection_stats(c.id, today, 7).unwrap();
        assert_eq!(stats.overview.review, 2);
        assert_eq!(stats.grades.easy, 2);
        assert_eq!(stats.training.streak, 1);
        assert_eq!(stats.activity.last().map(|d| d.count), Some(2));

        let history = kbox.collection_reviews(c.id, today.start(), today.end()).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn legacy_collections_use_the_ease_model() {
        let kbox = Kbox::in_memory().unwrap();
        let c = kbox
            .create_collection("legacy", None, Some(SchedulerModel::Legacy))
            .unwrap();
        let id = kbox.add_card(c.id, &NewCard::text("a", "b")).unwrap();
        let now = at("2024-05-01T09:00:00Z");
        let sid = kbox
            .start_or_resume_session(c.id, TrainingDate::of(now), now)
            .unwrap()
            .session
            .id;
        kbox.submit_grade(sid, id, Grade::Easy, now, 0).unwrap();

        let card = kbox.get_card(id).unwrap();
        assert_eq!(card.learning.interval_days, 4);
        assert_eq!(card.learning.stability, None);
    }

    #[test]
    fn listing_cards_of_missing_collection_is_not_found() {
        let kbox = Kbox::in_memory().unwrap();
        assert!(matches!(
            kbox.list_cards(42),
            Err(AppError::CollectionNotFound(42))
        ));
    }
}
