use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Ease a card starts with under the legacy model.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;

/// Learning phase of a card. Stored as 0=New, 1=Learning, 2=Review, 3=Relearning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn to_u8(self) -> u8 {
        match self {
            CardState::New => 0,
            CardState::Learning => 1,
            CardState::Review => 2,
            CardState::Relearning => 3,
        }
    }

    pub fn from_u8(s: u8) -> CardState {
        match s {
            1 => CardState::Learning,
            2 => CardState::Review,
            3 => CardState::Relearning,
            _ => CardState::New,
        }
    }

    /// Learning and Relearning both walk a short-interval ladder.
    pub fn on_ladder(self) -> bool {
        matches!(self, CardState::Learning | CardState::Relearning)
    }
}

/// Self-assessed recall quality, ordered `Again < Hard < Good < Easy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Grade {
    pub fn from_u32(g: u32) -> Result<Grade, AppError> {
        match g {
            1 => Ok(Grade::Again),
            2 => Ok(Grade::Hard),
            3 => Ok(Grade::Good),
            4 => Ok(Grade::Easy),
            _ => Err(AppError::InvalidGrade(g)),
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Good and Easy count as successful responses.
    pub fn is_success(self) -> bool {
        self >= Grade::Good
    }
}

impl FromStr for Grade {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" => Ok(Grade::Again),
            "hard" => Ok(Grade::Hard),
            "good" => Ok(Grade::Good),
            "easy" => Ok(Grade::Easy),
            other => match other.parse::<u32>() {
                Ok(n) => Grade::from_u32(n),
                Err(_) => Err(AppError::Validation(format!("unknown grade '{other}'"))),
            },
        }
    }
}

/// Which memory model schedules the cards of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerModel {
    Legacy,
    #[default]
    Fsrs,
}

impl SchedulerModel {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerModel::Legacy => "legacy",
            SchedulerModel::Fsrs => "fsrs",
        }
    }
}

impl FromStr for SchedulerModel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "sm2" => Ok(SchedulerModel::Legacy),
            "fsrs" => Ok(SchedulerModel::Fsrs),
            other => Err(AppError::Validation(format!(
                "unknown scheduler model '{other}', expected 'fsrs' or 'legacy'"
            ))),
        }
    }
}

/// A calendar day (UTC). Sessions are keyed by it, never by a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingDate(NaiveDate);

impl TrainingDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Strip the time of day from an instant.
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self(instant.date_naive())
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    pub fn previous(self) -> Self {
        Self(self.0 - Duration::days(1))
    }

    pub fn start(self) -> DateTime<Utc> {
        self.0.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// First instant of the following day; "due today" means strictly before it.
    pub fn end(self) -> DateTime<Utc> {
        self.start() + Duration::days(1)
    }
}

impl fmt::Display for TrainingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for TrainingDate {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(TrainingDate)
            .map_err(|e| AppError::Validation(format!("invalid date '{s}': {e}")))
    }
}

/// Everything the scheduler reads and writes for one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    pub state: CardState,
    pub learning_step: u32,
    pub ease_factor: f64,
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    /// Whole days until the next review; 0 while on a learning ladder.
    pub interval_days: u32,
    pub repeat_time: Option<DateTime<Utc>>,
    pub prev_repeat_time: Option<DateTime<Utc>>,
    pub successful_repeats: u32,
    pub failed_repeats: u32,
    pub reps: u32,
    pub lapses: u32,
}

impl Default for LearningState {
    fn default() -> Self {
        Self {
            state: CardState::New,
            learning_step: 0,
            ease_factor: INITIAL_EASE_FACTOR,
            stability: None,
            difficulty: None,
            interval_days: 0,
            repeat_time: None,
            prev_repeat_time: None,
            successful_repeats: 0,
            failed_repeats: 0,
            reps: 0,
            lapses: 0,
        }
    }
}

/// Media references owned by the media subsystem; cards only hold their ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardMedia {
    #[serde(default)]
    pub front_image: Option<i64>,
    #[serde(default)]
    pub back_image: Option<i64>,
    #[serde(default)]
    pub front_audio: Option<i64>,
    #[serde(default)]
    pub back_audio: Option<i64>,
}

/// A flashcard together with its ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub collection_id: i64,
    pub front: String,
    pub back: String,
    #[serde(flatten)]
    pub media: CardMedia,
    pub hide: bool,
    pub priority: i64,
    #[serde(flatten)]
    pub learning: LearningState,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.learning.repeat_time.is_some_and(|due| due <= now)
    }
}

/// Card content as supplied by callers (CLI, bulk insert, import).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCard {
    pub front: String,
    pub back: String,
    #[serde(flatten, default)]
    pub media: CardMedia,
    #[serde(default)]
    pub priority: i64,
}

impl NewCard {
    pub fn text(front: &str, back: &str) -> Self {
        Self {
            front: front.to_string(),
            back: back.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub scheduler: SchedulerModel,
    pub card_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Daily quotas plus the cumulative counters of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionTrainingData {
    pub collection_id: i64,
    pub max_new_cards: u32,
    pub max_review_cards: u32,
    pub max_learning_cards: u32,
    pub total_card_views: i64,
    pub total_success_responses: i64,
    pub total_failed_responses: i64,
    pub total_score: i64,
    pub streak: u32,
    pub last_training_date: Option<TrainingDate>,
}

/// Upper bound accepted for any daily quota.
pub const MAX_DAILY_QUOTA: u32 = 9_999;

impl CollectionTrainingData {
    pub fn quotas(&self) -> DailyQuotas {
        DailyQuotas {
            max_new_cards: self.max_new_cards,
            max_review_cards: self.max_review_cards,
            max_learning_cards: self.max_learning_cards,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.quotas().validate()
    }
}

/// Per-day caps on each card category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyQuotas {
    pub max_new_cards: u32,
    pub max_review_cards: u32,
    pub max_learning_cards: u32,
}

impl Default for DailyQuotas {
    fn default() -> Self {
        Self {
            max_new_cards: 20,
            max_review_cards: 50,
            max_learning_cards: 10,
        }
    }
}

impl DailyQuotas {
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, value) in [
            ("max_new_cards", self.max_new_cards),
            ("max_review_cards", self.max_review_cards),
            ("max_learning_cards", self.max_learning_cards),
        ] {
            if value > MAX_DAILY_QUOTA {
                return Err(AppError::Validation(format!(
                    "{name} must be at most {MAX_DAILY_QUOTA}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Stored as 0=Started, 1=Completed, -1=Abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Started,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn to_i64(self) -> i64 {
        match self {
            SessionStatus::Started => 0,
            SessionStatus::Completed => 1,
            SessionStatus::Abandoned => -1,
        }
    }

    pub fn from_i64(s: i64) -> SessionStatus {
        match s {
            1 => SessionStatus::Completed,
            -1 => SessionStatus::Abandoned,
            _ => SessionStatus::Started,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub collection_id: i64,
    pub training_date: TrainingDate,
    pub status: SessionStatus,
    pub new_cards: u32,
    pub review_cards: u32,
    pub learning_cards: u32,
    pub total_views: u32,
    pub success_responses: u32,
    pub failed_responses: u32,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

/// Stored as 0=Pending, 1=Resolved, 2=Postponed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionCardStatus {
    Pending,
    Resolved,
    Postponed,
}

impl SessionCardStatus {
    pub fn to_u8(self) -> u8 {
        match self {
            SessionCardStatus::Pending => 0,
            SessionCardStatus::Resolved => 1,
            SessionCardStatus::Postponed => 2,
        }
    }

    pub fn from_u8(s: u8) -> SessionCardStatus {
        match s {
            1 => SessionCardStatus::Resolved,
            2 => SessionCardStatus::Postponed,
            _ => SessionCardStatus::Pending,
        }
    }
}

/// One occurrence of a card in a session's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCard {
    pub id: i64,
    pub session_id: i64,
    pub card_id: i64,
    pub position: i64,
    pub planned_review_time: DateTime<Utc>,
    pub status: SessionCardStatus,
}

/// What `start_or_resume_session` hands back: the session and its pending queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session: Session,
    pub queue: Vec<SessionCard>,
}

/// The head of a session's queue joined with its card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedCard {
    pub occurrence: SessionCard,
    pub card: Card,
}

/// One grading event. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLog {
    pub id: i64,
    pub card_id: i64,
    /// State the card was in when it was graded.
    pub card_state: CardState,
    pub grade: Grade,
    pub review_duration_ms: i64,
    pub scheduled_review_time: DateTime<Utc>,
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    pub ease_factor: f64,
    pub created_at: DateTime<Utc>,
}

/// Result of an import operation (returned as JSON).
#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub total: usize,
}

/// Card counts of a collection, by learning phase.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionOverview {
    pub collection_id: i64,
    pub total: u32,
    pub new: u32,
    pub learning: u32,
    pub review: u32,
    pub relearning: u32,
    pub hidden: u32,
    pub due: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_parses_names_and_numbers() {
        assert_eq!("again".parse::<Grade>().unwrap(), Grade::Again);
        assert_eq!(" Easy ".parse::<Grade>().unwrap(), Grade::Easy);
        assert_eq!("3".parse::<Grade>().unwrap(), Grade::Good);
        assert!(matches!(
            "5".parse::<Grade>().unwrap_err(),
            AppError::InvalidGrade(5)
        ));
        assert!(matches!(
            "meh".parse::<Grade>().unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn grades_are_ordered_and_success_starts_at_good() {
        assert!(Grade::Again < Grade::Hard && Grade::Hard < Grade::Good && Grade::Good < Grade::Easy);
        assert!(!Grade::Hard.is_success());
        assert!(Grade::Good.is_success());
    }

    #[test]
    fn training_date_strips_time_and_bounds_the_day() {
        let instant = DateTime::parse_from_rfc3339("2024-03-10T23:59:59Z")
            .unwrap()
            .with_timezone(&Utc);
        let day = TrainingDate::of(instant);
        assert_eq!(day.to_string(), "2024-03-10");
        assert!(instant < day.end());
        assert_eq!(day.end(), day.start() + Duration::days(1));
        assert_eq!(day.previous().to_string(), "2024-03-09");
        assert_eq!("2024-03-10".parse::<TrainingDate>().unwrap(), day);
    }

    #[test]
    fn quotas_above_the_limit_are_rejected() {
        let mut data = CollectionTrainingData {
            collection_id: 1,
            max_new_cards: 20,
            max_review_cards: 50,
            max_learning_cards: 10,
            total_card_views: 0,
            total_success_responses: 0,
            total_failed_responses: 0,
            total_score: 0,
            streak: 0,
            last_training_date: None,
        };
        assert!(data.validate().is_ok());
        data.max_review_cards = MAX_DAILY_QUOTA + 1;
        assert!(matches!(data.validate(), Err(AppError::Validation(_))));
    }
}
