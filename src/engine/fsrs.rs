use chrono::{DateTime, Utc};
use rs_fsrs::{Card as FsrsCard, FSRS, Rating, State};

use crate::model::{CardState, Grade, LearningState};

/// Stability never drops below this many days.
pub const STABILITY_FLOOR: f64 = 0.01;

const DECAY: f64 = -0.5;
const FACTOR: f64 = 19.0 / 81.0;

/// Create an FSRS scheduler with the default weights. Fuzz is off in the
/// defaults, so the same inputs always give the same memory state.
pub fn make_fsrs() -> FSRS {
    FSRS::default()
}

/// Memory model backed by `rs-fsrs`: it owns stability and difficulty,
/// while the learning ladder stays with the caller.
pub struct FsrsModel {
    fsrs: FSRS,
    request_retention: f64,
}

impl FsrsModel {
    pub fn new(request_retention: f64) -> Self {
        Self {
            fsrs: make_fsrs(),
            request_retention,
        }
    }

    /// Stability and difficulty after grading a card in `current` at `now`.
    pub fn next_memory(&self, current: &LearningState, grade: Grade, now: DateTime<Utc>) -> (f64, f64) {
        let card = to_fsrs_card(current, now);
        let info = self.fsrs.next(card, now, rating_from_grade(grade));
        (
            clamp_stability(info.card.stability),
            clamp_difficulty(info.card.difficulty),
        )
    }

    /// Days until recall probability decays to the requested retention.
    pub fn interval_days(&self, stability: f64) -> f64 {
        (stability / FACTOR) * (self.request_retention.powf(1.0 / DECAY) - 1.0)
    }
}

pub fn rating_from_grade(grade: Grade) -> Rating {
    match grade {
        Grade::Again => Rating::Again,
        Grade::Hard => Rating::Hard,
        Grade::Good => Rating::Good,
        Grade::Easy => Rating::Easy,
    }
}

pub fn state_to_fsrs(s: CardState) -> State {
    match s {
        CardState::New => State::New,
        CardState::Learning => State::Learning,
        CardState::Review => State::Review,
        CardState::Relearning => State::Relearning,
    }
}

fn clamp_stability(s: f64) -> f64 {
    if s.is_finite() { s.max(STABILITY_FLOOR) } else { STABILITY_FLOOR }
}

fn clamp_difficulty(d: f64) -> f64 {
    if d.is_finite() { d.clamp(1.0, 10.0) } else { 5.0 }
}

/// Present a ledger row to rs-fsrs. A card without a memory state (never
/// reviewed, or scheduled by the legacy model until now) is shown as New so the
/// grade seeds its stability and difficulty.
fn to_fsrs_card(current: &LearningState, now: DateTime<Utc>) -> FsrsCard {
    let last_review = current.prev_repeat_time.unwrap_or(now);
    match (current.stability, current.difficulty) {
        (Some(stability), Some(difficulty)) if stability > 0.0 && current.state != CardState::New => {
            FsrsCard {
                due: current.repeat_time.unwrap_or(now),
                stability,
                difficulty,
                elapsed_days: (now - last_review).num_days().max(0),
                scheduled_days: i64::from(current.interval_days),
                reps: current.reps as i32,
                lapses: current.lapses as i32,
                state: state_to_fsrs(current.state),
                last_review,
            }
        }
        _ => FsrsCard {
            due: now,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            state: State::New,
            last_review: now,
        },
    }
}
