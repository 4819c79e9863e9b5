//! Scheduling policy: the learning ladders shared by both memory models, and a
//! `Scheduler` tagged over the model a collection uses. Pure; `now` is always
//! passed in.

pub mod fsrs;
pub mod sm2;

use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;
use crate::model::{CardState, Grade, LearningState, SchedulerModel};

use self::fsrs::FsrsModel;
use self::sm2::LegacyModel;

/// Sub-day steps a card walks before (re)graduating to Review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningSteps(Vec<u32>);

impl LearningSteps {
    pub fn from_minutes(minutes: &[u32]) -> Result<Self, AppError> {
        if minutes.is_empty() {
            return Err(AppError::Validation(
                "learning steps must contain at least one step".into(),
            ));
        }
        if minutes.contains(&0) {
            return Err(AppError::Validation(
                "learning steps must be at least one minute".into(),
            ));
        }
        Ok(Self(minutes.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn minutes(&self) -> &[u32] {
        &self.0
    }

    /// Duration of step `i`; out-of-range steps fall back to the last one.
    pub fn step(&self, i: usize) -> Duration {
        let m = self
            .0
            .get(i)
            .or_else(|| self.0.last())
            .copied()
            .unwrap_or(1);
        Duration::minutes(i64::from(m))
    }
}

impl Default for LearningSteps {
    fn default() -> Self {
        Self(vec![1, 10])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub learning_steps: LearningSteps,
    pub relearning_steps: LearningSteps,
    pub request_retention: f64,
    pub maximum_interval_days: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            learning_steps: LearningSteps::default(),
            relearning_steps: LearningSteps::default(),
            request_retention: 0.9,
            maximum_interval_days: 36_500,
        }
    }
}

pub enum MemoryModel {
    Legacy(LegacyModel),
    Fsrs(FsrsModel),
}

/// Outcome of grading one card.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledReview {
    pub next: LearningState,
    pub due: DateTime<Utc>,
    /// State the card was in when graded; what the review log records.
    pub previous_state: CardState,
}

pub struct Scheduler {
    model: MemoryModel,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(model: SchedulerModel, settings: &SchedulerSettings) -> Self {
        let model = match model {
            SchedulerModel::Legacy => MemoryModel::Legacy(LegacyModel),
            SchedulerModel::Fsrs => MemoryModel::Fsrs(FsrsModel::new(settings.request_retention)),
        };
        Self {
            model,
            settings: settings.clone(),
        }
    }

    pub fn schedule(&self, current: &LearningState, grade: Grade, now: DateTime<Utc>) -> ScheduledReview {
        let previous_state = current.state;
        let mut next = current.clone();

        next.reps += 1;
        match grade {
            Grade::Again => next.failed_repeats += 1,
            Grade::Good | Grade::Easy => next.successful_repeats += 1,
            Grade::Hard => {}
        }
        next.prev_repeat_time = Some(now);

        match &self.model {
            MemoryModel::Fsrs(m) => {
                let (stability, difficulty) = m.next_memory(current, grade, now);
                next.stability = Some(stability);
                next.difficulty = Some(difficulty);
            }
            MemoryModel::Legacy(m) => {
                next.ease_factor = m.next_ease(previous_state, current.ease_factor, grade);
            }
        }

        let due = match previous_state {
            CardState::New | CardState::Learning | CardState::Relearning => {
                let ladder_state = if previous_state == CardState::Relearning {
                    CardState::Relearning
                } else {
                    CardState::Learning
                };
                let ladder = self.ladder(ladder_state);
                let step = if previous_state == CardState::New {
                    0
                } else {
                    (current.learning_step as usize).min(ladder.len().saturating_sub(1))
                };
                match grade {
                    Grade::Again => self.enter_ladder(&mut next, ladder_state, 0, now),
                    Grade::Hard | Grade::Good if step + 1 < ladder.len() => {
                        self.enter_ladder(&mut next, ladder_state, step + 1, now)
                    }
                    _ => {
                        let days = self.graduating_interval(ladder_state, grade, &next);
                        self.enter_review(&mut next, days, now)
                    }
                }
            }
            CardState::Review => match grade {
                Grade::Again => {
                    next.lapses += 1;
                    self.enter_ladder(&mut next, CardState::Relearning, 0, now)
                }
                _ => {
                    let days = self.review_interval(current, grade, &next);
                    self.enter_review(&mut next, days, now)
                }
            },
        };

        next.repeat_time = Some(due);
        ScheduledReview {
            next,
            due,
            previous_state,
        }
    }

    fn ladder(&self, state: CardState) -> &LearningSteps {
        match state {
            CardState::Relearning => &self.settings.relearning_steps,
            _ => &self.settings.learning_steps,
        }
    }

    fn enter_ladder(&self, next: &mut LearningState, state: CardState, step: usize, now: DateTime<Utc>) -> DateTime<Utc> {
        next.state = state;
        next.learning_step = step as u32;
        next.interval_days = 0;
        now + self.ladder(state).step(step)
    }

    fn enter_review(&self, next: &mut LearningState, days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        next.state = CardState::Review;
        next.learning_step = 0;
        next.interval_days = days;
        now + Duration::days(i64::from(days))
    }

    fn graduating_interval(&self, ladder: CardState, grade: Grade, next: &LearningState) -> u32 {
        match &self.model {
            MemoryModel::Legacy(m) => self.clamp_days(f64::from(m.graduating_interval(ladder, grade))),
            MemoryModel::Fsrs(m) => self.clamp_days(m.interval_days(next.stability.unwrap_or(fsrs::STABILITY_FLOOR))),
        }
    }

    fn review_interval(&self, current: &LearningState, grade: Grade, next: &LearningState) -> u32 {
        match &self.model {
            MemoryModel::Legacy(m) => self.clamp_days(f64::from(m.review_interval(
                current.interval_days,
                current.ease_factor,
                grade,
            ))),
            MemoryModel::Fsrs(m) => self.clamp_days(m.interval_days(next.stability.unwrap_or(fsrs::STABILITY_FLOOR))),
        }
    }

    /// Whole days in `[1, maximum_interval_days]`.
    fn clamp_days(&self, raw: f64) -> u32 {
        let max = self.settings.maximum_interval_days.max(1);
        if !raw.is_finite() {
            return 1;
        }
        raw.round().clamp(1.0, f64::from(max)) as u32
    }
}
