//! Legacy ease-factor model: a linear ease per card that multiplies the
//! previous interval on every successful review.

use crate::model::{CardState, Grade, INITIAL_EASE_FACTOR};

pub const MIN_EASE_FACTOR: f64 = 1.3;

const LAPSE_EASE_PENALTY: f64 = 0.4;
const HARD_EASE_PENALTY: f64 = 0.15;
const EASY_EASE_BONUS: f64 = 0.15;

const HARD_INTERVAL_FACTOR: f64 = 1.2;
const EASY_INTERVAL_BONUS: f64 = 1.3;

const GRADUATING_INTERVAL: u32 = 1;
const EASY_GRADUATING_INTERVAL: u32 = 4;
const EASY_RELEARNED_INTERVAL: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyModel;

impl LegacyModel {
    /// Ease only moves on grades given to Review cards; ladder grades leave it alone.
    pub fn next_ease(&self, state: CardState, ease: f64, grade: Grade) -> f64 {
        let ease = if ease.is_finite() { ease } else { INITIAL_EASE_FACTOR };
        let next = if state == CardState::Review {
            match grade {
                Grade::Again => ease - LAPSE_EASE_PENALTY,
                Grade::Hard => ease - HARD_EASE_PENALTY,
                Grade::Good => ease,
                Grade::Easy => ease + EASY_EASE_BONUS,
            }
        } else {
            ease
        };
        next.max(MIN_EASE_FACTOR)
    }

    /// First Review interval after leaving a ladder.
    pub fn graduating_interval(&self, ladder: CardState, grade: Grade) -> u32 {
        match (ladder, grade) {
            (CardState::Relearning, Grade::Easy) => EASY_RELEARNED_INTERVAL,
            (_, Grade::Easy) => EASY_GRADUATING_INTERVAL,
            _ => GRADUATING_INTERVAL,
        }
    }

    /// Next Review interval from the previous one and the ease before this grade.
    /// Hard grows sub-linearly, Good by the ease, Easy by the ease times a
    /// bonus, and each is at least one day longer than the one below it.
    pub fn review_interval(&self, prev_interval: u32, prior_ease: f64, grade: Grade) -> u32 {
        let p = f64::from(prev_interval.max(1));
        let prior_ease = prior_ease.max(MIN_EASE_FACTOR);
        let good = (p * prior_ease).round().max(p + 1.0);
        let days = match grade {
            Grade::Again => 1.0,
            Grade::Hard => (p * HARD_INTERVAL_FACTOR).round().max(p + 1.0),
            Grade::Good => good,
            Grade::Easy => (p * prior_ease * EASY_INTERVAL_BONUS).round().max(good + 1.0),
        };
        days.min(f64::from(u32::MAX)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_intervals_from_a_six_day_card() {
        let m = LegacyModel;
        assert_eq!(m.review_interval(6, 2.5, Grade::Hard), 7);
        assert_eq!(m.review_interval(6, 2.5, Grade::Good), 15);
        assert_eq!(m.review_interval(6, 2.5, Grade::Easy), 20);
    }

    #[test]
    fn easy_stays_ahead_of_good_at_the_ease_floor() {
        let m = LegacyModel;
        let good = m.review_interval(1, MIN_EASE_FACTOR, Grade::Good);
        assert_eq!(good, 2);
        assert_eq!(m.review_interval(1, MIN_EASE_FACTOR, Grade::Easy), 3);
    }

    #[test]
    fn ease_moves_only_for_review_cards() {
        let m = LegacyModel;
        assert_eq!(m.next_ease(CardState::Learning, 2.5, Grade::Again), 2.5);
        assert!((m.next_ease(CardState::Review, 2.5, Grade::Again) - 2.1).abs() < 1e-9);
        assert!((m.next_ease(CardState::Review, 2.5, Grade::Hard) - 2.35).abs() < 1e-9);
        assert!((m.next_ease(CardState::Review, 2.5, Grade::Easy) - 2.65).abs() < 1e-9);
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let m = LegacyModel;
        assert_eq!(m.next_ease(CardState::Review, 1.4, Grade::Again), MIN_EASE_FACTOR);
        assert_eq!(m.next_ease(CardState::Review, f64::NAN, Grade::Good), INITIAL_EASE_FACTOR);
    }

    #[test]
    fn zero_previous_interval_still_grows() {
        let m = LegacyModel;
        assert!(m.review_interval(0, MIN_EASE_FACTOR, Grade::Hard) >= 2);
    }

    #[test]
    fn graduation_intervals() {
        let m = LegacyModel;
        assert_eq!(m.graduating_interval(CardState::Learning, Grade::Good), 1);
        assert_eq!(m.graduating_interval(CardState::Learning, Grade::Easy), 4);
        assert_eq!(m.graduating_interval(CardState::Relearning, Grade::Easy), 2);
    }
}
