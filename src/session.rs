//! Session builder: picks the cards of one collection for one day and plans
//! their order. Pure; storage happens in `training`.

use chrono::{DateTime, Duration, Utc};

use crate::model::{Card, CardState, CollectionTrainingData, Grade, TrainingDate};

/// Upper bound on the gap between two planned reviews.
const MAX_SPACING_SECS: i64 = 20;
/// The whole queue is spread over at most this window.
const PLANNING_WINDOW_SECS: i64 = 20 * 60;

const VIEW_SCORE: i64 = 1;
const NEW_SUCCESS_SCORE: i64 = 10;
const REVIEW_SUCCESS_SCORE: i64 = 3;
const LEARNING_SUCCESS_SCORE: i64 = 1;

/// One card placed in a planned session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCard {
    pub card_id: i64,
    pub position: i64,
    pub planned_review_time: DateTime<Utc>,
}

/// The selection for a new session, computed before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub new_cards: u32,
    pub review_cards: u32,
    pub learning_cards: u32,
    pub queue: Vec<PlannedCard>,
}

impl SessionPlan {
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Select due cards under the collection's quotas.
///
/// Learning and relearning cards come first (due by `now`), then review cards
/// due before the end of `date`, then new cards by priority. Hidden cards are
/// never selected.
pub fn plan_session(
    cards: &[Card],
    quotas: &CollectionTrainingData,
    date: TrainingDate,
    now: DateTime<Utc>,
) -> SessionPlan {
    let end_of_day = date.end();
    let visible = || cards.iter().filter(|c| !c.hide);

    let mut learning: Vec<&Card> = visible()
        .filter(|c| c.learning.state.on_ladder())
        .filter(|c| c.learning.repeat_time.is_some_and(|t| t <= now))
        .collect();
    learning.sort_by_key(|c| (c.learning.repeat_time, c.id));
    learning.truncate(quotas.max_learning_cards as usize);

    let mut review: Vec<&Card> = visible()
        .filter(|c| c.learning.state == CardState::Review)
        .filter(|c| c.learning.repeat_time.is_some_and(|t| t < end_of_day))
        .collect();
    review.sort_by_key(|c| (c.learning.repeat_time, c.id));
    review.truncate(quotas.max_review_cards as usize);

    let mut new: Vec<&Card> = visible()
        .filter(|c| c.learning.state == CardState::New)
        .collect();
    new.sort_by_key(|c| (c.priority, c.id));
    new.truncate(quotas.max_new_cards as usize);

    let ordered: Vec<i64> = learning
        .iter()
        .chain(review.iter())
        .chain(new.iter())
        .map(|c| c.id)
        .collect();
    let spacing = spacing_for(ordered.len());

    let queue = ordered
        .into_iter()
        .enumerate()
        .map(|(i, card_id)| PlannedCard {
            card_id,
            position: i as i64,
            planned_review_time: now + spacing * i as i32,
        })
        .collect();

    SessionPlan {
        new_cards: new.len() as u32,
        review_cards: review.len() as u32,
        learning_cards: learning.len() as u32,
        queue,
    }
}

fn spacing_for(len: usize) -> Duration {
    if len == 0 {
        return Duration::seconds(MAX_SPACING_SECS);
    }
    let spread = PLANNING_WINDOW_SECS / len as i64;
    Duration::seconds(spread.min(MAX_SPACING_SECS))
}

/// Score earned by one view, from the state the card was in when graded.
pub fn score_delta(state: CardState, grade: Grade) -> i64 {
    if !grade.is_success() {
        return VIEW_SCORE;
    }
    VIEW_SCORE
        + match state {
            CardState::New => NEW_SUCCESS_SCORE,
            CardState::Review => REVIEW_SUCCESS_SCORE,
            CardState::Learning | CardState::Relearning => LEARNING_SUCCESS_SCORE,
        }
}

/// Where a failed card goes back into the queue: after the next two pending
/// occurrences, or after the last row when fewer remain.
pub fn requeue_position(pending_positions: &[i64], last_position: i64) -> i64 {
    match pending_positions.get(1) {
        Some(second) => second + 1,
        None => last_position + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LearningState;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn quotas(new: u32, review: u32, learning: u32) -> CollectionTrainingData {
        CollectionTrainingData {
            collection_id: 1,
            max_new_cards: new,
            max_review_cards: review,
            max_learning_cards: learning,
            total_card_views: 0,
            total_success_responses: 0,
            total_failed_responses: 0,
            total_score: 0,
            streak: 0,
            last_training_date: None,
        }
    }

    fn card(id: i64, state: CardState, due: Option<&str>) -> Card {
        Card {
            id,
            collection_id: 1,
            front: format!("front {id}"),
            back: format!("back {id}"),
            media: Default::default(),
            hide: false,
            priority: 0,
            learning: LearningState {
                state,
                repeat_time: due.map(at),
                ..LearningState::default()
            },
            created_at: at("2024-04-01T00:00:00Z"),
        }
    }

    fn ids(plan: &SessionPlan) -> Vec<i64> {
        plan.queue.iter().map(|p| p.card_id).collect()
    }

    #[test]
    fn three_new_cards_fill_a_new_session() {
        let now = at("2024-05-01T09:00:00Z");
        let cards: Vec<Card> = (1..=3).map(|id| card(id, CardState::New, None)).collect();
        let plan = plan_session(&cards, &quotas(10, 50, 10), TrainingDate::of(now), now);
        assert_eq!(plan.new_cards, 3);
        assert_eq!(plan.review_cards, 0);
        assert_eq!(plan.learning_cards, 0);
        assert_eq!(ids(&plan), vec![1, 2, 3]);
    }

    #[test]
    fn quotas_cap_every_category() {
        let now = at("2024-05-01T09:00:00Z");
        let mut cards = Vec::new();
        for id in 1..=5 {
            cards.push(card(id, CardState::New, None));
            cards.push(card(10 + id, CardState::Review, Some("2024-04-30T09:00:00Z")));
            cards.push(card(20 + id, CardState::Learning, Some("2024-05-01T08:00:00Z")));
        }
        let plan = plan_session(&cards, &quotas(2, 3, 1), TrainingDate::of(now), now);
        assert_eq!((plan.new_cards, plan.review_cards, plan.learning_cards), (2, 3, 1));
        assert_eq!(plan.queue.len(), 6);
    }

    #[test]
    fn queue_runs_learning_then_review_then_new() {
        let now = at("2024-05-01T09:00:00Z");
        let cards = vec![
            card(1, CardState::New, None),
            card(2, CardState::Review, Some("2024-05-01T20:00:00Z")),
            card(3, CardState::Relearning, Some("2024-05-01T08:59:00Z")),
            card(4, CardState::Review, Some("2024-04-20T10:00:00Z")),
            card(5, CardState::Learning, Some("2024-05-01T08:00:00Z")),
        ];
        let plan = plan_session(&cards, &quotas(10, 10, 10), TrainingDate::of(now), now);
        assert_eq!(ids(&plan), vec![5, 3, 4, 2, 1]);
        let positions: Vec<i64> = plan.queue.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cards_not_yet_due_are_left_out() {
        let now = at("2024-05-01T09:00:00Z");
        let cards = vec![
            card(1, CardState::Learning, Some("2024-05-01T09:05:00Z")),
            card(2, CardState::Review, Some("2024-05-02T00:00:00Z")),
            card(3, CardState::Review, Some("2024-05-01T23:59:59Z")),
        ];
        let plan = plan_session(&cards, &quotas(10, 10, 10), TrainingDate::of(now), now);
        assert_eq!(ids(&plan), vec![3]);
    }

    #[test]
    fn hidden_cards_are_never_selected() {
        let now = at("2024-05-01T09:00:00Z");
        let mut hidden = card(1, CardState::New, None);
        hidden.hide = true;
        let cards = vec![hidden, card(2, CardState::New, None)];
        let plan = plan_session(&cards, &quotas(10, 10, 10), TrainingDate::of(now), now);
        assert_eq!(ids(&plan), vec![2]);
    }

    #[test]
    fn new_cards_follow_priority_then_creation_order() {
        let now = at("2024-05-01T09:00:00Z");
        let mut urgent = card(3, CardState::New, None);
        urgent.priority = -1;
        let cards = vec![card(2, CardState::New, None), urgent, card(1, CardState::New, None)];
        let plan = plan_session(&cards, &quotas(10, 10, 10), TrainingDate::of(now), now);
        assert_eq!(ids(&plan), vec![3, 1, 2]);
    }

    #[test]
    fn no_eligible_cards_gives_an_empty_plan() {
        let now = at("2024-05-01T09:00:00Z");
        let plan = plan_session(&[], &quotas(10, 10, 10), TrainingDate::of(now), now);
        assert!(plan.is_empty());
        assert_eq!((plan.new_cards, plan.review_cards, plan.learning_cards), (0, 0, 0));
    }

    #[test]
    fn planned_times_are_spaced_from_now() {
        let now = at("2024-05-01T09:00:00Z");
        let cards: Vec<Card> = (1..=3).map(|id| card(id, CardState::New, None)).collect();
        let plan = plan_session(&cards, &quotas(10, 10, 10), TrainingDate::of(now), now);
        assert_eq!(plan.queue[0].planned_review_time, now);
        assert_eq!(plan.queue[2].planned_review_time, now + Duration::seconds(40));
        assert_eq!(spacing_for(120), Duration::seconds(10));
    }

    #[test]
    fn score_rewards_successes_by_state() {
        assert_eq!(score_delta(CardState::New, Grade::Again), 1);
        assert_eq!(score_delta(CardState::New, Grade::Hard), 1);
        assert_eq!(score_delta(CardState::New, Grade::Good), 11);
        assert_eq!(score_delta(CardState::Review, Grade::Easy), 4);
        assert_eq!(score_delta(CardState::Relearning, Grade::Good), 2);
    }

    #[test]
    fn failed_card_goes_after_the_next_two() {
        assert_eq!(requeue_position(&[4, 5, 6], 6), 6);
        assert_eq!(requeue_position(&[4], 4), 5);
        assert_eq!(requeue_position(&[], 3), 4);
    }
}
