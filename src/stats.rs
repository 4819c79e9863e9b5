//! Review-activity statistics built from the review log. Data only; nothing
//! here renders.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::AppError;
use crate::model::{CollectionOverview, CollectionTrainingData, Grade, TrainingDate};
use crate::storage::{repo, ts};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub date: TrainingDate,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GradeDistribution {
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl GradeDistribution {
    pub fn total(&self) -> u32 {
        self.again + self.hard + self.good + self.easy
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub overview: CollectionOverview,
    pub training: CollectionTrainingData,
    pub grades: GradeDistribution,
    pub activity: Vec<DayCount>,
}

/// Widest activity window `daily_review_counts` accepts, about ten years.
pub const MAX_ACTIVITY_DAYS: u32 = 3660;
/// Widest window `weekly_activity` accepts.
pub const MAX_ACTIVITY_WEEKS: u32 = MAX_ACTIVITY_DAYS / 7;

fn window_start(today: TrainingDate, span: Duration) -> Result<TrainingDate, AppError> {
    today
        .date()
        .checked_sub_signed(span)
        .map(TrainingDate::new)
        .ok_or_else(|| AppError::Validation(format!("activity window before {today} is out of range")))
}

fn counts_by_day(
    conn: &Connection,
    collection_id: i64,
    start: TrainingDate,
    end: TrainingDate,
) -> Result<BTreeMap<String, u32>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT substr(r.created_at, 1, 10) AS d, COUNT(*)
         FROM review_log r
         JOIN cards c ON c.id = r.card_id
         WHERE c.collection_id = ?1 AND r.created_at >= ?2 AND r.created_at < ?3
         GROUP BY d",
    )?;
    let rows = stmt
        .query_map(
            params![collection_id, ts(start.start()), ts(end.end())],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
        )?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

fn fill_days(counts: &BTreeMap<String, u32>, start: TrainingDate, end: TrainingDate) -> Vec<DayCount> {
    let mut filled = Vec::new();
    let mut d = start.date();
    while d <= end.date() {
        let date = TrainingDate::new(d);
        let count = counts.get(&date.to_string()).copied().unwrap_or(0);
        filled.push(DayCount { date, count });
        d += Duration::days(1);
    }
    filled
}

/// Reviews per day for the `days` days up to and including `today`, with
/// empty days filled in.
pub fn daily_review_counts(
    conn: &Connection,
    collection_id: i64,
    today: TrainingDate,
    days: u32,
) -> Result<Vec<DayCount>, AppError> {
    if days > MAX_ACTIVITY_DAYS {
        return Err(AppError::Validation(format!(
            "days must be at most {MAX_ACTIVITY_DAYS}, got {days}"
        )));
    }
    let start = window_start(today, Duration::days(i64::from(days.max(1)) - 1))?;
    let counts = counts_by_day(conn, collection_id, start, today)?;
    Ok(fill_days(&counts, start, today))
}

/// Daily counts over the last `weeks` weeks, grouped into Monday-first weeks.
/// The last week stops at `today`.
pub fn weekly_activity(
    conn: &Connection,
    collection_id: i64,
    today: TrainingDate,
    weeks: u32,
) -> Result<Vec<Vec<DayCount>>, AppError> {
    if weeks > MAX_ACTIVITY_WEEKS {
        return Err(AppError::Validation(format!(
            "weeks must be at most {MAX_ACTIVITY_WEEKS}, got {weeks}"
        )));
    }
    let since_monday = i64::from(today.date().weekday().num_days_from_monday());
    let start = window_start(
        today,
        Duration::days(since_monday) + Duration::weeks(i64::from(weeks.max(1)) - 1),
    )?;
    let counts = counts_by_day(conn, collection_id, start, today)?;

    let mut grouped: Vec<Vec<DayCount>> = Vec::new();
    for day in fill_days(&counts, start, today) {
        if day.date.date().weekday().num_days_from_monday() == 0 || grouped.is_empty() {
            grouped.push(Vec::with_capacity(7));
        }
        if let Some(week) = grouped.last_mut() {
            week.push(day);
        }
    }
    Ok(grouped)
}

pub fn grade_distribution(conn: &Connection, collection_id: i64) -> Result<GradeDistribution, AppError> {
    let mut stmt = conn.prepare(
        "SELECT r.grade, COUNT(*) FROM review_log r
         JOIN cards c ON c.id = r.card_id
         WHERE c.collection_id = ?1
         GROUP BY r.grade",
    )?;
    let rows = stmt
        .query_map(params![collection_id], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut dist = GradeDistribution::default();
    for (grade, count) in rows {
        match Grade::from_u32(grade) {
            Ok(Grade::Again) => dist.again = count,
            Ok(Grade::Hard) => dist.hard = count,
            Ok(Grade::Good) => dist.good = count,
            Ok(Grade::Easy) => dist.easy = count,
            Err(_) => {}
        }
    }
    Ok(dist)
}

/// Everything `kbox stats` reports for one collection.
pub fn collection_stats(
    conn: &Connection,
    collection_id: i64,
    today: TrainingDate,
    days: u32,
) -> Result<CollectionStats, AppError> {
    Ok(CollectionStats {
        overview: repo::collection_overview(conn, collection_id, today)?,
        training: repo::get_training_data(conn, collection_id)?,
        grades: grade_distribution(conn, collection_id)?,
        activity: daily_review_counts(conn, collection_id, today, days)?,
    })
}
