//! Spaced repetition per molecule (SM-2 variant).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::{AnswerLog, Id, MoleculeReview, ReviewOutcome};

pub const INITIAL_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 3.0;
const EASE_STEP_UP: f64 = 0.1;
const EASE_STEP_DOWN: f64 = 0.2;

/// Retry delay after a wrong answer.
pub const ERROR_INTERVAL_HOURS: i64 = 8;

/// A review is overdue once it has been due this long.
pub const OVERDUE_AFTER_HOURS: i64 = 24;

/// Intervals at or above this many days count as mastered.
const MASTERED_INTERVAL_DAYS: f64 = 21.0;

/// Success intervals stop growing here.
pub const MAX_INTERVAL_DAYS: f64 = 365.0;

const UPCOMING_REVIEWS: usize = 5;

/// Fresh schedule, due immediately
pub fn new_review(user_id: Id, molecule_id: Id, now: DateTime<Utc>) -> MoleculeReview {
    MoleculeReview {
        user_id,
        molecule_id,
        next_review_at: now,
        last_review_at: None,
        last_error_at: None,
        interval_days: 0.0,
        ease_factor: INITIAL_EASE,
        streak: 0,
        review_count: 0,
        success_count: 0,
        total_errors: 0,
        total_resets: 0,
        last_outcome: None,
    }
}

/// Apply one outcome to a schedule.
pub fn apply(review: &mut MoleculeReview, outcome: ReviewOutcome, now: DateTime<Utc>) {
    match outcome {
        ReviewOutcome::Success => {
            review.review_count += 1;
            review.streak += 1;
            review.success_count += 1;
            review.ease_factor = round_ease((review.ease_factor + EASE_STEP_UP).min(MAX_EASE));
            review.interval_days = match review.review_count {
                1 => 1.0,
                2 => 3.0,
                _ => (review.interval_days * review.ease_factor).clamp(1.0, MAX_INTERVAL_DAYS),
            };
            review.next_review_at = after_days(now, review.interval_days);
            review.last_review_at = Some(now);
        }
        ReviewOutcome::Error => {
            review.review_count += 1;
            review.streak = 0;
            review.total_errors += 1;
            review.ease_factor = round_ease((review.ease_factor - EASE_STEP_DOWN).max(MIN_EASE));
            review.interval_days = ERROR_INTERVAL_HOURS as f64 / 24.0;
            review.next_review_at = now + Duration::hours(ERROR_INTERVAL_HOURS);
            review.last_review_at = Some(now);
            review.last_error_at = Some(now);
        }
        ReviewOutcome::Reset => {
            review.total_resets += 1;
            review.streak = 0;
            review.interval_days = review.interval_days.min(1.0);
            review.next_review_at = review
                .next_review_at
                .min(now + Duration::hours(ERROR_INTERVAL_HOURS));
        }
    }
    review.last_outcome = Some(outcome);
}

fn round_ease(ease: f64) -> f64 {
    (ease * 100.0).round() / 100.0
}

/// `now + interval_days`, saturating at the cap and at the end of the calendar.
fn after_days(now: DateTime<Utc>, interval_days: f64) -> DateTime<Utc> {
    let seconds = (interval_days.min(MAX_INTERVAL_DAYS) * 86_400.0).round() as i64;
    now.checked_add_signed(Duration::seconds(seconds))
        .or_else(|| now.checked_add_signed(Duration::days(MAX_INTERVAL_DAYS as i64)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingReview {
    pub molecule_id: Id,
    pub next_review_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SrsSettings {
    pub initial_ease: f64,
    pub min_ease: f64,
    pub max_ease: f64,
    pub error_interval_hours: i64,
    pub overdue_after_hours: i64,
}

impl Default for SrsSettings {
    fn default() -> Self {
        Self {
            initial_ease: INITIAL_EASE,
            min_ease: MIN_EASE,
            max_ease: MAX_EASE,
            error_interval_hours: ERROR_INTERVAL_HOURS,
            overdue_after_hours: OVERDUE_AFTER_HOURS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedSrsStats {
    pub tracked_molecules: usize,
    pub average_ease: f64,
    pub average_interval_days: f64,
    pub mastered_molecules: usize,
    pub total_reviews: u64,
    pub total_errors: u64,
    pub total_resets: u64,
}

/// Review dashboard for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SrsSummary {
    pub due_count: usize,
    pub overdue_count: usize,
    pub next_reviews: Vec<UpcomingReview>,
    pub retention_7_days: f64,
    pub retention_30_days: f64,
    pub settings: SrsSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_stats: Option<AdvancedSrsStats>,
}

/// Build the summary from stored reviews and answers.
pub fn summarize(
    reviews: &[MoleculeReview],
    answers: &[AnswerLog],
    premium: bool,
    now: DateTime<Utc>,
) -> SrsSummary {
    let overdue_before = now - Duration::hours(OVERDUE_AFTER_HOURS);
    let due_count = reviews.iter().filter(|r| r.next_review_at <= now).count();
    let overdue_count = reviews
        .iter()
        .filter(|r| r.next_review_at < overdue_before)
        .count();

    let mut upcoming: Vec<&MoleculeReview> = reviews.iter().collect();
    upcoming.sort_by_key(|r| (r.next_review_at, r.molecule_id));
    let next_reviews = upcoming
        .into_iter()
        .take(UPCOMING_REVIEWS)
        .map(|r| UpcomingReview {
            molecule_id: r.molecule_id,
            next_review_at: r.next_review_at,
        })
        .collect();

    SrsSummary {
        due_count,
        overdue_count,
        next_reviews,
        retention_7_days: retention(answers, now - Duration::days(7)),
        retention_30_days: retention(answers, now - Duration::days(30)),
        settings: SrsSettings::default(),
        advanced_stats: premium.then(|| advanced(reviews)),
    }
}

/// Share of correct answers since `since`; 0 when there are none
pub fn retention(answers: &[AnswerLog], since: DateTime<Utc>) -> f64 {
    let (correct, total) = answers
        .iter()
        .filter(|a| a.created_at >= since)
        .fold((0u32, 0u32), |(c, t), a| (c + u32::from(a.is_correct), t + 1));
    if total == 0 {
        0.0
    } else {
        f64::from(correct) / f64::from(total)
    }
}

fn advanced(reviews: &[MoleculeReview]) -> AdvancedSrsStats {
    let n = reviews.len();
    let mean = |f: fn(&MoleculeReview) -> f64| {
        if n == 0 {
            0.0
        } else {
            reviews.iter().map(f).sum::<f64>() / n as f64
        }
    };
    AdvancedSrsStats {
        tracked_molecules: n,
        average_ease: mean(|r| r.ease_factor),
        average_interval_days: mean(|r| r.interval_days),
        mastered_molecules: reviews
            .iter()
            .filter(|r| r.interval_days >= MASTERED_INTERVAL_DAYS)
            .count(),
        total_reviews: reviews.iter().map(|r| u64::from(r.review_count)).sum(),
        total_errors: reviews.iter().map(|r| u64::from(r.total_errors)).sum(),
        total_resets: reviews.iter().map(|r| u64::from(r.total_resets)).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_then_success() {
        let now = Utc::now();
        let mut review = new_review(1, 2, now);
        apply(&mut review, ReviewOutcome::Error, now);
        assert_eq!(review.streak, 0);
        assert_eq!(review.total_errors, 1);
        assert_eq!(review.next_review_at, now + Duration::hours(8));

        apply(&mut review, ReviewOutcome::Success, now);
        assert_eq!(review.review_count, 2);
        assert_eq!(review.streak, 1);
        assert_eq!(review.last_outcome, Some(ReviewOutcome::Success));
        assert!(review.ease_factor >= 2.4);
        assert!(review.next_review_at > now + Duration::hours(2));
    }

    #[test]
    fn test_success_intervals_grow() {
        let now = Utc::now();
        let mut review = new_review(1, 2, now);
        apply(&mut review, ReviewOutcome::Success, now);
        assert_eq!(review.interval_days, 1.0);
        apply(&mut review, ReviewOutcome::Success, now);
        assert_eq!(review.interval_days, 3.0);
        apply(&mut review, ReviewOutcome::Success, now);
        assert!(review.interval_days > 3.0);
        assert!(review.ease_factor <= MAX_EASE);
    }

    #[test]
    fn test_ease_is_bounded() {
        let now = Utc::now();
        let mut review = new_review(1, 2, now);
        for _ in 0..20 {
            apply(&mut review, ReviewOutcome::Error, now);
        }
        assert_eq!(review.ease_factor, MIN_EASE);
        for _ in 0..30 {
            apply(&mut review, ReviewOutcome::Success, now);
        }
        assert_eq!(review.ease_factor, MAX_EASE);
    }

    #[test]
    fn test_long_success_streak_caps_interval() {
        let now = Utc::now();
        let mut review = new_review(1, 2, now);
        for _ in 0..60 {
            apply(&mut review, ReviewOutcome::Success, now);
        }
        assert_eq!(review.success_count, 60);
        assert_eq!(review.interval_days, MAX_INTERVAL_DAYS);
        assert_eq!(review.next_review_at, now + Duration::days(365));
    }

    #[test]
    fn test_stored_oversized_interval_is_clamped() {
        let now = Utc::now();
        let mut review = new_review(1, 2, now);
        review.review_count = 5;
        review.interval_days = 1.0e12;
        apply(&mut review, ReviewOutcome::Success, now);
        assert_eq!(review.interval_days, MAX_INTERVAL_DAYS);
        assert!(review.next_review_at <= now + Duration::days(365));
    }

    #[test]
    fn test_reset_pulls_review_forward() {
        let now = Utc::now();
        let mut review = new_review(1, 2, now);
        review.interval_days = 10.0;
        review.next_review_at = now + Duration::days(10);
        review.streak = 4;
        apply(&mut review, ReviewOutcome::Reset, now);
        assert_eq!(review.total_resets, 1);
        assert_eq!(review.streak, 0);
        assert_eq!(review.interval_days, 1.0);
        assert_eq!(review.next_review_at, now + Duration::hours(8));
        assert_eq!(review.review_count, 0);
    }

    #[test]
    fn test_summary_counts_due_and_overdue() {
        let now = Utc::now();
        let mut due = new_review(1, 10, now - Duration::hours(2));
        due.next_review_at = now - Duration::hours(2);
        let mut overdue = new_review(1, 11, now);
        overdue.next_review_at = now - Duration::hours(30);
        let mut later = new_review(1, 12, now);
        later.next_review_at = now + Duration::days(2);

        let summary = summarize(&[due, overdue, later], &[], false, now);
        assert_eq!(summary.due_count, 2);
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.next_reviews[0].molecule_id, 11);
        assert!(summary.advanced_stats.is_none());
        assert_eq!(summary.retention_7_days, 0.0);
    }
}
