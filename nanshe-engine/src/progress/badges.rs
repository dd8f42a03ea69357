//! Lesson-count badges.

use async_trait::async_trait;
use tracing::info;

use crate::types::Id;

/// `(completed lessons, badge code)` thresholds.
pub const LESSON_BADGES: [(u64, &str); 3] = [
    (1, "first_lesson"),
    (10, "ten_lessons"),
    (50, "fifty_lessons"),
];

/// Badges whose threshold is exactly `completed`
pub fn reached(completed: u64) -> Vec<&'static str> {
    LESSON_BADGES
        .iter()
        .filter(|(threshold, _)| *threshold == completed)
        .map(|(_, code)| *code)
        .collect()
}

/// Receives lesson completions and grants badges.
#[async_trait]
pub trait BadgeAwarder: Send + Sync {
    /// Called after a lesson atom is completed; returns newly granted badges
    async fn lessons_completed(&self, user_id: Id, completed: u64) -> Vec<&'static str>;
}

/// Grants by threshold and logs each badge.
#[derive(Debug, Default)]
pub struct LoggingBadgeAwarder;

#[async_trait]
impl BadgeAwarder for LoggingBadgeAwarder {
    async fn lessons_completed(&self, user_id: Id, completed: u64) -> Vec<&'static str> {
        let badges = reached(completed);
        for badge in &badges {
            info!(user_id, badge = *badge, completed, "Badge awarded");
        }
        badges
    }
}
