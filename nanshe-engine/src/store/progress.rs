//! Learner progress rows: XP, atom state, reviews, answers and activity.

use chrono::{DateTime, Utc};
use cozo::DataValue;

use super::cozo::*;
use crate::types::{
    ActivityLog, AnswerLog, AtomProgress, CapsuleProgress, Id, MoleculeReview, from_millis,
    to_millis,
};
use crate::Result;

const REVIEW_COLUMNS: &str = "user_id, molecule_id, next_review_at, last_review_at, last_error_at, \
     interval_days, ease_factor, streak, review_count, success_count, total_errors, total_resets, last_outcome";

impl CozoStore {
    // --- capsule progress ---

    pub async fn get_capsule_progress(
        &self,
        user_id: Id,
        capsule_id: Id,
    ) -> Result<Option<CapsuleProgress>> {
        let rows = self
            .run_query(
                "?[skill, xp, bonus_xp] := *capsule_progress{user_id, capsule_id, skill, xp, bonus_xp}, \
                 user_id = $user_id, capsule_id = $capsule_id",
                params([
                    ("user_id", DataValue::from(user_id)),
                    ("capsule_id", DataValue::from(capsule_id)),
                ]),
            )
            .await?;
        match rows.rows.first() {
            Some(row) => Ok(Some(CapsuleProgress {
                user_id,
                capsule_id,
                skill: get_string(row, 0, "skill")?,
                xp: get_int(row, 1, "xp")?.max(0) as u64,
                bonus_xp: get_int(row, 2, "bonus_xp")?.max(0) as u64,
            })),
            None => Ok(None),
        }
    }

    pub async fn put_capsule_progress(&self, progress: &CapsuleProgress) -> Result<()> {
        self.run_mutation(
            "?[user_id, capsule_id, skill, xp, bonus_xp] <- [[$user_id, $capsule_id, $skill, $xp, $bonus_xp]] \
             :put capsule_progress {user_id, capsule_id => skill, xp, bonus_xp}",
            params([
                ("user_id", DataValue::from(progress.user_id)),
                ("capsule_id", DataValue::from(progress.capsule_id)),
                ("skill", DataValue::from(progress.skill.as_str())),
                ("xp", DataValue::from(progress.xp as i64)),
                ("bonus_xp", DataValue::from(progress.bonus_xp as i64)),
            ]),
        )
        .await?;
        Ok(())
    }

    // --- atom progress ---

    pub async fn get_atom_progress(&self, user_id: Id, atom_id: Id) -> Result<Option<AtomProgress>> {
        let rows = self
            .run_query(
                "?[status, xp_awarded, completed_at, reset_count] := \
                 *atom_progress{user_id, atom_id, status, xp_awarded, completed_at, reset_count}, \
                 user_id = $user_id, atom_id = $atom_id",
                params([
                    ("user_id", DataValue::from(user_id)),
                    ("atom_id", DataValue::from(atom_id)),
                ]),
            )
            .await?;
        match rows.rows.first() {
            Some(row) => Ok(Some(AtomProgress {
                user_id,
                atom_id,
                status: get_string(row, 0, "status")?.parse()?,
                xp_awarded: get_bool(row, 1, "xp_awarded")?,
                completed_at: get_opt_time(row, 2),
                reset_count: get_int(row, 3, "reset_count")?.max(0) as u32,
            })),
            None => Ok(None),
        }
    }

    pub async fn put_atom_progress(&self, progress: &AtomProgress) -> Result<()> {
        self.run_mutation(
            "?[user_id, atom_id, status, xp_awarded, completed_at, reset_count] <- \
             [[$user_id, $atom_id, $status, $xp_awarded, $completed_at, $reset_count]] \
             :put atom_progress {user_id, atom_id => status, xp_awarded, completed_at, reset_count}",
            params([
                ("user_id", DataValue::from(progress.user_id)),
                ("atom_id", DataValue::from(progress.atom_id)),
                ("status", DataValue::from(progress.status.as_str())),
                ("xp_awarded", DataValue::from(progress.xp_awarded)),
                ("completed_at", opt_time(progress.completed_at)),
                ("reset_count", DataValue::from(progress.reset_count as i64)),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Number of completed lesson atoms, for badge thresholds
    pub async fn count_completed_lessons(&self, user_id: Id) -> Result<u64> {
        let rows = self
            .run_query(
                "?[count(atom_id)] := *atom_progress{user_id, atom_id, status}, user_id = $user_id, \
                 status = 'completed', *atoms{id: atom_id, content_type}, content_type = 'lesson'",
                params([("user_id", DataValue::from(user_id))]),
            )
            .await?;
        Ok(match rows.rows.first() {
            Some(row) => get_int(row, 0, "count")?.max(0) as u64,
            None => 0,
        })
    }

    // --- molecule reviews ---

    pub async fn get_review(&self, user_id: Id, molecule_id: Id) -> Result<Option<MoleculeReview>> {
        let query = format!(
            "?[{REVIEW_COLUMNS}] := *molecule_reviews{{{REVIEW_COLUMNS}}}, \
             user_id = $user_id, molecule_id = $molecule_id"
        );
        let rows = self
            .run_query(
                &query,
                params([
                    ("user_id", DataValue::from(user_id)),
                    ("molecule_id", DataValue::from(molecule_id)),
                ]),
            )
            .await?;
        rows.rows.first().map(|row| parse_review_row(row)).transpose()
    }

    /// Every review record of a user, soonest due first
    pub async fn reviews_for_user(&self, user_id: Id) -> Result<Vec<MoleculeReview>> {
        let query = format!(
            "?[{REVIEW_COLUMNS}] := *molecule_reviews{{{REVIEW_COLUMNS}}}, user_id = $user_id"
        );
        let rows = self
            .run_query(&query, params([("user_id", DataValue::from(user_id))]))
            .await?;
        let mut reviews = rows
            .rows
            .iter()
            .map(|row| parse_review_row(row))
            .collect::<Result<Vec<_>>>()?;
        reviews.sort_by_key(|r| (r.next_review_at, r.molecule_id));
        Ok(reviews)
    }

    pub async fn put_review(&self, review: &MoleculeReview) -> Result<()> {
        let query = format!(
            "?[{REVIEW_COLUMNS}] <- [[$user_id, $molecule_id, $next_review_at, $last_review_at, \
             $last_error_at, $interval_days, $ease_factor, $streak, $review_count, $success_count, \
             $total_errors, $total_resets, $last_outcome]] \
             :put molecule_reviews {{user_id, molecule_id => next_review_at, last_review_at, \
             last_error_at, interval_days, ease_factor, streak, review_count, success_count, \
             total_errors, total_resets, last_outcome}}"
        );
        self.run_mutation(
            &query,
            params([
                ("user_id", DataValue::from(review.user_id)),
                ("molecule_id", DataValue::from(review.molecule_id)),
                ("next_review_at", time(review.next_review_at)),
                ("last_review_at", opt_time(review.last_review_at)),
                ("last_error_at", opt_time(review.last_error_at)),
                ("interval_days", DataValue::from(review.interval_days)),
                ("ease_factor", DataValue::from(review.ease_factor)),
                ("streak", DataValue::from(review.streak as i64)),
                ("review_count", DataValue::from(review.review_count as i64)),
                ("success_count", DataValue::from(review.success_count as i64)),
                ("total_errors", DataValue::from(review.total_errors as i64)),
                ("total_resets", DataValue::from(review.total_resets as i64)),
                ("last_outcome", opt_str(review.last_outcome.map(|o| o.as_str()))),
            ]),
        )
        .await?;
        Ok(())
    }

    // --- answer logs ---

    pub async fn insert_answer(
        &self,
        user_id: Id,
        atom_id: Id,
        is_correct: bool,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<AnswerLog> {
        let log = AnswerLog {
            id: self.next_id().await?,
            user_id,
            atom_id,
            is_correct,
            submitted_payload: payload.clone(),
            created_at: from_millis(to_millis(at)),
        };
        self.run_mutation(
            "?[id, user_id, atom_id, is_correct, payload_json, created_at] <- \
             [[$id, $user_id, $atom_id, $is_correct, $payload_json, $created_at]] \
             :put answer_logs {id => user_id, atom_id, is_correct, payload_json, created_at}",
            params([
                ("id", DataValue::from(log.id)),
                ("user_id", DataValue::from(user_id)),
                ("atom_id", DataValue::from(atom_id)),
                ("is_correct", DataValue::from(is_correct)),
                ("payload_json", DataValue::from(to_json(payload)?)),
                ("created_at", time(log.created_at)),
            ]),
        )
        .await?;
        Ok(log)
    }

    /// A user's answers, newest first
    pub async fn answers_for_user(&self, user_id: Id) -> Result<Vec<AnswerLog>> {
        let rows = self
            .run_query(
                "?[id, atom_id, is_correct, payload_json, created_at] := \
                 *answer_logs{id, user_id, atom_id, is_correct, payload_json, created_at}, \
                 user_id = $user_id",
                params([("user_id", DataValue::from(user_id))]),
            )
            .await?;
        let mut logs = rows
            .rows
            .iter()
            .map(|row| {
                Ok(AnswerLog {
                    id: get_int(row, 0, "answer id")?,
                    user_id,
                    atom_id: get_int(row, 1, "atom_id")?,
                    is_correct: get_bool(row, 2, "is_correct")?,
                    submitted_payload: get_json(row, 3, "payload_json")?,
                    created_at: get_time(row, 4, "created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(logs)
    }

    // --- activity logs ---

    pub async fn insert_activity(
        &self,
        user_id: Id,
        capsule_id: Option<Id>,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<ActivityLog> {
        let log = ActivityLog {
            id: self.next_id().await?,
            user_id,
            capsule_id,
            start_time: from_millis(to_millis(start)),
            end_time: end.map(|e| from_millis(to_millis(e))),
        };
        self.put_activity(&log).await?;
        Ok(log)
    }

    pub async fn put_activity(&self, log: &ActivityLog) -> Result<()> {
        self.run_mutation(
            "?[id, user_id, capsule_id, start_time, end_time] <- \
             [[$id, $user_id, $capsule_id, $start_time, $end_time]] \
             :put activity_logs {id => user_id, capsule_id, start_time, end_time}",
            params([
                ("id", DataValue::from(log.id)),
                ("user_id", DataValue::from(log.user_id)),
                ("capsule_id", opt_int(log.capsule_id)),
                ("start_time", time(log.start_time)),
                ("end_time", opt_time(log.end_time)),
            ]),
        )
        .await?;
        Ok(())
    }

    /// A user's activity intervals, oldest first
    pub async fn activities_for_user(&self, user_id: Id) -> Result<Vec<ActivityLog>> {
        let rows = self
            .run_query(
                "?[id, capsule_id, start_time, end_time] := \
                 *activity_logs{id, user_id, capsule_id, start_time, end_time}, user_id = $user_id",
                params([("user_id", DataValue::from(user_id))]),
            )
            .await?;
        let mut logs = rows
            .rows
            .iter()
            .map(|row| {
                Ok(ActivityLog {
                    id: get_int(row, 0, "activity id")?,
                    user_id,
                    capsule_id: get_opt_int(row, 1),
                    start_time: get_time(row, 2, "start_time")?,
                    end_time: get_opt_time(row, 3),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        logs.sort_by_key(|l| (l.start_time, l.id));
        Ok(logs)
    }
}

fn parse_review_row(row: &[DataValue]) -> Result<MoleculeReview> {
    let count = |index: usize, what: &str| -> Result<u32> {
        Ok(get_int(row, index, what)?.max(0) as u32)
    };
    Ok(MoleculeReview {
        user_id: get_int(row, 0, "user_id")?,
        molecule_id: get_int(row, 1, "molecule_id")?,
        next_review_at: get_time(row, 2, "next_review_at")?,
        last_review_at: get_opt_time(row, 3),
        last_error_at: get_opt_time(row, 4),
        interval_days: get_float(row, 5, "interval_days")?,
        ease_factor: get_float(row, 6, "ease_factor")?,
        streak: count(7, "streak")?,
        review_count: count(8, "review_count")?,
        success_count: count(9, "success_count")?,
        total_errors: count(10, "total_errors")?,
        total_resets: count(11, "total_resets")?,
        last_outcome: get_opt_string(row, 12).map(|s| s.parse()).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AtomStatus, ReviewOutcome};
    use chrono::Duration;

    #[tokio::test]
    async fn test_capsule_progress_roundtrip() {
        let store = CozoStore::open_mem().await.unwrap();
        assert!(store.get_capsule_progress(1, 2).await.unwrap().is_none());
        let progress = CapsuleProgress {
            user_id: 1,
            capsule_id: 2,
            skill: "japanese".into(),
            xp: 100,
            bonus_xp: 5,
        };
        store.put_capsule_progress(&progress).await.unwrap();
        assert_eq!(store.get_capsule_progress(1, 2).await.unwrap(), Some(progress));
    }

    #[tokio::test]
    async fn test_atom_progress_roundtrip() {
        let store = CozoStore::open_mem().await.unwrap();
        let mut progress = AtomProgress::new(1, 9);
        progress.status = AtomStatus::Completed;
        progress.xp_awarded = true;
        progress.completed_at = Some(from_millis(1_700_000_000_000));
        store.put_atom_progress(&progress).await.unwrap();
        assert_eq!(store.get_atom_progress(1, 9).await.unwrap(), Some(progress));
    }

    #[tokio::test]
    async fn test_review_roundtrip() {
        let store = CozoStore::open_mem().await.unwrap();
        let now = from_millis(1_700_000_000_000);
        let review = MoleculeReview {
            user_id: 1,
            molecule_id: 4,
            next_review_at: now + Duration::hours(8),
            last_review_at: Some(now),
            last_error_at: None,
            interval_days: 1.0 / 3.0,
            ease_factor: 2.3,
            streak: 0,
            review_count: 1,
            success_count: 0,
            total_errors: 1,
            total_resets: 0,
            last_outcome: Some(ReviewOutcome::Error),
        };
        store.put_review(&review).await.unwrap();
        assert_eq!(store.get_review(1, 4).await.unwrap(), Some(review.clone()));
        assert_eq!(store.reviews_for_user(1).await.unwrap(), vec![review]);
    }

    #[tokio::test]
    async fn test_answers_newest_first() {
        let store = CozoStore::open_mem().await.unwrap();
        let t0 = from_millis(1_700_000_000_000);
        store
            .insert_answer(1, 5, false, &serde_json::json!({"error_type": "grammar"}), t0)
            .await
            .unwrap();
        store
            .insert_answer(1, 5, true, &serde_json::json!({}), t0 + Duration::minutes(1))
            .await
            .unwrap();
        let answers = store.answers_for_user(1).await.unwrap();
        assert_eq!(answers.len(), 2);
        assert!(answers[0].is_correct);
        assert_eq!(answers[1].submitted_payload["error_type"], "grammar");
    }

    #[tokio::test]
    async fn test_activity_update() {
        let store = CozoStore::open_mem().await.unwrap();
        let start = from_millis(1_700_000_000_000);
        let mut log = store.insert_activity(1, Some(3), start, None).await.unwrap();
        log.end_time = Some(start + Duration::minutes(30));
        store.put_activity(&log).await.unwrap();
        assert_eq!(store.activities_for_user(1).await.unwrap(), vec![log]);
    }
}
