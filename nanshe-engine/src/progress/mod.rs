//! Learner progress: XP awards, resets, answers, reviews and statistics.
//!
//! XP awards are serialized through one lock and guarded by the
//! `xp_awarded` flag of the atom progress row, so concurrent or repeated
//! completions of the same atom converge on a single award.

mod badges;
pub mod journal;
pub mod srs;
pub mod stats;

pub use badges::{BadgeAwarder, LESSON_BADGES, LoggingBadgeAwarder};
pub use journal::ErrorJournal;
pub use srs::SrsSummary;
pub use stats::UserStats;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::XpConfig;
use crate::store::CozoStore;
use crate::types::{
    ActivityLog, AtomProgress, AtomStatus, CapsuleProgress, ContentType, Id, MoleculeReview,
    ReviewOutcome,
};
use crate::{EngineError, Result, xp};

/// What a completion call changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub atom_id: Id,
    pub capsule_id: Id,
    /// XP credited by this call (0 when already awarded)
    pub xp_gained: u64,
    pub is_bonus: bool,
    pub already_awarded: bool,
    pub capsule_xp: u64,
    pub capsule_bonus_xp: u64,
    pub badges: Vec<&'static str>,
}

pub struct ProgressService {
    store: Arc<CozoStore>,
    xp: XpConfig,
    badges: Arc<dyn BadgeAwarder>,
    completion_lock: Mutex<()>,
}

impl ProgressService {
    pub fn new(store: Arc<CozoStore>, xp: XpConfig, badges: Arc<dyn BadgeAwarder>) -> Self {
        Self {
            store,
            xp,
            badges,
            completion_lock: Mutex::new(()),
        }
    }

    /// Mark an atom completed and credit its XP once.
    #[instrument(skip(self))]
    pub async fn record_atom_completion(
        &self,
        user_id: Id,
        atom_id: Id,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        let _guard = self.completion_lock.lock().await;
        let lineage = self.store.atom_lineage(atom_id).await?;
        let capsule_id = lineage.capsule.id;

        let mut capsule_progress = match self.store.get_capsule_progress(user_id, capsule_id).await? {
            Some(progress) => progress,
            None => {
                let progress = CapsuleProgress {
                    user_id,
                    capsule_id,
                    skill: lineage.capsule.main_skill.clone(),
                    xp: 0,
                    bonus_xp: 0,
                };
                self.store.put_capsule_progress(&progress).await?;
                progress
            }
        };
        let mut atom_progress = self
            .store
            .get_atom_progress(user_id, atom_id)
            .await?
            .unwrap_or_else(|| AtomProgress::new(user_id, atom_id));

        let mut outcome = CompletionOutcome {
            atom_id,
            capsule_id,
            xp_gained: 0,
            is_bonus: lineage.atom.is_bonus,
            already_awarded: atom_progress.xp_awarded,
            capsule_xp: capsule_progress.xp,
            capsule_bonus_xp: capsule_progress.bonus_xp,
            badges: Vec::new(),
        };

        if atom_progress.xp_awarded {
            atom_progress.status = AtomStatus::Completed;
            atom_progress.completed_at.get_or_insert(now);
            self.store.put_atom_progress(&atom_progress).await?;
            debug!("XP already awarded");
            return Ok(outcome);
        }

        let distribution = xp::for_capsule(&self.store, capsule_id, &self.xp).await?;
        let xp_to_award = distribution.xp_for(atom_id);
        let gain = if lineage.atom.is_bonus {
            capsule_progress.bonus_xp += xp_to_award;
            xp_to_award
        } else {
            let room = self.xp.total_per_capsule.saturating_sub(capsule_progress.xp);
            let gain = xp_to_award.min(room);
            capsule_progress.xp += gain;
            gain
        };
        self.store.put_capsule_progress(&capsule_progress).await?;
        if gain > 0 {
            self.store.add_user_xp(user_id, gain).await?;
        }

        atom_progress.xp_awarded = true;
        atom_progress.status = AtomStatus::Completed;
        atom_progress.completed_at = Some(now);
        self.store.put_atom_progress(&atom_progress).await?;

        if lineage.atom.content_type == ContentType::Lesson {
            let completed = self.store.count_completed_lessons(user_id).await?;
            outcome.badges = self.badges.lessons_completed(user_id, completed).await;
        }

        outcome.xp_gained = gain;
        outcome.capsule_xp = capsule_progress.xp;
        outcome.capsule_bonus_xp = capsule_progress.bonus_xp;
        info!(gain, capsule_xp = capsule_progress.xp, "Atom completed");
        Ok(outcome)
    }

    /// Restart a molecule: atoms go back to not started, awarded XP stays.
    pub async fn reset_molecule(
        &self,
        user_id: Id,
        molecule_id: Id,
        now: DateTime<Utc>,
    ) -> Result<MoleculeReview> {
        self.store.require_molecule(molecule_id).await?;
        for atom in self.store.atoms(molecule_id).await? {
            if let Some(mut progress) = self.store.get_atom_progress(user_id, atom.id).await? {
                progress.status = AtomStatus::NotStarted;
                progress.reset_count += 1;
                self.store.put_atom_progress(&progress).await?;
            }
        }
        self.review(user_id, molecule_id, ReviewOutcome::Reset, now).await
    }

    /// Log an answer and move the molecule's schedule.
    pub async fn register_answer(
        &self,
        user_id: Id,
        atom_id: Id,
        is_correct: bool,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<MoleculeReview> {
        let atom = self
            .store
            .get_atom(atom_id)
            .await?
            .ok_or_else(|| EngineError::not_found("atom", atom_id))?;
        self.store
            .insert_answer(user_id, atom_id, is_correct, payload, now)
            .await?;
        let outcome = if is_correct {
            ReviewOutcome::Success
        } else {
            ReviewOutcome::Error
        };
        self.review(user_id, atom.molecule_id, outcome, now).await
    }

    async fn review(
        &self,
        user_id: Id,
        molecule_id: Id,
        outcome: ReviewOutcome,
        now: DateTime<Utc>,
    ) -> Result<MoleculeReview> {
        let mut review = self
            .store
            .get_review(user_id, molecule_id)
            .await?
            .unwrap_or_else(|| srs::new_review(user_id, molecule_id, now));
        srs::apply(&mut review, outcome, now);
        self.store.put_review(&review).await?;
        debug!(
            user_id,
            molecule_id,
            %outcome,
            interval_days = review.interval_days,
            ease = review.ease_factor,
            "Review updated"
        );
        Ok(review)
    }

    pub async fn record_activity(
        &self,
        user_id: Id,
        capsule_id: Option<Id>,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<ActivityLog> {
        if end.is_some_and(|end| end < start) {
            return Err(EngineError::InvalidInput("activity ends before it starts".into()));
        }
        self.store.insert_activity(user_id, capsule_id, start, end).await
    }

    /// Study time, sessions and streak; closes stale open sessions first
    pub async fn get_user_stats(&self, user_id: Id, now: DateTime<Utc>) -> Result<UserStats> {
        let user = self.store.require_user(user_id).await?;
        let mut logs = self.store.activities_for_user(user_id).await?;
        for closed in stats::close_stale(&mut logs, now) {
            self.store.put_activity(&closed).await?;
        }

        let mut capsules = HashMap::new();
        for capsule_id in logs.iter().filter_map(|l| l.capsule_id) {
            if !capsules.contains_key(&capsule_id)
                && let Some(capsule) = self.store.get_capsule(capsule_id).await?
            {
                capsules.insert(capsule_id, capsule);
            }
        }
        Ok(stats::aggregate(&logs, &capsules, user.last_login_at, now))
    }

    pub async fn srs_summary(&self, user_id: Id, now: DateTime<Utc>) -> Result<SrsSummary> {
        let user = self.store.require_user(user_id).await?;
        let reviews = self.store.reviews_for_user(user_id).await?;
        let answers = self.store.answers_for_user(user_id).await?;
        Ok(srs::summarize(&reviews, &answers, user.is_premium(), now))
    }

    pub async fn error_journal(&self, user_id: Id) -> Result<ErrorJournal> {
        let user = self.store.require_user(user_id).await?;
        let answers = self.store.answers_for_user(user_id).await?;

        let mut molecule_of = HashMap::new();
        for answer in answers.iter().filter(|a| !a.is_correct) {
            if molecule_of.contains_key(&answer.atom_id) {
                continue;
            }
            let Some(atom) = self.store.get_atom(answer.atom_id).await? else {
                continue;
            };
            if let Some(molecule) = self.store.get_molecule(atom.molecule_id).await? {
                molecule_of.insert(answer.atom_id, (molecule.id, molecule.title));
            }
        }
        Ok(journal::build(&answers, &molecule_of, user.is_premium()))
    }
}
