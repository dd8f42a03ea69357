//! Learning coach.
//!
//! Each question is answered inside a persisted thread keyed by the
//! learner's location. Free-tier learners pay energy per message; the
//! charge is refunded when the model call fails.

pub mod energy;

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::CoachConfig;
use crate::embedding::EmbeddingService;
use crate::llm::LlmGateway;
use crate::progress::{journal, srs};
use crate::store::{CozoStore, VectorStore};
use crate::types::{
    CoachContext, CoachMessage, CoachRole, EnergyStatus, Id, User, VectorFilter,
};
use crate::{EngineError, Result};

/// Wrong answers quoted to the model.
const RECENT_MISTAKES: usize = 5;
/// Molecules listed as weak topics.
const WEAK_TOPICS: usize = 3;
/// Characters kept from each retrieved chunk.
const CHUNK_CHARS: usize = 800;

const COACH_SYSTEM_PROMPT: &str = "You are a patient learning coach. Answer the learner's \
question using the context below. Be concrete and brief. Reply with JSON: \
{\"response\": string, \"suggestions\": [string] (optional), \"next_steps\": [string] (optional)}.";

const SUMMARY_SYSTEM_PROMPT: &str = "Summarize this tutoring conversation in at most five \
sentences, keeping the learner's open questions and difficulties. Reply with JSON: \
{\"summary\": string}.";

/// Coach answer as returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachReply {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<Vec<String>>,
    pub thread_id: Id,
}

pub struct CoachService {
    store: Arc<CozoStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<LlmGateway>,
    config: CoachConfig,
    wallet_lock: Mutex<()>,
}

impl CoachService {
    pub fn new(
        store: Arc<CozoStore>,
        embeddings: Arc<EmbeddingService>,
        llm: Arc<LlmGateway>,
        config: CoachConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            llm,
            config,
            wallet_lock: Mutex::new(()),
        }
    }

    pub async fn ask(&self, user_id: Id, message: &str, context: CoachContext) -> Result<CoachReply> {
        self.ask_at(user_id, message, context, Utc::now()).await
    }

    /// [`ask`](Self::ask) with an explicit clock.
    #[instrument(skip(self, message), fields(location = %context.location_key()))]
    pub async fn ask_at(
        &self,
        user_id: Id,
        message: &str,
        context: CoachContext,
        now: DateTime<Utc>,
    ) -> Result<CoachReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::InvalidInput("message is empty".into()));
        }
        let user = self.store.require_user(user_id).await?;
        let charged = self.charge(&user, now).await?;

        match self.answer(&user, message, context, now).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                if charged {
                    self.refund(user_id, now).await;
                }
                Err(e)
            }
        }
    }

    async fn answer(
        &self,
        user: &User,
        message: &str,
        context: CoachContext,
        now: DateTime<Utc>,
    ) -> Result<CoachReply> {
        let thread = self.store.get_or_create_thread(user.id, &context, now).await?;
        let history = self.store.coach_messages(thread.id).await?;

        let mut system = COACH_SYSTEM_PROMPT.to_string();
        system.push_str("\n\n");
        system.push_str(&self.learner_context(user.id, context, message, now).await?);

        let mut prompt = String::new();
        let keep = self.config.history_round_trips * 2;
        let (older, recent) = history.split_at(history.len().saturating_sub(keep));
        if !older.is_empty() {
            match self.summarize_history(user.id, older).await {
                Some(summary) => {
                    let _ = writeln!(prompt, "Earlier in this conversation: {summary}\n");
                }
                None => debug!(skipped = older.len(), "Older history dropped"),
            }
        }
        for entry in recent {
            let _ = writeln!(prompt, "{}: {}", entry.role, entry.content);
        }
        let _ = write!(prompt, "user: {message}");

        let object = self
            .llm
            .complete_and_log(user.id, "coach", &system, &prompt, None, None)
            .await?;
        let (response, suggestions, next_steps) = parse_reply(&object)?;

        self.store
            .insert_coach_message(thread.id, CoachRole::User, message, None, now)
            .await?;
        let payload = json!({"suggestions": suggestions, "next_steps": next_steps});
        self.store
            .insert_coach_message(thread.id, CoachRole::Coach, &response, Some(&payload), now)
            .await?;
        let mut thread = thread;
        thread.updated_at = now;
        self.store.put_thread(&thread).await?;

        info!(thread_id = thread.id, "Coach replied");
        Ok(CoachReply {
            response,
            suggestions,
            next_steps,
            thread_id: thread.id,
        })
    }

    /// Take one message cost from the wallet; `false` for unlimited users
    async fn charge(&self, user: &User, now: DateTime<Utc>) -> Result<bool> {
        if user.has_unlimited_coach() {
            return Ok(false);
        }
        let _guard = self.wallet_lock.lock().await;
        let mut wallet = self
            .store
            .get_energy(user.id)
            .await?
            .unwrap_or_else(|| energy::full_wallet(user.id, &self.config, now));
        let current = energy::refilled(&wallet, &self.config, now);
        if current < self.config.message_cost {
            let status = energy::status(current, &self.config, now);
            info!(user_id = user.id, wait = status.seconds_until_next_message, "Coach energy depleted");
            return Err(EngineError::CoachEnergyDepleted(status));
        }
        wallet.current_energy = current - self.config.message_cost;
        wallet.updated_at = now;
        self.store.put_energy(&wallet).await?;
        Ok(true)
    }

    async fn refund(&self, user_id: Id, now: DateTime<Utc>) {
        let _guard = self.wallet_lock.lock().await;
        let result = async {
            if let Some(mut wallet) = self.store.get_energy(user_id).await? {
                let current = energy::refilled(&wallet, &self.config, now);
                wallet.current_energy = (current + self.config.message_cost).min(self.config.energy_max);
                wallet.updated_at = now;
                self.store.put_energy(&wallet).await?;
            }
            Ok::<_, EngineError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(user_id, error = %e, "Coach energy refund failed");
        }
    }

    /// Wallet state without charging
    pub async fn energy_status(&self, user_id: Id, now: DateTime<Utc>) -> Result<EnergyStatus> {
        let user = self.store.require_user(user_id).await?;
        if user.has_unlimited_coach() {
            return Ok(energy::unlimited(&self.config, now));
        }
        let current = match self.store.get_energy(user_id).await? {
            Some(wallet) => energy::refilled(&wallet, &self.config, now),
            None => self.config.energy_max,
        };
        Ok(energy::status(current, &self.config, now))
    }

    /// Persisted messages of the thread at `context`, oldest first
    pub async fn history(&self, user_id: Id, context: CoachContext) -> Result<Vec<CoachMessage>> {
        match self.store.find_thread(user_id, &context).await? {
            Some(thread) => self.store.coach_messages(thread.id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn learner_context(
        &self,
        user_id: Id,
        context: CoachContext,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let mut out = String::new();
        let reviews = self.store.reviews_for_user(user_id).await?;
        let answers = self.store.answers_for_user(user_id).await?;

        let _ = writeln!(out, "Location: {}", context.location());
        if let Some(capsule_id) = context.capsule_id()
            && let Some(capsule) = self.store.get_capsule(capsule_id).await?
        {
            let _ = writeln!(
                out,
                "Course: {} ({} / {} / {})",
                capsule.title, capsule.domain, capsule.area, capsule.main_skill
            );
        }
        let molecule = match context.molecule_id() {
            Some(id) => self.store.get_molecule(id).await?,
            None => None,
        };
        if let Some(molecule) = &molecule {
            let _ = writeln!(out, "Current lesson: {}", molecule.title);
        }

        let mut weak: Vec<_> = reviews.iter().filter(|r| r.total_errors > 0).collect();
        weak.sort_by(|a, b| b.total_errors.cmp(&a.total_errors).then(a.molecule_id.cmp(&b.molecule_id)));
        let mut topics = Vec::new();
        for review in weak.into_iter().take(WEAK_TOPICS) {
            if let Some(m) = self.store.get_molecule(review.molecule_id).await? {
                topics.push(format!("{} ({} errors)", m.title, review.total_errors));
            }
        }
        if !topics.is_empty() {
            let _ = writeln!(out, "Weak topics: {}", topics.join("; "));
        }

        let mistakes: Vec<_> = answers.iter().filter(|a| !a.is_correct).take(RECENT_MISTAKES).collect();
        if !mistakes.is_empty() {
            let _ = writeln!(out, "Recent mistakes:");
            for answer in mistakes {
                let title = match self.store.get_atom(answer.atom_id).await? {
                    Some(atom) => atom.title,
                    None => format!("atom {}", answer.atom_id),
                };
                let _ = writeln!(out, "- {title}: {}", journal::error_type(&answer.submitted_payload));
            }
        }

        let digest = srs::summarize(&reviews, &answers, false, now);
        let _ = writeln!(
            out,
            "Reviews: {} due, {} overdue, 7-day retention {:.0}%",
            digest.due_count,
            digest.overdue_count,
            digest.retention_7_days * 100.0
        );

        if let Some(filter) = chunk_filter(context) {
            let vector = self.embeddings.embed(message).await;
            let chunks = self.store.query(&vector, &filter, self.config.context_chunks).await?;
            if !chunks.is_empty() {
                let _ = writeln!(out, "Course material:");
                for (entry, score) in chunks {
                    let text: String = entry.text.chars().take(CHUNK_CHARS).collect();
                    let _ = writeln!(out, "[{score:.2}] {text}");
                }
            }
        }
        Ok(out)
    }

    async fn summarize_history(&self, user_id: Id, messages: &[CoachMessage]) -> Option<String> {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        match self
            .llm
            .complete_and_log(user_id, "coach_summary", SUMMARY_SYSTEM_PROMPT, &transcript, None, Some(0))
            .await
        {
            Ok(object) => object
                .get("summary")
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(e) => {
                warn!(error = %e, "History summary failed");
                None
            }
        }
    }
}

/// Entries owned by the current molecule, else by the current capsule;
/// the dashboard retrieves nothing
fn chunk_filter(context: CoachContext) -> Option<VectorFilter> {
    let filter = VectorFilter::new().capsule(context.capsule_id()?);
    Some(match context.molecule_id() {
        Some(molecule_id) => filter.molecule(molecule_id),
        None => filter,
    })
}

type ParsedReply = (String, Option<Vec<String>>, Option<Vec<String>>);

fn parse_reply(object: &Map<String, Value>) -> Result<ParsedReply> {
    let response = object
        .get("response")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::Llm("coach reply has no response".into()))?
        .to_string();
    Ok((
        response,
        string_list(object.get("suggestions")),
        string_list(object.get("next_steps")),
    ))
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items: Vec<String> = value?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_requires_response() {
        let mut object = Map::new();
        object.insert("response".into(), json!("Try again"));
        object.insert("suggestions".into(), json!(["a", 3, "b"]));
        let (response, suggestions, next_steps) = parse_reply(&object).unwrap();
        assert_eq!(response, "Try again");
        assert_eq!(suggestions, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(next_steps.is_none());

        assert!(matches!(parse_reply(&Map::new()), Err(EngineError::Llm(_))));
    }

    #[test]
    fn test_chunk_filter_is_scoped_to_the_location() {
        assert!(chunk_filter(CoachContext::Dashboard).is_none());
        assert_eq!(
            chunk_filter(CoachContext::Capsule { capsule_id: 4 }),
            Some(VectorFilter::new().capsule(4))
        );
        assert_eq!(
            chunk_filter(CoachContext::Molecule { capsule_id: 4, molecule_id: 9 }),
            Some(VectorFilter::new().capsule(4).molecule(9))
        );
    }
}
