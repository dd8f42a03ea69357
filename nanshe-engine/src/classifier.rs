//! Taxonomy classifier
//!
//! Maps a free-text topic to `(domain, area, skill)` by nearest-neighbour
//! search over the taxonomy vectors. Corrections submitted through
//! [`TaxonomyClassifier::record_feedback`] are stored as new vectors and
//! join the in-memory index immediately.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::ClassifierConfig;
use crate::embedding::{EmbeddingService, is_zero, projected_similarity};
use crate::llm::LlmGateway;
use crate::store::{CozoStore, NewFeedback, VectorStore};
use crate::types::{
    ClassificationFeedback, Id, NewVectorEntry, TAXONOMY_CONTENT_TYPE,
    TAXONOMY_FEEDBACK_CONTENT_TYPE, TaxonomyLabel, UpsertMode, VectorEntry, VectorFilter,
    from_millis, to_millis,
};
use crate::{EngineError, Result};

/// Label of a match as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedCategory {
    /// Skill name
    pub name: String,
    pub domain: String,
    pub area: String,
}

/// One classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMatch {
    pub category: MatchedCategory,
    /// Cosine similarity to the matched entry
    pub confidence: f32,
    /// Text of the matched entry
    pub source_text: String,
}

impl ClassificationMatch {
    pub fn label(&self) -> TaxonomyLabel {
        TaxonomyLabel {
            domain: self.category.domain.clone(),
            area: self.category.area.clone(),
            skill: self.category.name.clone(),
        }
    }
}

/// A correction submitted by a user or an operator.
#[derive(Debug, Clone)]
pub struct FeedbackInput {
    pub user_id: Option<Id>,
    pub input_text: String,
    pub predicted: Option<TaxonomyLabel>,
    pub final_label: TaxonomyLabel,
    pub is_correct: bool,
    pub notes: Option<String>,
}

/// A taxonomy entry used to seed the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomySeed {
    pub domain: String,
    pub area: String,
    pub skill: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Default)]
struct Index {
    entries: Vec<VectorEntry>,
    loaded: bool,
}

pub struct TaxonomyClassifier {
    store: Arc<CozoStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<LlmGateway>,
    config: ClassifierConfig,
    index: RwLock<Index>,
    rebuild_lock: Mutex<()>,
}

impl TaxonomyClassifier {
    pub fn new(
        store: Arc<CozoStore>,
        embeddings: Arc<EmbeddingService>,
        llm: Arc<LlmGateway>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            llm,
            config,
            index: RwLock::new(Index::default()),
            rebuild_lock: Mutex::new(()),
        }
    }

    fn taxonomy_filter() -> VectorFilter {
        VectorFilter::new()
            .content_type(TAXONOMY_CONTENT_TYPE)
            .content_type(TAXONOMY_FEEDBACK_CONTENT_TYPE)
    }

    /// Reload the index from the store. Concurrent rebuilds run one at a time.
    pub async fn rebuild(&self) -> Result<usize> {
        let _guard = self.rebuild_lock.lock().await;
        let entries = self.store.entries(&Self::taxonomy_filter()).await?;
        let count = entries.len();
        let mut index = self.index.write().await;
        index.entries = entries;
        index.loaded = true;
        info!(entries = count, "Taxonomy index rebuilt");
        Ok(count)
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if !self.index.read().await.loaded {
            self.rebuild().await?;
        }
        Ok(())
    }

    /// Classify with the configured `top_k` and `threshold`
    pub async fn classify(&self, text: &str) -> Result<Vec<ClassificationMatch>> {
        self.classify_with(text, &VectorFilter::new(), self.config.top_k, self.config.threshold)
            .await
    }

    /// Classify restricted to entries matching `filter`
    pub async fn classify_with(
        &self,
        text: &str,
        filter: &VectorFilter,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ClassificationMatch>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embeddings.embed(text).await;
        self.classify_vector(&vector, filter, top_k, threshold).await
    }

    /// Nearest taxonomy entries to an already embedded query.
    ///
    /// Returns an empty list for the zero vector or when nothing clears
    /// `threshold`.
    pub async fn classify_vector(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ClassificationMatch>> {
        if is_zero(vector) {
            return Ok(Vec::new());
        }
        self.ensure_loaded().await?;
        let index = self.index.read().await;

        let mut scored: Vec<(&VectorEntry, f32)> = index
            .entries
            .iter()
            .filter(|e| filter.matches_entry(e) && e.skill.is_some())
            .filter_map(|e| {
                let score = projected_similarity(vector, &e.vector);
                (score >= threshold).then_some((e, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.id.cmp(&b.0.id)));
        scored.truncate(top_k);

        debug!(matches = scored.len(), "Classification done");
        Ok(scored
            .into_iter()
            .map(|(entry, score)| ClassificationMatch {
                category: MatchedCategory {
                    name: entry.skill.clone().unwrap_or_default(),
                    domain: entry.domain.clone().unwrap_or_default(),
                    area: entry.area.clone().unwrap_or_default(),
                },
                confidence: score,
                source_text: entry.text.clone(),
            })
            .collect())
    }

    /// Persist a correction and make it visible to the next query.
    ///
    /// A `(domain, area)` pair not seen before gets a short LLM description
    /// in the feedback metadata; failing to get one is only logged.
    pub async fn record_feedback(&self, input: FeedbackInput) -> Result<ClassificationFeedback> {
        let label = &input.final_label;
        if input.input_text.trim().is_empty() {
            return Err(EngineError::InvalidInput("feedback text is empty".into()));
        }
        if [&label.domain, &label.area, &label.skill]
            .iter()
            .any(|s| s.trim().is_empty())
        {
            return Err(EngineError::InvalidInput(
                "final domain, area and skill are required".into(),
            ));
        }
        self.ensure_loaded().await?;

        let is_new_pair = !self.index.read().await.entries.iter().any(|e| {
            e.domain.as_deref() == Some(label.domain.as_str())
                && e.area.as_deref() == Some(label.area.as_str())
        });
        let mut metadata = json!({});
        if is_new_pair {
            match self.describe_area(label).await {
                Ok(description) => metadata["area_description"] = Value::String(description),
                Err(e) => warn!(domain = %label.domain, area = %label.area, error = %e, "Could not describe new area"),
            }
        }

        let feedback = self
            .store
            .insert_feedback(
                NewFeedback {
                    user_id: input.user_id,
                    input_text: input.input_text.clone(),
                    predicted: input.predicted.clone(),
                    final_label: label.clone(),
                    is_correct: input.is_correct,
                    notes: input.notes.clone(),
                    metadata,
                },
                Utc::now(),
            )
            .await?;

        let vector = self.embeddings.embed(&input.input_text).await;
        let entry = NewVectorEntry::new(&input.input_text, vector, TAXONOMY_FEEDBACK_CONTENT_TYPE)
            .domain(&label.domain)
            .area(&label.area)
            .skill(&label.skill)
            .metadata(json!({ "feedback_id": feedback.id, "is_correct": input.is_correct }));
        self.upsert_indexed(entry).await?;

        info!(feedback_id = feedback.id, skill = %label.skill, new_area = is_new_pair, "Classification feedback recorded");
        Ok(feedback)
    }

    /// Upsert taxonomy entries and rebuild the index
    pub async fn seed(&self, seeds: &[TaxonomySeed]) -> Result<usize> {
        for seed in seeds {
            let text = match &seed.description {
                Some(d) if !d.trim().is_empty() => format!("{} {}", seed.skill, d),
                _ => seed.skill.clone(),
            };
            let vector = self.embeddings.embed(&text).await;
            let entry = NewVectorEntry::new(text, vector, TAXONOMY_CONTENT_TYPE)
                .domain(&seed.domain)
                .area(&seed.area)
                .skill(&seed.skill);
            self.store.upsert(entry, UpsertMode::SoftKey).await?;
        }
        self.rebuild().await?;
        Ok(seeds.len())
    }

    async fn upsert_indexed(&self, entry: NewVectorEntry) -> Result<()> {
        let created_at = from_millis(to_millis(Utc::now()));
        let id = self.store.upsert(entry.clone(), UpsertMode::SoftKey).await?;
        let mut index = self.index.write().await;
        index.entries.retain(|e| e.id != id);
        index.entries.push(entry.into_entry(id, created_at));
        Ok(())
    }

    async fn describe_area(&self, label: &TaxonomyLabel) -> Result<String> {
        let system = "You maintain a learning taxonomy. Return JSON {\"description\": string} \
                      with one or two sentences describing the area.";
        let user = format!(
            "Domain: {}\nArea: {}\nExample skill: {}",
            label.domain, label.area, label.skill
        );
        let reply = self.llm.complete_json(system, &user, None, Some(1)).await?;
        reply
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::Llm("description missing from reply".into()))
    }
}
