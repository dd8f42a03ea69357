//! Vector entries and other retrieval-side records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Id, LearningPlan};

/// `content_type` of taxonomy seed vectors.
pub const TAXONOMY_CONTENT_TYPE: &str = "taxonomy";
/// `content_type` of vectors written by the classifier feedback loop.
pub const TAXONOMY_FEEDBACK_CONTENT_TYPE: &str = "taxonomy_feedback";
/// `content_type` of cached learning plans.
pub const PLAN_CONTENT_TYPE: &str = "plan";

/// A stored text with its embedding and taxonomy tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: Id,
    pub text: String,
    pub vector: Vec<f32>,
    pub domain: Option<String>,
    pub area: Option<String>,
    pub skill: Option<String>,
    pub content_type: String,
    pub source_language: Option<String>,
    /// Owning capsule, for course content
    pub capsule_id: Option<Id>,
    /// Owning molecule, for course content
    pub molecule_id: Option<Id>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A vector entry before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVectorEntry {
    pub text: String,
    pub vector: Vec<f32>,
    pub domain: Option<String>,
    pub area: Option<String>,
    pub skill: Option<String>,
    pub content_type: String,
    pub source_language: Option<String>,
    pub capsule_id: Option<Id>,
    pub molecule_id: Option<Id>,
    pub metadata: Value,
}

impl NewVectorEntry {
    pub fn new(text: impl Into<String>, vector: Vec<f32>, content_type: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            vector,
            domain: None,
            area: None,
            skill: None,
            content_type: content_type.into(),
            source_language: None,
            capsule_id: None,
            molecule_id: None,
            metadata: Value::Object(Default::default()),
        }
    }

    /// Tie the entry to a molecule of a capsule
    pub fn owner(mut self, capsule_id: Id, molecule_id: Id) -> Self {
        self.capsule_id = Some(capsule_id);
        self.molecule_id = Some(molecule_id);
        self
    }

    /// The stored form of this entry
    pub fn into_entry(self, id: Id, created_at: DateTime<Utc>) -> VectorEntry {
        VectorEntry {
            id,
            text: self.text,
            vector: self.vector,
            domain: self.domain,
            area: self.area,
            skill: self.skill,
            content_type: self.content_type,
            source_language: self.source_language,
            capsule_id: self.capsule_id,
            molecule_id: self.molecule_id,
            metadata: self.metadata,
            created_at,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    pub fn skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = Some(skill.into());
        self
    }

    pub fn source_language(mut self, language: Option<String>) -> Self {
        self.source_language = language;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// How an upsert treats an existing row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpsertMode {
    /// Always insert a new row
    #[default]
    Insert,
    /// Merge into the row with the same `(text, content_type, skill)`
    SoftKey,
}

/// Conjunctive filter over vector entries; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorFilter {
    pub domain: Option<String>,
    pub area: Option<String>,
    pub skill: Option<String>,
    /// Matches when the entry's type is any of these
    pub content_types: Vec<String>,
    pub source_language: Option<String>,
    pub capsule_id: Option<Id>,
    pub molecule_id: Option<Id>,
}

impl VectorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    pub fn skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = Some(skill.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_types.push(content_type.into());
        self
    }

    pub fn source_language(mut self, language: impl Into<String>) -> Self {
        self.source_language = Some(language.into());
        self
    }

    pub fn capsule(mut self, capsule_id: Id) -> Self {
        self.capsule_id = Some(capsule_id);
        self
    }

    pub fn molecule(mut self, molecule_id: Id) -> Self {
        self.molecule_id = Some(molecule_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether an entry satisfies every set field
    pub fn matches_entry(&self, entry: &VectorEntry) -> bool {
        fn field_ok<T: PartialEq + ?Sized>(wanted: Option<&T>, actual: Option<&T>) -> bool {
            wanted.is_none() || wanted == actual
        }
        field_ok(self.domain.as_deref(), entry.domain.as_deref())
            && field_ok(self.area.as_deref(), entry.area.as_deref())
            && field_ok(self.skill.as_deref(), entry.skill.as_deref())
            && field_ok(self.source_language.as_deref(), entry.source_language.as_deref())
            && field_ok(self.capsule_id.as_ref(), entry.capsule_id.as_ref())
            && field_ok(self.molecule_id.as_ref(), entry.molecule_id.as_ref())
            && (self.content_types.is_empty()
                || self.content_types.iter().any(|t| *t == entry.content_type))
    }
}

/// Taxonomy triple used by classifier feedback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxonomyLabel {
    pub domain: String,
    pub area: String,
    pub skill: String,
}

/// Correction submitted for a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationFeedback {
    pub id: Id,
    pub user_id: Option<Id>,
    pub input_text: String,
    pub predicted: Option<TaxonomyLabel>,
    pub final_label: TaxonomyLabel,
    pub is_correct: bool,
    pub notes: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Curated plan used as a style reference by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenPlan {
    pub id: Id,
    pub domain: String,
    pub area: String,
    pub main_skill: String,
    pub plan: LearningPlan,
    pub created_at: DateTime<Utc>,
}

/// Token accounting for one gateway call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub id: Id,
    pub user_id: Id,
    pub feature: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// Totals over a user's usage records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(domain: Option<&str>, skill: Option<&str>, content_type: &str) -> VectorEntry {
        let mut entry = NewVectorEntry::new("t", vec![1.0], content_type);
        entry.domain = domain.map(str::to_string);
        entry.skill = skill.map(str::to_string);
        entry.into_entry(1, Utc::now())
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = VectorFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches_entry(&tagged(None, None, "lesson")));
    }

    #[test]
    fn test_filter_requires_every_set_field() {
        let filter = VectorFilter::new().domain("languages").skill("japanese");
        assert!(filter.matches_entry(&tagged(Some("languages"), Some("japanese"), "plan")));
        assert!(!filter.matches_entry(&tagged(Some("languages"), None, "plan")));
        assert!(!filter.matches_entry(&tagged(Some("science"), Some("japanese"), "plan")));
    }

    #[test]
    fn test_content_types_are_alternatives() {
        let filter = VectorFilter::new()
            .content_type(TAXONOMY_CONTENT_TYPE)
            .content_type(TAXONOMY_FEEDBACK_CONTENT_TYPE);
        assert!(filter.matches_entry(&tagged(None, None, "taxonomy")));
        assert!(filter.matches_entry(&tagged(None, None, "taxonomy_feedback")));
        assert!(!filter.matches_entry(&tagged(None, None, "lesson")));
    }

    #[test]
    fn test_owner_filter() {
        let owned = NewVectorEntry::new("t", vec![1.0], "lesson")
            .owner(7, 70)
            .into_entry(1, Utc::now());
        assert!(VectorFilter::new().capsule(7).matches_entry(&owned));
        assert!(VectorFilter::new().capsule(7).molecule(70).matches_entry(&owned));
        assert!(!VectorFilter::new().capsule(8).matches_entry(&owned));
        assert!(!VectorFilter::new().capsule(7).matches_entry(&tagged(None, None, "lesson")));
    }
}
