//! Vector store trait and its Cozo implementation.
//!
//! Embeddings live in a typed `<F32; D>` column searched through the
//! `vector_entries:semantic_idx` HNSW index with cosine distance. Inputs of
//! another width are folded to `D` first. Zero, empty or non-finite vectors
//! are stored unsearchable, so they never match a query.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use cozo::{DataValue, Vector};
use ndarray::Array1;
use tracing::trace;

use super::cozo::*;
use crate::embedding::{is_zero, normalize, project};
use crate::types::{Id, NewVectorEntry, UpsertMode, VectorEntry, VectorFilter};
use crate::Result;

const VECTOR_COLUMNS: &str = "id, text, embedding, domain, area, skill, content_type, \
     source_language, capsule_id, molecule_id, metadata_json, created_at";

/// Candidate list size of an HNSW search, never below `k`
const SEARCH_EF: usize = 64;

/// Persistent store of embedded texts
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert an entry, or merge it into its soft-key twin; returns the row id
    async fn upsert(&self, entry: NewVectorEntry, mode: UpsertMode) -> Result<Id>;

    /// Top `k` entries matching `filter`, by descending cosine similarity
    async fn query(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        k: usize,
    ) -> Result<Vec<(VectorEntry, f32)>>;

    /// Every entry matching `filter`, oldest first
    async fn entries(&self, filter: &VectorFilter) -> Result<Vec<VectorEntry>>;

    /// Delete every entry matching `filter`; returns how many were removed
    async fn delete(&self, filter: &VectorFilter) -> Result<usize>;
}

/// Filter as one Datalog expression over the `vector_entries` columns
fn filter_expression(filter: &VectorFilter) -> (Option<String>, BTreeMap<String, DataValue>) {
    let mut terms = Vec::new();
    let mut bound = BTreeMap::new();
    let mut eq = |column: &str, value: DataValue| {
        terms.push(format!("{column} == $f_{column}"));
        bound.insert(format!("f_{column}"), value);
    };
    if let Some(domain) = &filter.domain {
        eq("domain", DataValue::from(domain.as_str()));
    }
    if let Some(area) = &filter.area {
        eq("area", DataValue::from(area.as_str()));
    }
    if let Some(skill) = &filter.skill {
        eq("skill", DataValue::from(skill.as_str()));
    }
    if let Some(language) = &filter.source_language {
        eq("source_language", DataValue::from(language.as_str()));
    }
    if let Some(capsule_id) = filter.capsule_id {
        eq("capsule_id", DataValue::from(capsule_id));
    }
    if let Some(molecule_id) = filter.molecule_id {
        eq("molecule_id", DataValue::from(molecule_id));
    }
    if !filter.content_types.is_empty() {
        terms.push("is_in(content_type, $f_content_types)".to_string());
        bound.insert(
            "f_content_types".to_string(),
            DataValue::List(
                filter
                    .content_types
                    .iter()
                    .map(|t| DataValue::from(t.as_str()))
                    .collect(),
            ),
        );
    }
    let expression = (!terms.is_empty()).then(|| terms.join(" && "));
    (expression, bound)
}

fn to_vector(values: &[f32]) -> DataValue {
    DataValue::Vec(Vector::F32(Array1::from_vec(values.to_vec())))
}

impl CozoStore {
    /// Fold, clean and normalize a vector to the stored width.
    ///
    /// Returns `None` when nothing searchable is left.
    fn fit_vector(&self, vector: &[f32]) -> Option<Vec<f32>> {
        if vector.is_empty() || vector.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let mut fitted = if vector.len() == self.vector_dimension() {
            vector.to_vec()
        } else {
            project(vector, self.vector_dimension())
        };
        normalize(&mut fitted);
        (!is_zero(&fitted)).then_some(fitted)
    }

    /// Row with the same `(text, content_type, skill)` and the same owner
    async fn soft_key_twin(&self, entry: &NewVectorEntry) -> Result<Option<Id>> {
        let rows = self
            .run_query(
                "?[id] := text = $text, content_type = $content_type, \
                 *vector_entries{id, text, content_type, skill, capsule_id, molecule_id}, \
                 skill == $skill, capsule_id == $capsule_id, molecule_id == $molecule_id",
                params([
                    ("text", DataValue::from(entry.text.as_str())),
                    ("content_type", DataValue::from(entry.content_type.as_str())),
                    ("skill", opt_str(entry.skill.as_deref())),
                    ("capsule_id", opt_int(entry.capsule_id)),
                    ("molecule_id", opt_int(entry.molecule_id)),
                ]),
            )
            .await?;
        let ids = rows
            .rows
            .iter()
            .map(|row| get_int(row, 0, "vector id"))
            .collect::<Result<Vec<_>>>()?;
        Ok(ids.into_iter().min())
    }

    async fn put_vector_entry(&self, id: Id, entry: &NewVectorEntry) -> Result<()> {
        let fitted = self.fit_vector(&entry.vector);
        let searchable = fitted.is_some();
        let embedding = fitted.unwrap_or_else(|| vec![0.0; self.vector_dimension()]);

        let query = format!(
            "?[{VECTOR_COLUMNS}, searchable] <- [[$id, $text, $embedding, $domain, $area, $skill, \
             $content_type, $source_language, $capsule_id, $molecule_id, $metadata_json, \
             $created_at, $searchable]] \
             :put vector_entries {{id => text, embedding, searchable, domain, area, skill, \
             content_type, source_language, capsule_id, molecule_id, metadata_json, created_at}}"
        );
        self.run_mutation(
            &query,
            params([
                ("id", DataValue::from(id)),
                ("text", DataValue::from(entry.text.as_str())),
                ("embedding", to_vector(&embedding)),
                ("searchable", DataValue::from(searchable)),
                ("domain", opt_str(entry.domain.as_deref())),
                ("area", opt_str(entry.area.as_deref())),
                ("skill", opt_str(entry.skill.as_deref())),
                ("content_type", DataValue::from(entry.content_type.as_str())),
                ("source_language", opt_str(entry.source_language.as_deref())),
                ("capsule_id", opt_int(entry.capsule_id)),
                ("molecule_id", opt_int(entry.molecule_id)),
                ("metadata_json", DataValue::from(to_json(&entry.metadata)?)),
                ("created_at", time(Utc::now())),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Ids of the entries matching `filter`
    async fn matching_vector_ids(&self, filter: &VectorFilter) -> Result<Vec<Id>> {
        let (expression, bound) = filter_expression(filter);
        let query = match expression {
            Some(expr) => format!(
                "?[id] := *vector_entries{{{VECTOR_COLUMNS}}}, {expr}"
            ),
            None => "?[id] := *vector_entries{id}".to_string(),
        };
        let rows = self.run_query(&query, bound).await?;
        rows.rows
            .iter()
            .map(|row| get_int(row, 0, "vector id"))
            .collect()
    }
}

#[async_trait]
impl VectorStore for CozoStore {
    async fn upsert(&self, entry: NewVectorEntry, mode: UpsertMode) -> Result<Id> {
        let existing = match mode {
            UpsertMode::Insert => None,
            UpsertMode::SoftKey => self.soft_key_twin(&entry).await?,
        };
        let id = match existing {
            Some(id) => id,
            None => self.next_id().await?,
        };
        self.put_vector_entry(id, &entry).await?;
        Ok(id)
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        k: usize,
    ) -> Result<Vec<(VectorEntry, f32)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(query_vector) = self.fit_vector(vector) else {
            return Ok(Vec::new());
        };

        let (expression, mut bound) = filter_expression(filter);
        let filter_option = expression
            .map(|expr| format!(", filter: {expr}"))
            .unwrap_or_default();
        let query = format!(
            "?[{VECTOR_COLUMNS}, distance] := ~vector_entries:semantic_idx{{{VECTOR_COLUMNS} | \
             query: $query, k: $k, ef: $ef, bind_distance: distance{filter_option}}}"
        );
        bound.insert("query".to_string(), to_vector(&query_vector));
        bound.insert("k".to_string(), DataValue::from(k as i64));
        bound.insert("ef".to_string(), DataValue::from(SEARCH_EF.max(k) as i64));

        let rows = self.run_query(&query, bound).await?;
        let mut scored = Vec::with_capacity(rows.rows.len());
        for row in &rows.rows {
            let distance = row.get(12).and_then(DataValue::get_float);
            match (parse_vector_row(row), distance) {
                (Ok(entry), Some(distance)) if distance.is_finite() => {
                    let score = (1.0 - distance as f32).clamp(-1.0, 1.0);
                    scored.push((entry, score));
                }
                (Err(e), _) => trace!(error = %e, "Skipping unreadable vector row"),
                _ => trace!("Skipping vector row without a distance"),
            }
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.id.cmp(&b.0.id)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn entries(&self, filter: &VectorFilter) -> Result<Vec<VectorEntry>> {
        let (expression, bound) = filter_expression(filter);
        let condition = expression.map(|expr| format!(", {expr}")).unwrap_or_default();
        let query =
            format!("?[{VECTOR_COLUMNS}] := *vector_entries{{{VECTOR_COLUMNS}}}{condition}");
        let rows = self.run_query(&query, bound).await?;
        let mut entries = Vec::with_capacity(rows.rows.len());
        for row in &rows.rows {
            match parse_vector_row(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => trace!(error = %e, "Skipping unreadable vector row"),
            }
        }
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    async fn delete(&self, filter: &VectorFilter) -> Result<usize> {
        let ids = self.matching_vector_ids(filter).await?;
        self.delete_vector_ids(&ids).await
    }
}

impl CozoStore {
    /// Remove vector rows by id; returns how many were given
    pub(crate) async fn delete_vector_ids(&self, ids: &[Id]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let rows: Vec<DataValue> = ids
            .iter()
            .map(|id| DataValue::List(vec![DataValue::from(*id)]))
            .collect();
        self.run_mutation(
            "?[id] <- $ids :rm vector_entries {id}",
            params([("ids", DataValue::List(rows))]),
        )
        .await?;
        Ok(ids.len())
    }
}

fn parse_vector_row(row: &[DataValue]) -> Result<VectorEntry> {
    let vector = match row.get(2) {
        Some(DataValue::Vec(Vector::F32(values))) => values.to_vec(),
        Some(DataValue::Vec(Vector::F64(values))) => values.iter().map(|x| *x as f32).collect(),
        _ => Vec::new(),
    };
    let metadata = get_opt_string(row, 10)
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(serde_json::Value::Null);
    Ok(VectorEntry {
        id: get_int(row, 0, "vector id")?,
        text: get_string(row, 1, "text")?,
        vector,
        domain: get_opt_string(row, 3),
        area: get_opt_string(row, 4),
        skill: get_opt_string(row, 5),
        content_type: get_string(row, 6, "content_type")?,
        source_language: get_opt_string(row, 7),
        capsule_id: get_opt_int(row, 8),
        molecule_id: get_opt_int(row, 9),
        metadata,
        created_at: get_time(row, 11, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TAXONOMY_CONTENT_TYPE;

    fn entry(text: &str, vector: Vec<f32>, skill: &str) -> NewVectorEntry {
        NewVectorEntry::new(text, vector, TAXONOMY_CONTENT_TYPE)
            .domain("d")
            .area("a")
            .skill(skill)
    }

    async fn store() -> CozoStore {
        CozoStore::open_mem_with_dimension(4).await.unwrap()
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let store = store().await;
        store.upsert(entry("a", vec![1.0, 0.0], "alpha"), UpsertMode::Insert).await.unwrap();
        store.upsert(entry("b", vec![0.7, 0.7], "beta"), UpsertMode::Insert).await.unwrap();
        store.upsert(entry("c", vec![0.0, 1.0], "gamma"), UpsertMode::Insert).await.unwrap();

        let hits = store.query(&[1.0, 0.0], &VectorFilter::new(), 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.skill.as_deref(), Some("alpha"));
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
        assert_eq!(hits[1].0.skill.as_deref(), Some("beta"));
        assert!((hits[1].1 - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_self_similarity_is_one() {
        let store = store().await;
        let v = vec![0.3, -0.2, 0.9, 0.1];
        store.upsert(entry("x", v.clone(), "s"), UpsertMode::Insert).await.unwrap();
        let stored = store.entries(&VectorFilter::new()).await.unwrap();
        assert_eq!(stored[0].vector.len(), 4);
        let hits = store.query(&stored[0].vector, &VectorFilter::new(), 1).await.unwrap();
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_soft_key_upsert_merges() {
        let store = store().await;
        let first = store
            .upsert(entry("same", vec![1.0, 0.0], "s"), UpsertMode::SoftKey)
            .await
            .unwrap();
        let second = store
            .upsert(entry("same", vec![0.0, 1.0], "s"), UpsertMode::SoftKey)
            .await
            .unwrap();
        assert_eq!(first, second);
        let all = store.entries(&VectorFilter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].vector[1] > 0.99);

        let third = store
            .upsert(entry("same", vec![0.0, 1.0], "other"), UpsertMode::SoftKey)
            .await
            .unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn test_soft_key_matches_missing_skill() {
        let store = store().await;
        let untagged = || NewVectorEntry::new("plain", vec![1.0, 0.0], "plan");
        let first = store.upsert(untagged(), UpsertMode::SoftKey).await.unwrap();
        let second = store.upsert(untagged(), UpsertMode::SoftKey).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_soft_key_never_merges_across_owners() {
        let store = store().await;
        let lesson = |capsule_id, molecule_id| {
            NewVectorEntry::new("# Chapter 1.1", vec![1.0, 0.0], "lesson")
                .skill("Chapter 1.1")
                .owner(capsule_id, molecule_id)
        };
        let a = store.upsert(lesson(1, 10), UpsertMode::SoftKey).await.unwrap();
        let b = store.upsert(lesson(2, 20), UpsertMode::SoftKey).await.unwrap();
        let again = store.upsert(lesson(1, 10), UpsertMode::SoftKey).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a, again);
        assert_eq!(store.entries(&VectorFilter::new().capsule(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsearchable_rows_are_skipped_and_widths_projected() {
        let store = store().await;
        store.upsert(entry("zero", vec![0.0, 0.0], "z"), UpsertMode::Insert).await.unwrap();
        store.upsert(entry("nan", vec![f32::NAN, 1.0], "n"), UpsertMode::Insert).await.unwrap();
        store
            .upsert(entry("wide", vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], "w"), UpsertMode::Insert)
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], &VectorFilter::new(), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.skill.as_deref(), Some("w"));
        // unsearchable rows are still listed
        assert_eq!(store.entries(&VectorFilter::new()).await.unwrap().len(), 3);
        assert!(store.query(&[0.0, 0.0], &VectorFilter::new(), 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filters_and_delete() {
        let store = store().await;
        store.upsert(entry("a", vec![1.0, 0.0], "alpha"), UpsertMode::Insert).await.unwrap();
        store
            .upsert(
                NewVectorEntry::new("p", vec![1.0, 0.0], "plan").skill("alpha"),
                UpsertMode::Insert,
            )
            .await
            .unwrap();

        let plans = VectorFilter::new().content_type("plan");
        let hits = store.query(&[1.0, 0.0], &plans, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.text, "p");

        assert_eq!(store.delete(&VectorFilter::new().skill("alpha")).await.unwrap(), 2);
        assert!(store.entries(&VectorFilter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_owner_filter_isolates_capsules() {
        let store = store().await;
        store
            .upsert(entry("mine", vec![1.0, 0.0], "s").owner(1, 10), UpsertMode::Insert)
            .await
            .unwrap();
        store
            .upsert(entry("theirs", vec![1.0, 0.0], "s").owner(2, 20), UpsertMode::Insert)
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], &VectorFilter::new().capsule(1), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.text, "mine");
        assert_eq!(hits[0].0.molecule_id, Some(10));

        assert_eq!(store.delete(&VectorFilter::new().molecule(20)).await.unwrap(), 1);
        let left = store.entries(&VectorFilter::new()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].capsule_id, Some(1));
    }
}
