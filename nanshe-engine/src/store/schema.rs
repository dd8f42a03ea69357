//! CozoDB schema definitions for the engine store
//!
//! Times are stored as epoch milliseconds. JSON documents (plans, atom
//! bodies, metadata) are stored as strings; embeddings are typed `F32`
//! vectors behind an HNSW index.

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Replaced by the embedding dimension when a migration is rendered.
pub const DIMENSION_PLACEHOLDER: &str = "{dimension}";

/// Users and the capsule tree (Datalog)
pub const CONTENT_SCHEMA: &str = r#"
{
    :create schema_version {
        version: Int =>
        applied_at: Int,
        description: String
    }
}
{
    :create id_sequence {
        name: String =>
        value: Int
    }
}
{
    :create users {
        id: Int =>
        email: String,
        tier: String,
        is_superuser: Bool,
        xp: Int,
        created_at: Int,
        last_login_at: Int?
    }
}
{
    :create capsules {
        id: Int =>
        title: String,
        domain: String,
        area: String,
        main_skill: String,
        creator_id: Int,
        is_public: Bool,
        language: String?,
        plan_json: String?,
        status: String,
        created_at: Int
    }
}
{
    :create granules {
        id: Int =>
        capsule_id: Int,
        position: Int,
        title: String
    }
}
{
    :create molecules {
        id: Int =>
        granule_id: Int,
        position: Int,
        title: String,
        status: String
    }
}
{
    :create atoms {
        id: Int =>
        molecule_id: Int,
        title: String,
        position: Int,
        content_type: String,
        content_json: String,
        difficulty: String?,
        is_bonus: Bool,
        created_at: Int
    }
}
{
    :create enrollments {
        user_id: Int,
        capsule_id: Int =>
        enrolled_at: Int
    }
}
{
    :create golden_plans {
        id: Int =>
        domain: String,
        area: String,
        main_skill: String,
        plan_json: String,
        created_at: Int
    }
}
{
    ::index create granules:by_capsule { capsule_id }
}
{
    ::index create molecules:by_granule { granule_id }
}
{
    ::index create atoms:by_molecule { molecule_id }
}
{
    ::index create enrollments:by_capsule { capsule_id }
}
"#;

/// Learner progress, coach and accounting tables (Migration v2)
pub const LEARNER_SCHEMA: &str = r#"
{
    :create capsule_progress {
        user_id: Int,
        capsule_id: Int =>
        skill: String,
        xp: Int,
        bonus_xp: Int
    }
}
{
    :create atom_progress {
        user_id: Int,
        atom_id: Int =>
        status: String,
        xp_awarded: Bool,
        completed_at: Int?,
        reset_count: Int
    }
}
{
    :create molecule_reviews {
        user_id: Int,
        molecule_id: Int =>
        next_review_at: Int,
        last_review_at: Int?,
        last_error_at: Int?,
        interval_days: Float,
        ease_factor: Float,
        streak: Int,
        review_count: Int,
        success_count: Int,
        total_errors: Int,
        total_resets: Int,
        last_outcome: String?
    }
}
{
    :create answer_logs {
        id: Int =>
        user_id: Int,
        atom_id: Int,
        is_correct: Bool,
        payload_json: String,
        created_at: Int
    }
}
{
    :create activity_logs {
        id: Int =>
        user_id: Int,
        capsule_id: Int?,
        start_time: Int,
        end_time: Int?
    }
}
{
    :create coach_threads {
        id: Int =>
        user_id: Int,
        location_key: String,
        context_json: String,
        created_at: Int,
        updated_at: Int
    }
}
{
    :create coach_messages {
        id: Int =>
        thread_id: Int,
        role: String,
        content: String,
        payload_json: String?,
        created_at: Int
    }
}
{
    :create coach_energy {
        user_id: Int =>
        current_energy: Float,
        updated_at: Int
    }
}
{
    :create classification_feedback {
        id: Int =>
        user_id: Int?,
        input_text: String,
        predicted_json: String?,
        final_domain: String,
        final_area: String,
        final_skill: String,
        is_correct: Bool,
        notes: String?,
        metadata_json: String,
        created_at: Int
    }
}
{
    :create llm_usage {
        id: Int =>
        user_id: Int,
        feature: String,
        model: String,
        prompt_tokens: Int,
        completion_tokens: Int,
        cost_usd: Float,
        created_at: Int
    }
}
{
    ::index create answer_logs:by_user { user_id }
}
{
    ::index create activity_logs:by_user { user_id }
}
{
    ::index create coach_threads:by_location { user_id, location_key }
}
{
    ::index create coach_messages:by_thread { thread_id }
}
{
    ::index create llm_usage:by_user { user_id }
}
"#;

/// Typed vector store (Migration v3)
///
/// The embedding width is fixed when the store is created and recorded in
/// `vector_settings`. Rows that are not `searchable` (zero or unreadable
/// vectors) stay listable but are left out of the HNSW graph.
pub const VECTOR_SCHEMA: &str = r#"
{
    :create vector_settings {
        name: String =>
        dimension: Int
    }
}
{
    :create vector_entries {
        id: Int =>
        text: String,
        embedding: <F32; {dimension}>,
        searchable: Bool,
        domain: String?,
        area: String?,
        skill: String?,
        content_type: String,
        source_language: String?,
        capsule_id: Int?,
        molecule_id: Int?,
        metadata_json: String,
        created_at: Int
    }
}
{
    ::index create vector_entries:by_soft_key { text, content_type, skill }
}
{
    ::index create vector_entries:by_content_type { content_type }
}
{
    ::index create vector_entries:by_capsule { capsule_id }
}
{
    ::index create vector_entries:by_molecule { molecule_id }
}
{
    ::hnsw create vector_entries:semantic_idx {
        dim: {dimension},
        m: 16,
        ef_construction: 200,
        dtype: F32,
        distance: Cosine,
        fields: [embedding],
        filter: searchable
    }
}
{
    ?[name, dimension] <- [["embedding", {dimension}]]
    :put vector_settings { name => dimension }
}
"#;

/// Schema migration definition
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number for this migration
    pub version: u32,
    /// Human-readable description of what this migration does
    pub description: &'static str,
    /// The Datalog script to execute for this migration
    pub script: &'static str,
}

impl Migration {
    /// The script with the embedding dimension filled in
    pub fn render(&self, dimension: usize) -> String {
        self.script
            .replace(DIMENSION_PLACEHOLDER, &dimension.to_string())
    }
}

/// All migrations in order
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Content tree",
        script: CONTENT_SCHEMA,
    },
    Migration {
        version: 2,
        description: "Learner progress, coach and usage",
        script: LEARNER_SCHEMA,
    },
    Migration {
        version: 3,
        description: "Typed vector store with HNSW index",
        script: VECTOR_SCHEMA,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_current() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(MIGRATIONS.last().map(|m| m.version), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_relation_comes_first() {
        assert!(CONTENT_SCHEMA.contains(":create schema_version"));
    }

    #[test]
    fn test_vector_schema_renders_dimension() {
        let rendered = MIGRATIONS[2].render(8);
        assert!(rendered.contains("embedding: <F32; 8>"));
        assert!(rendered.contains("dim: 8,"));
        assert!(!rendered.contains(DIMENSION_PLACEHOLDER));
        // earlier scripts carry no placeholder
        assert_eq!(MIGRATIONS[0].render(8), CONTENT_SCHEMA);
    }
}
