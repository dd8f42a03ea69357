//! Classifier tests against the shared store.

mod common;

use common::{ScriptedProvider, engine, user};
use nanshe_engine::VectorStore;
use nanshe_engine::classifier::FeedbackInput;
use nanshe_engine::types::{
    NewVectorEntry, SubscriptionTier, TAXONOMY_CONTENT_TYPE, TaxonomyLabel, UpsertMode,
    VectorFilter,
};
use serde_json::json;

fn label(domain: &str, area: &str, skill: &str) -> TaxonomyLabel {
    TaxonomyLabel {
        domain: domain.into(),
        area: area.into(),
        skill: skill.into(),
    }
}

#[tokio::test]
async fn test_top_matches_in_similarity_order() {
    let engine = engine(ScriptedProvider::new()).await;
    for (skill, vector) in [
        ("alpha", vec![1.0, 0.0]),
        ("beta", vec![0.7, 0.7]),
        ("gamma", vec![0.0, 1.0]),
    ] {
        engine
            .store
            .upsert(
                NewVectorEntry::new(skill, vector, TAXONOMY_CONTENT_TYPE)
                    .domain("greek")
                    .area("letters")
                    .skill(skill),
                UpsertMode::Insert,
            )
            .await
            .unwrap();
    }
    assert_eq!(engine.classifier.rebuild().await.unwrap(), 3);

    let matches = engine
        .classifier
        .classify_vector(&[1.0, 0.0], &VectorFilter::new(), 2, 0.1)
        .await
        .unwrap();
    let names: Vec<&str> = matches.iter().map(|m| m.category.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!((matches[0].confidence - 1.0).abs() < 1e-5);
    assert!((matches[1].confidence - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    assert_eq!(matches[0].category.domain, "greek");

    let none = engine
        .classifier
        .classify_vector(&[0.0, 0.0], &VectorFilter::new(), 2, 0.1)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_feedback_steers_the_next_capsule() {
    let provider = ScriptedProvider::new();
    provider.answer(
        "learning taxonomy",
        json!({"description": "Systems programming languages."}),
    );
    let engine = engine(provider.clone()).await;
    user(&engine, 1, SubscriptionTier::Free).await;

    let before = engine.generator.create_pending(1, "Rust ownership", None).await.unwrap();
    assert_eq!(before.domain, "others");

    let feedback = engine
        .classifier
        .record_feedback(FeedbackInput {
            user_id: Some(1),
            input_text: "Rust ownership".into(),
            predicted: Some(label("others", "general", "rust ownership")),
            final_label: label("programming", "systems", "rust"),
            is_correct: false,
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(
        feedback.metadata["area_description"],
        "Systems programming languages."
    );
    assert_eq!(provider.calls("learning taxonomy"), 1);

    let after = engine.generator.create_pending(1, "Rust ownership", None).await.unwrap();
    assert_eq!(
        (after.domain.as_str(), after.area.as_str(), after.main_skill.as_str()),
        ("programming", "systems", "rust")
    );

    // a known pair does not ask for a description again
    engine
        .classifier
        .record_feedback(FeedbackInput {
            user_id: None,
            input_text: "Borrow checker".into(),
            predicted: None,
            final_label: label("programming", "systems", "rust"),
            is_correct: true,
            notes: Some("operator".into()),
        })
        .await
        .unwrap();
    assert_eq!(provider.calls("learning taxonomy"), 1);
    assert_eq!(engine.store.list_feedback().await.unwrap().len(), 2);
}
