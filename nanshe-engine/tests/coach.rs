//! Coach tests: energy wallet, threads and history.

mod common;

use chrono::{Duration, Utc};
use common::{COACH_PROMPT, PLAN_PROMPT, ScriptedProvider, engine, plan_json, user};
use nanshe_engine::types::{
    CoachContext, CoachRole, EnergyWallet, NewVectorEntry, SubscriptionTier, UpsertMode,
};
use nanshe_engine::{EngineError, VectorStore};
use serde_json::json;

const SUMMARY_PROMPT: &str = "Summarize this tutoring conversation";

fn coach_reply() -> serde_json::Value {
    json!({
        "response": "Try splitting the sentence into subject and verb.",
        "suggestions": ["Review the conjugation table"],
    })
}

#[tokio::test]
async fn test_empty_wallet_reports_wait() {
    let provider = ScriptedProvider::new();
    provider.answer(COACH_PROMPT, coach_reply());
    let engine = engine(provider.clone()).await;
    user(&engine, 1, SubscriptionTier::Free).await;
    let now = Utc::now();
    engine
        .store
        .put_energy(&EnergyWallet {
            user_id: 1,
            current_energy: 0.0,
            updated_at: now,
        })
        .await
        .unwrap();

    let err = engine
        .coach
        .ask_at(1, "Why is this wrong?", CoachContext::Dashboard, now)
        .await
        .unwrap_err();
    match err {
        EngineError::CoachEnergyDepleted(status) => {
            assert_eq!(status.seconds_until_next_message, 900);
            assert_eq!(status.next_message_available_at, now + Duration::seconds(900));
        }
        other => panic!("expected depleted energy, got {other:?}"),
    }
    assert_eq!(provider.calls(COACH_PROMPT), 0);

    // fifteen minutes later exactly one message is affordable
    let later = now + Duration::seconds(900);
    engine
        .coach
        .ask_at(1, "Why is this wrong?", CoachContext::Dashboard, later)
        .await
        .unwrap();
    let status = engine.coach.energy_status(1, later).await.unwrap();
    assert!(status.current.abs() < 1e-3);
}

#[tokio::test]
async fn test_reply_is_persisted_in_location_thread() {
    let provider = ScriptedProvider::new();
    provider.answer(COACH_PROMPT, coach_reply());
    let engine = engine(provider).await;
    user(&engine, 1, SubscriptionTier::Free).await;
    let now = Utc::now();

    let reply = engine
        .coach
        .ask_at(1, "  How do I conjugate ser?  ", CoachContext::Dashboard, now)
        .await
        .unwrap();
    assert_eq!(reply.suggestions, Some(vec!["Review the conjugation table".to_string()]));
    assert_eq!(reply.next_steps, None);

    let history = engine.coach.history(1, CoachContext::Dashboard).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, CoachRole::User);
    assert_eq!(history[0].content, "How do I conjugate ser?");
    assert_eq!(history[1].role, CoachRole::Coach);
    assert_eq!(history[1].content, reply.response);
    assert!(history.iter().all(|m| m.thread_id == reply.thread_id));

    let status = engine.coach.energy_status(1, now).await.unwrap();
    assert!((status.current - 75.0).abs() < 1e-3);

    let other = engine
        .coach
        .history(1, CoachContext::Capsule { capsule_id: 42 })
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn test_failed_answer_refunds_energy() {
    // no coach rule: every model call fails
    let engine = engine(ScriptedProvider::new()).await;
    user(&engine, 1, SubscriptionTier::Free).await;
    let now = Utc::now();

    let err = engine
        .coach
        .ask_at(1, "Help", CoachContext::Dashboard, now)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Llm(_)));
    let wallet = engine.store.get_energy(1).await.unwrap().unwrap();
    assert!((wallet.current_energy - 100.0).abs() < 1e-6);
    assert!(engine.coach.history(1, CoachContext::Dashboard).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_premium_is_never_charged_and_history_is_summarized() {
    let provider = ScriptedProvider::new();
    provider.answer(COACH_PROMPT, coach_reply());
    provider.answer(SUMMARY_PROMPT, json!({"summary": "The learner struggles with verbs."}));
    let engine = engine(provider.clone()).await;
    user(&engine, 2, SubscriptionTier::Premium).await;
    let now = Utc::now();

    for i in 0..5 {
        engine
            .coach
            .ask_at(2, &format!("Question {i}"), CoachContext::Dashboard, now)
            .await
            .unwrap();
    }
    assert!(engine.store.get_energy(2).await.unwrap().is_none());
    let status = engine.coach.energy_status(2, now).await.unwrap();
    assert_eq!(status.seconds_until_next_message, 0);

    // the fifth question is the first with more than three round-trips behind it
    assert_eq!(provider.calls(COACH_PROMPT), 5);
    assert_eq!(provider.calls(SUMMARY_PROMPT), 1);
    assert_eq!(engine.coach.history(2, CoachContext::Dashboard).await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_empty_message_is_rejected_before_charging() {
    let engine = engine(ScriptedProvider::new()).await;
    user(&engine, 1, SubscriptionTier::Free).await;
    let err = engine
        .coach
        .ask(1, "   ", CoachContext::Dashboard)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert!(engine.store.get_energy(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_course_material_stays_inside_the_capsule() {
    let provider = ScriptedProvider::new();
    provider.answer(PLAN_PROMPT, plan_json(16, 2));
    provider.answer(COACH_PROMPT, coach_reply());
    let engine = engine(provider.clone()).await;
    user(&engine, 1, SubscriptionTier::Premium).await;
    let capsule = engine.generator.generate(1, "Sailing", None).await.unwrap();
    let molecule = engine.store.capsule_outline(capsule.id).await.unwrap()[0]
        .molecule
        .clone();

    let question = "How do I tie a bowline?";
    let vector = engine.embeddings.embed(question).await;
    for (text, capsule_id, molecule_id) in [
        ("OWN-CAPSULE-NOTE", capsule.id, molecule.id),
        ("SECRET-OTHER-CAPSULE", 999, 9990),
    ] {
        engine
            .store
            .upsert(
                NewVectorEntry::new(text, vector.clone(), "lesson").owner(capsule_id, molecule_id),
                UpsertMode::Insert,
            )
            .await
            .unwrap();
    }

    let context = CoachContext::Molecule {
        capsule_id: capsule.id,
        molecule_id: molecule.id,
    };
    engine.coach.ask(1, question, context).await.unwrap();
    engine
        .coach
        .ask(1, question, CoachContext::Capsule { capsule_id: capsule.id })
        .await
        .unwrap();

    let prompts = provider.prompts(COACH_PROMPT);
    assert_eq!(prompts.len(), 2);
    for prompt in prompts {
        assert!(prompt.contains("OWN-CAPSULE-NOTE"));
        assert!(!prompt.contains("SECRET-OTHER-CAPSULE"));
    }
}
