//! Progress tests over a hand-built tree: XP awards, reviews, stats.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{ScriptedProvider, engine, user};
use nanshe_engine::content::{FallbackInput, fallback_content};
use nanshe_engine::store::NewCapsule;
use nanshe_engine::types::{
    Atom, AtomSlot, AtomStatus, Classification, ContentType, GenerationStatus, Id, Molecule,
    NewAtom, ReviewOutcome, SubscriptionTier,
};
use nanshe_engine::{Engine, EngineError};
use serde_json::json;

/// One capsule, one granule, one molecule holding `core` then `bonus` atoms
async fn tree(engine: &Engine, core: &[ContentType], bonus: &[ContentType]) -> (Molecule, Vec<Atom>) {
    let capsule = engine
        .store
        .create_capsule(
            NewCapsule {
                title: "Spanish basics".into(),
                classification: Classification::new("languages", "romance_languages", "spanish"),
                creator_id: 1,
                is_public: false,
                language: Some("en".into()),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let granule = engine
        .store
        .insert_granule(capsule.id, 1, "Level 1")
        .await
        .unwrap();
    let molecule = engine
        .store
        .insert_molecule(granule.id, 1, "Greetings", GenerationStatus::Completed)
        .await
        .unwrap();

    let input = FallbackInput {
        molecule_title: "Greetings",
        main_skill: "spanish",
        ..Default::default()
    };
    let slots = core
        .iter()
        .map(|ct| AtomSlot::New(NewAtom::core(ct.default_title(), fallback_content(*ct, &input))))
        .chain(
            bonus
                .iter()
                .map(|ct| AtomSlot::New(NewAtom::bonus(ct.default_title(), fallback_content(*ct, &input)))),
        )
        .collect();
    let atoms = engine
        .store
        .replace_molecule_atoms(molecule.id, slots, Utc::now())
        .await
        .unwrap();
    (molecule, atoms)
}

async fn setup() -> Engine {
    let engine = engine(ScriptedProvider::new()).await;
    user(&engine, 1, SubscriptionTier::Free).await;
    engine
}

fn id_of(atoms: &[Atom], ct: ContentType) -> Id {
    atoms.iter().find(|a| a.content_type == ct).unwrap().id
}

#[tokio::test]
async fn test_core_completion_awards_weighted_xp_once() {
    let engine = setup().await;
    let (_, atoms) = tree(&engine, &[ContentType::Lesson, ContentType::Quiz], &[]).await;
    let now = Utc::now();

    let lesson = engine
        .progress
        .record_atom_completion(1, id_of(&atoms, ContentType::Lesson), now)
        .await
        .unwrap();
    assert_eq!(lesson.xp_gained, 40_000);
    assert_eq!(lesson.badges, vec!["first_lesson"]);

    let again = engine
        .progress
        .record_atom_completion(1, id_of(&atoms, ContentType::Lesson), now)
        .await
        .unwrap();
    assert!(again.already_awarded);
    assert_eq!(again.xp_gained, 0);
    assert_eq!(again.capsule_xp, 40_000);

    let quiz = engine
        .progress
        .record_atom_completion(1, id_of(&atoms, ContentType::Quiz), now)
        .await
        .unwrap();
    assert_eq!(quiz.xp_gained, 20_000);
    assert_eq!(quiz.capsule_xp, 60_000);
    assert!(quiz.badges.is_empty());

    let stored = engine.store.require_user(1).await.unwrap();
    assert_eq!(stored.xp, 60_000);
    let progress = engine
        .store
        .get_atom_progress(1, id_of(&atoms, ContentType::Quiz))
        .await
        .unwrap()
        .unwrap();
    assert!(progress.xp_awarded);
    assert_eq!(progress.status, AtomStatus::Completed);
}

#[tokio::test]
async fn test_bonus_completions_draw_from_their_own_pool() {
    let engine = setup().await;
    let (_, atoms) = tree(
        &engine,
        &[ContentType::Lesson, ContentType::Quiz],
        &[ContentType::Quiz, ContentType::Quiz, ContentType::Quiz],
    )
    .await;
    let now = Utc::now();

    let mut gains = Vec::new();
    let mut last = None;
    for atom in atoms.iter().filter(|a| a.is_bonus) {
        let outcome = engine
            .progress
            .record_atom_completion(1, atom.id, now)
            .await
            .unwrap();
        assert!(outcome.is_bonus);
        gains.push(outcome.xp_gained);
        last = Some(outcome);
    }
    assert_eq!(gains, vec![17, 17, 16]);
    let last = last.unwrap();
    assert_eq!(last.capsule_bonus_xp, 50);
    assert_eq!(last.capsule_xp, 0);
}

#[tokio::test]
async fn test_concurrent_completions_award_once() {
    let engine = Arc::new(setup().await);
    let (_, atoms) = tree(&engine, &[ContentType::Lesson, ContentType::Quiz], &[]).await;
    let lesson = id_of(&atoms, ContentType::Lesson);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .progress
                    .record_atom_completion(1, lesson, Utc::now())
                    .await
                    .unwrap()
            })
        })
        .collect();
    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap().xp_gained;
    }
    assert_eq!(total, 40_000);
}

#[tokio::test]
async fn test_error_then_success_schedules_review() {
    let engine = setup().await;
    let (molecule, atoms) = tree(&engine, &[ContentType::Lesson, ContentType::Quiz], &[]).await;
    let quiz = id_of(&atoms, ContentType::Quiz);
    let now = Utc::now();

    let first = engine
        .progress
        .register_answer(1, quiz, false, &json!({"error_type": "grammar"}), now)
        .await
        .unwrap();
    assert_eq!(first.last_outcome, Some(ReviewOutcome::Error));
    assert_eq!(first.next_review_at, now + Duration::hours(8));

    let second = engine
        .progress
        .register_answer(1, quiz, true, &json!({}), now)
        .await
        .unwrap();
    assert_eq!(second.molecule_id, molecule.id);
    assert_eq!(second.review_count, 2);
    assert_eq!(second.streak, 1);
    assert_eq!(second.last_outcome, Some(ReviewOutcome::Success));
    assert!(second.ease_factor >= 2.4);
    assert!(second.next_review_at > now + Duration::hours(2));

    let summary = engine.progress.srs_summary(1, now).await.unwrap();
    assert_eq!(summary.due_count, 0);
    assert!(summary.advanced_stats.is_none());
    assert!((summary.retention_7_days - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_reset_molecule_keeps_awarded_xp() {
    let engine = setup().await;
    let (molecule, atoms) = tree(&engine, &[ContentType::Lesson], &[]).await;
    let lesson = atoms[0].id;
    let now = Utc::now();
    engine.progress.record_atom_completion(1, lesson, now).await.unwrap();

    let review = engine.progress.reset_molecule(1, molecule.id, now).await.unwrap();
    assert_eq!(review.total_resets, 1);
    assert_eq!(review.streak, 0);
    assert_eq!(review.last_outcome, Some(ReviewOutcome::Reset));

    let progress = engine.store.get_atom_progress(1, lesson).await.unwrap().unwrap();
    assert_eq!(progress.status, AtomStatus::NotStarted);
    assert_eq!(progress.reset_count, 1);
    assert!(progress.xp_awarded);

    let replay = engine.progress.record_atom_completion(1, lesson, now).await.unwrap();
    assert_eq!(replay.xp_gained, 0);
    assert_eq!(replay.capsule_xp, 60_000);
}

#[tokio::test]
async fn test_error_journal_groups_by_molecule() {
    let engine = setup().await;
    let (molecule, atoms) = tree(&engine, &[ContentType::Lesson, ContentType::Quiz], &[]).await;
    let quiz = id_of(&atoms, ContentType::Quiz);
    let now = Utc::now();
    for payload in [json!({"error_type": "Grammar"}), json!({"type": "grammar"}), json!({})] {
        engine
            .progress
            .register_answer(1, quiz, false, &payload, now)
            .await
            .unwrap();
    }
    engine
        .progress
        .register_answer(1, quiz, true, &json!({}), now)
        .await
        .unwrap();

    let journal = engine.progress.error_journal(1).await.unwrap();
    assert_eq!(journal.total_errors, 3);
    assert_eq!(journal.molecules.len(), 1);
    let entry = &journal.molecules[0];
    assert_eq!(entry.molecule_id, molecule.id);
    assert_eq!(entry.molecule_title, "Greetings");
    assert_eq!(entry.error_types["grammar"], 2);
    assert_eq!(entry.error_types["autre"], 1);
    assert_eq!(entry.top_error_types[0], "grammar");
    assert!(journal.premium_suggestions.is_empty());
}

#[tokio::test]
async fn test_stats_close_stale_sessions() {
    let engine = setup().await;
    let (molecule, _) = tree(&engine, &[ContentType::Lesson], &[]).await;
    let (_, capsule) = engine.store.molecule_parents(&molecule).await.unwrap();
    let now = Utc::now();

    engine
        .progress
        .record_activity(1, Some(capsule.id), now - Duration::minutes(40), Some(now - Duration::minutes(10)))
        .await
        .unwrap();
    engine
        .progress
        .record_activity(1, None, now - Duration::hours(5), None)
        .await
        .unwrap();
    let err = engine
        .progress
        .record_activity(1, None, now, Some(now - Duration::minutes(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let stats = engine.progress.get_user_stats(1, now).await.unwrap();
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.total_study_time_seconds, 30 * 60 + 120 * 60);
    assert_eq!(stats.breakdown.by_capsule[&capsule.id], 30 * 60);
    assert_eq!(stats.breakdown.by_domain["languages"], 30 * 60);
    assert!(stats.current_streak_days >= 1);

    // the stale session was persisted closed
    let logs = engine.store.activities_for_user(1).await.unwrap();
    assert!(logs.iter().all(|l| l.end_time.is_some()));
}
