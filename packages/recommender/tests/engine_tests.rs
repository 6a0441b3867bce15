//! End-to-end tests for RecommendationEngine against the in-memory stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use danci_recommender::recommend::types::{
    ActualOutcome, DifficultyBand, LearnerProfile, LearnerState, LearningContext,
};
use danci_recommender::recommend::metrics::{registry, StageId};
use danci_recommender::recommend::{EngineConfig, RecommendError};
use danci_recommender::store::{InMemoryMasteryStore, InMemoryQuestionStore, Question};

use common::{context, engine, engine_with, question, store};

fn algebra_catalog() -> Vec<Question> {
    vec![
        question("al-easy-1", &["algebra_linear"], DifficultyBand::Easy, 0.35),
        question("al-easy-2", &["algebra_linear"], DifficultyBand::Easy, 0.4),
        question("ar-easy-1", &["arithmetic_operations"], DifficultyBand::Easy, 0.3),
        question("ar-med-1", &["arithmetic_operations"], DifficultyBand::Medium, 0.5),
        question("ri-med-1", &["reading_inference"], DifficultyBand::Medium, 0.6),
        question("ri-hard-1", &["reading_inference"], DifficultyBand::Hard, 0.85),
    ]
}

fn algebra_learner() -> LearnerState {
    LearnerState::default()
        .with_mastery("algebra_linear", 0.3)
        .with_mastery("reading_inference", 0.85)
        .with_goal("pass algebra")
}

fn cold_start_catalog() -> Vec<Question> {
    vec![
        question("ar-1", &["arithmetic_operations"], DifficultyBand::Easy, 0.3),
        question("ar-2", &["arithmetic_operations"], DifficultyBand::Medium, 0.55),
        question("rc-1", &["reading_comprehension"], DifficultyBand::Easy, 0.25),
        question("rc-2", &["reading_comprehension"], DifficultyBand::Medium, 0.5),
        question("ps-1", &["problem_solving"], DifficultyBand::Medium, 0.6),
        question("ar-hard", &["arithmetic_operations"], DifficultyBand::Hard, 0.9),
    ]
}

#[tokio::test]
async fn weak_goal_skill_is_recommended_and_strong_skill_is_not() {
    let engine = engine(store(algebra_catalog()));
    let learner = algebra_learner();

    let recs = engine
        .generate_recommendations(Some(&learner), &context(), &LearnerProfile::default(), 3, None)
        .await
        .unwrap();

    assert_eq!(recs.len(), 3);
    assert!(recs
        .iter()
        .any(|r| r.skills.contains(&"algebra_linear".to_string()) && r.priority > 0.5));
    assert!(recs
        .iter()
        .all(|r| !r.skills.contains(&"reading_inference".to_string())));
    assert!(recs.iter().all(|r| !r.is_fallback));
    assert!(recs.iter().all(|r| !r.reasoning.summary.is_empty()));
}

#[tokio::test]
async fn pool_equal_to_count_is_returned_whole() {
    let engine = engine(store(cold_start_catalog()));

    let recs = engine
        .generate_recommendations(
            Some(&LearnerState::default()),
            &context(),
            &LearnerProfile::default(),
            5,
            None,
        )
        .await
        .unwrap();

    let mut ids: Vec<&str> = recs.iter().map(|r| r.question_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["ar-1", "ar-2", "ps-1", "rc-1", "rc-2"]);
}

#[tokio::test]
async fn missing_priority_questions_fall_back_to_catalog() {
    let engine = engine(store(vec![
        question("geo-1", &["geometry_basics"], DifficultyBand::Easy, 0.3),
        question("geo-2", &["geometry_basics"], DifficultyBand::Medium, 0.5),
    ]));
    let learner = LearnerState::default().with_mastery("essay_structure", 0.2);

    let recs = engine
        .generate_recommendations(Some(&learner), &context(), &LearnerProfile::default(), 3, None)
        .await
        .unwrap();

    assert!(!recs.is_empty());
    assert!(recs.len() <= 3);
    assert!(recs.iter().all(|r| r.is_fallback));
}

#[tokio::test]
async fn cached_pool_serves_when_catalog_empties() {
    let questions = store(algebra_catalog());
    let engine = engine(questions.clone());
    let learner = algebra_learner();
    let profile = LearnerProfile::default();

    let warm = engine
        .generate_recommendations(Some(&learner), &context(), &profile, 3, None)
        .await
        .unwrap();
    assert!(!warm.is_empty());

    questions.clear();
    let recs = engine
        .generate_recommendations(Some(&learner), &context(), &profile, 3, None)
        .await
        .unwrap();

    assert!(!recs.is_empty());
    assert!(recs.len() <= 3);
    assert!(recs.iter().all(|r| r.is_fallback));
}

#[tokio::test]
async fn store_failure_degrades_to_fallback_set() {
    let questions = store(algebra_catalog());
    let engine = engine(questions.clone());
    let learner = algebra_learner();
    let profile = LearnerProfile::default();

    engine
        .generate_recommendations(Some(&learner), &context(), &profile, 3, None)
        .await
        .unwrap();

    questions.set_failing(true);
    let recs = engine
        .generate_recommendations(Some(&learner), &context(), &profile, 2, None)
        .await
        .unwrap();

    assert_eq!(recs.len(), 2);
    assert!(recs.iter().all(|r| r.is_fallback));
    assert!(recs
        .iter()
        .all(|r| r.strategy == danci_recommender::recommend::StrategyKind::Balanced));
}

fn stage_counts(stage: StageId) -> (u64, u64) {
    registry()
        .snapshot()
        .into_iter()
        .find(|s| s.stage == stage.key())
        .map(|s| (s.degraded, s.fallbacks))
        .unwrap()
}

#[tokio::test]
async fn store_failure_is_counted_as_degraded_and_fallback() {
    let questions = store(algebra_catalog());
    let engine = engine(questions.clone());
    let learner = algebra_learner();
    let profile = LearnerProfile::default();

    engine
        .generate_recommendations(Some(&learner), &context(), &profile, 3, None)
        .await
        .unwrap();
    let (generator_before, _) = stage_counts(StageId::CandidateGenerator);
    let (_, fallback_before) = stage_counts(StageId::Fallback);

    questions.set_failing(true);
    engine
        .generate_recommendations(Some(&learner), &context(), &profile, 3, None)
        .await
        .unwrap();

    // The registry is process-wide, so other tests may add to it concurrently.
    let (generator_after, _) = stage_counts(StageId::CandidateGenerator);
    let (_, fallback_after) = stage_counts(StageId::Fallback);
    assert!(generator_after > generator_before);
    assert!(fallback_after > fallback_before);
}

#[tokio::test]
async fn cold_engine_with_failing_store_returns_empty() {
    let questions = store(algebra_catalog());
    questions.set_failing(true);
    let engine = engine(questions);

    let recs = engine
        .generate_recommendations(
            Some(&algebra_learner()),
            &context(),
            &LearnerProfile::default(),
            3,
            None,
        )
        .await
        .unwrap();
    assert!(recs.is_empty());
}

#[tokio::test]
async fn request_deadline_serves_configured_fallback_questions() {
    let questions = Arc::new(
        InMemoryQuestionStore::new(algebra_catalog()).with_latency(Duration::from_millis(300)),
    );
    let mut config = EngineConfig::default();
    config.timeouts.request_deadline_ms = 50;
    config.timeouts.store_timeout_ms = 2_000;
    config.candidates.fallback_question_ids = vec!["ar-easy-1".to_string(), "al-easy-1".to_string()];
    let engine = engine_with(config, questions);

    let recs = engine
        .generate_recommendations(
            Some(&algebra_learner()),
            &context(),
            &LearnerProfile::default(),
            3,
            None,
        )
        .await
        .unwrap();

    assert_eq!(recs.len(), 2);
    assert!(recs.iter().all(|r| r.is_fallback));
}

#[tokio::test]
async fn slow_store_times_out_per_call() {
    let questions = Arc::new(
        InMemoryQuestionStore::new(algebra_catalog()).with_latency(Duration::from_millis(500)),
    );
    let mut config = EngineConfig::default();
    config.timeouts.store_timeout_ms = 20;
    let engine = engine_with(config, questions);

    let started = std::time::Instant::now();
    let recs = engine
        .generate_recommendations(
            Some(&algebra_learner()),
            &context(),
            &LearnerProfile::default(),
            3,
            None,
        )
        .await
        .unwrap();

    assert!(recs.is_empty());
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn identical_inputs_give_identical_output() {
    let engine = engine(store(algebra_catalog()));
    let learner = algebra_learner();
    let profile = LearnerProfile::default();

    let first = engine
        .generate_recommendations(Some(&learner), &context(), &profile, 3, Some("learner-7"))
        .await
        .unwrap();
    let second = engine
        .generate_recommendations(Some(&learner), &context(), &profile, 3, Some("learner-7"))
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn excluded_questions_are_never_returned() {
    let engine = engine(store(algebra_catalog()));
    let ctx = LearningContext {
        exclude_question_ids: vec!["al-easy-2".to_string()],
        ..context()
    };

    let recs = engine
        .generate_recommendations(Some(&algebra_learner()), &ctx, &LearnerProfile::default(), 3, None)
        .await
        .unwrap();

    assert!(!recs.is_empty());
    assert!(recs.iter().all(|r| r.question_id != "al-easy-2"));
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let engine = engine(store(algebra_catalog()));
    let profile = LearnerProfile::default();

    let zero = engine
        .generate_recommendations(Some(&algebra_learner()), &context(), &profile, 0, None)
        .await;
    assert_eq!(zero.unwrap_err(), RecommendError::InvalidCount(0));

    let anonymous = engine
        .generate_recommendations(None, &context(), &profile, 3, None)
        .await;
    assert_eq!(anonymous.unwrap_err(), RecommendError::MissingLearnerState);
}

#[tokio::test]
async fn learner_id_alone_uses_mastery_store() {
    let mastery = Arc::new(InMemoryMasteryStore::new());
    mastery.set_mastery(
        "learner-9",
        danci_recommender::recommend::types::SkillMastery::new("algebra_linear", 0.3),
    );
    let engine = engine(store(algebra_catalog())).with_mastery_repository(mastery);

    let recs = engine
        .generate_recommendations(None, &context(), &LearnerProfile::default(), 2, Some("learner-9"))
        .await
        .unwrap();

    assert!(!recs.is_empty());
    assert!(recs.iter().all(|r| r.learner_id.as_deref() == Some("learner-9")));
}

#[tokio::test]
async fn outcomes_feed_personalized_insights() {
    let engine = engine(store(algebra_catalog()));
    let learner = algebra_learner();

    let recs = engine
        .generate_recommendations(
            Some(&learner),
            &context(),
            &LearnerProfile::default(),
            3,
            Some("learner-1"),
        )
        .await
        .unwrap();

    let outcome = ActualOutcome {
        correct: true,
        response_time_seconds: 70.0,
        engagement_change: Some(0.1),
        completed_at: None,
    };
    let accuracy = engine
        .adapt_from_outcome(&recs[0], &outcome, Some(&learner))
        .expect("issued recommendation should be accepted");
    assert!((0.0..=1.0).contains(&accuracy));

    let mut forged = recs[1].clone();
    forged.recommendation_id = "not-issued".to_string();
    assert_eq!(engine.adapt_from_outcome(&forged, &outcome, Some(&learner)), None);

    let insights = engine.get_personalized_insights("learner-1");
    assert_eq!(insights.evaluated_recommendations, 1);
    assert_eq!(insights.strategy_breakdown.len(), 1);
    assert_eq!(insights.recent_success_rate, Some(1.0));
    assert_eq!(engine.strategy_performance()[0].sample_count, 1);
}

#[tokio::test]
async fn engine_is_shareable_across_tasks() {
    let engine = Arc::new(engine(store(algebra_catalog())));
    let mut handles = Vec::new();

    for i in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let learner = algebra_learner();
            let learner_id = format!("learner-{i}");
            engine
                .generate_recommendations(
                    Some(&learner),
                    &context(),
                    &LearnerProfile::default(),
                    3,
                    Some(&learner_id),
                )
                .await
        }));
    }

    for handle in handles {
        let recs = handle.await.unwrap().unwrap();
        assert_eq!(recs.len(), 3);
    }
}
