use std::sync::Arc;

use chrono::Utc;

use danci_recommender::config::Config;
use danci_recommender::logging;
use danci_recommender::recommend::types::{
    ActualOutcome, LearnerProfile, LearningContext, LearningStyle,
};
use danci_recommender::recommend::{EngineConfig, RecommendationEngine};
use danci_recommender::seed;
use danci_recommender::store::InMemoryMasteryStore;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    let questions = Arc::new(seed::seed_question_store());
    let mastery = Arc::new(InMemoryMasteryStore::new());
    seed::seed_mastery_store(&mastery, &config.demo_learner_id);

    let engine = RecommendationEngine::new(EngineConfig::from_env(), questions)
        .with_mastery_repository(mastery);

    let now = Utc::now();
    let learner = seed::demo_learner(now);
    let context = LearningContext {
        available_time_minutes: 25.0,
        stress_level: 0.3,
        as_of: Some(now),
        ..LearningContext::default()
    };
    let profile = LearnerProfile {
        learning_style: LearningStyle::Visual,
        motivation_level: 0.6,
        ..LearnerProfile::default()
    };

    let recommendations = match engine
        .generate_recommendations(
            Some(&learner),
            &context,
            &profile,
            config.demo_count,
            Some(&config.demo_learner_id),
        )
        .await
    {
        Ok(recommendations) => recommendations,
        Err(err) => {
            tracing::error!(error = %err, "recommendation request rejected");
            return;
        }
    };

    match serde_json::to_string_pretty(&recommendations) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!(error = %err, "failed to serialize recommendations"),
    }

    if let Some(first) = recommendations.first() {
        let outcome = ActualOutcome {
            correct: true,
            response_time_seconds: first.estimated_time_seconds as f64 * 0.8,
            engagement_change: Some(0.1),
            completed_at: None,
        };
        let accuracy = engine.adapt_from_outcome(first, &outcome, Some(&learner));
        tracing::info!(?accuracy, question_id = %first.question_id, "simulated outcome applied");
    }

    let insights = engine.get_personalized_insights(&config.demo_learner_id);
    match serde_json::to_string_pretty(&insights) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!(error = %err, "failed to serialize insights"),
    }

    tracing::info!(stages = ?engine.stage_metrics(), "stage metrics");
}
