#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use danci_recommender::recommend::types::{DifficultyBand, LearningContext, QuestionFormat};
use danci_recommender::recommend::{EngineConfig, RecommendationEngine};
use danci_recommender::store::{InMemoryQuestionStore, Question};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 15, 30, 0).unwrap()
}

pub fn question(id: &str, skills: &[&str], band: DifficultyBand, difficulty: f64) -> Question {
    Question {
        id: id.to_string(),
        subject: "math".to_string(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        concepts: vec![],
        difficulty: band,
        difficulty_score: Some(difficulty),
        estimated_time_seconds: 90,
        format: QuestionFormat::Text,
        usage_count: 0,
        success_rate: None,
        last_used_at: None,
    }
}

pub fn context() -> LearningContext {
    LearningContext {
        available_time_minutes: 30.0,
        stress_level: 0.3,
        as_of: Some(fixed_now()),
        ..LearningContext::default()
    }
}

pub fn store(questions: Vec<Question>) -> Arc<InMemoryQuestionStore> {
    Arc::new(InMemoryQuestionStore::new(questions))
}

pub fn engine(store: Arc<InMemoryQuestionStore>) -> RecommendationEngine {
    RecommendationEngine::new(EngineConfig::default(), store)
}

pub fn engine_with(config: EngineConfig, store: Arc<InMemoryQuestionStore>) -> RecommendationEngine {
    RecommendationEngine::new(config, store)
}
