use chrono::{DateTime, Duration, Utc};

use crate::recommend::types::{
    DifficultyBand, LearnerState, PerformanceRecord, QuestionFormat, SkillMastery,
};
use crate::store::{InMemoryMasteryStore, InMemoryQuestionStore, Question};

struct SeedQuestion {
    id: &'static str,
    subject: &'static str,
    skills: &'static [&'static str],
    concepts: &'static [&'static str],
    band: DifficultyBand,
    difficulty: f64,
    seconds: u32,
    format: QuestionFormat,
    success_rate: f64,
}

const SEED_QUESTIONS: &[SeedQuestion] = &[
    SeedQuestion {
        id: "arith-001",
        subject: "math",
        skills: &["arithmetic_operations"],
        concepts: &["addition", "carrying"],
        band: DifficultyBand::Easy,
        difficulty: 0.2,
        seconds: 45,
        format: QuestionFormat::Text,
        success_rate: 0.85,
    },
    SeedQuestion {
        id: "arith-002",
        subject: "math",
        skills: &["arithmetic_operations"],
        concepts: &["long division"],
        band: DifficultyBand::Medium,
        difficulty: 0.5,
        seconds: 120,
        format: QuestionFormat::Text,
        success_rate: 0.65,
    },
    SeedQuestion {
        id: "frac-001",
        subject: "math",
        skills: &["fractions", "arithmetic_operations"],
        concepts: &["equivalent fractions"],
        band: DifficultyBand::Easy,
        difficulty: 0.3,
        seconds: 60,
        format: QuestionFormat::Visual,
        success_rate: 0.75,
    },
    SeedQuestion {
        id: "frac-002",
        subject: "math",
        skills: &["fractions"],
        concepts: &["mixed numbers"],
        band: DifficultyBand::Medium,
        difficulty: 0.55,
        seconds: 150,
        format: QuestionFormat::Text,
        success_rate: 0.6,
    },
    SeedQuestion {
        id: "alg-001",
        subject: "math",
        skills: &["algebra_linear"],
        concepts: &["one-step equations"],
        band: DifficultyBand::Easy,
        difficulty: 0.35,
        seconds: 90,
        format: QuestionFormat::Text,
        success_rate: 0.7,
    },
    SeedQuestion {
        id: "alg-002",
        subject: "math",
        skills: &["algebra_linear"],
        concepts: &["two-step equations"],
        band: DifficultyBand::Medium,
        difficulty: 0.5,
        seconds: 150,
        format: QuestionFormat::Interactive,
        success_rate: 0.6,
    },
    SeedQuestion {
        id: "alg-003",
        subject: "math",
        skills: &["algebra_quadratic", "algebra_linear"],
        concepts: &["factoring"],
        band: DifficultyBand::Hard,
        difficulty: 0.8,
        seconds: 240,
        format: QuestionFormat::Text,
        success_rate: 0.4,
    },
    SeedQuestion {
        id: "geo-001",
        subject: "math",
        skills: &["geometry_basics"],
        concepts: &["angles"],
        band: DifficultyBand::Easy,
        difficulty: 0.3,
        seconds: 60,
        format: QuestionFormat::Visual,
        success_rate: 0.8,
    },
    SeedQuestion {
        id: "read-001",
        subject: "english",
        skills: &["reading_comprehension", "vocabulary"],
        concepts: &["main idea"],
        band: DifficultyBand::Easy,
        difficulty: 0.3,
        seconds: 180,
        format: QuestionFormat::Text,
        success_rate: 0.75,
    },
    SeedQuestion {
        id: "read-002",
        subject: "english",
        skills: &["reading_inference"],
        concepts: &["implied meaning"],
        band: DifficultyBand::Hard,
        difficulty: 0.75,
        seconds: 240,
        format: QuestionFormat::Text,
        success_rate: 0.5,
    },
    SeedQuestion {
        id: "solve-001",
        subject: "math",
        skills: &["problem_solving", "arithmetic_operations"],
        concepts: &["word problems"],
        band: DifficultyBand::Medium,
        difficulty: 0.45,
        seconds: 180,
        format: QuestionFormat::Audio,
        success_rate: 0.65,
    },
];

pub fn demo_catalog() -> Vec<Question> {
    SEED_QUESTIONS
        .iter()
        .map(|seed| Question {
            id: seed.id.to_string(),
            subject: seed.subject.to_string(),
            skills: seed.skills.iter().map(|s| s.to_string()).collect(),
            concepts: seed.concepts.iter().map(|s| s.to_string()).collect(),
            difficulty: seed.band,
            difficulty_score: Some(seed.difficulty),
            estimated_time_seconds: seed.seconds,
            format: seed.format,
            usage_count: 0,
            success_rate: Some(seed.success_rate),
            last_used_at: None,
        })
        .collect()
}

pub fn seed_question_store() -> InMemoryQuestionStore {
    let store = InMemoryQuestionStore::new(demo_catalog());
    tracing::info!(questions = store.len(), "seeded demo question catalog");
    store
}

/// Mid-way learner: shaky on linear algebra, solid on arithmetic, aiming at algebra.
pub fn demo_learner(now: DateTime<Utc>) -> LearnerState {
    let mut state = LearnerState::default()
        .with_mastery("arithmetic_operations", 0.82)
        .with_mastery("fractions", 0.55)
        .with_mastery("algebra_linear", 0.35)
        .with_goal("pass algebra");

    let pattern = [
        ("arithmetic_operations", true),
        ("fractions", true),
        ("algebra_linear", false),
        ("fractions", false),
        ("algebra_linear", true),
        ("algebra_linear", false),
        ("arithmetic_operations", true),
        ("algebra_linear", false),
    ];
    for (i, (skill, correct)) in pattern.iter().enumerate() {
        state.recent_performance.push(PerformanceRecord {
            skill_id: skill.to_string(),
            correct: *correct,
            timestamp: now - Duration::minutes((pattern.len() - i) as i64 * 3),
            response_time_seconds: 40.0 + i as f64 * 5.0,
        });
    }
    state
}

pub fn seed_mastery_store(store: &InMemoryMasteryStore, learner_id: &str) {
    store.set_mastery(
        learner_id,
        SkillMastery::new("reading_comprehension", 0.72).with_attempts(18, 13),
    );
    store.set_mastery(learner_id, SkillMastery::new("vocabulary", 0.8).with_attempts(25, 20));
    tracing::debug!(learner_id, "seeded demo mastery records");
}
