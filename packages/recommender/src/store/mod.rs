mod memory;

pub use memory::{InMemoryMasteryStore, InMemoryQuestionStore};

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recommend::types::{DifficultyBand, QuestionFormat, SkillMastery};

/// Question as stored in the catalog. The first skill is the primary one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub subject: String,
    pub skills: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    pub difficulty: DifficultyBand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_score: Option<f64>,
    pub estimated_time_seconds: u32,
    #[serde(default)]
    pub format: QuestionFormat,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Question {
    pub fn primary_skill(&self) -> Option<&str> {
        self.skills.first().map(String::as_str)
    }

    /// Numeric difficulty in [0, 1], falling back to the band midpoint.
    pub fn numeric_difficulty(&self) -> f64 {
        self.difficulty_score
            .filter(|d| d.is_finite())
            .map(|d| d.clamp(0.0, 1.0))
            .unwrap_or_else(|| self.difficulty.midpoint())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<DifficultyBand>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub limit: usize,
    #[serde(default)]
    pub exclude_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuestionAnalytics {
    pub attempts: u32,
    pub last_correct: bool,
    pub average_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("repository call timed out after {0}ms")]
    Timeout(u64),
    #[error("not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Questions matching `query`, least recently used first.
    async fn fetch_questions(&self, query: &QuestionQuery) -> Result<Vec<Question>, RepositoryError>;

    async fn fetch_questions_by_ids(&self, ids: &[String]) -> Result<Vec<Question>, RepositoryError>;

    async fn fetch_user_question_analytics(
        &self,
        user_id: &str,
        question_ids: &[String],
    ) -> Result<HashMap<String, UserQuestionAnalytics>, RepositoryError>;
}

#[async_trait]
pub trait MasteryRepository: Send + Sync {
    async fn fetch_skill_mastery(
        &self,
        user_id: &str,
    ) -> Result<BTreeMap<String, SkillMastery>, RepositoryError>;
}
