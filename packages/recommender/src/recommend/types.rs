use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::{StrategyKind, StrategyWeights};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillMastery {
    pub skill_id: String,
    pub mastery_probability: f64,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl SkillMastery {
    pub fn new(skill_id: impl Into<String>, mastery_probability: f64) -> Self {
        Self {
            skill_id: skill_id.into(),
            mastery_probability,
            total_attempts: 0,
            correct_attempts: 0,
            last_attempt_at: None,
        }
    }

    pub fn with_attempts(mut self, total: u32, correct: u32) -> Self {
        self.total_attempts = total;
        self.correct_attempts = correct;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub skill_id: String,
    pub correct: bool,
    pub timestamp: DateTime<Utc>,
    pub response_time_seconds: f64,
}

/// Snapshot of a learner handed to the engine for one call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerState {
    #[serde(default)]
    pub skill_masteries: BTreeMap<String, SkillMastery>,
    #[serde(default)]
    pub recent_performance: Vec<PerformanceRecord>,
    #[serde(default)]
    pub learning_goals: Vec<String>,
}

impl LearnerState {
    pub fn with_mastery(mut self, skill_id: &str, mastery_probability: f64) -> Self {
        self.skill_masteries.insert(
            skill_id.to_string(),
            SkillMastery::new(skill_id, mastery_probability),
        );
        self
    }

    pub fn with_goal(mut self, goal: &str) -> Self {
        self.learning_goals.push(goal.to_string());
        self
    }

    pub fn mastery_of(&self, skill_id: &str) -> Option<f64> {
        self.skill_masteries
            .get(skill_id)
            .map(|m| m.mastery_probability)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningContext {
    pub available_time_minutes: f64,
    pub stress_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub exclude_question_ids: Vec<String>,
    /// Reference time for recency maths; `None` means now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

impl Default for LearningContext {
    fn default() -> Self {
        Self {
            available_time_minutes: 30.0,
            stress_level: 0.3,
            subject: None,
            exclude_question_ids: Vec::new(),
            as_of: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LearningStyle {
    Visual,
    Auditory,
    Reading,
    Kinesthetic,
    #[default]
    Mixed,
}

impl LearningStyle {
    pub fn affinity(&self, format: QuestionFormat) -> f64 {
        match (self, format) {
            (Self::Mixed, _) => 0.2,
            (Self::Visual, QuestionFormat::Visual)
            | (Self::Auditory, QuestionFormat::Audio)
            | (Self::Reading, QuestionFormat::Text)
            | (Self::Kinesthetic, QuestionFormat::Interactive) => 0.3,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionFormat {
    Visual,
    Audio,
    #[default]
    Text,
    Interactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProfile {
    pub learning_style: LearningStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_difficulty: Option<f64>,
    pub motivation_level: f64,
    pub confidence_level: f64,
}

impl Default for LearnerProfile {
    fn default() -> Self {
        Self {
            learning_style: LearningStyle::Mixed,
            preferred_difficulty: None,
            motivation_level: 0.5,
            confidence_level: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngagementTrend {
    Improving,
    #[default]
    Stable,
    Declining,
}

impl EngagementTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }
}

/// Normalised view of a learner produced by the skill state reader.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningAnalysis {
    pub masteries: BTreeMap<String, f64>,
    pub total_attempts: u32,
    pub recent_window: Vec<PerformanceRecord>,
    pub recent_accuracy: Option<f64>,
    pub recent_attempts: BTreeMap<String, u32>,
    pub recent_errors: BTreeMap<String, u32>,
    pub average_response_time_seconds: Option<f64>,
    pub engagement_trend: EngagementTrend,
    pub goals: Vec<String>,
    pub stress_level: f64,
}

impl LearningAnalysis {
    pub fn mastery(&self, skill_id: &str) -> Option<f64> {
        self.masteries.get(skill_id).copied()
    }

    pub fn mastery_or(&self, skill_id: &str, default: f64) -> f64 {
        self.mastery(skill_id).unwrap_or(default)
    }

    pub fn recent_success_rate(&self, skill_id: &str) -> Option<f64> {
        let attempts = *self.recent_attempts.get(skill_id)?;
        if attempts == 0 {
            return None;
        }
        let errors = self.recent_errors.get(skill_id).copied().unwrap_or(0);
        Some(attempts.saturating_sub(errors) as f64 / attempts as f64)
    }

    /// Share of the recent window spent on `skill_id`.
    pub fn recent_share(&self, skill_id: &str) -> f64 {
        if self.recent_window.is_empty() {
            return 0.0;
        }
        let attempts = self.recent_attempts.get(skill_id).copied().unwrap_or(0);
        attempts as f64 / self.recent_window.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBand {
    Easy,
    Medium,
    Hard,
}

impl DifficultyBand {
    pub fn all() -> &'static [DifficultyBand] {
        &[Self::Easy, Self::Medium, Self::Hard]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }

    pub fn midpoint(&self) -> f64 {
        match self {
            Self::Easy => 0.25,
            Self::Medium => 0.5,
            Self::Hard => 0.8,
        }
    }

    pub fn difficulty_range(&self) -> (f64, f64) {
        match self {
            Self::Easy => (0.0, 0.4),
            Self::Medium => (0.2, 0.7),
            Self::Hard => (0.5, 1.0),
        }
    }

    /// Bands worth querying for a learner whose optimal difficulty is `optimal`.
    pub fn for_optimal(optimal: f64) -> Vec<DifficultyBand> {
        if optimal <= 0.4 {
            vec![Self::Easy]
        } else if optimal <= 0.7 {
            vec![Self::Easy, Self::Medium]
        } else {
            vec![Self::Medium, Self::Hard]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityAreaType {
    Skill,
    Prerequisite,
    Goal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityArea {
    pub area_type: PriorityAreaType,
    pub identifier: String,
    pub priority: f64,
    pub reasons: Vec<String>,
    pub urgency: Urgency,
    pub time_investment_minutes: f64,
    pub prerequisites: Vec<String>,
}

impl PriorityArea {
    /// Fold another entry for the same `(area_type, identifier)` into this one.
    pub fn absorb(&mut self, other: PriorityArea) {
        self.priority += other.priority;
        self.urgency = self.urgency.max(other.urgency);
        self.time_investment_minutes = self
            .time_investment_minutes
            .max(other.time_investment_minutes);
        for reason in other.reasons {
            if !self.reasons.contains(&reason) {
                self.reasons.push(reason);
            }
        }
        for prerequisite in other.prerequisites {
            if !self.prerequisites.contains(&prerequisite) {
                self.prerequisites.push(prerequisite);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    #[default]
    Priority,
    Widened,
    DefaultSkills,
    Catalog,
    Cached,
}

impl CandidateSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Catalog | Self::Cached)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCandidate {
    pub question_id: String,
    pub skills: Vec<String>,
    pub concepts: Vec<String>,
    pub difficulty: f64,
    pub difficulty_band: DifficultyBand,
    pub estimated_time_seconds: u32,
    pub relevance_score: f64,
    pub target_skill: String,
    pub format: QuestionFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    pub usage_count: u64,
    pub source: CandidateSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringFactor {
    Mastery,
    Difficulty,
    Engagement,
    Time,
    Prerequisite,
    Novelty,
}

impl ScoringFactor {
    pub fn all() -> &'static [ScoringFactor] {
        &[
            Self::Mastery,
            Self::Difficulty,
            Self::Engagement,
            Self::Time,
            Self::Prerequisite,
            Self::Novelty,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Mastery => "knowledge gap",
            Self::Difficulty => "difficulty fit",
            Self::Engagement => "engagement",
            Self::Time => "time fit",
            Self::Prerequisite => "prerequisite readiness",
            Self::Novelty => "novelty",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveMetrics {
    pub mastery_score: f64,
    pub difficulty_score: f64,
    pub engagement_score: f64,
    pub time_score: f64,
    pub prerequisite_score: f64,
    pub novelty_score: f64,
    pub combined_score: f64,
    pub zpd_alignment: f64,
    pub optimal_difficulty: f64,
}

impl AdaptiveMetrics {
    pub fn factor(&self, factor: ScoringFactor) -> f64 {
        match factor {
            ScoringFactor::Mastery => self.mastery_score,
            ScoringFactor::Difficulty => self.difficulty_score,
            ScoringFactor::Engagement => self.engagement_score,
            ScoringFactor::Time => self.time_score,
            ScoringFactor::Prerequisite => self.prerequisite_score,
            ScoringFactor::Novelty => self.novelty_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedOutcome {
    pub success_probability: f64,
    pub mastery_improvement: BTreeMap<String, f64>,
    pub confidence_boost: f64,
    pub engagement_change: f64,
    pub expected_time_seconds: u32,
}

impl ExpectedOutcome {
    pub fn mean_mastery_improvement(&self) -> f64 {
        if self.mastery_improvement.is_empty() {
            return 0.0;
        }
        self.mastery_improvement.values().sum::<f64>() / self.mastery_improvement.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorContribution {
    pub factor: ScoringFactor,
    pub score: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZpdSummary {
    pub optimal_difficulty: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub alignment: f64,
    pub within_band: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationReasoning {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_factor: Option<ScoringFactor>,
    pub factors: Vec<FactorContribution>,
    pub zpd: ZpdSummary,
    pub priority_reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeQuestion {
    pub question_id: String,
    pub skills: Vec<String>,
    pub difficulty: f64,
    pub combined_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecommendation {
    pub recommendation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_id: Option<String>,
    pub question_id: String,
    pub skills: Vec<String>,
    pub concepts: Vec<String>,
    pub target_skill: String,
    pub difficulty: f64,
    pub estimated_time_seconds: u32,
    pub relevance_score: f64,
    pub priority: f64,
    pub rank: usize,
    pub strategy: StrategyKind,
    pub reasoning: RecommendationReasoning,
    pub adaptive_metrics: AdaptiveMetrics,
    pub expected_outcome: ExpectedOutcome,
    pub alternatives: Vec<AlternativeQuestion>,
    pub is_fallback: bool,
    pub generated_at: DateTime<Utc>,
}

/// What actually happened when the learner attempted a recommended question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualOutcome {
    pub correct: bool,
    pub response_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRecord {
    pub recommendation: QuestionRecommendation,
    pub actual_outcome: ActualOutcome,
    pub timestamp: DateTime<Utc>,
    pub learner_id: String,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPerformance {
    pub strategy: StrategyKind,
    pub average_accuracy: f64,
    pub sample_count: u64,
}

impl StrategyPerformance {
    pub fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            average_accuracy: 0.0,
            sample_count: 0,
        }
    }

    /// Incremental mean: `avg += (accuracy - avg) / n`.
    pub fn record(&mut self, accuracy: f64) {
        let accuracy = accuracy.clamp(0.0, 1.0);
        self.sample_count += 1;
        self.average_accuracy +=
            (accuracy - self.average_accuracy) / self.sample_count as f64;
        self.average_accuracy = self.average_accuracy.clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizedInsights {
    pub learner_id: String,
    pub evaluated_recommendations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_strategy: Option<StrategyKind>,
    pub strategy_breakdown: Vec<StrategyPerformance>,
    pub weight_multipliers: StrategyWeights,
    pub suggestions: Vec<String>,
}
