use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub recent_window: usize,
    pub trend_min_samples: usize,
    pub trend_up_threshold: f64,
    pub trend_down_threshold: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            recent_window: 15,
            trend_min_samples: 5,
            trend_up_threshold: 0.05,
            trend_down_threshold: -0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZpdParams {
    pub tolerance: f64,
    pub stretch: f64,
    pub weak_skill_weight: f64,
    pub default_mastery: f64,
    pub preference_pull: f64,
    pub low_confidence_shift: f64,
    pub high_stress_shift: f64,
    pub confidence_attempt_scale: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

impl Default for ZpdParams {
    fn default() -> Self {
        Self {
            tolerance: 0.15,
            stretch: 0.1,
            weak_skill_weight: 0.7,
            default_mastery: 0.5,
            preference_pull: 0.2,
            low_confidence_shift: 0.05,
            high_stress_shift: 0.05,
            confidence_attempt_scale: 20.0,
            min_confidence: 0.1,
            max_confidence: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityParams {
    pub knowledge_gap_threshold: f64,
    pub high_urgency_mastery: f64,
    pub struggle_min_errors: u32,
    pub struggle_high_errors: u32,
    pub struggle_weight: f64,
    pub prerequisite_target: f64,
    pub prerequisite_threshold: f64,
    pub prerequisite_base_priority: f64,
    pub goal_mastery_threshold: f64,
    pub goal_priority: f64,
}

impl Default for PriorityParams {
    fn default() -> Self {
        Self {
            knowledge_gap_threshold: 0.7,
            high_urgency_mastery: 0.4,
            struggle_min_errors: 2,
            struggle_high_errors: 3,
            struggle_weight: 0.3,
            prerequisite_target: 0.8,
            prerequisite_threshold: 0.6,
            prerequisite_base_priority: 0.3,
            goal_mastery_threshold: 0.8,
            goal_priority: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateParams {
    pub max_skills: usize,
    pub per_query_limit: usize,
    pub max_candidates: usize,
    pub default_skills: Vec<String>,
    pub low_mastery_threshold: f64,
    pub low_success_threshold: f64,
    pub target_success_rate: f64,
    pub stale_after_days: i64,
    pub fallback_question_ids: Vec<String>,
    pub fallback_cache_size: usize,
}

impl Default for CandidateParams {
    fn default() -> Self {
        Self {
            max_skills: 10,
            per_query_limit: 5,
            max_candidates: 20,
            default_skills: vec![
                "arithmetic_operations".to_string(),
                "reading_comprehension".to_string(),
                "problem_solving".to_string(),
            ],
            low_mastery_threshold: 0.6,
            low_success_threshold: 0.5,
            target_success_rate: 0.7,
            stale_after_days: 7,
            fallback_question_ids: Vec::new(),
            fallback_cache_size: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringParams {
    pub tie_tolerance: f64,
    pub novelty_weight: f64,
    pub mastered_threshold: f64,
    pub similar_practice_penalty: f64,
    pub novelty_recovery_days: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            tie_tolerance: 0.1,
            novelty_weight: 0.1,
            mastered_threshold: 0.6,
            similar_practice_penalty: 0.3,
            novelty_recovery_days: 7.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityParams {
    pub priority_threshold: f64,
    pub diversity_threshold: f64,
    pub max_alternatives: usize,
}

impl Default for DiversityParams {
    fn default() -> Self {
        Self {
            priority_threshold: 0.7,
            diversity_threshold: 0.5,
            max_alternatives: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationParams {
    pub adaptation_rate: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    pub mastery_deviation_scale: f64,
    pub history_retention: usize,
    pub history_max_age_days: i64,
    pub issued_retention: usize,
    pub learner_idle_days: i64,
    pub max_learners: usize,
}

impl Default for AdaptationParams {
    fn default() -> Self {
        Self {
            adaptation_rate: 0.1,
            min_multiplier: 0.5,
            max_multiplier: 1.5,
            mastery_deviation_scale: 0.2,
            history_retention: 50,
            history_max_age_days: 30,
            issued_retention: 200,
            learner_idle_days: 30,
            max_learners: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutParams {
    pub store_timeout_ms: u64,
    pub request_deadline_ms: u64,
}

impl Default for TimeoutParams {
    fn default() -> Self {
        Self {
            store_timeout_ms: 2_000,
            request_deadline_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub analysis: AnalysisParams,
    pub zpd: ZpdParams,
    pub priority: PriorityParams,
    pub candidates: CandidateParams,
    pub scoring: ScoringParams,
    pub diversity: DiversityParams,
    pub adaptation: AdaptationParams,
    pub timeouts: TimeoutParams,
    pub max_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisParams::default(),
            zpd: ZpdParams::default(),
            priority: PriorityParams::default(),
            candidates: CandidateParams::default(),
            scoring: ScoringParams::default(),
            diversity: DiversityParams::default(),
            adaptation: AdaptationParams::default(),
            timeouts: TimeoutParams::default(),
            max_count: 50,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RECOMMENDER_ZPD_TOLERANCE") {
            config.zpd.tolerance = val.parse().unwrap_or(config.zpd.tolerance);
        }
        if let Ok(val) = std::env::var("RECOMMENDER_ADAPTATION_RATE") {
            config.adaptation.adaptation_rate =
                val.parse().unwrap_or(config.adaptation.adaptation_rate);
        }
        if let Ok(val) = std::env::var("RECOMMENDER_HISTORY_RETENTION") {
            config.adaptation.history_retention =
                val.parse().unwrap_or(config.adaptation.history_retention);
        }
        if let Ok(val) = std::env::var("RECOMMENDER_MAX_LEARNERS") {
            config.adaptation.max_learners = val.parse().unwrap_or(config.adaptation.max_learners);
        }
        if let Ok(val) = std::env::var("RECOMMENDER_STORE_TIMEOUT_MS") {
            config.timeouts.store_timeout_ms =
                val.parse().unwrap_or(config.timeouts.store_timeout_ms);
        }
        if let Ok(val) = std::env::var("RECOMMENDER_REQUEST_DEADLINE_MS") {
            config.timeouts.request_deadline_ms =
                val.parse().unwrap_or(config.timeouts.request_deadline_ms);
        }
        if let Ok(val) = std::env::var("RECOMMENDER_MAX_COUNT") {
            config.max_count = val.parse().unwrap_or(config.max_count);
        }
        if let Ok(val) = std::env::var("RECOMMENDER_DEFAULT_SKILLS") {
            let skills = split_list(&val);
            if !skills.is_empty() {
                config.candidates.default_skills = skills;
            }
        }
        if let Ok(val) = std::env::var("RECOMMENDER_FALLBACK_QUESTIONS") {
            config.candidates.fallback_question_ids = split_list(&val);
        }

        config
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.zpd.tolerance, 0.15);
        assert_eq!(config.analysis.recent_window, 15);
        assert_eq!(config.candidates.max_skills, 10);
        assert_eq!(config.candidates.max_candidates, 20);
        assert_eq!(config.candidates.default_skills.len(), 3);
        assert_eq!(config.diversity.priority_threshold, 0.7);
    }

    #[test]
    fn split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" algebra_linear, ,fractions ,"),
            vec!["algebra_linear".to_string(), "fractions".to_string()]
        );
    }
}
