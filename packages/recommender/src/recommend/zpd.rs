use std::collections::BTreeMap;

use serde::Serialize;

use crate::recommend::config::ZpdParams;
use crate::recommend::types::{LearnerProfile, LearningAnalysis};

const LOW_CONFIDENCE: f64 = 0.4;
const HIGH_STRESS: f64 = 0.6;
const MIN_OPTIMAL: f64 = 0.05;
const MAX_OPTIMAL: f64 = 0.95;

/// Band of difficulties a learner can handle with some stretch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZpdZone {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub optimal: f64,
    pub confidence: f64,
    /// Shift applied on top of the mastery-derived optimum.
    pub profile_offset: f64,
    /// Optimum for skills the learner has no mastery data for.
    pub default_optimal: f64,
    pub skill_optimals: BTreeMap<String, f64>,
}

impl Default for ZpdZone {
    fn default() -> Self {
        Self {
            lower_bound: 0.45,
            upper_bound: 0.75,
            optimal: 0.6,
            confidence: 0.1,
            profile_offset: 0.0,
            default_optimal: 0.6,
            skill_optimals: BTreeMap::new(),
        }
    }
}

impl ZpdZone {
    pub fn optimal_for(&self, skill_id: &str) -> f64 {
        self.skill_optimals
            .get(skill_id)
            .copied()
            .unwrap_or(self.default_optimal)
    }

    pub fn contains(&self, difficulty: f64) -> bool {
        difficulty >= self.lower_bound && difficulty <= self.upper_bound
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZpdCalculator {
    params: ZpdParams,
}

impl ZpdCalculator {
    pub fn new(params: ZpdParams) -> Self {
        Self { params }
    }

    pub fn tolerance(&self) -> f64 {
        self.params.tolerance
    }

    /// Optimal difficulty for a question touching `skills`, weighted toward the weakest one.
    pub fn calculate_optimal_difficulty(&self, analysis: &LearningAnalysis, skills: &[String]) -> f64 {
        let masteries: Vec<f64> = if skills.is_empty() {
            vec![self.params.default_mastery]
        } else {
            skills
                .iter()
                .map(|s| analysis.mastery_or(s, self.params.default_mastery))
                .collect()
        };

        let min = masteries.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = masteries.iter().sum::<f64>() / masteries.len() as f64;
        let weak = self.params.weak_skill_weight;
        let blended = weak * min + (1.0 - weak) * mean;

        (blended + self.params.stretch).clamp(MIN_OPTIMAL, MAX_OPTIMAL)
    }

    pub fn calculate_optimal_zone(
        &self,
        analysis: &LearningAnalysis,
        profile: &LearnerProfile,
    ) -> ZpdZone {
        let known: Vec<String> = analysis.masteries.keys().cloned().collect();
        let base = self.calculate_optimal_difficulty(analysis, &known);

        let mut offset = 0.0;
        if let Some(preferred) = profile.preferred_difficulty.filter(|p| p.is_finite()) {
            offset += self.params.preference_pull * (preferred.clamp(0.0, 1.0) - base);
        }
        if profile.confidence_level < LOW_CONFIDENCE {
            offset -= self.params.low_confidence_shift;
        }
        if analysis.stress_level > HIGH_STRESS {
            offset -= self.params.high_stress_shift;
        }

        let optimal = (base + offset).clamp(MIN_OPTIMAL, MAX_OPTIMAL);
        let default_optimal = (self.params.default_mastery + self.params.stretch + offset)
            .clamp(MIN_OPTIMAL, MAX_OPTIMAL);
        let skill_optimals = analysis
            .masteries
            .keys()
            .map(|skill| {
                let single = self.calculate_optimal_difficulty(analysis, std::slice::from_ref(skill));
                (skill.clone(), (single + offset).clamp(MIN_OPTIMAL, MAX_OPTIMAL))
            })
            .collect();

        let attempts = analysis.total_attempts as f64;
        let confidence = (1.0 - (-attempts / self.params.confidence_attempt_scale).exp())
            .clamp(self.params.min_confidence, self.params.max_confidence);

        ZpdZone {
            lower_bound: (optimal - self.params.tolerance).max(0.0),
            upper_bound: (optimal + self.params.tolerance).min(1.0),
            optimal,
            confidence,
            profile_offset: offset,
            default_optimal,
            skill_optimals,
        }
    }

    /// Closeness of `difficulty` to `optimal`, with a gaussian falloff once outside the band.
    pub fn difficulty_fit(&self, difficulty: f64, optimal: f64) -> f64 {
        let distance = (difficulty - optimal).abs();
        let linear = (1.0 - distance).clamp(0.0, 1.0);
        let tolerance = self.params.tolerance.max(1e-6);
        if distance <= tolerance {
            return linear;
        }
        let excess = distance - tolerance;
        linear * (-excess.powi(2) / (2.0 * tolerance.powi(2))).exp()
    }

    pub fn zpd_alignment(&self, difficulty: f64, optimal: f64) -> f64 {
        (1.0 - (difficulty - optimal).abs()).clamp(0.0, 1.0)
    }
}
