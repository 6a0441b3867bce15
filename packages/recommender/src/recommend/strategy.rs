use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::recommend::types::{
    EngagementTrend, LearningAnalysis, LearningContext, PriorityArea, PriorityAreaType, Urgency,
};
use crate::recommend::zpd::ZpdZone;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyWeights {
    pub mastery_priority: f64,
    pub difficulty_optimization: f64,
    pub time_constraints: f64,
    pub engagement_factor: f64,
    pub stress_consideration: f64,
    pub prerequisite_importance: f64,
}

impl StrategyWeights {
    pub fn uniform(value: f64) -> Self {
        Self {
            mastery_priority: value,
            difficulty_optimization: value,
            time_constraints: value,
            engagement_factor: value,
            stress_consideration: value,
            prerequisite_importance: value,
        }
    }

    /// Component-wise product, used to apply learned multipliers.
    pub fn scaled_by(&self, multipliers: &StrategyWeights) -> Self {
        Self {
            mastery_priority: self.mastery_priority * multipliers.mastery_priority,
            difficulty_optimization: self.difficulty_optimization
                * multipliers.difficulty_optimization,
            time_constraints: self.time_constraints * multipliers.time_constraints,
            engagement_factor: self.engagement_factor * multipliers.engagement_factor,
            stress_consideration: self.stress_consideration * multipliers.stress_consideration,
            prerequisite_importance: self.prerequisite_importance
                * multipliers.prerequisite_importance,
        }
    }

    pub fn as_array(&self) -> [f64; 6] {
        [
            self.mastery_priority,
            self.difficulty_optimization,
            self.time_constraints,
            self.engagement_factor,
            self.stress_consideration,
            self.prerequisite_importance,
        ]
    }

    pub fn from_array(values: [f64; 6]) -> Self {
        Self {
            mastery_priority: values[0],
            difficulty_optimization: values[1],
            time_constraints: values[2],
            engagement_factor: values[3],
            stress_consideration: values[4],
            prerequisite_importance: values[5],
        }
    }
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MasteryFocused,
    EngagementFocused,
    #[default]
    Balanced,
    TimeEfficient,
    ConfidenceBuilding,
}

impl StrategyKind {
    pub fn all() -> &'static [StrategyKind] {
        &[
            Self::MasteryFocused,
            Self::EngagementFocused,
            Self::Balanced,
            Self::TimeEfficient,
            Self::ConfidenceBuilding,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MasteryFocused => "mastery_focused",
            Self::EngagementFocused => "engagement_focused",
            Self::Balanced => "balanced",
            Self::TimeEfficient => "time_efficient",
            Self::ConfidenceBuilding => "confidence_building",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.as_str() == s)
    }
}

/// A named weighting of the scoring factors plus a difficulty nudge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationStrategy {
    pub kind: StrategyKind,
    pub weights: StrategyWeights,
    pub difficulty_bias: f64,
    pub description: &'static str,
}

impl RecommendationStrategy {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn for_kind(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::MasteryFocused => Self {
                kind,
                weights: StrategyWeights {
                    mastery_priority: 0.35,
                    difficulty_optimization: 0.2,
                    time_constraints: 0.05,
                    engagement_factor: 0.1,
                    stress_consideration: 0.05,
                    prerequisite_importance: 0.25,
                },
                difficulty_bias: 0.0,
                description: "Close the largest knowledge gaps first",
            },
            StrategyKind::EngagementFocused => Self {
                kind,
                weights: StrategyWeights {
                    mastery_priority: 0.15,
                    difficulty_optimization: 0.2,
                    time_constraints: 0.1,
                    engagement_factor: 0.35,
                    stress_consideration: 0.1,
                    prerequisite_importance: 0.1,
                },
                difficulty_bias: -0.05,
                description: "Win back momentum with engaging, approachable questions",
            },
            StrategyKind::Balanced => Self {
                kind,
                weights: StrategyWeights {
                    mastery_priority: 0.25,
                    difficulty_optimization: 0.2,
                    time_constraints: 0.1,
                    engagement_factor: 0.2,
                    stress_consideration: 0.05,
                    prerequisite_importance: 0.2,
                },
                difficulty_bias: 0.0,
                description: "Even weighting of gaps, fit and engagement",
            },
            StrategyKind::TimeEfficient => Self {
                kind,
                weights: StrategyWeights {
                    mastery_priority: 0.25,
                    difficulty_optimization: 0.15,
                    time_constraints: 0.35,
                    engagement_factor: 0.1,
                    stress_consideration: 0.05,
                    prerequisite_importance: 0.1,
                },
                difficulty_bias: 0.0,
                description: "Short questions that fit a tight session",
            },
            StrategyKind::ConfidenceBuilding => Self {
                kind,
                weights: StrategyWeights {
                    mastery_priority: 0.15,
                    difficulty_optimization: 0.25,
                    time_constraints: 0.1,
                    engagement_factor: 0.25,
                    stress_consideration: 0.3,
                    prerequisite_importance: 0.15,
                },
                difficulty_bias: -0.1,
                description: "Achievable questions for a stressed learner",
            },
        }
    }
}

pub struct StrategyRegistry {
    strategies: BTreeMap<StrategyKind, Arc<RecommendationStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        let strategies = StrategyKind::all()
            .iter()
            .map(|kind| (*kind, Arc::new(RecommendationStrategy::for_kind(*kind))))
            .collect();
        Self { strategies }
    }

    pub fn get(&self, kind: StrategyKind) -> Arc<RecommendationStrategy> {
        self.strategies
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(RecommendationStrategy::for_kind(kind)))
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<RecommendationStrategy>> {
        StrategyKind::parse(name).map(|kind| self.get(kind))
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<RecommendationStrategy>> {
        self.strategies.values()
    }
}

/// Picks one strategy per request from the learner's situation.
pub struct StrategySelector {
    registry: Arc<StrategyRegistry>,
}

impl StrategySelector {
    const HIGH_STRESS: f64 = 0.7;
    const SHORT_SESSION_MINUTES: f64 = 10.0;
    const CALM_STRESS: f64 = 0.4;
    const GAP_PRESSURE: f64 = 0.3;
    const MIN_ZONE_CONFIDENCE: f64 = 0.2;

    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }

    pub fn select(
        &self,
        analysis: &LearningAnalysis,
        zone: &ZpdZone,
        areas: &[PriorityArea],
        context: &LearningContext,
    ) -> Arc<RecommendationStrategy> {
        let kind = Self::choose(analysis, zone, areas, context);
        tracing::debug!(strategy = kind.as_str(), "strategy selected");
        self.registry.get(kind)
    }

    fn choose(
        analysis: &LearningAnalysis,
        zone: &ZpdZone,
        areas: &[PriorityArea],
        context: &LearningContext,
    ) -> StrategyKind {
        if analysis.stress_level >= Self::HIGH_STRESS {
            return StrategyKind::ConfidenceBuilding;
        }
        if context.available_time_minutes < Self::SHORT_SESSION_MINUTES {
            return StrategyKind::TimeEfficient;
        }
        if analysis.engagement_trend == EngagementTrend::Declining {
            return StrategyKind::EngagementFocused;
        }

        let has_urgent = areas.iter().any(|a| a.urgency == Urgency::High);
        if analysis.stress_level < Self::CALM_STRESS
            && (has_urgent || mean_knowledge_gap(analysis, areas) >= Self::GAP_PRESSURE)
            && zone.confidence >= Self::MIN_ZONE_CONFIDENCE
        {
            return StrategyKind::MasteryFocused;
        }

        StrategyKind::Balanced
    }
}

/// Mean of `1 - mastery` over skill-type priority areas.
fn mean_knowledge_gap(analysis: &LearningAnalysis, areas: &[PriorityArea]) -> f64 {
    let gaps: Vec<f64> = areas
        .iter()
        .filter(|a| a.area_type == PriorityAreaType::Skill)
        .map(|a| 1.0 - analysis.mastery_or(&a.identifier, 0.0))
        .collect();
    if gaps.is_empty() {
        return 0.0;
    }
    gaps.iter().sum::<f64>() / gaps.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(confidence: f64) -> ZpdZone {
        ZpdZone {
            confidence,
            ..ZpdZone::default()
        }
    }

    fn gap_area(skill: &str, urgency: Urgency) -> PriorityArea {
        PriorityArea {
            area_type: PriorityAreaType::Skill,
            identifier: skill.to_string(),
            priority: 0.8,
            reasons: vec![],
            urgency,
            time_investment_minutes: 10.0,
            prerequisites: vec![],
        }
    }

    fn selector() -> StrategySelector {
        StrategySelector::new(Arc::new(StrategyRegistry::new()))
    }

    #[test]
    fn weights_sum_to_one() {
        for kind in StrategyKind::all() {
            let total: f64 = RecommendationStrategy::for_kind(*kind)
                .weights
                .as_array()
                .iter()
                .sum();
            assert!((total - 1.0).abs() < 1e-9, "{} sums to {}", kind.as_str(), total);
        }
    }

    #[test]
    fn high_stress_wins_over_everything() {
        let analysis = LearningAnalysis {
            stress_level: 0.9,
            engagement_trend: EngagementTrend::Declining,
            ..LearningAnalysis::default()
        };
        let context = LearningContext {
            available_time_minutes: 5.0,
            ..LearningContext::default()
        };
        let chosen = selector().select(&analysis, &zone(0.9), &[], &context);
        assert_eq!(chosen.kind, StrategyKind::ConfidenceBuilding);
    }

    #[test]
    fn short_session_prefers_time_efficient() {
        let analysis = LearningAnalysis::default();
        let context = LearningContext {
            available_time_minutes: 8.0,
            ..LearningContext::default()
        };
        let chosen = selector().select(&analysis, &zone(0.5), &[], &context);
        assert_eq!(chosen.kind, StrategyKind::TimeEfficient);
    }

    #[test]
    fn calm_learner_with_urgent_gap_is_mastery_focused() {
        let analysis = LearningAnalysis {
            stress_level: 0.2,
            ..LearningAnalysis::default()
        };
        let areas = vec![gap_area("fractions", Urgency::High)];
        let chosen = selector().select(&analysis, &zone(0.5), &areas, &LearningContext::default());
        assert_eq!(chosen.kind, StrategyKind::MasteryFocused);

        let unsure = selector().select(&analysis, &zone(0.1), &areas, &LearningContext::default());
        assert_eq!(unsure.kind, StrategyKind::Balanced);
    }

    #[test]
    fn registry_resolves_names() {
        let registry = StrategyRegistry::new();
        assert_eq!(
            registry.by_name("time_efficient").map(|s| s.kind),
            Some(StrategyKind::TimeEfficient)
        );
        assert!(registry.by_name("speedrun").is_none());
        assert_eq!(registry.all().count(), 5);
    }
}
