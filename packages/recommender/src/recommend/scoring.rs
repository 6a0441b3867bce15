use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::recommend::config::ScoringParams;
use crate::recommend::skill_graph::SkillGraph;
use crate::recommend::strategy::{RecommendationStrategy, StrategyWeights};
use crate::recommend::types::{
    AdaptiveMetrics, ExpectedOutcome, LearnerProfile, LearningAnalysis, LearningContext,
    PriorityArea, QuestionCandidate, ScoringFactor,
};
use crate::recommend::zpd::{ZpdCalculator, ZpdZone};
use crate::store::UserQuestionAnalytics;

const ENGAGEMENT_BASE: f64 = 0.4;
const LOW_MOTIVATION: f64 = 0.4;
const MIN_SUCCESS: f64 = 0.05;
const MAX_SUCCESS: f64 = 0.95;

/// Everything the scorer reads besides the candidates themselves.
pub struct ScoringContext<'a> {
    pub analysis: &'a LearningAnalysis,
    pub zone: &'a ZpdZone,
    pub areas: &'a [PriorityArea],
    pub context: &'a LearningContext,
    pub profile: &'a LearnerProfile,
    pub analytics: &'a HashMap<String, UserQuestionAnalytics>,
    pub count: usize,
    pub multipliers: StrategyWeights,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: QuestionCandidate,
    pub metrics: AdaptiveMetrics,
    pub expected_outcome: ExpectedOutcome,
    /// Normalised weight each factor had in the combined score.
    pub weights: BTreeMap<ScoringFactor, f64>,
}

impl ScoredCandidate {
    pub fn combined(&self) -> f64 {
        self.metrics.combined_score
    }

    pub fn priority(&self) -> f64 {
        self.metrics.combined_score
    }
}

pub struct Scorer {
    params: ScoringParams,
    zpd: ZpdCalculator,
    graph: Arc<SkillGraph>,
}

impl Scorer {
    pub fn new(params: ScoringParams, zpd: ZpdCalculator, graph: Arc<SkillGraph>) -> Self {
        Self { params, zpd, graph }
    }

    pub fn score(
        &self,
        candidates: Vec<QuestionCandidate>,
        strategy: &RecommendationStrategy,
        ctx: &ScoringContext<'_>,
    ) -> Vec<ScoredCandidate> {
        let area_priority = summed_area_priority(ctx.areas);
        let weights = strategy.weights.scaled_by(&ctx.multipliers);

        candidates
            .into_iter()
            .map(|candidate| self.score_one(candidate, strategy, &weights, &area_priority, ctx))
            .collect()
    }

    /// Total order: combined score, with near-ties settled by ZPD alignment.
    pub fn rank(&self, mut scored: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        scored.sort_by(|a, b| {
            b.combined()
                .total_cmp(&a.combined())
                .then_with(|| a.candidate.question_id.cmp(&b.candidate.question_id))
        });

        let mut ranked = Vec::with_capacity(scored.len());
        let mut rest = scored.into_iter().peekable();
        while let Some(leader) = rest.next() {
            let anchor = leader.combined();
            let mut cluster = vec![leader];
            while let Some(next) = rest.peek() {
                if anchor - next.combined() > self.params.tie_tolerance {
                    break;
                }
                if let Some(member) = rest.next() {
                    cluster.push(member);
                }
            }
            cluster.sort_by(tie_break);
            ranked.extend(cluster);
        }
        ranked
    }

    fn score_one(
        &self,
        candidate: QuestionCandidate,
        strategy: &RecommendationStrategy,
        weights: &StrategyWeights,
        area_priority: &HashMap<&str, f64>,
        ctx: &ScoringContext<'_>,
    ) -> ScoredCandidate {
        let optimal = self.candidate_optimal(&candidate, strategy, ctx);
        let difficulty = candidate.difficulty;

        let mastery_score = self.mastery_score(&candidate, area_priority, ctx.analysis);
        let difficulty_score = self.zpd.difficulty_fit(difficulty, optimal);
        let zpd_alignment = self.zpd.zpd_alignment(difficulty, optimal);
        let engagement_score = engagement_score(&candidate, zpd_alignment, ctx.profile);
        let time_score = time_score(&candidate, ctx.context, ctx.count);
        let prerequisite_score = self.prerequisite_score(&candidate, ctx.analysis);
        let novelty_score = self.novelty_score(&candidate, ctx);

        let novelty_weight = self.params.novelty_weight;
        let factor_weights = [
            (ScoringFactor::Mastery, weights.mastery_priority, mastery_score),
            (ScoringFactor::Difficulty, weights.difficulty_optimization, difficulty_score),
            (ScoringFactor::Engagement, weights.engagement_factor, engagement_score),
            (ScoringFactor::Time, weights.time_constraints, time_score),
            (ScoringFactor::Prerequisite, weights.prerequisite_importance, prerequisite_score),
            (ScoringFactor::Novelty, novelty_weight, novelty_score),
        ];
        let total_weight: f64 = factor_weights.iter().map(|(_, w, _)| w).sum();
        let weighted = if total_weight > 0.0 {
            factor_weights.iter().map(|(_, w, s)| w * s).sum::<f64>() / total_weight
        } else {
            0.0
        };

        // Charged on distance, not side; the zone already leans easier under stress.
        let distance = (difficulty - optimal).abs();
        let stress_penalty =
            (weights.stress_consideration * ctx.analysis.stress_level * distance).clamp(0.0, 1.0);
        let combined_score = (weighted * (1.0 - stress_penalty)).clamp(0.0, 1.0);

        let normalised = factor_weights
            .iter()
            .map(|(factor, w, _)| {
                let share = if total_weight > 0.0 { w / total_weight } else { 0.0 };
                (*factor, share)
            })
            .collect();

        let metrics = AdaptiveMetrics {
            mastery_score,
            difficulty_score,
            engagement_score,
            time_score,
            prerequisite_score,
            novelty_score,
            combined_score,
            zpd_alignment,
            optimal_difficulty: optimal,
        };
        let expected_outcome = self.expected_outcome(&candidate, &metrics, ctx);

        ScoredCandidate {
            candidate,
            metrics,
            expected_outcome,
            weights: normalised,
        }
    }

    fn candidate_optimal(
        &self,
        candidate: &QuestionCandidate,
        strategy: &RecommendationStrategy,
        ctx: &ScoringContext<'_>,
    ) -> f64 {
        let base = self
            .zpd
            .calculate_optimal_difficulty(ctx.analysis, &candidate.skills);
        (base + ctx.zone.profile_offset + strategy.difficulty_bias).clamp(0.05, 0.95)
    }

    fn mastery_score(
        &self,
        candidate: &QuestionCandidate,
        area_priority: &HashMap<&str, f64>,
        analysis: &LearningAnalysis,
    ) -> f64 {
        let max_gap = candidate
            .skills
            .iter()
            .map(|s| 1.0 - analysis.mastery_or(s, 0.5))
            .fold(0.0, f64::max);
        let priority = candidate
            .skills
            .iter()
            .filter_map(|s| area_priority.get(s.as_str()).copied())
            .fold(0.0, f64::max);
        (0.6 * max_gap + 0.4 * priority.min(1.0)).clamp(0.0, 1.0)
    }

    fn prerequisite_score(&self, candidate: &QuestionCandidate, analysis: &LearningAnalysis) -> f64 {
        let mut prerequisites: Vec<&str> = Vec::new();
        for skill in &candidate.skills {
            for prerequisite in self.graph.prerequisites_of(skill) {
                if !prerequisites.contains(&prerequisite.as_str())
                    && !candidate.skills.contains(prerequisite)
                {
                    prerequisites.push(prerequisite);
                }
            }
        }
        if prerequisites.is_empty() {
            return 1.0;
        }

        let threshold = self.params.mastered_threshold;
        let credit: f64 = prerequisites
            .iter()
            .map(|p| match analysis.mastery(p) {
                Some(m) if m >= threshold => 1.0,
                Some(_) => 0.0,
                None => 0.5,
            })
            .sum();
        credit / prerequisites.len() as f64
    }

    fn novelty_score(&self, candidate: &QuestionCandidate, ctx: &ScoringContext<'_>) -> f64 {
        let base = match ctx.analytics.get(&candidate.question_id) {
            None => 1.0,
            Some(a) if a.attempts == 0 => 1.0,
            Some(a) => {
                let recovery = match a.last_attempted {
                    Some(at) => {
                        let days = (ctx.now - at).num_seconds().max(0) as f64 / 86_400.0;
                        1.0 - (-days / self.params.novelty_recovery_days.max(1e-6)).exp()
                    }
                    None => 1.0,
                };
                recovery / (1.0 + a.attempts as f64)
            }
        };

        let primary = candidate
            .skills
            .first()
            .map(String::as_str)
            .unwrap_or(candidate.target_skill.as_str());
        let penalty = self.params.similar_practice_penalty * ctx.analysis.recent_share(primary);
        (base - penalty).clamp(0.0, 1.0)
    }

    fn expected_outcome(
        &self,
        candidate: &QuestionCandidate,
        metrics: &AdaptiveMetrics,
        ctx: &ScoringContext<'_>,
    ) -> ExpectedOutcome {
        let masteries: Vec<(String, f64)> = candidate
            .skills
            .iter()
            .map(|s| (s.clone(), ctx.analysis.mastery_or(s, 0.5)))
            .collect();
        let mean_mastery = if masteries.is_empty() {
            0.5
        } else {
            masteries.iter().map(|(_, m)| m).sum::<f64>() / masteries.len() as f64
        };

        let mut success =
            0.5 + (mean_mastery - candidate.difficulty) * 1.2 + 0.1 * (metrics.prerequisite_score - 0.5);
        if let Some(rate) = candidate.success_rate {
            success = 0.7 * success + 0.3 * rate;
        }
        let success_probability = success.clamp(MIN_SUCCESS, MAX_SUCCESS);

        let mastery_improvement = masteries
            .into_iter()
            .map(|(skill, m)| {
                let gain = (1.0 - m) * 0.15 * metrics.difficulty_score * (0.5 + 0.5 * success_probability);
                (skill, gain)
            })
            .collect();

        let confidence_boost =
            (success_probability * 0.2 * (1.5 - candidate.difficulty)).clamp(0.0, 0.3);
        let engagement_change = ((metrics.engagement_score - 0.5) * 0.4
            + (metrics.novelty_score - 0.5) * 0.2)
            .clamp(-0.3, 0.3);

        let expected_time_seconds = ctx
            .analytics
            .get(&candidate.question_id)
            .map(|a| a.average_time_seconds)
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(|t| t.round() as u32)
            .unwrap_or(candidate.estimated_time_seconds);

        ExpectedOutcome {
            success_probability,
            mastery_improvement,
            confidence_boost,
            engagement_change,
            expected_time_seconds,
        }
    }
}

fn tie_break(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.metrics
        .zpd_alignment
        .total_cmp(&a.metrics.zpd_alignment)
        .then_with(|| b.combined().total_cmp(&a.combined()))
        .then_with(|| a.candidate.question_id.cmp(&b.candidate.question_id))
}

/// Merged priority summed per identifier across area types.
fn summed_area_priority(areas: &[PriorityArea]) -> HashMap<&str, f64> {
    let mut out: HashMap<&str, f64> = HashMap::new();
    for area in areas {
        *out.entry(area.identifier.as_str()).or_insert(0.0) += area.priority;
    }
    out
}

/// Low-motivation learners get their bonus scaled by ZPD alignment, so it fades with distance.
fn engagement_score(candidate: &QuestionCandidate, alignment: f64, profile: &LearnerProfile) -> f64 {
    let style = profile.learning_style.affinity(candidate.format);
    let challenge = match candidate.success_rate {
        Some(rate) => 0.2 * (1.0 - (rate - 0.7).abs() / 0.7).max(0.0),
        None => 0.1,
    };
    let motivation = profile.motivation_level.clamp(0.0, 1.0);
    let motivation_term = if motivation < LOW_MOTIVATION {
        0.1 * alignment
    } else {
        0.1 * motivation
    };
    (ENGAGEMENT_BASE + style + challenge + motivation_term).clamp(0.0, 1.0)
}

fn time_score(candidate: &QuestionCandidate, context: &LearningContext, count: usize) -> f64 {
    let estimate_minutes = candidate.estimated_time_seconds as f64 / 60.0;
    if estimate_minutes <= 0.0 {
        return 1.0;
    }
    let budget = context.available_time_minutes.max(0.0) / count.max(1) as f64;
    if estimate_minutes <= budget {
        1.0
    } else {
        (budget / estimate_minutes).clamp(0.0, 1.0)
    }
}
