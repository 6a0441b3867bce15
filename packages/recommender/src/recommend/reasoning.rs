use crate::recommend::scoring::ScoredCandidate;
use crate::recommend::types::{
    AlternativeQuestion, FactorContribution, LearningContext, PriorityArea,
    QuestionRecommendation, RecommendationReasoning, ScoringFactor, ZpdSummary,
};

const DIFFICULTY_MARGIN: f64 = 0.1;

/// Fills rationale and alternatives. Never touches scores or the selection.
pub struct ReasoningEnricher {
    max_alternatives: usize,
    tolerance: f64,
}

pub struct EnrichmentInput<'a> {
    pub ranked: &'a [ScoredCandidate],
    /// Index into `ranked` for each recommendation, same order.
    pub selected: &'a [usize],
    pub areas: &'a [PriorityArea],
    pub context: &'a LearningContext,
    pub count: usize,
}

impl ReasoningEnricher {
    pub fn new(max_alternatives: usize, tolerance: f64) -> Self {
        Self {
            max_alternatives,
            tolerance,
        }
    }

    pub fn enrich(&self, recommendations: &mut [QuestionRecommendation], input: &EnrichmentInput<'_>) {
        let budget_minutes =
            input.context.available_time_minutes.max(0.0) / input.count.max(1) as f64;

        for (rec, index) in recommendations.iter_mut().zip(input.selected) {
            let Some(scored) = input.ranked.get(*index) else {
                continue;
            };
            rec.alternatives = self.alternatives(scored, input, budget_minutes);
            rec.reasoning = self.reasoning(rec, scored, input.areas);
        }
    }

    fn alternatives(
        &self,
        chosen: &ScoredCandidate,
        input: &EnrichmentInput<'_>,
        budget_minutes: f64,
    ) -> Vec<AlternativeQuestion> {
        let unselected: Vec<&ScoredCandidate> = input
            .ranked
            .iter()
            .enumerate()
            .filter(|(i, _)| !input.selected.contains(i))
            .map(|(_, s)| s)
            .collect();

        let shares_skill = |other: &ScoredCandidate| {
            other
                .candidate
                .skills
                .iter()
                .any(|s| chosen.candidate.skills.contains(s))
        };

        let mut picks: Vec<&ScoredCandidate> = unselected
            .iter()
            .copied()
            .filter(|s| shares_skill(*s))
            .take(self.max_alternatives)
            .collect();
        if picks.len() < self.max_alternatives {
            let needed = self.max_alternatives - picks.len();
            picks.extend(
                unselected
                    .iter()
                    .copied()
                    .filter(|s| !shares_skill(*s))
                    .take(needed),
            );
        }

        picks
            .into_iter()
            .map(|alt| AlternativeQuestion {
                question_id: alt.candidate.question_id.clone(),
                skills: alt.candidate.skills.clone(),
                difficulty: alt.candidate.difficulty,
                combined_score: alt.metrics.combined_score,
                reason: alternative_reason(chosen, alt, budget_minutes),
            })
            .collect()
    }

    fn reasoning(
        &self,
        rec: &QuestionRecommendation,
        scored: &ScoredCandidate,
        areas: &[PriorityArea],
    ) -> RecommendationReasoning {
        let factors: Vec<FactorContribution> = ScoringFactor::all()
            .iter()
            .map(|factor| {
                let score = scored.metrics.factor(*factor);
                let weight = scored.weights.get(factor).copied().unwrap_or(0.0);
                FactorContribution {
                    factor: *factor,
                    score,
                    weight,
                    contribution: score * weight,
                }
            })
            .collect();

        let dominant_factor = factors
            .iter()
            .filter(|f| f.contribution > 0.0)
            .fold(None::<&FactorContribution>, |best, f| match best {
                Some(b) if b.contribution >= f.contribution => Some(b),
                _ => Some(f),
            })
            .map(|f| f.factor);

        let optimal = scored.metrics.optimal_difficulty;
        let lower_bound = (optimal - self.tolerance).max(0.0);
        let upper_bound = (optimal + self.tolerance).min(1.0);
        let zpd = ZpdSummary {
            optimal_difficulty: optimal,
            lower_bound,
            upper_bound,
            alignment: scored.metrics.zpd_alignment,
            within_band: rec.difficulty >= lower_bound && rec.difficulty <= upper_bound,
        };

        let mut priority_reasons: Vec<String> = Vec::new();
        for area in areas.iter().filter(|a| rec.skills.contains(&a.identifier)) {
            for reason in &area.reasons {
                let line = format!("{}: {}", area.identifier, reason);
                if !priority_reasons.contains(&line) {
                    priority_reasons.push(line);
                }
            }
        }

        let summary = summarize(rec, dominant_factor, &zpd);

        RecommendationReasoning {
            summary,
            dominant_factor,
            factors,
            zpd,
            priority_reasons,
        }
    }
}

fn summarize(
    rec: &QuestionRecommendation,
    dominant: Option<ScoringFactor>,
    zpd: &ZpdSummary,
) -> String {
    let placement = if zpd.within_band {
        "inside"
    } else if rec.difficulty > zpd.upper_bound {
        "above"
    } else {
        "below"
    };
    let driver = dominant
        .map(|f| format!(", chosen mainly for {}", f.label()))
        .unwrap_or_default();
    let mut text = format!(
        "Practice {} at difficulty {:.2}, {} the learning zone around {:.2}{}.",
        rec.target_skill, rec.difficulty, placement, zpd.optimal_difficulty, driver
    );
    if rec.is_fallback {
        text.push_str(" Served from the fallback set.");
    }
    text
}

fn alternative_reason(chosen: &ScoredCandidate, alt: &ScoredCandidate, budget_minutes: f64) -> String {
    let optimal = alt.metrics.optimal_difficulty;
    if alt.candidate.difficulty > optimal + DIFFICULTY_MARGIN {
        return "harder than the learner's optimal difficulty".to_string();
    }
    if alt.candidate.difficulty < optimal - DIFFICULTY_MARGIN {
        return "easier than the learner's optimal difficulty".to_string();
    }
    if alt.metrics.mastery_score < chosen.metrics.mastery_score {
        return "smaller impact on the biggest knowledge gap".to_string();
    }
    if alt.candidate.estimated_time_seconds as f64 / 60.0 > budget_minutes {
        return "longer than the per-question time budget".to_string();
    }
    if alt.metrics.novelty_score < chosen.metrics.novelty_score {
        return "practiced more recently".to_string();
    }
    "lower overall fit".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::strategy::StrategyKind;
    use crate::recommend::types::{
        AdaptiveMetrics, CandidateSource, DifficultyBand, ExpectedOutcome, PriorityAreaType,
        QuestionCandidate, QuestionFormat, Urgency,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn scored(id: &str, skill: &str, difficulty: f64, combined: f64) -> ScoredCandidate {
        let mut weights = BTreeMap::new();
        weights.insert(ScoringFactor::Mastery, 0.5);
        weights.insert(ScoringFactor::Difficulty, 0.5);
        ScoredCandidate {
            candidate: QuestionCandidate {
                question_id: id.to_string(),
                skills: vec![skill.to_string()],
                concepts: vec![],
                difficulty,
                difficulty_band: DifficultyBand::Medium,
                estimated_time_seconds: 60,
                relevance_score: 0.5,
                target_skill: skill.to_string(),
                format: QuestionFormat::Text,
                success_rate: None,
                usage_count: 0,
                source: CandidateSource::Priority,
            },
            metrics: AdaptiveMetrics {
                mastery_score: 0.8,
                difficulty_score: 0.6,
                combined_score: combined,
                zpd_alignment: 1.0 - (difficulty - 0.5_f64).abs(),
                optimal_difficulty: 0.5,
                ..AdaptiveMetrics::default()
            },
            expected_outcome: ExpectedOutcome::default(),
            weights,
        }
    }

    fn recommendation(scored: &ScoredCandidate) -> QuestionRecommendation {
        QuestionRecommendation {
            recommendation_id: String::new(),
            learner_id: None,
            question_id: scored.candidate.question_id.clone(),
            skills: scored.candidate.skills.clone(),
            concepts: vec![],
            target_skill: scored.candidate.target_skill.clone(),
            difficulty: scored.candidate.difficulty,
            estimated_time_seconds: 60,
            relevance_score: 0.5,
            priority: scored.metrics.combined_score,
            rank: 1,
            strategy: StrategyKind::Balanced,
            reasoning: RecommendationReasoning::default(),
            adaptive_metrics: scored.metrics,
            expected_outcome: ExpectedOutcome::default(),
            alternatives: vec![],
            is_fallback: false,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn same_skill_alternatives_come_first() {
        let ranked = vec![
            scored("pick", "fractions", 0.5, 0.8),
            scored("other-skill", "geometry_basics", 0.5, 0.7),
            scored("too-hard", "fractions", 0.8, 0.6),
            scored("too-easy", "fractions", 0.2, 0.5),
        ];
        let mut recs = vec![recommendation(&ranked[0])];
        let areas = vec![PriorityArea {
            area_type: PriorityAreaType::Skill,
            identifier: "fractions".to_string(),
            priority: 0.8,
            reasons: vec!["mastery 0.30 below 0.70".to_string()],
            urgency: Urgency::High,
            time_investment_minutes: 20.0,
            prerequisites: vec![],
        }];
        let context = LearningContext::default();
        let input = EnrichmentInput {
            ranked: &ranked,
            selected: &[0],
            areas: &areas,
            context: &context,
            count: 1,
        };
        ReasoningEnricher::new(2, 0.15).enrich(&mut recs, &input);

        let alts = &recs[0].alternatives;
        assert_eq!(alts.len(), 2);
        assert_eq!(alts[0].question_id, "too-hard");
        assert!(alts[0].reason.starts_with("harder"));
        assert_eq!(alts[1].question_id, "too-easy");
        assert!(alts[1].reason.starts_with("easier"));

        let reasoning = &recs[0].reasoning;
        assert_eq!(reasoning.dominant_factor, Some(ScoringFactor::Mastery));
        assert!(reasoning.zpd.within_band);
        assert_eq!(reasoning.priority_reasons.len(), 1);
        assert!(reasoning.summary.contains("fractions"));
        assert_eq!(recs[0].priority, 0.8);
    }
}
