use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::recommend::config::DiversityParams;
use crate::recommend::scoring::ScoredCandidate;
use crate::recommend::strategy::RecommendationStrategy;
use crate::recommend::types::{QuestionRecommendation, RecommendationReasoning};

pub struct DiversityOptimizer {
    params: DiversityParams,
}

impl DiversityOptimizer {
    pub fn new(params: DiversityParams) -> Self {
        Self { params }
    }

    /// Indices into `ranked` forming the final set, in rank order. The top candidate is always kept.
    pub fn select(&self, ranked: &[ScoredCandidate], count: usize) -> Vec<usize> {
        if ranked.len() <= count {
            return (0..ranked.len()).collect();
        }
        if count == 0 {
            return Vec::new();
        }

        let mut chosen = vec![0usize];
        let mut skills: BTreeSet<&str> = BTreeSet::new();
        let mut concepts: BTreeSet<&str> = BTreeSet::new();
        cover(&ranked[0], &mut skills, &mut concepts);

        for (index, scored) in ranked.iter().enumerate().skip(1) {
            if chosen.len() >= count {
                break;
            }
            let diversity = diversity(scored, &skills, &concepts);
            if scored.priority() > self.params.priority_threshold
                || diversity > self.params.diversity_threshold
            {
                chosen.push(index);
                cover(scored, &mut skills, &mut concepts);
            }
        }

        if chosen.len() < count {
            let mut remaining: Vec<usize> = (0..ranked.len()).filter(|i| !chosen.contains(i)).collect();
            remaining.sort_by(|a, b| {
                ranked[*b]
                    .combined()
                    .total_cmp(&ranked[*a].combined())
                    .then_with(|| a.cmp(b))
            });
            chosen.extend(remaining.into_iter().take(count - chosen.len()));
        }

        chosen.sort_unstable();
        chosen
    }

    pub fn optimize(
        &self,
        ranked: &[ScoredCandidate],
        count: usize,
        strategy: &RecommendationStrategy,
        generated_at: DateTime<Utc>,
    ) -> Vec<QuestionRecommendation> {
        self.select(ranked, count)
            .into_iter()
            .enumerate()
            .map(|(position, index)| to_recommendation(&ranked[index], position + 1, strategy, generated_at))
            .collect()
    }
}

fn cover<'a>(scored: &'a ScoredCandidate, skills: &mut BTreeSet<&'a str>, concepts: &mut BTreeSet<&'a str>) {
    skills.extend(scored.candidate.skills.iter().map(String::as_str));
    concepts.extend(scored.candidate.concepts.iter().map(String::as_str));
}

fn uncovered_fraction(items: &[String], covered: &BTreeSet<&str>) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let fresh = items.iter().filter(|i| !covered.contains(i.as_str())).count();
    fresh as f64 / items.len() as f64
}

fn diversity(scored: &ScoredCandidate, skills: &BTreeSet<&str>, concepts: &BTreeSet<&str>) -> f64 {
    let skill_part = uncovered_fraction(&scored.candidate.skills, skills);
    let concept_part = uncovered_fraction(&scored.candidate.concepts, concepts);
    (skill_part + concept_part) / 2.0
}

fn to_recommendation(
    scored: &ScoredCandidate,
    rank: usize,
    strategy: &RecommendationStrategy,
    generated_at: DateTime<Utc>,
) -> QuestionRecommendation {
    let candidate = &scored.candidate;
    QuestionRecommendation {
        recommendation_id: String::new(),
        learner_id: None,
        question_id: candidate.question_id.clone(),
        skills: candidate.skills.clone(),
        concepts: candidate.concepts.clone(),
        target_skill: candidate.target_skill.clone(),
        difficulty: candidate.difficulty,
        estimated_time_seconds: candidate.estimated_time_seconds,
        relevance_score: candidate.relevance_score,
        priority: scored.priority().clamp(0.0, 1.0),
        rank,
        strategy: strategy.kind,
        reasoning: RecommendationReasoning::default(),
        adaptive_metrics: scored.metrics,
        expected_outcome: scored.expected_outcome.clone(),
        alternatives: Vec::new(),
        is_fallback: candidate.source.is_fallback(),
        generated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::strategy::StrategyKind;
    use crate::recommend::types::{
        AdaptiveMetrics, CandidateSource, DifficultyBand, ExpectedOutcome, QuestionCandidate,
        QuestionFormat,
    };
    use std::collections::BTreeMap;

    fn scored(id: &str, skills: &[&str], concepts: &[&str], combined: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: QuestionCandidate {
                question_id: id.to_string(),
                skills: skills.iter().map(|s| s.to_string()).collect(),
                concepts: concepts.iter().map(|s| s.to_string()).collect(),
                difficulty: 0.5,
                difficulty_band: DifficultyBand::Medium,
                estimated_time_seconds: 60,
                relevance_score: 0.5,
                target_skill: skills.first().map(|s| s.to_string()).unwrap_or_default(),
                format: QuestionFormat::Text,
                success_rate: None,
                usage_count: 0,
                source: CandidateSource::Priority,
            },
            metrics: AdaptiveMetrics {
                combined_score: combined,
                ..AdaptiveMetrics::default()
            },
            expected_outcome: ExpectedOutcome::default(),
            weights: BTreeMap::new(),
        }
    }

    #[test]
    fn small_pool_is_returned_whole() {
        let ranked = vec![scored("a", &["x"], &[], 0.4), scored("b", &["x"], &[], 0.3)];
        assert_eq!(DiversityOptimizer::new(DiversityParams::default()).select(&ranked, 5), vec![0, 1]);
    }

    #[test]
    fn prefers_new_skills_then_backfills() {
        let ranked = vec![
            scored("a", &["fractions"], &["halves"], 0.6),
            scored("b", &["fractions"], &["halves"], 0.55),
            scored("c", &["geometry_basics"], &["angles"], 0.5),
            scored("d", &["fractions"], &["halves"], 0.45),
        ];
        let optimizer = DiversityOptimizer::new(DiversityParams::default());
        assert_eq!(optimizer.select(&ranked, 2), vec![0, 2]);
        assert_eq!(optimizer.select(&ranked, 3), vec![0, 1, 2]);
    }

    #[test]
    fn high_priority_is_included_despite_overlap() {
        let ranked = vec![
            scored("a", &["fractions"], &[], 0.9),
            scored("b", &["fractions"], &[], 0.8),
            scored("c", &["geometry_basics"], &[], 0.3),
        ];
        let optimizer = DiversityOptimizer::new(DiversityParams::default());
        assert_eq!(optimizer.select(&ranked, 2), vec![0, 1]);
    }

    #[test]
    fn recommendations_carry_rank_and_strategy() {
        let ranked = vec![scored("a", &["fractions"], &[], 0.6), scored("b", &["geometry_basics"], &[], 0.5)];
        let strategy = RecommendationStrategy::for_kind(StrategyKind::Balanced);
        let recs = DiversityOptimizer::new(DiversityParams::default()).optimize(&ranked, 1, &strategy, Utc::now());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].question_id, "a");
        assert_eq!(recs[0].rank, 1);
        assert_eq!(recs[0].strategy, StrategyKind::Balanced);
    }
}
