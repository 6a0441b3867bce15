use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::recommend::config::CandidateParams;
use crate::recommend::strategy::RecommendationStrategy;
use crate::recommend::types::{
    CandidateSource, DifficultyBand, LearningAnalysis, LearningContext, PriorityArea,
    QuestionCandidate,
};
use crate::recommend::zpd::ZpdZone;
use crate::store::{Question, QuestionQuery, QuestionRepository, RepositoryError};

/// Expands priority areas into a scored pool of questions pulled from the store.
pub struct CandidateGenerator {
    params: CandidateParams,
    store: Arc<dyn QuestionRepository>,
    store_timeout: Duration,
}

impl CandidateGenerator {
    pub fn new(
        params: CandidateParams,
        store: Arc<dyn QuestionRepository>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            params,
            store,
            store_timeout,
        }
    }

    pub async fn generate(
        &self,
        areas: &[PriorityArea],
        zone: &ZpdZone,
        strategy: &RecommendationStrategy,
        analysis: &LearningAnalysis,
        context: &LearningContext,
    ) -> Result<Vec<QuestionCandidate>, RepositoryError> {
        let now = context.as_of.unwrap_or_else(Utc::now);
        let skills = self.target_skills(areas);

        let plan: Vec<(String, DifficultyBand)> = skills
            .iter()
            .flat_map(|skill| {
                let optimal = zone.optimal_for(skill) + strategy.difficulty_bias;
                DifficultyBand::for_optimal(optimal)
                    .into_iter()
                    .map(move |band| (skill.clone(), band))
            })
            .collect();

        let mut pool = self
            .run_queries(&plan, context, analysis, now, CandidateSource::Priority)
            .await?;

        if pool.is_empty() {
            tracing::debug!("no candidates in ZPD bands, widening to all bands");
            let widened: Vec<(String, DifficultyBand)> = skills
                .iter()
                .flat_map(|skill| {
                    DifficultyBand::all()
                        .iter()
                        .map(move |band| (skill.clone(), *band))
                })
                .collect();
            pool = self
                .run_queries(&widened, context, analysis, now, CandidateSource::Widened)
                .await?;
        }

        if pool.is_empty() && skills != self.params.default_skills {
            tracing::debug!("no candidates for priority skills, trying default skills");
            let defaults: Vec<(String, DifficultyBand)> = self
                .params
                .default_skills
                .iter()
                .flat_map(|skill| {
                    DifficultyBand::all()
                        .iter()
                        .map(move |band| (skill.clone(), *band))
                })
                .collect();
            pool = self
                .run_queries(&defaults, context, analysis, now, CandidateSource::DefaultSkills)
                .await?;
        }

        if pool.is_empty() {
            tracing::debug!("falling back to an unfiltered catalog query");
            let query = QuestionQuery {
                subject: context.subject.clone(),
                difficulty: None,
                skills: Vec::new(),
                limit: self.params.max_candidates,
                exclude_ids: context.exclude_question_ids.clone(),
            };
            let questions = self.fetch(&query).await?;
            pool = questions
                .into_iter()
                .filter_map(|q| {
                    let target = q.primary_skill()?.to_string();
                    Some(self.to_candidate(q, &target, analysis, now, CandidateSource::Catalog))
                })
                .collect();
        }

        Ok(self.finalize(pool))
    }

    /// Distinct identifiers in priority order, or the configured defaults on cold start.
    pub fn target_skills(&self, areas: &[PriorityArea]) -> Vec<String> {
        let mut skills: Vec<String> = Vec::new();
        for area in areas {
            if skills.len() >= self.params.max_skills {
                break;
            }
            if !skills.contains(&area.identifier) {
                skills.push(area.identifier.clone());
            }
        }
        if skills.is_empty() {
            return self.params.default_skills.clone();
        }
        skills
    }

    async fn run_queries(
        &self,
        plan: &[(String, DifficultyBand)],
        context: &LearningContext,
        analysis: &LearningAnalysis,
        now: DateTime<Utc>,
        source: CandidateSource,
    ) -> Result<Vec<QuestionCandidate>, RepositoryError> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let queries: Vec<QuestionQuery> = plan
            .iter()
            .map(|(skill, band)| QuestionQuery {
                subject: context.subject.clone(),
                difficulty: Some(*band),
                skills: vec![skill.clone()],
                limit: self.params.per_query_limit,
                exclude_ids: context.exclude_question_ids.clone(),
            })
            .collect();

        let results = join_all(queries.iter().map(|query| self.fetch(query))).await;

        let mut pool = Vec::new();
        let mut last_error = None;
        let mut failures = 0usize;
        for ((skill, band), result) in plan.iter().zip(results) {
            match result {
                Ok(questions) => pool.extend(
                    questions
                        .into_iter()
                        .map(|q| self.to_candidate(q, skill, analysis, now, source)),
                ),
                Err(err) => {
                    failures += 1;
                    tracing::warn!(
                        skill = %skill,
                        band = band.as_str(),
                        error = %err,
                        "candidate query failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        if failures == plan.len() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(pool)
    }

    async fn fetch(&self, query: &QuestionQuery) -> Result<Vec<Question>, RepositoryError> {
        match tokio::time::timeout(self.store_timeout, self.store.fetch_questions(query)).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout(self.store_timeout.as_millis() as u64)),
        }
    }

    pub fn to_candidate(
        &self,
        question: Question,
        target_skill: &str,
        analysis: &LearningAnalysis,
        now: DateTime<Utc>,
        source: CandidateSource,
    ) -> QuestionCandidate {
        let relevance_score = self.relevance(&question, target_skill, analysis, now);
        QuestionCandidate {
            difficulty: question.numeric_difficulty(),
            difficulty_band: question.difficulty,
            question_id: question.id,
            skills: question.skills,
            concepts: question.concepts,
            estimated_time_seconds: question.estimated_time_seconds,
            relevance_score,
            target_skill: target_skill.to_string(),
            format: question.format,
            success_rate: question.success_rate.filter(|s| s.is_finite()),
            usage_count: question.usage_count,
            source,
        }
    }

    fn relevance(
        &self,
        question: &Question,
        target_skill: &str,
        analysis: &LearningAnalysis,
        now: DateTime<Utc>,
    ) -> f64 {
        let mut score = 0.0;

        if question.primary_skill() == Some(target_skill) {
            score += 0.4;
        } else if question.skills.iter().any(|s| s == target_skill) {
            score += 0.2;
        }

        if analysis
            .mastery(target_skill)
            .is_some_and(|m| m < self.params.low_mastery_threshold)
        {
            score += 0.2;
        }
        if analysis
            .recent_success_rate(target_skill)
            .is_some_and(|r| r < self.params.low_success_threshold)
        {
            score += 0.1;
        }

        score += 0.05 / (1.0 + question.usage_count as f64 / 100.0);

        let stale = match question.last_used_at {
            None => true,
            Some(used) => (now - used).num_days() >= self.params.stale_after_days,
        };
        if stale {
            score += 0.05;
        }

        let target = self.params.target_success_rate;
        score += match question.success_rate.filter(|s| s.is_finite()) {
            Some(rate) => 0.1 * (1.0 - (rate - target).abs() / target).max(0.0),
            None => 0.05,
        };

        score.clamp(0.0, 1.0)
    }

    fn finalize(&self, pool: Vec<QuestionCandidate>) -> Vec<QuestionCandidate> {
        let mut best: BTreeMap<String, QuestionCandidate> = BTreeMap::new();
        for candidate in pool {
            match best.get(&candidate.question_id) {
                Some(existing) if existing.relevance_score >= candidate.relevance_score => {}
                _ => {
                    best.insert(candidate.question_id.clone(), candidate);
                }
            }
        }

        let mut out: Vec<QuestionCandidate> = best.into_values().collect();
        out.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.question_id.cmp(&b.question_id))
        });
        out.truncate(self.params.max_candidates);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::strategy::StrategyKind;
    use crate::recommend::types::{PriorityAreaType, QuestionFormat, Urgency};
    use crate::store::InMemoryQuestionStore;
    use chrono::TimeZone;

    fn question(id: &str, skills: &[&str], band: DifficultyBand) -> Question {
        Question {
            id: id.to_string(),
            subject: "math".to_string(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            concepts: vec![],
            difficulty: band,
            difficulty_score: None,
            estimated_time_seconds: 90,
            format: QuestionFormat::Text,
            usage_count: 0,
            success_rate: Some(0.7),
            last_used_at: None,
        }
    }

    fn area(skill: &str, priority: f64) -> PriorityArea {
        PriorityArea {
            area_type: PriorityAreaType::Skill,
            identifier: skill.to_string(),
            priority,
            reasons: vec![],
            urgency: Urgency::Medium,
            time_investment_minutes: 10.0,
            prerequisites: vec![],
        }
    }

    fn generator(store: Arc<InMemoryQuestionStore>) -> CandidateGenerator {
        CandidateGenerator::new(CandidateParams::default(), store, Duration::from_millis(500))
    }

    fn context() -> LearningContext {
        LearningContext {
            as_of: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            ..LearningContext::default()
        }
    }

    fn analysis(skill: &str, mastery: f64) -> LearningAnalysis {
        let mut analysis = LearningAnalysis::default();
        analysis.masteries.insert(skill.to_string(), mastery);
        analysis
    }

    fn balanced() -> RecommendationStrategy {
        RecommendationStrategy::for_kind(StrategyKind::Balanced)
    }

    #[tokio::test]
    async fn primary_skill_match_outranks_secondary() {
        let store = Arc::new(InMemoryQuestionStore::new(vec![
            question("primary", &["fractions"], DifficultyBand::Easy),
            question("secondary", &["arithmetic_operations", "fractions"], DifficultyBand::Easy),
        ]));
        let zone = ZpdZone::default();
        let out = generator(store)
            .generate(
                &[area("fractions", 0.8)],
                &ZpdZone {
                    default_optimal: 0.35,
                    ..zone
                },
                &balanced(),
                &analysis("geometry_basics", 0.9),
                &context(),
            )
            .await
            .unwrap();

        assert_eq!(out[0].question_id, "primary");
        // 0.4 + 0.05 usage + 0.05 stale + 0.1 challenge
        assert!((out[0].relevance_score - 0.6).abs() < 1e-9);
        assert!((out[1].relevance_score - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_bands_widen_before_defaults() {
        let store = Arc::new(InMemoryQuestionStore::new(vec![
            question("hard-fraction", &["fractions"], DifficultyBand::Hard),
            question("default-q", &["arithmetic_operations"], DifficultyBand::Easy),
        ]));
        let out = generator(store)
            .generate(
                &[area("fractions", 0.8)],
                &ZpdZone {
                    default_optimal: 0.3,
                    ..ZpdZone::default()
                },
                &balanced(),
                &LearningAnalysis::default(),
                &context(),
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].question_id, "hard-fraction");
        assert_eq!(out[0].source, CandidateSource::Widened);
    }

    #[tokio::test]
    async fn unknown_skills_fall_through_to_catalog() {
        let store = Arc::new(InMemoryQuestionStore::new(vec![question(
            "only",
            &["geometry_basics"],
            DifficultyBand::Medium,
        )]));
        let out = generator(store)
            .generate(
                &[area("essay_structure", 0.8)],
                &ZpdZone::default(),
                &balanced(),
                &LearningAnalysis::default(),
                &context(),
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, CandidateSource::Catalog);
        assert!(out[0].source.is_fallback());
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_error() {
        let store = Arc::new(InMemoryQuestionStore::empty());
        store.set_failing(true);
        let result = generator(store)
            .generate(
                &[area("fractions", 0.8)],
                &ZpdZone::default(),
                &balanced(),
                &LearningAnalysis::default(),
                &context(),
            )
            .await;
        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
    }

    #[test]
    fn target_skills_are_capped_and_distinct() {
        let store = Arc::new(InMemoryQuestionStore::empty());
        let gen = generator(store);
        let mut areas: Vec<PriorityArea> = (0..12).map(|i| area(&format!("s{}", i), 1.0)).collect();
        areas.insert(1, area("s0", 0.9));
        let skills = gen.target_skills(&areas);
        assert_eq!(skills.len(), 10);
        assert_eq!(skills[1], "s1");
        assert_eq!(gen.target_skills(&[]).len(), 3);
    }
}
