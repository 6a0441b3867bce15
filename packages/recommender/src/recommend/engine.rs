use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::recommend::adaptation::{learner_key, AdaptationStore, OutcomeAdapter};
use crate::recommend::analysis::SkillStateReader;
use crate::recommend::candidates::CandidateGenerator;
use crate::recommend::config::EngineConfig;
use crate::recommend::diversity::DiversityOptimizer;
use crate::recommend::metrics::{registry, StageId, StageOutcome, StageStatus};
use crate::recommend::priority::PriorityAreaIdentifier;
use crate::recommend::reasoning::{EnrichmentInput, ReasoningEnricher};
use crate::recommend::scoring::{Scorer, ScoringContext};
use crate::recommend::skill_graph::SkillGraph;
use crate::recommend::strategy::{
    RecommendationStrategy, StrategyKind, StrategyRegistry, StrategySelector, StrategyWeights,
};
use crate::recommend::types::{
    ActualOutcome, CandidateSource, LearnerProfile, LearnerState, LearningAnalysis,
    LearningContext, PersonalizedInsights, PriorityArea, QuestionCandidate,
    QuestionRecommendation, StrategyPerformance,
};
use crate::recommend::zpd::{ZpdCalculator, ZpdZone};
use crate::store::{
    MasteryRepository, QuestionRepository, RepositoryError, UserQuestionAnalytics,
};
use crate::track_stage;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecommendError {
    #[error("count must be at least 1, got {0}")]
    InvalidCount(usize),
    #[error("learner state is required when no learner id is given")]
    MissingLearnerState,
}

#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error("{dependency} failed: {error}")]
    DependencyFailure {
        dependency: &'static str,
        error: RepositoryError,
    },
}

/// Selects, explains and learns from practice-question recommendations.
///
/// Shared across tasks through `Arc`; the only mutable state is the adaptation
/// store and the fallback cache, both behind locks.
pub struct RecommendationEngine {
    config: EngineConfig,
    questions: Arc<dyn QuestionRepository>,
    mastery: Option<Arc<dyn MasteryRepository>>,
    graph: Arc<SkillGraph>,
    strategies: Arc<StrategyRegistry>,
    reader: SkillStateReader,
    zpd: ZpdCalculator,
    priorities: PriorityAreaIdentifier,
    selector: StrategySelector,
    generator: CandidateGenerator,
    scorer: Scorer,
    diversity: DiversityOptimizer,
    enricher: ReasoningEnricher,
    adaptation: Arc<AdaptationStore>,
    adapter: OutcomeAdapter,
    fallback_cache: RwLock<VecDeque<QuestionCandidate>>,
}

impl RecommendationEngine {
    pub fn new(config: EngineConfig, questions: Arc<dyn QuestionRepository>) -> Self {
        let graph = Arc::new(SkillGraph::standard());
        let strategies = Arc::new(StrategyRegistry::new());
        let zpd = ZpdCalculator::new(config.zpd.clone());
        let store_timeout = Duration::from_millis(config.timeouts.store_timeout_ms);
        let adaptation = Arc::new(AdaptationStore::new(config.adaptation.clone()));

        Self {
            reader: SkillStateReader::new(config.analysis.clone()),
            priorities: PriorityAreaIdentifier::new(config.priority.clone(), graph.clone()),
            selector: StrategySelector::new(strategies.clone()),
            generator: CandidateGenerator::new(
                config.candidates.clone(),
                questions.clone(),
                store_timeout,
            ),
            scorer: Scorer::new(config.scoring.clone(), zpd.clone(), graph.clone()),
            diversity: DiversityOptimizer::new(config.diversity.clone()),
            enricher: ReasoningEnricher::new(config.diversity.max_alternatives, config.zpd.tolerance),
            adapter: OutcomeAdapter::new(adaptation.clone()),
            fallback_cache: RwLock::new(VecDeque::new()),
            mastery: None,
            questions,
            graph,
            strategies,
            zpd,
            adaptation,
            config,
        }
    }

    pub fn with_mastery_repository(mut self, mastery: Arc<dyn MasteryRepository>) -> Self {
        self.mastery = Some(mastery);
        self
    }

    pub fn with_skill_graph(mut self, graph: SkillGraph) -> Self {
        let graph = Arc::new(graph);
        self.priorities = PriorityAreaIdentifier::new(self.config.priority.clone(), graph.clone());
        self.scorer = Scorer::new(self.config.scoring.clone(), self.zpd.clone(), graph.clone());
        self.graph = graph;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn skill_graph(&self) -> &SkillGraph {
        &self.graph
    }

    pub fn strategy_registry(&self) -> &StrategyRegistry {
        &self.strategies
    }

    pub fn strategy_performance(&self) -> Vec<StrategyPerformance> {
        self.adaptation.strategy_performance()
    }

    pub fn stage_metrics(&self) -> Vec<StageStatus> {
        registry().snapshot()
    }

    pub async fn generate_recommendations(
        &self,
        learner_state: Option<&LearnerState>,
        context: &LearningContext,
        profile: &LearnerProfile,
        count: usize,
        learner_id: Option<&str>,
    ) -> Result<Vec<QuestionRecommendation>, RecommendError> {
        if count == 0 {
            return Err(RecommendError::InvalidCount(count));
        }
        if learner_state.is_none() && learner_id.is_none() {
            return Err(RecommendError::MissingLearnerState);
        }

        let count = if count > self.config.max_count {
            tracing::debug!(requested = count, max = self.config.max_count, "clamping count");
            self.config.max_count
        } else {
            count
        };

        let now = context.as_of.unwrap_or_else(Utc::now);
        let key = learner_key(learner_id);
        let deadline = Duration::from_millis(self.config.timeouts.request_deadline_ms);

        let outcome = tokio::time::timeout(
            deadline,
            self.run_pipeline(learner_state, context, profile, count, learner_id, &key, now),
        )
        .await;

        let recommendations = match outcome {
            Ok(Ok(recommendations)) => recommendations,
            Ok(Err(PipelineError::DependencyFailure { dependency, error })) => {
                tracing::warn!(
                    learner_id = %key,
                    dependency,
                    error = %error,
                    fallback = "cached_pool",
                    "dependency failure, serving fallback set"
                );
                self.fallback(context, profile, count, learner_id, &key, now).await
            }
            Err(_) => {
                tracing::warn!(
                    learner_id = %key,
                    dependency = "pipeline",
                    deadline_ms = self.config.timeouts.request_deadline_ms,
                    fallback = "cached_pool",
                    "request deadline exceeded, serving fallback set"
                );
                self.fallback(context, profile, count, learner_id, &key, now).await
            }
        };

        tracing::info!(
            learner_id = %key,
            count = recommendations.len(),
            fallback = recommendations.iter().any(|r| r.is_fallback),
            strategy = recommendations.first().map(|r| r.strategy.as_str()).unwrap_or("none"),
            "recommendations generated"
        );
        Ok(recommendations)
    }

    pub fn adapt_from_outcome(
        &self,
        recommendation: &QuestionRecommendation,
        actual_outcome: &ActualOutcome,
        learner_state: Option<&LearnerState>,
    ) -> Option<f64> {
        track_stage!(
            StageId::OutcomeAdapter,
            self.adapter
                .adapt(recommendation, actual_outcome, learner_state, Utc::now())
        )
    }

    pub fn get_personalized_insights(&self, learner_id: &str) -> PersonalizedInsights {
        self.adaptation.insights(&learner_key(Some(learner_id)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        learner_state: Option<&LearnerState>,
        context: &LearningContext,
        profile: &LearnerProfile,
        count: usize,
        learner_id: Option<&str>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QuestionRecommendation>, PipelineError> {
        let state = self.resolve_state(learner_state, learner_id).await;

        let analysis = track_stage!(StageId::SkillStateReader, self.reader.read(&state, context));
        let zone = track_stage!(
            StageId::ZpdCalculator,
            self.zpd.calculate_optimal_zone(&analysis, profile)
        );
        let areas = track_stage!(StageId::PriorityIdentifier, self.priorities.identify(&analysis));
        let strategy = track_stage!(
            StageId::StrategySelector,
            self.selector.select(&analysis, &zone, &areas, context)
        );

        let candidates = track_stage!(
            StageId::CandidateGenerator,
            self.generator
                .generate(&areas, &zone, &strategy, &analysis, context)
                .await
        );
        let candidates = candidates.map_err(|error| {
            registry().mark(StageId::CandidateGenerator, StageOutcome::Degraded);
            PipelineError::DependencyFailure {
                dependency: "question_store",
                error,
            }
        })?;

        if candidates.is_empty() {
            tracing::info!(learner_id = %key, "no candidates in catalog, serving fallback set");
            return Ok(self.fallback(context, profile, count, learner_id, key, now).await);
        }
        self.remember_pool(&candidates);

        let analytics = self.user_analytics(learner_id, &candidates).await;
        let multipliers = self.adaptation.multipliers(key);

        Ok(self.assemble(
            candidates,
            &strategy,
            Assembly {
                analysis: &analysis,
                zone: &zone,
                areas: &areas,
                context,
                profile,
                analytics: &analytics,
                multipliers,
                count,
                learner_id,
                key,
                now,
            },
        ))
    }

    /// Score, rank, select, explain and register a candidate pool.
    fn assemble(
        &self,
        candidates: Vec<QuestionCandidate>,
        strategy: &RecommendationStrategy,
        input: Assembly<'_>,
    ) -> Vec<QuestionRecommendation> {
        let scoring = ScoringContext {
            analysis: input.analysis,
            zone: input.zone,
            areas: input.areas,
            context: input.context,
            profile: input.profile,
            analytics: input.analytics,
            count: input.count,
            multipliers: input.multipliers,
            now: input.now,
        };
        let ranked = track_stage!(StageId::Scorer, {
            let scored = self.scorer.score(candidates, strategy, &scoring);
            self.scorer.rank(scored)
        });

        let selected = track_stage!(
            StageId::DiversityOptimizer,
            self.diversity.select(&ranked, input.count)
        );
        let mut recommendations: Vec<QuestionRecommendation> = self
            .diversity
            .optimize(&ranked, input.count, strategy, input.now);

        track_stage!(
            StageId::ReasoningEnricher,
            self.enricher.enrich(
                &mut recommendations,
                &EnrichmentInput {
                    ranked: &ranked,
                    selected: &selected,
                    areas: input.areas,
                    context: input.context,
                    count: input.count,
                },
            )
        );

        let millis = input.now.timestamp_millis();
        for rec in &mut recommendations {
            rec.learner_id = input.learner_id.map(str::to_string);
            let seed = format!("{}:{}:{}:{}", input.key, rec.question_id, millis, rec.rank);
            rec.recommendation_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string();
        }

        self.adaptation.register_issued(
            input.key,
            &recommendations,
            &input.analysis.masteries,
            input.now,
        );
        recommendations
    }

    async fn resolve_state(
        &self,
        learner_state: Option<&LearnerState>,
        learner_id: Option<&str>,
    ) -> LearnerState {
        let mut state = learner_state.cloned().unwrap_or_default();
        let (Some(repository), Some(user_id)) = (&self.mastery, learner_id) else {
            return state;
        };

        let timeout = Duration::from_millis(self.config.timeouts.store_timeout_ms);
        let fetched = match tokio::time::timeout(timeout, repository.fetch_skill_mastery(user_id)).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout(self.config.timeouts.store_timeout_ms)),
        };

        match fetched {
            Ok(masteries) => {
                for (skill, mastery) in masteries {
                    state.skill_masteries.entry(skill).or_insert(mastery);
                }
            }
            Err(error) => {
                tracing::warn!(
                    learner_id = user_id,
                    dependency = "mastery_store",
                    error = %error,
                    "mastery fetch failed, using caller state"
                );
            }
        }
        state
    }

    async fn user_analytics(
        &self,
        learner_id: Option<&str>,
        candidates: &[QuestionCandidate],
    ) -> HashMap<String, UserQuestionAnalytics> {
        let Some(user_id) = learner_id else {
            return HashMap::new();
        };
        let ids: Vec<String> = candidates.iter().map(|c| c.question_id.clone()).collect();
        let timeout = Duration::from_millis(self.config.timeouts.store_timeout_ms);

        match tokio::time::timeout(
            timeout,
            self.questions.fetch_user_question_analytics(user_id, &ids),
        )
        .await
        {
            Ok(Ok(analytics)) => analytics,
            Ok(Err(error)) => {
                tracing::warn!(learner_id = user_id, error = %error, "question analytics unavailable");
                HashMap::new()
            }
            Err(_) => {
                tracing::warn!(learner_id = user_id, "question analytics timed out");
                HashMap::new()
            }
        }
    }

    fn remember_pool(&self, candidates: &[QuestionCandidate]) {
        let mut cache = self.fallback_cache.write();
        cache.clear();
        cache.extend(
            candidates
                .iter()
                .take(self.config.candidates.fallback_cache_size)
                .cloned(),
        );
    }

    /// Last cached pool, else the configured fallback questions, ranked with the balanced strategy.
    async fn fallback(
        &self,
        context: &LearningContext,
        profile: &LearnerProfile,
        count: usize,
        learner_id: Option<&str>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Vec<QuestionRecommendation> {
        let analysis = LearningAnalysis {
            stress_level: context.stress_level.clamp(0.0, 1.0),
            ..LearningAnalysis::default()
        };

        let mut pool: Vec<QuestionCandidate> = self
            .fallback_cache
            .read()
            .iter()
            .filter(|c| !context.exclude_question_ids.contains(&c.question_id))
            .cloned()
            .map(|mut c| {
                c.source = CandidateSource::Cached;
                c
            })
            .collect();

        if pool.is_empty() && !self.config.candidates.fallback_question_ids.is_empty() {
            pool = self.configured_fallback(context, &analysis, now).await;
        }
        if pool.is_empty() {
            registry().mark(StageId::Fallback, StageOutcome::Degraded);
            tracing::warn!(learner_id = %key, "fallback set is empty");
            return Vec::new();
        }

        let zone: ZpdZone = self.zpd.calculate_optimal_zone(&analysis, profile);
        let strategy = self.strategies.get(StrategyKind::Balanced);
        let analytics = HashMap::new();
        let areas: Vec<PriorityArea> = Vec::new();

        let mut recommendations = track_stage!(
            StageId::Fallback,
            self.assemble(
                pool,
                &strategy,
                Assembly {
                    analysis: &analysis,
                    zone: &zone,
                    areas: &areas,
                    context,
                    profile,
                    analytics: &analytics,
                    multipliers: StrategyWeights::default(),
                    count,
                    learner_id,
                    key,
                    now,
                },
            )
        );
        registry().mark(StageId::Fallback, StageOutcome::Fallback);
        for rec in &mut recommendations {
            rec.is_fallback = true;
        }
        recommendations
    }

    async fn configured_fallback(
        &self,
        context: &LearningContext,
        analysis: &LearningAnalysis,
        now: DateTime<Utc>,
    ) -> Vec<QuestionCandidate> {
        let ids = &self.config.candidates.fallback_question_ids;
        let timeout = Duration::from_millis(self.config.timeouts.store_timeout_ms);
        let questions = match tokio::time::timeout(timeout, self.questions.fetch_questions_by_ids(ids)).await {
            Ok(Ok(questions)) => questions,
            Ok(Err(error)) => {
                tracing::warn!(dependency = "question_store", error = %error, "fallback questions unavailable");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(dependency = "question_store", "fallback question fetch timed out");
                return Vec::new();
            }
        };

        questions
            .into_iter()
            .filter(|q| !context.exclude_question_ids.contains(&q.id))
            .filter_map(|q| {
                let target = q.primary_skill()?.to_string();
                Some(
                    self.generator
                        .to_candidate(q, &target, analysis, now, CandidateSource::Cached),
                )
            })
            .collect()
    }
}

struct Assembly<'a> {
    analysis: &'a LearningAnalysis,
    zone: &'a ZpdZone,
    areas: &'a [PriorityArea],
    context: &'a LearningContext,
    profile: &'a LearnerProfile,
    analytics: &'a HashMap<String, UserQuestionAnalytics>,
    multipliers: StrategyWeights,
    count: usize,
    learner_id: Option<&'a str>,
    key: &'a str,
    now: DateTime<Utc>,
}
