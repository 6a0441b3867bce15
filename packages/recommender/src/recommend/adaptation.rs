use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};

use crate::recommend::config::AdaptationParams;
use crate::recommend::strategy::{StrategyKind, StrategyWeights};
use crate::recommend::types::{
    ActualOutcome, LearnerState, PersonalizedInsights, QuestionRecommendation,
    RecommendationRecord, StrategyPerformance,
};

pub const ANONYMOUS_LEARNER: &str = "anonymous";

const RECENT_OUTCOMES: usize = 10;
const MIN_SAMPLES_FOR_PREFERENCE: u64 = 3;

pub fn learner_key(learner_id: Option<&str>) -> String {
    learner_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(ANONYMOUS_LEARNER)
        .to_string()
}

#[derive(Debug, Clone)]
pub struct IssuedRecommendation {
    pub recommendation: QuestionRecommendation,
    pub mastery_snapshot: BTreeMap<String, f64>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct LearnerAdaptation {
    pub history: VecDeque<RecommendationRecord>,
    pub issued: VecDeque<IssuedRecommendation>,
    pub multipliers: StrategyWeights,
    pub strategy_stats: BTreeMap<StrategyKind, StrategyPerformance>,
    pub adaptations: u64,
    pub last_seen: Option<DateTime<Utc>>,
}

impl LearnerAdaptation {
    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_seen = Some(self.last_seen.map_or(at, |seen| seen.max(at)));
    }
}

/// Per-learner feedback state plus global strategy aggregates.
pub struct AdaptationStore {
    params: AdaptationParams,
    learners: RwLock<HashMap<String, LearnerAdaptation>>,
    strategy_stats: Mutex<BTreeMap<StrategyKind, StrategyPerformance>>,
}

impl AdaptationStore {
    pub fn new(params: AdaptationParams) -> Self {
        Self {
            params,
            learners: RwLock::new(HashMap::new()),
            strategy_stats: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn params(&self) -> &AdaptationParams {
        &self.params
    }

    pub fn multipliers(&self, learner_id: &str) -> StrategyWeights {
        self.learners
            .read()
            .get(learner_id)
            .map(|l| l.multipliers)
            .unwrap_or_default()
    }

    pub fn register_issued(
        &self,
        learner_id: &str,
        recommendations: &[QuestionRecommendation],
        mastery_snapshot: &BTreeMap<String, f64>,
        issued_at: DateTime<Utc>,
    ) {
        let mut learners = self.learners.write();
        self.evict_stale(&mut learners, learner_id, issued_at);
        let learner = learners.entry(learner_id.to_string()).or_default();
        learner.touch(issued_at);
        for recommendation in recommendations {
            learner
                .issued
                .retain(|i| i.recommendation.recommendation_id != recommendation.recommendation_id);
            let snapshot = recommendation
                .skills
                .iter()
                .filter_map(|s| mastery_snapshot.get(s).map(|m| (s.clone(), *m)))
                .collect();
            learner.issued.push_back(IssuedRecommendation {
                recommendation: recommendation.clone(),
                mastery_snapshot: snapshot,
                issued_at,
            });
        }
        while learner.issued.len() > self.params.issued_retention {
            learner.issued.pop_front();
        }
    }

    /// Removes and returns an issued recommendation; each one can be evaluated once.
    pub fn take_issued(&self, learner_id: &str, recommendation_id: &str) -> Option<IssuedRecommendation> {
        let mut learners = self.learners.write();
        let learner = learners.get_mut(learner_id)?;
        let position = learner
            .issued
            .iter()
            .position(|i| i.recommendation.recommendation_id == recommendation_id)?;
        learner.issued.remove(position)
    }

    pub fn issued_count(&self, learner_id: &str) -> usize {
        self.learners
            .read()
            .get(learner_id)
            .map(|l| l.issued.len())
            .unwrap_or(0)
    }

    /// Appends the record, updates per-learner aggregates and multipliers, then the global mean.
    pub fn record_outcome(
        &self,
        record: RecommendationRecord,
        factor_scores: [f64; 6],
        success_error: f64,
    ) {
        let strategy = record.recommendation.strategy;
        let accuracy = record.accuracy;

        {
            let mut learners = self.learners.write();
            self.evict_stale(&mut learners, &record.learner_id, record.timestamp);
            let learner = learners.entry(record.learner_id.clone()).or_default();
            learner.touch(record.timestamp);

            let n = learner.adaptations as f64;
            let step = self.params.adaptation_rate / (1.0 + n).sqrt() * success_error;
            let mean = factor_scores.iter().sum::<f64>() / factor_scores.len() as f64;
            let mut multipliers = learner.multipliers.as_array();
            for (multiplier, score) in multipliers.iter_mut().zip(factor_scores) {
                *multiplier = (*multiplier + step * (score - mean))
                    .clamp(self.params.min_multiplier, self.params.max_multiplier);
            }
            learner.multipliers = StrategyWeights::from_array(multipliers);
            learner.adaptations += 1;

            learner
                .strategy_stats
                .entry(strategy)
                .or_insert_with(|| StrategyPerformance::new(strategy))
                .record(accuracy);

            let cutoff = record.timestamp - Duration::days(self.params.history_max_age_days);
            learner.history.push_back(record);
            learner.history.retain(|r| r.timestamp >= cutoff);
            while learner.history.len() > self.params.history_retention {
                learner.history.pop_front();
            }
        }

        self.strategy_stats
            .lock()
            .entry(strategy)
            .or_insert_with(|| StrategyPerformance::new(strategy))
            .record(accuracy);
    }

    pub fn learner_count(&self) -> usize {
        self.learners.read().len()
    }

    /// Drops learners idle past `learner_idle_days`, then the least recently seen
    /// ones until a slot is free under `max_learners`. `current` is never dropped.
    fn evict_stale(
        &self,
        learners: &mut HashMap<String, LearnerAdaptation>,
        current: &str,
        now: DateTime<Utc>,
    ) {
        let cutoff = now - Duration::days(self.params.learner_idle_days);
        learners.retain(|id, l| id == current || l.last_seen.map_or(true, |seen| seen >= cutoff));

        let limit = self.params.max_learners.max(1);
        let incoming = usize::from(!learners.contains_key(current));
        let excess = (learners.len() + incoming).saturating_sub(limit);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(Option<DateTime<Utc>>, String)> = learners
            .iter()
            .filter(|(id, _)| id.as_str() != current)
            .map(|(id, l)| (l.last_seen, id.clone()))
            .collect();
        by_age.sort();
        for (_, id) in by_age.into_iter().take(excess) {
            learners.remove(&id);
        }
        tracing::debug!(evicted = excess, remaining = learners.len(), "learner adaptation state evicted");
    }

    pub fn strategy_performance(&self) -> Vec<StrategyPerformance> {
        self.strategy_stats.lock().values().cloned().collect()
    }

    pub fn history(&self, learner_id: &str) -> Vec<RecommendationRecord> {
        self.learners
            .read()
            .get(learner_id)
            .map(|l| l.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn insights(&self, learner_id: &str) -> PersonalizedInsights {
        let learner = self.learners.read().get(learner_id).cloned().unwrap_or_default();

        let average_accuracy = if learner.history.is_empty() {
            None
        } else {
            Some(learner.history.iter().map(|r| r.accuracy).sum::<f64>() / learner.history.len() as f64)
        };

        let recent: Vec<&RecommendationRecord> =
            learner.history.iter().rev().take(RECENT_OUTCOMES).collect();
        let recent_success_rate = if recent.is_empty() {
            None
        } else {
            let correct = recent.iter().filter(|r| r.actual_outcome.correct).count();
            Some(correct as f64 / recent.len() as f64)
        };

        let preferred_strategy = learner
            .strategy_stats
            .values()
            .filter(|s| s.sample_count >= MIN_SAMPLES_FOR_PREFERENCE)
            .fold(None::<&StrategyPerformance>, |best, s| match best {
                Some(b) if b.average_accuracy >= s.average_accuracy => Some(b),
                _ => Some(s),
            })
            .map(|s| s.strategy);

        let suggestions = suggestions(
            learner.adaptations,
            average_accuracy,
            recent_success_rate,
            &learner.multipliers,
        );

        PersonalizedInsights {
            learner_id: learner_id.to_string(),
            evaluated_recommendations: learner.adaptations as usize,
            average_accuracy,
            recent_success_rate,
            preferred_strategy,
            strategy_breakdown: learner.strategy_stats.values().cloned().collect(),
            weight_multipliers: learner.multipliers,
            suggestions,
        }
    }
}

fn suggestions(
    evaluated: u64,
    average_accuracy: Option<f64>,
    recent_success_rate: Option<f64>,
    multipliers: &StrategyWeights,
) -> Vec<String> {
    let mut out = Vec::new();
    if evaluated == 0 {
        out.push("Answer a few recommended questions to unlock personalised insights".to_string());
        return out;
    }

    if let Some(accuracy) = average_accuracy {
        if accuracy < 0.5 {
            out.push("Predictions are drifting from results; weights are still adapting".to_string());
        }
    }
    match recent_success_rate {
        Some(rate) if rate < 0.5 => {
            out.push("Recent answers are mostly incorrect; easier practice is advised".to_string())
        }
        Some(rate) if rate > 0.85 => {
            out.push("Consistently correct lately; ready for harder questions".to_string())
        }
        _ => {}
    }

    let labels = [
        "mastery gaps",
        "difficulty fit",
        "time fit",
        "engagement",
        "stress",
        "prerequisites",
    ];
    let values = multipliers.as_array();
    if let Some((index, value)) = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        if *value > 1.1 {
            out.push(format!("Recommendations now lean more on {}", labels[index]));
        }
    }
    out
}

/// Compares predicted and actual outcomes and feeds the difference back into the store.
pub struct OutcomeAdapter {
    store: Arc<AdaptationStore>,
}

impl OutcomeAdapter {
    pub fn new(store: Arc<AdaptationStore>) -> Self {
        Self { store }
    }

    /// Returns the accuracy recorded, or `None` when the recommendation was not issued here.
    pub fn adapt(
        &self,
        recommendation: &QuestionRecommendation,
        actual: &ActualOutcome,
        learner_state: Option<&LearnerState>,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let learner_id = learner_key(recommendation.learner_id.as_deref());
        let Some(issued) = self
            .store
            .take_issued(&learner_id, &recommendation.recommendation_id)
        else {
            tracing::warn!(
                learner_id = %learner_id,
                recommendation_id = %recommendation.recommendation_id,
                "outcome for unknown recommendation dropped"
            );
            return None;
        };

        let predicted = &issued.recommendation;
        let accuracy = self.accuracy(&issued, actual, learner_state);
        let success = if actual.correct { 1.0 } else { 0.0 };
        let success_error = success - predicted.expected_outcome.success_probability;

        let metrics = &predicted.adaptive_metrics;
        let factor_scores = [
            metrics.mastery_score,
            metrics.difficulty_score,
            metrics.time_score,
            metrics.engagement_score,
            metrics.zpd_alignment,
            metrics.prerequisite_score,
        ];

        let record = RecommendationRecord {
            recommendation: predicted.clone(),
            actual_outcome: actual.clone(),
            timestamp: actual.completed_at.unwrap_or(now),
            learner_id: learner_id.clone(),
            accuracy,
        };
        self.store.record_outcome(record, factor_scores, success_error);

        tracing::info!(
            learner_id = %learner_id,
            strategy = predicted.strategy.as_str(),
            accuracy,
            "recommendation outcome recorded"
        );
        Some(accuracy)
    }

    fn accuracy(
        &self,
        issued: &IssuedRecommendation,
        actual: &ActualOutcome,
        learner_state: Option<&LearnerState>,
    ) -> f64 {
        let expected = &issued.recommendation.expected_outcome;
        let mut deviations = Vec::with_capacity(3);

        let success = if actual.correct { 1.0 } else { 0.0 };
        deviations.push((expected.success_probability - success).abs());

        if let Some(state) = learner_state {
            let gains: Vec<(f64, f64)> = issued
                .mastery_snapshot
                .iter()
                .filter_map(|(skill, before)| {
                    let now = state.mastery_of(skill).filter(|m| m.is_finite())?;
                    let predicted = expected.mastery_improvement.get(skill).copied().unwrap_or(0.0);
                    Some((now.clamp(0.0, 1.0) - before, predicted))
                })
                .collect();
            if !gains.is_empty() {
                let n = gains.len() as f64;
                let actual_gain = gains.iter().map(|(a, _)| a).sum::<f64>() / n;
                let predicted_gain = gains.iter().map(|(_, p)| p).sum::<f64>() / n;
                let scale = self.store.params().mastery_deviation_scale.max(1e-6);
                deviations.push(((actual_gain - predicted_gain).abs() / scale).min(1.0));
            }
        }

        if let Some(change) = actual.engagement_change.filter(|c| c.is_finite()) {
            deviations.push((expected.engagement_change - change).abs().min(1.0));
        }

        let mean = deviations.iter().sum::<f64>() / deviations.len() as f64;
        (1.0 - mean).clamp(0.0, 1.0)
    }
}
