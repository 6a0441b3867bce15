//! Per-stage pipeline counters shared by every engine in the process.
//!
//! Each stage keeps call/latency totals plus how often it ran degraded (a
//! dependency failed and the stage recovered) and how often the engine had to
//! serve the fallback set from it. `StageStatus` also carries the most recent outcome.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

static REGISTRY: OnceLock<Arc<StageRegistry>> = OnceLock::new();

pub fn registry() -> &'static Arc<StageRegistry> {
    REGISTRY.get_or_init(|| Arc::new(StageRegistry::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    SkillStateReader,
    ZpdCalculator,
    PriorityIdentifier,
    CandidateGenerator,
    StrategySelector,
    Scorer,
    DiversityOptimizer,
    ReasoningEnricher,
    OutcomeAdapter,
    Fallback,
}

const STAGE_COUNT: usize = 10;

impl StageId {
    pub fn all() -> &'static [StageId; STAGE_COUNT] {
        &[
            StageId::SkillStateReader,
            StageId::ZpdCalculator,
            StageId::PriorityIdentifier,
            StageId::CandidateGenerator,
            StageId::StrategySelector,
            StageId::Scorer,
            StageId::DiversityOptimizer,
            StageId::ReasoningEnricher,
            StageId::OutcomeAdapter,
            StageId::Fallback,
        ]
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn key(&self) -> &'static str {
        match self {
            StageId::SkillStateReader => "skill_state_reader",
            StageId::ZpdCalculator => "zpd_calculator",
            StageId::PriorityIdentifier => "priority_identifier",
            StageId::CandidateGenerator => "candidate_generator",
            StageId::StrategySelector => "strategy_selector",
            StageId::Scorer => "scorer",
            StageId::DiversityOptimizer => "diversity_optimizer",
            StageId::ReasoningEnricher => "reasoning_enricher",
            StageId::OutcomeAdapter => "outcome_adapter",
            StageId::Fallback => "fallback",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageId::SkillStateReader => "Skill State Reader",
            StageId::ZpdCalculator => "ZPD Calculator",
            StageId::PriorityIdentifier => "Priority-Area Identifier",
            StageId::CandidateGenerator => "Candidate Generator",
            StageId::StrategySelector => "Strategy Selector",
            StageId::Scorer => "Scorer/Ranker",
            StageId::DiversityOptimizer => "Diversity Optimizer",
            StageId::ReasoningEnricher => "Reasoning Enricher",
            StageId::OutcomeAdapter => "Outcome Adapter",
            StageId::Fallback => "Fallback Set",
        }
    }
}

/// How the last run of a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    #[default]
    Idle,
    Ok,
    Degraded,
    Fallback,
}

impl StageOutcome {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Ok,
            2 => Self::Degraded,
            3 => Self::Fallback,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Ok => 1,
            Self::Degraded => 2,
            Self::Fallback => 3,
        }
    }
}

#[derive(Debug, Default)]
struct StageCounters {
    calls: AtomicU64,
    latency_us: AtomicU64,
    degraded: AtomicU64,
    fallbacks: AtomicU64,
    last_outcome: AtomicU8,
}

pub struct StageRegistry {
    stages: [StageCounters; STAGE_COUNT],
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            stages: std::array::from_fn(|_| StageCounters::default()),
        }
    }

    /// Counts a completed run and marks it `Ok`; call `mark` afterwards to downgrade it.
    pub fn record(&self, stage: StageId, latency_us: u64) {
        let counters = &self.stages[stage.index()];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters.latency_us.fetch_add(latency_us, Ordering::Relaxed);
        counters
            .last_outcome
            .store(StageOutcome::Ok.as_u8(), Ordering::Relaxed);
    }

    pub fn mark(&self, stage: StageId, outcome: StageOutcome) {
        let counters = &self.stages[stage.index()];
        match outcome {
            StageOutcome::Degraded => {
                counters.degraded.fetch_add(1, Ordering::Relaxed);
            }
            StageOutcome::Fallback => {
                counters.fallbacks.fetch_add(1, Ordering::Relaxed);
            }
            StageOutcome::Ok | StageOutcome::Idle => {}
        }
        counters.last_outcome.store(outcome.as_u8(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Vec<StageStatus> {
        StageId::all()
            .iter()
            .map(|stage| {
                let counters = &self.stages[stage.index()];
                let calls = counters.calls.load(Ordering::Relaxed);
                let latency_us = counters.latency_us.load(Ordering::Relaxed);
                StageStatus {
                    stage: stage.key(),
                    label: stage.label(),
                    calls,
                    avg_latency_ms: if calls == 0 {
                        0.0
                    } else {
                        latency_us as f64 / calls as f64 / 1000.0
                    },
                    degraded: counters.degraded.load(Ordering::Relaxed),
                    fallbacks: counters.fallbacks.load(Ordering::Relaxed),
                    last_outcome: StageOutcome::from_u8(
                        counters.last_outcome.load(Ordering::Relaxed),
                    ),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStatus {
    pub stage: &'static str,
    pub label: &'static str,
    pub calls: u64,
    pub avg_latency_ms: f64,
    pub degraded: u64,
    pub fallbacks: u64,
    pub last_outcome: StageOutcome,
}

/// Times `$body` and records it against `$stage` in the process registry.
#[macro_export]
macro_rules! track_stage {
    ($stage:expr, $body:expr) => {{
        let started = std::time::Instant::now();
        let value = $body;
        $crate::recommend::metrics::registry()
            .record($stage, started.elapsed().as_micros() as u64);
        value
    }};
}
