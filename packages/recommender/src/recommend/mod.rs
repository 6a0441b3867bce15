pub mod adaptation;
pub mod analysis;
pub mod candidates;
pub mod config;
pub mod diversity;
pub mod engine;
pub mod metrics;
pub mod priority;
pub mod reasoning;
pub mod scoring;
pub mod skill_graph;
pub mod strategy;
pub mod types;
pub mod zpd;

pub use config::EngineConfig;
pub use engine::{RecommendError, RecommendationEngine};
pub use skill_graph::SkillGraph;
pub use strategy::{RecommendationStrategy, StrategyKind, StrategyRegistry, StrategyWeights};
#[allow(unused_imports)]
pub use types::*;
