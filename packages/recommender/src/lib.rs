pub mod config;
pub mod logging;
pub mod recommend;
pub mod seed;
pub mod store;

pub use recommend::{EngineConfig, RecommendError, RecommendationEngine};
