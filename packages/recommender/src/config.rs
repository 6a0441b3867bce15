/// Process-level settings for the demo binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub demo_learner_id: String,
    pub demo_count: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let demo_learner_id = std::env::var("DEMO_LEARNER_ID")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "demo-learner".to_string());

        let demo_count = std::env::var("DEMO_COUNT")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|count| *count > 0)
            .unwrap_or(3);

        Self {
            log_level,
            demo_learner_id,
            demo_count,
        }
    }
}
