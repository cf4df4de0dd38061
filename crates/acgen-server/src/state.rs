use acgen_core::config::Config;
use acgen_core::Pipeline;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    /// Secrets already redacted.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: &Config) -> Self {
        Self {
            pipeline,
            config: Arc::new(config.redacted()),
        }
    }

    /// Wire the real Jira and provider clients from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pipeline = Pipeline::from_config(config)?;
        Ok(Self::new(pipeline, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_keeps_only_redacted_config() {
        let mut config = Config::default();
        config.jira.api_token = "secret-token".into();
        config.history.enabled = false;
        let state = AppState::from_config(&config).unwrap();
        assert_ne!(state.config.jira.api_token, "secret-token");
    }
}
