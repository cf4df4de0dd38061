use crate::error::{AcgenError, Result};
use crate::parse::{generate_parsed, parse_criteria};
use crate::prompts;
use crate::provider::ProviderAdapter;
use crate::types::{criteria_id, AcceptanceCriteria, Story};
use chrono::Utc;

pub const MAX_SCENARIOS_LIMIT: usize = 20;

/// Turns a story into Gherkin acceptance criteria.
#[derive(Debug, Clone)]
pub struct CriteriaGenerator {
    provider: ProviderAdapter,
}

impl CriteriaGenerator {
    pub fn new(provider: ProviderAdapter) -> Self {
        Self { provider }
    }

    /// At most `max_scenarios` scenarios come back, in the order the model
    /// returned them, with ids reassigned `AC-001`, `AC-002`, ...
    pub async fn generate(
        &self,
        story: &Story,
        context: Option<&str>,
        max_scenarios: usize,
    ) -> Result<AcceptanceCriteria> {
        if !(1..=MAX_SCENARIOS_LIMIT).contains(&max_scenarios) {
            return Err(AcgenError::InvalidRequest(format!(
                "max_scenarios must be between 1 and {MAX_SCENARIOS_LIMIT}, got {max_scenarios}"
            )));
        }

        tracing::info!(
            issue = %story.key,
            provider = %self.provider.kind(),
            max_scenarios,
            "generating acceptance criteria"
        );

        let prompt = prompts::criteria_prompt(story, context, max_scenarios);
        let raw = generate_parsed(
            self.provider.clone(),
            prompts::CRITERIA_SYSTEM,
            prompt,
            "acceptance criteria",
            parse_criteria,
        )
        .await?;

        let returned = raw.scenarios.len();
        if returned > max_scenarios {
            tracing::info!(
                issue = %story.key,
                returned,
                kept = max_scenarios,
                "truncating surplus scenarios"
            );
        }

        let scenarios = raw
            .scenarios
            .into_iter()
            .take(max_scenarios)
            .enumerate()
            .map(|(i, s)| s.into_scenario(criteria_id(i)))
            .collect();

        let feature_name = match raw.feature_name.trim() {
            "" => story.summary.clone(),
            name => name.to_string(),
        };

        Ok(AcceptanceCriteria {
            story_key: story.key.clone(),
            feature_name,
            background: raw.background.and_then(|b| b.into_background()),
            scenarios,
            provider: self.provider.name().to_string(),
            generated_at: Utc::now(),
        })
    }
}
