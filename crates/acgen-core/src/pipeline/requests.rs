//! Request and response bodies for the pipeline operations.
//!
//! Optional knobs fall back to the `pipeline` section of the config.

use crate::types::{AcceptanceCriteria, PublishMode, TestSuite};
use serde::{Deserialize, Serialize};

/// Criteria for a Jira issue or for a free-text story.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CriteriaRequest {
    #[serde(default)]
    pub issue_id: Option<String>,
    #[serde(default)]
    pub story_text: Option<String>,
    #[serde(default)]
    pub story_title: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub max_scenarios: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaResponse {
    pub success: bool,
    pub story_key: String,
    pub acceptance_criteria: AcceptanceCriteria,
    pub gherkin_text: String,
    pub processing_time_seconds: f64,
}

/// Tests from supplied criteria, or from an issue whose criteria are
/// generated first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestsRequest {
    #[serde(default)]
    pub issue_id: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Option<AcceptanceCriteria>,
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub include_negative: Option<bool>,
    #[serde(default)]
    pub include_edge_cases: Option<bool>,
    #[serde(default)]
    pub max_scenarios_per_criteria: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestsResponse {
    pub success: bool,
    pub story_key: String,
    pub test_suite: TestSuite,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FullPipelineRequest {
    pub issue_id: String,
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub auto_publish: Option<bool>,
    #[serde(default)]
    pub publish_mode: Option<PublishMode>,
    #[serde(default)]
    pub ac_publish_mode: Option<PublishMode>,
    #[serde(default)]
    pub generate_tests: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishRequest {
    pub issue_id: String,
    #[serde(default)]
    pub acceptance_criteria: Option<AcceptanceCriteria>,
    #[serde(default)]
    pub test_suite: Option<TestSuite>,
    #[serde(default)]
    pub publish_mode: Option<PublishMode>,
    #[serde(default)]
    pub ac_publish_mode: Option<PublishMode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<FullPipelineRequest>(
            r#"{"issue_id": "PROJ-1", "publish_mdoe": "comment"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("publish_mdoe"));
    }

    #[test]
    fn optional_fields_default_to_none() {
        let req: FullPipelineRequest =
            serde_json::from_str(r#"{"issue_id": "PROJ-1", "publish_mode": "custom_field"}"#)
                .unwrap();
        assert_eq!(req.publish_mode, Some(PublishMode::CustomField));
        assert!(req.auto_publish.is_none());
        assert!(req.llm_provider.is_none());
    }
}
