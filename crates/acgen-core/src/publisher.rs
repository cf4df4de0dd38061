//! Publishing generated artefacts into Jira.
//!
//! | mode           | criteria                       | test suite                          |
//! |----------------|--------------------------------|-------------------------------------|
//! | `description`  | appended to the description    | appended to the description         |
//! | `comment`      | new comment                    | new comment                         |
//! | `subtask`      | via the criteria mode          | one subtask per test scenario       |
//! | `custom_field` | Gherkin text to criteria field | suite JSON to test field            |
//! | `xray`/`zephyr`| via the criteria mode          | handed to the test management tool  |
//!
//! Criteria and tests publish independently. A failure on one side is
//! recorded in [`PublishResult::failures`] and does not undo the other.

use crate::config::JiraConfig;
use crate::error::{AcgenError, ErrorKind, Result};
use crate::fetcher::validate_issue_id;
use crate::jira::JiraApi;
use crate::render;
use crate::types::{
    AcceptanceCriteria, Artifact, CreatedSubtask, PublishFailure, PublishMode, PublishOutcome,
    PublishResult, TestScenario, TestSuite,
};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// An external test management tool (Xray, Zephyr) that takes a whole suite.
pub trait TestManagement: Send + Sync {
    /// Returns one entry per created test case.
    fn publish_suite<'a>(
        &'a self,
        issue_key: &'a str,
        suite: &'a TestSuite,
    ) -> BoxFuture<'a, Result<Vec<CreatedSubtask>>>;
}

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub jira_url: String,
    pub acceptance_criteria_field: Option<String>,
    pub test_scenarios_field: Option<String>,
    pub subtask_concurrency: usize,
}

impl From<&JiraConfig> for PublisherSettings {
    fn from(cfg: &JiraConfig) -> Self {
        Self {
            jira_url: cfg.url.clone(),
            acceptance_criteria_field: cfg.acceptance_criteria_field.clone(),
            test_scenarios_field: cfg.test_scenarios_field.clone(),
            subtask_concurrency: cfg.subtask_concurrency,
        }
    }
}

impl PublisherSettings {
    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.jira_url.trim_end_matches('/'), key)
    }
}

/// What one side of a publish produced.
#[derive(Default)]
struct SideOutcome {
    published: bool,
    location: Option<String>,
    created: Vec<CreatedSubtask>,
    failure: Option<PublishFailure>,
    summary: Option<String>,
}

impl SideOutcome {
    fn failed(artifact: Artifact, err: &AcgenError) -> Self {
        Self {
            failure: Some(PublishFailure {
                artifact,
                kind: err.kind(),
                message: err.to_string(),
            }),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct Publisher {
    jira: Arc<dyn JiraApi>,
    settings: PublisherSettings,
    xray: Option<Arc<dyn TestManagement>>,
    zephyr: Option<Arc<dyn TestManagement>>,
}

impl Publisher {
    pub fn new(jira: Arc<dyn JiraApi>, settings: PublisherSettings) -> Self {
        Self {
            jira,
            settings,
            xray: None,
            zephyr: None,
        }
    }

    pub fn with_xray(mut self, integration: Arc<dyn TestManagement>) -> Self {
        self.xray = Some(integration);
        self
    }

    pub fn with_zephyr(mut self, integration: Arc<dyn TestManagement>) -> Self {
        self.zephyr = Some(integration);
        self
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// Publish whichever of `criteria` and `suite` are given.
    ///
    /// `criteria_mode` defaults to `mode` when `mode` can carry criteria and
    /// to `description` otherwise. Configuration problems are reported before
    /// any write. Returns [`AcgenError::PublishFailed`] only when nothing at
    /// all reached Jira.
    pub async fn publish(
        &self,
        issue_id: &str,
        criteria: Option<&AcceptanceCriteria>,
        suite: Option<&TestSuite>,
        mode: PublishMode,
        criteria_mode: Option<PublishMode>,
    ) -> Result<PublishResult> {
        let key = validate_issue_id(issue_id)?;
        if criteria.is_none() && suite.is_none() {
            return Err(AcgenError::InvalidRequest(
                "nothing to publish: provide acceptance criteria, a test suite or both".into(),
            ));
        }
        let criteria_mode = criteria_mode.unwrap_or_else(|| mode.default_criteria_mode());
        if !criteria_mode.accepts_criteria() {
            return Err(AcgenError::InvalidPublishMode(format!(
                "{criteria_mode} cannot hold acceptance criteria"
            )));
        }
        self.preflight(criteria.is_some(), suite.is_some(), mode, criteria_mode)?;

        tracing::info!(
            issue = %key,
            %mode,
            %criteria_mode,
            criteria = criteria.is_some(),
            tests = suite.map(|s| s.total_scenarios()).unwrap_or(0),
            "publishing to jira"
        );

        let ac = match criteria {
            Some(c) => self.publish_criteria(&key, c, criteria_mode).await,
            None => SideOutcome::default(),
        };
        let ts = match suite {
            Some(s) => self.publish_suite(&key, s, mode).await,
            None => SideOutcome::default(),
        };

        let failures: Vec<PublishFailure> =
            ac.failure.iter().chain(ts.failure.iter()).cloned().collect();

        if !ac.published && !ts.published {
            let detail: Vec<String> = failures
                .iter()
                .map(|f| format!("{} ({}): {}", f.artifact, f.kind, f.message))
                .collect();
            tracing::error!(issue = %key, failures = failures.len(), "nothing was published");
            return Err(AcgenError::PublishFailed(detail.join("; ")));
        }

        let message = [ac.summary, ts.summary]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("; ");
        let outcome = if failures.is_empty() {
            PublishOutcome::Success
        } else {
            PublishOutcome::PartialSuccess
        };
        tracing::info!(issue = %key, ?outcome, %message, "publish complete");

        Ok(PublishResult {
            jira_link: self.settings.browse_url(&key),
            issue_key: key,
            acceptance_criteria_published: ac.published,
            acceptance_criteria_location: ac.location,
            test_scenarios_published: ts.published,
            created_subtasks: ts.created,
            outcome,
            message,
            failures,
        })
    }

    fn preflight(
        &self,
        has_criteria: bool,
        has_suite: bool,
        mode: PublishMode,
        criteria_mode: PublishMode,
    ) -> Result<()> {
        if has_criteria
            && criteria_mode == PublishMode::CustomField
            && self.settings.acceptance_criteria_field.is_none()
        {
            return Err(AcgenError::CustomFieldNotConfigured(
                "acceptance criteria (jira.acceptance_criteria_field)".into(),
            ));
        }
        if !has_suite {
            return Ok(());
        }
        match mode {
            PublishMode::CustomField if self.settings.test_scenarios_field.is_none() => Err(
                AcgenError::CustomFieldNotConfigured("test scenarios (jira.test_scenarios_field)".into()),
            ),
            PublishMode::Xray if self.xray.is_none() => {
                Err(AcgenError::IntegrationNotConfigured("xray".into()))
            }
            PublishMode::Zephyr if self.zephyr.is_none() => {
                Err(AcgenError::IntegrationNotConfigured("zephyr".into()))
            }
            _ => Ok(()),
        }
    }

    async fn publish_criteria(
        &self,
        key: &str,
        criteria: &AcceptanceCriteria,
        mode: PublishMode,
    ) -> SideOutcome {
        let result = match mode {
            PublishMode::Description => self
                .jira
                .update_description(key, &render::criteria_markup(criteria))
                .await
                .map(|()| "description".to_string()),
            PublishMode::Comment => self
                .jira
                .add_comment(key, &render::criteria_markup(criteria))
                .await
                .map(|id| format!("comment:{id}")),
            PublishMode::CustomField => {
                let field = self.settings.acceptance_criteria_field.as_deref().unwrap_or_default();
                self.jira
                    .update_custom_field(key, field, serde_json::Value::String(criteria.to_gherkin()))
                    .await
                    .map(|()| format!("field:{field}"))
            }
            other => Err(AcgenError::InvalidPublishMode(other.to_string())),
        };
        match result {
            Ok(location) => {
                tracing::info!(issue = key, %location, "acceptance criteria published");
                SideOutcome {
                    published: true,
                    summary: Some(format!(
                        "{} acceptance criteria published to {location}",
                        criteria.scenarios.len()
                    )),
                    location: Some(location),
                    ..SideOutcome::default()
                }
            }
            Err(e) => {
                tracing::warn!(issue = key, error = %e, "acceptance criteria publish failed");
                SideOutcome::failed(Artifact::AcceptanceCriteria, &e)
            }
        }
    }

    async fn publish_suite(&self, key: &str, suite: &TestSuite, mode: PublishMode) -> SideOutcome {
        let whole = |result: Result<()>, target: &str| match result {
            Ok(()) => SideOutcome {
                published: true,
                summary: Some(format!(
                    "{} test scenarios published to {target}",
                    suite.total_scenarios()
                )),
                ..SideOutcome::default()
            },
            Err(e) => {
                tracing::warn!(issue = key, error = %e, "test suite publish failed");
                SideOutcome::failed(Artifact::TestScenarios, &e)
            }
        };

        match mode {
            PublishMode::Description => whole(
                self.jira
                    .update_description(key, &render::test_suite_markup(suite))
                    .await,
                "description",
            ),
            PublishMode::Comment => whole(
                self.jira
                    .add_comment(key, &render::test_suite_markup(suite))
                    .await
                    .map(|_| ()),
                "a comment",
            ),
            PublishMode::CustomField => {
                let field = self.settings.test_scenarios_field.as_deref().unwrap_or_default();
                let written = match serde_json::to_string_pretty(suite) {
                    Ok(json) => {
                        self.jira
                            .update_custom_field(key, field, serde_json::Value::String(json))
                            .await
                    }
                    Err(e) => Err(e.into()),
                };
                whole(written, &format!("field {field}"))
            }
            PublishMode::Subtask => self.create_subtasks(key, suite).await,
            PublishMode::Xray | PublishMode::Zephyr => {
                let integration = if mode == PublishMode::Xray {
                    self.xray.as_ref()
                } else {
                    self.zephyr.as_ref()
                };
                let Some(integration) = integration else {
                    return SideOutcome::failed(
                        Artifact::TestScenarios,
                        &AcgenError::IntegrationNotConfigured(mode.to_string()),
                    );
                };
                match integration.publish_suite(key, suite).await {
                    Ok(created) => SideOutcome {
                        published: true,
                        summary: Some(format!("{} test cases created in {mode}", created.len())),
                        created,
                        ..SideOutcome::default()
                    },
                    Err(e) => {
                        tracing::warn!(issue = key, %mode, error = %e, "test management publish failed");
                        SideOutcome::failed(Artifact::TestScenarios, &e)
                    }
                }
            }
        }
    }

    /// One subtask per scenario with bounded concurrency. Successes are kept
    /// whatever happens to the others.
    async fn create_subtasks(&self, key: &str, suite: &TestSuite) -> SideOutcome {
        let limit = self.settings.subtask_concurrency.max(1);
        let requested = suite.total_scenarios();

        // Each future owns its inputs so the stream stays `Send`.
        let results: Vec<(TestScenario, Result<String>)> = stream::iter(suite.scenarios().to_vec())
            .map(|scenario| {
                let jira = Arc::clone(&self.jira);
                let parent = key.to_string();
                async move {
                    let summary = format!("[TEST] {}", scenario.title);
                    let body = render::test_scenario_markup(&scenario);
                    let result = jira.create_subtask(&parent, &summary, &body).await;
                    (scenario, result)
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut created = Vec::new();
        let mut errors = Vec::new();
        for (scenario, result) in results {
            match result {
                Ok(subtask_key) => {
                    tracing::debug!(issue = key, subtask = %subtask_key, test = %scenario.id, "subtask created");
                    created.push(CreatedSubtask {
                        key: subtask_key,
                        title: scenario.title.clone(),
                        test_id: scenario.id.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!(issue = key, test = %scenario.id, error = %e, "subtask creation failed");
                    errors.push((scenario.id.clone(), e));
                }
            }
        }
        created.sort_by(|a, b| a.test_id.cmp(&b.test_id));
        errors.sort_by(|a, b| a.0.cmp(&b.0));

        let summary = Some(format!("{} of {requested} test subtasks created", created.len()));
        if errors.is_empty() {
            return SideOutcome {
                published: !created.is_empty(),
                created,
                summary,
                ..SideOutcome::default()
            };
        }

        let detail = errors
            .iter()
            .map(|(id, e)| format!("{id}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        if created.is_empty() {
            let (_, first) = &errors[0];
            return SideOutcome {
                failure: Some(PublishFailure {
                    artifact: Artifact::TestScenarios,
                    kind: first.kind(),
                    message: format!("no subtasks created: {detail}"),
                }),
                ..SideOutcome::default()
            };
        }

        let partial = AcgenError::PartialPublishFailure(format!(
            "{} of {requested} subtasks failed: {detail}",
            errors.len()
        ));
        SideOutcome {
            published: true,
            created,
            summary,
            failure: Some(PublishFailure {
                artifact: Artifact::TestScenarios,
                kind: ErrorKind::PartialPublishFailure,
                message: partial.to_string(),
            }),
            ..SideOutcome::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_criteria, sample_suite, FakeJira, FakeTestManagement, JiraWrite};

    fn settings() -> PublisherSettings {
        PublisherSettings {
            jira_url: "https://acme.atlassian.net".into(),
            acceptance_criteria_field: None,
            test_scenarios_field: None,
            subtask_concurrency: 3,
        }
    }

    fn publisher(jira: Arc<FakeJira>, settings: PublisherSettings) -> Publisher {
        Publisher::new(jira, settings)
    }

    #[tokio::test]
    async fn description_mode_appends_both_artifacts() {
        let jira = Arc::new(FakeJira::new().with_story(crate::testing::story("PROJ-1", "Login")));
        let criteria = sample_criteria("PROJ-1", 2);
        let suite = sample_suite("PROJ-1", 2);
        let result = publisher(jira.clone(), settings())
            .publish("PROJ-1", Some(&criteria), Some(&suite), PublishMode::Description, None)
            .await
            .unwrap();

        assert!(result.acceptance_criteria_published);
        assert_eq!(result.acceptance_criteria_location.as_deref(), Some("description"));
        assert!(result.test_scenarios_published);
        assert_eq!(result.outcome, PublishOutcome::Success);
        assert_eq!(result.jira_link, "https://acme.atlassian.net/browse/PROJ-1");

        let description = jira.description("PROJ-1");
        assert!(description.starts_with("Story description"));
        assert!(description.contains("h2. Acceptance Criteria (Generated)"));
        assert!(description.contains("h2. Test Scenarios for PROJ-1"));
    }

    #[tokio::test]
    async fn comment_mode_is_not_deduplicated() {
        let jira = Arc::new(FakeJira::new());
        let criteria = sample_criteria("PROJ-1", 1);
        let p = publisher(jira.clone(), settings());
        let first = p
            .publish("PROJ-1", Some(&criteria), None, PublishMode::Comment, None)
            .await
            .unwrap();
        let second = p
            .publish("PROJ-1", Some(&criteria), None, PublishMode::Comment, None)
            .await
            .unwrap();
        assert_eq!(jira.comments("PROJ-1").len(), 2);
        assert_ne!(first.acceptance_criteria_location, second.acceptance_criteria_location);
        assert!(first
            .acceptance_criteria_location
            .unwrap()
            .starts_with("comment:"));
    }

    #[tokio::test]
    async fn custom_field_is_last_write_wins() {
        let jira = Arc::new(FakeJira::new());
        let mut s = settings();
        s.acceptance_criteria_field = Some("customfield_10050".into());
        let p = publisher(jira.clone(), s);

        let mut criteria = sample_criteria("PROJ-1", 1);
        p.publish("PROJ-1", Some(&criteria), None, PublishMode::CustomField, None)
            .await
            .unwrap();
        criteria.feature_name = "Second version".into();
        let result = p
            .publish("PROJ-1", Some(&criteria), None, PublishMode::CustomField, None)
            .await
            .unwrap();

        assert_eq!(result.acceptance_criteria_location.as_deref(), Some("field:customfield_10050"));
        let value = jira.field("PROJ-1", "customfield_10050").unwrap();
        assert!(value.as_str().unwrap().starts_with("Feature: Second version"));
    }

    #[tokio::test]
    async fn missing_custom_field_fails_before_any_write() {
        let jira = Arc::new(FakeJira::new());
        let mut s = settings();
        s.acceptance_criteria_field = Some("customfield_1".into());
        let criteria = sample_criteria("PROJ-1", 1);
        let suite = sample_suite("PROJ-1", 1);
        let err = publisher(jira.clone(), s)
            .publish("PROJ-1", Some(&criteria), Some(&suite), PublishMode::CustomField, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CustomFieldNotConfigured);
        assert!(jira.writes().is_empty());
    }

    #[tokio::test]
    async fn subtask_partial_failure_keeps_successes() {
        let jira = Arc::new(FakeJira::new().reject_subtask_containing("scenario 3"));
        let suite = sample_suite("PROJ-123", 5);
        let result = publisher(jira.clone(), settings())
            .publish("PROJ-123", None, Some(&suite), PublishMode::Subtask, None)
            .await
            .unwrap();

        assert_eq!(result.created_subtasks.len(), 4);
        assert!(result.test_scenarios_published);
        assert_eq!(result.outcome, PublishOutcome::PartialSuccess);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].kind, ErrorKind::PartialPublishFailure);
        assert!(result.failures[0].message.contains("TS-003"));
        assert!(result
            .created_subtasks
            .iter()
            .all(|c| c.title != "scenario 3"));
        let summaries: Vec<String> = jira
            .writes()
            .into_iter()
            .filter_map(|w| match w {
                JiraWrite::Subtask { summary, .. } => Some(summary),
                _ => None,
            })
            .collect();
        assert_eq!(summaries.len(), 4);
        assert!(summaries.iter().all(|s| s.starts_with("[TEST] ")));
    }

    #[tokio::test]
    async fn subtask_mode_sends_criteria_to_description_by_default() {
        let jira = Arc::new(FakeJira::new());
        let criteria = sample_criteria("PROJ-1", 1);
        let suite = sample_suite("PROJ-1", 2);
        let result = publisher(jira.clone(), settings())
            .publish("PROJ-1", Some(&criteria), Some(&suite), PublishMode::Subtask, None)
            .await
            .unwrap();
        assert_eq!(result.acceptance_criteria_location.as_deref(), Some("description"));
        assert_eq!(result.created_subtasks.len(), 2);
        assert_eq!(result.created_subtasks[0].test_id, "TS-001");
    }

    #[tokio::test]
    async fn explicit_criteria_mode_overrides_default() {
        let jira = Arc::new(FakeJira::new());
        let criteria = sample_criteria("PROJ-1", 1);
        let result = publisher(jira.clone(), settings())
            .publish(
                "PROJ-1",
                Some(&criteria),
                None,
                PublishMode::Subtask,
                Some(PublishMode::Comment),
            )
            .await
            .unwrap();
        assert!(result
            .acceptance_criteria_location
            .unwrap()
            .starts_with("comment:"));

        let err = publisher(jira, settings())
            .publish("PROJ-1", Some(&criteria), None, PublishMode::Subtask, Some(PublishMode::Xray))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPublishMode);
    }

    #[tokio::test]
    async fn criteria_failure_does_not_block_tests() {
        let jira = Arc::new(FakeJira::new().fail_description_updates());
        let criteria = sample_criteria("PROJ-1", 1);
        let suite = sample_suite("PROJ-1", 2);
        let result = publisher(jira, settings())
            .publish("PROJ-1", Some(&criteria), Some(&suite), PublishMode::Subtask, None)
            .await
            .unwrap();
        assert!(!result.acceptance_criteria_published);
        assert!(result.test_scenarios_published);
        assert_eq!(result.outcome, PublishOutcome::PartialSuccess);
        assert_eq!(result.failures[0].artifact, Artifact::AcceptanceCriteria);
    }

    #[tokio::test]
    async fn nothing_published_is_an_error() {
        let jira = Arc::new(FakeJira::new().reject_subtask_containing("scenario"));
        let suite = sample_suite("PROJ-1", 2);
        let err = publisher(jira, settings())
            .publish("PROJ-1", None, Some(&suite), PublishMode::Subtask, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PublishFailed);
        assert!(err.to_string().contains("TS-001"));
    }

    #[tokio::test]
    async fn xray_requires_integration() {
        let jira = Arc::new(FakeJira::new());
        let suite = sample_suite("PROJ-1", 1);
        let err = publisher(jira.clone(), settings())
            .publish("PROJ-1", None, Some(&suite), PublishMode::Xray, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrationNotConfigured);

        let xray = Arc::new(FakeTestManagement::new("XRAY"));
        let result = publisher(jira, settings())
            .with_xray(xray.clone())
            .publish("PROJ-1", None, Some(&suite), PublishMode::Xray, None)
            .await
            .unwrap();
        assert!(result.test_scenarios_published);
        assert_eq!(result.created_subtasks.len(), 1);
        assert_eq!(xray.published_issues(), vec!["PROJ-1".to_string()]);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let jira = Arc::new(FakeJira::new());
        let p = publisher(jira, settings());
        let err = p
            .publish("PROJ-1", None, None, PublishMode::Comment, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        let criteria = sample_criteria("PROJ-1", 1);
        let err = p
            .publish("bogus", Some(&criteria), None, PublishMode::Comment, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIssueId);
    }
}
