//! In-process fakes for the LLM, Jira and test management collaborators.
//!
//! Compiled for this crate's unit tests and, behind the `testing` feature,
//! for downstream integration tests. Nothing here touches the network.

use crate::error::{AcgenError, Result};
use crate::jira::{appended_description, project_key, JiraApi, JiraField, JiraUser};
use crate::provider::{GenerationConfig, LlmProvider};
use crate::publisher::TestManagement;
use crate::types::{
    AcceptanceCriteria, CreatedSubtask, Priority, Scenario, Story, TestScenario, TestStep,
    TestSuite, TestType,
};
use acgen_llm::ProviderKind;
use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Sample data
// ---------------------------------------------------------------------------

pub fn story(key: &str, summary: &str) -> Story {
    Story {
        key: key.to_string(),
        summary: summary.to_string(),
        description: format!("Story description for {summary}"),
        issue_type: "Story".to_string(),
        status: "To Do".to_string(),
        project_key: project_key(key).to_string(),
        labels: Vec::new(),
        id: Some("10001".to_string()),
        assignee: None,
        reporter: None,
        priority: Some("Medium".to_string()),
        components: Vec::new(),
    }
}

/// Criteria `AC-001..` with titles `criterion 1..`.
pub fn sample_criteria(story_key: &str, n: usize) -> AcceptanceCriteria {
    AcceptanceCriteria {
        story_key: story_key.to_string(),
        feature_name: "Sample feature".to_string(),
        background: None,
        scenarios: (0..n)
            .map(|i| Scenario {
                id: crate::types::criteria_id(i),
                title: format!("criterion {}", i + 1),
                given: vec!["a registered user".to_string()],
                when: vec![format!("they perform action {}", i + 1)],
                then: vec!["the outcome is visible".to_string()],
                tags: Vec::new(),
                examples: None,
            })
            .collect(),
        provider: "gemini".to_string(),
        generated_at: Utc::now(),
    }
}

/// Suite `TS-001..` with titles `scenario 1..`, each linked to `AC-001`.
pub fn sample_suite(story_key: &str, n: usize) -> TestSuite {
    let scenarios = (0..n)
        .map(|i| TestScenario {
            id: crate::types::test_id(i),
            title: format!("scenario {}", i + 1),
            description: "Exercise the happy path".to_string(),
            test_type: TestType::Positive,
            priority: Priority::High,
            preconditions: vec!["user exists".to_string()],
            steps: vec![TestStep {
                order: 1,
                action: "Submit the form".to_string(),
                expected_result: "Form accepted".to_string(),
                test_data: None,
            }],
            acceptance_criteria_ref: "AC-001".to_string(),
            tags: Vec::new(),
            estimated_duration_minutes: Some(5),
        })
        .collect();
    TestSuite::new(story_key, format!("Test Suite for {story_key}"), scenarios, "gemini")
}

/// A model reply carrying criteria with the given scenario titles.
pub fn criteria_reply(feature: &str, titles: &[&str]) -> String {
    let scenarios: Vec<serde_json::Value> = titles
        .iter()
        .map(|t| {
            serde_json::json!({
                "title": t,
                "given": ["the user is on the login page"],
                "when": ["they submit valid credentials"],
                "then": ["they see the dashboard"],
                "tags": ["smoke"]
            })
        })
        .collect();
    serde_json::json!({ "feature_name": feature, "scenarios": scenarios }).to_string()
}

/// One generated test as JSON object text.
pub fn test_json(title: &str, test_type: &str, criteria_ref: &str) -> String {
    serde_json::json!({
        "title": title,
        "description": format!("{title} check"),
        "type": test_type,
        "priority": "high",
        "preconditions": ["user exists"],
        "steps": [
            {"order": 1, "action": "Open the page", "expected_result": "Page loads"},
            {"order": 2, "action": "Submit", "expected_result": "Result shown", "test_data": "user@example.com"}
        ],
        "acceptance_criteria_ref": criteria_ref,
        "tags": ["generated"],
        "estimated_duration_minutes": 5
    })
    .to_string()
}

/// A model reply (`{"scenarios": [...]}`) wrapping objects produced by [`test_json`].
pub fn tests_reply(tests: &[String]) -> String {
    format!("{{\"scenarios\": [{}]}}", tests.join(", "))
}

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

enum Step {
    Reply(String),
    Rejected(String),
    Unavailable(String),
}

/// Replays a fixed script of replies, one per call, and records prompts.
/// Running past the end of the script is a provider outage.
pub struct ScriptedProvider {
    kind: ProviderKind,
    script: Mutex<VecDeque<Step>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    healthy: bool,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
            healthy: true,
        }
    }

    fn push(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Step::Reply(text.into()))
    }

    pub fn fail_rejected(self, message: impl Into<String>) -> Self {
        self.push(Step::Rejected(message.into()))
    }

    pub fn fail_unavailable(self, message: impl Into<String>) -> Self {
        self.push(Step::Unavailable(message.into()))
    }

    /// Sleep before answering each call, health checks included.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// User prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn generate<'a>(
        &'a self,
        _system: &'a str,
        prompt: &'a str,
        _config: GenerationConfig,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let provider = self.kind.as_str().to_string();
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(text)) => Ok(text),
                Some(Step::Rejected(message)) => {
                    Err(AcgenError::ProviderRejected { provider, message })
                }
                Some(Step::Unavailable(message)) => {
                    Err(AcgenError::ProviderUnavailable { provider, message })
                }
                None => Err(AcgenError::ProviderUnavailable {
                    provider,
                    message: "script exhausted".to_string(),
                }),
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.healthy
        })
    }
}

// ---------------------------------------------------------------------------
// FakeJira
// ---------------------------------------------------------------------------

/// One write observed by [`FakeJira`], in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum JiraWrite {
    Description {
        key: String,
        content: String,
    },
    Comment {
        key: String,
        id: String,
        body: String,
    },
    Field {
        key: String,
        field_id: String,
        value: serde_json::Value,
    },
    Subtask {
        parent: String,
        key: String,
        summary: String,
        description: String,
    },
}

#[derive(Default)]
struct JiraState {
    stories: BTreeMap<String, Story>,
    descriptions: BTreeMap<String, String>,
    fields: BTreeMap<(String, String), serde_json::Value>,
    field_defs: Vec<JiraField>,
    writes: Vec<JiraWrite>,
    next_id: u64,
}

/// An in-memory Jira. Writes to unknown issues are accepted.
#[derive(Default)]
pub struct FakeJira {
    state: Mutex<JiraState>,
    reads: AtomicUsize,
    reject_subtask: Option<String>,
    fail_descriptions: bool,
    auth_failure: bool,
}

impl FakeJira {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_story(self, story: Story) -> Self {
        self.state
            .lock()
            .unwrap()
            .stories
            .insert(story.key.clone(), story);
        self
    }

    /// Reject subtasks whose summary contains `needle`.
    pub fn reject_subtask_containing(mut self, needle: &str) -> Self {
        self.reject_subtask = Some(needle.to_string());
        self
    }

    pub fn with_field(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().field_defs.push(JiraField {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn fail_description_updates(mut self) -> Self {
        self.fail_descriptions = true;
        self
    }

    /// Every call fails as if the API token were revoked.
    pub fn reject_credentials(mut self) -> Self {
        self.auth_failure = true;
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<JiraWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Current description, falling back to the stored story's.
    pub fn description(&self, key: &str) -> String {
        let state = self.state.lock().unwrap();
        current_description(&state, key)
    }

    pub fn comments(&self, key: &str) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                JiraWrite::Comment { key: k, body, .. } if k == key => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn field(&self, key: &str, field_id: &str) -> Option<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .fields
            .get(&(key.to_string(), field_id.to_string()))
            .cloned()
    }

    pub fn subtasks(&self, parent_key: &str) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                JiraWrite::Subtask { parent, key, .. } if parent == parent_key => Some(key),
                _ => None,
            })
            .collect()
    }

    fn check_auth(&self) -> Result<()> {
        if self.auth_failure {
            Err(AcgenError::JiraAuthError {
                status: 401,
                message: "Unauthorized".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn current_description(state: &JiraState, key: &str) -> String {
    state
        .descriptions
        .get(key)
        .cloned()
        .or_else(|| state.stories.get(key).map(|s| s.description.clone()))
        .unwrap_or_default()
}

impl JiraApi for FakeJira {
    fn get_issue<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Story>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.check_auth()?;
            self.state
                .lock()
                .unwrap()
                .stories
                .get(key)
                .cloned()
                .ok_or_else(|| AcgenError::StoryNotFound(key.to_string()))
        })
    }

    fn search<'a>(&'a self, _jql: &'a str, max_results: usize) -> BoxFuture<'a, Result<Vec<Story>>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.check_auth()?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .stories
                .values()
                .take(max_results)
                .cloned()
                .collect())
        })
    }

    fn update_description<'a>(&'a self, key: &'a str, content: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.check_auth()?;
            if self.fail_descriptions {
                return Err(AcgenError::Jira("HTTP 400: description is read-only".to_string()));
            }
            let mut state = self.state.lock().unwrap();
            let updated = appended_description(&current_description(&state, key), content);
            state.descriptions.insert(key.to_string(), updated);
            state.writes.push(JiraWrite::Description {
                key: key.to_string(),
                content: content.to_string(),
            });
            Ok(())
        })
    }

    fn add_comment<'a>(&'a self, key: &'a str, body: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.check_auth()?;
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = (10_000 + state.next_id).to_string();
            state.writes.push(JiraWrite::Comment {
                key: key.to_string(),
                id: id.clone(),
                body: body.to_string(),
            });
            Ok(id)
        })
    }

    fn update_custom_field<'a>(
        &'a self,
        key: &'a str,
        field_id: &'a str,
        value: serde_json::Value,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.check_auth()?;
            let mut state = self.state.lock().unwrap();
            state
                .fields
                .insert((key.to_string(), field_id.to_string()), value.clone());
            state.writes.push(JiraWrite::Field {
                key: key.to_string(),
                field_id: field_id.to_string(),
                value,
            });
            Ok(())
        })
    }

    fn create_subtask<'a>(
        &'a self,
        parent_key: &'a str,
        summary: &'a str,
        description: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.check_auth()?;
            if let Some(needle) = &self.reject_subtask {
                if summary.contains(needle.as_str()) {
                    return Err(AcgenError::Jira(format!(
                        "HTTP 400: summary rejected: {summary}"
                    )));
                }
            }
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let key = format!("{}-{}", project_key(parent_key), 1000 + state.next_id);
            state.writes.push(JiraWrite::Subtask {
                parent: parent_key.to_string(),
                key: key.clone(),
                summary: summary.to_string(),
                description: description.to_string(),
            });
            Ok(key)
        })
    }

    fn current_user(&self) -> BoxFuture<'_, Result<JiraUser>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.check_auth()?;
            Ok(JiraUser {
                display_name: "QA Bot".to_string(),
                email: Some("qa@example.com".to_string()),
            })
        })
    }

    fn list_fields(&self) -> BoxFuture<'_, Result<Vec<JiraField>>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.check_auth()?;
            Ok(self.state.lock().unwrap().field_defs.clone())
        })
    }
}

// ---------------------------------------------------------------------------
// FakeTestManagement
// ---------------------------------------------------------------------------

/// Accepts every suite and mints `PREFIX-n` test case keys.
pub struct FakeTestManagement {
    prefix: String,
    published: Mutex<Vec<String>>,
}

impl FakeTestManagement {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn published_issues(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

impl TestManagement for FakeTestManagement {
    fn publish_suite<'a>(
        &'a self,
        issue_key: &'a str,
        suite: &'a TestSuite,
    ) -> BoxFuture<'a, Result<Vec<CreatedSubtask>>> {
        Box::pin(async move {
            self.published.lock().unwrap().push(issue_key.to_string());
            Ok(suite
                .scenarios()
                .iter()
                .enumerate()
                .map(|(i, s)| CreatedSubtask {
                    key: format!("{}-{}", self.prefix, i + 1),
                    title: s.title.clone(),
                    test_id: s.id.clone(),
                })
                .collect())
        })
    }
}
