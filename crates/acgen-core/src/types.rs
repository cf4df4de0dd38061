use crate::error::{AcgenError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

/// Snapshot of a Jira issue, fetched once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub key: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default)]
    pub components: Vec<String>,
}

impl Story {
    /// A story that never lived in Jira, keyed `STORY-XXXXXXXX`.
    pub fn free_text(title: Option<&str>, text: &str) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let key = format!("STORY-{}", id[..8].to_ascii_uppercase());
        let summary = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                text.lines()
                    .next()
                    .unwrap_or_default()
                    .chars()
                    .take(80)
                    .collect()
            });
        Self {
            key,
            summary,
            description: text.to_string(),
            issue_type: "Story".to_string(),
            status: String::new(),
            project_key: "STORY".to_string(),
            labels: Vec::new(),
            id: None,
            assignee: None,
            reporter: None,
            priority: None,
            components: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Acceptance criteria
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Background {
    #[serde(default)]
    pub given: Vec<String>,
}

/// One Given/When/Then scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub given: Vec<String>,
    #[serde(default)]
    pub when: Vec<String>,
    #[serde(default)]
    pub then: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Scenario outline table: column name → one value per row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriteria {
    #[serde(default)]
    pub story_key: String,
    pub feature_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub provider: String,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
}

impl AcceptanceCriteria {
    pub fn contains(&self, scenario_id: &str) -> bool {
        self.scenarios.iter().any(|s| s.id == scenario_id)
    }

    pub fn scenario_ids(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.id.as_str()).collect()
    }
}

/// `AC-001`, `AC-002`, ...
pub fn criteria_id(index: usize) -> String {
    format!("AC-{:03}", index + 1)
}

/// `TS-001`, `TS-002`, ...
pub fn test_id(index: usize) -> String {
    format!("TS-{:03}", index + 1)
}

// ---------------------------------------------------------------------------
// Test suite
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Positive,
    Negative,
    EdgeCase,
    Security,
    Performance,
}

impl TestType {
    pub fn all() -> &'static [TestType] {
        &[
            TestType::Positive,
            TestType::Negative,
            TestType::EdgeCase,
            TestType::Security,
            TestType::Performance,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestType::Positive => "positive",
            TestType::Negative => "negative",
            TestType::EdgeCase => "edge_case",
            TestType::Security => "security",
            TestType::Performance => "performance",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    pub order: u32,
    pub action: String,
    pub expected_result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScenario {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub test_type: TestType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub preconditions: Vec<String>,
    pub steps: Vec<TestStep>,
    pub acceptance_criteria_ref: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_minutes: Option<u32>,
}

/// Generated test scenarios plus counts derived from them.
///
/// The counts are private and recomputed whenever a suite is built or
/// deserialized, so they cannot drift from the scenario list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TestSuiteData")]
pub struct TestSuite {
    pub story_key: String,
    pub suite_name: String,
    scenarios: Vec<TestScenario>,
    total_scenarios: usize,
    positive_count: usize,
    negative_count: usize,
    edge_case_count: usize,
    security_count: usize,
    performance_count: usize,
    pub provider: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TestSuiteData {
    #[serde(default)]
    story_key: String,
    suite_name: String,
    scenarios: Vec<TestScenario>,
    #[serde(default)]
    provider: String,
    #[serde(default = "Utc::now")]
    generated_at: DateTime<Utc>,
}

impl From<TestSuiteData> for TestSuite {
    fn from(d: TestSuiteData) -> Self {
        let mut suite = TestSuite::new(d.story_key, d.suite_name, d.scenarios, d.provider);
        suite.generated_at = d.generated_at;
        suite
    }
}

impl TestSuite {
    pub fn new(
        story_key: impl Into<String>,
        suite_name: impl Into<String>,
        scenarios: Vec<TestScenario>,
        provider: impl Into<String>,
    ) -> Self {
        let count = |t: TestType| scenarios.iter().filter(|s| s.test_type == t).count();
        Self {
            story_key: story_key.into(),
            suite_name: suite_name.into(),
            total_scenarios: scenarios.len(),
            positive_count: count(TestType::Positive),
            negative_count: count(TestType::Negative),
            edge_case_count: count(TestType::EdgeCase),
            security_count: count(TestType::Security),
            performance_count: count(TestType::Performance),
            scenarios,
            provider: provider.into(),
            generated_at: Utc::now(),
        }
    }

    pub fn scenarios(&self) -> &[TestScenario] {
        &self.scenarios
    }

    pub fn total_scenarios(&self) -> usize {
        self.total_scenarios
    }

    pub fn positive_count(&self) -> usize {
        self.positive_count
    }

    pub fn negative_count(&self) -> usize {
        self.negative_count
    }

    pub fn edge_case_count(&self) -> usize {
        self.edge_case_count
    }

    pub fn security_count(&self) -> usize {
        self.security_count
    }

    pub fn performance_count(&self) -> usize {
        self.performance_count
    }

    pub fn count_of(&self, t: TestType) -> usize {
        match t {
            TestType::Positive => self.positive_count,
            TestType::Negative => self.negative_count,
            TestType::EdgeCase => self.edge_case_count,
            TestType::Security => self.security_count,
            TestType::Performance => self.performance_count,
        }
    }

    /// Refs that point at no scenario in `criteria`.
    pub fn orphan_refs<'a>(&'a self, criteria: &AcceptanceCriteria) -> Vec<&'a str> {
        self.scenarios
            .iter()
            .map(|s| s.acceptance_criteria_ref.as_str())
            .filter(|r| !criteria.contains(r))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    Description,
    Comment,
    #[default]
    Subtask,
    CustomField,
    Xray,
    Zephyr,
}

impl PublishMode {
    pub fn all() -> &'static [PublishMode] {
        &[
            PublishMode::Description,
            PublishMode::Comment,
            PublishMode::Subtask,
            PublishMode::CustomField,
            PublishMode::Xray,
            PublishMode::Zephyr,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PublishMode::Description => "description",
            PublishMode::Comment => "comment",
            PublishMode::Subtask => "subtask",
            PublishMode::CustomField => "custom_field",
            PublishMode::Xray => "xray",
            PublishMode::Zephyr => "zephyr",
        }
    }

    /// Modes that can carry acceptance criteria themselves.
    pub fn accepts_criteria(self) -> bool {
        matches!(
            self,
            PublishMode::Description | PublishMode::Comment | PublishMode::CustomField
        )
    }

    /// Where criteria go when the caller names no separate criteria mode.
    pub fn default_criteria_mode(self) -> PublishMode {
        if self.accepts_criteria() {
            self
        } else {
            PublishMode::Description
        }
    }
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishMode {
    type Err = AcgenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "description" => Ok(PublishMode::Description),
            "comment" => Ok(PublishMode::Comment),
            "subtask" => Ok(PublishMode::Subtask),
            "custom_field" => Ok(PublishMode::CustomField),
            "xray" => Ok(PublishMode::Xray),
            "zephyr" => Ok(PublishMode::Zephyr),
            _ => Err(AcgenError::InvalidPublishMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    AcceptanceCriteria,
    TestScenarios,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Artifact::AcceptanceCriteria => "acceptance criteria",
            Artifact::TestScenarios => "test scenarios",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedSubtask {
    pub key: String,
    pub title: String,
    pub test_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishFailure {
    pub artifact: Artifact,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    Success,
    PartialSuccess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub issue_key: String,
    pub acceptance_criteria_published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria_location: Option<String>,
    pub test_scenarios_published: bool,
    #[serde(default)]
    pub created_subtasks: Vec<CreatedSubtask>,
    pub jira_link: String,
    pub outcome: PublishOutcome,
    pub message: String,
    #[serde(default)]
    pub failures: Vec<PublishFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(id: &str, t: TestType) -> TestScenario {
        TestScenario {
            id: id.into(),
            title: format!("test {id}"),
            description: String::new(),
            test_type: t,
            priority: Priority::High,
            preconditions: vec![],
            steps: vec![TestStep {
                order: 1,
                action: "do".into(),
                expected_result: "done".into(),
                test_data: None,
            }],
            acceptance_criteria_ref: "AC-001".into(),
            tags: vec![],
            estimated_duration_minutes: None,
        }
    }

    #[test]
    fn suite_counts_are_derived_from_scenarios() {
        let suite = TestSuite::new(
            "PROJ-1",
            "Login",
            vec![
                scenario("TS-001", TestType::Positive),
                scenario("TS-002", TestType::Negative),
                scenario("TS-003", TestType::Security),
                scenario("TS-004", TestType::Positive),
            ],
            "gemini",
        );
        assert_eq!(suite.total_scenarios(), 4);
        assert_eq!(suite.positive_count(), 2);
        assert_eq!(suite.negative_count(), 1);
        assert_eq!(suite.edge_case_count(), 0);
        assert_eq!(suite.security_count(), 1);
        let sum: usize = TestType::all().iter().map(|t| suite.count_of(*t)).sum();
        assert_eq!(sum, suite.total_scenarios());
    }

    #[test]
    fn tampered_counts_are_recomputed_on_deserialize() {
        let json = serde_json::json!({
            "story_key": "PROJ-1",
            "suite_name": "Login",
            "scenarios": [serde_json::to_value(scenario("TS-001", TestType::EdgeCase)).unwrap()],
            "total_scenarios": 99,
            "positive_count": 42,
            "provider": "claude"
        });
        let suite: TestSuite = serde_json::from_value(json).unwrap();
        assert_eq!(suite.total_scenarios(), 1);
        assert_eq!(suite.positive_count(), 0);
        assert_eq!(suite.edge_case_count(), 1);
    }

    #[test]
    fn suite_serializes_counts() {
        let suite = TestSuite::new("K-1", "S", vec![scenario("TS-001", TestType::Positive)], "p");
        let v = serde_json::to_value(&suite).unwrap();
        assert_eq!(v["total_scenarios"], 1);
        assert_eq!(v["positive_count"], 1);
        assert_eq!(v["scenarios"][0]["type"], "positive");
    }

    #[test]
    fn orphan_refs_are_reported() {
        let criteria = AcceptanceCriteria {
            story_key: "K-1".into(),
            feature_name: "F".into(),
            background: None,
            scenarios: vec![Scenario {
                id: "AC-001".into(),
                title: "t".into(),
                given: vec![],
                when: vec![],
                then: vec![],
                tags: vec![],
                examples: None,
            }],
            provider: "gemini".into(),
            generated_at: Utc::now(),
        };
        let mut orphan = scenario("TS-002", TestType::Negative);
        orphan.acceptance_criteria_ref = "AC-009".into();
        let suite = TestSuite::new(
            "K-1",
            "S",
            vec![scenario("TS-001", TestType::Positive), orphan],
            "gemini",
        );
        assert_eq!(suite.orphan_refs(&criteria), vec!["AC-009"]);
    }

    #[test]
    fn ids_are_zero_padded() {
        assert_eq!(criteria_id(0), "AC-001");
        assert_eq!(criteria_id(11), "AC-012");
        assert_eq!(test_id(99), "TS-100");
    }

    #[test]
    fn publish_mode_parses_and_rejects_unknown() {
        assert_eq!("custom_field".parse::<PublishMode>().unwrap(), PublishMode::CustomField);
        assert_eq!(" Xray ".parse::<PublishMode>().unwrap(), PublishMode::Xray);
        assert!(matches!(
            "wiki".parse::<PublishMode>(),
            Err(AcgenError::InvalidPublishMode(_))
        ));
    }

    #[test]
    fn criteria_mode_defaults_follow_publish_mode() {
        assert_eq!(PublishMode::Comment.default_criteria_mode(), PublishMode::Comment);
        assert_eq!(PublishMode::Subtask.default_criteria_mode(), PublishMode::Description);
        assert_eq!(PublishMode::Zephyr.default_criteria_mode(), PublishMode::Description);
    }

    #[test]
    fn free_text_story_gets_generated_key() {
        let story = Story::free_text(None, "As a user I want to reset my password\nmore");
        assert!(story.key.starts_with("STORY-"));
        assert_eq!(story.key.len(), "STORY-".len() + 8);
        assert_eq!(story.summary, "As a user I want to reset my password");
    }
}
