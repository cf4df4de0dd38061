//! Pipeline run record and its state machine.
//!
//! ```text
//! STARTED → FETCHED → CRITERIA_GENERATED → TESTS_GENERATED → PUBLISHED
//!    └──────────┴─────────────┴────────────────────┴──────────→ FAILED
//! ```
//!
//! A run may also finish successfully at `CRITERIA_GENERATED` (tests not
//! requested) or `TESTS_GENERATED` (auto publish off). Once finished the
//! record refuses every further mutation.

use crate::error::{AcgenError, ErrorKind, Result};
use crate::types::{AcceptanceCriteria, PublishResult, Story, TestSuite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunStatus / Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Started,
    Fetched,
    CriteriaGenerated,
    TestsGenerated,
    Published,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Started => "STARTED",
            RunStatus::Fetched => "FETCHED",
            RunStatus::CriteriaGenerated => "CRITERIA_GENERATED",
            RunStatus::TestsGenerated => "TESTS_GENERATED",
            RunStatus::Published => "PUBLISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchStory,
    GenerateCriteria,
    GenerateTests,
    Publish,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::FetchStory => "fetch_story",
            Stage::GenerateCriteria => "generate_criteria",
            Stage::GenerateTests => "generate_tests",
            Stage::Publish => "publish",
        }
    }

    /// Status the run must be in before this stage may complete.
    fn requires(self) -> RunStatus {
        match self {
            Stage::FetchStory => RunStatus::Started,
            Stage::GenerateCriteria => RunStatus::Fetched,
            Stage::GenerateTests => RunStatus::CriteriaGenerated,
            Stage::Publish => RunStatus::TestsGenerated,
        }
    }

    fn reaches(self) -> RunStatus {
        match self {
            Stage::FetchStory => RunStatus::Fetched,
            Stage::GenerateCriteria => RunStatus::CriteriaGenerated,
            Stage::GenerateTests => RunStatus::TestsGenerated,
            Stage::Publish => RunStatus::Published,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and why a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    run_id: Uuid,
    issue_id: String,
    provider: String,
    status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    story: Option<Story>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    acceptance_criteria: Option<AcceptanceCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    test_suite: Option<TestSuite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publish_result: Option<PublishResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<RunFailure>,
    #[serde(default)]
    steps_completed: Vec<Stage>,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    processing_time_seconds: f64,
}

impl PipelineRun {
    pub fn new(issue_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            issue_id: issue_id.into(),
            provider: provider.into(),
            status: RunStatus::Started,
            story: None,
            acceptance_criteria: None,
            test_suite: None,
            publish_result: None,
            failure: None,
            steps_completed: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            processing_time_seconds: 0.0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn issue_id(&self) -> &str {
        &self.issue_id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn story(&self) -> Option<&Story> {
        self.story.as_ref()
    }

    pub fn acceptance_criteria(&self) -> Option<&AcceptanceCriteria> {
        self.acceptance_criteria.as_ref()
    }

    pub fn test_suite(&self) -> Option<&TestSuite> {
        self.test_suite.as_ref()
    }

    pub fn publish_result(&self) -> Option<&PublishResult> {
        self.publish_result.as_ref()
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    pub fn steps_completed(&self) -> &[Stage] {
        &self.steps_completed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn processing_time_seconds(&self) -> f64 {
        self.processing_time_seconds
    }

    pub fn is_terminal(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    fn invalid(&self, to: impl fmt::Display) -> AcgenError {
        AcgenError::InvalidTransition {
            from: if self.is_terminal() {
                format!("{} (finished)", self.status)
            } else {
                self.status.to_string()
            },
            to: to.to_string(),
        }
    }

    fn advance(&mut self, stage: Stage) -> Result<()> {
        if self.is_terminal() || self.status != stage.requires() {
            return Err(self.invalid(stage.reaches()));
        }
        self.status = stage.reaches();
        self.steps_completed.push(stage);
        Ok(())
    }

    pub fn record_story(&mut self, story: Story) -> Result<()> {
        self.advance(Stage::FetchStory)?;
        self.story = Some(story);
        Ok(())
    }

    pub fn record_criteria(&mut self, criteria: AcceptanceCriteria) -> Result<()> {
        self.advance(Stage::GenerateCriteria)?;
        self.acceptance_criteria = Some(criteria);
        Ok(())
    }

    pub fn record_tests(&mut self, suite: TestSuite) -> Result<()> {
        self.advance(Stage::GenerateTests)?;
        self.test_suite = Some(suite);
        Ok(())
    }

    pub fn record_published(&mut self, result: PublishResult) -> Result<()> {
        self.advance(Stage::Publish)?;
        self.publish_result = Some(result);
        Ok(())
    }

    /// Move to `FAILED`. Artefacts from earlier stages are kept.
    pub fn fail(&mut self, stage: Stage, err: &AcgenError) -> Result<()> {
        if self.is_terminal() {
            return Err(self.invalid(RunStatus::Failed));
        }
        self.status = RunStatus::Failed;
        self.failure = Some(RunFailure {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        });
        self.close();
        Ok(())
    }

    /// Finish successfully in the current status.
    pub fn finish(&mut self) -> Result<()> {
        if self.is_terminal() {
            return Err(self.invalid("finished"));
        }
        self.close();
        Ok(())
    }

    fn close(&mut self) {
        let now = Utc::now();
        self.processing_time_seconds =
            (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        self.finished_at = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
