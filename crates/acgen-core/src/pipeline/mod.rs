//! Pipeline orchestrator: fetch → criteria → tests → publish.
//!
//! [`Pipeline`] owns long-lived collaborators only (provider registry, Jira
//! client, publisher, optional history). Every run carries its own
//! [`PipelineRun`], so concurrent runs share nothing mutable.

mod cancel;
mod requests;
mod run;

pub use cancel::CancelHandle;
pub use requests::{
    CriteriaRequest, CriteriaResponse, FullPipelineRequest, PublishRequest, TestsRequest,
    TestsResponse,
};
pub use run::{PipelineRun, RunFailure, RunStatus, Stage};

use crate::config::{Config, PipelineConfig};
use crate::criteria::CriteriaGenerator;
use crate::error::{AcgenError, Result};
use crate::fetcher::{validate_issue_id, StoryFetcher};
use crate::history::{RedbHistory, RunHistory};
use crate::jira::{JiraApi, JiraRestClient};
use crate::provider::{ProviderAdapter, ProviderRegistry};
use crate::publisher::{Publisher, PublisherSettings};
use crate::suite::{TestGenerator, TestOptions};
use crate::types::{PublishMode, PublishResult, Story};
use std::sync::Arc;
use std::time::Instant;

/// Knobs for one full run after request overrides are applied.
#[derive(Debug, Clone)]
struct RunPlan {
    context: Option<String>,
    max_scenarios: usize,
    tests: TestOptions,
    generate_tests: bool,
    auto_publish: bool,
    publish_mode: PublishMode,
    ac_publish_mode: Option<PublishMode>,
}

fn at(stage: Stage) -> impl Fn(AcgenError) -> (Stage, AcgenError) {
    move |e| (stage, e)
}

#[derive(Clone)]
pub struct Pipeline {
    providers: Arc<ProviderRegistry>,
    fetcher: StoryFetcher,
    publisher: Publisher,
    defaults: PipelineConfig,
    history: Option<Arc<dyn RunHistory>>,
}

impl Pipeline {
    pub fn new(providers: ProviderRegistry, jira: Arc<dyn JiraApi>, config: &Config) -> Self {
        Self {
            providers: Arc::new(providers),
            fetcher: StoryFetcher::new(jira.clone()),
            publisher: Publisher::new(jira, PublisherSettings::from(&config.jira)),
            defaults: config.pipeline.clone(),
            history: None,
        }
    }

    /// Wire the HTTP collaborators and, when enabled, the history store.
    /// A history store that cannot be opened is logged and skipped.
    pub fn from_config(config: &Config) -> Result<Self> {
        let providers = ProviderRegistry::from_config(&config.llm);
        let jira: Arc<dyn JiraApi> = Arc::new(JiraRestClient::new(&config.jira)?);
        let mut pipeline = Self::new(providers, jira, config);
        if config.history.enabled {
            match RedbHistory::open(&config.history.path) {
                Ok(history) => pipeline = pipeline.with_history(Arc::new(history)),
                Err(e) => tracing::warn!(
                    path = %config.history.path.display(),
                    error = %e,
                    "run history unavailable; runs will not be recorded"
                ),
            }
        }
        Ok(pipeline)
    }

    pub fn with_history(mut self, history: Arc<dyn RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn fetcher(&self) -> &StoryFetcher {
        &self.fetcher
    }

    pub fn history(&self) -> Option<&Arc<dyn RunHistory>> {
        self.history.as_ref()
    }

    pub fn defaults(&self) -> &PipelineConfig {
        &self.defaults
    }

    // -----------------------------------------------------------------------
    // Full run
    // -----------------------------------------------------------------------

    /// Run every stage for one issue.
    ///
    /// Bad input (issue key, provider name, criteria publish mode) is
    /// rejected before a run exists.
    /// After that, a stage failure is not an `Err`: the returned run is
    /// `FAILED` with the stage and error kind attached and keeps whatever
    /// the earlier stages produced.
    pub async fn run_full_pipeline(
        &self,
        req: FullPipelineRequest,
        cancel: &CancelHandle,
    ) -> Result<PipelineRun> {
        let key = validate_issue_id(&req.issue_id)?;
        let provider = self.providers.get_by_name(req.llm_provider.as_deref())?;
        if let Some(mode) = req.ac_publish_mode.filter(|m| !m.accepts_criteria()) {
            return Err(AcgenError::InvalidPublishMode(mode.to_string()));
        }
        let plan = RunPlan {
            context: req.context,
            max_scenarios: self.defaults.max_scenarios,
            tests: self.test_options(None, None, None),
            generate_tests: req.generate_tests.unwrap_or(self.defaults.generate_tests),
            auto_publish: req.auto_publish.unwrap_or(self.defaults.auto_publish),
            publish_mode: req.publish_mode.unwrap_or(self.defaults.publish_mode),
            ac_publish_mode: req.ac_publish_mode,
        };

        let mut run = PipelineRun::new(&key, provider.name());
        tracing::info!(
            run_id = %run.run_id(),
            issue = %key,
            provider = %provider.kind(),
            generate_tests = plan.generate_tests,
            auto_publish = plan.auto_publish,
            "pipeline started"
        );

        match self.drive(&mut run, &provider, &plan, cancel).await {
            Ok(()) => run.finish()?,
            Err((stage, e)) => {
                tracing::warn!(
                    run_id = %run.run_id(),
                    issue = %key,
                    %stage,
                    kind = %e.kind(),
                    error = %e,
                    "pipeline stage failed"
                );
                run.fail(stage, &e)?;
            }
        }

        tracing::info!(
            run_id = %run.run_id(),
            issue = %key,
            status = %run.status(),
            seconds = run.processing_time_seconds(),
            "pipeline finished"
        );
        self.record(&run).await;
        Ok(run)
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        provider: &ProviderAdapter,
        plan: &RunPlan,
        cancel: &CancelHandle,
    ) -> std::result::Result<(), (Stage, AcgenError)> {
        let story = cancel
            .run(self.fetcher.fetch(run.issue_id()))
            .await
            .map_err(at(Stage::FetchStory))?;
        run.record_story(story.clone()).map_err(at(Stage::FetchStory))?;

        let criteria = cancel
            .run(CriteriaGenerator::new(provider.clone()).generate(
                &story,
                plan.context.as_deref(),
                plan.max_scenarios,
            ))
            .await
            .map_err(at(Stage::GenerateCriteria))?;
        run.record_criteria(criteria.clone())
            .map_err(at(Stage::GenerateCriteria))?;

        if !plan.generate_tests {
            tracing::debug!(run_id = %run.run_id(), "test generation not requested");
            return Ok(());
        }

        let suite = cancel
            .run(TestGenerator::new(provider.clone()).generate(&criteria, &plan.tests))
            .await
            .map_err(at(Stage::GenerateTests))?;
        run.record_tests(suite.clone())
            .map_err(at(Stage::GenerateTests))?;

        if !plan.auto_publish {
            tracing::debug!(run_id = %run.run_id(), "auto publish off");
            return Ok(());
        }

        let published = cancel
            .run(self.publisher.publish(
                &story.key,
                Some(&criteria),
                Some(&suite),
                plan.publish_mode,
                plan.ac_publish_mode,
            ))
            .await
            .map_err(at(Stage::Publish))?;
        run.record_published(published).map_err(at(Stage::Publish))
    }

    /// The store is synchronous; writes go through the blocking pool.
    async fn record(&self, run: &PipelineRun) {
        let Some(history) = self.history.clone() else {
            return;
        };
        let run_id = run.run_id();
        let snapshot = run.clone();
        match tokio::task::spawn_blocking(move || history.record(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(run_id = %run_id, error = %e, "failed to record run history")
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "history task failed")
            }
        }
    }

    // -----------------------------------------------------------------------
    // Standalone operations
    // -----------------------------------------------------------------------

    fn test_options(
        &self,
        include_negative: Option<bool>,
        include_edge_cases: Option<bool>,
        max_per_criteria: Option<usize>,
    ) -> TestOptions {
        TestOptions {
            include_negative: include_negative.unwrap_or(self.defaults.include_negative),
            include_edge_cases: include_edge_cases.unwrap_or(self.defaults.include_edge_cases),
            max_scenarios_per_criteria: max_per_criteria
                .unwrap_or(self.defaults.max_scenarios_per_criteria),
        }
    }

    async fn resolve_story(
        &self,
        issue_id: Option<&str>,
        story_text: Option<&str>,
        story_title: Option<&str>,
    ) -> Result<Story> {
        match (issue_id, story_text.map(str::trim).filter(|t| !t.is_empty())) {
            (Some(id), _) => self.fetcher.fetch(id).await,
            (None, Some(text)) => Ok(Story::free_text(story_title, text)),
            (None, None) => Err(AcgenError::InvalidRequest(
                "provide issue_id or story_text".into(),
            )),
        }
    }

    /// Criteria for a Jira issue or a free-text story.
    pub async fn generate_criteria(&self, req: CriteriaRequest) -> Result<CriteriaResponse> {
        let started = Instant::now();
        let provider = self.providers.get_by_name(req.llm_provider.as_deref())?;
        let story = self
            .resolve_story(
                req.issue_id.as_deref(),
                req.story_text.as_deref(),
                req.story_title.as_deref(),
            )
            .await?;
        let criteria = CriteriaGenerator::new(provider)
            .generate(
                &story,
                req.context.as_deref(),
                req.max_scenarios.unwrap_or(self.defaults.max_scenarios),
            )
            .await?;
        Ok(CriteriaResponse {
            success: true,
            story_key: story.key,
            gherkin_text: criteria.to_gherkin(),
            acceptance_criteria: criteria,
            processing_time_seconds: started.elapsed().as_secs_f64(),
        })
    }

    /// Tests from supplied criteria, or from criteria generated for an issue.
    pub async fn generate_tests(&self, req: TestsRequest) -> Result<TestsResponse> {
        let started = Instant::now();
        let provider = self.providers.get_by_name(req.llm_provider.as_deref())?;
        let options = self.test_options(
            req.include_negative,
            req.include_edge_cases,
            req.max_scenarios_per_criteria,
        );

        let criteria = match (req.acceptance_criteria, req.issue_id.as_deref()) {
            (Some(mut criteria), issue_id) => {
                if criteria.scenarios.is_empty() {
                    return Err(AcgenError::InvalidRequest(
                        "acceptance_criteria has no scenarios".into(),
                    ));
                }
                if criteria.story_key.is_empty() {
                    if let Some(id) = issue_id {
                        criteria.story_key = validate_issue_id(id)?;
                    }
                }
                criteria
            }
            (None, Some(id)) => {
                let story = self.fetcher.fetch(id).await?;
                CriteriaGenerator::new(provider.clone())
                    .generate(&story, None, self.defaults.max_scenarios)
                    .await?
            }
            (None, None) => {
                return Err(AcgenError::InvalidRequest(
                    "provide acceptance_criteria or issue_id".into(),
                ))
            }
        };

        let suite = TestGenerator::new(provider).generate(&criteria, &options).await?;
        Ok(TestsResponse {
            success: true,
            story_key: suite.story_key.clone(),
            test_suite: suite,
            processing_time_seconds: started.elapsed().as_secs_f64(),
        })
    }

    pub async fn publish(&self, req: PublishRequest) -> Result<PublishResult> {
        self.publisher
            .publish(
                &req.issue_id,
                req.acceptance_criteria.as_ref(),
                req.test_suite.as_ref(),
                req.publish_mode.unwrap_or(self.defaults.publish_mode),
                req.ac_publish_mode,
            )
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
