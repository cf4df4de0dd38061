use super::{build_pipeline, load_config, runtime};
use crate::output::{print_json, print_table};
use acgen_core::pipeline::FullPipelineRequest;
use acgen_core::types::{PublishMode, PublishOutcome};
use acgen_core::{CancelHandle, PipelineRun};
use std::path::Path;

pub struct RunArgs {
    pub issue: String,
    pub provider: Option<String>,
    pub context: Option<String>,
    pub publish_mode: Option<PublishMode>,
    pub ac_publish_mode: Option<PublishMode>,
    pub no_publish: bool,
    pub no_tests: bool,
}

impl RunArgs {
    fn into_request(self) -> FullPipelineRequest {
        FullPipelineRequest {
            issue_id: self.issue,
            llm_provider: self.provider,
            context: self.context,
            auto_publish: self.no_publish.then_some(false),
            publish_mode: self.publish_mode,
            ac_publish_mode: self.ac_publish_mode,
            generate_tests: self.no_tests.then_some(false),
        }
    }
}

pub fn run(path: &Path, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let pipeline = build_pipeline(&config)?;
    let req = args.into_request();

    let run = runtime()?.block_on(async move {
        let cancel = CancelHandle::new();
        let watcher = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("cancelling...");
                watcher.cancel();
            }
        });
        pipeline.run_full_pipeline(req, &cancel).await
    })?;

    if json {
        print_json(&run)?;
    } else {
        print_summary(&run);
    }

    if let Some(failure) = run.failure() {
        anyhow::bail!(
            "run {} failed at {} ({}): {}",
            run.run_id(),
            failure.stage,
            failure.kind,
            failure.message
        );
    }
    Ok(())
}

fn print_summary(run: &PipelineRun) {
    println!("Run:      {}", run.run_id());
    println!("Issue:    {}", run.issue_id());
    println!("Provider: {}", run.provider());
    println!("Status:   {}", run.status());
    println!("Time:     {:.1}s", run.processing_time_seconds());

    if let Some(criteria) = run.acceptance_criteria() {
        println!();
        println!("Acceptance criteria: {}", criteria.feature_name);
        for scenario in &criteria.scenarios {
            println!("  {}  {}", scenario.id, scenario.title);
        }
    }

    if let Some(suite) = run.test_suite() {
        println!();
        println!(
            "Test scenarios: {} (positive {}, negative {}, edge {}, security {}, performance {})",
            suite.total_scenarios(),
            suite.positive_count(),
            suite.negative_count(),
            suite.edge_case_count(),
            suite.security_count(),
            suite.performance_count()
        );
        let rows = suite
            .scenarios()
            .iter()
            .map(|s| {
                vec![
                    s.id.clone(),
                    s.test_type.to_string(),
                    s.acceptance_criteria_ref.clone(),
                    s.title.clone(),
                ]
            })
            .collect();
        print_table(&["ID", "TYPE", "AC", "TITLE"], rows);
    }

    if let Some(result) = run.publish_result() {
        println!();
        let outcome = match result.outcome {
            PublishOutcome::Success => "published",
            PublishOutcome::PartialSuccess => "partially published",
        };
        println!("{outcome}: {}", result.jira_link);
        if let Some(location) = &result.acceptance_criteria_location {
            println!("  criteria -> {location}");
        }
        for subtask in &result.created_subtasks {
            println!("  {} -> {}", subtask.test_id, subtask.key);
        }
        for failure in &result.failures {
            println!("  failed {}: {}", failure.artifact, failure.message);
        }
    }
}
