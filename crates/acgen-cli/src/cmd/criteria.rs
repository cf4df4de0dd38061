use super::{build_pipeline, load_config, runtime};
use crate::output::print_json;
use acgen_core::pipeline::CriteriaRequest;
use std::path::Path;

/// Generate and print criteria; nothing is written to Jira.
pub fn run(path: &Path, req: CriteriaRequest, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let pipeline = build_pipeline(&config)?;
    let resp = runtime()?.block_on(pipeline.generate_criteria(req))?;

    if json {
        print_json(&resp)?;
    } else {
        print!("{}", resp.gherkin_text);
        eprintln!(
            "{} scenario(s) for {} in {:.1}s",
            resp.acceptance_criteria.scenarios.len(),
            resp.story_key,
            resp.processing_time_seconds
        );
    }
    Ok(())
}
