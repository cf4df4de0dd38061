use super::{build_pipeline, load_config, runtime};
use crate::output::{print_json, print_table};
use std::path::Path;

pub fn fetch(path: &Path, issue: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let pipeline = build_pipeline(&config)?;
    let story = runtime()?.block_on(pipeline.fetcher().fetch(issue))?;

    if json {
        return print_json(&story);
    }

    println!("{}  {}", story.key, story.summary);
    println!("Type:    {}", story.issue_type);
    println!("Status:  {}", story.status);
    if let Some(priority) = &story.priority {
        println!("Priority: {priority}");
    }
    if !story.labels.is_empty() {
        println!("Labels:  {}", story.labels.join(", "));
    }
    if !story.components.is_empty() {
        println!("Components: {}", story.components.join(", "));
    }
    println!("Link:    {}", config.jira.browse_url(&story.key));
    if !story.description.trim().is_empty() {
        println!();
        println!("{}", story.description.trim_end());
    }
    Ok(())
}

pub fn search(path: &Path, jql: &str, max_results: usize, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let pipeline = build_pipeline(&config)?;
    let stories = runtime()?.block_on(pipeline.fetcher().search(jql, max_results))?;

    if json {
        return print_json(&stories);
    }
    if stories.is_empty() {
        println!("No stories match.");
        return Ok(());
    }

    let rows = stories
        .iter()
        .map(|s| vec![s.key.clone(), s.status.clone(), s.summary.clone()])
        .collect();
    print_table(&["KEY", "STATUS", "SUMMARY"], rows);
    Ok(())
}
