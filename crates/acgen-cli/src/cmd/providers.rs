use super::{build_pipeline, load_config, runtime};
use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(path: &Path, probe: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let pipeline = build_pipeline(&config)?;
    let registry = pipeline.providers();
    let statuses = runtime()?.block_on(registry.statuses(probe));

    if json {
        return print_json(&serde_json::json!({
            "default": registry.default_kind(),
            "providers": statuses,
        }));
    }

    let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
    let rows = statuses
        .iter()
        .map(|s| {
            vec![
                s.name.to_string(),
                yes_no(s.configured),
                yes_no(s.is_default),
                s.model.clone().unwrap_or_else(|| "-".to_string()),
                match s.healthy {
                    Some(h) => yes_no(h),
                    None => "-".to_string(),
                },
            ]
        })
        .collect();
    print_table(&["PROVIDER", "CONFIGURED", "DEFAULT", "MODEL", "HEALTHY"], rows);
    Ok(())
}
