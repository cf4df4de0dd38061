use acgen_core::PipelineRun;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /health
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let registry = app.pipeline.providers();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "jira_configured": app.config.jira.has_credentials(),
        "default_provider": registry.default_kind(),
        "providers": registry.configured(),
        "history_enabled": app.pipeline.history().is_some(),
    }))
}

#[derive(Debug, serde::Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// GET /history?limit=<n>, newest first.
pub async fn history(
    State(app): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Query(params) = params.map_err(AppError::from_query)?;
    let limit = params.limit.unwrap_or(20).min(200);
    let Some(history) = app.pipeline.history().cloned() else {
        return Ok(Json(serde_json::json!({ "enabled": false, "runs": [] })));
    };
    let runs = tokio::task::spawn_blocking(move || history.recent(limit))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(serde_json::json!({
        "enabled": true,
        "runs": runs.iter().map(summary).collect::<Vec<_>>(),
    })))
}

fn summary(run: &PipelineRun) -> serde_json::Value {
    serde_json::json!({
        "run_id": run.run_id(),
        "issue_id": run.issue_id(),
        "provider": run.provider(),
        "status": run.status(),
        "failure": run.failure(),
        "steps_completed": run.steps_completed(),
        "started_at": run.started_at(),
        "finished_at": run.finished_at(),
        "processing_time_seconds": run.processing_time_seconds(),
        "scenarios": run.acceptance_criteria().map(|c| c.scenarios.len()),
        "tests": run.test_suite().map(|s| s.total_scenarios()),
        "subtasks": run.publish_result().map(|p| p.created_subtasks.len()),
    })
}
