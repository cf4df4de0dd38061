use acgen_core::pipeline::{
    CancelHandle, CriteriaRequest, CriteriaResponse, FullPipelineRequest, PipelineRun,
    TestsRequest, TestsResponse,
};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// Cancels the run when the handler future is dropped, which is what axum
/// does when the client disconnects.
struct CancelOnDrop(CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// POST /generate/acceptance-criteria
pub async fn acceptance_criteria(
    State(app): State<AppState>,
    payload: Result<Json<CriteriaRequest>, JsonRejection>,
) -> Result<Json<CriteriaResponse>, AppError> {
    let Json(req) = payload.map_err(AppError::from_json)?;
    let resp = app.pipeline.generate_criteria(req).await?;
    Ok(Json(resp))
}

/// POST /generate/test-scenarios
pub async fn test_scenarios(
    State(app): State<AppState>,
    payload: Result<Json<TestsRequest>, JsonRejection>,
) -> Result<Json<TestsResponse>, AppError> {
    let Json(req) = payload.map_err(AppError::from_json)?;
    let resp = app.pipeline.generate_tests(req).await?;
    Ok(Json(resp))
}

/// POST /generate/full-pipeline. A stage failure is still a 200 whose run
/// carries `status: FAILED` and `failure`.
pub async fn full_pipeline(
    State(app): State<AppState>,
    payload: Result<Json<FullPipelineRequest>, JsonRejection>,
) -> Result<Json<PipelineRun>, AppError> {
    let Json(req) = payload.map_err(AppError::from_json)?;
    let cancel = CancelHandle::new();
    let _guard = CancelOnDrop(cancel.clone());
    let pipeline = app.pipeline.clone();
    let run = tokio::spawn(async move { pipeline.run_full_pipeline(req, &cancel).await })
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(run))
}

#[derive(Debug, serde::Deserialize)]
pub struct ProvidersParams {
    #[serde(default)]
    pub probe: bool,
}

/// GET /generate/providers?probe=true
pub async fn providers(
    State(app): State<AppState>,
    params: Result<Query<ProvidersParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Query(params) = params.map_err(AppError::from_query)?;
    let registry = app.pipeline.providers();
    let statuses = registry.statuses(params.probe).await;
    Ok(Json(serde_json::json!({
        "default": registry.default_kind(),
        "providers": statuses,
    })))
}
