use acgen_core::fetcher::MAX_SEARCH_RESULTS;
use acgen_core::pipeline::{CancelHandle, FullPipelineRequest, PublishRequest};
use acgen_core::types::{PublishMode, PublishResult, Story};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

/// POST /jira/publish
pub async fn publish(
    State(app): State<AppState>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<PublishResult>, AppError> {
    let Json(req) = payload.map_err(AppError::from_json)?;
    let result = app.pipeline.publish(req).await?;
    Ok(Json(result))
}

/// GET /jira/story/{issue_id}
pub async fn get_story(
    State(app): State<AppState>,
    Path(issue_id): Path<String>,
) -> Result<Json<Story>, AppError> {
    let story = app.pipeline.fetcher().fetch(&issue_id).await?;
    Ok(Json(story))
}

#[derive(Debug, serde::Deserialize)]
pub struct SearchParams {
    pub jql: String,
    pub max_results: Option<usize>,
}

/// GET /jira/search?jql=<jql>&max_results=<n>
pub async fn search(
    State(app): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Query(params) = params.map_err(AppError::from_query)?;
    let max_results = params.max_results.unwrap_or(MAX_SEARCH_RESULTS / 2);
    let stories = app.pipeline.fetcher().search(&params.jql, max_results).await?;
    Ok(Json(serde_json::json!({
        "total": stories.len(),
        "stories": stories,
    })))
}

/// GET /jira/validate. Always 200; a failed check reports `connected: false`.
pub async fn validate(State(app): State<AppState>) -> Json<serde_json::Value> {
    let jira = &app.config.jira;
    let body = match app.pipeline.fetcher().current_user().await {
        Ok(user) => json!({
            "connected": true,
            "url": jira.url,
            "email": jira.email,
            "user": user.display_name,
        }),
        Err(e) => {
            tracing::warn!(url = %jira.url, error = %e, "jira connection check failed");
            json!({
                "connected": false,
                "url": jira.url,
                "email": jira.email,
                "error": e.to_string(),
            })
        }
    };
    Json(body)
}

/// GET /jira/custom-fields
pub async fn custom_fields(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let fields = app.pipeline.fetcher().custom_fields().await?;
    Ok(Json(json!({ "custom_fields": fields })))
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

pub const ISSUE_CREATED: &str = "jira:issue_created";

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, rename = "webhookEvent")]
    pub webhook_event: Option<String>,
    #[serde(default)]
    pub issue: Option<WebhookIssue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookIssue {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub fields: WebhookFields,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookFields {
    #[serde(default)]
    pub issuetype: Option<WebhookIssueType>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookIssueType {
    pub name: String,
}

impl WebhookPayload {
    /// The story key to run, or why the event is ignored.
    fn story_key(self) -> Result<String, String> {
        let event = self.webhook_event.unwrap_or_default();
        if event != ISSUE_CREATED {
            return Err(format!("event {event:?} not handled"));
        }
        let issue = self.issue.unwrap_or_default();
        let Some(key) = issue.key.filter(|k| !k.trim().is_empty()) else {
            return Err("no issue key found".to_string());
        };
        match issue.fields.issuetype.map(|t| t.name) {
            Some(name) if name == "Story" => Ok(key),
            Some(name) => Err(format!("issue type {name} not supported")),
            None => Err("issue type missing".to_string()),
        }
    }
}

/// POST /jira/webhook. A created Story starts a full run in the background
/// and answers 202; anything else is acknowledged with 200 and ignored.
pub async fn webhook(
    State(app): State<AppState>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Json(payload) = payload.map_err(AppError::from_json)?;
    let key = match payload.story_key() {
        Ok(key) => key,
        Err(reason) => {
            tracing::info!(%reason, "webhook ignored");
            return Ok((
                StatusCode::OK,
                Json(json!({ "status": "ignored", "reason": reason })),
            ));
        }
    };

    let req = FullPipelineRequest {
        issue_id: key.clone(),
        auto_publish: Some(true),
        publish_mode: Some(PublishMode::Subtask),
        generate_tests: Some(true),
        ..FullPipelineRequest::default()
    };
    let pipeline = app.pipeline.clone();
    let issue = key.clone();
    tokio::spawn(async move {
        match pipeline.run_full_pipeline(req, &CancelHandle::new()).await {
            Ok(run) if run.is_failed() => {
                tracing::warn!(%issue, run_id = %run.run_id(), "webhook run failed")
            }
            Ok(run) => tracing::info!(%issue, run_id = %run.run_id(), "webhook run finished"),
            Err(e) => tracing::error!(%issue, error = %e, "webhook run rejected"),
        }
    });

    tracing::info!(issue = %key, "webhook accepted; pipeline started");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "issue_key": key })),
    ))
}
