use acgen_core::config::Config;
use acgen_core::history::RedbHistory;
use acgen_core::provider::{GenerationConfig, ProviderRegistry};
use acgen_core::testing::{
    criteria_reply, sample_criteria, story, test_json, tests_reply, FakeJira, ScriptedProvider,
};
use acgen_core::Pipeline;
use acgen_llm::ProviderKind;
use acgen_server::{build_router, AppState};
use axum::http::StatusCode;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> Config {
    let mut config = Config::default();
    config.jira.url = "https://acme.atlassian.net".into();
    config.jira.email = "qa@example.com".into();
    config.jira.api_token = "token".into();
    config.history.enabled = false;
    config
}

/// Router over in-process fakes.
fn app_with(provider: ScriptedProvider, jira: Arc<FakeJira>) -> axum::Router {
    let mut registry = ProviderRegistry::new(ProviderKind::Gemini, GenerationConfig::default());
    registry.insert(Arc::new(provider));
    let config = config();
    let pipeline = Pipeline::new(registry, jira, &config);
    build_router(AppState::new(pipeline, &config))
}

fn login_jira() -> Arc<FakeJira> {
    Arc::new(FakeJira::new().with_story(story("PROJ-123", "User login")))
}

fn gemini() -> ScriptedProvider {
    ScriptedProvider::new(ProviderKind::Gemini)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_configuration() {
    let app = app_with(gemini(), login_jira());
    let (status, json) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["jira_configured"], true);
    assert_eq!(json["default_provider"], "gemini");
    assert_eq!(json["providers"], serde_json::json!(["gemini"]));
    assert_eq!(json["history_enabled"], false);
}

#[tokio::test]
async fn providers_lists_every_kind_with_probe() {
    let app = app_with(gemini(), login_jira());
    let (status, json) = get(app, "/generate/providers?probe=true").await;
    assert_eq!(status, StatusCode::OK);
    let providers = json["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 3);
    let gemini = providers.iter().find(|p| p["name"] == "gemini").unwrap();
    assert_eq!(gemini["configured"], true);
    assert_eq!(gemini["healthy"], true);
    let claude = providers.iter().find(|p| p["name"] == "claude").unwrap();
    assert_eq!(claude["configured"], false);
}

#[tokio::test]
async fn history_without_store_is_empty() {
    let app = app_with(gemini(), login_jira());
    let (status, json) = get(app, "/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["enabled"], false);
    assert!(json["runs"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Jira
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_story_maps_errors_to_status_codes() {
    let jira = login_jira();

    let (status, json) = get(app_with(gemini(), jira.clone()), "/jira/story/proj-123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["key"], "PROJ-123");
    assert_eq!(json["summary"], "User login");

    let (status, json) = get(app_with(gemini(), jira.clone()), "/jira/story/PROJ-999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "StoryNotFound");

    let (status, json) = get(app_with(gemini(), jira), "/jira/story/not-a-key!").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "InvalidIssueId");
}

#[tokio::test]
async fn revoked_jira_token_is_401() {
    let jira = Arc::new(FakeJira::new().reject_credentials());
    let (status, json) = get(app_with(gemini(), jira), "/jira/story/PROJ-1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "JiraAuthError");
}

#[tokio::test]
async fn search_requires_jql() {
    let (status, json) = get(app_with(gemini(), login_jira()), "/jira/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "InvalidRequest");

    let (status, json) = get(
        app_with(gemini(), login_jira()),
        "/jira/search?jql=project%20%3D%20PROJ&max_results=10",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["stories"][0]["key"], "PROJ-123");
}

#[tokio::test]
async fn publish_comment_then_missing_custom_field() {
    let jira = login_jira();
    let criteria = serde_json::to_value(sample_criteria("PROJ-123", 2)).unwrap();

    let (status, json) = post_json(
        app_with(gemini(), jira.clone()),
        "/jira/publish",
        serde_json::json!({
            "issue_id": "PROJ-123",
            "acceptance_criteria": criteria,
            "publish_mode": "comment"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["acceptance_criteria_published"], true);
    assert!(json["acceptance_criteria_location"]
        .as_str()
        .unwrap()
        .starts_with("comment:"));
    assert_eq!(json["jira_link"], "https://acme.atlassian.net/browse/PROJ-123");
    assert_eq!(jira.comments("PROJ-123").len(), 1);

    let (status, json) = post_json(
        app_with(gemini(), jira.clone()),
        "/jira/publish",
        serde_json::json!({
            "issue_id": "PROJ-123",
            "acceptance_criteria": criteria,
            "publish_mode": "custom_field"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "CustomFieldNotConfigured");
    assert_eq!(jira.writes().len(), 1);
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn acceptance_criteria_for_issue() {
    let provider = gemini().reply(criteria_reply("User login", &["valid", "invalid", "locked"]));
    let (status, json) = post_json(
        app_with(provider, login_jira()),
        "/generate/acceptance-criteria",
        serde_json::json!({ "issue_id": "PROJ-123", "max_scenarios": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["story_key"], "PROJ-123");
    let scenarios = json["acceptance_criteria"]["scenarios"].as_array().unwrap();
    assert_eq!(scenarios.len(), 2);
    assert_eq!(scenarios[0]["id"], "AC-001");
    assert_eq!(scenarios[1]["id"], "AC-002");
    assert!(json["gherkin_text"]
        .as_str()
        .unwrap()
        .starts_with("Feature: User login"));
}

#[tokio::test]
async fn unknown_request_fields_are_rejected() {
    let (status, json) = post_json(
        app_with(gemini(), login_jira()),
        "/generate/acceptance-criteria",
        serde_json::json!({ "issue_id": "PROJ-123", "max_scenario": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "InvalidRequest");
}

#[tokio::test]
async fn test_scenarios_from_supplied_criteria() {
    let provider = gemini().reply(tests_reply(&[
        test_json("happy", "positive", "AC-001"),
        test_json("sql injection", "security", "AC-001"),
    ]));
    let (status, json) = post_json(
        app_with(provider, login_jira()),
        "/generate/test-scenarios",
        serde_json::json!({
            "acceptance_criteria": sample_criteria("PROJ-123", 1),
            "include_negative": false
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let suite = &json["test_suite"];
    assert_eq!(suite["total_scenarios"], 2);
    assert_eq!(suite["positive_count"], 1);
    assert_eq!(suite["security_count"], 1);
    assert_eq!(suite["scenarios"][0]["id"], "TS-001");
}

#[tokio::test]
async fn full_pipeline_without_publish() {
    let jira = login_jira();
    let provider = gemini()
        .reply(criteria_reply("User login", &["valid"]))
        .reply(tests_reply(&[test_json("logs in", "positive", "AC-001")]));
    let (status, json) = post_json(
        app_with(provider, jira.clone()),
        "/generate/full-pipeline",
        serde_json::json!({ "issue_id": "PROJ-123", "auto_publish": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "TESTS_GENERATED");
    assert!(json.get("publish_result").is_none());
    assert_eq!(json["steps_completed"].as_array().unwrap().len(), 3);
    assert!(jira.writes().is_empty());
}

#[tokio::test]
async fn full_pipeline_stage_failure_is_reported_in_body() {
    let provider = gemini().fail_rejected("HTTP 429: quota exceeded");
    let (status, json) = post_json(
        app_with(provider, login_jira()),
        "/generate/full-pipeline",
        serde_json::json!({ "issue_id": "PROJ-123" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "FAILED");
    assert_eq!(json["failure"]["stage"], "generate_criteria");
    assert_eq!(json["failure"]["kind"], "ProviderRejected");
    assert_eq!(json["story"]["key"], "PROJ-123");
    assert!(json.get("acceptance_criteria").is_none());
}

#[tokio::test]
async fn full_pipeline_rejects_unconfigured_provider() {
    let (status, json) = post_json(
        app_with(gemini(), login_jira()),
        "/generate/full-pipeline",
        serde_json::json!({ "issue_id": "PROJ-123", "llm_provider": "openai" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "ProviderNotConfigured");
}

#[tokio::test]
async fn finished_runs_show_up_in_history() {
    let dir = tempfile::TempDir::new().unwrap();
    let history = RedbHistory::open(&dir.path().join("history.redb")).unwrap();

    let mut registry = ProviderRegistry::new(ProviderKind::Gemini, GenerationConfig::default());
    registry.insert(Arc::new(gemini().reply(criteria_reply("User login", &["valid"]))));
    let config = config();
    let pipeline = Pipeline::new(registry, login_jira(), &config).with_history(Arc::new(history));
    let app = build_router(AppState::new(pipeline, &config));

    let (status, run) = post_json(
        app.clone(),
        "/generate/full-pipeline",
        serde_json::json!({ "issue_id": "PROJ-123", "generate_tests": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "CRITERIA_GENERATED");

    let (status, json) = get(app, "/history?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["enabled"], true);
    let runs = json["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["run_id"], run["run_id"]);
    assert_eq!(runs[0]["issue_id"], "PROJ-123");
    assert_eq!(runs[0]["scenarios"], 1);
}

// ---------------------------------------------------------------------------
// Jira connection and webhook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_reports_connected_user() {
    let (status, json) = get(app_with(gemini(), login_jira()), "/jira/validate").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["connected"], true);
    assert_eq!(json["url"], "https://acme.atlassian.net");
    assert_eq!(json["user"], "QA Bot");
}

#[tokio::test]
async fn validate_with_revoked_token_is_not_connected() {
    let jira = Arc::new(FakeJira::new().reject_credentials());
    let (status, json) = get(app_with(gemini(), jira), "/jira/validate").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["connected"], false);
    assert!(json["error"].as_str().unwrap().contains("Unauthorized"));
}

#[tokio::test]
async fn custom_fields_lists_only_customfield_ids() {
    let jira = Arc::new(
        FakeJira::new()
            .with_field("summary", "Summary")
            .with_field("customfield_10020", "Acceptance Criteria"),
    );
    let (status, json) = get(app_with(gemini(), jira), "/jira/custom-fields").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["custom_fields"],
        serde_json::json!([{"id": "customfield_10020", "name": "Acceptance Criteria"}])
    );
}

fn created(key: &str, issue_type: &str) -> serde_json::Value {
    serde_json::json!({
        "webhookEvent": "jira:issue_created",
        "issue": {"id": "10001", "key": key, "fields": {"issuetype": {"name": issue_type}}}
    })
}

#[tokio::test]
async fn created_story_webhook_publishes_subtasks_in_background() {
    let jira = login_jira();
    let provider = gemini()
        .reply(criteria_reply("User login", &["valid"]))
        .reply(tests_reply(&[test_json("logs in", "positive", "AC-001")]));
    let (status, json) = post_json(
        app_with(provider, jira.clone()),
        "/jira/webhook",
        created("PROJ-123", "Story"),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["issue_key"], "PROJ-123");

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while jira.subtasks("PROJ-123").is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("background run should publish a subtask");
    assert_eq!(jira.subtasks("PROJ-123").len(), 1);
}

#[tokio::test]
async fn webhook_ignores_other_events_and_types() {
    let jira = login_jira();
    let app = app_with(gemini(), jira.clone());

    let (status, json) = post_json(app.clone(), "/jira/webhook", created("PROJ-123", "Bug")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ignored");

    let updated = serde_json::json!({
        "webhookEvent": "jira:issue_updated",
        "issue": {"key": "PROJ-123", "fields": {"issuetype": {"name": "Story"}}}
    });
    let (status, json) = post_json(app, "/jira/webhook", updated).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ignored");
    assert_eq!(jira.read_count(), 0);
}

// ---------------------------------------------------------------------------
// End to end over HTTP collaborators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_pipeline_against_http_jira_and_openai() {
    let mut server = mockito::Server::new_async().await;
    let issue = server
        .mock("GET", "/rest/api/2/issue/PROJ-7")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "10007",
                "key": "PROJ-7",
                "fields": {
                    "summary": "Password reset",
                    "description": "As a user I want to reset my password",
                    "issuetype": {"name": "Story"},
                    "status": {"name": "To Do"},
                    "project": {"key": "PROJ"},
                    "labels": []
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let completion = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "model": "gpt-4-turbo-preview",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": criteria_reply("Password reset", &["email link", "expired link"])
                    },
                    "finish_reason": "stop"
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut config = config();
    config.jira.url = server.url();
    config.llm.provider = ProviderKind::OpenAi;
    config.llm.openai.api_key = Some("sk-test".into());
    config.llm.openai.base_url = Some(server.url());
    let app = build_router(AppState::from_config(&config).unwrap());

    let (status, json) = post_json(
        app,
        "/generate/full-pipeline",
        serde_json::json!({ "issue_id": "PROJ-7", "generate_tests": false }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["status"], "CRITERIA_GENERATED");
    assert_eq!(json["provider"], "openai");
    assert_eq!(json["acceptance_criteria"]["feature_name"], "Password reset");
    assert_eq!(
        json["acceptance_criteria"]["scenarios"][1]["id"],
        "AC-002"
    );
    issue.assert_async().await;
    completion.assert_async().await;
}
