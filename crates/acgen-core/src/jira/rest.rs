use super::{appended_description, project_key, JiraApi, JiraField, JiraUser};
use crate::config::JiraConfig;
use crate::error::{AcgenError, Result};
use crate::types::Story;
use futures::future::BoxFuture;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const STORY_FIELDS: &str =
    "summary,description,issuetype,status,project,labels,assignee,reporter,priority,components";

/// Jira Cloud / Server client over REST API v2 with basic auth.
#[derive(Debug, Clone)]
pub struct JiraRestClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
    issue_type: String,
}

impl JiraRestClient {
    pub fn new(cfg: &JiraConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| AcgenError::Jira(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http(cfg, http))
    }

    pub fn with_http(cfg: &JiraConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            email: cfg.email.clone(),
            api_token: cfg.api_token.clone(),
            issue_type: cfg.test_case_issue_type.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/api/2/{}", self.base_url, path))
            .basic_auth(&self.email, Some(&self.api_token))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Send and classify the response status. `issue` names the issue for
    /// not-found errors.
    async fn send(&self, builder: RequestBuilder, issue: &str) -> Result<String> {
        let response = builder
            .send()
            .await
            .map_err(|e| AcgenError::Jira(format!("request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AcgenError::Jira(format!("failed to read response: {e}")))?;
        if status.is_success() {
            return Ok(body);
        }
        let message = error_message(&body);
        tracing::warn!(issue, status = status.as_u16(), %message, "jira request failed");
        Err(match status {
            StatusCode::NOT_FOUND => AcgenError::StoryNotFound(issue.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AcgenError::JiraAuthError {
                status: status.as_u16(),
                message,
            },
            _ => AcgenError::Jira(format!("HTTP {}: {message}", status.as_u16())),
        })
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        builder: RequestBuilder,
        issue: &str,
    ) -> Result<T> {
        let body = self.send(builder, issue).await?;
        serde_json::from_str(&body)
            .map_err(|e| AcgenError::Jira(format!("unexpected response shape: {e}")))
    }

    async fn fetch_issue(&self, key: &str) -> Result<Story> {
        let raw: RawIssue = self
            .send_json(
                self.request(Method::GET, &format!("issue/{key}"))
                    .query(&[("fields", STORY_FIELDS)]),
                key,
            )
            .await?;
        Ok(raw.into_story())
    }

    async fn run_search(&self, jql: &str, max_results: usize) -> Result<Vec<Story>> {
        let body = json!({
            "jql": jql,
            "maxResults": max_results,
            "fields": STORY_FIELDS.split(',').collect::<Vec<_>>(),
        });
        let raw: RawSearch = self
            .send_json(self.request(Method::POST, "search").json(&body), jql)
            .await?;
        Ok(raw.issues.into_iter().map(RawIssue::into_story).collect())
    }

    async fn append_description(&self, key: &str, content: &str) -> Result<()> {
        let current: RawIssue = self
            .send_json(
                self.request(Method::GET, &format!("issue/{key}"))
                    .query(&[("fields", "description")]),
                key,
            )
            .await?;
        let existing = current.fields.description.unwrap_or_default();
        let body = json!({ "fields": { "description": appended_description(&existing, content) } });
        self.send(self.request(Method::PUT, &format!("issue/{key}")).json(&body), key)
            .await?;
        Ok(())
    }

    async fn post_comment(&self, key: &str, body: &str) -> Result<String> {
        let created: Created = self
            .send_json(
                self.request(Method::POST, &format!("issue/{key}/comment"))
                    .json(&json!({ "body": body })),
                key,
            )
            .await?;
        Ok(created.id)
    }

    async fn put_field(&self, key: &str, field_id: &str, value: Value) -> Result<()> {
        let mut fields = serde_json::Map::new();
        fields.insert(field_id.to_string(), value);
        self.send(
            self.request(Method::PUT, &format!("issue/{key}"))
                .json(&json!({ "fields": fields })),
            key,
        )
        .await?;
        Ok(())
    }

    async fn post_subtask(&self, parent: &str, summary: &str, description: &str) -> Result<String> {
        let body = json!({
            "fields": {
                "project": { "key": project_key(parent) },
                "parent": { "key": parent },
                "issuetype": { "name": self.issue_type },
                "summary": summary,
                "description": description,
            }
        });
        let created: Created = self
            .send_json(self.request(Method::POST, "issue").json(&body), parent)
            .await?;
        created
            .key
            .ok_or_else(|| AcgenError::Jira("created issue has no key".to_string()))
    }

    async fn fetch_myself(&self) -> Result<JiraUser> {
        let raw: RawUser = self
            .send_json(self.request(Method::GET, "myself"), "myself")
            .await?;
        Ok(JiraUser {
            display_name: raw.display_name,
            email: raw.email_address,
        })
    }

    async fn fetch_fields(&self) -> Result<Vec<JiraField>> {
        self.send_json(self.request(Method::GET, "field"), "field")
            .await
    }
}

impl JiraApi for JiraRestClient {
    fn get_issue<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Story>> {
        Box::pin(self.fetch_issue(key))
    }

    fn search<'a>(&'a self, jql: &'a str, max_results: usize) -> BoxFuture<'a, Result<Vec<Story>>> {
        Box::pin(self.run_search(jql, max_results))
    }

    fn update_description<'a>(&'a self, key: &'a str, content: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.append_description(key, content))
    }

    fn add_comment<'a>(&'a self, key: &'a str, body: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.post_comment(key, body))
    }

    fn update_custom_field<'a>(
        &'a self,
        key: &'a str,
        field_id: &'a str,
        value: Value,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.put_field(key, field_id, value))
    }

    fn create_subtask<'a>(
        &'a self,
        parent_key: &'a str,
        summary: &'a str,
        description: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.post_subtask(parent_key, summary, description))
    }

    fn current_user(&self) -> BoxFuture<'_, Result<JiraUser>> {
        Box::pin(self.fetch_myself())
    }

    fn list_fields(&self) -> BoxFuture<'_, Result<Vec<JiraField>>> {
        Box::pin(self.fetch_fields())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawSearch {
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Deserialize)]
struct RawIssue {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    key: String,
    fields: RawFields,
}

#[derive(Deserialize, Default)]
struct RawFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    issuetype: Option<Named>,
    #[serde(default)]
    status: Option<Named>,
    #[serde(default)]
    project: Option<ProjectRef>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    assignee: Option<Person>,
    #[serde(default)]
    reporter: Option<Person>,
    #[serde(default)]
    priority: Option<Named>,
    #[serde(default)]
    components: Vec<Named>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct ProjectRef {
    key: String,
}

#[derive(Deserialize)]
struct Person {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Deserialize)]
struct RawUser {
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(default, rename = "emailAddress")]
    email_address: Option<String>,
}

#[derive(Deserialize)]
struct Created {
    #[serde(default)]
    id: String,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Deserialize)]
struct JiraErrorBody {
    #[serde(default, rename = "errorMessages")]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: serde_json::Map<String, Value>,
}

impl RawIssue {
    fn into_story(self) -> Story {
        let f = self.fields;
        let project_key = f
            .project
            .map(|p| p.key)
            .unwrap_or_else(|| project_key(&self.key).to_string());
        Story {
            summary: f.summary.unwrap_or_default(),
            description: f.description.unwrap_or_default(),
            issue_type: f.issuetype.map(|t| t.name).unwrap_or_else(|| "Unknown".into()),
            status: f.status.map(|s| s.name).unwrap_or_else(|| "Unknown".into()),
            project_key,
            labels: f.labels,
            id: self.id,
            assignee: f.assignee.map(|p| p.display_name),
            reporter: f.reporter.map(|p| p.display_name),
            priority: f.priority.map(|p| p.name),
            components: f.components.into_iter().map(|c| c.name).collect(),
            key: self.key,
        }
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<JiraErrorBody>(body) {
        Ok(e) if !e.error_messages.is_empty() || !e.errors.is_empty() => {
            let mut parts = e.error_messages;
            parts.extend(e.errors.into_iter().map(|(field, msg)| match msg {
                Value::String(s) => format!("{field}: {s}"),
                other => format!("{field}: {other}"),
            }));
            parts.join("; ")
        }
        _ => body.chars().take(300).collect(),
    }
}
