//! Jira collaborator.
//!
//! [`JiraApi`] is the narrow surface the rest of the crate depends on: the
//! story fetcher reads through it and the publisher writes through it.
//! [`JiraRestClient`] is the HTTP implementation against the REST v2 API,
//! which accepts wiki markup for descriptions and comments.

mod rest;

pub use rest::JiraRestClient;

use crate::error::Result;
use crate::types::Story;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// The account the configured credentials authenticate as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraUser {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraField {
    pub id: String,
    pub name: String,
}

impl JiraField {
    pub fn is_custom(&self) -> bool {
        self.id.starts_with("customfield_")
    }
}

pub trait JiraApi: Send + Sync {
    fn get_issue<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Story>>;

    fn search<'a>(&'a self, jql: &'a str, max_results: usize) -> BoxFuture<'a, Result<Vec<Story>>>;

    /// Append `content` to the issue description, keeping what is there.
    fn update_description<'a>(&'a self, key: &'a str, content: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Returns the new comment id.
    fn add_comment<'a>(&'a self, key: &'a str, body: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Overwrite one field. Last write wins.
    fn update_custom_field<'a>(
        &'a self,
        key: &'a str,
        field_id: &'a str,
        value: serde_json::Value,
    ) -> BoxFuture<'a, Result<()>>;

    /// Returns the new subtask key.
    fn create_subtask<'a>(
        &'a self,
        parent_key: &'a str,
        summary: &'a str,
        description: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    /// Fails with `JiraAuthError` when the credentials are rejected.
    fn current_user(&self) -> BoxFuture<'_, Result<JiraUser>>;

    /// Every field the instance knows, system and custom.
    fn list_fields(&self) -> BoxFuture<'_, Result<Vec<JiraField>>>;
}

/// Separator placed between existing description text and appended content.
pub const DESCRIPTION_SEPARATOR: &str = "\n\n----\n\n";

/// Description after appending `content` to `existing`.
pub fn appended_description(existing: &str, content: &str) -> String {
    let existing = existing.trim_end();
    if existing.is_empty() {
        content.to_string()
    } else {
        format!("{existing}{DESCRIPTION_SEPARATOR}{content}")
    }
}

/// Project key of an issue key: `PROJ-123` → `PROJ`.
pub fn project_key(issue_key: &str) -> &str {
    issue_key
        .rsplit_once('-')
        .map(|(project, _)| project)
        .unwrap_or(issue_key)
}
