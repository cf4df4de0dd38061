use crate::error::{AcgenError, Result};
use crate::jira::{JiraApi, JiraField, JiraUser};
use crate::types::Story;
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Largest page a search may request.
pub const MAX_SEARCH_RESULTS: usize = 100;

fn issue_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*-[0-9]+$").unwrap())
}

/// Normalize and check an issue key such as `PROJ-123`.
pub fn validate_issue_id(issue_id: &str) -> Result<String> {
    let key = issue_id.trim().to_ascii_uppercase();
    if issue_key_re().is_match(&key) {
        Ok(key)
    } else {
        Err(AcgenError::InvalidIssueId(issue_id.to_string()))
    }
}

/// Reads stories through the Jira collaborator. No retries: transient
/// failures go straight back to the caller.
#[derive(Clone)]
pub struct StoryFetcher {
    jira: Arc<dyn JiraApi>,
}

impl StoryFetcher {
    pub fn new(jira: Arc<dyn JiraApi>) -> Self {
        Self { jira }
    }

    pub async fn fetch(&self, issue_id: &str) -> Result<Story> {
        let key = validate_issue_id(issue_id)?;
        tracing::info!(issue = %key, "fetching story");
        let story = self.jira.get_issue(&key).await?;
        tracing::debug!(issue = %key, summary = %story.summary, "story fetched");
        Ok(story)
    }

    pub async fn search(&self, jql: &str, max_results: usize) -> Result<Vec<Story>> {
        if jql.trim().is_empty() {
            return Err(AcgenError::InvalidRequest("jql must not be empty".into()));
        }
        if max_results == 0 || max_results > MAX_SEARCH_RESULTS {
            return Err(AcgenError::InvalidRequest(format!(
                "max_results must be between 1 and {MAX_SEARCH_RESULTS}"
            )));
        }
        let stories = self.jira.search(jql, max_results).await?;
        tracing::info!(jql, found = stories.len(), "jira search complete");
        Ok(stories)
    }

    /// Who the configured credentials authenticate as.
    pub async fn current_user(&self) -> Result<JiraUser> {
        self.jira.current_user().await
    }

    /// Custom fields only, in the order Jira lists them.
    pub async fn custom_fields(&self) -> Result<Vec<JiraField>> {
        let mut fields = self.jira.list_fields().await?;
        fields.retain(JiraField::is_custom);
        tracing::debug!(count = fields.len(), "custom fields listed");
        Ok(fields)
    }
}
