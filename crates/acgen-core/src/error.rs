use acgen_llm::LlmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcgenError {
    #[error("invalid issue id '{0}': expected a project key and number such as PROJ-123")]
    InvalidIssueId(String),

    #[error("story not found: {0}")]
    StoryNotFound(String),

    #[error("Jira rejected the credentials ({status}): {message}")]
    JiraAuthError { status: u16, message: String },

    #[error("Jira request failed: {0}")]
    Jira(String),

    #[error("provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("provider {provider} rejected the request: {message}")]
    ProviderRejected { provider: String, message: String },

    #[error("provider {0} is not configured")]
    ProviderNotConfigured(String),

    #[error("unknown provider '{0}': expected gemini, claude or openai")]
    UnknownProvider(String),

    #[error("could not parse generated {artifact}: {message}")]
    GenerationParseError { artifact: String, message: String },

    #[error("no custom field configured for {0}")]
    CustomFieldNotConfigured(String),

    #[error("{0} integration is not configured")]
    IntegrationNotConfigured(String),

    #[error("invalid publish mode '{0}'")]
    InvalidPublishMode(String),

    #[error("partially published: {0}")]
    PartialPublishFailure(String),

    #[error("nothing was published: {0}")]
    PublishFailed(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("history store error: {0}")]
    History(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AcgenError>;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Payload-free discriminant of [`AcgenError`], recorded on failed runs and
/// returned to HTTP callers as the `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidIssueId,
    StoryNotFound,
    JiraAuthError,
    Jira,
    ProviderUnavailable,
    ProviderRejected,
    ProviderNotConfigured,
    UnknownProvider,
    GenerationParseError,
    CustomFieldNotConfigured,
    IntegrationNotConfigured,
    InvalidPublishMode,
    PartialPublishFailure,
    PublishFailed,
    Cancelled,
    InvalidRequest,
    InvalidTransition,
    InvalidConfig,
    History,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidIssueId => "InvalidIssueId",
            ErrorKind::StoryNotFound => "StoryNotFound",
            ErrorKind::JiraAuthError => "JiraAuthError",
            ErrorKind::Jira => "Jira",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::ProviderRejected => "ProviderRejected",
            ErrorKind::ProviderNotConfigured => "ProviderNotConfigured",
            ErrorKind::UnknownProvider => "UnknownProvider",
            ErrorKind::GenerationParseError => "GenerationParseError",
            ErrorKind::CustomFieldNotConfigured => "CustomFieldNotConfigured",
            ErrorKind::IntegrationNotConfigured => "IntegrationNotConfigured",
            ErrorKind::InvalidPublishMode => "InvalidPublishMode",
            ErrorKind::PartialPublishFailure => "PartialPublishFailure",
            ErrorKind::PublishFailed => "PublishFailed",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::InvalidTransition => "InvalidTransition",
            ErrorKind::InvalidConfig => "InvalidConfig",
            ErrorKind::History => "History",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AcgenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcgenError::InvalidIssueId(_) => ErrorKind::InvalidIssueId,
            AcgenError::StoryNotFound(_) => ErrorKind::StoryNotFound,
            AcgenError::JiraAuthError { .. } => ErrorKind::JiraAuthError,
            AcgenError::Jira(_) => ErrorKind::Jira,
            AcgenError::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            AcgenError::ProviderRejected { .. } => ErrorKind::ProviderRejected,
            AcgenError::ProviderNotConfigured(_) => ErrorKind::ProviderNotConfigured,
            AcgenError::UnknownProvider(_) => ErrorKind::UnknownProvider,
            AcgenError::GenerationParseError { .. } => ErrorKind::GenerationParseError,
            AcgenError::CustomFieldNotConfigured(_) => ErrorKind::CustomFieldNotConfigured,
            AcgenError::IntegrationNotConfigured(_) => ErrorKind::IntegrationNotConfigured,
            AcgenError::InvalidPublishMode(_) => ErrorKind::InvalidPublishMode,
            AcgenError::PartialPublishFailure(_) => ErrorKind::PartialPublishFailure,
            AcgenError::PublishFailed(_) => ErrorKind::PublishFailed,
            AcgenError::Cancelled => ErrorKind::Cancelled,
            AcgenError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AcgenError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            AcgenError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            AcgenError::History(_) => ErrorKind::History,
            AcgenError::Io(_) | AcgenError::Yaml(_) | AcgenError::Json(_) => ErrorKind::Internal,
        }
    }
}

impl From<LlmError> for AcgenError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Unavailable { provider, message } => AcgenError::ProviderUnavailable {
                provider: provider.to_string(),
                message,
            },
            LlmError::Rejected {
                provider,
                status,
                message,
            } => AcgenError::ProviderRejected {
                provider: provider.to_string(),
                message: format!("HTTP {status}: {message}"),
            },
            LlmError::Envelope { provider, message } => AcgenError::ProviderUnavailable {
                provider: provider.to_string(),
                message,
            },
            LlmError::MissingApiKey(provider) => {
                AcgenError::ProviderNotConfigured(provider.to_string())
            }
            LlmError::UnknownProvider(name) => AcgenError::UnknownProvider(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acgen_llm::ProviderKind;

    #[test]
    fn llm_transport_failures_map_to_unavailable() {
        let err: AcgenError = LlmError::Unavailable {
            provider: ProviderKind::Gemini,
            message: "connection reset".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert!(err.to_string().contains("gemini"));
    }

    #[test]
    fn llm_quota_failures_map_to_rejected() {
        let err: AcgenError = LlmError::Rejected {
            provider: ProviderKind::OpenAi,
            status: 429,
            message: "quota".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ProviderRejected);
    }

    #[test]
    fn envelope_errors_are_not_parse_errors() {
        let err: AcgenError = LlmError::Envelope {
            provider: ProviderKind::Claude,
            message: "bad json".into(),
        }
        .into();
        assert_ne!(err.kind(), ErrorKind::GenerationParseError);
    }

    #[test]
    fn error_kind_serializes_as_taxonomy_name() {
        let json = serde_json::to_string(&ErrorKind::CustomFieldNotConfigured).unwrap();
        assert_eq!(json, "\"CustomFieldNotConfigured\"");
        assert_eq!(ErrorKind::Cancelled.to_string(), "Cancelled");
    }
}
