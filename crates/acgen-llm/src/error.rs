use thiserror::Error;

use crate::types::ProviderKind;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Network failure, timeout or a 5xx from the provider.
    #[error("{provider} unavailable: {message}")]
    Unavailable {
        provider: ProviderKind,
        message: String,
    },

    /// Auth, quota, unknown model or malformed request.
    #[error("{provider} rejected the request ({status}): {message}")]
    Rejected {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    #[error("{provider} returned an unreadable response envelope: {message}")]
    Envelope {
        provider: ProviderKind,
        message: String,
    },

    #[error("no API key configured for {0}")]
    MissingApiKey(ProviderKind),

    #[error("unknown provider '{0}': expected gemini, claude or openai")]
    UnknownProvider(String),
}

impl LlmError {
    /// Classify a non-success HTTP status.
    pub(crate) fn from_status(provider: ProviderKind, status: u16, message: String) -> Self {
        match status {
            400 | 401 | 403 | 404 | 422 | 429 => Self::Rejected {
                provider,
                status,
                message,
            },
            _ => Self::Unavailable {
                provider,
                message: format!("HTTP {status}: {message}"),
            },
        }
    }

    pub(crate) fn from_transport(provider: ProviderKind, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Unavailable { provider, message }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
