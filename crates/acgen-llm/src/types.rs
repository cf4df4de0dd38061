use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::LlmError;

// ─── ProviderKind ─────────────────────────────────────────────────────────

/// The closed set of supported text generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gemini,
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn all() -> &'static [ProviderKind] {
        &[ProviderKind::Gemini, ProviderKind::Claude, ProviderKind::OpenAi]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Claude => "claude",
            ProviderKind::OpenAi => "openai",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::Claude => "claude-3-5-sonnet-20241022",
            ProviderKind::OpenAi => "gpt-4-turbo-preview",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
            ProviderKind::Claude => "https://api.anthropic.com",
            ProviderKind::OpenAi => "https://api.openai.com",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "claude" => Ok(ProviderKind::Claude),
            "openai" => Ok(ProviderKind::OpenAi),
            _ => Err(LlmError::UnknownProvider(s.to_string())),
        }
    }
}

// ─── Requests ─────────────────────────────────────────────────────────────

/// A single-turn generation request, independent of the provider envelope.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a bare JSON document where it supports that.
    pub json_mode: bool,
    /// Per-request HTTP timeout. `None` leaves the client default in place.
    pub timeout: Option<Duration>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            temperature: 0.3,
            max_tokens: 4096,
            json_mode: false,
            timeout: None,
        }
    }
}

// ─── Responses ────────────────────────────────────────────────────────────

/// Provider output normalized to plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}
