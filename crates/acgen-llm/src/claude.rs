//! Anthropic messages API envelope.

use serde::{Deserialize, Serialize};

use crate::types::{Completion, GenerateRequest, ProviderKind, TokenUsage};
use crate::{LlmError, Result};

const PROVIDER: ProviderKind = ProviderKind::Claude;
pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) fn endpoint(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim_end_matches('/'))
}

#[derive(Serialize)]
pub(crate) struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<MessageOut<'a>>,
}

#[derive(Serialize)]
struct MessageOut<'a> {
    role: &'a str,
    content: &'a str,
}

pub(crate) fn request_body<'a>(model: &'a str, req: &'a GenerateRequest) -> ClaudeRequest<'a> {
    ClaudeRequest {
        model,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        system: req.system_prompt.as_deref(),
        messages: vec![MessageOut {
            role: "user",
            content: &req.prompt,
        }],
    }
}

#[derive(Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ClaudeError {
    error: ClaudeErrorDetail,
}

#[derive(Deserialize)]
struct ClaudeErrorDetail {
    message: String,
}

pub(crate) fn parse_response(body: &str) -> Result<Completion> {
    let resp: ClaudeResponse = serde_json::from_str(body).map_err(|e| LlmError::Envelope {
        provider: PROVIDER,
        message: e.to_string(),
    })?;

    let text = resp
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect::<String>();

    Ok(Completion {
        text,
        model: resp.model,
        usage: resp.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
        }),
        finish_reason: resp.stop_reason,
    })
}

pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ClaudeError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}
