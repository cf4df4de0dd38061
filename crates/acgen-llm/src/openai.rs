//! OpenAI chat completions envelope.

use serde::{Deserialize, Serialize};

use crate::types::{Completion, GenerateRequest, ProviderKind, TokenUsage};
use crate::{LlmError, Result};

const PROVIDER: ProviderKind = ProviderKind::OpenAi;

pub(crate) fn endpoint(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

#[derive(Serialize)]
pub(crate) struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<MessageOut<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct MessageOut<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

pub(crate) fn request_body<'a>(model: &'a str, req: &'a GenerateRequest) -> OpenAiRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(sp) = req.system_prompt.as_deref() {
        messages.push(MessageOut {
            role: "system",
            content: sp,
        });
    }
    messages.push(MessageOut {
        role: "user",
        content: &req.prompt,
    });
    OpenAiRequest {
        model,
        messages,
        temperature: req.temperature,
        max_tokens: req.max_tokens,
        response_format: req.json_mode.then_some(ResponseFormat {
            kind: "json_object",
        }),
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

pub(crate) fn parse_response(body: &str) -> Result<Completion> {
    let resp: OpenAiResponse = serde_json::from_str(body).map_err(|e| LlmError::Envelope {
        provider: PROVIDER,
        message: e.to_string(),
    })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Envelope {
            provider: PROVIDER,
            message: "response contained no choices".into(),
        })?;

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        model: resp.model,
        usage: resp.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
        finish_reason: choice.finish_reason,
    })
}

pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<OpenAiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_choice() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4-turbo-preview",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        }"#;
        let c = parse_response(body).unwrap();
        assert_eq!(c.text, "{}");
        assert_eq!(c.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn empty_choices_is_an_envelope_error() {
        let err = parse_response(r#"{"model": "m", "choices": []}"#).unwrap_err();
        assert!(matches!(err, LlmError::Envelope { .. }));
    }

    #[test]
    fn system_prompt_becomes_leading_message() {
        let mut req = GenerateRequest::new("question");
        req.system_prompt = Some("rules".into());
        req.json_mode = true;
        let v = serde_json::to_value(request_body("gpt", &req)).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "question");
        assert_eq!(v["response_format"]["type"], "json_object");
    }
}
