//! Google Gemini `generateContent` envelope.

use serde::{Deserialize, Serialize};

use crate::types::{Completion, GenerateRequest, ProviderKind, TokenUsage};
use crate::{LlmError, Result};

const PROVIDER: ProviderKind = ProviderKind::Gemini;

pub(crate) fn endpoint(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<PartOut<'a>>,
}

#[derive(Serialize)]
struct PartOut<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

pub(crate) fn request_body(req: &GenerateRequest) -> GeminiRequest<'_> {
    GeminiRequest {
        contents: vec![Content {
            role: Some("user"),
            parts: vec![PartOut { text: &req.prompt }],
        }],
        system_instruction: req.system_prompt.as_deref().map(|sp| Content {
            role: None,
            parts: vec![PartOut { text: sp }],
        }),
        generation_config: GenerationConfig {
            temperature: req.temperature,
            max_output_tokens: req.max_tokens,
            response_mime_type: req.json_mode.then_some("application/json"),
        },
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartIn>,
}

#[derive(Deserialize)]
struct PartIn {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

pub(crate) fn parse_response(body: &str, model: &str) -> Result<Completion> {
    let resp: GeminiResponse = serde_json::from_str(body).map_err(|e| LlmError::Envelope {
        provider: PROVIDER,
        message: e.to_string(),
    })?;

    let Some(candidate) = resp.candidates.into_iter().next() else {
        // An empty candidate list with a block reason is a policy refusal.
        if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Rejected {
                provider: PROVIDER,
                status: 200,
                message: format!("prompt blocked: {reason}"),
            });
        }
        return Err(LlmError::Envelope {
            provider: PROVIDER,
            message: "response contained no candidates".into(),
        });
    };

    let text = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default();

    Ok(Completion {
        text,
        model: resp.model_version.unwrap_or_else(|| model.to_string()),
        usage: resp.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        }),
        finish_reason: candidate.finish_reason,
    })
}

pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<GeminiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_all_text_parts_of_first_candidate() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "{\"a\":"}, {"text": " 1}"}], "role": "model"},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16},
            "modelVersion": "gemini-2.0-flash-001"
        }"#;
        let c = parse_response(body, "gemini-2.0-flash").unwrap();
        assert_eq!(c.text, "{\"a\": 1}");
        assert_eq!(c.model, "gemini-2.0-flash-001");
        assert_eq!(c.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(c.usage.unwrap().total(), 16);
    }

    #[test]
    fn blocked_prompt_is_a_rejection() {
        let body = r#"{"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse_response(body, "m").unwrap_err();
        assert!(matches!(err, LlmError::Rejected { .. }));
    }

    #[test]
    fn json_mode_sets_response_mime_type() {
        let mut req = GenerateRequest::new("hi");
        req.json_mode = true;
        req.system_prompt = Some("be terse".into());
        let v = serde_json::to_value(request_body(&req)).unwrap();
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(v["contents"][0]["role"], "user");
    }
}
