use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::types::{Completion, GenerateRequest, ProviderKind};
use crate::{claude, gemini, openai, LlmError, Result};

// ─── ProviderSettings ─────────────────────────────────────────────────────

/// Connection details for one provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    /// Override for the API host, e.g. a proxy or a test server.
    pub base_url: Option<String>,
}

// ─── LlmClient ────────────────────────────────────────────────────────────

/// HTTP driver for a single provider.
///
/// Cloning is cheap: the underlying `reqwest::Client` is reference counted
/// and shares its connection pool across clones.
#[derive(Debug, Clone)]
pub struct LlmClient {
    kind: ProviderKind,
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(kind: ProviderKind, settings: ProviderSettings) -> Result<Self> {
        Self::with_http(kind, settings, reqwest::Client::new())
    }

    /// Build a client around an existing connection pool.
    pub fn with_http(
        kind: ProviderKind,
        settings: ProviderSettings,
        http: reqwest::Client,
    ) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey(kind));
        }
        let model = if settings.model.trim().is_empty() {
            kind.default_model().to_string()
        } else {
            settings.model
        };
        Ok(Self {
            kind,
            http,
            api_key: settings.api_key,
            model,
            base_url: settings
                .base_url
                .unwrap_or_else(|| kind.default_base_url().to_string()),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one generation request and normalize the provider envelope.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<Completion> {
        let (url, headers, body) = self.build(req)?;

        tracing::debug!(
            provider = %self.kind,
            model = %self.model,
            json_mode = req.json_mode,
            "sending generation request"
        );

        let mut builder = self.http.post(&url).headers(headers).body(body);
        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::from_transport(self.kind, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(self.kind, e))?;

        if !status.is_success() {
            let message = match self.kind {
                ProviderKind::Gemini => gemini::error_message(&text),
                ProviderKind::Claude => claude::error_message(&text),
                ProviderKind::OpenAi => openai::error_message(&text),
            };
            tracing::warn!(provider = %self.kind, status = status.as_u16(), "provider returned an error");
            return Err(LlmError::from_status(self.kind, status.as_u16(), message));
        }

        let completion = match self.kind {
            ProviderKind::Gemini => gemini::parse_response(&text, &self.model),
            ProviderKind::Claude => claude::parse_response(&text),
            ProviderKind::OpenAi => openai::parse_response(&text),
        }?;

        if let Some(usage) = completion.usage {
            tracing::debug!(
                provider = %self.kind,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "generation complete"
            );
        }
        Ok(completion)
    }

    /// Cheap liveness probe: asks the model to echo a short token.
    pub async fn health_check(&self) -> bool {
        let mut req = GenerateRequest::new("Say 'OK' if you can read this.");
        req.max_tokens = 16;
        match self.generate(&req).await {
            Ok(c) => c.text.to_ascii_lowercase().contains("ok"),
            Err(e) => {
                tracing::warn!(provider = %self.kind, error = %e, "health check failed");
                false
            }
        }
    }

    fn build(&self, req: &GenerateRequest) -> Result<(String, HeaderMap, Vec<u8>)> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let envelope = |e: serde_json::Error| LlmError::Envelope {
            provider: self.kind,
            message: format!("failed to encode request: {e}"),
        };

        let (url, body) = match self.kind {
            ProviderKind::Gemini => {
                headers.insert("x-goog-api-key", self.header_value(&self.api_key)?);
                (
                    gemini::endpoint(&self.base_url, &self.model),
                    serde_json::to_vec(&gemini::request_body(req)).map_err(envelope)?,
                )
            }
            ProviderKind::Claude => {
                headers.insert("x-api-key", self.header_value(&self.api_key)?);
                headers.insert(
                    "anthropic-version",
                    HeaderValue::from_static(claude::ANTHROPIC_VERSION),
                );
                (
                    claude::endpoint(&self.base_url),
                    serde_json::to_vec(&claude::request_body(&self.model, req))
                        .map_err(envelope)?,
                )
            }
            ProviderKind::OpenAi => {
                headers.insert(
                    AUTHORIZATION,
                    self.header_value(&format!("Bearer {}", self.api_key))?,
                );
                (
                    openai::endpoint(&self.base_url),
                    serde_json::to_vec(&openai::request_body(&self.model, req))
                        .map_err(envelope)?,
                )
            }
        };
        Ok((url, headers, body))
    }

    fn header_value(&self, raw: &str) -> Result<HeaderValue> {
        HeaderValue::from_str(raw).map_err(|_| LlmError::Rejected {
            provider: self.kind,
            status: 0,
            message: "API key contains characters not allowed in a header".into(),
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
