//! Provider adapter: one call contract over the LLM drivers.
//!
//! ```text
//! ProviderRegistry ── get(kind?) ──▶ ProviderAdapter ── timeout ──▶ dyn LlmProvider
//!                                                                     │
//!                                                     acgen_llm::LlmClient (HTTP)
//! ```

use crate::config::LlmConfig;
use crate::error::{AcgenError, Result};
use acgen_llm::{GenerateRequest, LlmClient, ProviderKind};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Sampling and time limits for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl GenerationConfig {
    pub fn from_llm(cfg: &LlmConfig) -> Self {
        Self {
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            timeout: cfg.timeout(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::from_llm(&LlmConfig::default())
    }
}

/// A text generation backend. Implementations return the model's raw text.
pub trait LlmProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    fn generate<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
        config: GenerationConfig,
    ) -> BoxFuture<'a, Result<String>>;

    fn health_check(&self) -> BoxFuture<'_, bool>;
}

impl LlmProvider for LlmClient {
    fn kind(&self) -> ProviderKind {
        LlmClient::kind(self)
    }

    fn model(&self) -> &str {
        LlmClient::model(self)
    }

    fn generate<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
        config: GenerationConfig,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let req = GenerateRequest {
                system_prompt: Some(system.to_string()),
                prompt: prompt.to_string(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                json_mode: true,
                timeout: Some(config.timeout),
            };
            let completion = LlmClient::generate(self, &req).await?;
            Ok(completion.text)
        })
    }

    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(LlmClient::health_check(self))
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

/// A selected provider plus the limits every call through it obeys.
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: Arc<dyn LlmProvider>,
    config: GenerationConfig,
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GenerationConfig) -> Self {
        Self { provider, config }
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn name(&self) -> &'static str {
        self.provider.kind().as_str()
    }

    /// Generate text; a call exceeding the configured timeout is
    /// [`AcgenError::ProviderUnavailable`].
    pub async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let kind = self.provider.kind();
        tracing::debug!(provider = %kind, prompt_chars = prompt.len(), "provider call");
        let started = std::time::Instant::now();
        let call = self.provider.generate(system, prompt, self.config);
        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(Ok(text)) => {
                tracing::debug!(
                    provider = %kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "provider call complete"
                );
                Ok(text)
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = %kind, error = %e, "provider call failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    provider = %kind,
                    timeout = ?self.config.timeout,
                    "provider call timed out"
                );
                Err(AcgenError::ProviderUnavailable {
                    provider: kind.to_string(),
                    message: format!("timed out after {:?}", self.config.timeout),
                })
            }
        }
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("kind", &self.provider.kind())
            .field("model", &self.provider.model())
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: ProviderKind,
    pub configured: bool,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
}

/// The configured providers, keyed by kind.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderKind, Arc<dyn LlmProvider>>,
    default_kind: ProviderKind,
    config: GenerationConfig,
}

impl ProviderRegistry {
    pub fn new(default_kind: ProviderKind, config: GenerationConfig) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_kind,
            config,
        }
    }

    /// Build HTTP clients for every provider with an API key. All clients
    /// share one connection pool.
    pub fn from_config(cfg: &LlmConfig) -> Self {
        let http = reqwest::Client::new();
        let mut registry = Self::new(cfg.provider, GenerationConfig::from_llm(cfg));
        for kind in ProviderKind::all() {
            let Some(settings) = cfg.settings_for(*kind) else {
                continue;
            };
            match LlmClient::with_http(*kind, settings, http.clone()) {
                Ok(client) => registry.insert(Arc::new(client)),
                Err(e) => tracing::warn!(provider = %kind, error = %e, "provider skipped"),
            }
        }
        registry
    }

    pub fn insert(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default_kind
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn configured(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }

    /// Adapter for `kind`, or for the default provider when `None`.
    pub fn get(&self, kind: Option<ProviderKind>) -> Result<ProviderAdapter> {
        let kind = kind.unwrap_or(self.default_kind);
        self.providers
            .get(&kind)
            .map(|p| ProviderAdapter::new(Arc::clone(p), self.config))
            .ok_or_else(|| AcgenError::ProviderNotConfigured(kind.to_string()))
    }

    /// Like [`ProviderRegistry::get`] but selects by name.
    pub fn get_by_name(&self, name: Option<&str>) -> Result<ProviderAdapter> {
        let kind = name
            .map(|n| {
                n.parse::<ProviderKind>()
                    .map_err(|_| AcgenError::UnknownProvider(n.to_string()))
            })
            .transpose()?;
        self.get(kind)
    }

    /// A health check that outlives the call timeout counts as unhealthy.
    async fn check_health(&self, kind: ProviderKind, provider: &dyn LlmProvider) -> bool {
        match tokio::time::timeout(self.config.timeout, provider.health_check()).await {
            Ok(healthy) => healthy,
            Err(_) => {
                tracing::warn!(provider = %kind, timeout = ?self.config.timeout, "health check timed out");
                false
            }
        }
    }

    /// Status of every known provider; probes the configured ones when
    /// `probe` is set.
    pub async fn statuses(&self, probe: bool) -> Vec<ProviderStatus> {
        let mut out = Vec::with_capacity(ProviderKind::all().len());
        for kind in ProviderKind::all() {
            let provider = self.providers.get(kind);
            let healthy = match (probe, provider) {
                (true, Some(p)) => Some(self.check_health(*kind, p.as_ref()).await),
                _ => None,
            };
            out.push(ProviderStatus {
                name: *kind,
                configured: provider.is_some(),
                is_default: *kind == self.default_kind,
                model: provider.map(|p| p.model().to_string()),
                healthy,
            });
        }
        out
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("configured", &self.providers.keys().collect::<Vec<_>>())
            .field("default_kind", &self.default_kind)
            .finish()
    }
}
