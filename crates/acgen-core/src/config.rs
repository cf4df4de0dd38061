use crate::error::{AcgenError, Result};
use crate::types::PublishMode;
use acgen_llm::{ProviderKind, ProviderSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "acgen.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Falls back to the provider's default model when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub claude: ProviderConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
}

fn default_provider() -> ProviderKind {
    ProviderKind::Gemini
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout(),
            gemini: ProviderConfig::default(),
            claude: ProviderConfig::default(),
            openai: ProviderConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn section(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Claude => &self.claude,
            ProviderKind::OpenAi => &self.openai,
        }
    }

    fn section_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::Claude => &mut self.claude,
            ProviderKind::OpenAi => &mut self.openai,
        }
    }

    pub fn model_for(&self, kind: ProviderKind) -> String {
        self.section(kind)
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| kind.default_model().to_string())
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.section(kind)
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    /// Driver settings for `kind`, or `None` when no API key is set.
    pub fn settings_for(&self, kind: ProviderKind) -> Option<ProviderSettings> {
        if !self.is_configured(kind) {
            return None;
        }
        let section = self.section(kind);
        Some(ProviderSettings {
            api_key: section.api_key.clone().unwrap_or_default(),
            model: self.model_for(kind),
            base_url: section.base_url.clone(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// ---------------------------------------------------------------------------
// JiraConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JiraConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub api_token: String,
    /// Custom field id (e.g. `customfield_10050`) holding Gherkin criteria.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_scenarios_field: Option<String>,
    #[serde(default = "default_test_case_issue_type")]
    pub test_case_issue_type: String,
    #[serde(default = "default_subtask_concurrency")]
    pub subtask_concurrency: usize,
    #[serde(default = "default_jira_timeout")]
    pub timeout_seconds: u64,
}

fn default_test_case_issue_type() -> String {
    "Sub-task".to_string()
}

fn default_subtask_concurrency() -> usize {
    3
}

fn default_jira_timeout() -> u64 {
    30
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            email: String::new(),
            api_token: String::new(),
            acceptance_criteria_field: None,
            test_scenarios_field: None,
            test_case_issue_type: default_test_case_issue_type(),
            subtask_concurrency: default_subtask_concurrency(),
            timeout_seconds: default_jira_timeout(),
        }
    }
}

impl JiraConfig {
    pub fn has_credentials(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.api_token.trim().is_empty()
    }

    /// `{url}/browse/{key}`
    pub fn browse_url(&self, issue_key: &str) -> String {
        format!("{}/browse/{}", self.url.trim_end_matches('/'), issue_key)
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_max_scenarios")]
    pub max_scenarios: usize,
    #[serde(default = "default_max_scenarios_per_criteria")]
    pub max_scenarios_per_criteria: usize,
    #[serde(default = "default_true")]
    pub include_negative: bool,
    #[serde(default = "default_true")]
    pub include_edge_cases: bool,
    #[serde(default)]
    pub publish_mode: PublishMode,
    #[serde(default = "default_true")]
    pub auto_publish: bool,
    #[serde(default = "default_true")]
    pub generate_tests: bool,
}

fn default_max_scenarios() -> usize {
    5
}

fn default_max_scenarios_per_criteria() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_scenarios: default_max_scenarios(),
            max_scenarios_per_criteria: default_max_scenarios_per_criteria(),
            include_negative: true,
            include_edge_cases: true,
            publish_mode: PublishMode::default(),
            auto_publish: true,
            generate_tests: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig / HistoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_history_path() -> PathBuf {
    PathBuf::from(".acgen/history.redb")
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|e| AcgenError::InvalidConfig(e.to_string()))
    }

    /// [`Config::load`] followed by the process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut cfg = Self::load(path)?;
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Overlay environment variables looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LLM_PROVIDER") {
            self.llm.provider = v.parse().map_err(|_| AcgenError::UnknownProvider(v.clone()))?;
        }
        if let Some(v) = get("LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("LLM_TIMEOUT_SECONDS") {
            self.llm.timeout_seconds = parse_env("LLM_TIMEOUT_SECONDS", &v)?;
        }
        for (key, kind) in [
            ("GEMINI_API_KEY", ProviderKind::Gemini),
            ("CLAUDE_API_KEY", ProviderKind::Claude),
            ("OPENAI_API_KEY", ProviderKind::OpenAi),
        ] {
            if let Some(v) = get(key) {
                self.llm.section_mut(kind).api_key = Some(v);
            }
        }

        if let Some(v) = get("JIRA_URL") {
            self.jira.url = v;
        }
        if let Some(v) = get("JIRA_EMAIL") {
            self.jira.email = v;
        }
        if let Some(v) = get("JIRA_API_TOKEN") {
            self.jira.api_token = v;
        }
        if let Some(v) = get("JIRA_ACCEPTANCE_CRITERIA_FIELD") {
            self.jira.acceptance_criteria_field = Some(v);
        }
        if let Some(v) = get("JIRA_TEST_SCENARIOS_FIELD") {
            self.jira.test_scenarios_field = Some(v);
        }
        if let Some(v) = get("JIRA_TEST_CASE_ISSUE_TYPE") {
            self.jira.test_case_issue_type = v;
        }

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        Ok(())
    }

    /// Copy with every credential replaced by `***`, for display.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        for kind in ProviderKind::all() {
            let section = cfg.llm.section_mut(*kind);
            if section.api_key.is_some() {
                section.api_key = Some("***".to_string());
            }
        }
        if !cfg.jira.api_token.is_empty() {
            cfg.jira.api_token = "***".to_string();
        }
        cfg
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if !self.jira.has_credentials() {
            warn(
                WarnLevel::Warning,
                "jira.url, jira.email and jira.api_token must all be set to reach Jira".into(),
            );
        }

        if !self.llm.is_configured(self.llm.provider) {
            warn(
                WarnLevel::Error,
                format!(
                    "default provider '{}' has no API key (set llm.{}.api_key or {}_API_KEY)",
                    self.llm.provider,
                    self.llm.provider,
                    self.llm.provider.as_str().to_ascii_uppercase()
                ),
            );
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            warn(
                WarnLevel::Warning,
                format!("llm.temperature={} is outside 0.0..=2.0", self.llm.temperature),
            );
        }

        if self.llm.timeout_seconds == 0 {
            warn(
                WarnLevel::Error,
                "llm.timeout_seconds must be greater than zero".into(),
            );
        }

        if !(1..=20).contains(&self.pipeline.max_scenarios) {
            warn(
                WarnLevel::Error,
                format!(
                    "pipeline.max_scenarios={} is outside 1..=20",
                    self.pipeline.max_scenarios
                ),
            );
        }

        if !(1..=10).contains(&self.pipeline.max_scenarios_per_criteria) {
            warn(
                WarnLevel::Error,
                format!(
                    "pipeline.max_scenarios_per_criteria={} is outside 1..=10",
                    self.pipeline.max_scenarios_per_criteria
                ),
            );
        }

        if self.jira.subtask_concurrency == 0 {
            warn(
                WarnLevel::Error,
                "jira.subtask_concurrency must be at least 1".into(),
            );
        }

        if self.pipeline.publish_mode == PublishMode::CustomField
            && self.jira.acceptance_criteria_field.is_none()
            && self.jira.test_scenarios_field.is_none()
        {
            warn(
                WarnLevel::Warning,
                "publish_mode is custom_field but no jira custom field ids are configured".into(),
            );
        }

        warnings
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AcgenError::InvalidConfig(format!("{key}={value} is not a valid value")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.llm.provider, ProviderKind::Gemini);
        assert!((cfg.llm.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(cfg.llm.max_tokens, 4096);
        assert_eq!(cfg.llm.timeout_seconds, 60);
        assert_eq!(cfg.jira.test_case_issue_type, "Sub-task");
        assert_eq!(cfg.jira.subtask_concurrency, 3);
        assert_eq!(cfg.pipeline.max_scenarios, 5);
        assert_eq!(cfg.pipeline.publish_mode, PublishMode::Subtask);
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.llm.model_for(ProviderKind::Claude), "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg = Config::from_yaml(
            "llm:\n  provider: claude\n  claude:\n    api_key: sk-test\njira:\n  subtask_concurrency: 5\n",
        )
        .unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::Claude);
        assert!(cfg.llm.is_configured(ProviderKind::Claude));
        assert!(!cfg.llm.is_configured(ProviderKind::Gemini));
        assert_eq!(cfg.jira.subtask_concurrency, 5);
        assert_eq!(cfg.llm.max_tokens, 4096);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_yaml("llm:\n  temprature: 0.5\n").unwrap_err();
        assert!(matches!(err, AcgenError::InvalidConfig(_)));
        let err = Config::from_yaml("extras: true\n").unwrap_err();
        assert!(matches!(err, AcgenError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_provider_in_yaml_is_rejected() {
        assert!(Config::from_yaml("llm:\n  provider: llama\n").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::from_yaml("server:\n  port: 9000\n").unwrap();
        cfg.apply_env(env(&[
            ("LLM_PROVIDER", "OpenAI"),
            ("LLM_TIMEOUT_SECONDS", "5"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("JIRA_URL", "https://example.atlassian.net"),
            ("JIRA_ACCEPTANCE_CRITERIA_FIELD", "customfield_10050"),
            ("PORT", "8081"),
        ]))
        .unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::OpenAi);
        assert_eq!(cfg.llm.timeout(), Duration::from_secs(5));
        assert_eq!(
            cfg.llm.settings_for(ProviderKind::OpenAi).unwrap().api_key,
            "sk-openai"
        );
        assert_eq!(cfg.jira.acceptance_criteria_field.as_deref(), Some("customfield_10050"));
        assert_eq!(cfg.server.port, 8081);
    }

    #[test]
    fn malformed_env_numbers_are_errors() {
        let mut cfg = Config::default();
        let err = cfg.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, AcgenError::InvalidConfig(_)));
        let err = cfg.apply_env(env(&[("LLM_PROVIDER", "llama")])).unwrap_err();
        assert!(matches!(err, AcgenError::UnknownProvider(_)));
    }

    #[test]
    fn validate_flags_missing_credentials_and_ranges() {
        let mut cfg = Config::default();
        cfg.llm.temperature = 3.5;
        cfg.pipeline.max_scenarios = 0;
        let messages: Vec<String> = cfg.validate().into_iter().map(|w| w.message).collect();
        assert!(messages.iter().any(|m| m.contains("jira.url")));
        assert!(messages.iter().any(|m| m.contains("GEMINI_API_KEY")));
        assert!(messages.iter().any(|m| m.contains("temperature")));
        assert!(messages.iter().any(|m| m.contains("max_scenarios=0")));
    }

    #[test]
    fn redacted_hides_secrets() {
        let mut cfg = Config::default();
        cfg.llm.gemini.api_key = Some("real".into());
        cfg.jira.api_token = "token".into();
        let shown = cfg.redacted();
        assert_eq!(shown.llm.gemini.api_key.as_deref(), Some("***"));
        assert_eq!(shown.jira.api_token, "***");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut cfg = Config::default();
        cfg.pipeline.publish_mode = PublishMode::Comment;
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.pipeline.publish_mode, PublishMode::Comment);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = Config::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
    }

    #[test]
    fn browse_url_trims_trailing_slash() {
        let jira = JiraConfig {
            url: "https://acme.atlassian.net/".into(),
            ..JiraConfig::default()
        };
        assert_eq!(jira.browse_url("PROJ-1"), "https://acme.atlassian.net/browse/PROJ-1");
    }
}
