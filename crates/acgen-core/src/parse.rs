//! Lenient decoding of model output into the generation schemas.
//!
//! Models wrap JSON in markdown fences, prepend chatter and leave trailing
//! commas. [`extract_json`] tolerates all three; the `Raw*` structs then act
//! as the strict schema check. Every failure is reported as a plain message
//! so the caller can decide whether a repair round is still allowed.

use crate::error::AcgenError;
use crate::prompts;
use crate::provider::ProviderAdapter;
use crate::types::{Background, Priority, Scenario, TestScenario, TestStep, TestType};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

/// Pull the outermost JSON object out of free-form model text.
pub fn extract_json(text: &str) -> Result<Value, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("model returned an empty response".to_string());
    }

    let unfenced = fence_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    let start = unfenced
        .find('{')
        .ok_or_else(|| "no JSON object found in model output".to_string())?;
    let end = unfenced
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| "unterminated JSON object in model output".to_string())?;
    let candidate = &unfenced[start..=end];

    match serde_json::from_str(candidate) {
        Ok(v) => Ok(v),
        Err(first) => {
            let cleaned = trailing_comma_re().replace_all(candidate, "$1");
            serde_json::from_str(&cleaned).map_err(|_| format!("invalid JSON: {first}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Accept either `"step"` or `["step", ...]`.
fn string_list<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }
    Ok(match OneOrMany::deserialize(de)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn clean_steps(steps: Vec<String>) -> Vec<String> {
    steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Acceptance criteria schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct RawCriteria {
    pub feature_name: String,
    #[serde(default)]
    pub background: Option<RawBackground>,
    pub scenarios: Vec<RawScenario>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBackground {
    #[serde(default, deserialize_with = "string_list")]
    given: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawScenario {
    pub title: String,
    #[serde(deserialize_with = "string_list")]
    given: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    when: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    then: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    tags: Vec<String>,
    #[serde(default)]
    examples: Option<serde_json::Map<String, Value>>,
}

impl RawBackground {
    pub fn into_background(self) -> Option<Background> {
        let given = clean_steps(self.given);
        (!given.is_empty()).then_some(Background { given })
    }
}

impl RawScenario {
    /// Convert with a freshly assigned id; any id the model suggested is ignored.
    pub fn into_scenario(self, id: String) -> Scenario {
        let examples = self.examples.and_then(|map| {
            let table: BTreeMap<String, Vec<String>> = map
                .into_iter()
                .map(|(column, values)| {
                    let cells = match values {
                        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
                        other => scalar_text(&other).into_iter().collect(),
                    };
                    (column, cells)
                })
                .collect();
            (!table.is_empty()).then_some(table)
        });
        Scenario {
            id,
            title: self.title.trim().to_string(),
            given: clean_steps(self.given),
            when: clean_steps(self.when),
            then: clean_steps(self.then),
            tags: self
                .tags
                .into_iter()
                .map(|t| t.trim().trim_start_matches('@').to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            examples,
        }
    }
}

/// Decode and schema-check an acceptance criteria response.
pub(crate) fn parse_criteria(text: &str) -> Result<RawCriteria, String> {
    let value = extract_json(text)?;
    let raw: RawCriteria =
        serde_json::from_value(value).map_err(|e| format!("schema mismatch: {e}"))?;
    if raw.scenarios.is_empty() {
        return Err("response contained no scenarios".to_string());
    }
    if let Some(pos) = raw.scenarios.iter().position(|s| s.title.trim().is_empty()) {
        return Err(format!("scenario {} has an empty title", pos + 1));
    }
    if let Some(pos) = raw.scenarios.iter().position(|s| s.then.is_empty()) {
        return Err(format!("scenario {} has no Then steps", pos + 1));
    }
    Ok(raw)
}

// ---------------------------------------------------------------------------
// Test scenario schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawSuite {
    #[serde(default)]
    suite_name: Option<String>,
    scenarios: Vec<RawTest>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTest {
    pub title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    test_type: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    preconditions: Vec<String>,
    steps: Vec<RawStep>,
    #[serde(default)]
    pub acceptance_criteria_ref: String,
    #[serde(default, deserialize_with = "string_list")]
    tags: Vec<String>,
    #[serde(default)]
    estimated_duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    order: Option<u32>,
    action: String,
    expected_result: String,
    #[serde(default)]
    test_data: Option<Value>,
}

/// Parsed test scenario that has not been given an id yet.
#[derive(Debug, Clone)]
pub(crate) struct ParsedTest {
    pub test_type: TestType,
    pub acceptance_criteria_ref: String,
    draft: TestScenario,
}

impl ParsedTest {
    pub fn into_scenario(mut self, id: String) -> TestScenario {
        self.draft.id = id;
        self.draft.acceptance_criteria_ref = self.acceptance_criteria_ref;
        self.draft
    }

    pub fn title(&self) -> &str {
        &self.draft.title
    }
}

pub(crate) struct ParsedSuite {
    pub suite_name: Option<String>,
    pub tests: Vec<ParsedTest>,
}

fn normalize_type(raw: &str) -> Option<TestType> {
    let norm: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();
    match norm.as_str() {
        "positive" | "happy_path" => Some(TestType::Positive),
        "negative" => Some(TestType::Negative),
        "edge_case" | "edge" | "boundary" => Some(TestType::EdgeCase),
        "security" => Some(TestType::Security),
        "performance" => Some(TestType::Performance),
        _ => None,
    }
}

fn normalize_priority(raw: Option<&str>) -> Priority {
    match raw.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
        Some("critical") | Some("blocker") => Priority::Critical,
        Some("high") | Some("major") => Priority::High,
        Some("low") | Some("minor") | Some("trivial") => Priority::Low,
        _ => Priority::Medium,
    }
}

impl RawTest {
    fn into_parsed(self, index: usize) -> Result<ParsedTest, String> {
        let test_type = normalize_type(&self.test_type).ok_or_else(|| {
            format!("test {} has unknown type '{}'", index + 1, self.test_type)
        })?;
        if self.title.trim().is_empty() {
            return Err(format!("test {} has an empty title", index + 1));
        }
        if self.steps.is_empty() {
            return Err(format!("test {} has no steps", index + 1));
        }
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, s)| TestStep {
                order: s.order.unwrap_or(i as u32 + 1),
                action: s.action.trim().to_string(),
                expected_result: s.expected_result.trim().to_string(),
                test_data: s.test_data.as_ref().and_then(scalar_text),
            })
            .collect();
        let acceptance_criteria_ref = self.acceptance_criteria_ref.trim().to_ascii_uppercase();
        Ok(ParsedTest {
            test_type,
            acceptance_criteria_ref: acceptance_criteria_ref.clone(),
            draft: TestScenario {
                id: String::new(),
                title: self.title.trim().to_string(),
                description: self.description.trim().to_string(),
                test_type,
                priority: normalize_priority(self.priority.as_deref()),
                preconditions: clean_steps(self.preconditions),
                steps,
                acceptance_criteria_ref,
                tags: self.tags,
                estimated_duration_minutes: self.estimated_duration_minutes,
            },
        })
    }
}

/// Decode and schema-check a test scenario response.
pub(crate) fn parse_tests(text: &str) -> Result<ParsedSuite, String> {
    let value = extract_json(text)?;
    let raw: RawSuite =
        serde_json::from_value(value).map_err(|e| format!("schema mismatch: {e}"))?;
    if raw.scenarios.is_empty() {
        return Err("response contained no test scenarios".to_string());
    }
    let tests = raw
        .scenarios
        .into_iter()
        .enumerate()
        .map(|(i, t)| t.into_parsed(i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedSuite {
        suite_name: raw.suite_name.filter(|n| !n.trim().is_empty()),
        tests,
    })
}

// ---------------------------------------------------------------------------
// Repair round
// ---------------------------------------------------------------------------

/// Call the provider and parse its reply. A reply that fails `parse` earns
/// exactly one repair request; a second failure is
/// [`AcgenError::GenerationParseError`].
pub(crate) async fn generate_parsed<T>(
    provider: ProviderAdapter,
    system: &'static str,
    prompt: String,
    artifact: &'static str,
    parse: fn(&str) -> Result<T, String>,
) -> crate::error::Result<T> {
    let first = provider.generate(system, &prompt).await?;
    let error = match parse(&first) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };

    tracing::warn!(provider = %provider.kind(), artifact, error = %error, "unparseable reply, requesting repair");
    let repair = prompts::repair_prompt(&prompt, &error);
    let repaired = provider.generate(system, &repair).await?;
    parse(&repaired).map_err(|message| {
        tracing::error!(provider = %provider.kind(), artifact, error = %message, "repair reply unparseable");
        AcgenError::GenerationParseError {
            artifact: artifact.to_string(),
            message,
        }
    })
}
