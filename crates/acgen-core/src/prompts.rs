//! Prompt text sent to the providers.

use crate::types::{Scenario, Story, TestType};

pub const CRITERIA_SYSTEM: &str = "You are a senior QA analyst who writes Behaviour-Driven \
Development acceptance criteria. Use Given for context, When for the action and Then for \
observable outcomes. Keep each scenario focused on one behaviour, prefer concrete values over \
abstractions and use an examples table for data-driven scenarios. Reply with JSON only.";

pub const TESTS_SYSTEM: &str = "You are a senior test engineer. You turn acceptance criteria \
into short, reproducible manual test cases covering the happy path, failure handling, \
boundaries and security concerns. Reply with JSON only.";

const CRITERIA_FORMAT: &str = r#"{
  "feature_name": "Feature name derived from the story",
  "background": {"given": ["shared precondition"]},
  "scenarios": [
    {
      "title": "Behaviour under test",
      "given": ["precondition"],
      "when": ["action"],
      "then": ["expected outcome"],
      "tags": ["functional"],
      "examples": null
    }
  ]
}"#;

const TESTS_FORMAT: &str = r#"{
  "suite_name": "Test suite name",
  "scenarios": [
    {
      "title": "Short test title",
      "description": "One or two sentences",
      "type": "positive",
      "priority": "high",
      "preconditions": ["precondition"],
      "steps": [
        {"order": 1, "action": "what the tester does", "expected_result": "what they observe", "test_data": null}
      ],
      "acceptance_criteria_ref": "AC-001",
      "tags": ["smoke"],
      "estimated_duration_minutes": 5
    }
  ]
}"#;

pub fn criteria_prompt(story: &Story, context: Option<&str>, max_scenarios: usize) -> String {
    let description = if story.description.trim().is_empty() {
        "(no description provided)"
    } else {
        story.description.trim()
    };
    let context = context
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("(none)");
    format!(
        "Write acceptance criteria for the user story below.\n\n\
         Story: {key}\nTitle: {title}\n\nDescription:\n{description}\n\n\
         Additional context:\n{context}\n\n\
         Cover the main success path, alternative flows, error handling and edge cases that \
         matter for this story. Return at most {max_scenarios} scenarios, most important first.\n\n\
         Respond with a single JSON object in this format:\n{CRITERIA_FORMAT}\n",
        key = story.key,
        title = story.summary,
    )
}

/// Test request for one criteria scenario.
pub fn tests_prompt(
    story_key: &str,
    feature_name: &str,
    scenario: &Scenario,
    categories: &[TestType],
    max_tests: usize,
) -> String {
    let categories: Vec<&str> = categories.iter().map(|t| t.as_str()).collect();
    format!(
        "Write test cases for one acceptance criterion of story {story_key} ({feature_name}).\n\n\
         Criterion {id}:\n{gherkin}\n\n\
         Return at most {max_tests} test scenarios. Use only these types: {types}. \
         Always include at least one positive test and one security test. \
         Every test must set \"acceptance_criteria_ref\" to \"{id}\".\n\n\
         Respond with a single JSON object in this format:\n{TESTS_FORMAT}\n",
        id = scenario.id,
        gherkin = scenario.to_gherkin(),
        types = categories.join(", "),
    )
}

/// Regenerate a single test whose criteria reference did not resolve.
pub fn retarget_prompt(scenario: &Scenario, rejected_title: &str, bad_ref: &str) -> String {
    format!(
        "The test case \"{rejected_title}\" referenced acceptance criterion \"{bad_ref}\", which \
         does not exist. Rewrite it as exactly one test scenario for criterion {id}:\n{gherkin}\n\n\
         Set \"acceptance_criteria_ref\" to \"{id}\". Respond with a single JSON object in this \
         format:\n{TESTS_FORMAT}\n",
        id = scenario.id,
        gherkin = scenario.to_gherkin(),
    )
}

/// Follow-up after a response failed to parse.
pub fn repair_prompt(original_prompt: &str, error: &str) -> String {
    format!(
        "{original_prompt}\n\n\
         Your previous reply could not be used: {error}.\n\
         Reply again with valid JSON only: no markdown fences, no commentary, no trailing commas."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_prompt_embeds_story_and_limit() {
        let story = Story::free_text(Some("User login"), "As a user I want to log in");
        let prompt = criteria_prompt(&story, Some("SSO only"), 2);
        assert!(prompt.contains("Title: User login"));
        assert!(prompt.contains("As a user I want to log in"));
        assert!(prompt.contains("SSO only"));
        assert!(prompt.contains("at most 2 scenarios"));
    }

    #[test]
    fn tests_prompt_names_reference_and_categories() {
        let scenario = Scenario {
            id: "AC-002".into(),
            title: "Lockout".into(),
            given: vec![],
            when: vec!["five bad passwords".into()],
            then: vec!["account locked".into()],
            tags: vec![],
            examples: None,
        };
        let prompt = tests_prompt(
            "PROJ-1",
            "Login",
            &scenario,
            &[TestType::Positive, TestType::Security],
            3,
        );
        assert!(prompt.contains("\"acceptance_criteria_ref\" to \"AC-002\""));
        assert!(prompt.contains("positive, security"));
        assert!(!prompt.contains("negative,"));
    }

    #[test]
    fn repair_prompt_keeps_original_request() {
        let p = repair_prompt("ORIGINAL", "invalid JSON");
        assert!(p.starts_with("ORIGINAL"));
        assert!(p.contains("invalid JSON"));
    }
}
