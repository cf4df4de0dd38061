//! Text renderings of generated artefacts: Gherkin feature files and Jira
//! wiki markup for descriptions, comments and subtask bodies.

use crate::types::{AcceptanceCriteria, Scenario, TestScenario, TestSuite};
use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Gherkin
// ---------------------------------------------------------------------------

impl Scenario {
    pub fn to_gherkin(&self) -> String {
        let mut lines = Vec::new();
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|t| format!("@{t}")).collect();
            lines.push(tags.join(" "));
        }
        lines.push(format!("Scenario: {}", self.title));
        for (keyword, steps) in [("Given", &self.given), ("When", &self.when), ("Then", &self.then)] {
            for (i, step) in steps.iter().enumerate() {
                let kw = if i == 0 { keyword } else { "And" };
                lines.push(format!("  {kw} {step}"));
            }
        }
        if let Some(table) = self.examples.as_ref().filter(|t| !t.is_empty()) {
            lines.push(String::new());
            lines.push("  Examples:".to_string());
            let headers: Vec<&str> = table.keys().map(String::as_str).collect();
            lines.push(format!("    | {} |", headers.join(" | ")));
            let rows = table.values().map(Vec::len).max().unwrap_or(0);
            for row in 0..rows {
                let cells: Vec<&str> = table
                    .values()
                    .map(|column| column.get(row).map(String::as_str).unwrap_or(""))
                    .collect();
                lines.push(format!("    | {} |", cells.join(" | ")));
            }
        }
        lines.join("\n")
    }
}

impl AcceptanceCriteria {
    /// Full feature file text.
    pub fn to_gherkin(&self) -> String {
        let mut lines = vec![format!("Feature: {}", self.feature_name), String::new()];
        if let Some(bg) = self.background.as_ref().filter(|b| !b.given.is_empty()) {
            lines.push("  Background:".to_string());
            for (i, step) in bg.given.iter().enumerate() {
                let kw = if i == 0 { "Given" } else { "And" };
                lines.push(format!("    {kw} {step}"));
            }
            lines.push(String::new());
        }
        for scenario in &self.scenarios {
            lines.push(format!("  {}", scenario.to_gherkin().replace('\n', "\n  ")));
            lines.push(String::new());
        }
        lines.join("\n").trim_end().to_string() + "\n"
    }
}

// ---------------------------------------------------------------------------
// Jira wiki markup
// ---------------------------------------------------------------------------

/// Criteria block for a description or comment.
pub fn criteria_markup(criteria: &AcceptanceCriteria) -> String {
    format!(
        "h2. Acceptance Criteria (Generated)\n\n{{code:language=gherkin}}\n{}{{code}}\n\n_Generated at {} using {}_",
        criteria.to_gherkin(),
        criteria.generated_at.to_rfc3339(),
        provider_label(&criteria.provider),
    )
}

/// Subtask body for one test scenario.
pub fn test_scenario_markup(scenario: &TestScenario) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "h3. {}", scenario.title);
    out.push('\n');
    let _ = writeln!(out, "*Type:* {}", scenario.test_type);
    let _ = writeln!(out, "*Priority:* {}", scenario.priority);
    let _ = writeln!(out, "*Linked to:* {}", scenario.acceptance_criteria_ref);
    if let Some(minutes) = scenario.estimated_duration_minutes {
        let _ = writeln!(out, "*Est. Duration:* {minutes} minutes");
    }
    if !scenario.description.is_empty() {
        out.push('\n');
        out.push_str("h4. Description\n");
        let _ = writeln!(out, "{}", scenario.description);
    }
    if !scenario.preconditions.is_empty() {
        out.push('\n');
        out.push_str("h4. Preconditions\n");
        for pre in &scenario.preconditions {
            let _ = writeln!(out, "* {pre}");
        }
    }
    out.push('\n');
    out.push_str("h4. Test Steps\n");
    out.push_str("||Step||Action||Expected Result||Test Data||\n");
    for step in &scenario.steps {
        let _ = writeln!(
            out,
            "|{}|{}|{}|{}|",
            step.order,
            table_cell(&step.action),
            table_cell(&step.expected_result),
            step.test_data.as_deref().map(table_cell).unwrap_or_else(|| "-".to_string()),
        );
    }
    if !scenario.tags.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "*Tags:* {}", scenario.tags.join(", "));
    }
    out.trim_end().to_string()
}

/// Whole suite as one description block or comment.
pub fn test_suite_markup(suite: &TestSuite) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "h2. Test Scenarios for {}", suite.story_key);
    out.push('\n');
    let _ = writeln!(out, "*Total Scenarios:* {}", suite.total_scenarios());
    let _ = writeln!(out, "*Positive:* {}", suite.positive_count());
    let _ = writeln!(out, "*Negative:* {}", suite.negative_count());
    let _ = writeln!(out, "*Edge Cases:* {}", suite.edge_case_count());
    let _ = writeln!(out, "*Security:* {}", suite.security_count());
    out.push_str("\n----\n\n");
    for scenario in suite.scenarios() {
        out.push_str(&test_scenario_markup(scenario));
        out.push_str("\n\n----\n\n");
    }
    let _ = write!(
        out,
        "_Generated at {} using {}_",
        suite.generated_at.to_rfc3339(),
        provider_label(&suite.provider)
    );
    out
}

/// Jira tables split cells on `|`; escape it so model text cannot add columns.
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn provider_label(provider: &str) -> &str {
    if provider.is_empty() {
        "unknown provider"
    } else {
        provider
    }
}
