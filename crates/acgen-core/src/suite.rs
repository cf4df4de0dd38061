use crate::error::{AcgenError, ErrorKind, Result};
use crate::parse::{generate_parsed, parse_tests, ParsedTest};
use crate::prompts;
use crate::provider::ProviderAdapter;
use crate::types::{test_id, AcceptanceCriteria, Scenario, TestSuite, TestType};
use serde::{Deserialize, Serialize};

pub const MAX_TESTS_PER_CRITERION: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOptions {
    pub include_negative: bool,
    pub include_edge_cases: bool,
    pub max_scenarios_per_criteria: usize,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            include_negative: true,
            include_edge_cases: true,
            max_scenarios_per_criteria: 3,
        }
    }
}

impl TestOptions {
    /// Requested categories. Positive and security are always present;
    /// performance is never requested.
    pub fn categories(&self) -> Vec<TestType> {
        let mut types = vec![TestType::Positive];
        if self.include_negative {
            types.push(TestType::Negative);
        }
        if self.include_edge_cases {
            types.push(TestType::EdgeCase);
        }
        types.push(TestType::Security);
        types
    }

    fn validate(&self) -> Result<()> {
        if (1..=MAX_TESTS_PER_CRITERION).contains(&self.max_scenarios_per_criteria) {
            Ok(())
        } else {
            Err(AcgenError::InvalidRequest(format!(
                "max_scenarios_per_criteria must be between 1 and {MAX_TESTS_PER_CRITERION}, got {}",
                self.max_scenarios_per_criteria
            )))
        }
    }
}

/// Turns acceptance criteria into a traceable test suite.
#[derive(Debug, Clone)]
pub struct TestGenerator {
    provider: ProviderAdapter,
}

impl TestGenerator {
    pub fn new(provider: ProviderAdapter) -> Self {
        Self { provider }
    }

    /// One provider request per criteria scenario. Every returned test
    /// references the criterion it was generated for; tests ids run `TS-001`
    /// upwards across the whole suite.
    pub async fn generate(
        &self,
        criteria: &AcceptanceCriteria,
        options: &TestOptions,
    ) -> Result<TestSuite> {
        options.validate()?;
        if criteria.scenarios.is_empty() {
            return Err(AcgenError::InvalidRequest(
                "acceptance criteria contain no scenarios".into(),
            ));
        }

        tracing::info!(
            issue = %criteria.story_key,
            provider = %self.provider.kind(),
            criteria = criteria.scenarios.len(),
            per_criterion = options.max_scenarios_per_criteria,
            "generating test scenarios"
        );

        let categories = options.categories();
        let mut suite_name = None;
        let mut accepted: Vec<ParsedTest> = Vec::new();

        for scenario in &criteria.scenarios {
            let prompt = prompts::tests_prompt(
                &criteria.story_key,
                &criteria.feature_name,
                scenario,
                &categories,
                options.max_scenarios_per_criteria,
            );
            let parsed = generate_parsed(
                self.provider.clone(),
                prompts::TESTS_SYSTEM,
                prompt,
                "test scenarios",
                parse_tests,
            )
            .await?;
            if suite_name.is_none() {
                suite_name = parsed.suite_name;
            }

            let mut kept = 0;
            for test in parsed.tests {
                if kept == options.max_scenarios_per_criteria {
                    break;
                }
                if !categories.contains(&test.test_type) {
                    tracing::debug!(
                        criterion = %scenario.id,
                        test_type = %test.test_type,
                        "dropping test of unrequested type"
                    );
                    continue;
                }
                let test = if test.acceptance_criteria_ref == scenario.id {
                    test
                } else {
                    match self.retarget(scenario, &categories, test).await? {
                        Some(t) => t,
                        None => continue,
                    }
                };
                accepted.push(test);
                kept += 1;
            }

            if kept == 0 {
                tracing::warn!(criterion = %scenario.id, "no usable test scenarios for criterion");
            }
        }

        let scenarios = accepted
            .into_iter()
            .enumerate()
            .map(|(i, t)| t.into_scenario(test_id(i)))
            .collect();
        let suite_name =
            suite_name.unwrap_or_else(|| format!("Test Suite for {}", criteria.story_key));
        let suite = TestSuite::new(
            criteria.story_key.clone(),
            suite_name,
            scenarios,
            self.provider.name(),
        );

        tracing::info!(
            issue = %criteria.story_key,
            total = suite.total_scenarios(),
            positive = suite.positive_count(),
            negative = suite.negative_count(),
            edge_case = suite.edge_case_count(),
            security = suite.security_count(),
            "test suite generated"
        );
        Ok(suite)
    }

    /// Single regeneration for a test whose ref is not its own criterion. `None` means
    /// the test is dropped.
    async fn retarget(
        &self,
        scenario: &Scenario,
        categories: &[TestType],
        orphan: ParsedTest,
    ) -> Result<Option<ParsedTest>> {
        tracing::warn!(
            criterion = %scenario.id,
            bad_ref = %orphan.acceptance_criteria_ref,
            title = orphan.title(),
            "orphan criteria reference, regenerating test"
        );
        let prompt = prompts::retarget_prompt(scenario, orphan.title(), &orphan.acceptance_criteria_ref);
        let parsed = match generate_parsed(
            self.provider.clone(),
            prompts::TESTS_SYSTEM,
            prompt,
            "test scenarios",
            parse_tests,
        )
        .await
        {
            Ok(parsed) => parsed,
            Err(e) if e.kind() == ErrorKind::GenerationParseError => {
                tracing::warn!(criterion = %scenario.id, error = %e, "regeneration unparseable, dropping test");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let replacement = parsed
            .tests
            .into_iter()
            .find(|t| categories.contains(&t.test_type));
        match replacement {
            Some(t) if t.acceptance_criteria_ref == scenario.id => Ok(Some(t)),
            Some(t) => {
                tracing::warn!(
                    criterion = %scenario.id,
                    bad_ref = %t.acceptance_criteria_ref,
                    "regenerated test still orphaned, dropping"
                );
                Ok(None)
            }
            None => {
                tracing::warn!(criterion = %scenario.id, "regeneration returned no usable test, dropping");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GenerationConfig;
    use crate::testing::{sample_criteria, test_json, tests_reply, ScriptedProvider};
    use acgen_llm::ProviderKind;
    use std::sync::Arc;

    fn generator(provider: Arc<ScriptedProvider>) -> TestGenerator {
        TestGenerator::new(ProviderAdapter::new(provider, GenerationConfig::default()))
    }

    #[tokio::test]
    async fn one_request_per_criterion_with_sequential_ids() {
        let criteria = sample_criteria("PROJ-1", 2);
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::Gemini)
                .reply(tests_reply(&[
                    test_json("happy", "positive", "AC-001"),
                    test_json("injection", "security", "AC-001"),
                ]))
                .reply(tests_reply(&[
                    test_json("bad input", "negative", "AC-002"),
                    test_json("max length", "edge_case", "AC-002"),
                ])),
        );
        let suite = generator(provider.clone())
            .generate(&criteria, &TestOptions::default())
            .await
            .unwrap();

        assert_eq!(provider.prompts().len(), 2);
        let ids: Vec<&str> = suite.scenarios().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["TS-001", "TS-002", "TS-003", "TS-004"]);
        assert_eq!(suite.total_scenarios(), 4);
        assert_eq!(
            suite.positive_count()
                + suite.negative_count()
                + suite.edge_case_count()
                + suite.security_count(),
            suite.total_scenarios()
        );
        assert!(suite.orphan_refs(&criteria).is_empty());
    }

    #[tokio::test]
    async fn gated_and_performance_types_are_filtered() {
        let criteria = sample_criteria("PROJ-1", 1);
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::Gemini).reply(tests_reply(&[
            test_json("ok", "positive", "AC-001"),
            test_json("neg", "negative", "AC-001"),
            test_json("edge", "edge_case", "AC-001"),
            test_json("load", "performance", "AC-001"),
            test_json("authz", "security", "AC-001"),
        ])));
        let options = TestOptions {
            include_negative: false,
            include_edge_cases: false,
            max_scenarios_per_criteria: 5,
        };
        let suite = generator(provider.clone()).generate(&criteria, &options).await.unwrap();
        assert_eq!(suite.total_scenarios(), 2);
        assert_eq!(suite.negative_count(), 0);
        assert_eq!(suite.edge_case_count(), 0);
        assert_eq!(suite.performance_count(), 0);
        assert_eq!(suite.security_count(), 1);
        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("positive, security"));
    }

    #[tokio::test]
    async fn per_criterion_limit_is_enforced() {
        let criteria = sample_criteria("PROJ-1", 1);
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::Gemini).reply(tests_reply(&[
            test_json("a", "positive", "AC-001"),
            test_json("b", "positive", "AC-001"),
            test_json("c", "security", "AC-001"),
        ])));
        let options = TestOptions {
            max_scenarios_per_criteria: 2,
            ..TestOptions::default()
        };
        let suite = generator(provider).generate(&criteria, &options).await.unwrap();
        assert_eq!(suite.total_scenarios(), 2);
    }

    #[tokio::test]
    async fn orphan_ref_is_regenerated_once() {
        let criteria = sample_criteria("PROJ-1", 1);
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::Gemini)
                .reply(tests_reply(&[
                    test_json("good", "positive", "AC-001"),
                    test_json("lost", "security", "AC-042"),
                ]))
                .reply(tests_reply(&[test_json("found", "security", "AC-001")])),
        );
        let suite = generator(provider.clone())
            .generate(&criteria, &TestOptions::default())
            .await
            .unwrap();
        let titles: Vec<&str> = suite.scenarios().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["good", "found"]);
        assert_eq!(provider.prompts().len(), 2);
        assert!(provider.prompts()[1].contains("AC-042"));
    }

    #[tokio::test]
    async fn ref_to_a_sibling_criterion_is_regenerated() {
        let criteria = sample_criteria("PROJ-1", 2);
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::Gemini)
                .reply(tests_reply(&[test_json("for AC1 but says AC2", "positive", "AC-002")]))
                .reply(tests_reply(&[test_json("for AC1", "positive", "AC-001")]))
                .reply(tests_reply(&[test_json("for AC2", "negative", "AC-002")])),
        );
        let suite = generator(provider.clone())
            .generate(&criteria, &TestOptions::default())
            .await
            .unwrap();

        assert_eq!(provider.prompts().len(), 3);
        let refs: Vec<(&str, &str)> = suite
            .scenarios()
            .iter()
            .map(|s| (s.title.as_str(), s.acceptance_criteria_ref.as_str()))
            .collect();
        assert_eq!(refs, vec![("for AC1", "AC-001"), ("for AC2", "AC-002")]);
    }

    #[tokio::test]
    async fn still_orphaned_test_is_dropped() {
        let criteria = sample_criteria("PROJ-1", 1);
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::Gemini)
                .reply(tests_reply(&[
                    test_json("good", "positive", "AC-001"),
                    test_json("lost", "security", "AC-042"),
                ]))
                .reply(tests_reply(&[test_json("still lost", "security", "AC-043")])),
        );
        let suite = generator(provider.clone())
            .generate(&criteria, &TestOptions::default())
            .await
            .unwrap();
        assert_eq!(suite.total_scenarios(), 1);
        assert_eq!(suite.scenarios()[0].title, "good");
        assert!(suite.orphan_refs(&criteria).is_empty());
        assert_eq!(provider.prompts().len(), 2);
    }

    #[tokio::test]
    async fn parse_failures_get_one_repair_per_request() {
        let criteria = sample_criteria("PROJ-1", 1);
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::Gemini)
                .reply("```json\n{\"scenarios\": [\n```")
                .reply(tests_reply(&[test_json("ok", "positive", "AC-001")])),
        );
        let suite = generator(provider)
            .generate(&criteria, &TestOptions::default())
            .await
            .unwrap();
        assert_eq!(suite.total_scenarios(), 1);
    }

    #[tokio::test]
    async fn invalid_limits_are_rejected() {
        let criteria = sample_criteria("PROJ-1", 1);
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::Gemini));
        let options = TestOptions {
            max_scenarios_per_criteria: 11,
            ..TestOptions::default()
        };
        let err = generator(provider).generate(&criteria, &options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}
