use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broadcast::{BroadcastHub, Topic};
use crate::database::{Catalog, ExecutionResult, TestCase};
use crate::error::{EngineError, Result};
use crate::execution::Executor;
use crate::session::SessionRegistry;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

pub const NO_TEST_CASES: &str = "no test cases";

/// What each run receives on stdin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdinSource {
    /// Every run gets empty stdin, so all cases see the same output.
    #[default]
    Empty,
    /// Each run gets its test case's input.
    TestInput,
}

/// Per-case entry shown to participants. Hidden cases expose only
/// id, pass flag, points and error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseSummary {
    pub test_case_id: Uuid,
    pub passed: bool,
    pub is_hidden: bool,
    pub points: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub passed_count: usize,
    pub total_count: usize,
    pub earned_points: i64,
    pub total_points: i64,
    pub score_percentage: f64,
    pub test_results: Vec<TestCaseSummary>,
}

impl EvaluationReport {
    fn empty_suite() -> Self {
        EvaluationReport {
            success: false,
            message: Some(NO_TEST_CASES.to_string()),
            passed_count: 0,
            total_count: 0,
            earned_points: 0,
            total_points: 0,
            score_percentage: 0.0,
            test_results: Vec::new(),
        }
    }
}

/// Trim, then collapse whitespace runs to a single space.
pub fn normalize_output(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

pub fn outputs_match(actual: Option<&str>, expected: Option<&str>) -> bool {
    match (actual, expected) {
        (Some(actual), Some(expected)) => normalize_output(actual) == normalize_output(expected),
        _ => false,
    }
}

pub fn score_percentage(earned: i64, total: i64) -> f64 {
    if total > 0 {
        100.0 * earned as f64 / total as f64
    } else {
        0.0
    }
}

/// Deterministic run order: creation time, then id.
pub fn order_test_cases(cases: &mut [TestCase]) {
    cases.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn summarize(case: &TestCase, passed: bool, actual: Option<&str>, error: Option<&str>) -> TestCaseSummary {
    let visible = !case.is_hidden;
    TestCaseSummary {
        test_case_id: case.id,
        passed,
        is_hidden: case.is_hidden,
        points: case.points,
        input: visible.then(|| case.input.clone()),
        expected_output: if visible { case.expected_output.clone() } else { None },
        actual_output: if visible { actual.map(String::from) } else { None },
        description: if visible { case.description.clone() } else { None },
        error: if passed { None } else { error.map(String::from) },
    }
}

/// Runs a session's code against its question's test cases and scores it.
pub struct Evaluator {
    registry: Arc<SessionRegistry>,
    catalog: Arc<dyn Catalog>,
    executor: Arc<dyn Executor>,
    hub: Arc<BroadcastHub>,
    stdin: StdinSource,
}

impl Evaluator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        catalog: Arc<dyn Catalog>,
        executor: Arc<dyn Executor>,
        hub: Arc<BroadcastHub>,
        stdin: StdinSource,
    ) -> Self {
        if stdin == StdinSource::Empty {
            warn!("Test-case input is not passed to the executor; every case runs with empty stdin");
        }
        Self {
            registry,
            catalog,
            executor,
            hub,
            stdin,
        }
    }

    /// Runs every test case in order. A failing executor call is recorded
    /// as a failed case; only lookup failures abort the evaluation.
    ///
    /// Runs on one session are serialized, so the stored score always comes
    /// from the run that started last. The session lock is not held while
    /// cases run: code edits made meanwhile are kept and the report reflects
    /// the code as it was when the run began.
    pub async fn evaluate(&self, session_id: Uuid) -> Result<EvaluationReport> {
        info!("🧪 Evaluating session: {}", session_id);

        let _run = self.registry.exclusive_evaluation(session_id).await?;
        let session = self.registry.get(session_id).await?;
        let question_id = session
            .question_id
            .ok_or_else(|| EngineError::not_found("Question", format!("(none assigned to session {})", session_id)))?;

        let mut cases = self.catalog.test_cases_for(question_id).await?;
        if cases.is_empty() {
            warn!("Question {} has no test cases; session {} left unscored", question_id, session_id);
            return Ok(EvaluationReport::empty_suite());
        }
        order_test_cases(&mut cases);

        let mut test_results = Vec::with_capacity(cases.len());
        let mut passed_count = 0;
        let mut earned_points: i64 = 0;
        let mut total_points: i64 = 0;

        for case in &cases {
            total_points += i64::from(case.points);

            let stdin = match self.stdin {
                StdinSource::Empty => "",
                StdinSource::TestInput => case.input.as_str(),
            };

            let (outcome, actual_output, error_message) =
                match self.executor.submit(&session.code, &session.language, stdin).await {
                    Ok(outcome) => {
                        let actual = outcome.combined_output();
                        let error = outcome.error_message();
                        (Some(outcome), Some(actual), error)
                    }
                    Err(e) => {
                        warn!("Executor failed on test case {} of session {}: {}", case.id, session_id, e);
                        (None, None, Some(format!("Execution error: {}", e)))
                    }
                };

            let passed = outputs_match(actual_output.as_deref(), case.expected_output.as_deref());
            if passed {
                passed_count += 1;
                earned_points += i64::from(case.points);
            }

            let outcome = outcome.unwrap_or_default();
            let record = ExecutionResult {
                id: Uuid::new_v4(),
                session_id,
                test_case_id: case.id,
                passed,
                actual_output: actual_output.clone(),
                error_message: error_message.clone(),
                stdout: outcome.stdout,
                stderr: outcome.stderr,
                compile_output: outcome.compile_output,
                status_description: Some(outcome.status_description).filter(|s| !s.is_empty()),
                executed_at: Utc::now(),
            };
            self.registry.record_result(&record).await.map_err(|e| {
                error!("Failed to record result for test case {}: {}", case.id, e);
                e
            })?;

            test_results.push(summarize(case, passed, actual_output.as_deref(), error_message.as_deref()));
        }

        let report = EvaluationReport {
            success: true,
            message: None,
            passed_count,
            total_count: cases.len(),
            earned_points,
            total_points,
            score_percentage: score_percentage(earned_points, total_points),
            test_results,
        };

        let mut entry = self.registry.checkout(session_id).await?;
        entry.score = Some(report.score_percentage);
        entry.commit().await?;
        self.hub.publish(Topic::evaluation(session_id), &report);
        drop(entry);

        info!(
            "✅ Session {} scored {:.2}% ({}/{} cases, {}/{} points)",
            session_id, report.score_percentage, passed_count, report.total_count, earned_points, total_points
        );
        Ok(report)
    }

    pub async fn list_results(&self, session_id: Uuid) -> Result<Vec<ExecutionResult>> {
        self.registry.results(session_id).await
    }
}
