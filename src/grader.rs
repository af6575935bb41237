use crate::error::Error;
use crate::executor::{Executor, Invocation, Prepared, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Data structure representing a single test case.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestCase {
    pub description: String,
    pub input: String,
    pub expected_output: String,
}

/// Mapping from question ids to their test cases.
pub type TestCasesMap = HashMap<String, Vec<TestCase>>;

pub async fn load_test_cases(path: &Path) -> Result<TestCasesMap, Error> {
    let fail = |reason: String| Error::TestCases {
        path: path.to_path_buf(),
        reason,
    };
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| fail(e.to_string()))?;
    serde_json::from_str(&data).map_err(|e| fail(e.to_string()))
}

#[derive(Serialize, Debug)]
pub struct CaseReport {
    pub description: String,
    pub passed: bool,
    pub output: String,
    pub error: String,
}

#[derive(Serialize, Debug)]
pub struct GradeReport {
    pub question: String,
    pub passed: usize,
    pub total: usize,
    pub percentage: f64,
    pub compile_error: Option<String>,
    pub results: Vec<CaseReport>,
}

/// A case passes when the program finished in time and its trimmed stdout
/// contains the trimmed expected output.
fn passes(case: &TestCase, status: RunStatus, output: &str) -> bool {
    matches!(status, RunStatus::Completed(_))
        && output.trim().contains(case.expected_output.trim())
}

/// Builds the submission once and runs it against every case in order.
pub async fn grade(
    executor: &Executor,
    invocation: &Invocation,
    question: &str,
    cases: &[TestCase],
) -> Result<GradeReport, Error> {
    let mut report = GradeReport {
        question: question.to_string(),
        passed: 0,
        total: cases.len(),
        percentage: 0.0,
        compile_error: None,
        results: Vec::with_capacity(cases.len()),
    };

    let program = match executor.prepare(invocation).await? {
        Prepared::Ready(program) => program,
        Prepared::Failed(result) => {
            report.compile_error = Some(result.error);
            return Ok(report);
        }
    };

    log::debug!(
        "invocation {}: grading {} cases in {}",
        program.id(),
        cases.len(),
        program.workspace().display()
    );
    for case in cases {
        let result = program.run(&case.input).await?;
        let passed = passes(case, result.status, &result.output);
        report.results.push(CaseReport {
            description: case.description.clone(),
            passed,
            output: result.output,
            error: result.error,
        });
    }
    program.close().await;

    report.passed = report.results.iter().filter(|r| r.passed).count();
    if report.total > 0 {
        report.percentage = report.passed as f64 / report.total as f64 * 100.0;
    }
    log::info!(
        "invocation {}: passed {}/{} cases of {}",
        invocation.id,
        report.passed,
        report.total,
        question
    );
    Ok(report)
}
