//! Per-example verdicts and the aggregate report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{ExampleError, FailureKind};

/// Final verdict for one example file.
///
/// Created once per example and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    /// Path of the example file
    pub example_path: PathBuf,

    /// Whether the example verified
    pub passed: bool,

    /// Failure category, `None` when passed
    pub kind: Option<FailureKind>,

    /// Human-readable failure description
    pub detail: Option<String>,

    /// Unified diff of expected vs actual stdout (mismatches only)
    pub diff: Option<String>,

    /// Wall-clock time spent on this example, in milliseconds
    pub duration_ms: u64,
}

impl VerificationOutcome {
    /// Create a passing outcome.
    #[must_use]
    pub fn pass(example_path: &Path, duration: Duration) -> Self {
        debug_assert!(!example_path.as_os_str().is_empty(), "outcome without an example path");
        Self {
            example_path: example_path.to_path_buf(),
            passed: true,
            kind: None,
            detail: None,
            diff: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create a failing outcome from the error that stopped the example.
    #[must_use]
    pub fn fail(example_path: &Path, error: &ExampleError, duration: Duration) -> Self {
        debug_assert!(!example_path.as_os_str().is_empty(), "outcome without an example path");
        Self {
            example_path: example_path.to_path_buf(),
            passed: false,
            kind: Some(error.kind()),
            detail: Some(error.to_string()),
            diff: error.diff().map(str::to_string),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Format as a single-line status for logging.
    #[must_use]
    pub fn format_status(&self) -> String {
        if self.passed {
            format!("[PASS] {} ({}ms)", self.example_path.display(), self.duration_ms)
        } else {
            format!(
                "[FAIL] {} {}: {}",
                self.example_path.display(),
                self.kind.map(|k| k.name()).unwrap_or("unknown"),
                self.detail.as_deref().unwrap_or("unknown")
            )
        }
    }
}

/// Summary of a verification run.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    /// Number of examples that passed
    pub passed: u64,
    /// Number of examples that failed
    pub failed: u64,
    /// Total number of examples checked
    pub total: u64,
    /// Individual outcomes, sorted by path
    pub outcomes: Vec<VerificationOutcome>,
}

impl OutcomeSummary {
    /// Build a summary, sorting outcomes by path for stable output.
    #[must_use]
    pub fn from_outcomes(mut outcomes: Vec<VerificationOutcome>) -> Self {
        outcomes.sort_by(|a, b| a.example_path.cmp(&b.example_path));

        let passed = outcomes.iter().filter(|o| o.passed).count() as u64;
        let total = outcomes.len() as u64;
        debug_assert!(passed <= total);

        Self {
            passed,
            failed: total - passed,
            total,
            outcomes,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Format as a report string.
    #[must_use]
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        for outcome in &self.outcomes {
            report.push_str(&outcome.format_status());
            report.push('\n');
            if let Some(ref diff) = outcome.diff {
                for line in diff.lines() {
                    report.push_str("    ");
                    report.push_str(line);
                    report.push('\n');
                }
            }
        }

        report.push_str(&format!(
            "\nVerification Summary: {}/{} passed\n",
            self.passed, self.total
        ));

        report
    }

    /// Render the summary as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_pass() {
        let outcome = VerificationOutcome::pass(Path::new("c-printf.c"), Duration::from_millis(12));
        assert!(outcome.passed);
        assert!(outcome.kind.is_none());
        assert!(outcome.format_status().starts_with("[PASS] c-printf.c"));
    }

    #[test]
    fn test_outcome_fail_keeps_diff() {
        let error = ExampleError::VerificationMismatch {
            diff: "--- expected\n+++ actual\n-a\n+b\n".into(),
        };
        let outcome = VerificationOutcome::fail(Path::new("x.c"), &error, Duration::ZERO);
        assert!(!outcome.passed);
        assert_eq!(outcome.kind, Some(FailureKind::VerificationMismatch));
        assert!(outcome.diff.as_deref().unwrap().contains("+b"));
        assert!(outcome.format_status().contains("VerificationMismatch"));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "outcome without an example path")]
    fn test_outcome_requires_path() {
        let _ = VerificationOutcome::pass(Path::new(""), Duration::ZERO);
    }

    #[test]
    fn test_summary_sorts_and_counts() {
        let error = ExampleError::CompileError {
            message: "error: expected ';'".into(),
            stderr: String::new(),
        };
        let summary = OutcomeSummary::from_outcomes(vec![
            VerificationOutcome::fail(Path::new("b.c"), &error, Duration::ZERO),
            VerificationOutcome::pass(Path::new("a.c"), Duration::ZERO),
        ]);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_passed());
        assert_eq!(summary.outcomes[0].example_path, PathBuf::from("a.c"));
        assert!(summary.format_report().contains("1/2 passed"));
    }

    #[test]
    fn test_summary_json() {
        let summary = OutcomeSummary::from_outcomes(vec![VerificationOutcome::pass(
            Path::new("a.c"),
            Duration::ZERO,
        )]);
        let json = summary.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["outcomes"][0]["passed"], true);
        assert_eq!(parsed["total"], 1);
    }
}
