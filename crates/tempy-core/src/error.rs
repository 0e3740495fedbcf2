//! Example-local failures.
//!
//! Every variant is caught at the per-example boundary and converted into
//! a failed [`VerificationOutcome`](crate::VerificationOutcome); none of
//! them stops the overall run.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure of one example at one pipeline stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExampleError {
    #[error("malformed schema{}: {message}", .line.map(|l| format!(" (line {})", l)).unwrap_or_default())]
    MalformedSchema { line: Option<usize>, message: String },

    #[error("cannot satisfy argument `{name}`: {reason}")]
    UnsatisfiableSpec { name: String, reason: String },

    #[error("unresolved placeholder `${{{name}}}` on template line {line}")]
    UnresolvedPlaceholder { name: String, line: usize },

    #[error("no toolchain for `{tag}`: {reason}")]
    ToolchainUnavailable { tag: String, reason: String },

    #[error("compile failed: {message}")]
    CompileError { message: String, stderr: String },

    #[error("{stage} timed out after {after:?}")]
    RuntimeTimeout {
        stage: String,
        after: Duration,
        /// Pid of the killed process, if it was spawned
        pid: Option<u32>,
    },

    #[error("program exited with {}: {message}", .code.map(|c| format!("code {}", c)).unwrap_or_else(|| "a signal".to_string()))]
    RuntimeError { code: Option<i32>, message: String },

    #[error("stdout does not match the expected output")]
    VerificationMismatch { diff: String },
}

impl ExampleError {
    pub fn malformed(line: Option<usize>, message: impl Into<String>) -> Self {
        ExampleError::MalformedSchema {
            line,
            message: message.into(),
        }
    }

    pub fn unsatisfiable(name: &str, reason: impl Into<String>) -> Self {
        ExampleError::UnsatisfiableSpec {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// The outcome kind this failure maps to.
    pub fn kind(&self) -> FailureKind {
        match self {
            ExampleError::MalformedSchema { .. } => FailureKind::MalformedSchema,
            ExampleError::UnsatisfiableSpec { .. } => FailureKind::UnsatisfiableSpec,
            ExampleError::UnresolvedPlaceholder { .. } => FailureKind::UnresolvedPlaceholder,
            ExampleError::ToolchainUnavailable { .. } => FailureKind::ToolchainUnavailable,
            ExampleError::CompileError { .. } => FailureKind::CompileError,
            ExampleError::RuntimeTimeout { .. } => FailureKind::RuntimeTimeout,
            ExampleError::RuntimeError { .. } => FailureKind::RuntimeError,
            ExampleError::VerificationMismatch { .. } => FailureKind::VerificationMismatch,
        }
    }

    /// Unified diff carried by a mismatch.
    pub fn diff(&self) -> Option<&str> {
        match self {
            ExampleError::VerificationMismatch { diff } => Some(diff),
            _ => None,
        }
    }
}

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    MalformedSchema,
    UnsatisfiableSpec,
    UnresolvedPlaceholder,
    ToolchainUnavailable,
    CompileError,
    RuntimeTimeout,
    RuntimeError,
    VerificationMismatch,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::MalformedSchema => "MalformedSchema",
            FailureKind::UnsatisfiableSpec => "UnsatisfiableSpec",
            FailureKind::UnresolvedPlaceholder => "UnresolvedPlaceholder",
            FailureKind::ToolchainUnavailable => "ToolchainUnavailable",
            FailureKind::CompileError => "CompileError",
            FailureKind::RuntimeTimeout => "RuntimeTimeout",
            FailureKind::RuntimeError => "RuntimeError",
            FailureKind::VerificationMismatch => "VerificationMismatch",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
