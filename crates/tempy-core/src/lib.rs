//! # tempy-core
//!
//! Core types for schema-driven template examples.
//!
//! An example file pairs an argument schema with a source template:
//!
//! ```text
//! <<<
//! import argparse
//!
//! name = 'printf'
//! parser = argparse.ArgumentParser()
//! parser.add_argument('message', type=str, default='Hello World')
//! >>>
//! #include <stdio.h>
//!
//! int main(int argc, char **argv) {
//!     printf("${message}");
//!     return 0;
//! }
//! ```
//!
//! The verification pipeline runs each example through five stages:
//!
//! | Stage | Input | Output | Failure |
//! |-------|-------|--------|---------|
//! | parse | file text | [`ExampleDocument`] | `MalformedSchema` |
//! | synthesize | schema | [`Invocation`] | `UnsatisfiableSpec` |
//! | render | body + invocation | rendered source | `UnresolvedPlaceholder` |
//! | execute | rendered source | stdout/stderr/exit | `ToolchainUnavailable`, `CompileError`, `RuntimeTimeout`, `RuntimeError` |
//! | verify | stdout | [`VerificationOutcome`] | `VerificationMismatch` |
//!
//! Every failure is local to its example and ends up as one outcome.

pub mod error;
pub mod outcome;
pub mod schema;
pub mod value;

pub use error::{ExampleError, FailureKind};
pub use outcome::{OutcomeSummary, VerificationOutcome};
pub use schema::{ArgAction, ArgumentSpec, ExampleDocument, ExampleMeta, Invocation};
pub use value::{ArgType, Value};
