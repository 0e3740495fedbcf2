//! # tempy-runner
//!
//! Execution and verification of template examples.
//!
//! Each example goes through the same pipeline, independently of the others:
//!
//! | Step | Module | Failure |
//! |------|--------|---------|
//! | parse header | `tempy_template::parser` | MalformedSchema |
//! | synthesize values | `tempy_template::synth` | UnsatisfiableSpec |
//! | render body | `tempy_template::render` | UnresolvedPlaceholder |
//! | compile + run | [`execute`] | ToolchainUnavailable, CompileError, RuntimeTimeout, RuntimeError |
//! | compare stdout | [`verify`] | VerificationMismatch |
//!
//! Failures never escape the example: [`VerificationEngine`] turns each one
//! into a failed [`VerificationOutcome`](tempy_core::VerificationOutcome) and
//! carries on with the next file.

pub mod diff;
pub mod engine;
pub mod execute;
pub mod toolchain;
pub mod verify;

pub use engine::{EngineConfig, VerificationEngine};
pub use execute::{execute, invocation_args, ExecutionLimits, ExecutionResult};
pub use toolchain::{RegistryError, Toolchain, ToolchainRegistry};
pub use verify::{expected_output, verify_output};
