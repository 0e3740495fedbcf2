//! Verifier: expected output and exact-byte comparison.

use tempy_core::{ExampleDocument, ExampleError, Invocation};
use tempy_template::{render_template, render_value, EscapeStyle, RenderOptions};

use crate::diff::unified_diff;
use crate::execute::ExecutionResult;

/// Stdout an example must produce for `invocation`.
///
/// With `expect = '...'` metadata that text is rendered against the same
/// invocation; otherwise it is the invocation's values in declaration
/// order, joined by one space. Strings are never escaped here, since the
/// program prints the value and not its source literal.
pub fn expected_output(
    document: &ExampleDocument,
    invocation: &Invocation,
    options: RenderOptions,
) -> Result<String, ExampleError> {
    let options = RenderOptions {
        escape: EscapeStyle::Raw,
        ..options
    };

    match document.meta.expect {
        Some(ref expect) => render_template(expect, &document.schema, invocation, options),
        None => Ok(invocation
            .iter()
            .map(|(_, value)| render_value(value, options))
            .collect::<Vec<_>>()
            .join(" ")),
    }
}

/// Compare captured stdout with `expected`, byte for byte.
pub fn verify_output(expected: &str, result: &ExecutionResult) -> Result<(), ExampleError> {
    if result.stdout == expected.as_bytes() {
        return Ok(());
    }

    let actual = String::from_utf8_lossy(&result.stdout);
    let mut diff = unified_diff(expected, &actual);
    if diff.is_empty() {
        diff = "stdout differs from the expected output in non-UTF-8 bytes\n".to_string();
    }
    Err(ExampleError::VerificationMismatch { diff })
}
