//! Template substitutor.
//!
//! Replaces every `${identifier}` in a template body with the textual value
//! from an [`Invocation`]. Rendering is pure: the template is never mutated
//! and the same inputs always produce byte-identical output.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tempy_core::{ArgumentSpec, ExampleDocument, ExampleError, Invocation, Value};

/// How string values are escaped when inserted into source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscapeStyle {
    /// Insert strings verbatim.
    #[default]
    Raw,
    /// Backslash-escape for C-family string literals.
    C,
}

/// How bool values are spelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolStyle {
    /// `true` / `false`
    #[default]
    Lower,
    /// `True` / `False`
    Python,
    /// `1` / `0`
    Int,
}

/// Target-language lexical rules for rendered values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub escape: EscapeStyle,
    pub bools: BoolStyle,
}

/// A `${name}` occurrence in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// 1-based line number in the template
    pub line: usize,
    /// Byte range of the whole `${name}` marker
    pub span: std::ops::Range<usize>,
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Find all placeholders in `body`, in order of appearance.
pub fn placeholders(body: &str) -> Vec<Placeholder> {
    let mut line = 1;
    let mut scanned = 0;

    placeholder_regex()
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            line += body[scanned..whole.start()].matches('\n').count();
            scanned = whole.start();
            Some(Placeholder {
                name: caps[1].to_string(),
                line,
                span: whole.range(),
            })
        })
        .collect()
}

/// Text inserted for `value` under `options`.
pub fn render_value(value: &Value, options: RenderOptions) -> String {
    match value {
        Value::String(s) => match options.escape {
            EscapeStyle::Raw => s.clone(),
            EscapeStyle::C => escape_c(s),
        },
        Value::Bool(b) => match (options.bools, b) {
            (BoolStyle::Lower, b) => b.to_string(),
            (BoolStyle::Python, true) => "True".to_string(),
            (BoolStyle::Python, false) => "False".to_string(),
            (BoolStyle::Int, true) => "1".to_string(),
            (BoolStyle::Int, false) => "0".to_string(),
        },
        other => other.to_string(),
    }
}

fn escape_c(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Substitute every placeholder in `body`.
///
/// A placeholder naming an argument that is not in `schema`, or that has no
/// value in `invocation`, fails with `UnresolvedPlaceholder`.
pub fn render_template(
    body: &str,
    schema: &[ArgumentSpec],
    invocation: &Invocation,
    options: RenderOptions,
) -> Result<String, ExampleError> {
    let mut rendered = String::with_capacity(body.len());
    let mut last = 0;

    for placeholder in placeholders(body) {
        let declared = schema.iter().any(|a| a.name == placeholder.name);
        let value = invocation
            .get(&placeholder.name)
            .filter(|_| declared)
            .ok_or_else(|| ExampleError::UnresolvedPlaceholder {
                name: placeholder.name.clone(),
                line: placeholder.line,
            })?;

        rendered.push_str(&body[last..placeholder.span.start]);
        rendered.push_str(&render_value(value, options));
        last = placeholder.span.end;
    }

    rendered.push_str(&body[last..]);
    Ok(rendered)
}

/// Render a document's template body.
pub fn render_document(
    document: &ExampleDocument,
    invocation: &Invocation,
    options: RenderOptions,
) -> Result<String, ExampleError> {
    render_template(&document.template_body, &document.schema, invocation, options)
}
