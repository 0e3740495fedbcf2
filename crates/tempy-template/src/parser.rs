//! Schema parser.
//!
//! Splits an example file into its header block and template body and turns
//! the header's `argparse`-style declarations into [`ArgumentSpec`]s.
//!
//! ```text
//! <<<                                   <- first line, exactly
//! import argparse                       <- ignored
//! name = 'printf'                       <- metadata
//! parser = argparse.ArgumentParser()    <- ignored
//! parser.add_argument('message', type=str, default='Hello World')
//! >>>                                   <- first line that is exactly `>>>`
//! ...template body, verbatim...
//! ```

use std::collections::HashSet;

use tempy_core::{ArgAction, ArgType, ArgumentSpec, ExampleDocument, ExampleError, ExampleMeta, Value};

use crate::lexer::{tokenize, Token};
use crate::synth::CanonicalValues;

/// Line that opens the header block.
pub const HEADER_START: &str = "<<<";
/// Line that closes the header block.
pub const HEADER_END: &str = ">>>";

/// Parse an example file.
///
/// `fallback_language` is used when the header carries no `language = '...'`
/// assignment; callers usually derive it from the file extension.
pub fn parse_example(text: &str, fallback_language: Option<&str>) -> Result<ExampleDocument, ExampleError> {
    let (header, body) = split_header(text)?;

    let mut meta = ExampleMeta::default();
    let mut schema: Vec<ArgumentSpec> = Vec::new();
    let mut names = HashSet::new();

    for (line_no, statement) in join_continuations(header)? {
        let tokens = tokenize(&statement).map_err(|e| ExampleError::malformed(Some(line_no), e))?;
        match parse_statement(&tokens).map_err(|e| ExampleError::malformed(Some(line_no), e))? {
            Statement::Skip => {}
            Statement::Meta(key, value) => match key.as_str() {
                "name" => meta.name = Some(value),
                "description" => meta.description = Some(value),
                "language" => meta.language = Some(value),
                "expect" => meta.expect = Some(value),
                _ => unreachable!("filtered by parse_statement"),
            },
            Statement::Argument(spec) => {
                if !names.insert(spec.name.clone()) {
                    return Err(ExampleError::malformed(
                        Some(line_no),
                        format!("duplicate argument `{}`", spec.name),
                    ));
                }
                schema.push(spec);
            }
        }
    }

    let target_language = meta
        .language
        .clone()
        .or_else(|| fallback_language.map(str::to_string))
        .unwrap_or_default();

    tracing::debug!(
        arguments = schema.len(),
        language = %target_language,
        "parsed example header"
    );

    Ok(ExampleDocument {
        meta,
        schema,
        template_body: body.to_string(),
        target_language,
    })
}

/// Header lines (1-based line number, text) and the body.
type Split<'a> = (Vec<(usize, &'a str)>, &'a str);

fn split_header(text: &str) -> Result<Split<'_>, ExampleError> {
    let mut offset = 0;
    let mut lines = Vec::new();
    for raw in text.split_inclusive('\n') {
        lines.push((offset, raw.trim_end_matches(['\n', '\r'])));
        offset += raw.len();
    }
    debug_assert_eq!(offset, text.len(), "lines must cover the whole text");

    let opens = lines.first().map(|(_, l)| *l == HEADER_START).unwrap_or(false);
    if !opens {
        if let Some(pos) = lines.iter().position(|(_, l)| *l == HEADER_END) {
            return Err(ExampleError::malformed(
                Some(pos + 1),
                format!("`{}` without an opening `{}`", HEADER_END, HEADER_START),
            ));
        }
        return Ok((Vec::new(), text));
    }

    let mut header = Vec::new();
    for (index, (start, line)) in lines.iter().enumerate().skip(1) {
        if *line == HEADER_END {
            let body_start = lines
                .get(index + 1)
                .map(|(s, _)| *s)
                .unwrap_or(text.len());
            debug_assert!(body_start >= *start);
            debug_assert!(header.windows(2).all(|w: &[(usize, &str)]| w[0].0 < w[1].0));
            return Ok((header, &text[body_start..]));
        }
        if *line == HEADER_START {
            return Err(ExampleError::malformed(
                Some(index + 1),
                format!("nested `{}` inside the header", HEADER_START),
            ));
        }
        header.push((index + 1, *line));
    }

    Err(ExampleError::malformed(
        Some(1),
        format!("missing closing `{}`", HEADER_END),
    ))
}

/// Merge lines inside unclosed brackets into one statement, keyed by the
/// line the statement starts on.
fn join_continuations(header: Vec<(usize, &str)>) -> Result<Vec<(usize, String)>, ExampleError> {
    let mut statements = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (line_no, line) in header {
        let (start, mut text) = match pending.take() {
            Some((start, mut text)) => {
                text.push('\n');
                (start, text)
            }
            None => (line_no, String::new()),
        };
        text.push_str(line);

        if bracket_depth(&text) > 0 {
            pending = Some((start, text));
        } else {
            statements.push((start, text));
        }
    }

    if let Some((start, _)) = pending {
        return Err(ExampleError::malformed(Some(start), "unclosed bracket at end of header"));
    }

    Ok(statements)
}

fn bracket_depth(text: &str) -> i64 {
    // Lexing errors are reported when the statement itself is parsed.
    tokenize(text)
        .map(|tokens| {
            tokens.iter().fold(0, |depth, t| match t {
                Token::LParen | Token::LBracket => depth + 1,
                Token::RParen | Token::RBracket => depth - 1,
                _ => depth,
            })
        })
        .unwrap_or(0)
}

enum Statement {
    Skip,
    Meta(String, String),
    Argument(ArgumentSpec),
}

const META_KEYS: [&str; 4] = ["name", "description", "language", "expect"];

fn parse_statement(tokens: &[Token]) -> Result<Statement, String> {
    let ident = |i: usize| match tokens.get(i) {
        Some(Token::Ident(s)) => Some(s.as_str()),
        _ => None,
    };

    if tokens.is_empty() || matches!(ident(0), Some("import") | Some("from")) {
        return Ok(Statement::Skip);
    }

    if tokens.get(1) == Some(&Token::Equals) {
        let target = ident(0).unwrap_or_default();
        if target == "parser"
            && ident(2) == Some("argparse")
            && tokens.get(3) == Some(&Token::Dot)
            && ident(4) == Some("ArgumentParser")
        {
            return Ok(Statement::Skip);
        }
        if META_KEYS.contains(&target) {
            return match &tokens[2..] {
                [Token::Str(value)] => Ok(Statement::Meta(target.to_string(), value.clone())),
                _ => Err(format!("`{}` must be assigned a single string literal", target)),
            };
        }
        return Err(format!("unsupported assignment to `{}`", target));
    }

    if ident(0) == Some("parser") && tokens.get(1) == Some(&Token::Dot) && ident(2) == Some("add_argument") {
        let mut cursor = Cursor { tokens, pos: 3 };
        let call = cursor.parse_call()?;
        if cursor.pos != tokens.len() {
            return Err("unexpected tokens after `add_argument(...)`".to_string());
        }
        return build_argument(call).map(Statement::Argument);
    }

    Err("unsupported statement; expected metadata or `parser.add_argument(...)`".to_string())
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lit(Value),
    Name(String),
    None,
    Seq(Vec<Expr>),
}

struct Call {
    positional: Vec<Expr>,
    keywords: Vec<(String, Expr)>,
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Cursor<'_> {
    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn peek(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn parse_call(&mut self) -> Result<Call, String> {
        if self.next() != Some(&Token::LParen) {
            return Err("expected `(` after `add_argument`".to_string());
        }

        let mut call = Call {
            positional: Vec::new(),
            keywords: Vec::new(),
        };

        loop {
            if self.peek(0) == Some(&Token::RParen) {
                self.pos += 1;
                return Ok(call);
            }

            if let (Some(Token::Ident(key)), Some(Token::Equals)) = (self.peek(0), self.peek(1)) {
                let key = key.clone();
                self.pos += 2;
                let value = self.parse_expr()?;
                call.keywords.push((key, value));
            } else {
                if !call.keywords.is_empty() {
                    return Err("positional argument follows keyword argument".to_string());
                }
                let value = self.parse_expr()?;
                call.positional.push(value);
            }

            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => return Ok(call),
                _ => return Err("expected `,` or `)` in argument list".to_string()),
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        match self.next().cloned() {
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::Int(i)) => Ok(Expr::Lit(Value::Int(i))),
            Some(Token::Float(x)) => Ok(Expr::Lit(Value::Float(x))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "True" => Expr::Lit(Value::Bool(true)),
                "False" => Expr::Lit(Value::Bool(false)),
                "None" => Expr::None,
                _ => Expr::Name(name),
            }),
            Some(open @ (Token::LParen | Token::LBracket)) => {
                let close = if open == Token::LParen {
                    Token::RParen
                } else {
                    Token::RBracket
                };
                let mut items = Vec::new();
                loop {
                    if self.peek(0) == Some(&close) {
                        self.pos += 1;
                        return Ok(Expr::Seq(items));
                    }
                    items.push(self.parse_expr()?);
                    match self.next() {
                        Some(Token::Comma) => {}
                        Some(t) if *t == close => return Ok(Expr::Seq(items)),
                        _ => return Err("unterminated tuple or list".to_string()),
                    }
                }
            }
            Some(other) => Err(format!("unexpected token {:?}", other)),
            None => Err("unexpected end of line".to_string()),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn build_argument(call: Call) -> Result<ArgumentSpec, String> {
    let mut option_strings = Vec::new();
    for expr in &call.positional {
        match expr {
            Expr::Lit(Value::String(s)) => option_strings.push(s.clone()),
            other => return Err(format!("option strings must be string literals, got {:?}", other)),
        }
    }
    if option_strings.is_empty() {
        return Err("`add_argument` needs a name or flags".to_string());
    }

    let is_option = option_strings[0].starts_with('-');
    if option_strings.iter().any(|s| s.starts_with('-') != is_option) {
        return Err("cannot mix positional names and flags".to_string());
    }
    if !is_option && option_strings.len() > 1 {
        return Err("a positional argument takes exactly one name".to_string());
    }

    let mut name = if is_option {
        let flag = option_strings
            .iter()
            .find(|s| s.starts_with("--"))
            .unwrap_or(&option_strings[0]);
        flag.trim_start_matches('-').replace('-', "_")
    } else {
        option_strings[0].clone()
    };

    let mut declared_type = None;
    let mut default = None;
    let mut description = String::new();
    let mut choices = Vec::new();
    let mut required = None;
    let mut action = ArgAction::Store;

    for (key, value) in call.keywords {
        match (key.as_str(), value) {
            ("type", Expr::Name(t)) => {
                declared_type =
                    Some(ArgType::from_type_name(&t).ok_or_else(|| format!("unknown type `{}`", t))?);
            }
            ("default", Expr::None) => default = None,
            ("default", Expr::Lit(v)) => default = Some(v),
            ("help", Expr::Lit(Value::String(h))) => description = h,
            ("choices", Expr::Seq(items)) => {
                for item in items {
                    match item {
                        Expr::Lit(v) => choices.push(v),
                        other => return Err(format!("choices must be literals, got {:?}", other)),
                    }
                }
                if choices.is_empty() {
                    return Err("`choices` must not be empty".to_string());
                }
            }
            ("required", Expr::Lit(Value::Bool(b))) => required = Some(b),
            ("action", Expr::Lit(Value::String(a))) => {
                action = match a.as_str() {
                    "store" => ArgAction::Store,
                    "store_true" => ArgAction::StoreTrue,
                    "store_false" => ArgAction::StoreFalse,
                    other => return Err(format!("unsupported action `{}`", other)),
                };
            }
            ("dest", Expr::Lit(Value::String(d))) => name = d,
            ("metavar", Expr::Lit(Value::String(_))) => {}
            (key, value) => return Err(format!("unsupported keyword `{}={:?}`", key, value)),
        }
    }

    if !is_identifier(&name) {
        return Err(format!("`{}` is not a valid argument name", name));
    }

    let flag_action = action != ArgAction::Store;
    if flag_action && !is_option {
        return Err(format!("`{}` needs a flag to use a store_true/store_false action", name));
    }
    if flag_action && declared_type.is_some_and(|t| t != ArgType::Bool) {
        return Err(format!("`{}` uses a flag action but is not a bool", name));
    }

    let arg_type = declared_type
        .or(flag_action.then_some(ArgType::Bool))
        .or_else(|| default.as_ref().map(Value::arg_type))
        .unwrap_or(ArgType::String);

    let mut spec = ArgumentSpec::positional(name, arg_type).with_description(description);
    spec.action = action;
    if is_option {
        spec.flags = option_strings;
    }

    for choice in choices {
        let coerced = choice
            .coerce(arg_type)
            .ok_or_else(|| format!("choice `{}` is not a {}", choice, arg_type))?;
        spec.choices.push(coerced);
    }

    let default = match default {
        Some(v) => {
            let coerced = v
                .coerce(arg_type)
                .ok_or_else(|| format!("default `{}` is not a {}", v, arg_type))?;
            if !spec.choices.is_empty() && !spec.choices.contains(&coerced) {
                return Err(format!("default `{}` is not among the choices", coerced));
            }
            Some(coerced)
        }
        None => None,
    };

    spec.required = required.unwrap_or(!is_option && default.is_none());
    spec.default = match default {
        Some(v) => Some(v),
        None if !spec.required => Some(implied_default(&spec)),
        None => None,
    };

    Ok(spec)
}

/// Default for an optional argument declared without one.
fn implied_default(spec: &ArgumentSpec) -> Value {
    match spec.action {
        ArgAction::StoreTrue => Value::Bool(false),
        ArgAction::StoreFalse => Value::Bool(true),
        ArgAction::Store => spec
            .choices
            .first()
            .cloned()
            .or_else(|| CanonicalValues::default().value_for(spec.arg_type).cloned())
            .unwrap_or_else(|| Value::String(String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempy_core::FailureKind;

    const PRINTF_EXAMPLE: &str = "<<<
import argparse

name = 'printf'
description = 'Print an argument passed during file creation'

parser = argparse.ArgumentParser()
parser.add_argument('message', type=str, default='Hello World')
>>>
#include <stdio.h>

int main(int argc, char **argv) {
    printf(\"${message}\");
    return 0;
}
";

    fn header(lines: &str) -> String {
        format!("<<<\n{}\n>>>\nbody\n", lines)
    }

    fn malformed_line(result: Result<ExampleDocument, ExampleError>) -> Option<usize> {
        match result {
            Err(ExampleError::MalformedSchema { line, .. }) => line,
            other => panic!("expected MalformedSchema, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_printf_example() {
        let doc = parse_example(PRINTF_EXAMPLE, Some("c")).unwrap();

        assert_eq!(doc.meta.name.as_deref(), Some("printf"));
        assert_eq!(
            doc.meta.description.as_deref(),
            Some("Print an argument passed during file creation")
        );
        assert_eq!(doc.target_language, "c");
        assert_eq!(doc.schema.len(), 1);

        let message = &doc.schema[0];
        assert_eq!(message.name, "message");
        assert_eq!(message.arg_type, ArgType::String);
        assert_eq!(message.default, Some(Value::String("Hello World".into())));
        assert!(!message.required);
        assert!(message.is_positional());

        assert!(doc.template_body.starts_with("#include <stdio.h>\n"));
        assert!(doc.template_body.contains("printf(\"${message}\");"));
    }

    #[test]
    fn test_language_metadata_overrides_fallback() {
        let doc = parse_example(&header("language = 'python'"), Some("c")).unwrap();
        assert_eq!(doc.target_language, "python");

        let doc = parse_example(&header(""), None).unwrap();
        assert_eq!(doc.target_language, "");
    }

    #[test]
    fn test_headerless_document() {
        let doc = parse_example("echo plain\n", Some("sh")).unwrap();
        assert!(doc.schema.is_empty());
        assert_eq!(doc.template_body, "echo plain\n");
    }

    #[test]
    fn test_body_is_verbatim_after_crlf_header() {
        let doc = parse_example("<<<\r\nname = 'x'\r\n>>>\r\nline one\r\n", None).unwrap();
        assert_eq!(doc.template_body, "line one\r\n");

        let doc = parse_example("<<<\n>>>", None).unwrap();
        assert_eq!(doc.template_body, "");
    }

    #[test]
    fn test_missing_or_unbalanced_delimiters() {
        assert_eq!(malformed_line(parse_example("<<<\nname = 'x'\nbody\n", None)), Some(1));
        assert_eq!(malformed_line(parse_example("name = 'x'\n>>>\nbody\n", None)), Some(2));
        assert_eq!(
            malformed_line(parse_example("<<<\nname = 'x'\n<<<\n>>>\n", None)),
            Some(3)
        );
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let text = header("parser.add_argument('items', type=list)");
        let err = parse_example(&text, None).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedSchema);
        assert!(err.to_string().contains("unknown type `list`"));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_duplicate_name_is_malformed() {
        let text = header("parser.add_argument('message')\nparser.add_argument('--message')");
        assert_eq!(malformed_line(parse_example(&text, None)), Some(3));
    }

    #[test]
    fn test_unsupported_statement_is_malformed() {
        assert!(parse_example(&header("print('hi')"), None).is_err());
        assert!(parse_example(&header("name = 42"), None).is_err());
        assert!(parse_example(&header("parser.add_argument('x', nargs='*')"), None).is_err());
    }

    #[test]
    fn test_option_with_choices_gets_implied_default() {
        let text = header(
            "parser.add_argument('--license', '-l', choices=('MIT', 'GPL'),\n        help='license header for the file')",
        );
        let doc = parse_example(&text, None).unwrap();
        let license = &doc.schema[0];
        assert_eq!(license.name, "license");
        assert_eq!(license.flags, vec!["--license".to_string(), "-l".to_string()]);
        assert!(!license.required);
        assert_eq!(license.default, Some(Value::String("MIT".into())));
        assert_eq!(license.description, "license header for the file");
    }

    #[test]
    fn test_option_name_normalization() {
        let doc = parse_example(&header("parser.add_argument('-n', '--file-name', default='foo')"), None).unwrap();
        assert_eq!(doc.schema[0].name, "file_name");
        assert_eq!(doc.schema[0].cli_flag(), "--file-name");
    }

    #[test]
    fn test_type_inference_and_coercion() {
        let doc = parse_example(
            &header(
                "parser.add_argument('--count', default=3)\n\
                 parser.add_argument('--ratio', type=float, default=2)\n\
                 parser.add_argument('--verbose', action='store_true')",
            ),
            None,
        )
        .unwrap();

        assert_eq!(doc.schema[0].arg_type, ArgType::Int);
        assert_eq!(doc.schema[1].default, Some(Value::Float(2.0)));
        assert_eq!(doc.schema[2].arg_type, ArgType::Bool);
        assert_eq!(doc.schema[2].default, Some(Value::Bool(false)));
    }

    #[test]
    fn test_incompatible_default_is_malformed() {
        assert!(parse_example(&header("parser.add_argument('n', type=int, default='x')"), None).is_err());
        assert!(parse_example(
            &header("parser.add_argument('--l', choices=['MIT'], default='GPL')"),
            None
        )
        .is_err());
    }

    #[test]
    fn test_required_rules() {
        let doc = parse_example(
            &header(
                "parser.add_argument('path')\n\
                 parser.add_argument('--mode', required=True)\n\
                 parser.add_argument('opt', required=False)",
            ),
            None,
        )
        .unwrap();

        assert!(doc.schema[0].required);
        assert!(doc.schema[0].default.is_none());
        assert!(doc.schema[1].required);
        assert!(!doc.schema[2].required);
        assert_eq!(doc.schema[2].default, Some(Value::String(String::new())));
    }

    #[test]
    fn test_optional_arguments_always_have_defaults() {
        let doc = parse_example(
            &header(
                "parser.add_argument('--a')\n\
                 parser.add_argument('--b', type=int)\n\
                 parser.add_argument('--c', action='store_false')",
            ),
            None,
        )
        .unwrap();
        for spec in &doc.schema {
            assert!(!spec.required);
            let default = spec.default.as_ref().expect("implied default");
            assert_eq!(default.arg_type(), spec.arg_type);
        }
    }

    #[test]
    fn test_continuation_reports_start_line() {
        let text = header("name = 'x'\nparser.add_argument('--a',\n    type=list)");
        assert_eq!(malformed_line(parse_example(&text, None)), Some(3));

        let text = header("parser.add_argument('--a',");
        assert_eq!(malformed_line(parse_example(&text, None)), Some(2));
    }

    #[test]
    fn test_expect_metadata() {
        let doc = parse_example(&header(r"expect = '${message}\n'"), None).unwrap();
        assert_eq!(doc.meta.expect.as_deref(), Some("${message}\n"));
    }
}
