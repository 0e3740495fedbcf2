//! Argument schema, example documents and invocations.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::ExampleError;
use crate::value::{ArgType, Value};

/// How an argument consumes its value on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgAction {
    /// Takes a value (`--name value` or a bare positional).
    #[default]
    Store,
    /// Bare flag that sets the value to `true`.
    StoreTrue,
    /// Bare flag that sets the value to `false`.
    StoreFalse,
}

/// One declared template argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentSpec {
    /// Identifier used by `${name}` placeholders
    pub name: String,
    /// Declared type
    pub arg_type: ArgType,
    /// Default value, already coerced to `arg_type`
    pub default: Option<Value>,
    /// Whether a value must be supplied
    pub required: bool,
    /// Help text
    pub description: String,
    /// Option strings (`--name`, `-n`); empty for positionals
    pub flags: Vec<String>,
    /// Allowed values; empty means unrestricted
    pub choices: Vec<Value>,
    /// Command-line action
    pub action: ArgAction,
}

impl ArgumentSpec {
    /// A required positional argument.
    pub fn positional(name: impl Into<String>, arg_type: ArgType) -> Self {
        Self {
            name: name.into(),
            arg_type,
            default: None,
            required: true,
            description: String::new(),
            flags: Vec::new(),
            choices: Vec::new(),
            action: ArgAction::Store,
        }
    }

    /// Set a default, making the argument optional.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: &[&str]) -> Self {
        self.flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = choices;
        self
    }

    pub fn is_positional(&self) -> bool {
        self.flags.is_empty()
    }

    /// The flag used when passing this argument to a process.
    ///
    /// Prefers the long form; falls back to `--<name>`.
    pub fn cli_flag(&self) -> String {
        self.flags
            .iter()
            .find(|f| f.starts_with("--"))
            .or_else(|| self.flags.first())
            .cloned()
            .unwrap_or_else(|| format!("--{}", self.name.replace('_', "-")))
    }

    /// Coerce `value` to the declared type and check it against `choices`.
    pub fn accept(&self, value: &Value) -> Result<Value, String> {
        let coerced = value.coerce(self.arg_type).ok_or_else(|| {
            format!(
                "expected {} but got {} `{}`",
                self.arg_type,
                value.arg_type(),
                value
            )
        })?;

        if !self.choices.is_empty() && !self.choices.contains(&coerced) {
            let allowed: Vec<String> = self.choices.iter().map(|c| c.to_string()).collect();
            return Err(format!(
                "`{}` is not one of [{}]",
                coerced,
                allowed.join(", ")
            ));
        }

        Ok(coerced)
    }
}

/// Metadata assignments from the header block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExampleMeta {
    /// Display name (`name = '...'`)
    pub name: Option<String>,
    /// One-line description (`description = '...'`)
    pub description: Option<String>,
    /// Explicit target language tag (`language = '...'`)
    pub language: Option<String>,
    /// Expected stdout template (`expect = '...'`)
    pub expect: Option<String>,
}

/// A parsed example file: schema plus template body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleDocument {
    pub meta: ExampleMeta,
    /// Declarations in header order
    pub schema: Vec<ArgumentSpec>,
    /// Everything after the header, verbatim
    pub template_body: String,
    /// Toolchain tag; empty when it could not be determined
    pub target_language: String,
}

impl ExampleDocument {
    /// The metadata name, or `fallback` (usually the file name).
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.meta.name.as_deref().unwrap_or(fallback)
    }
}

/// Concrete values for one run, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Invocation {
    values: Vec<(String, Value)>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing an earlier one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check that every required argument has a value of its declared type
    /// and that no undeclared names are present.
    pub fn validate(&self, schema: &[ArgumentSpec]) -> Result<(), ExampleError> {
        let declared: HashSet<&str> = schema.iter().map(|a| a.name.as_str()).collect();
        if let Some((name, _)) = self.values.iter().find(|(n, _)| !declared.contains(n.as_str())) {
            return Err(ExampleError::unsatisfiable(name, "value for an undeclared argument"));
        }

        for spec in schema {
            match self.get(&spec.name) {
                Some(value) if value.arg_type() != spec.arg_type => {
                    return Err(ExampleError::unsatisfiable(
                        &spec.name,
                        format!("expected {} but got {}", spec.arg_type, value.arg_type()),
                    ));
                }
                None if spec.required => {
                    return Err(ExampleError::unsatisfiable(&spec.name, "required argument has no value"));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
