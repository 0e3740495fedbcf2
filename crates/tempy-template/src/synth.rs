//! Value synthesizer.
//!
//! Produces one [`Invocation`] per example. For each declared argument, in
//! order:
//!
//! 1. the first [`ValueSource`] that has a value for it (explicit table,
//!    then fuzzing), which must be type-compatible;
//! 2. the declared default;
//! 3. for required arguments without a default, the first choice or the
//!    canonical value of the type:
//!
//! | Type | Canonical value |
//! |------|-----------------|
//! | string | `""` |
//! | int | `0` |
//! | float | `0.0` |
//! | bool | `false` |
//!
//! The canonical values determine the expected output of examples that
//! declare required arguments without defaults.

use std::collections::HashMap;

use serde::Deserialize;
use tempy_core::{ArgType, ArgumentSpec, ExampleError, Invocation, Value};

use crate::random::DeterministicRng;

/// Synthesis rules: the value used for a required argument without a default.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalValues {
    rules: HashMap<ArgType, Value>,
}

impl Default for CanonicalValues {
    fn default() -> Self {
        Self::empty()
            .with(ArgType::String, Value::String(String::new()))
            .with(ArgType::Int, Value::Int(0))
            .with(ArgType::Float, Value::Float(0.0))
            .with(ArgType::Bool, Value::Bool(false))
    }
}

impl CanonicalValues {
    /// A table with no rules; every required argument needs a default.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: HashMap::new() }
    }

    #[must_use]
    pub fn with(mut self, ty: ArgType, value: Value) -> Self {
        debug_assert_eq!(value.arg_type(), ty, "canonical value must match its type");
        self.rules.insert(ty, value);
        self
    }

    pub fn value_for(&self, ty: ArgType) -> Option<&Value> {
        self.rules.get(&ty)
    }
}

/// A source of override values consulted before defaults.
pub trait ValueSource: Send {
    /// Short label for logs.
    fn label(&self) -> &str;

    /// A candidate value for `spec`, or `None` to defer to the next source.
    ///
    /// `Err` carries a reason the override cannot be used for this argument.
    fn value_for(&mut self, spec: &ArgumentSpec) -> Option<Result<Value, String>>;
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Text(String),
    Value(Value),
}

/// Explicit `name → value` overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTable {
    entries: HashMap<String, Entry>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an untyped override, parsed against the declared type on use.
    pub fn set_text(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(name.into(), Entry::Text(text.into()));
    }

    /// Add a typed override.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), Entry::Value(value));
    }

    /// Parse a `NAME=VALUE` pair as given on the command line.
    pub fn set_pair(&mut self, pair: &str) -> Result<(), String> {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got `{}`", pair))?;
        if name.is_empty() {
            return Err(format!("missing name in `{}`", pair));
        }
        self.set_text(name, value);
        Ok(())
    }

    /// Merge `other` into this table; entries already present win.
    pub fn extend_missing(&mut self, other: &ValueTable) {
        for (name, entry) in &other.entries {
            self.entries.entry(name.clone()).or_insert_with(|| entry.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ValueSource for ValueTable {
    fn label(&self) -> &str {
        "table"
    }

    fn value_for(&mut self, spec: &ArgumentSpec) -> Option<Result<Value, String>> {
        let entry = self.entries.get(&spec.name)?;
        let value = match entry {
            Entry::Text(text) => spec.arg_type.parse_value(text),
            Entry::Value(value) => Ok(value.clone()),
        };
        Some(value)
    }
}

/// Test-value tables for many examples, keyed by example name.
///
/// ```json
/// { "printf": { "message": "Hello from the table" } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct TestValueTable {
    examples: HashMap<String, HashMap<String, Value>>,
}

impl TestValueTable {
    /// Overrides for the example called `name`, if any.
    pub fn table_for(&self, name: &str) -> Option<ValueTable> {
        let values = self.examples.get(name)?;
        let mut table = ValueTable::new();
        for (arg, value) in values {
            table.set(arg.clone(), value.clone());
        }
        Some(table)
    }
}

/// Seeded random values for every argument.
///
/// Strings are alphanumeric words so they survive any target's string
/// literal rules unescaped.
pub struct FuzzSource {
    rng: DeterministicRng,
}

impl FuzzSource {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: DeterministicRng::new(seed),
        }
    }
}

impl ValueSource for FuzzSource {
    fn label(&self) -> &str {
        "fuzz"
    }

    fn value_for(&mut self, spec: &ArgumentSpec) -> Option<Result<Value, String>> {
        if let Some(choice) = self.rng.choose(&spec.choices) {
            return Some(Ok(choice.clone()));
        }

        let value = match spec.arg_type {
            ArgType::String => {
                let words = self.rng.gen_range(1..=3);
                Value::String(self.rng.gen_words(words, 8))
            }
            ArgType::Int => Value::Int(self.rng.gen_range(-1000..=1000)),
            ArgType::Float => Value::Float(f64::from(self.rng.gen_range(-1000..=1000_i32)) / 10.0),
            ArgType::Bool => Value::Bool(self.rng.gen_bool(0.5)),
        };
        Some(Ok(value))
    }
}

/// Produces invocations from schemas.
pub struct Synthesizer {
    canonical: CanonicalValues,
    sources: Vec<Box<dyn ValueSource>>,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(CanonicalValues::default())
    }
}

impl Synthesizer {
    pub fn new(canonical: CanonicalValues) -> Self {
        Self {
            canonical,
            sources: Vec::new(),
        }
    }

    /// Add an override source; sources are consulted in insertion order.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn ValueSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Produce one invocation satisfying `schema`.
    pub fn synthesize(&mut self, schema: &[ArgumentSpec]) -> Result<Invocation, ExampleError> {
        let mut invocation = Invocation::new();

        for spec in schema {
            if let Some(value) = self.value_for(spec)? {
                invocation.insert(spec.name.clone(), value);
            }
        }

        invocation.validate(schema)?;
        Ok(invocation)
    }

    fn value_for(&mut self, spec: &ArgumentSpec) -> Result<Option<Value>, ExampleError> {
        for source in &mut self.sources {
            if let Some(candidate) = source.value_for(spec) {
                let label = source.label().to_string();
                let value = candidate
                    .and_then(|v| spec.accept(&v))
                    .map_err(|reason| {
                        ExampleError::unsatisfiable(&spec.name, format!("{} override: {}", label, reason))
                    })?;
                tracing::debug!(argument = %spec.name, source = %label, value = %value, "override applied");
                return Ok(Some(value));
            }
        }

        if let Some(ref default) = spec.default {
            return Ok(Some(default.clone()));
        }

        let canonical = spec
            .choices
            .first()
            .or_else(|| self.canonical.value_for(spec.arg_type))
            .and_then(|v| spec.accept(v).ok());

        match canonical {
            Some(value) => Ok(Some(value)),
            None if spec.required => Err(ExampleError::unsatisfiable(
                &spec.name,
                format!("required {} argument has no default and no synthesis rule", spec.arg_type),
            )),
            None => Ok(None),
        }
    }
}
