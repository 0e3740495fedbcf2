//! # tempy-template
//!
//! The pure text stages of example verification:
//!
//! 1. [`parse_example`] splits the `<<<`/`>>>` header from the body and
//!    turns `parser.add_argument(...)` lines into an argument schema.
//! 2. [`Synthesizer`] picks one concrete value per argument: overrides
//!    first, then defaults, then canonical values.
//! 3. [`render_document`] replaces every `${name}` in the body.
//!
//! None of these touch the filesystem or spawn processes.

pub mod lexer;
pub mod parser;
pub mod random;
pub mod render;
pub mod synth;

pub use parser::{parse_example, HEADER_END, HEADER_START};
pub use random::DeterministicRng;
pub use render::{
    placeholders, render_document, render_template, render_value, BoolStyle, EscapeStyle,
    Placeholder, RenderOptions,
};
pub use synth::{
    CanonicalValues, FuzzSource, Synthesizer, TestValueTable, ValueSource, ValueTable,
};
