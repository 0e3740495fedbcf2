//! Toolchain registry.
//!
//! Maps a target-language tag to the commands that build and run a rendered
//! source file. Adding a language is a registry entry, either built in or
//! loaded from JSON:
//!
//! ```json
//! {
//!   "toolchains": [
//!     {
//!       "tag": "go",
//!       "extensions": ["go"],
//!       "source_file": "main.go",
//!       "run": ["go", "run", "{source}"],
//!       "escape": "c"
//!     }
//!   ]
//! }
//! ```
//!
//! Command templates may reference `{source}`, `{binary}` and `{dir}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempy_core::ExampleError;
use tempy_template::{BoolStyle, EscapeStyle, RenderOptions};
use thiserror::Error;

/// Errors loading a registry file.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read toolchain registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toolchain registry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid toolchain `{tag}`: {reason}")]
    Invalid { tag: String, reason: String },
}

/// Build and run commands for one target language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toolchain {
    /// Language tag (e.g. `c`, `python`)
    pub tag: String,
    /// File extensions mapped to this tag, without the dot
    #[serde(default)]
    pub extensions: Vec<String>,
    /// File name the rendered source is written to
    pub source_file: String,
    /// Optional build step
    #[serde(default)]
    pub compile: Option<Vec<String>>,
    /// Run step; invocation arguments are appended
    pub run: Vec<String>,
    /// String escaping for rendered values
    #[serde(default)]
    pub escape: EscapeStyle,
    /// Bool spelling for rendered values
    #[serde(default)]
    pub bools: BoolStyle,
}

/// Paths of one run's scratch directory.
#[derive(Debug, Clone)]
pub struct WorkPaths {
    pub dir: PathBuf,
    pub source: PathBuf,
    pub binary: PathBuf,
}

impl WorkPaths {
    pub fn new(dir: &Path, toolchain: &Toolchain) -> Self {
        let binary = if cfg!(windows) { "main.exe" } else { "main" };
        Self {
            dir: dir.to_path_buf(),
            source: dir.join(&toolchain.source_file),
            binary: dir.join(binary),
        }
    }
}

impl Toolchain {
    fn new(
        tag: &str,
        extensions: &[&str],
        source_file: &str,
        compile: Option<&[&str]>,
        run: &[&str],
        escape: EscapeStyle,
        bools: BoolStyle,
    ) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            tag: tag.to_string(),
            extensions: owned(extensions),
            source_file: source_file.to_string(),
            compile: compile.map(owned),
            run: owned(run),
            escape,
            bools,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            escape: self.escape,
            bools: self.bools,
        }
    }

    /// Expanded build command, if this toolchain has a build step.
    pub fn compile_command(&self, paths: &WorkPaths) -> Option<Vec<String>> {
        self.compile.as_ref().map(|c| expand(c, paths))
    }

    /// Expanded run command followed by `args`.
    pub fn run_command(&self, paths: &WorkPaths, args: &[String]) -> Vec<String> {
        let mut command = expand(&self.run, paths);
        command.extend(args.iter().cloned());
        command
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::Invalid {
            tag: self.tag.clone(),
            reason: reason.to_string(),
        };

        if self.tag.is_empty() {
            return Err(invalid("tag must not be empty"));
        }
        if self.run.is_empty() {
            return Err(invalid("run command must not be empty"));
        }
        if self.compile.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(invalid("compile command must not be empty when present"));
        }
        if self.source_file.is_empty() || self.source_file.contains(['/', '\\']) {
            return Err(invalid("source_file must be a plain file name"));
        }
        Ok(())
    }
}

fn expand(template: &[String], paths: &WorkPaths) -> Vec<String> {
    template
        .iter()
        .map(|part| {
            part.replace("{source}", &paths.source.to_string_lossy())
                .replace("{binary}", &paths.binary.to_string_lossy())
                .replace("{dir}", &paths.dir.to_string_lossy())
        })
        .collect()
}

#[derive(Deserialize)]
struct RegistryFile {
    toolchains: Vec<Toolchain>,
}

/// Tag → toolchain lookup.
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    entries: BTreeMap<String, Toolchain>,
}

impl Default for ToolchainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolchainRegistry {
    /// A registry with no toolchains.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The built-in toolchains: `c`, `cpp`, `rust`, `python`, `sh`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let builtins = [
            Toolchain::new(
                "c",
                &["c"],
                "main.c",
                Some(&["cc", "-o", "{binary}", "{source}"]),
                &["{binary}"],
                EscapeStyle::C,
                BoolStyle::Int,
            ),
            Toolchain::new(
                "cpp",
                &["cpp", "cc", "cxx"],
                "main.cpp",
                Some(&["c++", "-o", "{binary}", "{source}"]),
                &["{binary}"],
                EscapeStyle::C,
                BoolStyle::Lower,
            ),
            Toolchain::new(
                "rust",
                &["rs"],
                "main.rs",
                Some(&["rustc", "-o", "{binary}", "{source}"]),
                &["{binary}"],
                EscapeStyle::C,
                BoolStyle::Lower,
            ),
            Toolchain::new(
                "python",
                &["py"],
                "main.py",
                None,
                &["python3", "{source}"],
                EscapeStyle::C,
                BoolStyle::Python,
            ),
            Toolchain::new("sh", &["sh"], "main.sh", None, &["sh", "{source}"], EscapeStyle::Raw, BoolStyle::Lower),
        ];
        for toolchain in builtins {
            registry.entries.insert(toolchain.tag.clone(), toolchain);
        }
        registry
    }

    /// Add or replace a toolchain.
    pub fn insert(&mut self, toolchain: Toolchain) -> Result<(), RegistryError> {
        toolchain.validate()?;
        self.entries.insert(toolchain.tag.clone(), toolchain);
        Ok(())
    }

    /// Add or replace toolchains from a JSON document.
    pub fn merge_json(&mut self, json: &str, origin: &Path) -> Result<(), RegistryError> {
        let file: RegistryFile = serde_json::from_str(json).map_err(|source| RegistryError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        for toolchain in file.toolchains {
            self.insert(toolchain)?;
        }
        Ok(())
    }

    /// Add or replace toolchains from a JSON file.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), RegistryError> {
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge_json(&json, path)
    }

    /// Look up a toolchain by tag.
    pub fn get(&self, tag: &str) -> Result<&Toolchain, ExampleError> {
        if tag.is_empty() {
            return Err(ExampleError::ToolchainUnavailable {
                tag: String::new(),
                reason: "target language could not be determined; add `language = '...'` to the header"
                    .to_string(),
            });
        }
        self.entries.get(tag).ok_or_else(|| ExampleError::ToolchainUnavailable {
            tag: tag.to_string(),
            reason: "no registry entry".to_string(),
        })
    }

    /// Tag for a file, by extension.
    pub fn tag_for_path(&self, path: &Path) -> Option<&str> {
        let extension = path.extension()?.to_str()?;
        self.entries
            .values()
            .find(|t| t.extensions.iter().any(|e| e == extension))
            .map(|t| t.tag.as_str())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempy_core::FailureKind;

    #[test]
    fn test_builtin_lookup() {
        let registry = ToolchainRegistry::builtin();
        let c = registry.get("c").unwrap();
        assert_eq!(c.source_file, "main.c");
        assert!(c.compile.is_some());
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["c", "cpp", "python", "rust", "sh"]);
    }

    #[test]
    fn test_missing_tag_is_unavailable() {
        let registry = ToolchainRegistry::builtin();
        assert_eq!(registry.get("cobol").unwrap_err().kind(), FailureKind::ToolchainUnavailable);
        assert_eq!(registry.get("").unwrap_err().kind(), FailureKind::ToolchainUnavailable);
    }

    #[test]
    fn test_tag_for_path() {
        let registry = ToolchainRegistry::builtin();
        assert_eq!(registry.tag_for_path(Path::new("examples/c-printf.c")), Some("c"));
        assert_eq!(registry.tag_for_path(Path::new("hello.py")), Some("python"));
        assert_eq!(registry.tag_for_path(Path::new("README")), None);
    }

    #[test]
    fn test_command_expansion() {
        let registry = ToolchainRegistry::builtin();
        let c = registry.get("c").unwrap();
        let paths = WorkPaths::new(Path::new("/work"), c);

        let compile = c.compile_command(&paths).unwrap();
        assert_eq!(compile[0], "cc");
        assert!(compile.contains(&"/work/main.c".to_string()));

        let run = c.run_command(&paths, &["--name".to_string(), "x".to_string()]);
        assert_eq!(run.len(), 3);
        assert_eq!(run[1], "--name");
    }

    #[test]
    fn test_merge_json() {
        let mut registry = ToolchainRegistry::builtin();
        registry
            .merge_json(
                r#"{"toolchains": [
                    {"tag": "go", "extensions": ["go"], "source_file": "main.go",
                     "run": ["go", "run", "{source}"], "escape": "c"},
                    {"tag": "sh", "source_file": "run.sh", "run": ["bash", "{source}"]}
                ]}"#,
                Path::new("registry.json"),
            )
            .unwrap();

        let go = registry.get("go").unwrap();
        assert_eq!(go.escape, EscapeStyle::C);
        assert_eq!(go.bools, BoolStyle::Lower);
        assert_eq!(registry.tag_for_path(Path::new("x.go")), Some("go"));
        assert_eq!(registry.get("sh").unwrap().run[0], "bash");
    }

    #[test]
    fn test_merge_rejects_invalid_entries() {
        let mut registry = ToolchainRegistry::empty();
        let err = registry
            .merge_json(
                r#"{"toolchains": [{"tag": "x", "source_file": "main.x", "run": []}]}"#,
                Path::new("r.json"),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::Invalid { .. }));

        let err = registry.merge_json("not json", Path::new("r.json")).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }
}
