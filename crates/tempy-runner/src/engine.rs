//! Verification engine.
//!
//! Drives each example through parse → synthesize → render → execute →
//! verify and turns the first failure into a [`VerificationOutcome`].
//! Examples share no mutable state, so a directory of them runs on a
//! bounded pool of tokio tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempy_core::{ExampleDocument, ExampleError, Invocation, OutcomeSummary, VerificationOutcome};
use tempy_template::{
    parse_example, render_document, CanonicalValues, DeterministicRng, FuzzSource, RenderOptions,
    Synthesizer, TestValueTable, ValueTable,
};
use tokio::sync::Semaphore;

use crate::execute::{execute, invocation_args, ExecutionLimits};
use crate::toolchain::ToolchainRegistry;
use crate::verify::{expected_output, verify_output};

/// Configuration for a verification run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout for the program run
    pub run_timeout: Duration,
    /// Timeout for the build step
    pub compile_timeout: Duration,
    /// Examples verified concurrently
    pub jobs: usize,
    /// Fuzz seed (if None, values come from overrides and defaults only)
    pub seed: Option<u64>,
    /// Overrides applied to every example
    pub overrides: ValueTable,
    /// Per-example overrides, keyed by example name
    pub test_values: TestValueTable,
    /// Values for required arguments without a default
    pub canonical: CanonicalValues,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(10),
            compile_timeout: Duration::from_secs(60),
            jobs: num_cpus::get(),
            seed: None,
            overrides: ValueTable::new(),
            test_values: TestValueTable::default(),
            canonical: CanonicalValues::default(),
        }
    }
}

impl EngineConfig {
    /// Fast config for quick iteration.
    pub fn fast() -> Self {
        Self {
            run_timeout: Duration::from_secs(2),
            compile_timeout: Duration::from_secs(20),
            ..Default::default()
        }
    }

    /// Thorough config for CI, where toolchains may be slow to start.
    pub fn thorough() -> Self {
        Self {
            run_timeout: Duration::from_secs(60),
            compile_timeout: Duration::from_secs(300), // 5 minutes
            ..Default::default()
        }
    }

    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            compile_timeout: self.compile_timeout,
            run_timeout: self.run_timeout,
        }
    }
}

/// Verifies example files against a toolchain registry.
///
/// Cheap to clone; clones share configuration and registry.
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    config: Arc<EngineConfig>,
    registry: Arc<ToolchainRegistry>,
}

impl VerificationEngine {
    pub fn new(config: EngineConfig, registry: ToolchainRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }

    /// Default config with the built-in toolchains.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), ToolchainRegistry::builtin())
    }

    /// Parse `text` read from `path`, taking the target language from the
    /// file extension when the header does not name one.
    pub fn parse(&self, path: &Path, text: &str) -> Result<ExampleDocument, ExampleError> {
        parse_example(text, self.registry.tag_for_path(path))
    }

    /// Synthesize the invocation for one example.
    pub fn synthesize(&self, path: &Path, document: &ExampleDocument) -> Result<Invocation, ExampleError> {
        let mut table = self.config.overrides.clone();
        let file_name = file_name(path);
        if let Some(values) = self.config.test_values.table_for(document.display_name(&file_name)) {
            table.extend_missing(&values);
        }

        let mut synthesizer = Synthesizer::new(self.config.canonical.clone());
        if !table.is_empty() {
            synthesizer = synthesizer.with_source(Box::new(table));
        }
        if let Some(seed) = self.config.seed {
            let seed = DeterministicRng::derive_seed(seed, &path.to_string_lossy());
            synthesizer = synthesizer.with_source(Box::new(FuzzSource::new(seed)));
        }

        synthesizer.synthesize(&document.schema)
    }

    /// Render the source for one example without running it.
    pub fn render_source(&self, path: &Path, text: &str) -> Result<String, ExampleError> {
        let document = self.parse(path, text)?;
        let invocation = self.synthesize(path, &document)?;
        let options = self.render_options(&document);
        render_document(&document, &invocation, options)
    }

    fn render_options(&self, document: &ExampleDocument) -> RenderOptions {
        self.registry
            .get(&document.target_language)
            .map(|t| t.render_options())
            .unwrap_or_default()
    }

    /// Run the whole pipeline on one example's text.
    pub async fn verify_source(&self, path: &Path, text: &str) -> Result<(), ExampleError> {
        let document = self.parse(path, text)?;
        tracing::debug!(path = %path.display(), arguments = document.schema.len(), "parsed example");

        let invocation = self.synthesize(path, &document)?;

        // Render before resolving the toolchain: template drift is reported
        // even for languages that are not installed.
        let toolchain = self.registry.get(&document.target_language);
        let options = self.render_options(&document);
        let source = render_document(&document, &invocation, options)?;
        let toolchain = toolchain?;

        let expected = expected_output(&document, &invocation, options)?;
        let args = invocation_args(&document.schema, &invocation);
        let result = execute(&source, toolchain, &args, self.config.limits()).await?;
        tracing::debug!(
            path = %path.display(),
            duration_ms = result.duration.as_millis() as u64,
            "program finished"
        );

        verify_output(&expected, &result)
    }

    /// Verify one example file.
    pub async fn verify_file(&self, path: &Path) -> VerificationOutcome {
        let start = Instant::now();

        let result = match tokio::fs::read_to_string(path).await {
            Ok(text) => self.verify_source(path, &text).await,
            Err(e) => Err(ExampleError::malformed(None, format!("failed to read example: {}", e))),
        };

        let outcome = match result {
            Ok(()) => VerificationOutcome::pass(path, start.elapsed()),
            Err(e) => VerificationOutcome::fail(path, &e, start.elapsed()),
        };
        tracing::info!("{}", outcome.format_status());
        outcome
    }

    /// Verify many example files concurrently, at most `jobs` at a time.
    ///
    /// The summary is sorted by path regardless of completion order.
    pub async fn verify_paths(&self, paths: Vec<PathBuf>) -> OutcomeSummary {
        let semaphore = Arc::new(Semaphore::new(self.config.jobs.max(1)));
        let mut handles = Vec::with_capacity(paths.len());

        for path in paths {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let task_path = path.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                engine.verify_file(&task_path).await
            });
            handles.push((path, handle));
        }

        let expected = handles.len();
        let mut outcomes = Vec::with_capacity(expected);
        for (path, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| {
                let error = ExampleError::RuntimeError {
                    code: None,
                    message: format!("verification task failed: {}", e),
                };
                VerificationOutcome::fail(&path, &error, Duration::ZERO)
            });
            outcomes.push(outcome);
        }
        debug_assert_eq!(outcomes.len(), expected, "one outcome per path");

        OutcomeSummary::from_outcomes(outcomes)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempy_core::FailureKind;
    use tempy_template::{BoolStyle, EscapeStyle};
    use tempfile::TempDir;

    use crate::toolchain::Toolchain;

    const PRINTF: &str = "<<<
import argparse

name = 'printf'
description = 'Print an argument passed during file creation'

parser = argparse.ArgumentParser()
parser.add_argument('message', type=str, default='Hello World')
>>>
#include <stdio.h>

int main(void) {
    printf(\"${message}\");
    return 0;
}
";

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string(), "sh".to_string()]
    }

    fn fake_c(compile: &str, run: Vec<String>) -> Toolchain {
        Toolchain {
            tag: "c".to_string(),
            extensions: vec!["c".to_string()],
            source_file: "main.c".to_string(),
            compile: Some(sh(compile)),
            run,
            escape: EscapeStyle::C,
            bools: BoolStyle::Int,
        }
    }

    fn engine_with(toolchain: Toolchain, config: EngineConfig) -> VerificationEngine {
        let mut registry = ToolchainRegistry::builtin();
        registry.insert(toolchain).unwrap();
        VerificationEngine::new(config, registry)
    }

    fn write(dir: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_config_presets() {
        let fast = EngineConfig::fast();
        let thorough = EngineConfig::thorough();
        assert!(fast.run_timeout < EngineConfig::default().run_timeout);
        assert!(thorough.compile_timeout > EngineConfig::default().compile_timeout);
        assert!(EngineConfig::default().jobs >= 1);
    }

    #[test]
    fn test_render_source() {
        let engine = VerificationEngine::with_defaults();
        let source = engine.render_source(Path::new("printf.c"), PRINTF).unwrap();
        assert!(source.contains("    printf(\"Hello World\");\n"));
        assert!(!source.contains("<<<"));
    }

    #[test]
    fn test_overrides_and_test_values() {
        let mut config = EngineConfig::default();
        config.test_values = serde_json::from_str(r#"{"printf": {"message": "from table"}}"#).unwrap();
        let engine = VerificationEngine::new(config, ToolchainRegistry::builtin());
        let source = engine.render_source(Path::new("printf.c"), PRINTF).unwrap();
        assert!(source.contains("printf(\"from table\");"));

        let mut config = EngineConfig::default();
        config.overrides.set_text("message", "say \"hi\"");
        config.test_values = serde_json::from_str(r#"{"printf": {"message": "from table"}}"#).unwrap();
        let engine = VerificationEngine::new(config, ToolchainRegistry::builtin());
        let source = engine.render_source(Path::new("printf.c"), PRINTF).unwrap();
        assert!(source.contains(r#"printf("say \"hi\"");"#));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scenario_passing_example() {
        let engine = engine_with(
            fake_c("test -f main.c", sh("printf '%s' \"$1\"")),
            EngineConfig::default(),
        );
        let result = engine.verify_source(Path::new("printf.c"), PRINTF).await;
        assert_eq!(result, Ok(()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scenario_compile_failure() {
        let engine = engine_with(fake_c("exit 1", sh("printf 'unreachable'")), EngineConfig::default());
        let err = engine.verify_source(Path::new("printf.c"), PRINTF).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::CompileError);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scenario_unresolved_placeholder_before_execution() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let touch = format!("touch '{}'", marker.display());
        let engine = engine_with(fake_c(&touch, sh(&touch)), EngineConfig::default());

        let drifted = PRINTF.replace("${message}", "${title}");
        let err = engine.verify_source(Path::new("printf.c"), &drifted).await.unwrap_err();
        assert_eq!(
            err,
            ExampleError::UnresolvedPlaceholder {
                name: "title".to_string(),
                line: 4
            }
        );
        assert!(!marker.exists(), "toolchain ran despite unresolved placeholder");

        // Also reported ahead of a missing toolchain
        let err = engine
            .verify_source(Path::new("printf.cob"), &drifted)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnresolvedPlaceholder);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scenario_timeout() {
        let config = EngineConfig {
            run_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let engine = engine_with(
            fake_c("exit 0", sh("exec sleep 5")),
            config,
        );

        let start = Instant::now();
        let err = engine.verify_source(Path::new("printf.c"), PRINTF).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::RuntimeTimeout);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mismatch_reports_diff() {
        let engine = engine_with(
            fake_c("exit 0", sh("printf 'Goodbye World'")),
            EngineConfig::default(),
        );
        let err = engine.verify_source(Path::new("printf.c"), PRINTF).await.unwrap_err();
        let diff = err.diff().unwrap();
        assert!(diff.contains("-Hello World"));
        assert!(diff.contains("+Goodbye World"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sh_example_with_expect_and_fuzzing() {
        let text = "<<<
name = 'greet'
expect = 'Hello, ${who}! x${times}\\n'
parser.add_argument('who', default='World')
parser.add_argument('--times', '-t', type=int, default=2)
>>>
printf 'Hello, %s! x%s\\n' '${who}' \"$3\"
";
        let engine = VerificationEngine::with_defaults();
        assert_eq!(engine.verify_source(Path::new("greet.sh"), text).await, Ok(()));

        let config = EngineConfig {
            seed: Some(42),
            ..Default::default()
        };
        let engine = VerificationEngine::new(config, ToolchainRegistry::builtin());
        assert_eq!(engine.verify_source(Path::new("greet.sh"), text).await, Ok(()));
    }

    #[tokio::test]
    async fn test_real_c_toolchain() {
        let available = std::process::Command::new("cc").arg("--version").output().is_ok();
        if !available {
            eprintln!("cc not found, skipping");
            return;
        }

        let engine = VerificationEngine::with_defaults();
        assert_eq!(engine.verify_source(Path::new("printf.c"), PRINTF).await, Ok(()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_verify_paths_isolates_failures() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "b-good.sh", "<<<\nparser.add_argument('m', default='ok')\n>>>\nprintf '%s' '${m}'\n");
        let bad_schema = write(&dir, "a-bad.sh", "<<<\nparser.add_argument('m', type=complex)\n>>>\n");
        let crash = write(&dir, "c-crash.sh", "echo boom >&2; exit 7\n");
        let missing = dir.path().join("d-missing.sh");

        let config = EngineConfig {
            jobs: 2,
            ..Default::default()
        };
        let engine = VerificationEngine::new(config, ToolchainRegistry::builtin());
        let summary = engine
            .verify_paths(vec![crash.clone(), missing.clone(), good.clone(), bad_schema.clone()])
            .await;

        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 1);
        assert!(!summary.all_passed());

        let paths: Vec<&Path> = summary.outcomes.iter().map(|o| o.example_path.as_path()).collect();
        assert_eq!(paths, vec![bad_schema.as_path(), good.as_path(), crash.as_path(), missing.as_path()]);

        let kinds: Vec<Option<FailureKind>> = summary.outcomes.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![
                Some(FailureKind::MalformedSchema),
                None,
                Some(FailureKind::RuntimeError),
                Some(FailureKind::MalformedSchema),
            ]
        );
    }
}
