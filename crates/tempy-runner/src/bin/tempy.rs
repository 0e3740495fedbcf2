//! CLI for verifying template examples.
//!
//! # Usage
//!
//! ```bash
//! # Verify every example in ~/.tempy (or $TEMPY_DIR)
//! cargo run -p tempy-runner --features cli --bin tempy -- verify
//!
//! # Verify specific files with an override and JSON output
//! cargo run -p tempy-runner --features cli --bin tempy -- verify c-printf.c --set message=Hi --format json
//!
//! # List available examples
//! cargo run -p tempy-runner --features cli --bin tempy -- list -m
//!
//! # Show what an example renders to
//! cargo run -p tempy-runner --features cli --bin tempy -- render c-printf.c
//! ```
//!
//! Exit codes: 0 when every example passed, 1 when any failed, 2 when the
//! paths, registry or value tables could not be read.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tempy_runner::{EngineConfig, RegistryError, ToolchainRegistry, VerificationEngine};
use thiserror::Error;
use tracing_subscriber::prelude::*;

const DEFAULT_FILTER: &str = "tempy=info,tempy_runner=info";
const VERBOSE_FILTER: &str = "tempy=debug,tempy_runner=debug,tempy_template=debug";

#[derive(Parser)]
#[command(name = "tempy", version, about = "Verify schema-driven template examples")]
struct Cli {
    /// Template directory used when no paths are given
    #[arg(short = 't', long = "tempydir", global = true, value_name = "DIR")]
    tempydir: Option<PathBuf>,

    /// JSON file adding or replacing toolchains
    #[arg(long, global = true, value_name = "FILE")]
    registry: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render, run and check examples
    Verify(VerifyArgs),

    /// List examples with their descriptions
    List {
        /// Example files or directories
        paths: Vec<PathBuf>,

        /// Machine-readable `name:description` lines
        #[arg(short, long)]
        machine: bool,
    },

    /// Print the rendered source of one example
    Render {
        file: PathBuf,

        /// Override an argument value
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
}

#[derive(Args)]
struct VerifyArgs {
    /// Example files or directories
    paths: Vec<PathBuf>,

    /// Run timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Build timeout in seconds
    #[arg(long, value_name = "SECS")]
    compile_timeout: Option<u64>,

    /// Examples verified concurrently
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Override an argument value in every example
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// JSON test-value table keyed by example name
    #[arg(long, value_name = "FILE")]
    values: Option<PathBuf>,

    /// Fuzz argument values with this seed
    #[arg(long)]
    seed: Option<u64>,

    /// Short timeouts
    #[arg(long, conflicts_with = "thorough")]
    fast: bool,

    /// Long timeouts
    #[arg(long)]
    thorough: bool,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid test-value table {path}: {source}")]
    Values {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid --set: {0}")]
    Override(String),

    #[error("no template directory: pass paths, --tempydir or set $TEMPY_DIR")]
    NoTemplateDir,

    #[error("failed to serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let mut registry = ToolchainRegistry::builtin();
    if let Some(ref path) = cli.registry {
        registry.merge_file(path)?;
    }

    match cli.command {
        Command::Verify(args) => verify(args, cli.tempydir, registry).await,
        Command::List { paths, machine } => {
            let engine = VerificationEngine::new(EngineConfig::default(), registry);
            list(&engine, &discover(&paths, cli.tempydir)?, machine);
            Ok(ExitCode::SUCCESS)
        }
        Command::Render { file, set } => {
            let mut config = EngineConfig::default();
            for pair in &set {
                config.overrides.set_pair(pair).map_err(CliError::Override)?;
            }
            let engine = VerificationEngine::new(config, registry);
            let text = read(&file)?;
            match engine.render_source(&file, &text) {
                Ok(source) => {
                    print!("{}", source);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{}: {}", file.display(), e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

async fn verify(
    args: VerifyArgs,
    tempydir: Option<PathBuf>,
    registry: ToolchainRegistry,
) -> Result<ExitCode, CliError> {
    let mut config = if args.fast {
        EngineConfig::fast()
    } else if args.thorough {
        EngineConfig::thorough()
    } else {
        EngineConfig::default()
    };

    if let Some(secs) = args.timeout {
        config.run_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.compile_timeout {
        config.compile_timeout = Duration::from_secs(secs);
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    for pair in &args.set {
        config.overrides.set_pair(pair).map_err(CliError::Override)?;
    }
    if let Some(path) = args.values {
        let text = read(&path)?;
        config.test_values = serde_json::from_str(&text).map_err(|source| CliError::Values { path, source })?;
    }
    config.seed = args.seed;

    let paths = discover(&args.paths, tempydir)?;
    tracing::debug!(examples = paths.len(), jobs = config.jobs, "starting verification");

    let engine = VerificationEngine::new(config, registry);
    let summary = engine.verify_paths(paths).await;

    match args.format {
        Format::Text => print!("{}", summary.format_report()),
        Format::Json => println!("{}", summary.to_json()?),
    }

    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list(engine: &VerificationEngine, paths: &[PathBuf], machine: bool) {
    for path in paths {
        let document = match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| engine.parse(path, &text).map_err(|e| e.to_string()))
        {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping");
                continue;
            }
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = document.display_name(&file_name);
        let description = document.meta.description.as_deref().unwrap_or("");

        if machine {
            println!("{}:{}", name, description);
        } else {
            println!("{:<20}{}", name, description);
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CliError {
    let path = path.to_path_buf();
    move |source| CliError::Io { path, source }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(io_error(path))
}

fn template_dir(tempydir: Option<PathBuf>) -> Result<PathBuf, CliError> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    resolve_template_dir(tempydir, std::env::var_os("TEMPY_DIR"), home).ok_or(CliError::NoTemplateDir)
}

/// `--tempydir`, then `$TEMPY_DIR`, then `<home>/.tempy`.
fn resolve_template_dir(
    flag: Option<PathBuf>,
    tempy_dir: Option<OsString>,
    home: Option<OsString>,
) -> Option<PathBuf> {
    flag.or_else(|| tempy_dir.map(PathBuf::from))
        .or_else(|| home.map(|home| PathBuf::from(home).join(".tempy")))
}

/// Expand directories to their regular, non-hidden files (sorted).
fn discover(paths: &[PathBuf], tempydir: Option<PathBuf>) -> Result<Vec<PathBuf>, CliError> {
    let roots = if paths.is_empty() {
        vec![template_dir(tempydir)?]
    } else {
        paths.to_vec()
    };

    let mut found = Vec::new();
    for root in roots {
        let metadata = std::fs::metadata(&root).map_err(io_error(&root))?;
        if !metadata.is_dir() {
            found.push(root);
            continue;
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&root).map_err(io_error(&root))? {
            let entry = entry.map_err(io_error(&root))?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            let path = entry.path();
            if !hidden && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        found.extend(files);
    }

    Ok(found)
}
