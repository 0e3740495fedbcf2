//! Execution adapter.
//!
//! Writes rendered source into a fresh scratch directory, runs the
//! toolchain's optional build step and then the program, capturing
//! stdout/stderr/exit code. Each step runs in its own process group under
//! one deadline covering exit and pipe EOF; on expiry the whole group is
//! killed and the child reaped before the timeout is reported.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tempy_core::{ArgAction, ArgumentSpec, ExampleError, Invocation, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::toolchain::{Toolchain, WorkPaths};

/// Time bounds for the two process steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub compile_timeout: Duration,
    pub run_timeout: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            compile_timeout: Duration::from_secs(60),
            run_timeout: Duration::from_secs(10),
        }
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Process arguments for an invocation, in declaration order.
///
/// Positionals are passed as bare values, options as `--flag value`, and
/// store_true/store_false flags only when set away from their default.
pub fn invocation_args(schema: &[ArgumentSpec], invocation: &Invocation) -> Vec<String> {
    let mut args = Vec::new();

    for spec in schema {
        let Some(value) = invocation.get(&spec.name) else {
            continue;
        };
        match (spec.action, value) {
            (ArgAction::StoreTrue | ArgAction::StoreFalse, value) => {
                // The flag can only store the action's constant
                let constant = Value::Bool(spec.action == ArgAction::StoreTrue);
                if *value == constant && spec.default.as_ref() != Some(value) {
                    args.push(spec.cli_flag());
                }
            }
            (ArgAction::Store, value) if spec.is_positional() => args.push(value.to_string()),
            (ArgAction::Store, value) => {
                args.push(spec.cli_flag());
                args.push(value.to_string());
            }
        }
    }

    args
}

/// Build (if needed) and run `source` with `toolchain`, passing `args`.
///
/// A non-zero exit of the program is reported as `RuntimeError`; only a
/// successful run yields an [`ExecutionResult`].
pub async fn execute(
    source: &str,
    toolchain: &Toolchain,
    args: &[String],
    limits: ExecutionLimits,
) -> Result<ExecutionResult, ExampleError> {
    let workdir = tempfile::Builder::new()
        .prefix("tempy-")
        .tempdir()
        .map_err(|e| setup_error("failed to create work directory", e))?;
    let paths = WorkPaths::new(workdir.path(), toolchain);

    tokio::fs::write(&paths.source, source)
        .await
        .map_err(|e| setup_error("failed to write rendered source", e))?;

    if let Some(command) = toolchain.compile_command(&paths) {
        tracing::debug!(tag = %toolchain.tag, command = ?command, "compiling");
        let output = run_process(&command, &paths.dir, limits.compile_timeout, "compile", &toolchain.tag).await?;
        if !output.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(ExampleError::CompileError {
                message: extract_compile_error(&stderr, output.exit_code),
                stderr,
            });
        }
    }

    let command = toolchain.run_command(&paths, args);
    tracing::debug!(tag = %toolchain.tag, command = ?command, "running");
    let output = run_process(&command, &paths.dir, limits.run_timeout, "run", &toolchain.tag).await?;

    if !output.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExampleError::RuntimeError {
            code: output.exit_code,
            message: first_line(&stderr).unwrap_or("no stderr output").to_string(),
        });
    }

    // Scratch directory is removed here, after both steps finished
    drop(workdir);
    Ok(output)
}

fn setup_error(context: &str, error: io::Error) -> ExampleError {
    ExampleError::RuntimeError {
        code: None,
        message: format!("{}: {}", context, error),
    }
}

async fn run_process(
    argv: &[String],
    dir: &Path,
    timeout: Duration,
    stage: &str,
    tag: &str,
) -> Result<ExecutionResult, ExampleError> {
    debug_assert!(!timeout.is_zero(), "step timeout must be positive");
    let (program, rest) = argv.split_first().ok_or_else(|| ExampleError::ToolchainUnavailable {
        tag: tag.to_string(),
        reason: format!("empty {} command", stage),
    })?;

    let mut command = Command::new(program);
    command
        .args(rest)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so descendants can be killed with the child
    #[cfg(unix)]
    command.process_group(0);

    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ExampleError::ToolchainUnavailable {
            tag: tag.to_string(),
            reason: format!("`{}` not found", program),
        },
        _ => ExampleError::RuntimeError {
            code: None,
            message: format!("failed to start `{}`: {}", program, e),
        },
    })?;

    let pid = child.id();
    let mut stdout = spawn_reader(child.stdout.take());
    let mut stderr = spawn_reader(child.stderr.take());

    // Exit and EOF on both pipes share one deadline: a descendant holding
    // the pipes open counts against the step's time.
    let finished = tokio::time::timeout(timeout, async {
        let status = child.wait().await;
        (status, collect(&mut stdout).await, collect(&mut stderr).await)
    })
    .await;

    match finished {
        Ok((Ok(status), stdout, stderr)) => {
            // Daemonized leftovers do not outlive the step
            kill_group(pid);
            Ok(ExecutionResult {
                stdout,
                stderr,
                exit_code: status.code(),
                duration: start.elapsed(),
            })
        }
        Ok((Err(e), _, _)) => {
            kill_group(pid);
            Err(ExampleError::RuntimeError {
                code: None,
                message: format!("failed to wait for `{}`: {}", program, e),
            })
        }
        Err(_) => {
            kill_group(pid);
            // kill() also waits, so the child is reaped before we report
            if !matches!(child.try_wait(), Ok(Some(_))) {
                if let Err(e) = child.kill().await {
                    tracing::warn!(pid = ?pid, error = %e, "failed to kill timed out process");
                }
            }
            stdout.abort();
            stderr.abort();
            tracing::warn!(stage, pid = ?pid, ?timeout, "process timed out and was killed");
            Err(ExampleError::RuntimeTimeout {
                stage: stage.to_string(),
                after: timeout,
                pid,
            })
        }
    }
}

/// SIGKILL every process left in the child's process group.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::debug!(error = %e, "pipe read ended early");
            }
        }
        buf
    })
}

async fn collect(handle: &mut JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.await.unwrap_or_default()
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Extract the first error message from compiler output.
fn extract_compile_error(stderr: &str, exit_code: Option<i32>) -> String {
    // gcc/clang: "main.c:4:5: error: ..."; rustc: "error[E0425]: ..."
    for line in stderr.lines() {
        if line.contains("error:") || line.starts_with("error[") {
            return line.trim().to_string();
        }
    }

    first_line(stderr)
        .map(str::to_string)
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("build step exited with code {}", code),
            None => "build step was terminated by a signal".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempy_core::{ArgType, FailureKind};

    #[test]
    fn test_extract_compile_error() {
        let stderr = r#"
main.c: In function 'main':
main.c:4:5: error: expected ';' before 'return'
    4 |     return 0;
"#;
        let error = extract_compile_error(stderr, Some(1));
        assert!(error.starts_with("main.c:4:5: error:"));

        assert_eq!(extract_compile_error("", Some(1)), "build step exited with code 1");
    }

    #[test]
    fn test_invocation_args() {
        let schema = vec![
            ArgumentSpec::positional("message", ArgType::String),
            ArgumentSpec::positional("license", ArgType::String).with_flags(&["--license", "-l"]),
            {
                let mut s = ArgumentSpec::positional("verbose", ArgType::Bool).with_flags(&["-v", "--verbose"]);
                s.action = ArgAction::StoreTrue;
                s
            },
            {
                let mut s = ArgumentSpec::positional("color", ArgType::Bool).with_flags(&["--no-color"]);
                s.action = ArgAction::StoreFalse;
                s
            },
        ];

        let mut inv = Invocation::new();
        inv.insert("message", Value::String("Hello World".into()));
        inv.insert("license", Value::String("MIT".into()));
        inv.insert("verbose", Value::Bool(true));
        inv.insert("color", Value::Bool(true));

        assert_eq!(
            invocation_args(&schema, &inv),
            vec!["Hello World", "--license", "MIT", "--verbose"]
        );
    }

    #[test]
    fn test_flag_at_its_default_is_not_passed() {
        let mut quiet = ArgumentSpec::positional("quiet", ArgType::Bool).with_flags(&["--quiet"]);
        quiet.action = ArgAction::StoreTrue;
        quiet.default = Some(Value::Bool(true));
        let mut color = ArgumentSpec::positional("color", ArgType::Bool).with_flags(&["--no-color"]);
        color.action = ArgAction::StoreFalse;
        color.default = Some(Value::Bool(false));
        let schema = vec![quiet, color];

        let mut inv = Invocation::new();
        inv.insert("quiet", Value::Bool(true));
        inv.insert("color", Value::Bool(false));
        assert!(invocation_args(&schema, &inv).is_empty());
    }

    #[cfg(unix)]
    fn shell(tag: &str, compile: Option<&str>, run: &str) -> Toolchain {
        Toolchain {
            tag: tag.to_string(),
            extensions: Vec::new(),
            source_file: "main.sh".to_string(),
            compile: compile.map(|c| vec!["sh".to_string(), "-c".to_string(), c.to_string()]),
            run: vec!["sh".to_string(), "-c".to_string(), run.to_string()],
            escape: Default::default(),
            bools: Default::default(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout_and_args() {
        let toolchain = Toolchain {
            run: vec!["sh".to_string(), "{source}".to_string()],
            ..shell("sh", None, "")
        };
        let result = execute(
            "printf '%s|%s' \"$1\" \"$2\"; echo oops >&2",
            &toolchain,
            &["a b".to_string(), "c".to_string()],
            ExecutionLimits::default(),
        )
        .await
        .unwrap();

        assert!(result.success());
        assert_eq!(result.stdout, b"a b|c");
        assert_eq!(result.stderr, b"oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compile_failure() {
        let toolchain = shell("fake", Some("echo 'main.c:1:1: error: nope' >&2; exit 1"), "true");
        let err = execute("", &toolchain, &[], ExecutionLimits::default()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::CompileError);
        assert!(err.to_string().contains("error: nope"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runtime_failure() {
        let toolchain = shell("fake", None, "echo crashed >&2; exit 3");
        let err = execute("", &toolchain, &[], ExecutionLimits::default()).await.unwrap_err();
        assert_eq!(
            err,
            ExampleError::RuntimeError {
                code: Some(3),
                message: "crashed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let toolchain = Toolchain {
            tag: "ghost".to_string(),
            extensions: Vec::new(),
            source_file: "main.ghost".to_string(),
            compile: None,
            run: vec!["tempy-no-such-interpreter-xyz".to_string()],
            escape: Default::default(),
            bools: Default::default(),
        };
        let err = execute("", &toolchain, &[], ExecutionLimits::default()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ToolchainUnavailable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let toolchain = Toolchain {
            run: vec!["sleep".to_string(), "5".to_string()],
            ..shell("sleepy", None, "")
        };
        let limits = ExecutionLimits {
            run_timeout: Duration::from_millis(200),
            ..Default::default()
        };

        let start = Instant::now();
        let err = execute("", &toolchain, &[], limits).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(4));

        let pid = match err {
            ExampleError::RuntimeTimeout { ref stage, pid, .. } => {
                assert_eq!(stage, "run");
                pid.expect("process was spawned")
            }
            other => panic!("expected RuntimeTimeout, got {:?}", other),
        };

        #[cfg(target_os = "linux")]
        assert!(
            !Path::new(&format!("/proc/{}", pid)).exists(),
            "timed out process {} is still alive",
            pid
        );
        let _ = pid;
    }

    #[cfg(target_os = "linux")]
    fn sleep_is_running(seconds: &str) -> bool {
        let needle = format!("sleep\0{}", seconds);
        std::fs::read_dir("/proc")
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| std::fs::read(entry.path().join("cmdline")).ok())
            .any(|cmdline| String::from_utf8_lossy(&cmdline).contains(&needle))
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let toolchain = Toolchain {
            run: vec!["sh".to_string(), "{source}".to_string()],
            ..shell("sh", None, "")
        };
        let limits = ExecutionLimits {
            run_timeout: Duration::from_millis(300),
            ..Default::default()
        };

        let err = execute("sleep 7.77\necho done\n", &toolchain, &[], limits)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::RuntimeTimeout);

        let deadline = Instant::now() + Duration::from_secs(1);
        while sleep_is_running("7.77") && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!sleep_is_running("7.77"), "grandchild outlived the timed out run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_child_holding_pipes_times_out() {
        let toolchain = Toolchain {
            run: vec!["sh".to_string(), "{source}".to_string()],
            ..shell("sh", None, "")
        };
        let limits = ExecutionLimits {
            run_timeout: Duration::from_millis(300),
            ..Default::default()
        };

        let start = Instant::now();
        let err = execute("sleep 4 &\necho hi\n", &toolchain, &[], limits)
            .await
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(err.kind(), FailureKind::RuntimeTimeout);
    }
}
