//! Command runner - gate, spawn, bounded wait, normalized result
//!
//! Every invocation is independent: it owns its child process, its timer and
//! (in script mode) its temp file. Nothing is retried.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, instrument, warn};

use crate::format::OutputFormat;
use crate::gate::SafetyGate;
use crate::policy::Policy;
use crate::types::{ExecError, ExecutionResult, NO_EXIT_CODE};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Process Spawning
// ============================================================================

/// Program and argument vector for one interpreter launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellInvocation {
    /// Fixed PowerShell argument shape; the command is always one argv entry
    pub fn powershell(program: &str, execution_policy: &str, command: &str) -> Self {
        Self {
            program: program.to_string(),
            args: vec![
                "-ExecutionPolicy".to_string(),
                execution_policy.to_string(),
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-Command".to_string(),
                command.to_string(),
            ],
        }
    }

    /// The command text passed after `-Command`
    pub fn command_text(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or_default()
    }
}

/// Starts interpreter processes
///
/// Returning the `Child` keeps the handle with the caller, so the timeout
/// path (or any other watchdog) can kill it.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, invocation: &ShellInvocation) -> std::io::Result<Child>;
}

/// Spawns the invocation as-is with piped output and no stdin
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerShellSpawner;

impl ProcessSpawner for PowerShellSpawner {
    fn spawn(&self, invocation: &ShellInvocation) -> std::io::Result<Child> {
        Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Gates, executes and normalizes PowerShell commands
#[derive(Clone)]
pub struct CommandRunner {
    gate: SafetyGate,
    program: String,
    spawner: Arc<dyn ProcessSpawner>,
}

impl CommandRunner {
    pub fn new(policy: Arc<Policy>, program: impl Into<String>) -> Self {
        Self {
            gate: SafetyGate::new(policy),
            program: program.into(),
            spawner: Arc::new(PowerShellSpawner),
        }
    }

    /// Replace the process spawner
    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    pub fn policy(&self) -> &Policy {
        self.gate.policy()
    }

    /// Caller timeout when present and positive, else the policy default
    pub fn effective_timeout(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|secs| *secs > 0)
            .unwrap_or(self.policy().default_timeout_secs)
    }

    /// Run a command through the gate and, if allowed, the interpreter
    ///
    /// Always returns a result; denials, timeouts and spawn failures are
    /// reported inside it with `exit_code == -1`.
    #[instrument(skip_all, fields(format = %format, timeout = ?timeout))]
    pub async fn execute(
        &self,
        code: &str,
        timeout: Option<u64>,
        format: OutputFormat,
    ) -> ExecutionResult {
        let verdict = self.gate.check(code);
        if !verdict.is_safe {
            warn!(reason = %verdict.reason, "Security check failed");
            return ExecutionResult::denied(verdict.reason);
        }

        let timeout_secs = self.effective_timeout(timeout);
        let command = format.apply(code);
        let invocation =
            ShellInvocation::powershell(&self.program, &self.policy().execution_policy, &command);

        let started = Instant::now();
        let child = match self.spawner.spawn(&invocation) {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, program = %self.program, "PowerShell execution error");
                return ExecutionResult::spawn_failed(e, started.elapsed().as_secs_f64());
            }
        };
        debug!(timeout_secs, "Spawned interpreter");

        wait_bounded(child, timeout_secs, started).await
    }

    /// Run script content by writing it to a temp `.ps1` file
    ///
    /// Only the constructed `& '<file>' <args>` invocation goes through the
    /// gate. The file is removed once the child has exited, on every path.
    #[instrument(skip_all, fields(script_len = script.len(), args = arguments.len()))]
    pub async fn run_script(
        &self,
        script: &str,
        arguments: &[String],
        timeout: Option<u64>,
    ) -> Result<ExecutionResult, ExecError> {
        let mut file = tempfile::Builder::new()
            .prefix("pwsh-mcp-")
            .suffix(".ps1")
            .tempfile()?;
        file.write_all(script.as_bytes())?;
        file.flush()?;

        // Close our handle so the interpreter can open the file everywhere
        let path = file.into_temp_path();
        let command = script_invocation(&path, arguments);

        let result = self.execute(&command, timeout, OutputFormat::Text).await;

        if let Err(e) = path.close() {
            warn!(error = %e, "Failed to remove temporary script file");
        }

        Ok(result)
    }
}

/// Wait for the child within the timeout, killing it on expiry
async fn wait_bounded(mut child: Child, timeout_secs: u64, started: Instant) -> ExecutionResult {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let run = async {
        let (status, stdout, stderr) =
            tokio::join!(child.wait(), read_lossy(stdout), read_lossy(stderr));
        Ok::<_, std::io::Error>((status?, stdout?, stderr?))
    };

    match tokio::time::timeout(Duration::from_secs(timeout_secs), run).await {
        Ok(Ok((status, stdout, stderr))) => {
            let elapsed = started.elapsed().as_secs_f64();
            let exit_code = status.code().unwrap_or(NO_EXIT_CODE);
            info!(
                exit_code,
                "Command executed in {:.2}s with exit code {}", elapsed, exit_code
            );
            ExecutionResult::completed(exit_code, &stdout, &stderr, elapsed)
        }
        Ok(Err(e)) => {
            terminate(&mut child).await;
            error!(error = %e, "PowerShell execution error");
            ExecutionResult::spawn_failed(e, started.elapsed().as_secs_f64())
        }
        Err(_elapsed) => {
            terminate(&mut child).await;
            let elapsed = started.elapsed().as_secs_f64();
            warn!("Command timed out after {} seconds", timeout_secs);
            ExecutionResult::timed_out(timeout_secs, elapsed)
        }
    }
}

/// Forcibly kill and reap the child; failures are only logged
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill PowerShell process");
    }
}

async fn read_lossy<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Build `& '<path>' '<arg>' ...` with PowerShell single-quote escaping
pub fn script_invocation(path: &Path, arguments: &[String]) -> String {
    let mut command = format!("& {}", quote(&path.to_string_lossy()));
    for arg in arguments {
        command.push(' ');
        command.push_str(&quote(arg));
    }
    command
}

/// PowerShell literal string: wrap in single quotes, double embedded ones
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// ============================================================================
// Startup Probe
// ============================================================================

/// Check that the interpreter starts and answers within five seconds
pub async fn probe_shell(program: &str) -> Result<(), ExecError> {
    let probe = Command::new(program)
        .args([
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            "echo 'PowerShell Available'",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => Err(ExecError::ShellUnavailable(format!(
            "{} exited with {}",
            program, output.status
        ))),
        Ok(Err(e)) => Err(ExecError::ShellUnavailable(format!("{}: {}", program, e))),
        Err(_) => Err(ExecError::ShellUnavailable(format!(
            "{} did not respond within {} seconds",
            program,
            PROBE_TIMEOUT.as_secs()
        ))),
    }
}
