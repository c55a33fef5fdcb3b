//! Type definitions for PowerShell MCP

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::Verdict;

/// Exit code reported when no process ran to completion
pub const NO_EXIT_CODE: i32 = -1;

/// Smallest `execution_time` reported once a spawn was attempted
pub const MIN_RUN_SECS: f64 = 0.01;

/// Process exit code used by direct CLI execution for denials, timeouts and
/// spawn failures
pub const CLI_FAILURE_EXIT_CODE: i32 = 1;

// ============================================================================
// Execution Result
// ============================================================================

/// Normalized outcome of a single command invocation
///
/// Gate denials, timeouts, spawn failures and non-zero exits all share this
/// shape. A denial is the only case with an `execution_time` of exactly zero;
/// anything that reached the spawner reports at least [`MIN_RUN_SECS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Wall-clock seconds from spawn to completion, rounded to 0.01
    pub execution_time: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// The gate rejected the command; nothing was spawned
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: NO_EXIT_CODE,
            execution_time: 0.0,
            error: Some(reason.into()),
        }
    }

    /// The process ran to completion
    pub fn completed(exit_code: i32, stdout: &str, stderr: &str, elapsed_secs: f64) -> Self {
        let stderr = stderr.trim().to_string();
        let error = (exit_code != 0).then(|| stderr.clone());

        Self {
            success: exit_code == 0,
            stdout: stdout.trim().to_string(),
            stderr,
            exit_code,
            execution_time: run_secs(elapsed_secs),
            error,
        }
    }

    /// The process exceeded its timeout and was killed
    pub fn timed_out(timeout_secs: u64, elapsed_secs: f64) -> Self {
        Self::failed(
            format!("Command timed out after {} seconds", timeout_secs),
            elapsed_secs,
        )
    }

    /// The process could not be started or communicated with
    pub fn spawn_failed(cause: impl std::fmt::Display, elapsed_secs: f64) -> Self {
        Self::failed(format!("Execution failed: {}", cause), elapsed_secs)
    }

    fn failed(message: String, elapsed_secs: f64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.clone(),
            exit_code: NO_EXIT_CODE,
            execution_time: run_secs(elapsed_secs),
            error: Some(message),
        }
    }

    /// Exit code for the direct-execution CLI
    ///
    /// Mirrors the command's own exit code, or [`CLI_FAILURE_EXIT_CODE`] when
    /// no process completed.
    pub fn process_exit_code(&self) -> i32 {
        match self.exit_code {
            NO_EXIT_CODE => CLI_FAILURE_EXIT_CODE,
            code => code,
        }
    }
}

/// Elapsed seconds rounded to 0.01, never below [`MIN_RUN_SECS`]
fn run_secs(secs: f64) -> f64 {
    ((secs * 100.0).round() / 100.0).max(MIN_RUN_SECS)
}

// ============================================================================
// Invocation Kinds
// ============================================================================

/// How a command reached the runner, recorded in the command history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationKind {
    Standard,
    Script,
}

// ============================================================================
// Response Types
// ============================================================================

/// Response for `execute_powershell`
#[derive(Debug, Serialize)]
pub struct ExecuteResponse<'a> {
    pub tool: &'static str,
    pub command: &'a str,
    pub result: &'a ExecutionResult,
}

/// Response for `run_powershell_script`
#[derive(Debug, Serialize)]
pub struct ScriptResponse<'a> {
    pub tool: &'static str,
    pub script_length: usize,
    pub arguments: &'a [String],
    pub result: &'a ExecutionResult,
}

/// Response for `test_powershell_safety`
#[derive(Debug, Serialize)]
pub struct SafetyResponse<'a> {
    pub tool: &'static str,
    pub command: &'a str,
    pub is_safe: bool,
    pub message: String,
    pub checks_performed: [&'static str; 3],
}

impl<'a> SafetyResponse<'a> {
    pub fn new(command: &'a str, verdict: &Verdict) -> Self {
        let message = if verdict.is_safe {
            "Command passed security checks".to_string()
        } else {
            verdict.reason.clone()
        };

        Self {
            tool: "test_powershell_safety",
            command,
            is_safe: verdict.is_safe,
            message,
            checks_performed: [
                "Command length validation",
                "Blocked command detection",
                "Dangerous pattern detection",
            ],
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Invalid dangerous pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("PowerShell unavailable: {0}")]
    ShellUnavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_has_zero_time() {
        let result = ExecutionResult::denied("Blocked command detected: del");
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.execution_time, 0.0);
        assert!(result.stdout.is_empty());
        assert!(result.stderr.is_empty());
        assert_eq!(result.error.as_deref(), Some("Blocked command detected: del"));
    }

    #[test]
    fn test_completed_success_has_no_error() {
        let result = ExecutionResult::completed(0, "  hello\r\n", "warning text\n", 0.1234);
        assert!(result.success);
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.stderr, "warning text");
        assert_eq!(result.error, None);
        assert_eq!(result.execution_time, 0.12);
    }

    #[test]
    fn test_completed_failure_surfaces_stderr() {
        let result = ExecutionResult::completed(2, "", "  not found \n", 1.0);
        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.error.as_deref(), Some("not found"));
        assert_eq!(result.process_exit_code(), 2);
    }

    #[test]
    fn test_timeout_message() {
        let result = ExecutionResult::timed_out(5, 5.014);
        assert_eq!(result.error.as_deref(), Some("Command timed out after 5 seconds"));
        assert_eq!(result.stderr, "Command timed out after 5 seconds");
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.execution_time, 5.01);
        assert_eq!(result.process_exit_code(), CLI_FAILURE_EXIT_CODE);
    }

    #[test]
    fn test_spawn_failure_message() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "program not found");
        let result = ExecutionResult::spawn_failed(err, 0.0);
        assert_eq!(
            result.error.as_deref(),
            Some("Execution failed: program not found")
        );
        assert!(!result.success);
        assert_eq!(result.execution_time, MIN_RUN_SECS);
    }

    #[test]
    fn test_only_denial_reports_zero_time() {
        assert_eq!(ExecutionResult::denied("no").execution_time, 0.0);
        assert!(ExecutionResult::completed(0, "", "", 0.001).execution_time > 0.0);
        assert!(ExecutionResult::timed_out(1, 0.0).execution_time > 0.0);
        assert!(ExecutionResult::spawn_failed("gone", 0.004).execution_time > 0.0);
    }

    #[test]
    fn test_serialized_field_names() {
        let value = serde_json::to_value(ExecutionResult::denied("no")).unwrap();
        for key in ["success", "stdout", "stderr", "exit_code", "execution_time", "error"] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }
}
