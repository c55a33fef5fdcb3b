//! Tool handlers
//!
//! Input validation happens here, before anything reaches the safety gate.
//! The handlers then delegate to the runner and record history.

use mcp_common::{invalid_params, json_success, CallToolResult, McpError, McpResult, ResultExt};
use serde_json::{json, Map, Value};

use crate::gate::SafetyGate;
use crate::history::CommandHistory;
use crate::params::*;
use crate::runner::CommandRunner;
use crate::types::{
    ExecError, ExecuteResponse, ExecutionResult, InvocationKind, SafetyResponse, ScriptResponse,
};

// ============================================================================
// Helper Functions
// ============================================================================

impl mcp_common::IntoMcpError for ExecError {
    fn into_mcp_error(self) -> McpError {
        mcp_common::internal_error(self.to_string())
    }
}

/// `"<what> cannot be empty"` when `value` is blank
pub fn blank_input(value: &str, what: &str) -> Option<String> {
    value
        .trim()
        .is_empty()
        .then(|| format!("{} cannot be empty", what))
}

fn require_non_empty(value: &str, what: &str) -> McpResult<()> {
    match blank_input(value, what) {
        Some(message) => Err(invalid_params(message)),
        None => Ok(()),
    }
}

fn clamp_timeout(requested: Option<u64>, max_timeout: u64) -> Option<u64> {
    requested.map(|secs| secs.min(max_timeout))
}

fn outcome_metadata(mut metadata: Map<String, Value>, result: &ExecutionResult) -> Map<String, Value> {
    metadata.insert("success".to_string(), json!(result.success));
    metadata.insert("exit_code".to_string(), json!(result.exit_code));
    metadata
}

// ============================================================================
// Handler Functions
// ============================================================================

pub async fn execute_powershell(
    runner: &CommandRunner,
    history: Option<&CommandHistory>,
    max_timeout: u64,
    params: ExecutePowerShellParams,
) -> McpResult<CallToolResult> {
    require_non_empty(&params.command, "Command")?;

    let timeout = clamp_timeout(params.timeout, max_timeout);
    let result = runner.execute(&params.command, timeout, params.format).await;

    if let Some(history) = history {
        let mut metadata = Map::new();
        metadata.insert("timeout".to_string(), json!(runner.effective_timeout(timeout)));
        metadata.insert("format".to_string(), json!(params.format));
        history
            .record(
                &params.command,
                InvocationKind::Standard,
                outcome_metadata(metadata, &result),
            )
            .await;
    }

    json_success(&ExecuteResponse {
        tool: "execute_powershell",
        command: &params.command,
        result: &result,
    })
}

pub async fn run_powershell_script(
    runner: &CommandRunner,
    history: Option<&CommandHistory>,
    max_timeout: u64,
    params: RunScriptParams,
) -> McpResult<CallToolResult> {
    require_non_empty(&params.script, "Script")?;

    let timeout = clamp_timeout(params.timeout, max_timeout);
    let result = runner
        .run_script(&params.script, &params.arguments, timeout)
        .await
        .to_mcp_err()?;

    if let Some(history) = history {
        let mut metadata = Map::new();
        metadata.insert("timeout".to_string(), json!(runner.effective_timeout(timeout)));
        metadata.insert("script_length".to_string(), json!(params.script.len()));
        metadata.insert("argument_count".to_string(), json!(params.arguments.len()));
        history
            .record(
                &params.script,
                InvocationKind::Script,
                outcome_metadata(metadata, &result),
            )
            .await;
    }

    json_success(&ScriptResponse {
        tool: "run_powershell_script",
        script_length: params.script.len(),
        arguments: &params.arguments,
        result: &result,
    })
}

/// Gate only; never spawns
pub fn test_powershell_safety(
    gate: &SafetyGate,
    params: TestSafetyParams,
) -> McpResult<CallToolResult> {
    require_non_empty(&params.command, "Command")?;

    let verdict = gate.check(&params.command);
    json_success(&SafetyResponse::new(&params.command, &verdict))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rejected() {
        let err = require_non_empty("   \n\t", "Command").unwrap_err();
        assert_eq!(err.message, "Command cannot be empty");
        assert!(require_non_empty("Get-Date", "Command").is_ok());
    }

    #[test]
    fn test_blank_input_message() {
        assert_eq!(blank_input(" ", "Script").as_deref(), Some("Script cannot be empty"));
        assert_eq!(blank_input("Get-Date", "Command"), None);
    }

    #[test]
    fn test_clamp_timeout() {
        assert_eq!(clamp_timeout(None, 300), None);
        assert_eq!(clamp_timeout(Some(10), 300), Some(10));
        assert_eq!(clamp_timeout(Some(3600), 300), Some(300));
    }

    #[test]
    fn test_exec_error_maps_to_internal_error() {
        use mcp_common::IntoMcpError;
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "temp dir read-only");
        let err = ExecError::from(io).into_mcp_error();
        assert!(err.message.contains("IO error: temp dir read-only"));
    }
}
