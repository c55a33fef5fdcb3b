//! Parameter types for PowerShell MCP tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::format::OutputFormat;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecutePowerShellParams {
    #[schemars(description = "PowerShell command or script to execute")]
    pub command: String,

    #[schemars(description = "Execution timeout in seconds (optional, clamped to server max)")]
    #[serde(default)]
    pub timeout: Option<u64>,

    #[schemars(description = "Output format: text, json, xml or csv (default: text)")]
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunScriptParams {
    #[schemars(description = "PowerShell script content to execute")]
    pub script: String,

    #[schemars(description = "Arguments to pass to the script (optional)")]
    #[serde(default)]
    pub arguments: Vec<String>,

    #[schemars(description = "Execution timeout in seconds (optional, clamped to server max)")]
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TestSafetyParams {
    #[schemars(description = "PowerShell command to test for safety")]
    pub command: String,
}
