//! Layered configuration for PowerShell MCP
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. Config file (`.toml` or `.json`)
//! 3. `POWERSHELL_MCP_*` environment variables (`__` separates sections)
//! 4. Command-line overrides

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix for environment overrides, e.g. `POWERSHELL_MCP_SECURITY__COMMAND_TIMEOUT=60`
pub const ENV_PREFIX: &str = "POWERSHELL_MCP_";

/// Env var naming the config file (consumed by the CLI, not as an override)
pub const CONFIG_PATH_ENV: &str = "POWERSHELL_MCP_CONFIG";

const LOG_LEVELS: [&str; 7] = ["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR", "CRITICAL"];
const LOG_FORMATS: [&str; 2] = ["text", "json"];

// ============================================================================
// Configuration Types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Passed to `-ExecutionPolicy`; not enforced by this server
    #[serde(default = "default_execution_policy")]
    pub execution_policy: String,

    /// Regex patterns, matched case-insensitively anywhere in the command
    #[serde(default = "default_dangerous_patterns")]
    pub dangerous_patterns: Vec<String>,

    /// Names rejected by case-insensitive substring match
    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,

    /// Maximum command length in characters
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,

    /// Default timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    /// Upper bound for caller-supplied timeouts in seconds
    #[serde(default = "default_max_timeout")]
    pub max_timeout: u64,
}

fn default_execution_policy() -> String {
    "Restricted".to_string()
}

fn default_dangerous_patterns() -> Vec<String> {
    [
        r"rm\s+-Recurse",
        r"Remove-Item\s+.*\s+-Recurse",
        r"Format-Volume",
        r"Clear-Disk",
        r"Reset-ComputerMachinePassword",
        r"Invoke-Expression.*Invoke-WebRequest",
        r"Start-Process.*-Verb\s+RunAs",
        r"New-Service",
        r"Stop-Service",
        r"Set-ExecutionPolicy\s+Unrestricted",
        r"Invoke-Command\s+.*\s+-ScriptBlock",
        r"New-PSSession",
        r"Enter-PSSession",
        r"Enable-PSRemoting",
        r"Set-Item\s+WSMan:",
        r"Registry::",
        r"HKEY_",
        r"Get-Credential",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_blocked_commands() -> Vec<String> {
    [
        "Format-Computer",
        "Remove-Computer",
        "Reset-ComputerMachinePassword",
        "Restart-Computer",
        "Stop-Computer",
        "Checkpoint-Computer",
        "Restore-Computer",
        "Clear-RecycleBin",
        "Remove-Item",
        "rd",
        "rmdir",
        "del",
        "erase",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_command_length() -> usize {
    5000
}

fn default_command_timeout() -> u64 {
    30
}

fn default_max_timeout() -> u64 {
    300
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            execution_policy: default_execution_policy(),
            dangerous_patterns: default_dangerous_patterns(),
            blocked_commands: default_blocked_commands(),
            max_command_length: default_max_command_length(),
            command_timeout: default_command_timeout(),
            max_timeout: default_max_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Interpreter to spawn
    #[serde(default = "default_program")]
    pub program: String,
}

fn default_program() -> String {
    "powershell.exe".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Directory for the rolling log file; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,

    /// Append every tool invocation to the command history
    #[serde(default = "default_true")]
    pub enable_command_logging: bool,

    #[serde(default = "default_history_dir")]
    pub command_history_dir: PathBuf,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_log_files() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("command_history")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_dir: None,
            max_log_files: default_max_log_files(),
            enable_command_logging: default_true(),
            command_history_dir: default_history_dir(),
        }
    }
}

impl LoggingConfig {
    /// The configured level as a tracing filter directive
    pub fn tracing_level(&self) -> &'static str {
        match self.log_level.to_ascii_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARN" | "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }

    pub fn is_json(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

// ============================================================================
// Loading
// ============================================================================

/// A merged configuration and the file it came from, if any
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load and merge all configuration layers
    ///
    /// When `explicit` is `None` the first existing file of
    /// `./powershell-mcp.toml`, `$XDG_CONFIG_HOME/powershell-mcp/config.toml`
    /// and `~/.powershell-mcp.toml` is used.
    pub fn load(explicit: Option<&Path>, overrides: Value) -> Result<LoadedConfig> {
        let source = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_paths().into_iter().find(|p| p.exists()),
        };

        let file_layer = match &source {
            Some(path) => read_config_file(path)?,
            None => Value::Object(Map::new()),
        };

        let env_layer = env_overlay(std::env::vars());
        let config = Self::from_layers([file_layer, env_layer, overrides])?;

        Ok(LoadedConfig { config, source })
    }

    /// Merge layers over the defaults, later layers winning
    pub fn from_layers(layers: impl IntoIterator<Item = Value>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;
        for layer in layers {
            merge_values(&mut merged, layer);
        }
        serde_json::from_value(merged).context("Invalid configuration")
    }

    /// Check the configuration and return every issue found
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let security = &self.security;

        if security.command_timeout == 0 {
            issues.push("Command timeout must be greater than 0".to_string());
        }
        if security.max_timeout < security.command_timeout {
            issues.push("Max timeout must not be smaller than the command timeout".to_string());
        }
        if security.max_command_length == 0 {
            issues.push("Max command length must be greater than 0".to_string());
        }
        for pattern in &security.dangerous_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                issues.push(format!("Invalid dangerous pattern '{}': {}", pattern, e));
            }
        }
        if self.shell.program.trim().is_empty() {
            issues.push("Shell program must not be empty".to_string());
        }

        let level = self.logging.log_level.to_ascii_uppercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            issues.push(format!("Log level must be one of: {}", LOG_LEVELS.join(", ")));
        }
        let format = self.logging.log_format.to_ascii_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            issues.push(format!("Log format must be one of: {}", LOG_FORMATS.join(", ")));
        }

        issues
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("powershell-mcp.toml")];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("powershell-mcp").join("config.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".powershell-mcp.toml"));
    }

    paths
}

fn read_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }
}

/// Build an override layer from `POWERSHELL_MCP_*` variables
///
/// Values are parsed as JSON when possible (numbers, booleans, lists) and
/// kept as strings otherwise.
pub fn env_overlay(vars: impl IntoIterator<Item = (String, String)>) -> Value {
    let mut root = Map::new();

    'vars: for (key, raw) in vars {
        if key == CONFIG_PATH_ENV {
            continue;
        }
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        let lowered = rest.to_ascii_lowercase();
        let parts: Vec<&str> = lowered.split("__").filter(|p| !p.is_empty()).collect();
        let Some((last, sections)) = parts.split_last() else {
            continue;
        };

        let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));

        let mut current = &mut root;
        for section in sections {
            let entry = current
                .entry(section.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Some(next) = entry.as_object_mut() else {
                continue 'vars;
            };
            current = next;
        }
        current.insert(last.to_string(), value);
    }

    Value::Object(root)
}

/// Deep-merge `overlay` into `base`; objects merge, nulls are skipped,
/// everything else replaces
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}
