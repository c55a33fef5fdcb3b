//! PowerShell MCP - gated PowerShell execution over MCP
//!
//! Usage:
//!   powershell-mcp                                  serve over stdio
//!   powershell-mcp --execute "Get-Date" --format json
//!   powershell-mcp --config ./powershell-mcp.toml --log-level debug

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use mcp_common::{init_tracing, serve_stdio, TracingOptions};
use serde_json::{json, Map, Value};

use powershell_mcp::config::Config;
use powershell_mcp::format::OutputFormat;
use powershell_mcp::handlers::blank_input;
use powershell_mcp::runner::probe_shell;
use powershell_mcp::types::CLI_FAILURE_EXIT_CODE;
use powershell_mcp::PowerShellMcpServer;

#[derive(Parser)]
#[command(name = "powershell-mcp")]
#[command(about = "PowerShell execution MCP server with a command safety gate")]
#[command(version)]
struct Cli {
    /// Config file (.toml or .json)
    #[arg(short, long, env = "POWERSHELL_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARNING, ERROR)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text or json)
    #[arg(long)]
    log_format: Option<String>,

    /// Run a single command and exit instead of serving
    #[arg(short, long)]
    execute: Option<String>,

    /// Output format for --execute
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, requires = "execute")]
    format: OutputFormat,

    /// Timeout in seconds for --execute
    #[arg(long, requires = "execute")]
    timeout: Option<u64>,

    /// Skip the PowerShell availability check at startup
    #[arg(long)]
    skip_shell_check: bool,
}

impl Cli {
    /// Highest-priority config layer built from flags
    fn overrides(&self) -> Value {
        let mut logging = Map::new();
        if let Some(level) = &self.log_level {
            logging.insert("log_level".to_string(), json!(level));
        }
        if let Some(format) = &self.log_format {
            logging.insert("log_format".to_string(), json!(format));
        }
        json!({ "logging": logging })
    }

    /// The `--execute` command, rejected when blank
    fn direct_command(&self) -> Option<Result<&str, String>> {
        self.execute
            .as_deref()
            .map(|command| match blank_input(command, "Command") {
                Some(message) => Err(message),
                None => Ok(command),
            })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let code = run(cli).await?;
    std::process::exit(code);
}

/// Returns the process exit code; the log writer is flushed before it is used
async fn run(cli: Cli) -> Result<i32> {
    let loaded = Config::load(cli.config.as_deref(), cli.overrides())?;
    let config = loaded.config;

    let issues = config.validate();
    if !issues.is_empty() {
        eprintln!("Configuration validation failed:");
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        return Ok(CLI_FAILURE_EXIT_CODE);
    }

    let mut options = TracingOptions::new("powershell_mcp");
    options.level = config.logging.tracing_level();
    options.json = config.logging.is_json();
    options.log_dir = config.logging.log_dir.as_deref();
    options.file_prefix = "powershell-mcp";
    options.max_log_files = config.logging.max_log_files;
    let _guard = init_tracing(&options)?;

    match &loaded.source {
        Some(path) => tracing::info!("Loaded config from {}", path.display()),
        None => tracing::info!("Using default configuration"),
    }

    let server = PowerShellMcpServer::with_config(&config)?;

    if let Some(direct) = cli.direct_command() {
        let command = match direct {
            Ok(command) => command,
            Err(message) => {
                eprintln!("Error: {}", message);
                return Ok(CLI_FAILURE_EXIT_CODE);
            }
        };
        let timeout = cli.timeout.map(|secs| secs.min(config.security.max_timeout));
        let result = server.runner().execute(command, timeout, cli.format).await;

        if result.success {
            println!("{}", result.stdout);
        } else {
            let error = result.error.as_deref().unwrap_or("Unknown error");
            eprintln!("Error: {}", error);
            if !result.stderr.is_empty() && result.stderr != error {
                eprintln!("{}", result.stderr);
            }
        }
        return Ok(result.process_exit_code());
    }

    if cli.skip_shell_check {
        tracing::warn!("Skipping PowerShell availability check");
    } else {
        probe_shell(&config.shell.program).await?;
        tracing::info!(program = %config.shell.program, "PowerShell is available");
    }

    serve_stdio(server, "powershell_mcp").await?;
    Ok(0)
}
