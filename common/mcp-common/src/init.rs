//! Server initialization utilities
//!
//! Provides tracing setup (stderr plus an optional rolling log file) and
//! [`serve_stdio`] for running a server over the stdio transport.

use std::path::Path;

use anyhow::Context;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging options for [`init_tracing`]
///
/// Output always goes to stderr since stdout is reserved for the MCP protocol.
#[derive(Debug, Clone)]
pub struct TracingOptions<'a> {
    /// Crate name used for the default filter directive (e.g. "powershell_mcp")
    pub crate_name: &'a str,
    /// Default level for `crate_name` when `RUST_LOG` does not say otherwise
    pub level: &'a str,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// Directory for a daily-rolling log file, if any
    pub log_dir: Option<&'a Path>,
    /// File name prefix for rolled log files
    pub file_prefix: &'a str,
    /// How many rolled files to keep
    pub max_log_files: usize,
}

impl<'a> TracingOptions<'a> {
    /// Stderr-only logging at `info` for the given crate
    pub fn new(crate_name: &'a str) -> Self {
        Self {
            crate_name,
            level: "info",
            json: false,
            log_dir: None,
            file_prefix: crate_name,
            max_log_files: 5,
        }
    }
}

/// Initialize tracing/logging for MCP servers
///
/// Returns the guard of the non-blocking file writer when a log directory is
/// configured. Keep it alive for the lifetime of the process or buffered
/// lines are lost.
pub fn init_tracing(options: &TracingOptions<'_>) -> anyhow::Result<Option<WorkerGuard>> {
    let directive = format!("{}={}", options.crate_name, options.level);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if options.json {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed(),
        );
    } else {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .boxed(),
        );
    }

    let mut guard = None;
    if let Some(dir) = options.log_dir {
        let appender = rolling_file(dir, options.file_prefix, options.max_log_files)?;
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        let file_layer = if options.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .boxed()
        };
        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("tracing subscriber already initialized")?;

    Ok(guard)
}

/// Build a daily-rolling file appender in `dir`, creating it if needed
pub fn rolling_file(
    dir: &Path,
    prefix: &str,
    max_files: usize,
) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_files.max(1))
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Serve an MCP server over stdio until the client disconnects
pub async fn serve_stdio<S>(server: S, name: &str) -> anyhow::Result<()>
where
    S: rmcp::ServerHandler,
{
    use rmcp::ServiceExt;

    tracing::info!("Starting {} MCP Server", name);

    let service = server.serve(rmcp::transport::stdio()).await?;

    tracing::info!("Server running, waiting for requests...");

    service.waiting().await?;

    tracing::info!("Server shutting down");
    Ok(())
}
