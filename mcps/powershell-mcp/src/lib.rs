//! PowerShell MCP Library
//!
//! Gated PowerShell execution server. Every command passes a lexical safety
//! gate (length limit, command blocklist, dangerous patterns) before an
//! interpreter is spawned under a bounded timeout.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use mcp_common::EmbeddableMcp;
//! use powershell_mcp::PowerShellMcpServer;
//!
//! let server = PowerShellMcpServer::new()?;
//! let tools = server.list_tools();
//! ```

pub mod config;
pub mod format;
pub mod gate;
pub mod handlers;
pub mod history;
pub mod params;
pub mod policy;
pub mod runner;
pub mod server;
pub mod types;

// Re-export main server type
pub use server::PowerShellMcpServer;

// Re-export parameter types for direct API usage
pub use params::*;
