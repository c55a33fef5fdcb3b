//! MCP Common - Shared utilities for MCP servers
//!
//! - **Initialization**: [`init_tracing`] and [`serve_stdio`]
//! - **Results**: helpers for building `CallToolResult` responses
//! - **Errors**: conversions into MCP-compatible errors
//! - **Embeddable**: [`EmbeddableMcp`] trait for in-process execution
//!
//! ```rust,ignore
//! use mcp_common::{init_tracing, serve_stdio, TracingOptions};
//!
//! let _guard = init_tracing(&TracingOptions::new("my_mcp"))?;
//! serve_stdio(MyServer::new(), "my_mcp").await?;
//! ```

pub mod embeddable;
pub mod error;
pub mod init;
pub mod result;

// Re-export commonly used items at crate root
pub use embeddable::{EmbeddableError, EmbeddableMcp, EmbeddableResult};
pub use error::{internal_error, invalid_params, IntoMcpError, McpResult, ResultExt};
pub use init::{init_tracing, serve_stdio, TracingOptions};
pub use result::{json_success, result_text};

// Re-export rmcp types that are commonly needed
pub use rmcp::{
    model::{CallToolResult, Tool},
    ErrorData as McpError,
};

// Re-export async_trait for implementing EmbeddableMcp
pub use async_trait::async_trait;
