//! MCP (Model Context Protocol) Tool Gateway.
//!
//! Speaks JSON-RPC 2.0 over stdio, advertises the three analytics tools,
//! and routes `tools/call` requests to the Query Service.

/// MCP server implementation.
pub mod server;

/// Tool catalog and dispatch.
pub mod tools;

/// JSON-RPC 2.0 transport types.
pub mod transport;

pub use server::{McpServer, StatsSnapshot};
pub use tools::{get_tool_definitions, handle_tool_call, Tool, ToolCallError, ToolDefinition};
pub use transport::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
