//! Tool catalog and dispatch.
//!
//! The catalog is static: three parameter-free tools, each backed by one
//! Query Service operation. Results are returned as a single text content
//! item holding pretty-printed JSON.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::errors::{CodeAnalysisError, Result};
use crate::graph::GraphStore;
use crate::service::QueryService;

use super::transport::{ErrorCode, JsonRpcError};

/// Message returned to the host for any failure inside a tool.
pub const TOOL_FAILURE_MESSAGE: &str = "Failed to execute tool";

/// A tool definition as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool input. Always an empty object schema here.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The tools this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    CodeSummary,
    ComponentDetails,
    ComplexityMetrics,
}

impl Tool {
    /// Every tool, in catalog order.
    pub const ALL: [Tool; 3] = [
        Tool::CodeSummary,
        Tool::ComponentDetails,
        Tool::ComplexityMetrics,
    ];

    /// Returns the wire name of the tool.
    pub fn name(self) -> &'static str {
        match self {
            Tool::CodeSummary => "get_code_summary",
            Tool::ComponentDetails => "get_component_details",
            Tool::ComplexityMetrics => "get_complexity_metrics",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::CodeSummary => "Get a summary of the codebase structure",
            Tool::ComponentDetails => "Get detailed information about components",
            Tool::ComplexityMetrics => "Get complexity metrics for methods",
        }
    }

    /// Looks a tool up by wire name, returning `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Builds the catalog entry for this tool.
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }
}

/// Returns the full tool catalog.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    Tool::ALL.into_iter().map(Tool::definition).collect()
}

/// Why a tool call did not produce a result.
#[derive(Error, Debug)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool} failed: {source}")]
    Failed {
        tool: &'static str,
        #[source]
        source: CodeAnalysisError,
    },
}

impl ToolCallError {
    /// Converts the failure into the error object sent to the host.
    ///
    /// Unknown tools are named; execution failures carry only a generic
    /// message, the detail stays in the server log.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            ToolCallError::UnknownTool(_) => {
                JsonRpcError::new(ErrorCode::MethodNotFound, self.to_string())
            }
            ToolCallError::Failed { .. } => {
                JsonRpcError::new(ErrorCode::InternalError, TOOL_FAILURE_MESSAGE)
            }
        }
    }
}

/// Runs `tool` and renders its result as pretty-printed JSON.
pub async fn run_tool<S: GraphStore>(service: &QueryService<S>, tool: Tool) -> Result<String> {
    let text = match tool {
        Tool::CodeSummary => serde_json::to_string_pretty(&service.get_code_summary().await?)?,
        Tool::ComponentDetails => {
            serde_json::to_string_pretty(&service.get_component_details().await?)?
        }
        Tool::ComplexityMetrics => {
            serde_json::to_string_pretty(&service.get_complexity_metrics().await?)?
        }
    };
    Ok(text)
}

/// Dispatches a `tools/call` by name and wraps the result in a content envelope.
///
/// Unknown names are rejected before the service is touched. Failures are
/// logged here with full detail.
pub async fn handle_tool_call<S: GraphStore>(
    service: &QueryService<S>,
    tool_name: &str,
) -> std::result::Result<Value, ToolCallError> {
    let tool = Tool::from_name(tool_name)
        .ok_or_else(|| ToolCallError::UnknownTool(tool_name.to_string()))?;

    match run_tool(service, tool).await {
        Ok(text) => Ok(json!({
            "content": [{ "type": "text", "text": text }]
        })),
        Err(e) => {
            error!(tool = tool.name(), error = %e, "tool execution error");
            Err(ToolCallError::Failed {
                tool: tool.name(),
                source: e,
            })
        }
    }
}
