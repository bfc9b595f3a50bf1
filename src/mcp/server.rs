//! MCP server reading JSON-RPC 2.0 lines from an input stream and writing
//! responses to an output stream (stdin/stdout in production).
//!
//! Each request is handled on its own tokio task; responses are written in
//! completion order as single lines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::errors::{CodeAnalysisError, Result};
use crate::graph::GraphStore;
use crate::service::QueryService;

use super::tools::{get_tool_definitions, handle_tool_call};
use super::transport::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallParams};

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "code-analysis-server";

struct ServerStats {
    started_at: Instant,
    total_requests: AtomicU64,
    tool_calls: AtomicU64,
    errors: AtomicU64,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

/// Point-in-time copy of the server counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub tool_calls: u64,
    pub errors: u64,
}

/// The Tool Gateway: owns the only handle to the Query Service.
pub struct McpServer<S: GraphStore> {
    service: QueryService<S>,
    stats: ServerStats,
}

impl<S: GraphStore> McpServer<S> {
    /// Creates a server that dispatches tool calls to `service`.
    pub fn new(service: QueryService<S>) -> Self {
        Self {
            service,
            stats: ServerStats::new(),
        }
    }

    /// Verifies the graph store is reachable before serving.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.service.verify_connection().await {
            info!("connected to graph database");
            Ok(())
        } else {
            Err(CodeAnalysisError::graph(
                "verify_connection",
                "Failed to connect to graph database",
            ))
        }
    }

    /// Serves requests from `reader` until it reaches end of input, then waits
    /// for in-flight requests to answer.
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let mut tx = Some(tx);
        // Lines are read as raw bytes so invalid UTF-8 is answered with a
        // parse error instead of ending the input. The buffer outlives each
        // select round, which keeps a partially read line across wakeups.
        let mut line = Vec::new();

        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut line), if tx.is_some() => match read {
                    Ok(0) => {
                        if let Some(sender) = &tx {
                            self.dispatch(&line, sender);
                        }
                        line.clear();
                        debug!("input closed");
                        tx = None;
                    }
                    Ok(_) => {
                        if let Some(sender) = &tx {
                            self.dispatch(&line, sender);
                        }
                        line.clear();
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read request");
                        tx = None;
                    }
                },
                Some(response) = rx.recv() => write_response(writer, &response).await?,
                else => break,
            }
        }

        Ok(())
    }

    /// Releases the graph connection, then the output transport.
    ///
    /// Does not wait for in-flight requests.
    pub async fn shutdown<W>(&self, writer: &mut W)
    where
        W: AsyncWrite + Unpin,
    {
        if let Err(e) = self.service.close().await {
            error!(error = %e, "failed to close graph connection");
        }
        if let Err(e) = writer.flush().await {
            error!(error = %e, "failed to flush output");
        }

        let stats = self.stats();
        info!(
            uptime_secs = stats.uptime_secs,
            total_requests = stats.total_requests,
            tool_calls = stats.tool_calls,
            errors = stats.errors,
            "server stopped"
        );
    }

    /// Returns the current request counters.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.stats.started_at.elapsed().as_secs(),
            total_requests: self.stats.total_requests.load(Ordering::Relaxed),
            tool_calls: self.stats.tool_calls.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }

    /// Parses one input line and spawns a task to answer it.
    fn dispatch(self: &Arc<Self>, line: &[u8], tx: &UnboundedSender<JsonRpcResponse>) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        let request: JsonRpcRequest = match serde_json::from_slice(line) {
            Ok(request) => request,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                let _ = tx.send(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::new(
                        ErrorCode::ParseError,
                        format!("failed to parse JSON-RPC request: {e}"),
                    ),
                ));
                return;
            }
        };

        let server = Arc::clone(self);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = server.handle_request(request).await {
                if response.is_error() {
                    server.stats.errors.fetch_add(1, Ordering::Relaxed);
                }
                // The receiver is gone once the server has stopped.
                let _ = tx.send(response);
            }
        });
    }

    /// Answers a single request. Returns `None` for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        let notification = request.is_notification();

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "initialized" | "notifications/initialized" => return None,
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => {
                JsonRpcResponse::success(id, json!({ "tools": get_tool_definitions() }))
            }
            "tools/call" => self.handle_tools_call(id, request.params).await,
            other => JsonRpcResponse::error(
                id,
                JsonRpcError::new(ErrorCode::MethodNotFound, format!("method not found: {other}")),
            ),
        };

        if notification {
            None
        } else {
            Some(response)
        }
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::new(ErrorCode::InvalidParams, "missing params for tools/call"),
            );
        };
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::new(
                        ErrorCode::InvalidParams,
                        format!("invalid tools/call params: {e}"),
                    ),
                );
            }
        };

        self.stats.tool_calls.fetch_add(1, Ordering::Relaxed);
        debug!(tool = %params.name, "tool call");

        match handle_tool_call(&self.service, &params.name).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::error(id, e.to_rpc_error()),
        }
    }
}

/// Writes one response as a single line and flushes.
async fn write_response<W>(writer: &mut W, response: &JsonRpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
