use std::io;
use std::sync::{Arc, Mutex};

use code_analysis::graph::MemoryGraph;
use code_analysis::mcp::*;
use code_analysis::service::QueryService;
use serde_json::{json, Value};
use tokio::io::BufReader;

/// Helper: a graph with one populated component and one empty one.
fn setup_graph() -> MemoryGraph {
    let graph = MemoryGraph::new();
    let core = graph.add_component("Core", Some(0.8), Some(0.2));
    let file = graph.add_file(core, "src/core.rs");
    graph.add_file(core, "src/extra.rs");
    let class = graph.add_class(file, "Engine");
    graph.add_method(class, "Engine::run()", Some(7));
    graph.add_component("Empty", None, None);
    graph
}

fn server_over(graph: &MemoryGraph) -> Arc<McpServer<MemoryGraph>> {
    Arc::new(McpServer::new(QueryService::new(graph.clone())))
}

/// Feeds `requests` (one JSON value per line) through the server and returns
/// every response line, parsed.
async fn exchange(server: Arc<McpServer<MemoryGraph>>, requests: &[Value]) -> Vec<Value> {
    let input: String = requests.iter().map(|r| format!("{r}\n")).collect();
    exchange_raw(server, &input).await
}

async fn exchange_raw(server: Arc<McpServer<MemoryGraph>>, input: &str) -> Vec<Value> {
    exchange_bytes(server, input.as_bytes()).await
}

async fn exchange_bytes(server: Arc<McpServer<MemoryGraph>>, input: &[u8]) -> Vec<Value> {
    let mut output: Vec<u8> = Vec::new();
    server
        .serve(BufReader::new(input), &mut output)
        .await
        .expect("serve failed");
    String::from_utf8(output)
        .expect("output is not utf-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("response is not json"))
        .collect()
}

fn response_for(responses: &[Value], id: i64) -> &Value {
    responses
        .iter()
        .find(|r| r["id"] == json!(id))
        .unwrap_or_else(|| panic!("no response for id {id}"))
}

fn call(id: i64, tool: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": tool, "arguments": {} }
    })
}

/// Extracts the single text content item of a successful tool call.
fn content_text(response: &Value) -> &str {
    let content = response["result"]["content"].as_array().expect("no content");
    assert_eq!(content.len(), 1);
    assert_eq!(content[0]["type"], "text");
    content[0]["text"].as_str().expect("content is not text")
}

#[tokio::test]
async fn test_tools_list_returns_catalog() {
    let graph = setup_graph();
    let responses = exchange(
        server_over(&graph),
        &[json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })],
    )
    .await;

    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec!["get_code_summary", "get_component_details", "get_complexity_metrics"]
    );
    assert_eq!(
        tools[0]["inputSchema"],
        json!({ "type": "object", "properties": {}, "required": [] })
    );
    assert_eq!(graph.sessions_opened(), 0);
}

#[tokio::test]
async fn test_code_summary_call_returns_pretty_json() {
    let graph = setup_graph();
    let responses = exchange(server_over(&graph), &[call(1, "get_code_summary")]).await;

    let text = content_text(&responses[0]);
    assert!(text.contains("\n  \"components\": 2"));
    let summary: Value = serde_json::from_str(text).unwrap();
    assert_eq!(
        summary,
        json!({ "components": 2, "files": 2, "classes": 1, "methods": 1 })
    );
}

#[tokio::test]
async fn test_component_details_call() {
    let graph = setup_graph();
    let responses = exchange(server_over(&graph), &[call(2, "get_component_details")]).await;

    let details: Value = serde_json::from_str(content_text(&responses[0])).unwrap();
    assert_eq!(
        details,
        json!([
            { "name": "Core", "cohesion": 0.8, "coupling": 0.2, "fileCount": 2, "classCount": 1 },
            { "name": "Empty", "cohesion": null, "coupling": null, "fileCount": 0, "classCount": 0 }
        ])
    );
}

#[tokio::test]
async fn test_complexity_metrics_call() {
    let graph = setup_graph();
    let responses = exchange(server_over(&graph), &[call(3, "get_complexity_metrics")]).await;

    let metrics: Value = serde_json::from_str(content_text(&responses[0])).unwrap();
    assert_eq!(metrics, json!([{ "method": "Engine::run()", "complexity": 7 }]));
}

#[tokio::test]
async fn test_unknown_tool_is_method_not_found_without_touching_store() {
    let graph = setup_graph();
    let responses = exchange(server_over(&graph), &[call(4, "get_nonexistent")]).await;

    let error = &responses[0]["error"];
    assert_eq!(error["code"], ErrorCode::MethodNotFound.as_i32());
    assert_eq!(error["message"], "Unknown tool: get_nonexistent");
    assert!(responses[0].get("result").is_none());
    assert_eq!(graph.sessions_opened(), 0);
}

#[tokio::test]
async fn test_query_failure_is_generic_internal_error() {
    let graph = setup_graph();
    graph.fail_queries(Some("bolt: authentication rejected for user neo4j"));
    let responses = exchange(server_over(&graph), &[call(5, "get_code_summary")]).await;

    let error = &responses[0]["error"];
    assert_eq!(error["code"], ErrorCode::InternalError.as_i32());
    assert_eq!(error["message"], "Failed to execute tool");
    assert!(!responses[0].to_string().contains("authentication"));
    assert_eq!(graph.sessions_closed(), graph.sessions_opened());
}

/// Log sink shared between a test and the subscriber it installs.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_tool_failure_detail_goes_to_log_only() {
    let log = CapturedLog::default();
    let _guard = log.install();

    let graph = setup_graph();
    graph.fail_queries(Some("bolt: authentication rejected for user neo4j"));
    let service = QueryService::new(graph.clone());

    let err = handle_tool_call(&service, "get_component_details").await.unwrap_err();
    let rpc = err.to_rpc_error();
    assert_eq!(rpc.message, "Failed to execute tool");
    assert!(!serde_json::to_string(&rpc).unwrap().contains("authentication"));

    let logged = log.contents();
    assert!(logged.contains("tool execution error"));
    assert!(logged.contains("bolt: authentication rejected for user neo4j"));
    assert!(logged.contains("get_component_details"));
}

#[tokio::test]
async fn test_failed_connection_check_is_logged() {
    let log = CapturedLog::default();
    let _guard = log.install();

    let graph = setup_graph();
    graph.fail_queries(Some("bolt: authentication rejected for user neo4j"));
    let server = server_over(&graph);

    assert!(server.ensure_connected().await.is_err());
    let logged = log.contents();
    assert!(logged.contains("graph connection check failed"));
    assert!(logged.contains("bolt: authentication rejected"));
}

#[tokio::test]
async fn test_concurrent_calls_all_answered_and_sessions_released() {
    let graph = setup_graph();
    let tools = ["get_code_summary", "get_component_details", "get_complexity_metrics"];
    let requests: Vec<Value> = (0..30).map(|i| call(i, tools[i as usize % 3])).collect();

    let responses = exchange(server_over(&graph), &requests).await;

    assert_eq!(responses.len(), 30);
    for i in 0..30 {
        assert!(response_for(&responses, i).get("result").is_some());
    }
    assert_eq!(graph.sessions_opened(), 30);
    assert_eq!(graph.sessions_closed(), 30);
}

#[tokio::test]
async fn test_malformed_line_gets_parse_error_and_serving_continues() {
    let graph = setup_graph();
    let input = format!(
        "{{not json\n\n{}\n",
        json!({ "jsonrpc": "2.0", "id": 9, "method": "ping" })
    );
    let responses = exchange_raw(server_over(&graph), &input).await;

    assert_eq!(responses.len(), 2);
    let parse_error = responses.iter().find(|r| r["id"].is_null()).unwrap();
    assert_eq!(parse_error["error"]["code"], ErrorCode::ParseError.as_i32());
    assert_eq!(response_for(&responses, 9)["result"], json!({}));
}

#[tokio::test]
async fn test_invalid_utf8_line_gets_parse_error_and_serving_continues() {
    let graph = setup_graph();
    let ping = |id: i64| json!({ "jsonrpc": "2.0", "id": id, "method": "ping" }).to_string();
    let mut input = Vec::new();
    input.extend_from_slice(ping(1).as_bytes());
    input.extend_from_slice(b"\n\xff\xfe garbage\n");
    input.extend_from_slice(ping(2).as_bytes());
    input.push(b'\n');

    let server = server_over(&graph);
    let responses = exchange_bytes(Arc::clone(&server), &input).await;

    assert_eq!(responses.len(), 3);
    let parse_error = responses.iter().find(|r| r["id"].is_null()).unwrap();
    assert_eq!(parse_error["error"]["code"], ErrorCode::ParseError.as_i32());
    assert_eq!(response_for(&responses, 1)["result"], json!({}));
    assert_eq!(response_for(&responses, 2)["result"], json!({}));
    assert_eq!(server.stats().total_requests, 3);
}

#[tokio::test]
async fn test_final_line_without_newline_is_answered() {
    let graph = setup_graph();
    let input = format!(
        "{}\r\n{}",
        json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }),
        json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" })
    );
    let responses = exchange_raw(server_over(&graph), &input).await;

    assert_eq!(responses.len(), 2);
    assert_eq!(response_for(&responses, 2)["result"], json!({}));
}

#[tokio::test]
async fn test_handshake_and_notifications() {
    let graph = setup_graph();
    let responses = exchange(
        server_over(&graph),
        &[
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
        ],
    )
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(
        response_for(&responses, 1)["result"]["serverInfo"]["name"],
        "code-analysis-server"
    );
}

#[tokio::test]
async fn test_stats_count_requests_and_errors() {
    let graph = setup_graph();
    let server = server_over(&graph);
    exchange(
        Arc::clone(&server),
        &[call(1, "get_code_summary"), call(2, "get_nonexistent")],
    )
    .await;

    let stats = server.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.tool_calls, 2);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn test_shutdown_releases_connection() {
    let graph = setup_graph();
    let server = server_over(&graph);
    let mut output: Vec<u8> = Vec::new();

    server.shutdown(&mut output).await;

    assert!(graph.is_closed());
    assert!(output.is_empty());
    let responses = exchange(server, &[call(1, "get_code_summary")]).await;
    assert_eq!(responses[0]["error"]["code"], ErrorCode::InternalError.as_i32());
}

#[tokio::test]
async fn test_ensure_connected() {
    let graph = setup_graph();
    let server = server_over(&graph);
    assert!(server.ensure_connected().await.is_ok());

    graph.set_unreachable(true);
    assert!(server.ensure_connected().await.is_err());
}
