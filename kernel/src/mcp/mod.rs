//! Agent-tool (MCP) front end.
//!
//! A stdio JSON-RPC 2.0 server exposing the catalog as tools. Write tools
//! route through the branched-mutation orchestrator, exactly like the REST
//! front end; the loop itself never panics on malformed input.

mod tools;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::api::AppState;

// Some MCP clients are strict about the server echoing a compatible protocol
// version; this is the widely deployed baseline.
const MCP_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "strata-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

fn json_rpc_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn json_rpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

struct McpServer {
    state: Arc<AppState>,
    initialized: bool,
}

impl McpServer {
    fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            initialized: false,
        }
    }

    async fn handle(&mut self, request: JsonRpcRequest) -> Option<Value> {
        match request.method.as_str() {
            "initialize" => Some(json_rpc_response(
                request.id,
                json!({
                    "protocolVersion": MCP_VERSION,
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                    "capabilities": { "tools": {} }
                }),
            )),
            "notifications/initialized" => {
                self.initialized = true;
                None
            }
            _ if !self.initialized => Some(json_rpc_error(
                request.id,
                -32002,
                "server not initialized",
            )),
            "ping" => Some(json_rpc_response(request.id, json!({}))),
            // Some clients probe resources by default; advertise an empty set.
            "resources/list" => Some(json_rpc_response(
                request.id,
                json!({ "resources": [] }),
            )),
            "tools/list" => Some(json_rpc_response(
                request.id,
                json!({ "tools": tools::tool_definitions() }),
            )),
            "tools/call" => Some(self.handle_tool_call(request).await),
            _ => Some(json_rpc_error(request.id, -32601, "method not found")),
        }
    }

    async fn handle_tool_call(&self, request: JsonRpcRequest) -> Value {
        let Some(params) = request.params.as_ref().and_then(Value::as_object) else {
            return json_rpc_error(request.id, -32602, "params must be an object");
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return json_rpc_error(request.id, -32602, "missing tool name");
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match tools::call_tool(&self.state, name, arguments).await {
            Ok(result) => json_rpc_response(
                request.id,
                json!({
                    "content": [{ "type": "text", "text": result.to_string() }]
                }),
            ),
            Err(err) => json_rpc_response(
                request.id,
                json!({
                    "content": [{ "type": "text", "text": err.message }],
                    "isError": true,
                    "_meta": { "code": err.code, "retryable": err.retryable }
                }),
            ),
        }
    }
}

/// Serve MCP over stdin/stdout until the client disconnects.
///
/// # Errors
///
/// Returns an error when stdin or stdout fails; protocol-level problems are
/// answered with JSON-RPC errors instead.
pub async fn serve_stdio(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut server = McpServer::new(state);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => {
                debug!(method = %request.method, "mcp request");
                server.handle(request).await
            }
            Err(err) => {
                warn!(error = %err, "malformed mcp frame");
                Some(json_rpc_error(Value::Null, -32700, "parse error"))
            }
        };
        if let Some(response) = response {
            let mut frame = serde_json::to_vec(&response)?;
            frame.push(b'\n');
            stdout.write_all(&frame).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::Orchestrator;
    use crate::store::DoltStore;
    use sqlx::mysql::MySqlPool;
    use std::time::Duration;

    // A lazily-connected pool never touches the network for protocol-only
    // paths, which is all these tests exercise.
    fn test_state() -> Arc<AppState> {
        let pool = MySqlPool::connect_lazy("mysql://root@localhost:3306/strata").unwrap();
        let store = Arc::new(DoltStore::new(pool));
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            "strata-mut",
            Duration::from_millis(10_000),
        );
        Arc::new(AppState::new(store, orchestrator))
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            id: json!(1),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_tools_capability() {
        let mut server = McpServer::new(test_state());
        let response = server.handle(request("initialize", None)).await.unwrap();
        assert_eq!(response["result"]["protocolVersion"], MCP_VERSION);
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn requests_before_initialized_are_rejected() {
        let mut server = McpServer::new(test_state());
        let response = server.handle(request("tools/list", None)).await.unwrap();
        assert_eq!(response["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn tools_list_advertises_the_catalog_tools() {
        let mut server = McpServer::new(test_state());
        assert!(server
            .handle(request("notifications/initialized", None))
            .await
            .is_none());

        let response = server.handle(request("tools/list", None)).await.unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        for expected in [
            "item_create",
            "item_get",
            "items_list",
            "item_update",
            "item_delete",
            "attribute_set",
            "attribute_unset",
            "linkage_add",
            "linkage_remove",
            "trunk_version",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[tokio::test]
    async fn unknown_methods_get_json_rpc_errors() {
        let mut server = McpServer::new(test_state());
        server.handle(request("notifications/initialized", None)).await;
        let response = server.handle(request("bogus/method", None)).await.unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tool_call_without_name_is_an_invalid_params_error() {
        let mut server = McpServer::new(test_state());
        server.handle(request("notifications/initialized", None)).await;
        let response = server
            .handle(request("tools/call", Some(json!({ "arguments": {} }))))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32602);
    }
}
