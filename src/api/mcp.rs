//! The MCP JSON-RPC 2.0 endpoint. Tool adapters hold only an
//! `Arc<Services>`, never an HTTP client pointed back at this same
//! server - the dead self-loopback the original design carried is not
//! reproduced here at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spectre_common::{DomainError, HasKind, ShutdownSignal};

use crate::query::QueryParams;
use crate::services::Services;

use super::state::AppState;

const JSONRPC_VERSION: &str = "2.0";

const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SERVER_ERROR: i64 = -32000;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data }),
        }
    }
}

fn domain_error_response(id: Value, error: DomainError) -> JsonRpcResponse {
    let kind = error.kind();
    JsonRpcResponse::err(id, SERVER_ERROR, error.message, Some(serde_json::json!({ "kind": kind.to_string() })))
}

type ToolFuture = BoxFuture<'static, Result<Value, DomainError>>;
pub(crate) type ToolAdapter = Box<dyn Fn(Arc<Services>, ShutdownSignal, Value) -> ToolFuture + Send + Sync>;

/// Builds the `{tool name -> adapter}` table once, at server
/// construction, matching §4.6's "single in-process dispatcher...
/// sharing the service instances by reference" requirement. Each
/// adapter decodes its arguments, validates them (via `serde`'s own
/// deserialization failure), calls the service, and serializes the
/// result - no business logic lives here, only the decode/call/encode
/// plumbing.
pub(crate) fn build_tool_table() -> HashMap<&'static str, ToolAdapter> {
    let mut tools: HashMap<&'static str, ToolAdapter> = HashMap::new();

    tools.insert(
        "log_query",
        Box::new(|services, shutdown, args| {
            Box::pin(async move {
                let args: IntegrationScopedArgs = decode(args)?;
                let result = services.log_query.query(&shutdown, &args.integration, args.params).await?;
                Ok(serde_json::to_value(result).expect("QueryResult is always representable as JSON"))
            })
        }),
    );

    tools.insert(
        "log_query_histogram",
        Box::new(|services, shutdown, args| {
            Box::pin(async move {
                let args: HistogramArgs = decode(args)?;
                let step = Duration::from_secs(args.step_secs);
                let result = services
                    .log_query
                    .histogram(&shutdown, &args.integration, args.params, step)
                    .await?;
                Ok(serde_json::to_value(result).expect("histogram buckets are always representable as JSON"))
            })
        }),
    );

    tools.insert(
        "log_query_aggregate",
        Box::new(|services, shutdown, args| {
            Box::pin(async move {
                let args: AggregateArgs = decode(args)?;
                let result = services
                    .log_query
                    .aggregate(&shutdown, &args.integration, args.params, &args.group_by)
                    .await?;
                Ok(serde_json::to_value(result).expect("aggregation groups are always representable as JSON"))
            })
        }),
    );

    tools.insert(
        "timeline",
        Box::new(|services, shutdown, args| {
            Box::pin(async move {
                let args: TimelineArgs = decode(args)?;
                let result = services
                    .timeline
                    .timeline(&shutdown, &args.integration, args.resource_params, args.event_params)
                    .await?;
                Ok(serde_json::to_value(result).expect("timeline response is always representable as JSON"))
            })
        }),
    );

    tools.insert(
        "search",
        Box::new(|services, shutdown, args| {
            Box::pin(async move {
                let args: IntegrationScopedArgs = decode(args)?;
                let result = services.search.search(&shutdown, &args.integration, args.params).await?;
                Ok(serde_json::to_value(result).expect("search result is always representable as JSON"))
            })
        }),
    );

    tools.insert(
        "metadata",
        Box::new(|services, shutdown, args| {
            Box::pin(async move {
                let args: MetadataArgs = decode(args)?;
                let result = services.metadata.summary(&shutdown, &args.integration).await?;
                Ok(serde_json::to_value(result).expect("metadata summary is always representable as JSON"))
            })
        }),
    );

    tools.insert(
        "graph_neighbors",
        Box::new(|services, shutdown, args| {
            Box::pin(async move {
                let args: GraphNeighborsArgs = decode(args)?;
                let result = services
                    .graph
                    .neighbors(&shutdown, &args.integration, args.params, &args.group_by)
                    .await?;
                Ok(serde_json::to_value(result).expect("neighbor list is always representable as JSON"))
            })
        }),
    );

    tools.insert(
        "graph_traverse",
        Box::new(|services, shutdown, args| {
            Box::pin(async move {
                let args: IntegrationScopedArgs = decode(args)?;
                let result = services.graph.traverse(&shutdown, &args.integration, args.params).await?;
                Ok(serde_json::to_value(result).expect("traversal result is always representable as JSON"))
            })
        }),
    );

    tools
}

fn decode<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, DomainError> {
    serde_json::from_value(args).map_err(|e| DomainError::validation(format!("invalid tool arguments: {e}")))
}

#[derive(Debug, Deserialize)]
struct IntegrationScopedArgs {
    integration: String,
    #[serde(default)]
    params: QueryParams,
}

#[derive(Debug, Deserialize)]
struct HistogramArgs {
    integration: String,
    #[serde(default)]
    params: QueryParams,
    step_secs: u64,
}

#[derive(Debug, Deserialize)]
struct AggregateArgs {
    integration: String,
    #[serde(default)]
    params: QueryParams,
    group_by: String,
}

#[derive(Debug, Deserialize)]
struct TimelineArgs {
    integration: String,
    #[serde(default)]
    resource_params: QueryParams,
    #[serde(default)]
    event_params: QueryParams,
}

#[derive(Debug, Deserialize)]
struct MetadataArgs {
    integration: String,
}

#[derive(Debug, Deserialize)]
struct GraphNeighborsArgs {
    integration: String,
    #[serde(default)]
    params: QueryParams,
    group_by: String,
}

/// `POST /v1/mcp` - a stateless JSON-RPC 2.0 endpoint supporting
/// `initialize`, `tools/list`, and `tools/call`, the minimal surface a
/// Model Context Protocol client negotiates against.
pub async fn handle(State(state): State<AppState>, Json(request): Json<JsonRpcRequest>) -> Json<JsonRpcResponse> {
    if request.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) {
        return Json(JsonRpcResponse::err(request.id, INVALID_REQUEST, "unsupported jsonrpc version", None));
    }

    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::ok(request.id, initialize_result()),
        "tools/list" => JsonRpcResponse::ok(request.id, tools_list_result(&state.tool_names())),
        "tools/call" => dispatch_tool_call(&state, request.id, request.params).await,
        other => JsonRpcResponse::err(request.id, METHOD_NOT_FOUND, format!("unknown method {other:?}"), None),
    };
    Json(response)
}

fn initialize_result() -> Value {
    serde_json::json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": { "name": "spectre", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": {} },
    })
}

fn tools_list_result(names: &[&'static str]) -> Value {
    let tools: Vec<Value> = names.iter().map(|name| serde_json::json!({ "name": name })).collect();
    serde_json::json!({ "tools": tools })
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

async fn dispatch_tool_call(state: &AppState, id: Value, params: Value) -> JsonRpcResponse {
    let call: ToolCallParams = match serde_json::from_value(params) {
        Ok(call) => call,
        Err(e) => return JsonRpcResponse::err(id, INVALID_PARAMS, format!("invalid tools/call params: {e}"), None),
    };
    let Some(adapter) = state.tools.get(call.name.as_str()) else {
        return JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("unknown tool {:?}", call.name), None);
    };
    let shutdown = state.shutdown.child();
    match adapter(Arc::clone(&state.services), shutdown, call.arguments).await {
        Ok(result) => JsonRpcResponse::ok(id, serde_json::json!({ "content": [{ "type": "json", "json": result }] })),
        Err(e) => domain_error_response(id, e),
    }
}
