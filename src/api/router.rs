use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info_span;

use super::{handlers, mcp};
use super::state::AppState;

/// Mounts every surface the core serves on one port: `/health`, the
/// `/api/v1/...` REST CRUD and query endpoints, the MCP JSON-RPC
/// endpoint, `/metrics`, and a placeholder static-UI mount - the
/// "single HTTP surface" §6 describes.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/integrations", get(handlers::list_integrations).post(handlers::create_integration))
        .route(
            "/integrations/:name",
            put(handlers::update_integration).delete(handlers::delete_integration),
        )
        .route("/log-query", post(handlers::log_query))
        .route("/log-query/histogram", post(handlers::log_query_histogram))
        .route("/log-query/aggregate", post(handlers::log_query_aggregate))
        .route("/timeline", post(handlers::timeline))
        .route("/search", post(handlers::search))
        .route("/metadata/:integration", get(handlers::metadata))
        .route("/graph/neighbors", post(handlers::graph_neighbors))
        .route("/graph/traverse", post(handlers::graph_traverse));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/v1/mcp", post(mcp::handle))
        .nest("/api/v1", api)
        .nest_service("/ui", ServeDir::new("ui"))
        .layer(
            // Tags every request's span with a generated request id, the
            // correlation handle an operator greps logs by.
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = uuid::Uuid::new_v4();
                info_span!(
                    "http_request",
                    %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
