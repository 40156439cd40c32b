use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spectre_common::DomainError;

use crate::config::{CredentialRef, IntegrationConfig};
use crate::health::OverallStatus;
use crate::query::QueryParams;

use super::error::ApiError;
use super::state::AppState;

/// `GET /health` - reduces every running instance's state to one
/// server-wide status, per §4.4's health endpoint contract.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let reports = state.lifecycle.health_reports().await;
    let status = OverallStatus::from_reports(reports.values().map(|r| &r.state));
    Json(HealthResponse { status, instances: reports })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: OverallStatus,
    pub instances: IndexMap<String, crate::health::HealthReport>,
}

/// `GET /api/v1/integrations`
pub async fn list_integrations(State(state): State<AppState>) -> Json<Vec<IntegrationConfig>> {
    Json(state.config_store.list().await)
}

#[derive(Debug, Deserialize)]
pub struct CreateIntegrationRequest {
    pub name: String,
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default)]
    pub credential_ref: Option<CredentialRef>,
    #[serde(default)]
    pub options: IndexMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl CreateIntegrationRequest {
    fn into_config(self) -> IntegrationConfig {
        IntegrationConfig {
            name: self.name,
            kind: self.kind,
            enabled: self.enabled,
            endpoint: self.endpoint,
            credential_ref: self.credential_ref,
            options: self.options,
            date_added: Utc::now(),
        }
    }
}

/// `POST /api/v1/integrations` - validates against the running
/// registry's known kinds before the config store ever persists the
/// entry, so a bad `kind` never reaches disk.
pub async fn create_integration(
    State(state): State<AppState>,
    Json(request): Json<CreateIntegrationRequest>,
) -> Result<Json<IntegrationConfig>, ApiError> {
    let config = request.into_config();
    let known_kinds = state.registry.known_kinds();
    crate::config::validate(&config, &known_kinds).map_err(ApiError::from)?;
    state.config_store.create(config.clone()).await.map_err(DomainError::from)?;
    Ok(Json(config))
}

#[derive(Debug, Deserialize)]
pub struct UpdateIntegrationRequest {
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default)]
    pub credential_ref: Option<CredentialRef>,
    #[serde(default)]
    pub options: IndexMap<String, serde_json::Value>,
}

/// `PUT /api/v1/integrations/{name}` - `name` comes from the path, not
/// the body, so a caller cannot rename an integration through this
/// endpoint (`name` is immutable once created).
pub async fn update_integration(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateIntegrationRequest>,
) -> Result<Json<IntegrationConfig>, ApiError> {
    let existing = state
        .config_store
        .get(&name)
        .await
        .ok_or_else(|| DomainError::not_found(format!("no integration named {name:?} exists")))?;

    let config = IntegrationConfig {
        name: name.clone(),
        kind: request.kind,
        enabled: request.enabled,
        endpoint: request.endpoint,
        credential_ref: request.credential_ref,
        options: request.options,
        date_added: existing.date_added,
    };
    let known_kinds = state.registry.known_kinds();
    crate::config::validate(&config, &known_kinds).map_err(ApiError::from)?;
    state.config_store.update(&name, config.clone()).await.map_err(DomainError::from)?;
    Ok(Json(config))
}

/// `DELETE /api/v1/integrations/{name}`
pub async fn delete_integration(State(state): State<AppState>, Path(name): Path<String>) -> Result<(), ApiError> {
    state.config_store.delete(&name).await.map_err(DomainError::from)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct IntegrationScopedRequest {
    pub integration: String,
    #[serde(default)]
    pub params: QueryParams,
}

/// `POST /api/v1/log-query`
pub async fn log_query(
    State(state): State<AppState>,
    Json(request): Json<IntegrationScopedRequest>,
) -> Result<Json<crate::query::QueryResult>, ApiError> {
    let shutdown = state.shutdown.child();
    let result = state.services.log_query.query(&shutdown, &request.integration, request.params).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct HistogramRequest {
    pub integration: String,
    #[serde(default)]
    pub params: QueryParams,
    pub step_secs: u64,
}

/// `POST /api/v1/log-query/histogram`
pub async fn log_query_histogram(
    State(state): State<AppState>,
    Json(request): Json<HistogramRequest>,
) -> Result<Json<Vec<crate::query::HistogramBucket>>, ApiError> {
    let shutdown = state.shutdown.child();
    let step = Duration::from_secs(request.step_secs);
    let result = state
        .services
        .log_query
        .histogram(&shutdown, &request.integration, request.params, step)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub integration: String,
    #[serde(default)]
    pub params: QueryParams,
    pub group_by: String,
}

/// `POST /api/v1/log-query/aggregate`
pub async fn log_query_aggregate(
    State(state): State<AppState>,
    Json(request): Json<AggregateRequest>,
) -> Result<Json<Vec<crate::query::AggregationGroup>>, ApiError> {
    let shutdown = state.shutdown.child();
    let result = state
        .services
        .log_query
        .aggregate(&shutdown, &request.integration, request.params, &request.group_by)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct TimelineRequest {
    pub integration: String,
    #[serde(default)]
    pub resource_params: QueryParams,
    #[serde(default)]
    pub event_params: QueryParams,
}

/// `POST /api/v1/timeline`
pub async fn timeline(
    State(state): State<AppState>,
    Json(request): Json<TimelineRequest>,
) -> Result<Json<crate::services::TimelineResponse>, ApiError> {
    let shutdown = state.shutdown.child();
    let result = state
        .services
        .timeline
        .timeline(&shutdown, &request.integration, request.resource_params, request.event_params)
        .await?;
    Ok(Json(result))
}

/// `POST /api/v1/search`
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<IntegrationScopedRequest>,
) -> Result<Json<crate::query::QueryResult>, ApiError> {
    let shutdown = state.shutdown.child();
    let result = state.services.search.search(&shutdown, &request.integration, request.params).await?;
    Ok(Json(result))
}

/// `GET /api/v1/metadata/{integration}`
pub async fn metadata(
    State(state): State<AppState>,
    Path(integration): Path<String>,
) -> Result<Json<crate::services::MetadataSummary>, ApiError> {
    let shutdown = state.shutdown.child();
    let result = state.services.metadata.summary(&shutdown, &integration).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct GraphNeighborsRequest {
    pub integration: String,
    #[serde(default)]
    pub params: QueryParams,
    pub group_by: String,
}

/// `POST /api/v1/graph/neighbors`
pub async fn graph_neighbors(
    State(state): State<AppState>,
    Json(request): Json<GraphNeighborsRequest>,
) -> Result<Json<Vec<crate::services::Neighbor>>, ApiError> {
    let shutdown = state.shutdown.child();
    let result = state
        .services
        .graph
        .neighbors(&shutdown, &request.integration, request.params, &request.group_by)
        .await?;
    Ok(Json(result))
}

/// `POST /api/v1/graph/traverse`
pub async fn graph_traverse(
    State(state): State<AppState>,
    Json(request): Json<IntegrationScopedRequest>,
) -> Result<Json<Vec<crate::record::LogRecord>>, ApiError> {
    let shutdown = state.shutdown.child();
    let result = state.services.graph.traverse(&shutdown, &request.integration, request.params).await?;
    Ok(Json(result))
}

/// `GET /metrics` - renders the process-wide Prometheus text
/// exposition format from the recorder installed at boot.
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
