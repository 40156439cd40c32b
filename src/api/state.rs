use std::collections::HashMap;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use spectre_common::ShutdownSignal;

use crate::config::ConfigStore;
use crate::integrations::LifecycleManager;
use crate::registry::Registry;
use crate::services::Services;

use super::mcp::{self, ToolAdapter};

/// Everything an axum handler needs, shared by `Arc` rather than
/// cloned per field - cheap to pass into `with_state` and cheap to
/// hand to the MCP dispatcher alongside it. `tools` is built once at
/// construction and shared with the REST router by the same `Arc`,
/// matching the "single in-process dispatcher... sharing the service
/// instances by reference" requirement.
#[derive(Clone)]
pub struct AppState {
    pub config_store: Arc<ConfigStore>,
    pub registry: Arc<Registry>,
    pub lifecycle: Arc<LifecycleManager>,
    pub services: Arc<Services>,
    pub shutdown: ShutdownSignal,
    pub metrics_handle: PrometheusHandle,
    pub(crate) tools: Arc<HashMap<&'static str, ToolAdapter>>,
}

impl AppState {
    pub fn new(
        config_store: Arc<ConfigStore>,
        registry: Arc<Registry>,
        lifecycle: Arc<LifecycleManager>,
        services: Arc<Services>,
        shutdown: ShutdownSignal,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config_store,
            registry,
            lifecycle,
            services,
            shutdown,
            metrics_handle,
            tools: Arc::new(mcp::build_tool_table()),
        }
    }

    pub(crate) fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
