use std::time::Duration;

use spectre_common::DomainError;

use super::builder::{effective_limit, validate_time_range, QueryBuilder};
use super::params::QueryParams;

/// A trivial builder for `logstore-mock`, the in-memory integration
/// used in tests and demos. The mock client filters records directly
/// from [`QueryParams`] rather than parsing this string; it exists so
/// the mock still exercises the same validation path and so its
/// "query" can be logged like a real backend's.
#[derive(Default)]
pub struct MockQueryBuilder;

impl QueryBuilder for MockQueryBuilder {
    fn build(&self, params: &QueryParams) -> Result<String, DomainError> {
        let range = validate_time_range(params)?;
        let mut parts = vec![format!("ts:[{}..{}]", range.start.to_rfc3339(), range.end.to_rfc3339())];
        if let Some(v) = &params.namespace {
            parts.push(format!("namespace={v}"));
        }
        if let Some(v) = &params.pod {
            parts.push(format!("pod={v}"));
        }
        if let Some(v) = &params.container {
            parts.push(format!("container={v}"));
        }
        if let Some(v) = &params.level {
            parts.push(format!("level={v}"));
        }
        if let Some(limit) = effective_limit(params, self.max_limit()) {
            parts.push(format!("limit={limit}"));
        }
        Ok(parts.join(" "))
    }

    fn wrap_histogram(&self, base: String, step: Duration) -> String {
        format!("{base} histogram({}s)", step.as_secs())
    }

    fn wrap_aggregation(&self, base: String, group_by: &str) -> String {
        format!("{base} groupby({group_by})")
    }
}
