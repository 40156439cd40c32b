use std::time::Duration;

use async_trait::async_trait;
use spectre_common::DomainError;
use tokio::sync::RwLock;

use crate::query::{validate_time_range, AggregationGroup, HistogramBucket, QueryParams, QueryResult};
use crate::record::LogRecord;
use crate::registry::{ConstructArgs, Factory};

use super::client::IntegrationClient;

const MAX_RETAINED_RECORDS: usize = 10_000;

/// An in-memory log store used for tests and local demos. Filters
/// directly on [`QueryParams`] rather than parsing a query string;
/// there is no wire protocol to speak of.
pub struct MockIntegration {
    records: RwLock<Vec<LogRecord>>,
}

impl MockIntegration {
    pub fn new() -> Self {
        Self { records: RwLock::new(Vec::new()) }
    }

    fn matches(record: &LogRecord, params: &QueryParams) -> bool {
        let range = match &params.time_range {
            Some(r) => r,
            None => return false,
        };
        if record.timestamp < range.start || record.timestamp > range.end {
            return false;
        }
        let field_matches = |field: &Option<String>, value: &Option<String>| match field {
            Some(expected) => value.as_deref() == Some(expected.as_str()),
            None => true,
        };
        field_matches(&params.namespace, &record.namespace)
            && field_matches(&params.pod, &record.pod)
            && field_matches(&params.container, &record.container)
            && field_matches(&params.level, &record.level)
    }
}

impl Default for MockIntegration {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntegrationClient for MockIntegration {
    async fn query(&self, params: &QueryParams) -> Result<QueryResult, DomainError> {
        validate_time_range(params)?;
        let records = self.records.read().await;
        let mut matched: Vec<LogRecord> =
            records.iter().filter(|r| Self::matches(r, params)).cloned().collect();
        matched.sort_by_key(|r| r.timestamp);
        let limit = if params.limit == 0 { matched.len() } else { params.limit };
        let has_more = matched.len() > limit;
        matched.truncate(limit);
        Ok(QueryResult { records: matched, has_more })
    }

    async fn query_histogram(
        &self,
        params: &QueryParams,
        step: Duration,
    ) -> Result<Vec<HistogramBucket>, DomainError> {
        let range = validate_time_range(params)?;
        let step = chrono::Duration::from_std(step)
            .map_err(|_| DomainError::validation("histogram step must be a positive duration"))?;
        let records = self.records.read().await;
        let matched: Vec<&LogRecord> = records.iter().filter(|r| Self::matches(r, params)).collect();

        let mut buckets = Vec::new();
        let mut cursor = range.start;
        while cursor < range.end {
            let bucket_end = (cursor + step).min(range.end);
            let count = matched
                .iter()
                .filter(|r| r.timestamp >= cursor && r.timestamp < bucket_end)
                .count() as u64;
            buckets.push(HistogramBucket { start: cursor, end: bucket_end, count });
            cursor = bucket_end;
        }
        Ok(buckets)
    }

    async fn query_aggregation(
        &self,
        params: &QueryParams,
        group_by: &str,
    ) -> Result<Vec<AggregationGroup>, DomainError> {
        validate_time_range(params)?;
        let records = self.records.read().await;
        let key_of = |r: &LogRecord| -> Option<String> {
            match group_by {
                "namespace" => r.namespace.clone(),
                "pod" => r.pod.clone(),
                "container" => r.container.clone(),
                "level" => r.level.clone(),
                _ => None,
            }
        };
        let mut groups: indexmap::IndexMap<String, u64> = indexmap::IndexMap::new();
        for record in records.iter().filter(|r| Self::matches(r, params)) {
            if let Some(key) = key_of(record) {
                *groups.entry(key).or_insert(0) += 1;
            }
        }
        Ok(groups.into_iter().map(|(key, count)| AggregationGroup { key, count }).collect())
    }

    async fn ingest_batch(&self, batch: Vec<LogRecord>) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        records.extend(batch);
        let overflow = records.len().saturating_sub(MAX_RETAINED_RECORDS);
        if overflow > 0 {
            records.drain(0..overflow);
        }
        Ok(())
    }

    async fn probe(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

fn construct(args: ConstructArgs) -> Result<Box<dyn IntegrationClient>, DomainError> {
    let _ = args;
    Ok(Box::new(MockIntegration::new()))
}

inventory::submit! {
    Factory { kind: "logstore-mock", construct }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TimeRange;
    use chrono::Utc;

    fn record(ts: chrono::DateTime<chrono::Utc>, namespace: &str) -> LogRecord {
        LogRecord {
            timestamp: ts,
            stream: "stdout".into(),
            message: "hello".into(),
            namespace: Some(namespace.into()),
            pod: None,
            container: None,
            level: None,
        }
    }

    #[tokio::test]
    async fn query_filters_by_namespace_and_time_range() {
        let integration = MockIntegration::new();
        let now = Utc::now();
        integration
            .ingest_batch(vec![record(now, "kube-system"), record(now, "default")])
            .await
            .unwrap();

        let params = QueryParams {
            namespace: Some("default".into()),
            time_range: Some(TimeRange { start: now - chrono::Duration::hours(1), end: now + chrono::Duration::hours(1) }),
            ..Default::default()
        };
        let result = integration.query(&params).await.unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].namespace.as_deref(), Some("default"));
        assert!(!result.has_more);
    }

    #[tokio::test]
    async fn query_reports_has_more_when_truncated_by_limit() {
        let integration = MockIntegration::new();
        let now = Utc::now();
        integration
            .ingest_batch(vec![record(now, "a"), record(now, "a"), record(now, "a")])
            .await
            .unwrap();

        let params = QueryParams {
            limit: 2,
            time_range: Some(TimeRange { start: now - chrono::Duration::hours(1), end: now + chrono::Duration::hours(1) }),
            ..Default::default()
        };
        let result = integration.query(&params).await.unwrap();
        assert_eq!(result.records.len(), 2);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn ingest_caps_retained_records() {
        let integration = MockIntegration::new();
        let now = Utc::now();
        let batch: Vec<LogRecord> = (0..MAX_RETAINED_RECORDS + 10).map(|_| record(now, "a")).collect();
        integration.ingest_batch(batch).await.unwrap();
        assert_eq!(integration.records.read().await.len(), MAX_RETAINED_RECORDS);
    }
}
