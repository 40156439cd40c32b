use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spectre_common::DomainError;

/// The structured filter every service normalizes user input into
/// before handing it to a backend-specific [`crate::query::QueryBuilder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub limit: usize,
}

impl QueryParams {
    /// Fills an absent time range with the last hour. Every service
    /// calls this before building a backend query; `QueryBuilder`
    /// implementations treat an absent range as a caller bug rather
    /// than inventing a default themselves.
    pub fn with_default_time_range(mut self) -> Self {
        if self.time_range.is_none() {
            let end = Utc::now();
            self.time_range = Some(TimeRange {
                start: end - chrono::Duration::hours(1),
                end,
            });
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn duration(&self) -> Result<std::time::Duration, DomainError> {
        (self.end - self.start)
            .to_std()
            .map_err(|_| DomainError::validation("time range end must not precede start"))
    }
}
