use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of ingestion. The pipeline treats this as opaque except
/// for its contribution to a batch's item count; integrations decide
/// how to encode it for their backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub stream: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}
