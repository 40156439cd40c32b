use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use spectre_common::{DomainError, ErrorKind};
use url::Url;

use crate::config::CredentialRef;
use crate::query::{AggregationGroup, HistogramBucket, LuceneQueryBuilder, QueryBuilder, QueryParams, QueryResult};
use crate::record::LogRecord;
use crate::registry::{ConstructArgs, Factory};
use crate::secrets::SecretResolver;

use super::client::IntegrationClient;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_IDLE_PER_HOST: usize = 10;

/// An HTTP-backed log store. Resolves its bearer token fresh on every
/// request through the secret resolver's read-through cache, so a
/// rotation takes effect without restarting the instance.
pub struct HttpIntegration {
    endpoint: Url,
    client: reqwest::Client,
    query_builder: LuceneQueryBuilder,
    credential_ref: Option<CredentialRef>,
    secrets: Arc<SecretResolver>,
}

impl HttpIntegration {
    fn new(
        endpoint: Url,
        timeout: Duration,
        credential_ref: Option<CredentialRef>,
        secrets: Arc<SecretResolver>,
    ) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(DEFAULT_MAX_IDLE_PER_HOST)
            .build()
            .map_err(|e| DomainError::new(ErrorKind::Fatal, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint,
            client,
            query_builder: LuceneQueryBuilder::default(),
            credential_ref,
            secrets,
        })
    }

    async fn authorize(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, DomainError> {
        let Some(credential_ref) = &self.credential_ref else {
            return Ok(builder);
        };
        let value = self
            .secrets
            .resolve(credential_ref)
            .await
            .map_err(DomainError::from)?;
        let token = String::from_utf8_lossy(&value.bytes).into_owned();
        Ok(builder.bearer_auth(token))
    }

    async fn send_json<T: DeserializeOwned>(&self, response: Result<Response, reqwest::Error>) -> Result<T, DomainError> {
        let response = response.map_err(|e| classify_transport_error(&e))?;
        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| DomainError::new(ErrorKind::PermanentBackend, format!("malformed response body: {e}")))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DomainError::new(classify_status(status), format!("backend returned {status}: {body}")))
        }
    }
}

fn classify_transport_error(error: &reqwest::Error) -> DomainError {
    DomainError::new(ErrorKind::TransientBackend, error.to_string())
}

fn classify_status(status: StatusCode) -> ErrorKind {
    if status == StatusCode::NOT_FOUND {
        ErrorKind::NotFound
    } else if status.is_server_error() {
        ErrorKind::TransientBackend
    } else {
        ErrorKind::PermanentBackend
    }
}

#[async_trait]
impl IntegrationClient for HttpIntegration {
    async fn query(&self, params: &QueryParams) -> Result<QueryResult, DomainError> {
        let query = self.query_builder.build(params)?;
        let request = self.authorize(self.client.post(self.endpoint.join("query").unwrap())).await?;
        self.send_json(request.json(&serde_json::json!({ "query": query })).send().await).await
    }

    async fn query_histogram(&self, params: &QueryParams, step: Duration) -> Result<Vec<HistogramBucket>, DomainError> {
        let query = self.query_builder.build_histogram(params, step)?;
        let request = self.authorize(self.client.post(self.endpoint.join("histogram").unwrap())).await?;
        self.send_json(request.json(&serde_json::json!({ "query": query })).send().await).await
    }

    async fn query_aggregation(&self, params: &QueryParams, group_by: &str) -> Result<Vec<AggregationGroup>, DomainError> {
        let query = self.query_builder.build_aggregation(params, group_by)?;
        let request = self.authorize(self.client.post(self.endpoint.join("aggregate").unwrap())).await?;
        self.send_json(request.json(&serde_json::json!({ "query": query })).send().await).await
    }

    async fn ingest_batch(&self, batch: Vec<LogRecord>) -> Result<(), DomainError> {
        let request = self.authorize(self.client.post(self.endpoint.join("ingest").unwrap())).await?;
        let response = request.json(&batch).send().await.map_err(|e| classify_transport_error(&e))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DomainError::new(classify_status(status), format!("backend returned {status}: {body}")))
        }
    }

    async fn probe(&self) -> Result<(), DomainError> {
        let request = self.authorize(self.client.get(self.endpoint.join("health").unwrap())).await?;
        let response = request.send().await.map_err(|e| classify_transport_error(&e))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let _ = response.text().await;
            Err(DomainError::new(classify_status(status), format!("health check returned {status}")))
        }
    }
}

fn timeout_from_options(options: &IndexMap<String, Value>) -> Duration {
    options
        .get("requestTimeoutSeconds")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT)
}

fn construct(args: ConstructArgs) -> Result<Box<dyn IntegrationClient>, DomainError> {
    let mut endpoint = Url::parse(args.endpoint)
        .map_err(|e| DomainError::validation(format!("invalid endpoint {:?}: {e}", args.endpoint)))?;
    if !endpoint.path().ends_with('/') {
        let path = format!("{}/", endpoint.path());
        endpoint.set_path(&path);
    }
    let timeout = timeout_from_options(args.options);
    let integration = HttpIntegration::new(endpoint, timeout, args.credential_ref.cloned(), args.secrets)?;
    Ok(Box::new(integration))
}

inventory::submit! {
    Factory { kind: "logstore-http", construct }
}
