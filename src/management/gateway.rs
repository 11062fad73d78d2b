use std::future::Future;
use std::time::Instant;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::management::api::{
    CreateLogRequest, CreateLogSetRequest, LogEnvelope, LogSetEnvelope, LogSetSummary,
    LogSetsEnvelope, LogSummary, LogsEnvelope,
};
use crate::observability::metrics::get_metrics;

pub const DEFAULT_MANAGEMENT_URL: &str = "https://rest.logentries.com";
pub const API_KEY_HEADER: &str = "x-api-key";

static LIST_LOGSETS: &str = "list_logsets";
static LIST_LOGS: &str = "list_logs";
static GET_LOGSET: &str = "get_logset";
static GET_LOG: &str = "get_log";
static CREATE_LOGSET: &str = "create_logset";
static CREATE_LOG: &str = "create_log";

/// Remote management API. Every call is one network round trip: no caching, no retries.
pub trait ManagementApi: Send + Sync {
    fn list_logsets(&self) -> impl Future<Output = Result<Vec<LogSetSummary>, GatewayError>> + Send;

    /// Flat listing of every log with its owning logset references.
    fn list_logs(&self) -> impl Future<Output = Result<Vec<LogSummary>, GatewayError>> + Send;

    fn get_logset(&self, logset_id: &str) -> impl Future<Output = Result<LogSetSummary, GatewayError>> + Send;

    fn get_log(&self, log_id: &str) -> impl Future<Output = Result<LogSummary, GatewayError>> + Send;

    /// Fails with [`GatewayError::Conflict`] when the name is already taken.
    fn create_logset(&self, name: &str) -> impl Future<Output = Result<LogSetSummary, GatewayError>> + Send;

    fn create_log(
        &self,
        logset_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<LogSummary, GatewayError>> + Send;
}

#[derive(Debug, Clone)]
pub struct RestGateway {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl RestGateway {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Result<Self, http::header::InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            headers,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/management/{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        conflict_on_client_error: bool,
    ) -> Result<T, GatewayError> {
        let metrics = get_metrics().await;
        let start = Instant::now();
        metrics.management_requests.with_label_values(&[operation]).inc();

        let result = async {
            let response = request.headers(self.headers.clone()).send().await?;
            let status = response.status();
            let body = response.text().await?;
            check_status(operation, status, body.as_str(), conflict_on_client_error)?;
            Ok::<T, GatewayError>(serde_json::from_str(&body)?)
        }
        .await;

        metrics
            .management_duration
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            debug!("management call '{}' failed: {}", operation, err);
            metrics
                .management_failures
                .with_label_values(&[operation, err.reason()])
                .inc();
        }
        result
    }
}

fn check_status(
    operation: &'static str,
    status: StatusCode,
    body: &str,
    conflict_on_client_error: bool,
) -> Result<(), GatewayError> {
    if status.is_success() {
        return Ok(());
    }
    // the API answers a duplicate name with 400 rather than 409
    if conflict_on_client_error && (status == StatusCode::BAD_REQUEST || status == StatusCode::CONFLICT) {
        return Err(GatewayError::Conflict {
            operation,
            status,
            body: body.to_owned(),
        });
    }
    Err(GatewayError::Remote {
        operation,
        status,
        body: body.to_owned(),
    })
}

impl ManagementApi for RestGateway {
    async fn list_logsets(&self) -> Result<Vec<LogSetSummary>, GatewayError> {
        let request = self.client.get(self.url("logsets"));
        let envelope: LogSetsEnvelope = self.execute(LIST_LOGSETS, request, false).await?;
        Ok(envelope.logsets)
    }

    async fn list_logs(&self) -> Result<Vec<LogSummary>, GatewayError> {
        let request = self.client.get(self.url("logs"));
        let envelope: LogsEnvelope = self.execute(LIST_LOGS, request, false).await?;
        Ok(envelope.logs)
    }

    async fn get_logset(&self, logset_id: &str) -> Result<LogSetSummary, GatewayError> {
        let request = self.client.get(self.url(&format!("logsets/{}", logset_id)));
        let envelope: LogSetEnvelope = self.execute(GET_LOGSET, request, false).await?;
        Ok(envelope.logset)
    }

    async fn get_log(&self, log_id: &str) -> Result<LogSummary, GatewayError> {
        let request = self.client.get(self.url(&format!("logs/{}", log_id)));
        let envelope: LogEnvelope = self.execute(GET_LOG, request, false).await?;
        Ok(envelope.log)
    }

    async fn create_logset(&self, name: &str) -> Result<LogSetSummary, GatewayError> {
        info!("creating logset '{}'", name);
        let request = self
            .client
            .post(self.url("logsets"))
            .json(&CreateLogSetRequest::new(name));
        let envelope: LogSetEnvelope = self.execute(CREATE_LOGSET, request, true).await?;
        Ok(envelope.logset)
    }

    async fn create_log(&self, logset_id: &str, name: &str) -> Result<LogSummary, GatewayError> {
        info!("creating log '{}' in logset '{}'", name, logset_id);
        let request = self
            .client
            .post(self.url("logs"))
            .json(&CreateLogRequest::new(logset_id, name));
        let envelope: LogEnvelope = self.execute(CREATE_LOG, request, true).await?;
        Ok(envelope.log)
    }
}
