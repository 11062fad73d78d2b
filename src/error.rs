use http::StatusCode;

/// Failures of a single management API round trip.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// 400-class answer to a create call: the name already exists remotely.
    #[error("{operation}: resource already exists ({status}): {body}")]
    Conflict {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("{operation}: unexpected HTTP status {status}: {body}")]
    Remote {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("transport error")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response body")]
    Decode(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, GatewayError::Conflict { .. })
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Conflict { .. } => "conflict",
            GatewayError::Remote { .. } => "status",
            GatewayError::Transport(_) => "transport",
            GatewayError::Decode(_) => "decode",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("unable to create logset '{0}'")]
    LogSetUnavailable(String),
    #[error("unable to create log '{log}' in logset '{logset}'")]
    LogUnavailable { logset: String, log: String },
    #[error("log '{log_id}' has no token")]
    MissingToken { log_id: String },
}

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("could not push logs to Logentries after {retries} retries: {source}")]
    ConnectionFailure {
        retries: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("socket error")]
    Io(#[from] std::io::Error),
    #[error("webhook request failed")]
    Webhook(#[from] reqwest::Error),
}

impl DeliveryError {
    pub fn reason(&self) -> &'static str {
        match self {
            DeliveryError::ConnectionFailure { .. } => "connection",
            DeliveryError::Io(_) => "io",
            DeliveryError::Webhook(_) => "webhook",
        }
    }
}
