//! Per-event routing: pick the names out of the record, resolve the token, hand the
//! payload to the delivery channel. A failing event never aborts the rest of its batch.

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::types::{NameFilterConfig, NameFilterTarget, OutputConfig};
use crate::delivery::connection::{Connect, TcpConnector};
use crate::delivery::DeliveryChannel;
use crate::management::gateway::ManagementApi;
use crate::observability::metrics::get_metrics;
use crate::resolver::token_resolver::TokenResolver;

/// One structured log event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    #[serde(default = "default_tag")]
    pub tag: String,
    pub record: Map<String, Value>,
}

impl Event {
    pub fn new(tag: &str, record: Map<String, Value>) -> Self {
        Self {
            tag: tag.to_owned(),
            record,
        }
    }
}

pub(crate) fn default_tag() -> String {
    "stdin".to_string()
}

/// Regex removed from the logset or log name before resolution.
#[derive(Debug, Clone)]
pub struct NameFilter {
    pattern: Regex,
    target: NameFilterTarget,
}

impl NameFilter {
    pub fn new(config: &NameFilterConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&config.pattern)?,
            target: config.target,
        })
    }

    pub fn apply(&self, logset: String, log: String) -> (String, String) {
        match self.target {
            NameFilterTarget::Logset => (self.pattern.replace_all(&logset, "").into_owned(), log),
            NameFilterTarget::Log => (logset, self.pattern.replace_all(&log, "").into_owned()),
        }
    }
}

/// Which record fields name the destination and which become the payload.
#[derive(Debug, Clone)]
pub struct RecordSelector {
    logset_name_field: String,
    log_name_field: String,
    use_json: bool,
    message_field: String,
    name_filter: Option<NameFilter>,
}

impl RecordSelector {
    pub fn new(logset_name_field: &str, log_name_field: &str) -> Self {
        Self {
            logset_name_field: logset_name_field.to_owned(),
            log_name_field: log_name_field.to_owned(),
            use_json: true,
            message_field: "message".to_owned(),
            name_filter: None,
        }
    }

    pub fn from_config(output: &OutputConfig) -> Result<Self, regex::Error> {
        let name_filter = output.name_filter.as_ref().map(NameFilter::new).transpose()?;
        Ok(Self {
            use_json: output.use_json,
            message_field: output.message_field.clone(),
            name_filter,
            ..Self::new(&output.logset_name_field, &output.log_name_field)
        })
    }

    pub fn with_message_field(mut self, field: &str) -> Self {
        self.use_json = false;
        self.message_field = field.to_owned();
        self
    }

    pub fn with_name_filter(mut self, filter: NameFilter) -> Self {
        self.name_filter = Some(filter);
        self
    }

    /// `(logset, log)` names, or `None` when either field is missing or empty.
    pub fn names(&self, record: &Map<String, Value>) -> Option<(String, String)> {
        let logset = field_as_name(record.get(&self.logset_name_field)?)?;
        let log = field_as_name(record.get(&self.log_name_field)?)?;
        let (logset, log) = match &self.name_filter {
            Some(filter) => filter.apply(logset, log),
            None => (logset, log),
        };
        (!logset.is_empty() && !log.is_empty()).then_some((logset, log))
    }

    /// Serialized record, or the trailing-whitespace-trimmed message field.
    pub fn payload(&self, record: &Map<String, Value>) -> Option<String> {
        if self.use_json {
            return serde_json::to_string(record).ok();
        }
        let message = match record.get(&self.message_field)? {
            Value::String(s) => s.trim_end().to_owned(),
            Value::Null => return None,
            other => other.to_string(),
        };
        Some(message)
    }
}

/// Names are taken verbatim; only non-empty strings qualify.
fn field_as_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Delivered,
    Skipped(&'static str),
    Unresolved,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub delivered: usize,
    pub skipped: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Delivered => self.delivered += 1,
            EventOutcome::Skipped(_) => self.skipped += 1,
            EventOutcome::Unresolved => self.unresolved += 1,
            EventOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.delivered + self.skipped + self.unresolved + self.failed
    }
}

pub struct LogRouter<G: ManagementApi, C: Connect = TcpConnector> {
    resolver: TokenResolver<G>,
    channel: DeliveryChannel<C>,
    selector: RecordSelector,
}

impl<G: ManagementApi, C: Connect> LogRouter<G, C> {
    pub fn new(resolver: TokenResolver<G>, channel: DeliveryChannel<C>, selector: RecordSelector) -> Self {
        Self {
            resolver,
            channel,
            selector,
        }
    }

    pub fn resolver(&self) -> &TokenResolver<G> {
        &self.resolver
    }

    pub fn channel(&self) -> &DeliveryChannel<C> {
        &self.channel
    }

    /// Route every event in order.
    pub async fn process_batch(&self, events: &[Event]) -> BatchReport {
        let mut report = BatchReport::default();
        for event in events {
            report.record(self.process_event(event).await);
        }
        debug!(
            "batch done: {} delivered, {} skipped, {} unresolved, {} failed",
            report.delivered, report.skipped, report.unresolved, report.failed
        );
        report
    }

    pub async fn process_event(&self, event: &Event) -> EventOutcome {
        let metrics = get_metrics().await;

        let Some(payload) = self.selector.payload(&event.record) else {
            debug!("event from '{}' has no message, skipping", event.tag);
            metrics.events_skipped.with_label_values(&["no_message"]).inc();
            return EventOutcome::Skipped("no_message");
        };
        let Some((logset, log)) = self.selector.names(&event.record) else {
            debug!("event from '{}' lacks logset/log name fields, skipping", event.tag);
            metrics.events_skipped.with_label_values(&["no_names"]).inc();
            return EventOutcome::Skipped("no_names");
        };

        let token = match self.resolver.resolve(&logset, &log).await {
            Ok(token) => token,
            Err(e) => {
                error!("could not resolve token for '{}/{}': {}", logset, log, e);
                return EventOutcome::Unresolved;
            }
        };

        match self.channel.send(&token, &payload).await {
            Ok(()) => EventOutcome::Delivered,
            Err(e) => {
                warn!("could not deliver event for '{}/{}': {}", logset, log, e);
                metrics
                    .delivery_failures
                    .with_label_values(&[self.channel.mode(), e.reason()])
                    .inc();
                EventOutcome::Failed
            }
        }
    }
}
