use serde::Deserialize;

use crate::cache::logset_cache::{DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL_SECONDS};
use crate::config::settings::SettingsConfig;
use crate::delivery::connection::{DEFAULT_INGEST_HOST, DEFAULT_INGEST_PORT};
use crate::management::gateway::DEFAULT_MANAGEMENT_URL;
use crate::resilience::retry::{DEFAULT_BACKOFF_BASE_SECS, DEFAULT_MAX_RETRIES};
use crate::resolver::token_resolver::{DEFAULT_RACE_JITTER_MS, DEFAULT_RESOLVE_ATTEMPTS};

/// ================================
/// Root of the YAML file
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    pub output: OutputConfig,
}

/// ================================
/// Routing, resolution and delivery
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Management API key.
    pub api_token: String,
    /// Record field naming the logset.
    pub logset_name_field: String,
    /// Record field naming the log.
    pub log_name_field: String,

    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Seconds; negative disables expiry.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: i64,

    /// Send the whole record as JSON instead of a single field.
    #[serde(default = "default_true")]
    pub use_json: bool,
    #[serde(default = "default_message_field")]
    pub message_field: String,

    #[serde(default)]
    pub mode: DeliveryMode,
    #[serde(default = "default_true", alias = "use_ssl")]
    pub enable_ssl: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_ingest_host")]
    pub ingest_host: String,
    #[serde(default = "default_ingest_port")]
    pub ingest_port: u16,
    /// Lines longer than this are split before they are written.
    pub max_line_bytes: Option<usize>,
    pub webhook_url: Option<String>,

    #[serde(default = "default_management_url")]
    pub management_url: String,
    #[serde(default)]
    pub race_check: RaceCheck,
    #[serde(default = "default_resolve_attempts")]
    pub resolve_attempts: u32,
    #[serde(default = "default_race_jitter_ms")]
    pub race_jitter_ms: u64,
    pub name_filter: Option<NameFilterConfig>,

    /// Events handed to the router per batch when reading stdin.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Tcp,
    Webhook,
}

/// How the resolver polls the remote side for a log created by another writer.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RaceCheck {
    /// `GET /management/logsets/{id}` and look at its children.
    #[default]
    Logset,
    /// `GET /management/logs` and keep the logs owned by the logset.
    LogListing,
}

/// Regex removed from a name before resolution.
#[derive(Debug, Deserialize, Clone)]
pub struct NameFilterConfig {
    pub pattern: String,
    #[serde(default)]
    pub target: NameFilterTarget,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NameFilterTarget {
    #[default]
    Logset,
    Log,
}

fn default_true() -> bool {
    true
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_cache_ttl() -> i64 {
    DEFAULT_CACHE_TTL_SECONDS
}

fn default_message_field() -> String {
    "message".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_base_secs() -> u64 {
    DEFAULT_BACKOFF_BASE_SECS
}

fn default_ingest_host() -> String {
    DEFAULT_INGEST_HOST.to_string()
}

fn default_ingest_port() -> u16 {
    DEFAULT_INGEST_PORT
}

fn default_management_url() -> String {
    DEFAULT_MANAGEMENT_URL.to_string()
}

fn default_resolve_attempts() -> u32 {
    DEFAULT_RESOLVE_ATTEMPTS
}

fn default_race_jitter_ms() -> u64 {
    DEFAULT_RACE_JITTER_MS
}

fn default_batch_size() -> usize {
    100
}
