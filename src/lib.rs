//! # Logentries router
//!
//! Routes structured log events to Logentries logs that are picked by name at runtime.
//! Logset and log names are read from each record, resolved into an ingestion token
//! through the management API (creating what does not exist yet) and cached, then the
//! event is shipped over a persistent TCP/TLS connection or a webhook.
//!
//! Modules:
//! - `config`: YAML service configuration, defaults and validation
//! - `cache`: logset model and the bounded TTL cache
//! - `management`: management API wire types and REST gateway
//! - `resolver`: name to token resolution with race handling
//! - `delivery`: ingestion socket, reconnects, line splitting, webhook
//! - `pipeline`: per-event routing and the NDJSON stdin source

pub mod cache;
pub mod config;
pub mod delivery;
pub mod error;
pub mod management;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod resolver;
pub mod server;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::config::types::ServiceConfig;
pub use crate::pipeline::router::{BatchReport, Event, LogRouter};
pub use crate::resolver::token_resolver::TokenResolver;
