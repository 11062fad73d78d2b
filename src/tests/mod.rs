pub mod common;
mod metrics_endpoint;
mod resolve_and_deliver;
