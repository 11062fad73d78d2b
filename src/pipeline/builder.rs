use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use crate::cache::logset_cache::LogSetCache;
use crate::config::types::{DeliveryMode, OutputConfig};
use crate::delivery::connection::TcpConnector;
use crate::delivery::tcp::TcpSender;
use crate::delivery::webhook::{WebhookSender, DEFAULT_WEBHOOK_URL};
use crate::delivery::DeliveryChannel;
use crate::management::gateway::RestGateway;
use crate::pipeline::router::{LogRouter, RecordSelector};
use crate::resilience::retry::RetrySettings;
use crate::resolver::token_resolver::{ResolverSettings, TokenResolver};

pub fn build_resolver(output: &OutputConfig, client: Client) -> Result<TokenResolver<RestGateway>> {
    let gateway = RestGateway::new(client, &output.management_url, &output.api_token)
        .context("output.api_token is not a valid header value")?;
    let cache = LogSetCache::from_settings(output.cache_size, output.cache_ttl);
    let settings = ResolverSettings {
        resolve_attempts: output.resolve_attempts,
        race_jitter: Duration::from_millis(output.race_jitter_ms),
        race_check: output.race_check,
    };
    Ok(TokenResolver::new(gateway, cache, settings))
}

pub fn build_channel(output: &OutputConfig, client: Client) -> Result<DeliveryChannel> {
    match output.mode {
        DeliveryMode::Tcp => {
            let connector = if output.enable_ssl {
                TcpConnector::tls(&output.ingest_host, output.ingest_port)
                    .context("failed to set up TLS for the ingestion socket")?
            } else {
                TcpConnector::plain(&output.ingest_host, output.ingest_port)
            };
            info!(
                "delivering over tcp to {}:{} (tls: {})",
                output.ingest_host,
                output.ingest_port,
                connector.is_tls()
            );
            let retry = RetrySettings::new(output.max_retries, output.backoff_base_secs);
            Ok(DeliveryChannel::Tcp(TcpSender::new(connector, retry, output.max_line_bytes)))
        }
        DeliveryMode::Webhook => {
            let base_url = output.webhook_url.as_deref().unwrap_or(DEFAULT_WEBHOOK_URL);
            info!("delivering over webhook to {}", base_url);
            Ok(DeliveryChannel::Webhook(WebhookSender::new(client, base_url)))
        }
    }
}

/// Wire resolver, delivery channel and record selection from the `output` block.
pub fn build_router(output: &OutputConfig, client: Client) -> Result<LogRouter<RestGateway>> {
    let resolver = build_resolver(output, client.clone())?;
    let channel = build_channel(output, client)?;
    let selector = RecordSelector::from_config(output).context("output.name_filter.pattern")?;
    Ok(LogRouter::new(resolver, channel, selector))
}
