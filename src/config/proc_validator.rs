//! Configuration validation with aggregated errors.
//! Every issue is collected so a bad file is reported in one pass.

use regex::Regex;
use tracing::{error, info};
use url::Url;

use crate::config::settings::SettingsConfig;
use crate::config::types::{DeliveryMode, OutputConfig, ServiceConfig};
use crate::observability::metrics::get_metrics;

/// Returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_output(&cfg.output, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(errors)
    }
}

fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.server.host.is_empty() {
        errors.push("settings.server.host must not be empty".to_string());
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be a port number",
            settings.server.port
        ));
    }

    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

fn validate_output(output: &OutputConfig, errors: &mut Vec<String>) {
    if output.api_token.trim().is_empty() {
        errors.push("output.api_token must not be empty".to_string());
    }
    if output.logset_name_field.is_empty() {
        errors.push("output.logset_name_field must not be empty".to_string());
    }
    if output.log_name_field.is_empty() {
        errors.push("output.log_name_field must not be empty".to_string());
    }
    if !output.use_json && output.message_field.trim().is_empty() {
        errors.push("output.message_field must be set when use_json is false".to_string());
    }

    if output.cache_size == 0 {
        errors.push("output.cache_size must be > 0".to_string());
    }
    if output.cache_ttl == 0 {
        errors.push("output.cache_ttl must be non-zero; use a negative value to disable expiry".to_string());
    }
    if output.resolve_attempts == 0 {
        errors.push("output.resolve_attempts must be > 0".to_string());
    }
    if output.batch_size == 0 {
        errors.push("output.batch_size must be > 0".to_string());
    }
    if output.backoff_base_secs == 0 {
        errors.push("output.backoff_base_secs must be > 0".to_string());
    }
    if output.max_line_bytes == Some(0) {
        errors.push("output.max_line_bytes must be > 0".to_string());
    }

    validate_url("output.management_url", &output.management_url, errors);
    match output.mode {
        DeliveryMode::Tcp => {
            if output.ingest_host.trim().is_empty() {
                errors.push("output.ingest_host must not be empty".to_string());
            }
            if output.ingest_port == 0 {
                errors.push("output.ingest_port must be > 0".to_string());
            }
        }
        DeliveryMode::Webhook => {
            if let Some(url) = &output.webhook_url {
                validate_url("output.webhook_url", url, errors);
            }
        }
    }

    if let Some(filter) = &output.name_filter {
        if let Err(e) = Regex::new(&filter.pattern) {
            errors.push(format!(
                "output.name_filter.pattern '{}' is not a valid regex: {}",
                filter.pattern, e
            ));
        }
    }
}

fn validate_url(path: &str, value: &str, errors: &mut Vec<String>) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(format!(
            "{} '{}' must use http or https, got '{}'",
            path,
            value,
            url.scheme()
        )),
        Err(e) => errors.push(format!("{} '{}' is not a valid url: {}", path, value, e)),
    }
}
