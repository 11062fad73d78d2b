use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
}

impl AppState {
    pub fn new(metrics: &Metrics) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
        }
    }
}

pub async fn app(settings_config: &SettingsConfig) -> Router {
    let state = AppState::new(get_metrics().await);
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .with_state(state)
}

/// Serve the metrics endpoint. Returns immediately when nothing is routed.
pub async fn start(settings_config: &SettingsConfig) -> Result<()> {
    let metrics = get_metrics().await;
    let app = app(settings_config).await;
    metrics.up.set(1);

    if app.has_routes() {
        let bind_addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", bind_addr))?;
        info!("serving metrics on {}{}", bind_addr, settings_config.metrics.path);
        axum::serve(listener, app).await?;
    }

    Ok(())
}
