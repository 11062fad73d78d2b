#[cfg(test)]
mod test {

    use crate::config::settings::{MetricsConfig, SettingsConfig};
    use crate::observability::metrics::get_metrics;
    use crate::server::server::app;
    use crate::tests::common::{build_reqwest_client, spawn_axum};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn metrics_are_served_in_text_format() {
        let settings = SettingsConfig {
            metrics: MetricsConfig {
                path: "/metrics".into(),
                is_enabled: true,
            },
            ..Default::default()
        };
        get_metrics().await.message_splits.inc();

        let (handle, addr) = spawn_axum(app(&settings).await).await;
        let response = build_reqwest_client()
            .get(format!("http://{}/metrics", addr))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
        let body = response.text().await.unwrap();
        assert!(body.contains("logentries_router_message_splits_total"));
        handle.abort();
    }

    #[tokio::test]
    async fn disabled_metrics_expose_no_routes() {
        let settings = SettingsConfig::default();
        assert!(!app(&settings).await.has_routes());
    }
}
