// End-to-end: a fake management API served by axum, a plain TCP listener standing in
// for the ingestion endpoint, and the router wired from a YAML `output` block.

#[cfg(test)]
mod test {

    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::routing::get;
    use axum::{Json, Router};
    use http::StatusCode;
    use serde_json::{json, Map, Value};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use crate::config::proc_loader::parse_config;
    use crate::pipeline::builder::build_router;
    use crate::pipeline::router::Event;
    use crate::tests::common::{build_reqwest_client, spawn_axum};

    const LOGSET_ID: &str = "814241d4-a14a-4c98-b059-b30978baf951";
    const LOG_ID: &str = "4c1e08f2-0398-48a5-9325-ac190e2f79e8";
    const NEW_LOG_ID: &str = "f15ad4cf-fe7d-4b7a-86b0-924997c1d8be";
    const TEST1_TOKEN: &str = "70347838-87d8-43f7-82cc-fb6f63623893";

    #[derive(Default)]
    struct Hits {
        list_logsets: AtomicUsize,
        create_logset: AtomicUsize,
        get_logset: AtomicUsize,
        get_log: AtomicUsize,
        create_log: AtomicUsize,
    }

    fn count(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Accept one connection and collect `expected` lines from it.
    async fn ingest(expected: usize) -> (JoinHandle<Vec<String>>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut received = Vec::new();
            while received.len() < expected {
                match lines.next_line().await.unwrap() {
                    Some(line) => received.push(line),
                    None => break,
                }
            }
            received
        });
        (handle, addr)
    }

    async fn output_yaml(management: SocketAddr, ingest: SocketAddr, use_json: bool) -> crate::ServiceConfig {
        let yaml = format!(
            r#"
output:
  api_token: foobar
  logset_name_field: namespace
  log_name_field: container_name
  use_json: {}
  enable_ssl: false
  ingest_host: 127.0.0.1
  ingest_port: {}
  management_url: http://{}
  race_jitter_ms: 0
"#,
            use_json,
            ingest.port(),
            management
        );
        parse_config(yaml).await.unwrap()
    }

    fn event(namespace: &str, container: &str, message: &str) -> Event {
        let mut record = Map::new();
        record.insert("namespace".into(), Value::String(namespace.into()));
        record.insert("container_name".into(), Value::String(container.into()));
        record.insert("message".into(), Value::String(message.into()));
        Event::new("kube", record)
    }

    fn test_logsets_listing() -> Value {
        json!({"logsets": [{
            "id": LOGSET_ID,
            "name": "TestLogSets",
            "logs_info": [{"id": LOG_ID, "name": "test1"}]
        }]})
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unknown_names_are_created_then_delivered() {
        let hits = Arc::new(Hits::default());
        let (h1, h2, h3) = (hits.clone(), hits.clone(), hits.clone());
        let management = Router::new()
            .route(
                "/management/logsets",
                get(|| async { Json(json!({"logsets": []})) }).post(move || {
                    let hits = h1.clone();
                    async move {
                        count(&hits.create_logset);
                        (StatusCode::CREATED, Json(json!({"logset": {"id": LOGSET_ID, "name": "new_log_set", "logs_info": []}})))
                    }
                }),
            )
            .route(
                "/management/logsets/{id}",
                get(move || {
                    let hits = h2.clone();
                    async move {
                        count(&hits.get_logset);
                        Json(json!({"logset": {"id": LOGSET_ID, "name": "new_log_set", "logs_info": []}}))
                    }
                }),
            )
            .route(
                "/management/logs",
                axum::routing::post(move |Json(body): Json<Value>| {
                    let hits = h3.clone();
                    async move {
                        count(&hits.create_log);
                        assert_eq!(body["log"]["logsets_info"][0]["id"], json!(LOGSET_ID));
                        (StatusCode::CREATED, Json(json!({"log": {
                            "id": NEW_LOG_ID,
                            "name": "new_log",
                            "tokens": ["new-log-token"],
                            "logsets_info": [{"id": LOGSET_ID}]
                        }})))
                    }
                }),
            );
        let (mgmt_h, mgmt_addr) = spawn_axum(management).await;
        let (ingest_h, ingest_addr) = ingest(1).await;

        let config = output_yaml(mgmt_addr, ingest_addr, false).await;
        let router = build_router(&config.output, build_reqwest_client()).unwrap();

        let report = router.process_batch(&[event("new_log_set", "new_log", "hello\n")]).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(ingest_h.await.unwrap(), vec!["new-log-token hello ".to_string()]);
        assert_eq!(hits.create_logset.load(Ordering::SeqCst), 1);
        assert_eq!(hits.get_logset.load(Ordering::SeqCst), 1);
        assert_eq!(hits.create_log.load(Ordering::SeqCst), 1);
        mgmt_h.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn warm_cache_fetches_each_token_once() {
        let hits = Arc::new(Hits::default());
        let (h1, h2) = (hits.clone(), hits.clone());
        let management = Router::new()
            .route(
                "/management/logsets",
                get(move || {
                    let hits = h1.clone();
                    async move {
                        count(&hits.list_logsets);
                        Json(test_logsets_listing())
                    }
                }),
            )
            .route(
                "/management/logs/{id}",
                get(move || {
                    let hits = h2.clone();
                    async move {
                        count(&hits.get_log);
                        Json(json!({"log": {
                            "id": LOG_ID,
                            "name": "test1",
                            "tokens": [TEST1_TOKEN],
                            "logsets_info": [{"id": LOGSET_ID, "name": "TestLogSets"}]
                        }}))
                    }
                }),
            );
        let (mgmt_h, mgmt_addr) = spawn_axum(management).await;
        let (ingest_h, ingest_addr) = ingest(2).await;

        let config = output_yaml(mgmt_addr, ingest_addr, true).await;
        let router = build_router(&config.output, build_reqwest_client()).unwrap();
        assert_eq!(router.resolver().warm_up().await.unwrap(), 1);

        let report = router
            .process_batch(&[
                event("TestLogSets", "test1", "first"),
                event("TestLogSets", "test1", "second"),
            ])
            .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(
            ingest_h.await.unwrap(),
            vec![
                format!(r#"{} {{"namespace":"TestLogSets","container_name":"test1","message":"first"}} "#, TEST1_TOKEN),
                format!(r#"{} {{"namespace":"TestLogSets","container_name":"test1","message":"second"}} "#, TEST1_TOKEN),
            ]
        );
        assert_eq!(hits.list_logsets.load(Ordering::SeqCst), 1);
        assert_eq!(hits.get_log.load(Ordering::SeqCst), 1);
        mgmt_h.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn create_conflict_falls_back_to_listing() {
        let hits = Arc::new(Hits::default());
        let (h1, h2, h3) = (hits.clone(), hits.clone(), hits.clone());
        let management = Router::new()
            .route(
                "/management/logsets",
                get(move || {
                    let hits = h1.clone();
                    async move {
                        count(&hits.list_logsets);
                        Json(test_logsets_listing())
                    }
                })
                .post(move || {
                    let hits = h2.clone();
                    async move {
                        count(&hits.create_logset);
                        (StatusCode::BAD_REQUEST, Json(json!({"message": "Logset name already in use"})))
                    }
                }),
            )
            .route(
                "/management/logs/{id}",
                get(move || {
                    let hits = h3.clone();
                    async move {
                        count(&hits.get_log);
                        Json(json!({"log": {"id": LOG_ID, "name": "test1", "tokens": [TEST1_TOKEN]}}))
                    }
                }),
            );
        let (mgmt_h, mgmt_addr) = spawn_axum(management).await;
        let (ingest_h, ingest_addr) = ingest(1).await;

        let config = output_yaml(mgmt_addr, ingest_addr, false).await;
        let router = build_router(&config.output, build_reqwest_client()).unwrap();

        let report = router.process_batch(&[event("TestLogSets", "test1", "raced")]).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(ingest_h.await.unwrap(), vec![format!("{} raced ", TEST1_TOKEN)]);
        assert_eq!(hits.create_logset.load(Ordering::SeqCst), 1);
        assert_eq!(hits.list_logsets.load(Ordering::SeqCst), 1);
        mgmt_h.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn management_outage_leaves_event_unresolved() {
        let management = Router::new().route(
            "/management/logsets",
            axum::routing::post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let (mgmt_h, mgmt_addr) = spawn_axum(management).await;
        let (ingest_h, ingest_addr) = ingest(1).await;

        let config = output_yaml(mgmt_addr, ingest_addr, false).await;
        let router = build_router(&config.output, build_reqwest_client()).unwrap();

        let report = router.process_batch(&[event("apps", "web", "lost")]).await;

        assert_eq!(report.unresolved, 1);
        assert!(router.resolver().cache().is_empty().await);
        ingest_h.abort();
        mgmt_h.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn existing_logset_gets_new_log_and_json_payload() {
        let hits = Arc::new(Hits::default());
        let (h1, h2, h3) = (hits.clone(), hits.clone(), hits.clone());
        let management = Router::new()
            .route(
                "/management/logsets",
                get(move || {
                    let hits = h1.clone();
                    async move {
                        count(&hits.list_logsets);
                        Json(test_logsets_listing())
                    }
                }),
            )
            .route(
                "/management/logsets/{id}",
                get(move || {
                    let hits = h2.clone();
                    async move {
                        count(&hits.get_logset);
                        Json(json!({"logset": test_logsets_listing()["logsets"][0].clone()}))
                    }
                }),
            )
            .route(
                "/management/logs",
                axum::routing::post(move || {
                    let hits = h3.clone();
                    async move {
                        count(&hits.create_log);
                        (StatusCode::CREATED, Json(json!({"log": {
                            "id": NEW_LOG_ID,
                            "name": "new_log",
                            "tokens": ["new-log-token"],
                            "logsets_info": [{"id": LOGSET_ID}]
                        }})))
                    }
                }),
            );
        let (mgmt_h, mgmt_addr) = spawn_axum(management).await;
        let (ingest_h, ingest_addr) = ingest(2).await;

        let config = output_yaml(mgmt_addr, ingest_addr, true).await;
        let router = build_router(&config.output, build_reqwest_client()).unwrap();
        router.resolver().warm_up().await.unwrap();

        let first = event("TestLogSets", "new_log", "hello");
        let second = event("TestLogSets", "new_log", "again");
        let report = router.process_batch(&[first, second]).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(
            ingest_h.await.unwrap(),
            vec![
                r#"new-log-token {"namespace":"TestLogSets","container_name":"new_log","message":"hello"} "#.to_string(),
                r#"new-log-token {"namespace":"TestLogSets","container_name":"new_log","message":"again"} "#.to_string(),
            ]
        );
        assert_eq!(hits.get_logset.load(Ordering::SeqCst), 1);
        assert_eq!(hits.create_log.load(Ordering::SeqCst), 1);
        assert_eq!(
            router.resolver().cache().get("TestLogSets").await.unwrap().token_for("new_log"),
            Some("new-log-token")
        );
        mgmt_h.abort();
    }
}
