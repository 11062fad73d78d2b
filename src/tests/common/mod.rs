// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use http::StatusCode;
use reqwest::Client;
use tokio::io::AsyncWrite;

use crate::delivery::connection::{Connect, EMSGSIZE};
use crate::error::GatewayError;
use crate::management::api::{LogInfo, LogSetRef, LogSetSummary, LogSummary};
use crate::management::gateway::ManagementApi;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Scripted misbehaviour of a [`MemoryConnector`].
#[derive(Debug, Clone, Default)]
pub struct FailureScript {
    /// Connect attempts refused before one succeeds.
    pub connect_failures: usize,
    /// Writes failing with a broken pipe, one per fresh connection.
    pub write_failures: usize,
    /// Writes larger than this fail with EMSGSIZE.
    pub too_large_above: Option<usize>,
}

impl FailureScript {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn connect_failures(n: usize) -> Self {
        Self {
            connect_failures: n,
            ..Self::default()
        }
    }

    pub fn write_failures(n: usize) -> Self {
        Self {
            write_failures: n,
            ..Self::default()
        }
    }

    pub fn too_large_above(bytes: usize) -> Self {
        Self {
            too_large_above: Some(bytes),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    script: FailureScript,
    connect_attempts: usize,
    connects: usize,
    lines: Vec<String>,
}

/// In-memory ingestion endpoint: every successful write is recorded as one line.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new(script: FailureScript) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                script,
                ..MemoryState::default()
            })),
        }
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connect_attempts
    }

    /// Successful connects.
    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn lines(&self) -> Vec<String> {
        self.state.lock().unwrap().lines.clone()
    }
}

impl Connect for MemoryConnector {
    type Stream = MemoryStream;

    async fn connect(&self) -> io::Result<MemoryStream> {
        let mut state = self.state.lock().unwrap();
        state.connect_attempts += 1;
        if state.script.connect_failures > 0 {
            state.script.connect_failures -= 1;
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        state.connects += 1;
        Ok(MemoryStream {
            state: self.state.clone(),
            fresh: true,
        })
    }
}

pub struct MemoryStream {
    state: Arc<Mutex<MemoryState>>,
    fresh: bool,
}

impl AsyncWrite for MemoryStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut state = this.state.lock().unwrap();
        if this.fresh && state.script.write_failures > 0 {
            state.script.write_failures -= 1;
            this.fresh = false;
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        this.fresh = false;
        if state.script.too_large_above.is_some_and(|max| buf.len() > max) {
            return Poll::Ready(Err(io::Error::from_raw_os_error(EMSGSIZE)));
        }
        state.lines.push(String::from_utf8_lossy(buf).into_owned());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[derive(Debug, Clone)]
struct RemoteLog {
    id: String,
    name: String,
    logset_id: String,
    token: Option<String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    logsets: Vec<(String, String)>,
    logs: Vec<RemoteLog>,
    hidden: HashSet<String>,
    late_logs: HashMap<(String, String), String>,
    failing: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
    next_id: usize,
}

impl RemoteState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn call(&mut self, operation: &'static str) -> Result<(), GatewayError> {
        *self.calls.entry(operation).or_default() += 1;
        if self.failing.contains(operation) {
            return Err(GatewayError::Remote {
                operation,
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "scripted failure".into(),
            });
        }
        Ok(())
    }

    fn logset_id(&self, name: &str) -> Option<String> {
        self.logsets.iter().find(|(_, n)| n == name).map(|(id, _)| id.clone())
    }

    fn ensure_logset(&mut self, name: &str) -> String {
        match self.logset_id(name) {
            Some(id) => id,
            None => {
                let id = self.next_id("ls");
                self.logsets.push((id.clone(), name.to_owned()));
                id
            }
        }
    }

    fn insert_log(&mut self, logset_id: &str, name: &str, token: Option<String>) -> RemoteLog {
        let log = RemoteLog {
            id: self.next_id("l"),
            name: name.to_owned(),
            logset_id: logset_id.to_owned(),
            token,
        };
        self.logs.push(log.clone());
        log
    }

    fn logset_summary(&self, id: &str, name: &str) -> LogSetSummary {
        LogSetSummary {
            id: id.to_owned(),
            name: name.to_owned(),
            logs_info: self
                .logs
                .iter()
                .filter(|log| log.logset_id == id)
                .map(|log| LogInfo {
                    id: log.id.clone(),
                    name: log.name.clone(),
                })
                .collect(),
        }
    }

    fn log_summary(log: &RemoteLog) -> LogSummary {
        LogSummary {
            id: log.id.clone(),
            name: log.name.clone(),
            tokens: log.token.iter().cloned().collect(),
            logsets_info: vec![LogSetRef {
                id: log.logset_id.clone(),
                name: None,
            }],
        }
    }
}

fn conflict(operation: &'static str) -> GatewayError {
    GatewayError::Conflict {
        operation,
        status: StatusCode::BAD_REQUEST,
        body: "name already in use".into(),
    }
}

/// In-memory management API with per-operation call counters.
/// Created logs get the token `tok-<log name>`.
#[derive(Debug, Clone, Default)]
pub struct FakeManagementApi {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeManagementApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_logset(&self, name: &str) -> String {
        self.state.lock().unwrap().ensure_logset(name)
    }

    pub fn add_log(&self, logset: &str, name: &str, token: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        let logset_id = state.ensure_logset(logset);
        state.insert_log(&logset_id, name, token.map(str::to_owned));
    }

    /// The logset exists (create conflicts) but never shows up in a listing.
    pub fn hide_logset(&self, name: &str) {
        self.state.lock().unwrap().hidden.insert(name.to_owned());
    }

    /// Creating this log fails with a conflict, and the log appears remotely at that moment.
    pub fn appear_on_create_conflict(&self, logset: &str, log: &str, token: &str) {
        self.state
            .lock()
            .unwrap()
            .late_logs
            .insert((logset.to_owned(), log.to_owned()), token.to_owned());
    }

    pub fn fail_operation(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().unwrap().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }
}

impl ManagementApi for FakeManagementApi {
    async fn list_logsets(&self) -> Result<Vec<LogSetSummary>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.call("list_logsets")?;
        Ok(state
            .logsets
            .iter()
            .map(|(id, name)| state.logset_summary(id, name))
            .collect())
    }

    async fn list_logs(&self) -> Result<Vec<LogSummary>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.call("list_logs")?;
        Ok(state.logs.iter().map(RemoteState::log_summary).collect())
    }

    async fn get_logset(&self, logset_id: &str) -> Result<LogSetSummary, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.call("get_logset")?;
        let name = state
            .logsets
            .iter()
            .find(|(id, _)| id == logset_id)
            .map(|(_, name)| name.clone())
            .ok_or_else(|| GatewayError::Remote {
                operation: "get_logset",
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            })?;
        Ok(state.logset_summary(logset_id, &name))
    }

    async fn get_log(&self, log_id: &str) -> Result<LogSummary, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.call("get_log")?;
        state
            .logs
            .iter()
            .find(|log| log.id == log_id)
            .map(RemoteState::log_summary)
            .ok_or_else(|| GatewayError::Remote {
                operation: "get_log",
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            })
    }

    async fn create_logset(&self, name: &str) -> Result<LogSetSummary, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.call("create_logset")?;
        if state.hidden.contains(name) || state.logset_id(name).is_some() {
            return Err(conflict("create_logset"));
        }
        let id = state.ensure_logset(name);
        Ok(state.logset_summary(&id, name))
    }

    async fn create_log(&self, logset_id: &str, name: &str) -> Result<LogSummary, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.call("create_log")?;
        let logset_name = state
            .logsets
            .iter()
            .find(|(id, _)| id == logset_id)
            .map(|(_, n)| n.clone())
            .unwrap_or_default();
        if let Some(token) = state.late_logs.remove(&(logset_name, name.to_owned())) {
            state.insert_log(logset_id, name, Some(token));
            return Err(conflict("create_log"));
        }
        if state
            .logs
            .iter()
            .any(|log| log.logset_id == logset_id && log.name == name)
        {
            return Err(conflict("create_log"));
        }
        let log = state.insert_log(logset_id, name, Some(format!("tok-{}", name)));
        Ok(RemoteState::log_summary(&log))
    }
}
