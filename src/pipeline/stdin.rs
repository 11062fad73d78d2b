//! NDJSON event source: one JSON object per line, either `{"tag": .., "record": {..}}`
//! or a bare record. Lines are grouped into batches before they reach the router.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::delivery::connection::Connect;
use crate::management::gateway::ManagementApi;
use crate::observability::metrics::get_metrics;
use crate::pipeline::router::{default_tag, Event, LogRouter};

#[derive(Debug, Error)]
pub enum LineError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a json object")]
    NotAnObject,
}

pub fn parse_line(line: &str) -> Result<Event, LineError> {
    let Value::Object(mut object) = serde_json::from_str::<Value>(line)? else {
        return Err(LineError::NotAnObject);
    };
    if matches!(object.get("record"), Some(Value::Object(_))) {
        let tag = match object.remove("tag") {
            Some(Value::String(tag)) => tag,
            _ => default_tag(),
        };
        if let Some(Value::Object(record)) = object.remove("record") {
            return Ok(Event { tag, record });
        }
    }
    Ok(Event {
        tag: default_tag(),
        record: object,
    })
}

/// Read lines until EOF, sending every full batch and the trailing partial one.
pub async fn read_batches<R>(reader: R, batch_size: usize, sender: Sender<Vec<Event>>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let metrics = get_metrics().await;
    let batch_size = batch_size.max(1);
    let mut lines = reader.lines();
    let mut batch = Vec::with_capacity(batch_size);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(event) => batch.push(event),
            Err(e) => {
                warn!("skipping input line: {}", e);
                metrics.events_skipped.with_label_values(&["invalid_input"]).inc();
                continue;
            }
        }
        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            sender.send(full).await?;
        }
    }

    if !batch.is_empty() {
        sender.send(batch).await?;
    }
    info!("input closed");
    Ok(())
}

/// Route batches until every sender is gone.
pub async fn drain<G, C>(router: Arc<LogRouter<G, C>>, mut receiver: Receiver<Vec<Event>>) -> Result<()>
where
    G: ManagementApi,
    C: Connect,
{
    while let Some(batch) = receiver.recv().await {
        let report = router.process_batch(&batch).await;
        debug!("processed batch of {} events", report.total());
    }
    Ok(())
}
