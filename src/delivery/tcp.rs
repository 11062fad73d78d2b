use tracing::{debug, warn};

use crate::delivery::connection::{is_message_too_large, Connect, ConnectionManager, TcpConnector};
use crate::error::DeliveryError;
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;

/// Wire framing of one ingestion line: `<token> <message> \n`.
pub fn format_line(token: &str, message: &str) -> String {
    format!("{} {} \n", token, message)
}

/// Split around the character at the midpoint: `(left, separator, right)`, with
/// `left + separator + right == data`. `None` for an empty string.
pub fn split_message(data: &str) -> Option<(&str, char, &str)> {
    let mut mid = data.len() / 2;
    while !data.is_char_boundary(mid) {
        mid -= 1;
    }
    let separator = data[mid..].chars().next()?;
    Some((&data[..mid], separator, &data[mid + separator.len_utf8()..]))
}

enum PartError {
    TooLarge,
    Failed(DeliveryError),
}

/// Persistent-connection delivery over one shared socket.
pub struct TcpSender<C: Connect = TcpConnector> {
    connections: ConnectionManager<C>,
    retry: RetrySettings,
    max_line_bytes: Option<usize>,
}

impl<C: Connect> TcpSender<C> {
    pub fn new(connector: C, retry: RetrySettings, max_line_bytes: Option<usize>) -> Self {
        Self {
            connections: ConnectionManager::new(connector),
            retry,
            max_line_bytes,
        }
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    /// Send `message`, halving it as often as needed when the line is too large.
    /// Parts go out in order; every part gets its own retry budget.
    pub async fn send(&self, token: &str, message: &str) -> Result<(), DeliveryError> {
        let metrics = get_metrics().await;
        let mut pending = vec![message];

        while let Some(part) = pending.pop() {
            match self.send_part(token, part).await {
                Ok(()) => {}
                Err(PartError::Failed(err)) => return Err(err),
                Err(PartError::TooLarge) => match split_message(part) {
                    Some((left, _, right)) if !(left.is_empty() && right.is_empty()) => {
                        metrics.message_splits.inc();
                        warn!("message too long ({} bytes), re-sending it in two parts", part.len());
                        for half in [right, left] {
                            if !half.is_empty() {
                                pending.push(half);
                            }
                        }
                    }
                    _ => {
                        warn!("dropping {}-byte message part: too large and cannot be split further", part.len());
                        metrics.delivery_failures.with_label_values(&["tcp", "too_large"]).inc();
                    }
                },
            }
        }
        Ok(())
    }

    async fn send_part(&self, token: &str, part: &str) -> Result<(), PartError> {
        let line = format_line(token, part);
        if self.max_line_bytes.is_some_and(|max| line.len() > max) {
            return Err(PartError::TooLarge);
        }

        debug!("writing {} bytes to ingestion socket", line.len());
        match self
            .retry
            .run_with_retry(|| self.connections.write_line(line.as_bytes()))
            .await
        {
            Ok(()) => {
                get_metrics().await.lines_delivered.with_label_values(&["tcp"]).inc();
                Ok(())
            }
            Err(DeliveryError::Io(e)) if is_message_too_large(&e) => Err(PartError::TooLarge),
            Err(e) => Err(PartError::Failed(e)),
        }
    }
}
