pub mod connection;
pub mod tcp;
pub mod webhook;

use crate::delivery::connection::{Connect, TcpConnector};
use crate::delivery::tcp::TcpSender;
use crate::delivery::webhook::WebhookSender;
use crate::error::DeliveryError;

/// Where resolved `(token, message)` pairs go.
pub enum DeliveryChannel<C: Connect = TcpConnector> {
    Tcp(TcpSender<C>),
    Webhook(WebhookSender),
}

impl<C: Connect> DeliveryChannel<C> {
    pub fn mode(&self) -> &'static str {
        match self {
            DeliveryChannel::Tcp(_) => "tcp",
            DeliveryChannel::Webhook(_) => "webhook",
        }
    }

    pub async fn send(&self, token: &str, message: &str) -> Result<(), DeliveryError> {
        match self {
            DeliveryChannel::Tcp(s) => s.send(token, message).await,
            DeliveryChannel::Webhook(s) => s.send(token, message).await,
        }
    }
}
