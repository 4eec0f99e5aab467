//! Outbound message delivery.
//!
//! Delivery is best effort. A notifier reports success or failure and
//! nothing more: there is no retry, queueing, or acknowledgement.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::tracing::prelude::*;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gateway rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Gateway did not answer within {0:?}")]
    TimedOut(Duration),
}

/// Sends a text message to a recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), NotifyError>;
}

/// JSON body accepted by the web messaging gateway.
#[derive(Debug, Serialize)]
struct GatewayMessage<'a> {
    to: &'a str,
    message: &'a str,
}

/// Posts messages to a local web messaging gateway.
///
/// The gateway accepts `{"to": ..., "message": ...}` and answers 200 once
/// it has handed the message to the messaging channel.
pub struct WebGatewayNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebGatewayNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebGatewayNotifier {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GatewayMessage {
                to: recipient,
                message: text,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            debug!(recipient, "Gateway accepted message");
            return Ok(());
        }

        // The body usually explains the refusal; losing it is acceptable.
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
