// Tephra Server - Notification dispatch
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Notification fan-out.
//!
//! A [`Dispatcher`] delivers one message over one [`NotificationChannel`].
//! [`dispatch`] sends the same message to several channels concurrently and
//! reports each outcome; one failure never cancels the others.

use crate::error::DispatchError;
use crate::metrics;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;
use tephra::{Channel, ChannelStore, NotificationChannel, ValidationError};
use tracing::{info, warn};

/// Delivers messages over a notification transport
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send `message` over `channel`
    async fn send(&self, channel: NotificationChannel, message: &str)
        -> Result<(), DispatchError>;
}

/// Dispatcher that records every notification as a structured log event.
///
/// Stands in for real SMS, chat and mail transports.
#[derive(Debug, Clone, Default)]
pub struct TracingDispatcher {
    disabled: BTreeSet<NotificationChannel>,
}

impl TracingDispatcher {
    /// Create a dispatcher with every channel enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse deliveries over `channel`
    pub fn with_disabled(mut self, channel: NotificationChannel) -> Self {
        self.disabled.insert(channel);
        self
    }
}

#[async_trait]
impl Dispatcher for TracingDispatcher {
    async fn send(
        &self,
        channel: NotificationChannel,
        message: &str,
    ) -> Result<(), DispatchError> {
        if self.disabled.contains(&channel) {
            return Err(DispatchError::Disabled(channel));
        }
        info!(target: "tephra::notify", channel = %channel, message = %message, "notification sent");
        Ok(())
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub channel: NotificationChannel,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Send `message` to every target concurrently.
///
/// Failures are logged and counted, never propagated.
pub async fn dispatch<D, I>(dispatcher: &D, targets: I, message: &str) -> Vec<Delivery>
where
    D: Dispatcher + ?Sized,
    I: IntoIterator<Item = NotificationChannel>,
{
    let sends = targets.into_iter().map(|channel| async move {
        let result = dispatcher.send(channel, message).await;
        if let Err(ref e) = result {
            warn!(channel = %channel, error = %e, "notification failed");
            metrics::record_dispatch_failure(channel);
        }
        Delivery {
            channel,
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        }
    });
    join_all(sends).await
}

/// Free-text broadcast submitted through the API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub message: String,
    pub channels: Vec<String>,
    #[serde(default)]
    pub include_metrics: Option<Vec<String>>,
}

impl Broadcast {
    /// Validate targets and metric names, and build the final message body.
    ///
    /// Latest values of the included metrics are appended one per line;
    /// channels with no data print `n/a`.
    pub fn prepare(
        &self,
        store: &ChannelStore,
    ) -> Result<(BTreeSet<NotificationChannel>, String), ValidationError> {
        let targets = NotificationChannel::parse_list(&self.channels)?;
        let metrics = self
            .include_metrics
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|m| m.trim().parse::<Channel>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut body = self.message.clone();
        if !metrics.is_empty() {
            body.push_str("\n\nLatest readings:");
            for channel in metrics {
                let value = store
                    .read_latest(channel, None)
                    .map(|r| r.value.to_string())
                    .unwrap_or_else(|| "n/a".to_string());
                // Writing to a String cannot fail
                let _ = write!(body, "\n- {}: {}", channel, value);
            }
        }
        Ok((targets, body))
    }
}
