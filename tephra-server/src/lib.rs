// Tephra Server - UDP ingestion, HTTP API and threshold alerting
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Tephra Server
//!
//! Wires the `tephra` core to the outside world:
//!
//! - [`ingest`]: UDP receive loop feeding the channel store
//! - [`api`]: JSON query and management API (axum)
//! - [`scheduler`]: periodic rule evaluation
//! - [`notify`]: notification fan-out
//! - [`metrics`]: Prometheus metrics
//!
//! One store and one rule book are created in [`serve`] and shared by all
//! three tasks. Cancelling the token stops them all.

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod scheduler;

pub use config::Settings;
pub use error::{ApiError, DispatchError, Result, ServerError};
pub use notify::{Dispatcher, TracingDispatcher};

use std::sync::Arc;
use tephra::{ChannelStore, Decoder, RuleBook};
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bind both listeners and run until `cancel` fires.
///
/// Bind failures are the only errors returned.
pub async fn serve(
    settings: &Settings,
    dispatcher: Arc<dyn Dispatcher>,
    cancel: CancellationToken,
) -> Result<()> {
    let store = Arc::new(ChannelStore::new(settings.max_readings));
    let rules = Arc::new(RuleBook::new());

    let udp_addr = settings.udp_addr();
    let socket = UdpSocket::bind(udp_addr)
        .await
        .map_err(|source| ServerError::Bind {
            kind: "UDP",
            addr: udp_addr,
            source,
        })?;

    let http_addr = settings.http_addr();
    let listener = TcpListener::bind(http_addr)
        .await
        .map_err(|source| ServerError::Bind {
            kind: "HTTP",
            addr: http_addr,
            source,
        })?;

    info!(
        udp = %udp_addr,
        http = %http_addr,
        protocol = %settings.protocol,
        capacity = store.capacity(),
        "Tephra server listening"
    );

    let ingestor = ingest::Ingestor::new(Decoder::new(settings.protocol), store.clone());
    let ingest_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { ingestor.run(socket, cancel).await })
    };

    let scheduler = scheduler::RuleScheduler::new(
        rules.clone(),
        store.clone(),
        dispatcher.clone(),
        settings.rule_interval(),
    );
    let scheduler_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let state = Arc::new(api::AppState {
        store,
        rules,
        dispatcher,
        time_range_policy: settings.time_range_policy(),
    });
    let app = api::router(state);

    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    // The HTTP server only returns early on an I/O failure
    cancel.cancel();
    for task in [ingest_task, scheduler_task] {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "background task panicked");
        }
    }

    served?;
    info!("Tephra server stopped");
    Ok(())
}
