// Tephra Server - UDP ingestion, HTTP API and threshold alerting
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Tephra Server
//!
//! ## Usage
//!
//! ```bash
//! # Devices speaking the v1 layout on the default ports
//! tephra-server --protocol v1
//!
//! # Custom ports and a shorter rule period
//! UDP_PORT=7000 tephra-server --http-port 9090 --rule-interval-secs 10
//! ```

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tephra_server::{serve, Settings, TracingDispatcher};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::from_default_env().add_directive(settings.level().into()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Tephra Server v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown requested");
                    cancel.cancel();
                }
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
            }
        });
    }

    match serve(&settings, Arc::new(TracingDispatcher::new()), cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}
