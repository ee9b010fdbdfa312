//! # exchange-set-fulfilment
//!
//! Backend library that assembles nautical chart exchange sets for delivery.
//!
//! A job arrives as a queue message naming a batch. The service loads the
//! stored catalogue response for that batch, fetches the requested chart
//! cells from a file-sharing backend in concurrent partitions, generates the
//! ancillary files that make the tree a valid exchange set and tells the
//! requester how it went through a callback.
//!
//! Three bundle shapes are built:
//! - **Standard** - a single `V01X01` exchange set
//! - **AIO** - an overlay exchange set built next to the standard one
//! - **Large media** - several numbered volumes when the request is too big for one
//!
//! Any failure is compensated: an error artifact is written, uploaded and
//! committed to the batch, and the callback reports the classified event id.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use exchange_set_fulfilment::{Config, FileShareService, FulfilmentService};
//!
//! # fn file_share() -> Arc<dyn FileShareService> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = FulfilmentService::with_file_share(Config::default(), file_share())?;
//!
//!     // Subscribe to events
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(16);
//!     service.start_queue_consumer(rx);
//!     tx.send(r#"{"batchId":"b1","correlationId":"c1","fileSize":4096,
//!         "catalogueRequestedAt":"2026-03-02T09:15:00Z","responseLocation":"b1.json"}"#
//!         .to_string())
//!         .await?;
//!
//!     exchange_set_fulfilment::run_with_shutdown(service).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Bundle assembly stages
pub mod fulfilment;
/// Job orchestration and compensation
mod job;
/// Bundle directory layout
pub mod layout;
/// Service handle
pub mod service;
/// External collaborators and their default implementations
pub mod services;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{AioConfig, CallbackConfig, Config, FulfilmentConfig, LargeMediaConfig, LayoutConfig};
pub use error::{Error, EventId, FileShareError, FulfilmentError, Result};
pub use layout::{BundleContext, BundleLayout};
pub use service::FulfilmentService;
pub use services::{
    AncillaryFileWriter, CallbackDelivery, CallbackSink, CatalogueStore, Collaborators, FileShareService,
    PartitionFetch, ProductValidator, ValidationResult,
};
pub use types::{
    BatchId, BusinessUnit, BundleVariant, CatalogueResponse, Event, ExchangeSetStandard,
    FulfilmentManifest, FulfilmentRequest, JobOutcome, Product,
};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(service: FulfilmentService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
