//! The fulfilment service handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, LayoutConfig};
use crate::error::{Error, Result};
use crate::services::{
    BasicProductValidator, Collaborators, FileShareService, FsAncillaryWriter, FsCatalogueStore,
    WebhookCallbackSink,
};
use crate::types::{Event, FulfilmentRequest, JobOutcome};

/// How long `shutdown` waits for in-flight jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Main service instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct FulfilmentService {
    /// Configuration (wrapped in Arc for sharing across jobs)
    pub(crate) config: Arc<Config>,
    /// Folder names, shared by every bundle layout
    pub(crate) layout: Arc<LayoutConfig>,
    /// External collaborators
    pub(crate) services: Collaborators,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Parent of every job's cancellation token
    pub(crate) shutdown_token: CancellationToken,
    /// Semaphore limiting concurrent jobs (respects max_concurrent_jobs config)
    pub(crate) job_limit: Arc<tokio::sync::Semaphore>,
    /// Whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl FulfilmentService {
    /// Create a service running against `services`
    ///
    /// Fails if the configuration does not validate.
    pub fn new(config: Config, services: Collaborators) -> Result<Self> {
        config.validate()?;

        // Buffer of 1000 events so slow subscribers do not lag behind a burst of jobs
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);
        let job_limit = Arc::new(tokio::sync::Semaphore::new(
            config.fulfilment.max_concurrent_jobs,
        ));

        Ok(Self {
            layout: Arc::new(config.layout.clone()),
            config: Arc::new(config),
            services,
            event_tx,
            shutdown_token: CancellationToken::new(),
            job_limit,
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Create a service with the default collaborators around `file_share`
    ///
    /// Uses [`FsAncillaryWriter`], [`BasicProductValidator`], an
    /// [`FsCatalogueStore`] rooted at `fulfilment.response_dir` and a
    /// [`WebhookCallbackSink`] with the configured timeout.
    pub fn with_file_share(config: Config, file_share: Arc<dyn FileShareService>) -> Result<Self> {
        let services = Collaborators {
            file_share,
            writer: Arc::new(FsAncillaryWriter),
            validator: Arc::new(BasicProductValidator),
            catalogue: Arc::new(FsCatalogueStore::new(
                config.fulfilment.response_dir.clone(),
            )),
            callback: Arc::new(WebhookCallbackSink::new(config.callback.timeout)),
        };
        Self::new(config, services)
    }

    /// Subscribe to service events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse a queue message body and run its job
    ///
    /// Malformed messages are rejected with [`Error::InvalidMessage`] before
    /// any directory is created.
    pub async fn process_message(&self, body: &str) -> Result<JobOutcome> {
        let request = FulfilmentRequest::from_message(body).inspect_err(|e| {
            tracing::error!(error = %e, "Rejected queue message");
        })?;
        self.process_request(request).await
    }

    /// Run one job, waiting for a free job slot first
    ///
    /// Failures of the job itself are compensated and reported in the
    /// returned [`JobOutcome`]. A request with an invalid batch or
    /// correlation id is rejected with [`Error::InvalidMessage`] before any
    /// directory is created, and a service that is shutting down returns
    /// [`Error::ShuttingDown`].
    pub async fn process_request(&self, request: FulfilmentRequest) -> Result<JobOutcome> {
        request.validate().inspect_err(|e| {
            tracing::error!(error = %e, "Rejected fulfilment request");
        })?;
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let _permit = self
            .job_limit
            .acquire()
            .await
            .map_err(|_| Error::ShuttingDown)?;

        Ok(crate::job::run_job(self, request).await)
    }

    /// Gracefully shut down the service
    ///
    /// Stops accepting jobs, cancels the running ones (they compensate as
    /// usual) and waits up to 30 seconds for them to release their slots.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        let slots = u32::try_from(self.config.fulfilment.max_concurrent_jobs).unwrap_or(u32::MAX);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.job_limit.acquire_many(slots)).await {
            Ok(Ok(_all)) => {
                tracing::info!("All in-flight jobs finished");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Job limiter closed while waiting for jobs");
            }
            Err(_) => {
                tracing::warn!("Timeout waiting for jobs to finish, proceeding with shutdown");
            }
        }
        self.job_limit.close();

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Broadcast an event; nobody listening is fine
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
