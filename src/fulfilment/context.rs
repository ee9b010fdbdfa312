//! Job-scoped state shared by the assembly stages.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::layout::BundleLayout;
use crate::services::Collaborators;
use crate::types::{BatchId, CatalogueResponse, Event, FulfilmentRequest};

use super::ancillary::AncillaryFileBuilder;

/// Everything one fulfilment job needs, cheap to clone into spawned tasks
#[derive(Clone)]
pub(crate) struct JobContext {
    pub(crate) request: Arc<FulfilmentRequest>,
    pub(crate) catalogue: Arc<CatalogueResponse>,
    pub(crate) config: Arc<Config>,
    pub(crate) services: Collaborators,
    pub(crate) layout: BundleLayout,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Job token; child of the service shutdown token
    pub(crate) cancel: CancellationToken,
}

impl JobContext {
    pub(crate) fn batch_id(&self) -> &BatchId {
        &self.request.batch_id
    }

    /// Builder over the job's full catalogue response
    pub(crate) fn builder(&self) -> AncillaryFileBuilder {
        AncillaryFileBuilder::new(&self.services, Arc::clone(&self.catalogue))
    }

    /// Broadcast an event; nobody listening is fine
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
