//! Fulfilment job: variant selection, assembly, callback and compensation.
//!
//! The job boundary is the only place errors are caught. Anything the
//! assembly stages propagate is classified and compensated here, and the
//! requester gets exactly one callback either way.

mod compensation;
mod queue;


use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{EventId, FulfilmentError, Result};
use crate::fulfilment::{
    JobContext, assemble_aio, assemble_large_media, assemble_standard, dedup_products,
    split_overlay_cells,
};
use crate::layout::BundleLayout;
use crate::service::FulfilmentService;
use crate::services::CallbackDelivery;
use crate::types::{
    BatchId, BundleVariant, CatalogueResponse, Event, FulfilmentRequest, JobOutcome,
};

impl FulfilmentService {
    /// Directory layout of one batch
    pub(crate) fn layout_for(&self, batch_id: &BatchId) -> BundleLayout {
        BundleLayout::new(self.config.home_dir(), batch_id, Arc::clone(&self.layout))
    }

    fn job_context(
        &self,
        request: Arc<FulfilmentRequest>,
        catalogue: Arc<CatalogueResponse>,
    ) -> JobContext {
        JobContext {
            layout: self.layout_for(&request.batch_id),
            request,
            catalogue,
            config: Arc::clone(&self.config),
            services: self.services.clone(),
            event_tx: self.event_tx.clone(),
            cancel: self.shutdown_token.child_token(),
        }
    }
}

/// Run one job to completion, compensating on failure
pub(crate) async fn run_job(service: &FulfilmentService, request: FulfilmentRequest) -> JobOutcome {
    tracing::info!(
        batch_id = %request.batch_id,
        correlation_id = %request.correlation_id,
        file_size = request.file_size,
        "Fulfilment job received"
    );
    service.emit(Event::JobReceived {
        batch_id: request.batch_id.clone(),
        file_size: request.file_size,
    });

    let request = Arc::new(request);
    let mut catalogue = None;
    match assemble(service, &request, &mut catalogue).await {
        Ok(bundle_root) => {
            tracing::info!(
                batch_id = %request.batch_id,
                correlation_id = %request.correlation_id,
                bundle_root = %bundle_root.display(),
                "Fulfilment job succeeded"
            );
            service.emit(Event::JobSucceeded {
                batch_id: request.batch_id.clone(),
            });
            let outcome = JobOutcome::Succeeded { bundle_root };
            notify(service, &request, catalogue.as_deref(), &outcome).await;
            outcome
        }
        Err(e) => compensation::compensate(service, &request, catalogue, e).await,
    }
}

/// Load the catalogue response, pick the variant and build the bundle
///
/// `loaded` receives the catalogue response as soon as it is available so
/// the compensation path can reuse it.
async fn assemble(
    service: &FulfilmentService,
    request: &Arc<FulfilmentRequest>,
    loaded: &mut Option<Arc<CatalogueResponse>>,
) -> Result<PathBuf> {
    let catalogue = Arc::new(service.services.catalogue.load(request).await?);
    *loaded = Some(Arc::clone(&catalogue));

    let ctx = service.job_context(Arc::clone(request), Arc::clone(&catalogue));
    let products = dedup_products(catalogue.products.clone());

    if request.file_size > ctx.config.large_media.size_threshold_bytes {
        tracing::info!(
            batch_id = %request.batch_id,
            file_size = request.file_size,
            threshold = ctx.config.large_media.size_threshold_bytes,
            "Building large media exchange set"
        );
        ctx.emit(Event::VariantSelected {
            batch_id: request.batch_id.clone(),
            variant: BundleVariant::LargeMedia,
            aio: false,
        });
        if !assemble_large_media(&ctx, products).await? {
            return Err(FulfilmentError::LargeMedia {
                batch_id: request.batch_id.clone(),
                reason: "catalog file creation failed for one or more volumes".to_string(),
            }
            .into());
        }
        return Ok(ctx.layout.batch_root().to_path_buf());
    }

    let (standard, overlay) = if ctx.config.aio.enabled {
        split_overlay_cells(products, &ctx.config.aio)
    } else {
        (products, Vec::new())
    };
    let with_aio = !overlay.is_empty();
    tracing::info!(
        batch_id = %request.batch_id,
        business_unit = %request.business_unit(),
        products = standard.len(),
        aio_products = overlay.len(),
        "Building standard exchange set"
    );
    ctx.emit(Event::VariantSelected {
        batch_id: request.batch_id.clone(),
        variant: BundleVariant::Standard,
        aio: with_aio,
    });

    assemble_standard(&ctx, &standard).await?;
    if with_aio && !assemble_aio(&ctx, &overlay).await? {
        return Err(FulfilmentError::Aio {
            batch_id: request.batch_id.clone(),
        }
        .into());
    }

    Ok(ctx.layout.batch_root().to_path_buf())
}

/// Send the callback; a delivery failure is logged, never retried
async fn notify(
    service: &FulfilmentService,
    request: &FulfilmentRequest,
    catalogue: Option<&CatalogueResponse>,
    outcome: &JobOutcome,
) {
    match service.services.callback.send(request, catalogue, outcome).await {
        Ok(CallbackDelivery::Skipped) => {
            tracing::info!(
                batch_id = %request.batch_id,
                correlation_id = %request.correlation_id,
                success = outcome.is_success(),
                "No callback target, callback skipped"
            );
            service.emit(Event::CallbackSkipped {
                batch_id: request.batch_id.clone(),
            });
        }
        Ok(CallbackDelivery::Delivered) => {
            tracing::info!(
                batch_id = %request.batch_id,
                correlation_id = %request.correlation_id,
                success = outcome.is_success(),
                with_catalogue = catalogue.is_some(),
                "Callback sent"
            );
            service.emit(Event::CallbackSent {
                batch_id: request.batch_id.clone(),
                success: outcome.is_success(),
            });
        }
        Err(e) => {
            tracing::error!(
                batch_id = %request.batch_id,
                correlation_id = %request.correlation_id,
                event_id = EventId::CallbackFailed.code(),
                error = %e,
                "Callback delivery failed"
            );
            service.emit(Event::CallbackFailed {
                batch_id: request.batch_id.clone(),
                error: e.to_string(),
            });
        }
    }
}
