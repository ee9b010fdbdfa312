//! Failure compensation: error artifact, upload, commit and callback.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, EventId};
use crate::service::FulfilmentService;
use crate::types::{CatalogueResponse, Event, FulfilmentRequest, JobOutcome};

/// Classify `error`, publish the error artifact and notify the requester
pub(super) async fn compensate(
    service: &FulfilmentService,
    request: &FulfilmentRequest,
    catalogue: Option<Arc<CatalogueResponse>>,
    error: Error,
) -> JobOutcome {
    let event_id = error.event_id();
    let fatal = matches!(&error, Error::Fulfilment(e) if e.is_fatal());
    let message = error.to_string();

    tracing::error!(
        batch_id = %request.batch_id,
        correlation_id = %request.correlation_id,
        event_id = event_id.code(),
        event = event_id.name(),
        fatal,
        error = %message,
        "Fulfilment job failed"
    );
    service.emit(Event::JobFailed {
        batch_id: request.batch_id.clone(),
        event_id: event_id.code(),
        error: message.clone(),
    });

    let artifact = service.layout_for(&request.batch_id).error_artifact_path();
    let (uploaded, committed) = publish_error_artifact(
        service,
        request,
        &artifact,
        render_error_artifact(request, event_id, &message),
    )
    .await;
    service.emit(Event::ErrorArtifactPublished {
        batch_id: request.batch_id.clone(),
        uploaded,
        committed,
    });

    let catalogue = match catalogue {
        Some(catalogue) => Some(catalogue),
        None => reload_catalogue(service, request).await,
    };

    let outcome = JobOutcome::Failed { event_id, message };
    super::notify(service, request, catalogue.as_deref(), &outcome).await;
    outcome
}

/// Error artifact content; deterministic for a given request and failure
pub(crate) fn render_error_artifact(
    request: &FulfilmentRequest,
    event_id: EventId,
    message: &str,
) -> String {
    format!(
        "There has been a problem in creating your exchange set.\n\
         batch_id: {}\n\
         correlation_id: {}\n\
         requested_at: {}\n\
         event_id: {}\n\
         event: {}\n\
         error: {}\n",
        request.batch_id,
        request.correlation_id,
        request.catalogue_requested_at.to_rfc3339(),
        event_id.code(),
        event_id.name(),
        message
    )
}

/// Write, upload and commit the artifact; returns (uploaded, committed)
///
/// Each failure is logged once with its own event id and not retried. The
/// batch is only committed after a successful upload.
async fn publish_error_artifact(
    service: &FulfilmentService,
    request: &FulfilmentRequest,
    path: &Path,
    content: String,
) -> (bool, bool) {
    let batch_id = &request.batch_id;

    if let Some(parent) = path.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        tracing::error!(
            batch_id = %batch_id,
            path = %parent.display(),
            error = %e,
            "Failed to create batch directory for error artifact"
        );
        return (false, false);
    }
    if let Err(e) = tokio::fs::write(path, content).await {
        tracing::error!(
            batch_id = %batch_id,
            path = %path.display(),
            error = %e,
            "Failed to write error artifact"
        );
        return (false, false);
    }

    if let Err(e) = service.services.file_share.upload_file(batch_id, path).await {
        tracing::error!(
            batch_id = %batch_id,
            correlation_id = %request.correlation_id,
            event_id = EventId::ErrorArtifactUploadFailed.code(),
            error = %e,
            "Error artifact upload failed"
        );
        return (false, false);
    }

    match service.services.file_share.commit_batch(batch_id).await {
        Ok(()) => {
            tracing::info!(
                batch_id = %batch_id,
                path = %path.display(),
                "Error artifact uploaded and committed"
            );
            (true, true)
        }
        Err(e) => {
            tracing::error!(
                batch_id = %batch_id,
                correlation_id = %request.correlation_id,
                event_id = EventId::ErrorArtifactCommitFailed.code(),
                error = %e,
                "Error artifact batch commit failed"
            );
            (true, false)
        }
    }
}

/// One best-effort retry of the catalogue load for the callback
async fn reload_catalogue(
    service: &FulfilmentService,
    request: &FulfilmentRequest,
) -> Option<Arc<CatalogueResponse>> {
    match service.services.catalogue.load(request).await {
        Ok(catalogue) => Some(Arc::new(catalogue)),
        Err(e) => {
            tracing::warn!(
                batch_id = %request.batch_id,
                error = %e,
                "Catalogue response unavailable, sending callback without it"
            );
            None
        }
    }
}
