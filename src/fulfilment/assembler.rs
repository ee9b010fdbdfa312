//! Standard and overlay exchange-set assembly.

use std::future::Future;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::error::{FulfilmentError, Result};
use crate::types::{AncillaryFile, AuxiliaryArtifact, BusinessUnit, Event, Product};

use super::context::JobContext;
use super::fetch::fetch_partitions;

/// Result of one overlay sub-step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Succeeded,
    Failed,
    /// Skipped because another step had already failed
    Cancelled,
}

/// Build the standard exchange set and return its root
///
/// The business unit comes from the requested standard. A missing readme is
/// logged and tolerated; the product, serial and catalog files are required.
pub(crate) async fn assemble_standard(ctx: &JobContext, products: &[Product]) -> Result<PathBuf> {
    let business_unit = ctx.request.business_unit();
    let bundle = ctx.layout.exchange_set(&ctx.request);
    bundle.ensure_skeleton().await?;

    let fetch = fetch_partitions(ctx, products, business_unit, &bundle).await?;
    let builder = ctx.builder().for_products(products);

    if !builder.readme(&bundle.enc_root(), business_unit).await {
        tracing::warn!(
            batch_id = %ctx.batch_id(),
            correlation_id = %ctx.request.correlation_id,
            "Readme unavailable, continuing without it"
        );
    }

    let required = [
        (
            AncillaryFile::ProductFile,
            builder
                .product_file(&bundle, business_unit.is_encrypted())
                .await,
        ),
        (
            AncillaryFile::SerialEnc,
            builder.serial_enc(&bundle, None).await,
        ),
        (
            AncillaryFile::Catalog,
            builder.catalog(&bundle, &fetch.manifests).await,
        ),
    ];
    if let Some((file, _)) = required.iter().find(|(_, ok)| !ok) {
        return Err(FulfilmentError::AncillaryFile {
            batch_id: ctx.batch_id().clone(),
            file: *file,
        }
        .into());
    }

    tracing::info!(
        batch_id = %ctx.batch_id(),
        root = %bundle.root.display(),
        products = products.len(),
        "Standard exchange set assembled"
    );
    Ok(bundle.root)
}

/// Build the overlay exchange set
///
/// The readme, certificate, publication and overlay serial file are launched
/// together; the first failure cancels a local token so the product and
/// catalog files are skipped, while steps already launched finish. The result
/// is the logical AND of every step. A cancelled fetch is returned as an error.
pub(crate) async fn assemble_aio(ctx: &JobContext, products: &[Product]) -> Result<bool> {
    let bundle = ctx.layout.aio(&ctx.request);
    bundle.ensure_skeleton().await?;

    let fetch = fetch_partitions(ctx, products, BusinessUnit::Encrypted, &bundle).await?;
    let builder = ctx.builder().for_products(products);
    let local = ctx.cancel.child_token();
    let enc_root = bundle.enc_root();
    let info_dir = bundle.info_dir();
    let adc_dir = bundle.adc_dir();

    let (readme, certificate, publication, serial) = tokio::join!(
        started(
            AncillaryFile::Readme,
            &local,
            builder.readme(&enc_root, BusinessUnit::Encrypted)
        ),
        started(
            AncillaryFile::Certificate,
            &local,
            builder.auxiliary(AuxiliaryArtifact::Certificate, &adc_dir)
        ),
        started(
            AncillaryFile::Publication,
            &local,
            builder.auxiliary(AuxiliaryArtifact::Publication, &info_dir)
        ),
        started(
            AncillaryFile::SerialAio,
            &local,
            builder.serial_aio(&bundle)
        ),
    );
    let (product_file, catalog) = tokio::join!(
        guarded(
            AncillaryFile::ProductFile,
            &local,
            builder.product_file(&bundle, true)
        ),
        guarded(
            AncillaryFile::Catalog,
            &local,
            builder.catalog(&bundle, &fetch.manifests)
        ),
    );

    let outcomes = [readme, certificate, publication, serial, product_file, catalog];
    let success = outcomes.iter().all(|o| *o == StepOutcome::Succeeded);

    tracing::info!(
        batch_id = %ctx.batch_id(),
        success,
        outcomes = ?outcomes,
        "AIO exchange set finished"
    );
    ctx.emit(Event::AioCompleted {
        batch_id: ctx.batch_id().clone(),
        success,
    });
    Ok(success)
}

/// Run `step` unless `cancel` already fired; a failing step fires it
pub(crate) async fn guarded<F>(file: AncillaryFile, cancel: &CancellationToken, step: F) -> StepOutcome
where
    F: Future<Output = bool>,
{
    if cancel.is_cancelled() {
        tracing::debug!(file = %file, "Skipping step after earlier failure");
        return StepOutcome::Cancelled;
    }
    started(file, cancel, step).await
}

/// Run an already-launched `step` to completion; a failing step fires `cancel`
pub(crate) async fn started<F>(file: AncillaryFile, cancel: &CancellationToken, step: F) -> StepOutcome
where
    F: Future<Output = bool>,
{
    if step.await {
        StepOutcome::Succeeded
    } else {
        tracing::warn!(file = %file, "AIO step failed, cancelling remaining steps");
        cancel.cancel();
        StepOutcome::Failed
    }
}
