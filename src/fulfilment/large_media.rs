//! Multi-volume ("large media") exchange-set assembly.
//!
//! The fetch lays chart data out as numbered volume directories at the batch
//! root, each holding numbered base cells:
//!
//! ```text
//! {batch_id}/M01X02/B1/ENC_ROOT/GB/..
//! {batch_id}/M01X02/B2/ENC_ROOT/FR/..
//! {batch_id}/M02X02/B3/ENC_ROOT/US/..
//! ```
//!
//! Volumes and base cells are discovered once into [`VolumeDescriptor`]s.
//! Phase one builds every volume's files concurrently; phase two, after all
//! of phase one has finished, builds the per-base-cell catalogs.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use tokio::task::JoinSet;

use crate::config::LargeMediaConfig;
use crate::error::{Error, FulfilmentError, Result};
use crate::layout::BundleContext;
use crate::types::{
    AncillaryFile, AuxiliaryArtifact, BaseCell, BaseCellNumbering, BatchId, BusinessUnit, Event,
    FulfilmentManifest, Product, VolumeDescriptor,
};

use super::ancillary::AncillaryFileBuilder;
use super::context::JobContext;
use super::fetch::fetch_partitions;

/// Volumes found under a batch root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct VolumeSet {
    /// Volumes ordered by number, base cells ordered by number
    pub(crate) volumes: Vec<VolumeDescriptor>,
    /// Highest base-cell number of the last volume
    pub(crate) last_base_cell_number: u32,
}

/// Discover volume and base-cell directories under `batch_root`
///
/// Volumes match `{volume_prefix}NNXTT`, base cells `{base_cell_prefix}N`.
/// A base cell's country codes are the directory names under its
/// `enc_root_folder`. Other directories are ignored.
pub(crate) async fn discover_volumes(
    batch_root: &Path,
    large_media: &LargeMediaConfig,
    enc_root_folder: &str,
) -> Result<VolumeSet> {
    let volume_pattern = pattern(
        &format!(r"^{}(\d{{2}})X(\d{{2}})$", regex::escape(&large_media.volume_prefix)),
        "large_media.volume_prefix",
    )?;
    let base_pattern = pattern(
        &format!(r"^{}(\d+)$", regex::escape(&large_media.base_cell_prefix)),
        "large_media.base_cell_prefix",
    )?;

    let mut volumes = Vec::new();
    for (name, path) in subdirectories(batch_root).await? {
        let Some(number) = volume_pattern
            .captures(&name)
            .and_then(|caps| caps[1].parse::<u8>().ok())
        else {
            continue;
        };

        let mut base_cells = Vec::new();
        for (cell_name, cell_path) in subdirectories(&path).await? {
            let Some(cell_number) = base_pattern
                .captures(&cell_name)
                .and_then(|caps| caps[1].parse::<u32>().ok())
            else {
                continue;
            };
            let country_codes = subdirectories(&cell_path.join(enc_root_folder))
                .await?
                .into_iter()
                .map(|(code, _)| code)
                .collect();
            base_cells.push(BaseCell {
                number: cell_number,
                path: cell_path,
                country_codes,
            });
        }
        base_cells.sort_by_key(|c| c.number);

        volumes.push(VolumeDescriptor {
            number,
            path,
            base_cells,
        });
    }
    volumes.sort_by_key(|v| v.number);

    let last_base_cell_number = volumes
        .last()
        .map(VolumeDescriptor::highest_base_cell)
        .unwrap_or(0);

    Ok(VolumeSet {
        volumes,
        last_base_cell_number,
    })
}

fn pattern(source: &str, key: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| Error::Config {
        message: format!("invalid directory pattern {}: {}", source, e),
        key: Some(key.to_string()),
    })
}

/// Immediate subdirectories of `dir` as (name, path); a missing `dir` has none
async fn subdirectories(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            dirs.push((name.to_string(), entry.path()));
        }
    }
    Ok(dirs)
}

/// Copy the contents of `source` into `destination`, overwriting files
pub(crate) fn copy_dir_contents<'a>(
    source: &'a Path,
    destination: &'a Path,
) -> Pin<Box<dyn std::future::Future<Output = std::io::Result<u64>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(destination).await?;

        let mut copied = 0;
        let mut entries = tokio::fs::read_dir(source).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = destination.join(entry.file_name());
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                copied += copy_dir_contents(&entry.path(), &target).await?;
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), &target).await?;
                copied += 1;
            }
        }
        Ok(copied)
    })
}

/// Build the large-media exchange set
///
/// Overlay cells are excluded and the rest validated before any I/O; a
/// validation failure is fatal. Any per-volume failure in phase one is fatal.
/// Returns the logical AND of the per-volume catalog builds.
pub(crate) async fn assemble_large_media(ctx: &JobContext, products: Vec<Product>) -> Result<bool> {
    let batch_id = ctx.batch_id().clone();
    let candidates: Vec<Product> = products
        .into_iter()
        .filter(|p| !ctx.config.aio.contains(&p.product_name))
        .collect();

    let validation = ctx.services.validator.validate(&candidates);
    if let Some(first_error) = validation.first_error() {
        tracing::error!(
            batch_id = %batch_id,
            errors = validation.errors.len(),
            first_error = %first_error,
            "Large media product validation failed"
        );
        return Err(FulfilmentError::Validation {
            batch_id,
            first_error: first_error.to_string(),
        }
        .into());
    }

    let batch = ctx.layout.batch_context(&ctx.request);
    tokio::fs::create_dir_all(&batch.root).await?;
    let fetch = fetch_partitions(ctx, &candidates, BusinessUnit::Encrypted, &batch).await?;

    let staging = ctx.layout.staging(&ctx.request);
    stage_shared_artifacts(ctx, &staging).await?;

    let set = discover_volumes(
        &batch.root,
        &ctx.config.large_media,
        &ctx.layout.folders().enc_root_folder,
    )
    .await?;
    if set.volumes.is_empty() {
        return Err(FulfilmentError::LargeMedia {
            batch_id,
            reason: "no volume directories found after fetch".to_string(),
        }
        .into());
    }
    tracing::info!(
        batch_id = %batch_id,
        volumes = set.volumes.len(),
        last_base_cell = set.last_base_cell_number,
        "Discovered large media volumes"
    );

    let builder = ctx.builder();
    let candidates = Arc::new(candidates);
    build_volumes(ctx, &set, &batch, &staging, &builder, &candidates).await?;
    Ok(build_catalogs(ctx, &set, &batch, &builder, fetch.manifests).await)
}

/// Download the INFO and ADC artifacts once, for copying into every volume
async fn stage_shared_artifacts(ctx: &JobContext, staging: &BundleContext) -> Result<()> {
    staging.ensure_info_skeleton().await?;

    let builder = ctx.builder();
    let info_dir = staging.info_dir();
    let adc_dir = staging.adc_dir();
    let (info, adc) = tokio::join!(
        builder.auxiliary(AuxiliaryArtifact::LargeMediaInfo, &info_dir),
        builder.auxiliary(AuxiliaryArtifact::LargeMediaAdc, &adc_dir),
    );
    if !(info && adc) {
        return Err(FulfilmentError::LargeMedia {
            batch_id: ctx.batch_id().clone(),
            reason: format!("failed to download {}", AncillaryFile::SharedInfo),
        }
        .into());
    }
    Ok(())
}

struct VolumeTask {
    batch_id: BatchId,
    builder: AncillaryFileBuilder,
    bundle: BundleContext,
    volume: VolumeDescriptor,
    total_volumes: usize,
    last_base_cell_number: u32,
    products: Arc<Vec<Product>>,
    staged_info: PathBuf,
}

/// Phase one: one task per volume, all joined before the first error is returned
async fn build_volumes(
    ctx: &JobContext,
    set: &VolumeSet,
    batch: &BundleContext,
    staging: &BundleContext,
    builder: &AncillaryFileBuilder,
    products: &Arc<Vec<Product>>,
) -> Result<()> {
    let mut tasks = JoinSet::new();
    for volume in &set.volumes {
        tasks.spawn(build_volume(VolumeTask {
            batch_id: ctx.batch_id().clone(),
            builder: builder.clone(),
            bundle: batch.with_root(volume.path.clone()),
            volume: volume.clone(),
            total_volumes: set.volumes.len(),
            last_base_cell_number: set.last_base_cell_number,
            products: Arc::clone(products),
            staged_info: staging.info_dir(),
        }));
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(number)) => {
                ctx.emit(Event::VolumeBuilt {
                    batch_id: ctx.batch_id().clone(),
                    volume: number,
                });
            }
            Ok(Err(e)) => {
                tracing::error!(batch_id = %ctx.batch_id(), error = %e, "Volume build failed");
                first_error.get_or_insert(e);
            }
            Err(e) => {
                tracing::error!(batch_id = %ctx.batch_id(), error = %e, "Volume task panicked");
                first_error.get_or_insert(FulfilmentError::VolumeTask {
                    batch_id: ctx.batch_id().clone(),
                    volume: "unknown".to_string(),
                    reason: format!("task failed: {}", e),
                });
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

async fn build_volume(task: VolumeTask) -> std::result::Result<u8, FulfilmentError> {
    let VolumeTask {
        batch_id,
        builder,
        bundle,
        volume,
        total_volumes,
        last_base_cell_number,
        products,
        staged_info,
    } = task;
    let name = volume.name();
    let fail = |reason: String| FulfilmentError::VolumeTask {
        batch_id: batch_id.clone(),
        volume: name.clone(),
        reason,
    };
    let require = |file: AncillaryFile, ok: bool| {
        if ok {
            Ok(())
        } else {
            Err(fail(format!("failed to create {}", file)))
        }
    };

    bundle
        .ensure_info_skeleton()
        .await
        .map_err(|e| fail(format!("failed to create directories: {}", e)))?;

    require(
        AncillaryFile::Media,
        builder.media(&bundle, &volume, total_volumes).await,
    )?;

    for cell in &volume.base_cells {
        let cell_bundle = bundle.with_root(cell.path.clone());
        require(
            AncillaryFile::Readme,
            builder
                .readme(&cell_bundle.enc_root(), BusinessUnit::Encrypted)
                .await,
        )?;
        let numbering = BaseCellNumbering {
            base_number: cell.number,
            last_base_number: last_base_cell_number,
        };
        require(
            AncillaryFile::SerialEnc,
            builder.serial_enc(&cell_bundle, Some(numbering)).await,
        )?;
    }

    let volume_products: Vec<Product> = products
        .iter()
        .filter(|p| {
            volume
                .base_cells
                .iter()
                .any(|c| c.country_codes.contains(p.country_code()))
        })
        .cloned()
        .collect();
    let volume_builder = builder.for_products(&volume_products);
    require(
        AncillaryFile::ProductFile,
        volume_builder.product_file(&bundle, true).await,
    )?;
    require(
        AncillaryFile::EncUpdateCsv,
        volume_builder.enc_update_csv(&bundle).await,
    )?;

    let copied = copy_dir_contents(&staged_info, &bundle.info_dir())
        .await
        .map_err(|e| fail(format!("failed to copy {}: {}", AncillaryFile::SharedInfo, e)))?;

    tracing::debug!(
        batch_id = %batch_id,
        volume = %name,
        base_cells = volume.base_cells.len(),
        products = volume_products.len(),
        shared_files = copied,
        "Volume built"
    );
    Ok(volume.number)
}

/// Phase two: per-volume catalogs, one per base cell, from the manifests it covers
async fn build_catalogs(
    ctx: &JobContext,
    set: &VolumeSet,
    batch: &BundleContext,
    builder: &AncillaryFileBuilder,
    manifests: Vec<FulfilmentManifest>,
) -> bool {
    let manifests = Arc::new(manifests);
    let mut tasks = JoinSet::new();
    for volume in &set.volumes {
        let builder = builder.clone();
        let bundle = batch.with_root(volume.path.clone());
        let volume = volume.clone();
        let manifests = Arc::clone(&manifests);

        tasks.spawn(async move {
            let mut ok = true;
            for cell in &volume.base_cells {
                let covered: Vec<FulfilmentManifest> = manifests
                    .iter()
                    .filter(|m| cell.covers(m))
                    .cloned()
                    .collect();
                let cell_bundle = bundle.with_root(cell.path.clone());
                ok &= builder.catalog(&cell_bundle, &covered).await;
            }
            (volume.name(), ok)
        });
    }

    let mut success = true;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, ok)) => {
                if !ok {
                    tracing::warn!(batch_id = %ctx.batch_id(), volume = %name, "Volume catalog failed");
                }
                success &= ok;
            }
            Err(e) => {
                tracing::error!(batch_id = %ctx.batch_id(), error = %e, "Catalog task panicked");
                success = false;
            }
        }
    }
    success
}
