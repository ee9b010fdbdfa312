//! Bundle directory layout.
//!
//! A bundle lives under `{home}/{batch_id}`:
//!
//! ```text
//! {batch_id}/
//!   V01X01/            standard exchange set
//!     ENC_ROOT/        chart-cell data
//!     INFO/            generated index/info files
//!       ADC/           auxiliary certificate-like files
//!   AIO/               overlay exchange set, same shape
//!   M01X02/ M02X02/    large-media volumes
//!     INFO/ADC/
//!     B1/ENC_ROOT/..   base cells
//!   error.txt          written only on failure
//! ```
//!
//! All directory creation is "create if absent", so a redelivered message
//! converges on the same tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::LayoutConfig;
use crate::types::{BatchId, FulfilmentRequest};

/// Target of one build step: a batch, a correlation id and a root directory
///
/// One context exists per exchange set, per overlay set, per large-media
/// volume and per base cell. They share the batch id and differ by root.
#[derive(Clone, Debug)]
pub struct BundleContext {
    /// Batch being assembled
    pub batch_id: BatchId,
    /// Correlation id for logs
    pub correlation_id: String,
    /// Root directory of this bundle (or volume, or base cell)
    pub root: PathBuf,
    folders: Arc<LayoutConfig>,
}

impl BundleContext {
    /// Create a context rooted at `root`
    pub fn new(
        batch_id: BatchId,
        correlation_id: impl Into<String>,
        root: PathBuf,
        folders: Arc<LayoutConfig>,
    ) -> Self {
        Self {
            batch_id,
            correlation_id: correlation_id.into(),
            root,
            folders,
        }
    }

    /// Same batch, different root
    pub fn with_root(&self, root: PathBuf) -> Self {
        Self {
            batch_id: self.batch_id.clone(),
            correlation_id: self.correlation_id.clone(),
            root,
            folders: Arc::clone(&self.folders),
        }
    }

    /// Chart-cell data directory
    pub fn enc_root(&self) -> PathBuf {
        self.root.join(&self.folders.enc_root_folder)
    }

    /// Generated index/info directory
    pub fn info_dir(&self) -> PathBuf {
        self.root.join(&self.folders.info_folder)
    }

    /// Auxiliary directory nested in the info directory
    pub fn adc_dir(&self) -> PathBuf {
        self.info_dir().join(&self.folders.adc_folder)
    }

    /// Create root, chart-cell, info and auxiliary directories if absent
    pub async fn ensure_skeleton(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.enc_root()).await?;
        tokio::fs::create_dir_all(self.adc_dir()).await?;
        Ok(())
    }

    /// Create root, info and auxiliary directories if absent (no chart-cell folder)
    pub async fn ensure_info_skeleton(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.adc_dir()).await
    }
}

/// Resolves the directories of one batch
#[derive(Clone, Debug)]
pub struct BundleLayout {
    batch_root: PathBuf,
    folders: Arc<LayoutConfig>,
}

impl BundleLayout {
    /// Layout of `batch_id` under `home_dir`
    pub fn new(home_dir: &Path, batch_id: &BatchId, folders: Arc<LayoutConfig>) -> Self {
        Self {
            batch_root: home_dir.join(batch_id.as_str()),
            folders,
        }
    }

    /// `{home}/{batch_id}`
    pub fn batch_root(&self) -> &Path {
        &self.batch_root
    }

    /// Context rooted at the batch root (large-media fetch target)
    pub fn batch_context(&self, request: &FulfilmentRequest) -> BundleContext {
        self.context(request, self.batch_root.clone())
    }

    /// Context of the standard exchange set
    pub fn exchange_set(&self, request: &FulfilmentRequest) -> BundleContext {
        self.context(
            request,
            self.batch_root.join(&self.folders.exchange_set_folder),
        )
    }

    /// Context of the overlay exchange set
    pub fn aio(&self, request: &FulfilmentRequest) -> BundleContext {
        self.context(request, self.batch_root.join(&self.folders.aio_folder))
    }

    /// Context of the shared large-media staging area
    pub fn staging(&self, request: &FulfilmentRequest) -> BundleContext {
        self.context(request, self.batch_root.join(&self.folders.staging_folder))
    }

    /// Path of the error artifact at the batch root
    pub fn error_artifact_path(&self) -> PathBuf {
        self.batch_root.join(&self.folders.error_file_name)
    }

    /// Folder names in use
    pub fn folders(&self) -> &LayoutConfig {
        &self.folders
    }

    fn context(&self, request: &FulfilmentRequest, root: PathBuf) -> BundleContext {
        BundleContext::new(
            request.batch_id.clone(),
            request.correlation_id.clone(),
            root,
            Arc::clone(&self.folders),
        )
    }
}
