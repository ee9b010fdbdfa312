//! Collaborator contracts the fulfilment pipeline depends on.
//!
//! HTTP clients, retry policies, authentication and the byte-level formats of
//! generated files all live behind these traits.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{FileShareError, Result};
use crate::layout::BundleContext;
use crate::types::{
    AuxiliaryArtifact, BaseCellNumbering, BatchId, BusinessUnit, CatalogueResponse,
    FulfilmentManifest, FulfilmentRequest, JobOutcome, Product, VolumeDescriptor,
};

/// Result of searching and downloading one partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionFetch {
    /// One manifest per product found
    pub manifests: Vec<FulfilmentManifest>,
    /// Remote search queries issued for the partition
    pub query_count: u64,
}

/// Remote file-sharing service
///
/// `search_and_download` must be safe to call concurrently from several
/// partitions against the same business unit. Implementations should check
/// `cancel` between requests and return [`FileShareError::Cancelled`] once it
/// fires; they may also cancel it themselves when they hit a fatal,
/// non-retryable condition.
#[async_trait]
pub trait FileShareService: Send + Sync {
    /// Search and download the source files of `products` into `target`
    async fn search_and_download(
        &self,
        products: &[Product],
        business_unit: BusinessUnit,
        target: &BundleContext,
        cancel: &CancellationToken,
    ) -> std::result::Result<PartitionFetch, FileShareError>;

    /// Copy the readme from the local cache into `target_dir`; false on a cache miss
    async fn readme_from_cache(&self, target_dir: &Path) -> bool;

    /// Locate the current readme on the service
    async fn search_readme(&self, business_unit: BusinessUnit) -> Option<String>;

    /// Download the readme found at `location` into `target_dir`
    async fn download_readme(&self, location: &str, target_dir: &Path) -> bool;

    /// Download a fixed auxiliary artifact into `target_dir`
    async fn download_auxiliary(&self, artifact: AuxiliaryArtifact, target_dir: &Path) -> bool;

    /// Upload a single file to the batch
    async fn upload_file(
        &self,
        batch_id: &BatchId,
        path: &Path,
    ) -> std::result::Result<(), FileShareError>;

    /// Commit the batch so uploaded files become visible
    async fn commit_batch(&self, batch_id: &BatchId) -> std::result::Result<(), FileShareError>;
}

/// Writers of the generated index/catalog/serial files
///
/// Each call reports success as a boolean; the pipeline combines them with
/// logical AND.
#[async_trait]
pub trait AncillaryFileWriter: Send + Sync {
    /// Product index in the info directory
    async fn create_product_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
        encrypted: bool,
    ) -> bool;

    /// Serial file at the bundle root; `numbering` is set for large-media base cells
    async fn create_serial_enc_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
        numbering: Option<BaseCellNumbering>,
    ) -> bool;

    /// Overlay serial file at the bundle root
    async fn create_serial_aio_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
    ) -> bool;

    /// Catalog of the chart-cell folder, listing the given manifests
    async fn create_catalog_file(
        &self,
        bundle: &BundleContext,
        manifests: &[FulfilmentManifest],
        catalogue: &CatalogueResponse,
    ) -> bool;

    /// Media identification file of a large-media volume
    async fn create_media_file(
        &self,
        bundle: &BundleContext,
        volume: &VolumeDescriptor,
        total_volumes: usize,
    ) -> bool;

    /// Update list of a large-media volume
    async fn create_enc_update_csv(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
    ) -> bool;
}

/// Outcome of validating a product list
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Errors in product order
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// Whether every product passed
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error, for diagnostics
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// Validates products before a large-media build
pub trait ProductValidator: Send + Sync {
    /// Validate `products`
    fn validate(&self, products: &[Product]) -> ValidationResult;
}

/// Storage of catalogue responses
#[async_trait]
pub trait CatalogueStore: Send + Sync {
    /// Load the response stored for `request`
    async fn load(&self, request: &FulfilmentRequest) -> Result<CatalogueResponse>;
}

/// What a [`CallbackSink`] did with an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDelivery {
    /// The requester was notified
    Delivered,
    /// The request names no callback target
    Skipped,
}

/// Receives the job outcome for the requester
#[async_trait]
pub trait CallbackSink: Send + Sync {
    /// Notify the requester; `catalogue` is `None` when it could not be retrieved
    async fn send(
        &self,
        request: &FulfilmentRequest,
        catalogue: Option<&CatalogueResponse>,
        outcome: &JobOutcome,
    ) -> Result<CallbackDelivery>;
}

/// The collaborators a [`FulfilmentService`](crate::FulfilmentService) runs against
#[derive(Clone)]
pub struct Collaborators {
    /// Remote file-sharing service
    pub file_share: Arc<dyn FileShareService>,
    /// Ancillary file writers
    pub writer: Arc<dyn AncillaryFileWriter>,
    /// Large-media product validator
    pub validator: Arc<dyn ProductValidator>,
    /// Catalogue response storage
    pub catalogue: Arc<dyn CatalogueStore>,
    /// Requester notification
    pub callback: Arc<dyn CallbackSink>,
}
