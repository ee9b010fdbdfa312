//! Ancillary file orchestration over the writer and file-share collaborators.

use std::path::Path;
use std::sync::Arc;

use crate::layout::BundleContext;
use crate::services::{AncillaryFileWriter, Collaborators, FileShareService};
use crate::types::{
    AncillaryFile, AuxiliaryArtifact, BaseCellNumbering, BusinessUnit, CatalogueResponse,
    FulfilmentManifest, Product, VolumeDescriptor,
};

/// Builds the generated files of one bundle
///
/// Every method reports success as a boolean and logs failures with the
/// bundle's batch and correlation ids. Callers decide whether a `false` is
/// fatal or folded into a combined result.
#[derive(Clone)]
pub(crate) struct AncillaryFileBuilder {
    file_share: Arc<dyn FileShareService>,
    writer: Arc<dyn AncillaryFileWriter>,
    catalogue: Arc<CatalogueResponse>,
}

impl AncillaryFileBuilder {
    pub(crate) fn new(services: &Collaborators, catalogue: Arc<CatalogueResponse>) -> Self {
        Self {
            file_share: Arc::clone(&services.file_share),
            writer: Arc::clone(&services.writer),
            catalogue,
        }
    }

    /// Builder whose catalogue lists only `products`
    pub(crate) fn for_products(&self, products: &[Product]) -> Self {
        Self {
            file_share: Arc::clone(&self.file_share),
            writer: Arc::clone(&self.writer),
            catalogue: Arc::new(CatalogueResponse {
                products: products.to_vec(),
                catalogue_date: self.catalogue.catalogue_date,
            }),
        }
    }

    /// Place the shared readme in `target_dir`: local cache first, then search and download
    pub(crate) async fn readme(&self, target_dir: &Path, business_unit: BusinessUnit) -> bool {
        if self.file_share.readme_from_cache(target_dir).await {
            tracing::debug!(target = %target_dir.display(), "Readme copied from cache");
            return true;
        }

        let Some(location) = self.file_share.search_readme(business_unit).await else {
            tracing::warn!(
                business_unit = %business_unit,
                "Readme not found on file share"
            );
            return false;
        };

        let downloaded = self.file_share.download_readme(&location, target_dir).await;
        if !downloaded {
            tracing::warn!(
                location = %location,
                target = %target_dir.display(),
                "Readme download failed"
            );
        }
        downloaded
    }

    /// Download a fixed auxiliary artifact into `target_dir`
    pub(crate) async fn auxiliary(&self, artifact: AuxiliaryArtifact, target_dir: &Path) -> bool {
        let downloaded = self
            .file_share
            .download_auxiliary(artifact, target_dir)
            .await;
        if !downloaded {
            tracing::warn!(
                artifact = ?artifact,
                target = %target_dir.display(),
                "Auxiliary artifact download failed"
            );
        }
        downloaded
    }

    pub(crate) async fn product_file(&self, bundle: &BundleContext, encrypted: bool) -> bool {
        let ok = self
            .writer
            .create_product_file(bundle, &self.catalogue, encrypted)
            .await;
        report(bundle, AncillaryFile::ProductFile, ok)
    }

    pub(crate) async fn serial_enc(
        &self,
        bundle: &BundleContext,
        numbering: Option<BaseCellNumbering>,
    ) -> bool {
        let ok = self
            .writer
            .create_serial_enc_file(bundle, &self.catalogue, numbering)
            .await;
        report(bundle, AncillaryFile::SerialEnc, ok)
    }

    pub(crate) async fn serial_aio(&self, bundle: &BundleContext) -> bool {
        let ok = self
            .writer
            .create_serial_aio_file(bundle, &self.catalogue)
            .await;
        report(bundle, AncillaryFile::SerialAio, ok)
    }

    pub(crate) async fn catalog(
        &self,
        bundle: &BundleContext,
        manifests: &[FulfilmentManifest],
    ) -> bool {
        let ok = self
            .writer
            .create_catalog_file(bundle, manifests, &self.catalogue)
            .await;
        report(bundle, AncillaryFile::Catalog, ok)
    }

    pub(crate) async fn media(
        &self,
        bundle: &BundleContext,
        volume: &VolumeDescriptor,
        total_volumes: usize,
    ) -> bool {
        let ok = self
            .writer
            .create_media_file(bundle, volume, total_volumes)
            .await;
        report(bundle, AncillaryFile::Media, ok)
    }

    pub(crate) async fn enc_update_csv(&self, bundle: &BundleContext) -> bool {
        let ok = self
            .writer
            .create_enc_update_csv(bundle, &self.catalogue)
            .await;
        report(bundle, AncillaryFile::EncUpdateCsv, ok)
    }
}

fn report(bundle: &BundleContext, file: AncillaryFile, ok: bool) -> bool {
    if !ok {
        tracing::error!(
            batch_id = %bundle.batch_id,
            correlation_id = %bundle.correlation_id,
            root = %bundle.root.display(),
            file = %file,
            "Ancillary file creation failed"
        );
    }
    ok
}
