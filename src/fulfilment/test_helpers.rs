//! Shared test helpers: in-memory collaborators and a job harness.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, FileShareError, FulfilmentError, Result};
use crate::layout::{BundleContext, BundleLayout};
use crate::service::FulfilmentService;
use crate::services::{
    AncillaryFileWriter, BasicProductValidator, CallbackDelivery, CallbackSink, CatalogueStore,
    Collaborators, FileShareService, FsAncillaryWriter, PartitionFetch,
};
use crate::types::{
    AncillaryFile, AuxiliaryArtifact, BaseCellNumbering, BatchId, BusinessUnit,
    CatalogueResponse, FileDescriptor, FulfilmentManifest, FulfilmentRequest, JobOutcome, Product,
    VolumeDescriptor,
};

use super::context::JobContext;

pub(crate) fn product(name: &str) -> Product {
    Product {
        product_name: name.to_string(),
        edition_number: 1,
        update_numbers: vec![0],
        file_size: 100,
        cancellation: None,
    }
}

pub(crate) fn products(names: &[&str]) -> Vec<Product> {
    names.iter().map(|n| product(n)).collect()
}

pub(crate) fn catalogue(names: &[&str]) -> CatalogueResponse {
    CatalogueResponse {
        products: products(names),
        catalogue_date: None,
    }
}

pub(crate) fn request(batch_id: &str, file_size: u64) -> FulfilmentRequest {
    FulfilmentRequest {
        batch_id: BatchId::new(batch_id),
        correlation_id: format!("corr-{}", batch_id),
        file_size,
        catalogue_requested_at: chrono::Utc::now(),
        exchange_set_standard: Default::default(),
        response_location: Some(format!("{}.json", batch_id)),
        callback_uri: None,
    }
}

/// In-memory file share that writes one file per product
///
/// Large-media placement maps a country code to the volume and base-cell
/// directories the product's files land in, relative to the fetch target.
#[derive(Default)]
pub(crate) struct MockFileShare {
    pub(crate) search_calls: AtomicUsize,
    pub(crate) searched: Mutex<Vec<Vec<String>>>,
    failing_products: Mutex<HashSet<String>>,
    cancelling_products: Mutex<HashSet<String>>,
    slow_products: Mutex<HashSet<String>>,
    placement: Mutex<HashMap<String, (String, String)>>,
    pub(crate) readme_cached: Mutex<bool>,
    pub(crate) readme_missing: Mutex<bool>,
    pub(crate) readme_targets: Mutex<Vec<PathBuf>>,
    failing_auxiliary: Mutex<HashSet<AuxiliaryArtifact>>,
    pub(crate) uploads: Mutex<Vec<PathBuf>>,
    pub(crate) commits: AtomicUsize,
    pub(crate) upload_fails: Mutex<bool>,
    pub(crate) commit_fails: Mutex<bool>,
}

impl MockFileShare {
    pub(crate) fn fail_product(&self, name: &str) {
        self.failing_products.lock().unwrap().insert(name.to_string());
    }

    /// Report `Cancelled` for the partition holding `name` without touching the token
    pub(crate) fn cancel_product(&self, name: &str) {
        self.cancelling_products
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub(crate) fn slow_product(&self, name: &str) {
        self.slow_products.lock().unwrap().insert(name.to_string());
    }

    pub(crate) fn place(&self, country_code: &str, volume: &str, base_cell: &str) {
        self.placement.lock().unwrap().insert(
            country_code.to_string(),
            (volume.to_string(), base_cell.to_string()),
        );
    }

    pub(crate) fn fail_auxiliary(&self, artifact: AuxiliaryArtifact) {
        self.failing_auxiliary.lock().unwrap().insert(artifact);
    }

    pub(crate) fn searched_products(&self) -> Vec<String> {
        self.searched.lock().unwrap().concat()
    }

    fn product_dir(&self, target: &BundleContext, product: &Product) -> PathBuf {
        let code = product.country_code().to_string();
        let placed = self.placement.lock().unwrap().get(&code).cloned();
        let enc_root = match placed {
            Some((volume, base_cell)) => target
                .with_root(target.root.join(volume).join(base_cell))
                .enc_root(),
            None => target.enc_root(),
        };
        enc_root.join(code).join(&product.product_name)
    }
}

fn write_file(dir: &Path, name: &str, content: &[u8]) -> bool {
    std::fs::create_dir_all(dir).is_ok() && std::fs::write(dir.join(name), content).is_ok()
}

#[async_trait]
impl FileShareService for MockFileShare {
    async fn search_and_download(
        &self,
        products: &[Product],
        _business_unit: BusinessUnit,
        target: &BundleContext,
        cancel: &CancellationToken,
    ) -> std::result::Result<PartitionFetch, FileShareError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.searched
            .lock()
            .unwrap()
            .push(products.iter().map(|p| p.product_name.clone()).collect());

        let slow = {
            let slow = self.slow_products.lock().unwrap();
            products.iter().any(|p| slow.contains(&p.product_name))
        };
        if slow {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        let mut manifests = Vec::with_capacity(products.len());
        for product in products {
            if cancel.is_cancelled() {
                return Err(FileShareError::Cancelled);
            }
            if self
                .cancelling_products
                .lock()
                .unwrap()
                .contains(&product.product_name)
            {
                return Err(FileShareError::Cancelled);
            }
            if self
                .failing_products
                .lock()
                .unwrap()
                .contains(&product.product_name)
            {
                return Err(FileShareError::Rejected {
                    status: 500,
                    message: format!("search for {} failed", product.product_name),
                });
            }

            let dir = self.product_dir(target, product);
            let name = format!("{}.000", product.product_name);
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(&name), product.product_name.as_bytes())?;
            manifests.push(FulfilmentManifest {
                product_name: product.product_name.clone(),
                edition_number: product.edition_number,
                files: vec![FileDescriptor {
                    name,
                    size: product.file_size,
                }],
                query_count: 1,
            });
        }

        Ok(PartitionFetch {
            query_count: manifests.len() as u64,
            manifests,
        })
    }

    async fn readme_from_cache(&self, target_dir: &Path) -> bool {
        if !*self.readme_cached.lock().unwrap() {
            return false;
        }
        self.readme_targets.lock().unwrap().push(target_dir.to_path_buf());
        write_file(target_dir, "README.TXT", b"cached readme")
    }

    async fn search_readme(&self, business_unit: BusinessUnit) -> Option<String> {
        if *self.readme_missing.lock().unwrap() {
            return None;
        }
        Some(format!("{}/README.TXT", business_unit))
    }

    async fn download_readme(&self, location: &str, target_dir: &Path) -> bool {
        self.readme_targets.lock().unwrap().push(target_dir.to_path_buf());
        write_file(target_dir, "README.TXT", location.as_bytes())
    }

    async fn download_auxiliary(&self, artifact: AuxiliaryArtifact, target_dir: &Path) -> bool {
        if self.failing_auxiliary.lock().unwrap().contains(&artifact) {
            return false;
        }
        let name = match artifact {
            AuxiliaryArtifact::Certificate => "IHO.CRT",
            AuxiliaryArtifact::Publication => "PUBLICATION.PDF",
            AuxiliaryArtifact::LargeMediaInfo => "INFO.TXT",
            AuxiliaryArtifact::LargeMediaAdc => "ADC.TXT",
        };
        write_file(target_dir, name, b"auxiliary")
    }

    async fn upload_file(
        &self,
        _batch_id: &BatchId,
        path: &Path,
    ) -> std::result::Result<(), FileShareError> {
        self.uploads.lock().unwrap().push(path.to_path_buf());
        if *self.upload_fails.lock().unwrap() {
            return Err(FileShareError::Rejected {
                status: 503,
                message: "upload unavailable".into(),
            });
        }
        Ok(())
    }

    async fn commit_batch(&self, _batch_id: &BatchId) -> std::result::Result<(), FileShareError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if *self.commit_fails.lock().unwrap() {
            return Err(FileShareError::Rejected {
                status: 409,
                message: "batch already committed".into(),
            });
        }
        Ok(())
    }
}

/// Filesystem writer that records calls and can be told to fail a file kind
#[derive(Default)]
pub(crate) struct RecordingWriter {
    inner: FsAncillaryWriter,
    failing: Mutex<HashSet<AncillaryFile>>,
    pub(crate) serials: Mutex<Vec<(PathBuf, Option<BaseCellNumbering>)>>,
    pub(crate) catalogs: Mutex<Vec<(PathBuf, Vec<String>)>>,
    pub(crate) product_files: Mutex<Vec<(PathBuf, bool, Vec<String>)>>,
}

impl RecordingWriter {
    pub(crate) fn fail(&self, file: AncillaryFile) {
        self.failing.lock().unwrap().insert(file);
    }

    fn fails(&self, file: AncillaryFile) -> bool {
        self.failing.lock().unwrap().contains(&file)
    }

    /// Catalog calls keyed by bundle root
    pub(crate) fn catalog_products(&self, root: &Path) -> Option<Vec<String>> {
        self.catalogs
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r == root)
            .map(|(_, names)| names.clone())
    }
}

#[async_trait]
impl AncillaryFileWriter for RecordingWriter {
    async fn create_product_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
        encrypted: bool,
    ) -> bool {
        self.product_files.lock().unwrap().push((
            bundle.root.clone(),
            encrypted,
            catalogue
                .products
                .iter()
                .map(|p| p.product_name.clone())
                .collect(),
        ));
        !self.fails(AncillaryFile::ProductFile)
            && self
                .inner
                .create_product_file(bundle, catalogue, encrypted)
                .await
    }

    async fn create_serial_enc_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
        numbering: Option<BaseCellNumbering>,
    ) -> bool {
        self.serials
            .lock()
            .unwrap()
            .push((bundle.root.clone(), numbering));
        !self.fails(AncillaryFile::SerialEnc)
            && self
                .inner
                .create_serial_enc_file(bundle, catalogue, numbering)
                .await
    }

    async fn create_serial_aio_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
    ) -> bool {
        !self.fails(AncillaryFile::SerialAio)
            && self.inner.create_serial_aio_file(bundle, catalogue).await
    }

    async fn create_catalog_file(
        &self,
        bundle: &BundleContext,
        manifests: &[FulfilmentManifest],
        catalogue: &CatalogueResponse,
    ) -> bool {
        self.catalogs.lock().unwrap().push((
            bundle.root.clone(),
            manifests.iter().map(|m| m.product_name.clone()).collect(),
        ));
        !self.fails(AncillaryFile::Catalog)
            && self
                .inner
                .create_catalog_file(bundle, manifests, catalogue)
                .await
    }

    async fn create_media_file(
        &self,
        bundle: &BundleContext,
        volume: &VolumeDescriptor,
        total_volumes: usize,
    ) -> bool {
        !self.fails(AncillaryFile::Media)
            && self
                .inner
                .create_media_file(bundle, volume, total_volumes)
                .await
    }

    async fn create_enc_update_csv(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
    ) -> bool {
        !self.fails(AncillaryFile::EncUpdateCsv)
            && self.inner.create_enc_update_csv(bundle, catalogue).await
    }
}

/// Catalogue store serving one response, optionally failing
#[derive(Default)]
pub(crate) struct MockCatalogueStore {
    pub(crate) response: Mutex<Option<CatalogueResponse>>,
    pub(crate) loads: AtomicUsize,
}

impl MockCatalogueStore {
    pub(crate) fn serve(&self, response: CatalogueResponse) {
        *self.response.lock().unwrap() = Some(response);
    }
}

#[async_trait]
impl CatalogueStore for MockCatalogueStore {
    async fn load(&self, request: &FulfilmentRequest) -> Result<CatalogueResponse> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.response.lock().unwrap().clone().ok_or_else(|| {
            FulfilmentError::CatalogueResponseNotFound {
                batch_id: request.batch_id.clone(),
                reason: "no response stored".into(),
            }
            .into()
        })
    }
}

/// Callback sink recording every outcome it receives
#[derive(Default)]
pub(crate) struct RecordingCallback {
    pub(crate) sent: Mutex<Vec<(BatchId, JobOutcome, Option<CatalogueResponse>)>>,
    pub(crate) fails: Mutex<bool>,
}

#[async_trait]
impl CallbackSink for RecordingCallback {
    async fn send(
        &self,
        request: &FulfilmentRequest,
        catalogue: Option<&CatalogueResponse>,
        outcome: &JobOutcome,
    ) -> Result<CallbackDelivery> {
        self.sent.lock().unwrap().push((
            request.batch_id.clone(),
            outcome.clone(),
            catalogue.cloned(),
        ));
        if *self.fails.lock().unwrap() {
            return Err(Error::Callback("connection refused".into()));
        }
        Ok(CallbackDelivery::Delivered)
    }
}

/// Temp home directory plus mock collaborators
pub(crate) struct Harness {
    pub(crate) config: Config,
    pub(crate) file_share: Arc<MockFileShare>,
    pub(crate) writer: Arc<RecordingWriter>,
    pub(crate) store: Arc<MockCatalogueStore>,
    pub(crate) callback: Arc<RecordingCallback>,
    pub(crate) temp: TempDir,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.fulfilment.home_dir = temp.path().join("home");
        config.fulfilment.search_parallelism = 3;
        config.fulfilment.max_concurrent_searches = 2;

        Self {
            config,
            file_share: Arc::new(MockFileShare::default()),
            writer: Arc::new(RecordingWriter::default()),
            store: Arc::new(MockCatalogueStore::default()),
            callback: Arc::new(RecordingCallback::default()),
            temp,
        }
    }

    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            file_share: self.file_share.clone(),
            writer: self.writer.clone(),
            validator: Arc::new(BasicProductValidator),
            catalogue: self.store.clone(),
            callback: self.callback.clone(),
        }
    }

    pub(crate) fn context(&self, request: FulfilmentRequest, catalogue: CatalogueResponse) -> JobContext {
        let config = Arc::new(self.config.clone());
        let layout = BundleLayout::new(
            config.home_dir(),
            &request.batch_id,
            Arc::new(config.layout.clone()),
        );
        let (event_tx, _rx) = tokio::sync::broadcast::channel(100);
        JobContext {
            request: Arc::new(request),
            catalogue: Arc::new(catalogue),
            config,
            services: self.collaborators(),
            layout,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn service(&self) -> FulfilmentService {
        FulfilmentService::new(self.config.clone(), self.collaborators()).unwrap()
    }

    pub(crate) fn batch_root(&self, batch_id: &str) -> PathBuf {
        self.config.fulfilment.home_dir.join(batch_id)
    }

    pub(crate) fn callbacks(&self) -> Vec<(BatchId, JobOutcome, Option<CatalogueResponse>)> {
        self.callback.sent.lock().unwrap().clone()
    }
}
