//! Directory-backed file share for end-to-end tests
//!
//! Source files live under `{remote}/{business_unit}/{product_name}/`; the
//! readme under `{remote}/{business_unit}/README.TXT` and auxiliary artifacts
//! under `{remote}/aux/{artifact}/`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use exchange_set_fulfilment::types::{AuxiliaryArtifact, FileDescriptor};
use exchange_set_fulfilment::{
    BatchId, BundleContext, BusinessUnit, FileShareError, FileShareService, FulfilmentManifest,
    PartitionFetch, Product,
};
use tokio_util::sync::CancellationToken;

/// File share reading from a local "remote" directory
pub struct LocalFileShare {
    remote: PathBuf,
    /// Files handed to `upload_file`
    pub uploads: Mutex<Vec<PathBuf>>,
    /// Batches committed
    pub commits: Mutex<Vec<BatchId>>,
}

impl LocalFileShare {
    pub fn new(remote: impl Into<PathBuf>) -> Self {
        Self {
            remote: remote.into(),
            uploads: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// Publish a product's base cell and updates
    pub fn publish(&self, business_unit: BusinessUnit, product: &str, updates: &[u32]) {
        let dir = self.remote.join(business_unit.as_str()).join(product);
        std::fs::create_dir_all(&dir).unwrap();
        for update in updates {
            std::fs::write(
                dir.join(format!("{}.{:03}", product, update)),
                format!("{} update {}", product, update),
            )
            .unwrap();
        }
    }

    /// Publish the readme of a business unit
    pub fn publish_readme(&self, business_unit: BusinessUnit, content: &str) {
        let dir = self.remote.join(business_unit.as_str());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("README.TXT"), content).unwrap();
    }

    fn aux_dir(artifact: AuxiliaryArtifact) -> &'static str {
        match artifact {
            AuxiliaryArtifact::Certificate => "certificate",
            AuxiliaryArtifact::Publication => "publication",
            AuxiliaryArtifact::LargeMediaInfo => "info",
            AuxiliaryArtifact::LargeMediaAdc => "adc",
        }
    }
}

fn copy_files(source: &Path, target: &Path) -> std::io::Result<Vec<FileDescriptor>> {
    std::fs::create_dir_all(target)?;
    let mut files = Vec::new();
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let size = std::fs::copy(entry.path(), target.join(&name))?;
        files.push(FileDescriptor { name, size });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

#[async_trait]
impl FileShareService for LocalFileShare {
    async fn search_and_download(
        &self,
        products: &[Product],
        business_unit: BusinessUnit,
        target: &BundleContext,
        cancel: &CancellationToken,
    ) -> Result<PartitionFetch, FileShareError> {
        let mut manifests = Vec::new();
        for product in products {
            if cancel.is_cancelled() {
                return Err(FileShareError::Cancelled);
            }
            let source = self
                .remote
                .join(business_unit.as_str())
                .join(&product.product_name);
            if !source.is_dir() {
                cancel.cancel();
                return Err(FileShareError::Rejected {
                    status: 404,
                    message: format!("{} not found in {}", product.product_name, business_unit),
                });
            }
            let destination = target
                .enc_root()
                .join(product.country_code())
                .join(&product.product_name);
            let files = copy_files(&source, &destination)?;
            manifests.push(FulfilmentManifest {
                product_name: product.product_name.clone(),
                edition_number: product.edition_number,
                files,
                query_count: 1,
            });
        }
        Ok(PartitionFetch {
            query_count: manifests.len() as u64,
            manifests,
        })
    }

    async fn readme_from_cache(&self, _target_dir: &Path) -> bool {
        false
    }

    async fn search_readme(&self, business_unit: BusinessUnit) -> Option<String> {
        let path = self.remote.join(business_unit.as_str()).join("README.TXT");
        path.is_file().then(|| path.to_string_lossy().into_owned())
    }

    async fn download_readme(&self, location: &str, target_dir: &Path) -> bool {
        std::fs::create_dir_all(target_dir).is_ok()
            && std::fs::copy(location, target_dir.join("README.TXT")).is_ok()
    }

    async fn download_auxiliary(&self, artifact: AuxiliaryArtifact, target_dir: &Path) -> bool {
        let source = self.remote.join("aux").join(Self::aux_dir(artifact));
        source.is_dir() && copy_files(&source, target_dir).is_ok()
    }

    async fn upload_file(&self, _batch_id: &BatchId, path: &Path) -> Result<(), FileShareError> {
        if !path.is_file() {
            return Err(FileShareError::Rejected {
                status: 400,
                message: format!("{} is not a file", path.display()),
            });
        }
        self.uploads.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn commit_batch(&self, batch_id: &BatchId) -> Result<(), FileShareError> {
        self.commits.lock().unwrap().push(batch_id.clone());
        Ok(())
    }
}
