//! Filesystem ancillary-file writer.
//!
//! Produces deterministic line-oriented content for each generated file. The
//! same inputs always produce the same bytes, so a redelivered job converges
//! on an identical tree.

use async_trait::async_trait;
use std::path::Path;

use super::traits::AncillaryFileWriter;
use crate::layout::BundleContext;
use crate::types::{BaseCellNumbering, CatalogueResponse, FulfilmentManifest, VolumeDescriptor};

/// Product index file name
pub const PRODUCT_FILE_NAME: &str = "PRODUCTS.TXT";
/// Serial file name of an exchange set
pub const SERIAL_ENC_FILE_NAME: &str = "SERIAL.ENC";
/// Serial file name of the overlay set
pub const SERIAL_AIO_FILE_NAME: &str = "SERIAL.AIO";
/// Catalog file name
pub const CATALOG_FILE_NAME: &str = "CATALOG.031";
/// Media identification file name
pub const MEDIA_FILE_NAME: &str = "MEDIA.TXT";
/// Update list file name
pub const ENC_UPDATE_CSV_FILE_NAME: &str = "ENC_UPDATE_LIST.CSV";

/// Writes ancillary files with `tokio::fs`, overwriting existing files
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAncillaryWriter;

impl FsAncillaryWriter {
    async fn write(path: &Path, content: String) -> bool {
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            tracing::error!(path = %parent.display(), error = %e, "Failed to create directory");
            return false;
        }
        match tokio::fs::write(path, content).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to write ancillary file");
                false
            }
        }
    }
}

fn issue_date(catalogue: &CatalogueResponse) -> String {
    catalogue
        .catalogue_date
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_else(|| "UNDATED".to_string())
}

fn join_numbers(numbers: &[u32], separator: &str) -> String {
    numbers
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

#[async_trait]
impl AncillaryFileWriter for FsAncillaryWriter {
    async fn create_product_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
        encrypted: bool,
    ) -> bool {
        let mut products: Vec<_> = catalogue.products.iter().collect();
        products.sort_by(|a, b| a.product_name.cmp(&b.product_name));

        let mut content = format!(
            "PRODUCTS;{};{}\n",
            if encrypted { "ENCRYPTED" } else { "UNENCRYPTED" },
            issue_date(catalogue)
        );
        for product in products {
            content.push_str(&format!(
                "{};{};{};{}{}\n",
                product.product_name,
                product.edition_number,
                join_numbers(&product.update_numbers, "|"),
                product.file_size,
                if product.cancellation.is_some() {
                    ";CANCELLED"
                } else {
                    ""
                }
            ));
        }

        Self::write(&bundle.info_dir().join(PRODUCT_FILE_NAME), content).await
    }

    async fn create_serial_enc_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
        numbering: Option<BaseCellNumbering>,
    ) -> bool {
        let mut content = format!("SERIAL;{};{}", issue_date(catalogue), bundle.batch_id);
        if let Some(numbering) = numbering {
            content.push_str(&format!(
                ";B{}X{:02}",
                numbering.base_number, numbering.last_base_number
            ));
        }
        content.push('\n');

        Self::write(&bundle.root.join(SERIAL_ENC_FILE_NAME), content).await
    }

    async fn create_serial_aio_file(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
    ) -> bool {
        let content = format!(
            "SERIAL-AIO;{};{}\n",
            issue_date(catalogue),
            bundle.batch_id
        );
        Self::write(&bundle.root.join(SERIAL_AIO_FILE_NAME), content).await
    }

    async fn create_catalog_file(
        &self,
        bundle: &BundleContext,
        manifests: &[FulfilmentManifest],
        catalogue: &CatalogueResponse,
    ) -> bool {
        let mut entries: Vec<String> = manifests
            .iter()
            .flat_map(|m| {
                m.files
                    .iter()
                    .map(move |f| format!("{}/{};{}", m.product_name, f.name, f.size))
            })
            .collect();
        entries.sort();

        let mut content = format!("CATALOG;{};{}\n", issue_date(catalogue), entries.len());
        for entry in entries {
            content.push_str(&entry);
            content.push('\n');
        }

        Self::write(&bundle.enc_root().join(CATALOG_FILE_NAME), content).await
    }

    async fn create_media_file(
        &self,
        bundle: &BundleContext,
        volume: &VolumeDescriptor,
        total_volumes: usize,
    ) -> bool {
        let mut content = format!("MEDIA;{:02}X{:02}\n", volume.number, total_volumes);
        for cell in &volume.base_cells {
            let codes: Vec<&str> = cell.country_codes.iter().map(String::as_str).collect();
            content.push_str(&format!("B{};{}\n", cell.number, codes.join(",")));
        }

        Self::write(&bundle.root.join(MEDIA_FILE_NAME), content).await
    }

    async fn create_enc_update_csv(
        &self,
        bundle: &BundleContext,
        catalogue: &CatalogueResponse,
    ) -> bool {
        let mut products: Vec<_> = catalogue.products.iter().collect();
        products.sort_by(|a, b| a.product_name.cmp(&b.product_name));

        let mut content = String::from("product,edition,updates\n");
        for product in products {
            content.push_str(&format!(
                "{},{},{}\n",
                product.product_name,
                product.edition_number,
                join_numbers(&product.update_numbers, " ")
            ));
        }

        Self::write(&bundle.info_dir().join(ENC_UPDATE_CSV_FILE_NAME), content).await
    }
}
