//! Common test utilities for end-to-end fulfilment tests

#![allow(dead_code)]

pub mod file_share;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use exchange_set_fulfilment::{
    BusinessUnit, CatalogueResponse, Config, FulfilmentService, Product,
};
use tempfile::TempDir;

pub use file_share::LocalFileShare;

/// Cells published in both business units by [`TestEnv::new`]
pub const CELLS: [&str; 5] = ["GB100001", "GB100002", "FR100001", "DE100001", "NL100001"];

/// Service wired to a [`LocalFileShare`] inside a temp directory
pub struct TestEnv {
    pub temp: TempDir,
    pub config: Config,
    pub share: Arc<LocalFileShare>,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.fulfilment.home_dir = temp.path().join("home");
        config.fulfilment.response_dir = temp.path().join("responses");
        config.fulfilment.search_parallelism = 2;
        std::fs::create_dir_all(&config.fulfilment.response_dir).unwrap();

        let share = Arc::new(LocalFileShare::new(temp.path().join("remote")));
        for unit in [BusinessUnit::Encrypted, BusinessUnit::Unencrypted] {
            share.publish_readme(unit, &format!("{} readme", unit));
            for cell in CELLS {
                share.publish(unit, cell, &[0, 1]);
            }
        }

        Self {
            temp,
            config,
            share,
        }
    }

    pub fn service(&self) -> FulfilmentService {
        FulfilmentService::with_file_share(self.config.clone(), self.share.clone()).unwrap()
    }

    /// Store the catalogue response for `batch_id`
    pub fn store_catalogue(&self, batch_id: &str, names: &[&str]) -> CatalogueResponse {
        let response = CatalogueResponse {
            products: names
                .iter()
                .map(|name| Product {
                    product_name: name.to_string(),
                    edition_number: 3,
                    update_numbers: vec![0, 1],
                    file_size: 2048,
                    cancellation: None,
                })
                .collect(),
            catalogue_date: Some("2026-03-02T00:00:00Z".parse().unwrap()),
        };
        std::fs::write(
            self.config
                .fulfilment
                .response_dir
                .join(format!("{}.json", batch_id)),
            serde_json::to_vec(&response).unwrap(),
        )
        .unwrap();
        response
    }

    pub fn batch_root(&self, batch_id: &str) -> PathBuf {
        self.config.fulfilment.home_dir.join(batch_id)
    }
}

/// Queue message body for `batch_id`
pub fn message(batch_id: &str, standard: &str, callback_uri: Option<&str>) -> String {
    let mut body = serde_json::json!({
        "batchId": batch_id,
        "correlationId": format!("corr-{}", batch_id),
        "fileSize": 4096,
        "catalogueRequestedAt": "2026-03-02T09:15:00Z",
        "exchangeSetStandard": standard,
        "responseLocation": format!("{}.json", batch_id),
    });
    if let Some(uri) = callback_uri {
        body["callbackUri"] = serde_json::Value::String(uri.to_string());
    }
    body.to_string()
}

/// Relative path to content of every file under `root`
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (relative, std::fs::read(e.path()).unwrap())
        })
        .collect()
}
