//! Catalogue responses stored as JSON documents on disk.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::traits::CatalogueStore;
use crate::error::{FulfilmentError, Result};
use crate::types::{CatalogueResponse, FulfilmentRequest};

/// Reads the document named by the request's response location under `base_dir`
#[derive(Debug, Clone)]
pub struct FsCatalogueStore {
    base_dir: PathBuf,
}

impl FsCatalogueStore {
    /// Create a store rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolve a location, refusing anything that escapes the base directory
    fn resolve(&self, location: &str) -> Option<PathBuf> {
        let relative = Path::new(location);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return None;
        }
        Some(self.base_dir.join(relative))
    }
}

#[async_trait]
impl CatalogueStore for FsCatalogueStore {
    async fn load(&self, request: &FulfilmentRequest) -> Result<CatalogueResponse> {
        let not_found = |reason: String| FulfilmentError::CatalogueResponseNotFound {
            batch_id: request.batch_id.clone(),
            reason,
        };

        let location = request
            .response_location
            .as_deref()
            .ok_or_else(|| not_found("request has no response location".to_string()))?;
        let path = self
            .resolve(location)
            .ok_or_else(|| not_found(format!("location {:?} is outside the store", location)))?;

        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| not_found(format!("{}: {}", path.display(), e)))?;
        let response: CatalogueResponse = serde_json::from_slice(&body)
            .map_err(|e| not_found(format!("{} is unreadable: {}", path.display(), e)))?;

        tracing::debug!(
            batch_id = %request.batch_id,
            path = %path.display(),
            "Loaded catalogue response"
        );
        Ok(response)
    }
}
