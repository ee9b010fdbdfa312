//! Parallel partition fetch under a shared cancellation token.
//!
//! One task per partition runs through a bounded `buffer_unordered` stream.
//! A task that fails or reports cancellation cancels the shared token; tasks
//! that have not started yet see the token and return without touching the
//! file share, and the in-flight call of a running task is raced against it.
//! On cancellation every partial manifest is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{FileShareError, FulfilmentError};
use crate::layout::BundleContext;
use crate::services::FileShareService;
use crate::types::{BusinessUnit, Event, FulfilmentManifest, Product};

use super::context::JobContext;
use super::partition::partition_products;

/// Aggregated result of a completed fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FetchOutcome {
    /// One manifest per product, ordered by product name
    pub(crate) manifests: Vec<FulfilmentManifest>,
    /// Remote search queries issued across all partitions
    pub(crate) query_count: u64,
    /// Files downloaded across all partitions
    pub(crate) file_count: u64,
}

/// Manifest accumulator keyed by product name
type ManifestMap = Arc<Mutex<HashMap<String, FulfilmentManifest>>>;

/// How one partition task ended
#[derive(Debug)]
enum PartitionResult {
    Completed,
    Cancelled,
    Failed(String),
}

struct PartitionTask {
    index: usize,
    products: Vec<Product>,
    business_unit: BusinessUnit,
    target: BundleContext,
    file_share: Arc<dyn FileShareService>,
    cancel: CancellationToken,
    manifests: ManifestMap,
    queries: Arc<AtomicU64>,
    files: Arc<AtomicU64>,
}

/// Partition `products`, fetch every partition into `target` and aggregate
///
/// Returns [`FulfilmentError::Cancelled`] carrying the first partition error
/// when any partition signalled cancellation, or when the job itself was
/// cancelled while the fetch was running.
pub(crate) async fn fetch_partitions(
    ctx: &JobContext,
    products: &[Product],
    business_unit: BusinessUnit,
    target: &BundleContext,
) -> Result<FetchOutcome, FulfilmentError> {
    let partitions = partition_products(products, ctx.config.fulfilment.search_parallelism);
    let partition_count = partitions.len();
    let cancel = ctx.cancel.child_token();
    let manifests: ManifestMap = Arc::new(Mutex::new(HashMap::with_capacity(products.len())));
    let queries = Arc::new(AtomicU64::new(0));
    let files = Arc::new(AtomicU64::new(0));

    tracing::debug!(
        batch_id = %ctx.batch_id(),
        business_unit = %business_unit,
        products = products.len(),
        partitions = partition_count,
        "Starting partitioned fetch"
    );

    let mut results = stream::iter(partitions.into_iter().enumerate())
        .map(|(index, products)| {
            fetch_partition(PartitionTask {
                index,
                products,
                business_unit,
                target: target.clone(),
                file_share: Arc::clone(&ctx.services.file_share),
                cancel: cancel.clone(),
                manifests: Arc::clone(&manifests),
                queries: Arc::clone(&queries),
                files: Arc::clone(&files),
            })
        })
        .buffer_unordered(ctx.config.fulfilment.max_concurrent_searches.max(1));

    let mut first_error: Option<String> = None;
    while let Some(result) = results.next().await {
        match result {
            PartitionResult::Completed => {}
            PartitionResult::Cancelled => cancel.cancel(),
            PartitionResult::Failed(reason) => {
                first_error.get_or_insert(reason);
                cancel.cancel();
            }
        }
    }
    drop(results);

    if cancel.is_cancelled() {
        let reason = first_error.unwrap_or_else(|| "search cancelled".to_string());
        tracing::error!(
            batch_id = %ctx.batch_id(),
            correlation_id = %ctx.request.correlation_id,
            business_unit = %business_unit,
            reason = %reason,
            "Partitioned fetch cancelled, discarding partial manifests"
        );
        return Err(FulfilmentError::Cancelled {
            batch_id: ctx.batch_id().clone(),
            reason,
        });
    }

    let mut manifests: Vec<FulfilmentManifest> = std::mem::take(
        &mut *manifests.lock().unwrap_or_else(PoisonError::into_inner),
    )
    .into_values()
    .collect();
    manifests.sort_by(|a, b| a.product_name.cmp(&b.product_name));

    let outcome = FetchOutcome {
        manifests,
        query_count: queries.load(Ordering::Relaxed),
        file_count: files.load(Ordering::Relaxed),
    };

    tracing::info!(
        batch_id = %ctx.batch_id(),
        business_unit = %business_unit,
        partitions = partition_count,
        manifests = outcome.manifests.len(),
        queries = outcome.query_count,
        files = outcome.file_count,
        "Partitioned fetch completed"
    );
    ctx.emit(Event::FetchCompleted {
        batch_id: ctx.batch_id().clone(),
        business_unit,
        manifests: outcome.manifests.len(),
        queries: outcome.query_count,
        files: outcome.file_count,
    });

    Ok(outcome)
}

async fn fetch_partition(task: PartitionTask) -> PartitionResult {
    if task.cancel.is_cancelled() {
        tracing::debug!(partition = task.index, "Search cancelled, partition not started");
        return PartitionResult::Cancelled;
    }

    let search = task.file_share.search_and_download(
        &task.products,
        task.business_unit,
        &task.target,
        &task.cancel,
    );
    let result = tokio::select! {
        result = search => result,
        _ = task.cancel.cancelled() => Err(FileShareError::Cancelled),
    };

    match result {
        Ok(fetch) => {
            let file_count: u64 = fetch.manifests.iter().map(|m| m.files.len() as u64).sum();
            task.queries.fetch_add(fetch.query_count, Ordering::Relaxed);
            task.files.fetch_add(file_count, Ordering::Relaxed);
            {
                let mut manifests = task
                    .manifests
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                for manifest in fetch.manifests {
                    manifests.insert(manifest.product_name.clone(), manifest);
                }
            }
            tracing::debug!(
                partition = task.index,
                products = task.products.len(),
                queries = fetch.query_count,
                files = file_count,
                "Partition fetched"
            );
            PartitionResult::Completed
        }
        Err(e) if e.is_cancellation() => {
            tracing::debug!(partition = task.index, "Partition observed cancellation");
            task.cancel.cancel();
            PartitionResult::Cancelled
        }
        Err(e) => {
            tracing::error!(
                partition = task.index,
                batch_id = %task.target.batch_id,
                error = %e,
                "Partition fetch failed, cancelling remaining partitions"
            );
            task.cancel.cancel();
            PartitionResult::Failed(e.to_string())
        }
    }
}
