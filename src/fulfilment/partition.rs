//! Product partitioning, de-duplication and overlay split.

use std::collections::HashSet;

use crate::config::AioConfig;
use crate::types::Product;

/// Split `items` into `ceil(n / parallelism)` near-equal partitions
///
/// Input order is preserved within and across partitions; the first
/// `n mod k` partitions carry one extra item. A `parallelism` of 0 is
/// treated as 1, and an empty input yields no partitions.
pub fn partition_products<T: Clone>(items: &[T], parallelism: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }

    let count = items.len().div_ceil(parallelism.max(1));
    let base = items.len() / count;
    let extra = items.len() % count;

    let mut partitions = Vec::with_capacity(count);
    let mut start = 0;
    for index in 0..count {
        let len = base + usize::from(index < extra);
        partitions.push(items[start..start + len].to_vec());
        start += len;
    }
    partitions
}

/// Drop repeated product names, keeping the first occurrence
pub fn dedup_products(products: Vec<Product>) -> Vec<Product> {
    let mut seen = HashSet::with_capacity(products.len());
    products
        .into_iter()
        .filter(|p| {
            let first = seen.insert(p.product_name.clone());
            if !first {
                tracing::debug!(product = %p.product_name, "Dropping duplicate product");
            }
            first
        })
        .collect()
}

/// Split products into (remaining, overlay) by the overlay cell list
pub fn split_overlay_cells(products: Vec<Product>, aio: &AioConfig) -> (Vec<Product>, Vec<Product>) {
    products
        .into_iter()
        .partition(|p| !aio.contains(&p.product_name))
}
