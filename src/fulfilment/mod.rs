//! Bundle assembly.
//!
//! Split into focused submodules:
//! - [`partition`] - Product partitioning, de-duplication and overlay split
//! - [`fetch`] - Parallel partition fetch with shared cancellation
//! - [`ancillary`] - Ancillary file orchestration
//! - [`assembler`] - Standard and overlay exchange sets
//! - [`large_media`] - Multi-volume exchange sets
//! - [`context`] - Job-scoped shared state

mod ancillary;
mod assembler;
mod context;
mod fetch;
mod large_media;
pub mod partition;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub(crate) use assembler::{assemble_aio, assemble_standard};
pub(crate) use context::JobContext;
pub(crate) use large_media::assemble_large_media;
pub use partition::{dedup_products, partition_products, split_overlay_cells};
