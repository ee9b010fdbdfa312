//! Collaborators of the fulfilment pipeline.
//!
//! - [`traits`] - The contracts the pipeline depends on
//! - [`validator`] - Default large-media product validation
//! - [`writer`] - Filesystem ancillary-file writer
//! - [`store`] - Filesystem catalogue-response store
//! - [`callback`] - Webhook callback delivery

pub mod callback;
pub mod store;
pub mod traits;
pub mod validator;
pub mod writer;

pub use callback::{CallbackPayload, WebhookCallbackSink};
pub use store::FsCatalogueStore;
pub use traits::{
    AncillaryFileWriter, CallbackDelivery, CallbackSink, CatalogueStore, Collaborators, FileShareService,
    PartitionFetch, ProductValidator, ValidationResult,
};
pub use validator::BasicProductValidator;
pub use writer::FsAncillaryWriter;
