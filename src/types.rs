//! Core types for exchange-set-fulfilment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::{Error, EventId, Result};

/// Identifier of one requested bundle
///
/// Batch ids become directory names under the home directory, so only
/// ASCII alphanumerics, `-` and `_` are accepted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    /// Create a new BatchId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is safe to use as a single path component
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Exchange-set standard requested by the catalogue service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeSetStandard {
    /// Encrypted chart cells
    #[default]
    S63,
    /// Unencrypted chart cells
    S57,
}

impl ExchangeSetStandard {
    /// Business unit holding source files for this standard
    pub fn business_unit(&self) -> BusinessUnit {
        match self {
            ExchangeSetStandard::S63 => BusinessUnit::Encrypted,
            ExchangeSetStandard::S57 => BusinessUnit::Unencrypted,
        }
    }
}

/// Source catalogue a fetch targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusinessUnit {
    /// Encrypted chart catalogue
    #[serde(rename = "ADDS")]
    Encrypted,
    /// Unencrypted chart catalogue
    #[serde(rename = "ADDS-S57")]
    Unencrypted,
}

impl BusinessUnit {
    /// Name of the business unit on the file-sharing service
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessUnit::Encrypted => "ADDS",
            BusinessUnit::Unencrypted => "ADDS-S57",
        }
    }

    /// Whether files in this business unit are encrypted
    pub fn is_encrypted(&self) -> bool {
        matches!(self, BusinessUnit::Encrypted)
    }
}

impl std::fmt::Display for BusinessUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fulfilment job, as received from the queue
///
/// Immutable once received. Identifies exactly one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfilmentRequest {
    /// Bundle being requested
    pub batch_id: BatchId,
    /// Correlation id carried through logs and the callback
    pub correlation_id: String,
    /// Total requested size in bytes
    pub file_size: u64,
    /// When the catalogue service received the request
    pub catalogue_requested_at: DateTime<Utc>,
    /// Requested exchange-set standard
    #[serde(default)]
    pub exchange_set_standard: ExchangeSetStandard,
    /// Where the stored catalogue response lives
    #[serde(default)]
    pub response_location: Option<String>,
    /// Where to deliver the callback
    #[serde(default)]
    pub callback_uri: Option<String>,
}

impl FulfilmentRequest {
    /// Parse and validate a queue message body
    pub fn from_message(body: &str) -> Result<Self> {
        let request: FulfilmentRequest = serde_json::from_str(body)
            .map_err(|e| Error::InvalidMessage(format!("malformed message: {}", e)))?;
        request.validate()?;
        Ok(request)
    }

    /// Check the identifiers a job derives paths and logs from
    pub fn validate(&self) -> Result<()> {
        if !self.batch_id.is_valid() {
            return Err(Error::InvalidMessage(format!(
                "batch id {:?} is not a valid directory name",
                self.batch_id.0
            )));
        }
        if self.correlation_id.trim().is_empty() {
            return Err(Error::InvalidMessage(
                "correlation id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Business unit selected by the requested standard
    pub fn business_unit(&self) -> BusinessUnit {
        self.exchange_set_standard.business_unit()
    }
}

/// Cancellation or supersession of a chart cell
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCancellation {
    /// Edition being cancelled
    pub edition_number: u32,
    /// Update that carries the cancellation
    pub update_number: u32,
}

/// Chart cell supplied by the catalogue response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Cell identifier (e.g. "GB100001")
    pub product_name: String,
    /// Edition number
    pub edition_number: u32,
    /// Update numbers to deliver
    #[serde(default)]
    pub update_numbers: Vec<u32>,
    /// Size in bytes
    #[serde(default)]
    pub file_size: u64,
    /// Cancellation metadata, when the cell is being withdrawn
    #[serde(default)]
    pub cancellation: Option<ProductCancellation>,
}

impl Product {
    /// Producer country code: the first two characters of the cell name
    pub fn country_code(&self) -> &str {
        country_code(&self.product_name)
    }
}

/// Country code of a cell name (its first two characters)
pub fn country_code(product_name: &str) -> &str {
    match product_name.char_indices().nth(2) {
        Some((end, _)) => &product_name[..end],
        None => product_name,
    }
}

/// Stored catalogue response for a request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueResponse {
    /// Products to deliver
    #[serde(default)]
    pub products: Vec<Product>,
    /// Catalogue issue date, used as the publication date in generated files
    #[serde(default)]
    pub catalogue_date: Option<DateTime<Utc>>,
}

/// One retrieved file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name relative to the product directory
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

/// Per-product record of retrieved files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilmentManifest {
    /// Cell identifier
    pub product_name: String,
    /// Edition the files belong to
    pub edition_number: u32,
    /// Files retrieved for the product
    pub files: Vec<FileDescriptor>,
    /// Remote search queries issued for the product
    pub query_count: u32,
}

impl FulfilmentManifest {
    /// Producer country code of the manifest's product
    pub fn country_code(&self) -> &str {
        country_code(&self.product_name)
    }
}

/// Base-cell directory inside a large-media volume
///
/// Computed once at discovery time from the directory tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseCell {
    /// Base-cell number parsed from the directory name (e.g. 3 for "B3")
    pub number: u32,
    /// Base-cell directory
    pub path: PathBuf,
    /// Country-code directories present under the base cell's chart-cell folder
    pub country_codes: BTreeSet<String>,
}

impl BaseCell {
    /// Whether the base cell holds data for the manifest's producer
    pub fn covers(&self, manifest: &FulfilmentManifest) -> bool {
        self.country_codes.contains(manifest.country_code())
    }
}

/// Numbered large-media volume
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeDescriptor {
    /// Volume number parsed from the directory name (e.g. 1 for "M01X02")
    pub number: u8,
    /// Volume directory
    pub path: PathBuf,
    /// Base cells found in the volume, ordered by number
    pub base_cells: Vec<BaseCell>,
}

impl VolumeDescriptor {
    /// Directory name of the volume
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Highest base-cell number in the volume (0 when it has none)
    pub fn highest_base_cell(&self) -> u32 {
        self.base_cells.iter().map(|b| b.number).max().unwrap_or(0)
    }
}

/// Cross-volume numbering handed to serial-file builds
///
/// `last_base_number` is the highest base-cell number of the last volume, so
/// numbering runs continuously across the whole multi-volume set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseCellNumbering {
    /// Number of the base cell being written
    pub base_number: u32,
    /// Highest base-cell number across the set
    pub last_base_number: u32,
}

/// Ancillary files making up a valid bundle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncillaryFile {
    /// Product index
    ProductFile,
    /// Serial file of an encrypted/unencrypted exchange set
    SerialEnc,
    /// Serial file of the overlay exchange set
    SerialAio,
    /// Catalog of the bundle's files
    Catalog,
    /// Large-media identification file
    Media,
    /// Large-media update list
    EncUpdateCsv,
    /// Shared readme artifact
    Readme,
    /// Overlay certificate
    Certificate,
    /// Overlay publication
    Publication,
    /// Shared large-media INFO/ADC artifacts
    SharedInfo,
}

impl std::fmt::Display for AncillaryFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AncillaryFile::ProductFile => "product file",
            AncillaryFile::SerialEnc => "serial file",
            AncillaryFile::SerialAio => "AIO serial file",
            AncillaryFile::Catalog => "catalog file",
            AncillaryFile::Media => "media file",
            AncillaryFile::EncUpdateCsv => "ENC update list",
            AncillaryFile::Readme => "readme",
            AncillaryFile::Certificate => "certificate",
            AncillaryFile::Publication => "publication",
            AncillaryFile::SharedInfo => "shared INFO/ADC artifacts",
        };
        f.write_str(name)
    }
}

/// Fixed auxiliary artifacts downloaded from the file-sharing service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryArtifact {
    /// Overlay certificate
    Certificate,
    /// Overlay publication
    Publication,
    /// Large-media INFO folder content
    LargeMediaInfo,
    /// Large-media ADC folder content
    LargeMediaAdc,
}

/// Which build path a job took
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleVariant {
    /// Single-volume exchange set
    Standard,
    /// Multi-volume exchange set
    LargeMedia,
}

/// Final state of a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The bundle was assembled
    Succeeded {
        /// Root directory of the assembled bundle
        bundle_root: PathBuf,
    },
    /// The job failed and was compensated
    Failed {
        /// Classified event identifier
        event_id: EventId,
        /// Human-readable failure description
        message: String,
    },
}

impl JobOutcome {
    /// Whether the job succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

/// Events emitted by the fulfilment service
///
/// Consumers subscribe via [`FulfilmentService::subscribe`](crate::FulfilmentService::subscribe).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A queue message was accepted
    JobReceived {
        /// Batch id
        batch_id: BatchId,
        /// Requested size in bytes
        file_size: u64,
    },
    /// The job chose its build path
    VariantSelected {
        /// Batch id
        batch_id: BatchId,
        /// Chosen path
        variant: BundleVariant,
        /// Whether an overlay build was added
        aio: bool,
    },
    /// All partitions of one fetch finished
    FetchCompleted {
        /// Batch id
        batch_id: BatchId,
        /// Business unit searched
        business_unit: BusinessUnit,
        /// Products with a manifest
        manifests: usize,
        /// Remote search queries issued
        queries: u64,
        /// Files downloaded
        files: u64,
    },
    /// The overlay build finished
    AioCompleted {
        /// Batch id
        batch_id: BatchId,
        /// Logical AND of every overlay step
        success: bool,
    },
    /// A large-media volume finished its directory and file phase
    VolumeBuilt {
        /// Batch id
        batch_id: BatchId,
        /// Volume number
        volume: u8,
    },
    /// The job assembled its bundle
    JobSucceeded {
        /// Batch id
        batch_id: BatchId,
    },
    /// The job failed
    JobFailed {
        /// Batch id
        batch_id: BatchId,
        /// Numeric event identifier
        event_id: u32,
        /// Failure description
        error: String,
    },
    /// Outcome of publishing the error artifact
    ErrorArtifactPublished {
        /// Batch id
        batch_id: BatchId,
        /// Whether the upload succeeded
        uploaded: bool,
        /// Whether the batch commit succeeded
        committed: bool,
    },
    /// The callback was delivered
    CallbackSent {
        /// Batch id
        batch_id: BatchId,
        /// Whether the callback reported success
        success: bool,
    },
    /// No callback target was given, nothing was delivered
    CallbackSkipped {
        /// Batch id
        batch_id: BatchId,
    },
    /// The callback could not be delivered
    CallbackFailed {
        /// Batch id
        batch_id: BatchId,
        /// Delivery error
        error: String,
    },
}
