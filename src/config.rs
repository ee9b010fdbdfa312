//! Configuration types for exchange-set-fulfilment

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Pipeline behaviour (directories, partitioning, concurrency)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FulfilmentConfig {
    /// Directory holding one bundle directory per batch (default: "./exchange-sets")
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,

    /// Target number of products per search partition (default: 30)
    ///
    /// A product list of length `n` is split into `ceil(n / search_parallelism)`
    /// partitions of near-equal size, one concurrent search task each.
    #[serde(default = "default_search_parallelism")]
    pub search_parallelism: usize,

    /// Maximum partition searches in flight at once (default: 4)
    #[serde(default = "default_max_concurrent_searches")]
    pub max_concurrent_searches: usize,

    /// Maximum jobs processed concurrently by the queue consumer (default: 2)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Base directory for stored catalogue responses (default: "./responses")
    #[serde(default = "default_response_dir")]
    pub response_dir: PathBuf,
}

impl Default for FulfilmentConfig {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            search_parallelism: default_search_parallelism(),
            max_concurrent_searches: default_max_concurrent_searches(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            response_dir: default_response_dir(),
        }
    }
}

/// Folder and file names making up a bundle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Exchange-set folder under the batch root (default: "V01X01")
    #[serde(default = "default_exchange_set_folder")]
    pub exchange_set_folder: String,

    /// Chart-cell data folder (default: "ENC_ROOT")
    #[serde(default = "default_enc_root_folder")]
    pub enc_root_folder: String,

    /// Generated index/info folder (default: "INFO")
    #[serde(default = "default_info_folder")]
    pub info_folder: String,

    /// Auxiliary certificate folder, nested in the info folder (default: "ADC")
    #[serde(default = "default_adc_folder")]
    pub adc_folder: String,

    /// Overlay exchange-set folder under the batch root (default: "AIO")
    #[serde(default = "default_aio_folder")]
    pub aio_folder: String,

    /// Staging folder for shared large-media artifacts (default: ".shared")
    #[serde(default = "default_staging_folder")]
    pub staging_folder: String,

    /// Error artifact written on failure (default: "error.txt")
    #[serde(default = "default_error_file_name")]
    pub error_file_name: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            exchange_set_folder: default_exchange_set_folder(),
            enc_root_folder: default_enc_root_folder(),
            info_folder: default_info_folder(),
            adc_folder: default_adc_folder(),
            aio_folder: default_aio_folder(),
            staging_folder: default_staging_folder(),
            error_file_name: default_error_file_name(),
        }
    }
}

/// Large-media (multi-volume) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LargeMediaConfig {
    /// Requested size above which the large-media path is taken (default: 700 MiB)
    #[serde(default = "default_size_threshold")]
    pub size_threshold_bytes: u64,

    /// Volume directory prefix; volumes are named `{prefix}NNXTT` (default: "M")
    #[serde(default = "default_volume_prefix")]
    pub volume_prefix: String,

    /// Base-cell directory prefix; base cells are named `{prefix}N` (default: "B")
    #[serde(default = "default_base_cell_prefix")]
    pub base_cell_prefix: String,
}

impl Default for LargeMediaConfig {
    fn default() -> Self {
        Self {
            size_threshold_bytes: default_size_threshold(),
            volume_prefix: default_volume_prefix(),
            base_cell_prefix: default_base_cell_prefix(),
        }
    }
}

/// Overlay ("AIO") settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AioConfig {
    /// Build an overlay exchange set when overlay cells are requested
    #[serde(default)]
    pub enabled: bool,

    /// Cell names belonging to the overlay set
    #[serde(default)]
    pub cells: Vec<String>,
}

impl AioConfig {
    /// Whether the cell belongs to the overlay set
    pub fn contains(&self, product_name: &str) -> bool {
        self.cells.iter().any(|c| c.eq_ignore_ascii_case(product_name))
    }
}

/// Callback delivery settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Timeout for callback requests (default: 30 seconds)
    #[serde(default = "default_callback_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout: default_callback_timeout(),
        }
    }
}

/// Main configuration for FulfilmentService
///
/// Every field has a default, so `{}` deserializes to a working configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pipeline behaviour
    #[serde(default)]
    pub fulfilment: FulfilmentConfig,

    /// Bundle folder and file names
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Large-media settings
    #[serde(default)]
    pub large_media: LargeMediaConfig,

    /// Overlay settings
    #[serde(default)]
    pub aio: AioConfig,

    /// Callback settings
    #[serde(default)]
    pub callback: CallbackConfig,
}

impl Config {
    /// Home directory for bundles
    pub fn home_dir(&self) -> &PathBuf {
        &self.fulfilment.home_dir
    }

    /// Check settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("fulfilment.search_parallelism", self.fulfilment.search_parallelism),
            (
                "fulfilment.max_concurrent_searches",
                self.fulfilment.max_concurrent_searches,
            ),
            (
                "fulfilment.max_concurrent_jobs",
                self.fulfilment.max_concurrent_jobs,
            ),
        ];
        for (key, value) in counts {
            if value == 0 {
                return Err(config_error(key, "must be at least 1"));
            }
        }

        let names = [
            ("layout.exchange_set_folder", &self.layout.exchange_set_folder),
            ("layout.enc_root_folder", &self.layout.enc_root_folder),
            ("layout.info_folder", &self.layout.info_folder),
            ("layout.adc_folder", &self.layout.adc_folder),
            ("layout.aio_folder", &self.layout.aio_folder),
            ("layout.staging_folder", &self.layout.staging_folder),
            ("layout.error_file_name", &self.layout.error_file_name),
            ("large_media.volume_prefix", &self.large_media.volume_prefix),
            (
                "large_media.base_cell_prefix",
                &self.large_media.base_cell_prefix,
            ),
        ];
        for (key, value) in names {
            if value.trim().is_empty() {
                return Err(config_error(key, "must not be empty"));
            }
            if value.contains(['/', '\\']) || value == ".." {
                return Err(config_error(key, "must be a single path component"));
            }
        }

        if self.aio.enabled && self.aio.cells.is_empty() {
            return Err(config_error(
                "aio.cells",
                "at least one cell is required when AIO is enabled",
            ));
        }

        Ok(())
    }
}

fn config_error(key: &str, message: &str) -> Error {
    Error::Config {
        message: format!("{} {}", key, message),
        key: Some(key.to_string()),
    }
}

fn default_home_dir() -> PathBuf {
    PathBuf::from("./exchange-sets")
}

fn default_response_dir() -> PathBuf {
    PathBuf::from("./responses")
}

fn default_search_parallelism() -> usize {
    30
}

fn default_max_concurrent_searches() -> usize {
    4
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_exchange_set_folder() -> String {
    "V01X01".into()
}

fn default_enc_root_folder() -> String {
    "ENC_ROOT".into()
}

fn default_info_folder() -> String {
    "INFO".into()
}

fn default_adc_folder() -> String {
    "ADC".into()
}

fn default_aio_folder() -> String {
    "AIO".into()
}

fn default_staging_folder() -> String {
    ".shared".into()
}

fn default_error_file_name() -> String {
    "error.txt".into()
}

fn default_size_threshold() -> u64 {
    700 * 1024 * 1024
}

fn default_volume_prefix() -> String {
    "M".into()
}

fn default_base_cell_prefix() -> String {
    "B".into()
}

fn default_callback_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fulfilment.search_parallelism, 30);
        assert_eq!(config.layout.exchange_set_folder, "V01X01");
        assert_eq!(config.large_media.size_threshold_bytes, 734_003_200);
        assert_eq!(config.callback.timeout, Duration::from_secs(30));
        assert!(!config.aio.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn nested_fields_override_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"fulfilment":{"search_parallelism":3},"aio":{"enabled":true,"cells":["GB800001"]},"callback":{"timeout":5}}"#,
        )
        .unwrap();
        assert_eq!(config.fulfilment.search_parallelism, 3);
        assert_eq!(config.fulfilment.max_concurrent_searches, 4);
        assert!(config.aio.contains("gb800001"));
        assert_eq!(config.callback.timeout, Duration::from_secs(5));
    }

    #[test]
    fn validate_rejects_zero_parallelism() {
        let mut config = Config::default();
        config.fulfilment.search_parallelism = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("fulfilment.search_parallelism"))
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_nested_folder_names() {
        let mut config = Config::default();
        config.layout.info_folder = "INFO/extra".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_cells_when_aio_enabled() {
        let mut config = Config::default();
        config.aio.enabled = true;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("aio.cells")),
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
