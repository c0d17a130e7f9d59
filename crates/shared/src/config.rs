//! Application configuration management.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageProvider,
    /// File manager orchestration settings.
    #[serde(default)]
    pub fm: FmConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "fm=info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Storage provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3-compatible storage: AWS S3, Cloudflare R2, MinIO
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// AWS region.
        region: String,
        /// AWS access key ID.
        access_key_id: String,
        /// AWS secret access key.
        secret_access_key: String,
        /// Buckets the service may address.
        #[serde(default)]
        buckets: Vec<String>,
        /// Base URL objects are publicly reachable under, if any.
        #[serde(default)]
        public_base_url: Option<String>,
    },
    /// Local filesystem
    LocalFs {
        /// Data root; buckets are its direct subdirectories.
        root: PathBuf,
        /// Base URL a static file server exposes the data root under, if any.
        #[serde(default)]
        public_base_url: Option<String>,
    },
}

impl Default for StorageProvider {
    fn default() -> Self {
        Self::local_fs("./data")
    }
}

impl StorageProvider {
    /// Create S3-compatible provider.
    #[must_use]
    pub fn s3(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        buckets: Vec<String>,
    ) -> Self {
        Self::S3 {
            endpoint: endpoint.into(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            buckets,
            public_base_url: None,
        }
    }

    /// Create local filesystem provider.
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs {
            root: root.into(),
            public_base_url: None,
        }
    }

    /// Get the provider name recorded as a row's storage location.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::LocalFs { .. } => "local",
        }
    }
}

/// File manager orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FmConfig {
    /// Bucket used when a purpose has no explicit mapping.
    pub default_bucket: String,
    /// Purpose name to bucket mapping.
    pub purpose_buckets: HashMap<String, String>,
    /// Buckets a destination hint or a move may target.
    pub bucket_presets: Vec<String>,
    /// Allowed difference in pixels between declared and sniffed dimensions.
    pub pixel_tolerance: u32,
    /// Prefix of the service-routed content URL.
    pub canonical_url_base: String,
    /// Presigned upload URL TTL in seconds.
    pub presign_put_ttl_secs: u64,
    /// Presigned download URL TTL in seconds.
    pub presign_get_ttl_secs: u64,
}

impl FmConfig {
    /// Default pixel tolerance for dimension cross-checks.
    pub const DEFAULT_PIXEL_TOLERANCE: u32 = 2;
    /// Default upload TTL: 15 minutes.
    pub const DEFAULT_UPLOAD_TTL: u64 = 900;
    /// Default download TTL: 1 hour.
    pub const DEFAULT_DOWNLOAD_TTL: u64 = 3600;

    /// Set the default bucket.
    #[must_use]
    pub fn with_default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = bucket.into();
        self
    }

    /// Map a purpose to a bucket.
    #[must_use]
    pub fn with_purpose_bucket(
        mut self,
        purpose: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        self.purpose_buckets.insert(purpose.into(), bucket.into());
        self
    }

    /// Replace the bucket preset allowlist.
    #[must_use]
    pub fn with_bucket_presets(mut self, presets: Vec<String>) -> Self {
        self.bucket_presets = presets;
        self
    }

    /// Set the pixel tolerance.
    #[must_use]
    pub fn with_pixel_tolerance(mut self, pixels: u32) -> Self {
        self.pixel_tolerance = pixels;
        self
    }

    /// Bucket new uploads of `purpose` land in.
    #[must_use]
    pub fn bucket_for_purpose(&self, purpose: &str) -> &str {
        self.purpose_buckets
            .get(purpose)
            .map_or(self.default_bucket.as_str(), String::as_str)
    }

    /// Check if a bucket is in the preset allowlist.
    #[must_use]
    pub fn is_bucket_allowed(&self, bucket: &str) -> bool {
        self.bucket_presets.iter().any(|b| b == bucket)
    }
}

impl Default for FmConfig {
    fn default() -> Self {
        Self {
            default_bucket: "uploads".to_string(),
            purpose_buckets: HashMap::new(),
            bucket_presets: vec![
                "uploads".to_string(),
                "media".to_string(),
                "private".to_string(),
            ],
            pixel_tolerance: Self::DEFAULT_PIXEL_TOLERANCE,
            canonical_url_base: "/api/admin/fm/files".to_string(),
            presign_put_ttl_secs: Self::DEFAULT_UPLOAD_TTL,
            presign_get_ttl_secs: Self::DEFAULT_DOWNLOAD_TTL,
        }
    }
}

impl AppConfig {
    /// Loads configuration from config files and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`], with an extra config file layered on top of
    /// the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load_from(extra: Option<&Path>) -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false));
        if let Some(path) = extra {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("FM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("fm.bucket_presets"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid configuration.
    pub fn from_toml(document: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(document, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
