//! Layer client configuration.
//!
//! A [`ClientConfig`] names one layer of one catalog and the service
//! endpoints to reach it. It can be built in code:
//!
//! ```ignore
//! use quadlayer::config::{ClientConfig, LayerKind};
//!
//! let config = ClientConfig::new("hrn:here:data::olp-here:rib-2", "roads")
//!     .with_layer_kind(LayerKind::Versioned { version: 12 })
//!     .with_query_url("https://query.example.com/v1")
//!     .with_blob_url("https://blob.example.com/v1")
//!     .with_cache_capacity_mb(8);
//! ```
//!
//! or loaded from an INI file:
//!
//! ```ini
//! [layer]
//! catalog = hrn:here:data::olp-here:rib-2
//! id = roads
//! ; omit for volatile layers
//! version = 12
//!
//! [endpoints]
//! query = https://query.example.com/v1
//! blob = https://blob.example.com/v1
//!
//! [auth]
//! token = eyJhbGciOi...
//!
//! [cache]
//! capacity_mb = 8
//!
//! [http]
//! timeout_secs = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::cache::DEFAULT_CAPACITY_MB;
use crate::provider::DEFAULT_TIMEOUT_SECS;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid INI
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] ini::ParseError),

    /// A mandatory key is absent or empty
    #[error("Missing configuration: {section}.{key}")]
    MissingKey { section: String, key: String },

    /// A key holds a value of the wrong shape
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// How a layer's partitions are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Immutable data pinned to a catalog version.
    Versioned { version: i64 },
    /// Latest data, no version in requests.
    Volatile,
}

impl LayerKind {
    /// Version passed to the query service, if any.
    pub fn version(&self) -> Option<i64> {
        match self {
            LayerKind::Versioned { version } => Some(*version),
            LayerKind::Volatile => None,
        }
    }
}

/// Configuration for a [`crate::client::LayerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Catalog identifier the layer belongs to.
    pub catalog: String,

    /// Layer identifier within the catalog.
    pub layer_id: String,

    pub layer_kind: LayerKind,

    /// Base URL of the query service.
    pub query_url: String,

    /// Base URL of the blob service.
    pub blob_url: String,

    /// Bearer token sent with every request.
    pub bearer_token: Option<String>,

    /// Index fragment cache size in megabytes.
    pub cache_capacity_mb: usize,

    /// HTTP request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for a volatile layer with default cache and
    /// timeout settings. Endpoints must still be set.
    pub fn new(catalog: impl Into<String>, layer_id: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            layer_id: layer_id.into(),
            layer_kind: LayerKind::Volatile,
            query_url: String::new(),
            blob_url: String::new(),
            bearer_token: None,
            cache_capacity_mb: DEFAULT_CAPACITY_MB,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the layer kind.
    pub fn with_layer_kind(mut self, kind: LayerKind) -> Self {
        self.layer_kind = kind;
        self
    }

    /// Set the query service base URL.
    pub fn with_query_url(mut self, url: impl Into<String>) -> Self {
        self.query_url = url.into();
        self
    }

    /// Set the blob service base URL.
    pub fn with_blob_url(mut self, url: impl Into<String>) -> Self {
        self.blob_url = url.into();
        self
    }

    /// Set the bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the index cache capacity in megabytes.
    pub fn with_cache_capacity_mb(mut self, capacity_mb: usize) -> Self {
        self.cache_capacity_mb = capacity_mb;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from an INI file.
    pub fn from_ini_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&content)
    }

    /// Parse configuration from INI text.
    ///
    /// `[layer] catalog`, `[layer] id`, `[endpoints] query` and
    /// `[endpoints] blob` are mandatory. Everything else falls back to the
    /// defaults of [`ClientConfig::new`].
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content)?;

        let catalog = required(&ini, "layer", "catalog")?;
        let layer_id = required(&ini, "layer", "id")?;
        let mut config = Self::new(catalog, layer_id)
            .with_query_url(required(&ini, "endpoints", "query")?)
            .with_blob_url(required(&ini, "endpoints", "blob")?);

        if let Some(version) = parsed::<i64>(&ini, "layer", "version", "expected an integer")? {
            config.layer_kind = LayerKind::Versioned { version };
        }
        if let Some(token) = optional(&ini, "auth", "token") {
            config.bearer_token = Some(token.to_string());
        }
        if let Some(mb) =
            parsed::<usize>(&ini, "cache", "capacity_mb", "expected a whole number of megabytes")?
        {
            config.cache_capacity_mb = mb;
        }
        if let Some(secs) = parsed::<u64>(&ini, "http", "timeout_secs", "expected whole seconds")? {
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Trimmed value of a key, treating empty values as absent.
fn optional<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.get_from(Some(section), key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn required(ini: &Ini, section: &str, key: &str) -> Result<String, ConfigError> {
    optional(ini, section, key)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn parsed<T: FromStr>(
    ini: &Ini,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = optional(ini, section, key) else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        })
}
