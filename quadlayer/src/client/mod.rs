//! Layer client facade.
//!
//! [`LayerClient`] ties an index resolver to a blob backend for one layer:
//! resolve a tile to its data handle, then download the blob behind it.

mod layer;

pub use crate::config::LayerKind;
pub use layer::{AggregatedTile, HttpLayerClient, LayerClient};

use thiserror::Error;

use crate::config::ConfigError;
use crate::index::ResolveError;
use crate::provider::TransportError;

/// Errors returned by [`LayerClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Index resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Blob download failed
    #[error("Blob download failed: {0}")]
    Transport(#[from] TransportError),

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Client could not be built from its configuration
    #[error("Invalid client configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for layer client operations.
pub type ClientResult<T> = Result<T, ClientError>;
