//! Error types for index resolution.

use thiserror::Error;

use crate::provider::TransportError;
use crate::quadkey::QuadKeyError;

/// Errors returned by [`super::QuadTreeIndexResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The requested key is outside the valid range for its level.
    #[error("Invalid quad key: {0}")]
    InvalidQuadKey(#[from] QuadKeyError),

    /// The query service request failed.
    #[error("Index query failed: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for index resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_wraps_source() {
        let error = ResolveError::from(TransportError::NotFound {
            url: "https://q/x".to_string(),
        });
        assert!(error.to_string().starts_with("Index query failed:"));
        assert!(error.to_string().contains("https://q/x"));
    }

    #[test]
    fn test_from_quadkey_error() {
        let error: ResolveError = QuadKeyError::InvalidMortonCode(0).into();
        assert!(matches!(error, ResolveError::InvalidQuadKey(_)));
    }
}
