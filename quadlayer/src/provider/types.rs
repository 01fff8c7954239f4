//! Backend contracts and transport errors

use std::future::Future;

use thiserror::Error;

use crate::index::QuadTreeIndex;

/// Errors that can occur while talking to the query or blob services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request could not be sent or the body could not be read
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The service answered 404
    #[error("Not found: {url}")]
    NotFound { url: String },

    /// The service answered 401 or 403
    #[error("Unauthorized (HTTP {status}) for {url}")]
    Unauthorized { status: u16, url: String },

    /// Any other non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Body did not match the expected format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// HTTP status behind this error, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::NotFound { .. } => Some(404),
            TransportError::Unauthorized { status, .. } | TransportError::Status { status, .. } => {
                Some(*status)
            }
            TransportError::HttpError(_) | TransportError::InvalidResponse(_) => None,
        }
    }
}

/// Raw HTTP response: status code and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// A 200 response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body.into())
    }

    /// A 204 response.
    pub fn no_content() -> Self {
        Self::new(204, Vec::new())
    }

    /// Maps the status to the typed error taxonomy.
    ///
    /// 204 means "address valid, no data" and yields `Ok(None)`; any other
    /// 2xx yields the body. 404, 401/403 and the rest map to their
    /// [`TransportError`] variants.
    pub fn into_body(self, url: &str) -> Result<Option<Vec<u8>>, TransportError> {
        match self.status {
            204 => Ok(None),
            200..=299 => Ok(Some(self.body)),
            404 => Err(TransportError::NotFound {
                url: url.to_string(),
            }),
            401 | 403 => Err(TransportError::Unauthorized {
                status: self.status,
                url: url.to_string(),
            }),
            status => Err(TransportError::Status {
                status,
                url: url.to_string(),
            }),
        }
    }
}

/// Query service that serves quad-tree index fragments.
pub trait QueryBackend: Send + Sync {
    /// Fetches the index fragment rooted at `root_morton` (the decimal Morton
    /// code of the fragment root), `depth` levels deep.
    ///
    /// Versioned layers pass their layer version; volatile layers pass
    /// `None`.
    fn fetch_quad_tree_index(
        &self,
        layer_id: &str,
        root_morton: &str,
        depth: u8,
        version: Option<i64>,
    ) -> impl Future<Output = Result<QuadTreeIndex, TransportError>> + Send;
}

/// Blob service that serves partition payloads by data handle.
pub trait BlobBackend: Send + Sync {
    /// Downloads a blob. `Ok(None)` means the service reported no content.
    fn get_blob(
        &self,
        layer_id: &str,
        data_handle: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;
}
