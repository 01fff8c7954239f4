//! Backend service abstraction
//!
//! The resolver and the layer client only see the [`QueryBackend`] and
//! [`BlobBackend`] traits. The HTTP implementations here build service URLs
//! on top of an injected [`AsyncHttpClient`], so tests can swap in mocks at
//! either seam.
//!
//! ```ignore
//! use quadlayer::provider::{AsyncReqwestClient, HttpQueryBackend};
//!
//! let http_client = AsyncReqwestClient::new()?;
//! let backend = HttpQueryBackend::new(http_client, "https://query.example.com/v1");
//! ```

mod blob;
mod http;
mod query;
mod types;

pub use blob::HttpBlobBackend;
pub use http::{AsyncHttpClient, AsyncReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use query::HttpQueryBackend;
pub use types::{BlobBackend, HttpResponse, QueryBackend, TransportError};

#[cfg(test)]
pub use http::tests::MockAsyncHttpClient;
