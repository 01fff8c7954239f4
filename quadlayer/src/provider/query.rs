//! Quad-tree index queries over HTTP.
//!
//! # URL Pattern
//!
//! Versioned layers:
//! `{base}/layers/{layer}/versions/{version}/quadkeys/{code}/depths/{depth}`
//!
//! Volatile layers:
//! `{base}/layers/{layer}/quadkeys/{code}/depths/{depth}`
//!
//! `{code}` is the decimal Morton code of the fragment root. The body is
//! JSON with optional `subQuads` and `parentQuads` arrays; a 204 response
//! decodes to an empty index.

use tracing::debug;

use super::http::{get_authorized, AsyncHttpClient};
use super::types::{QueryBackend, TransportError};
use crate::index::QuadTreeIndex;

/// [`QueryBackend`] talking to the query service over HTTP.
pub struct HttpQueryBackend<C: AsyncHttpClient> {
    http_client: C,
    base_url: String,
    bearer_token: Option<String>,
}

impl<C: AsyncHttpClient> HttpQueryBackend<C> {
    /// Creates a backend for the query service at `base_url`.
    pub fn new(http_client: C, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: None,
        }
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn build_url(&self, layer_id: &str, root_morton: &str, depth: u8, version: Option<i64>) -> String {
        match version {
            Some(version) => format!(
                "{}/layers/{}/versions/{}/quadkeys/{}/depths/{}",
                self.base_url, layer_id, version, root_morton, depth
            ),
            None => format!(
                "{}/layers/{}/quadkeys/{}/depths/{}",
                self.base_url, layer_id, root_morton, depth
            ),
        }
    }
}

impl<C: AsyncHttpClient> QueryBackend for HttpQueryBackend<C> {
    async fn fetch_quad_tree_index(
        &self,
        layer_id: &str,
        root_morton: &str,
        depth: u8,
        version: Option<i64>,
    ) -> Result<QuadTreeIndex, TransportError> {
        let url = self.build_url(layer_id, root_morton, depth, version);
        debug!(url = %url, "Requesting quad-tree index");

        let response = get_authorized(&self.http_client, &url, self.bearer_token.as_deref()).await?;
        match response.into_body(&url)? {
            Some(body) => serde_json::from_slice(&body).map_err(|e| {
                TransportError::InvalidResponse(format!("quad-tree index from {}: {}", url, e))
            }),
            None => Ok(QuadTreeIndex::default()),
        }
    }
}
