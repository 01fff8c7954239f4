//! Blob downloads over HTTP.
//!
//! # URL Pattern
//!
//! `{base}/layers/{layer}/data/{dataHandle}`

use tracing::debug;

use super::http::{get_authorized, AsyncHttpClient};
use super::types::{BlobBackend, TransportError};

/// [`BlobBackend`] talking to the blob service over HTTP.
pub struct HttpBlobBackend<C: AsyncHttpClient> {
    http_client: C,
    base_url: String,
    bearer_token: Option<String>,
}

impl<C: AsyncHttpClient> HttpBlobBackend<C> {
    /// Creates a backend for the blob service at `base_url`.
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

    fn build_url(&self, layer_id: &str, data_handle: &str) -> String {
        format!("{}/layers/{}/data/{}", self.base_url, layer_id, data_handle)
    }
}

impl<C: AsyncHttpClient> BlobBackend for HttpBlobBackend<C> {
    async fn get_blob(
        &self,
        layer_id: &str,
        data_handle: &str,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let url = self.build_url(layer_id, data_handle);
        debug!(url = %url, "Downloading blob");

        get_authorized(&self.http_client, &url, self.bearer_token.as_deref())
            .await?
            .into_body(&url)
    }
}
