use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ClientError, ClientResult};
use crate::cache::CacheStats;
use crate::config::{ClientConfig, ConfigError, LayerKind};
use crate::index::{AggregatedDataHandle, QuadTreeIndexResolver};
use crate::provider::{
    AsyncReqwestClient, BlobBackend, HttpBlobBackend, HttpQueryBackend, QueryBackend,
};
use crate::quadkey::QuadKey;

/// Tile data found by an aggregated lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedTile {
    pub data: Vec<u8>,
    pub data_handle: String,
    /// The tile the data belongs to: the requested key or an ancestor
    pub quad_key: QuadKey,
}

/// Layer client talking to the real services over HTTP.
pub type HttpLayerClient =
    LayerClient<HttpQueryBackend<AsyncReqwestClient>, HttpBlobBackend<AsyncReqwestClient>>;

/// Fetches tiles of one layer.
///
/// Owns the layer's [`QuadTreeIndexResolver`], so index fragments are
/// cached per client and never shared between clients.
pub struct LayerClient<Q: QueryBackend, B: BlobBackend> {
    resolver: QuadTreeIndexResolver<Q>,
    blob_backend: B,
    layer_id: String,
    layer_kind: LayerKind,
}

impl HttpLayerClient {
    /// Builds a client with reqwest-backed query and blob backends.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        for (key, url) in [("query", &config.query_url), ("blob", &config.blob_url)] {
            if url.is_empty() {
                return Err(ConfigError::MissingKey {
                    section: "endpoints".to_string(),
                    key: key.to_string(),
                }
                .into());
            }
        }

        let http_client = AsyncReqwestClient::with_timeout(config.timeout.as_secs())?;

        let mut query_backend = HttpQueryBackend::new(http_client.clone(), &config.query_url);
        let mut blob_backend = HttpBlobBackend::new(http_client, &config.blob_url);
        if let Some(token) = &config.bearer_token {
            query_backend = query_backend.with_bearer_token(token);
            blob_backend = blob_backend.with_bearer_token(token);
        }

        info!(
            catalog = %config.catalog,
            layer = %config.layer_id,
            kind = ?config.layer_kind,
            cache_mb = config.cache_capacity_mb,
            "Layer client created"
        );

        Ok(Self::with_cache_capacity_mb(
            query_backend,
            blob_backend,
            config.layer_id.clone(),
            config.layer_kind,
            config.cache_capacity_mb,
        ))
    }
}

impl<Q: QueryBackend, B: BlobBackend> LayerClient<Q, B> {
    /// Creates a client with the default index cache capacity.
    pub fn new(
        query_backend: Q,
        blob_backend: B,
        layer_id: impl Into<String>,
        layer_kind: LayerKind,
    ) -> Self {
        Self::with_cache_capacity_mb(
            query_backend,
            blob_backend,
            layer_id,
            layer_kind,
            crate::cache::DEFAULT_CAPACITY_MB,
        )
    }

    pub fn with_cache_capacity_mb(
        query_backend: Q,
        blob_backend: B,
        layer_id: impl Into<String>,
        layer_kind: LayerKind,
        capacity_mb: usize,
    ) -> Self {
        let layer_id = layer_id.into();
        let resolver = QuadTreeIndexResolver::with_cache_capacity_mb(
            query_backend,
            layer_id.clone(),
            layer_kind.version(),
            capacity_mb,
        );
        Self {
            resolver,
            blob_backend,
            layer_id,
            layer_kind,
        }
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }

    pub fn layer_kind(&self) -> LayerKind {
        self.layer_kind
    }

    pub fn resolver(&self) -> &QuadTreeIndexResolver<Q> {
        &self.resolver
    }

    /// Data handle of exactly `key`.
    pub async fn get_data_handle(&self, key: &QuadKey) -> ClientResult<Option<String>> {
        Ok(self.resolver.get_data_handle(key).await?)
    }

    /// Data handle of `key` or its nearest populated ancestor.
    pub async fn get_aggregated_data_handle(
        &self,
        key: &QuadKey,
    ) -> ClientResult<Option<AggregatedDataHandle>> {
        Ok(self.resolver.get_aggregated_data_handle(key).await?)
    }

    /// Downloads a blob by handle. `None` when the service has no content.
    pub async fn get_blob(&self, data_handle: &str) -> ClientResult<Option<Vec<u8>>> {
        Ok(self.blob_backend.get_blob(&self.layer_id, data_handle).await?)
    }

    /// Data of exactly `key`, or `None` if the tile is not populated.
    pub async fn get_tile(&self, key: &QuadKey) -> ClientResult<Option<Vec<u8>>> {
        let Some(handle) = self.get_data_handle(key).await? else {
            debug!(layer = %self.layer_id, tile = %key, "Tile has no data");
            return Ok(None);
        };
        self.get_blob(&handle).await
    }

    /// Data of `key` or, failing that, of its nearest populated ancestor.
    pub async fn get_aggregated_tile(&self, key: &QuadKey) -> ClientResult<Option<AggregatedTile>> {
        let Some(found) = self.get_aggregated_data_handle(key).await? else {
            debug!(layer = %self.layer_id, tile = %key, "No populated ancestor");
            return Ok(None);
        };

        if found.quad_key != *key {
            debug!(
                layer = %self.layer_id,
                tile = %key,
                resolved = %found.quad_key,
                "Falling back to ancestor tile"
            );
        }

        let data = self.get_blob(&found.data_handle).await?;
        Ok(data.map(|data| AggregatedTile {
            data,
            data_handle: found.data_handle,
            quad_key: found.quad_key,
        }))
    }

    /// [`Self::get_tile`], aborted with [`ClientError::Cancelled`] once
    /// `token` is cancelled.
    pub async fn get_tile_with_cancel(
        &self,
        key: &QuadKey,
        token: &CancellationToken,
    ) -> ClientResult<Option<Vec<u8>>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ClientError::Cancelled),
            result = self.get_tile(key) => result,
        }
    }

    /// [`Self::get_aggregated_tile`] with cancellation.
    pub async fn get_aggregated_tile_with_cancel(
        &self,
        key: &QuadKey,
        token: &CancellationToken,
    ) -> ClientResult<Option<AggregatedTile>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ClientError::Cancelled),
            result = self.get_aggregated_tile(key) => result,
        }
    }

    /// [`Self::get_blob`] with cancellation.
    pub async fn get_blob_with_cancel(
        &self,
        data_handle: &str,
        token: &CancellationToken,
    ) -> ClientResult<Option<Vec<u8>>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ClientError::Cancelled),
            result = self.get_blob(data_handle) => result,
        }
    }

    pub fn clear_cache(&self) {
        self.resolver.clear_cache();
    }

    pub fn set_cache_capacity_mb(&self, capacity_mb: usize) {
        self.resolver.set_cache_capacity_mb(capacity_mb);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.resolver.cache_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ParentQuad, QuadTreeIndex, SubQuad};
    use crate::provider::TransportError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticQueryBackend {
        index: QuadTreeIndex,
    }

    impl QueryBackend for StaticQueryBackend {
        async fn fetch_quad_tree_index(
            &self,
            _layer_id: &str,
            _root_morton: &str,
            _depth: u8,
            _version: Option<i64>,
        ) -> Result<QuadTreeIndex, TransportError> {
            Ok(self.index.clone())
        }
    }

    #[derive(Default)]
    struct MockBlobBackend {
        blobs: HashMap<String, Vec<u8>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl BlobBackend for MockBlobBackend {
        async fn get_blob(
            &self,
            layer_id: &str,
            data_handle: &str,
        ) -> Result<Option<Vec<u8>>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            assert_eq!(layer_id, "roads");
            match data_handle {
                "missing" => Err(TransportError::NotFound {
                    url: format!("blob/{}", data_handle),
                }),
                handle => Ok(self.blobs.get(handle).cloned()),
            }
        }
    }

    fn client_with(
        index: QuadTreeIndex,
        blobs: &[(&str, &str)],
    ) -> LayerClient<StaticQueryBackend, MockBlobBackend> {
        let blob_backend = MockBlobBackend {
            blobs: blobs
                .iter()
                .map(|(handle, data)| (handle.to_string(), data.as_bytes().to_vec()))
                .collect(),
            ..Default::default()
        };
        LayerClient::new(
            StaticQueryBackend { index },
            blob_backend,
            "roads",
            LayerKind::Versioned { version: 4 },
        )
    }

    fn scenario_index() -> QuadTreeIndex {
        QuadTreeIndex {
            sub_quads: Some(vec![SubQuad::new("19", "da5a1b")]),
            parent_quads: Some(vec![ParentQuad::new("22", "coarse")]),
        }
    }

    /// (405, 549, 10) plus two levels, so its fragment root is 92259.
    fn deep_tile() -> QuadKey {
        QuadKey::new(405 * 4 + 2, 549 * 4 + 1, 12)
    }

    #[tokio::test]
    async fn test_get_tile_downloads_blob() {
        let client = client_with(scenario_index(), &[("da5a1b", "tile-bytes")]);

        // Prime the level 8 fragment through a deeper tile
        client.get_data_handle(&deep_tile()).await.unwrap();
        let data = client.get_tile(&QuadKey::new(405, 549, 10)).await.unwrap();

        assert_eq!(data.as_deref(), Some(&b"tile-bytes"[..]));
    }

    #[tokio::test]
    async fn test_get_tile_without_handle_skips_download() {
        let client = client_with(scenario_index(), &[]);

        let data = client.get_tile(&deep_tile()).await.unwrap();

        assert_eq!(data, None);
        assert_eq!(client.blob_backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_aggregated_tile_reports_resolved_key() {
        let client = client_with(scenario_index(), &[("da5a1b", "ancestor")]);

        let tile = client.get_aggregated_tile(&deep_tile()).await.unwrap().unwrap();

        assert_eq!(tile.data, b"ancestor");
        assert_eq!(tile.data_handle, "da5a1b");
        assert_eq!(tile.quad_key, QuadKey::new(405, 549, 10));
    }

    #[tokio::test]
    async fn test_aggregated_tile_no_content() {
        let client = client_with(scenario_index(), &[]);

        let tile = client.get_aggregated_tile(&deep_tile()).await.unwrap();
        assert_eq!(tile, None);
    }

    #[tokio::test]
    async fn test_blob_errors_surface_as_transport() {
        let index = QuadTreeIndex {
            sub_quads: Some(vec![SubQuad::new("1", "missing")]),
            parent_quads: None,
        };
        let client = client_with(index, &[]);

        let result = client.get_tile(&QuadKey::ROOT).await;
        assert!(matches!(
            result,
            Err(ClientError::Transport(TransportError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_key_surfaces_as_resolve_error() {
        let client = client_with(scenario_index(), &[]);

        let result = client.get_tile(&QuadKey::new(0, 9, 3)).await;
        assert!(matches!(result, Err(ClientError::Resolve(_))));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let client = client_with(scenario_index(), &[("da5a1b", "x")]);
        let token = CancellationToken::new();
        token.cancel();

        let result = client.get_blob_with_cancel("da5a1b", &token).await;

        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert_eq!(client.blob_backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_download() {
        let mut client = client_with(scenario_index(), &[("da5a1b", "x")]);
        client.blob_backend.delay = Some(Duration::from_secs(60));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = client.get_aggregated_tile_with_cancel(&deep_tile(), &token).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_uncancelled_request_completes() {
        let client = client_with(scenario_index(), &[("da5a1b", "x")]);
        let token = CancellationToken::new();

        client.get_data_handle(&deep_tile()).await.unwrap();
        let result = client
            .get_tile_with_cancel(&QuadKey::new(405, 549, 10), &token)
            .await
            .unwrap();
        assert_eq!(result, Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_cache_controls_delegate_to_resolver() {
        let client = client_with(scenario_index(), &[]);

        client.get_data_handle(&deep_tile()).await.unwrap();
        assert_eq!(client.resolver().cached_fragment_count(), 1);
        assert_eq!(client.cache_stats().entry_count, 1);

        client.clear_cache();
        assert_eq!(client.resolver().cached_fragment_count(), 0);

        client.set_cache_capacity_mb(8);
        assert_eq!(client.cache_stats().capacity_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn test_from_config_requires_endpoints() {
        let config = ClientConfig::new("cat", "roads").with_query_url("https://q");

        let result = HttpLayerClient::from_config(&config);
        assert!(matches!(
            result,
            Err(ClientError::Config(ConfigError::MissingKey { .. }))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig::new("cat", "roads")
            .with_layer_kind(LayerKind::Versioned { version: 9 })
            .with_query_url("https://q")
            .with_blob_url("https://b")
            .with_bearer_token("t")
            .with_cache_capacity_mb(4);

        let client = HttpLayerClient::from_config(&config).unwrap();

        assert_eq!(client.layer_id(), "roads");
        assert_eq!(client.layer_kind(), LayerKind::Versioned { version: 9 });
        assert_eq!(client.resolver().version(), Some(9));
        assert_eq!(client.cache_stats().capacity_bytes, 4 * 1024 * 1024);
    }
}
