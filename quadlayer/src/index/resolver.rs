//! Quad-tree index resolver.
//!
//! Answers "which data handle holds tile X" by fetching index fragments from
//! the query service and caching them per layer.
//!
//! # Fragment selection
//!
//! A fragment rooted at `R` covers `R` and every descendant up to
//! [`INDEX_DEPTH`] levels below it. To find a fragment for tile `T` the
//! resolver checks the cache for the ancestors of `T` from `INDEX_DEPTH`
//! levels up down to `T` itself, coarsest first, and uses the first one
//! cached. On a complete miss it fetches the fragment rooted `INDEX_DEPTH`
//! levels above `T`.
//!
//! # Concurrency
//!
//! Fetches are not coalesced: two tasks missing the same fragment both hit
//! the backend. The cache write is guarded instead; whichever task stores
//! first wins and the other returns the stored fragment.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::error::ResolveResult;
use super::map::{parse_index, IndexMap};
use crate::cache::{CacheStats, LruCache, DEFAULT_CAPACITY_MB};
use crate::provider::QueryBackend;
use crate::quadkey::{compute_parent_key, to_morton, QuadKey};

/// Depth of the fragments requested from the query service.
pub const INDEX_DEPTH: u8 = 4;

/// Result of an aggregated lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedDataHandle {
    pub data_handle: String,
    /// The tile the handle belongs to: the requested key or an ancestor
    pub quad_key: QuadKey,
}

/// Resolves tiles of one layer to data handles.
pub struct QuadTreeIndexResolver<Q: QueryBackend> {
    backend: Q,
    layer_id: String,
    version: Option<i64>,
    cache: Mutex<LruCache<String, Arc<IndexMap>>>,
}

impl<Q: QueryBackend> QuadTreeIndexResolver<Q> {
    /// Creates a resolver with the default cache capacity.
    ///
    /// # Arguments
    ///
    /// * `backend` - Query service client
    /// * `layer_id` - Layer whose index is resolved
    /// * `version` - Layer version for versioned layers, `None` for volatile
    pub fn new(backend: Q, layer_id: impl Into<String>, version: Option<i64>) -> Self {
        Self::with_cache_capacity_mb(backend, layer_id, version, DEFAULT_CAPACITY_MB)
    }

    /// Creates a resolver whose fragment cache holds `capacity_mb` megabytes.
    pub fn with_cache_capacity_mb(
        backend: Q,
        layer_id: impl Into<String>,
        version: Option<i64>,
        capacity_mb: usize,
    ) -> Self {
        let cache = LruCache::new(capacity_mb, |map: &Arc<IndexMap>| map.approximate_size());
        Self {
            backend,
            layer_id: layer_id.into(),
            version,
            cache: Mutex::new(cache),
        }
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn index_depth(&self) -> u8 {
        INDEX_DEPTH
    }

    /// Data handle of exactly `key`, or `None` if the tile has no data.
    pub async fn get_data_handle(&self, key: &QuadKey) -> ResolveResult<Option<String>> {
        let map = self.get_index_for(key).await?;
        Ok(map.get_key(key).map(str::to_string))
    }

    /// Data handle of `key` or, failing that, of its nearest ancestor that
    /// has one.
    ///
    /// Walks from `key` up to the root within the fragment covering `key`.
    /// Returns `None` if no tile on that path is populated.
    pub async fn get_aggregated_data_handle(
        &self,
        key: &QuadKey,
    ) -> ResolveResult<Option<AggregatedDataHandle>> {
        let map = self.get_index_for(key).await?;

        let mut current = *key;
        loop {
            if let Some(handle) = map.get_key(&current) {
                return Ok(Some(AggregatedDataHandle {
                    data_handle: handle.to_string(),
                    quad_key: current,
                }));
            }
            if current.is_root() {
                return Ok(None);
            }
            current = current.parent();
        }
    }

    /// Returns a fragment covering `key`, from cache or from the backend.
    pub async fn get_index_for(&self, key: &QuadKey) -> ResolveResult<Arc<IndexMap>> {
        QuadKey::try_new(key.row, key.column, key.level)?;

        if let Some((root, map)) = self.cached_covering(key) {
            trace!(
                layer = %self.layer_id,
                tile = %key,
                root = to_morton(&root),
                "Index fragment cache hit"
            );
            return Ok(map);
        }

        let root = compute_parent_key(key, INDEX_DEPTH);
        self.download_index(&root).await
    }

    /// Fetches, parses and caches the fragment rooted at `root`.
    ///
    /// If another task cached the same fragment while this fetch was in
    /// flight, the cached fragment is returned and this one is dropped.
    pub async fn download_index(&self, root: &QuadKey) -> ResolveResult<Arc<IndexMap>> {
        QuadKey::try_new(root.row, root.column, root.level)?;

        let code = to_morton(root);
        debug!(
            layer = %self.layer_id,
            root = code,
            depth = INDEX_DEPTH,
            version = ?self.version,
            "Fetching quad-tree index"
        );

        let response = self
            .backend
            .fetch_quad_tree_index(&self.layer_id, &code.to_string(), INDEX_DEPTH, self.version)
            .await?;
        let map = Arc::new(parse_index(root, &response));

        let key = self.cache_key(root);
        let mut cache = self.cache.lock();
        if let Some(existing) = cache.peek(&key) {
            debug!(
                layer = %self.layer_id,
                root = code,
                "Index fragment cached by a concurrent fetch, discarding ours"
            );
            return Ok(Arc::clone(existing));
        }

        debug!(
            layer = %self.layer_id,
            root = code,
            entries = map.len(),
            "Caching index fragment"
        );
        if let Err(e) = cache.set(key, Arc::clone(&map)) {
            warn!(
                layer = %self.layer_id,
                root = code,
                error = %e,
                "Index fragment not cached"
            );
        }

        Ok(map)
    }

    /// Drops every cached fragment.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Resizes the fragment cache, evicting immediately if needed.
    pub fn set_cache_capacity_mb(&self, capacity_mb: usize) {
        self.cache.lock().set_capacity(capacity_mb);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn cached_fragment_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether the fragment rooted at `root` is cached. Does not affect
    /// recency.
    pub fn is_cached(&self, root: &QuadKey) -> bool {
        self.cache.lock().has(&self.cache_key(root))
    }

    /// Coarsest cached fragment covering `key`, promoted to most recently
    /// used. Counts as one cache hit or one miss however many ancestors are
    /// probed.
    fn cached_covering(&self, key: &QuadKey) -> Option<(QuadKey, Arc<IndexMap>)> {
        let mut cache = self.cache.lock();
        let mut previous = None;

        for depth in (0..=INDEX_DEPTH).rev() {
            let root = compute_parent_key(key, depth);
            // Shallow keys floor at the root several times
            if previous == Some(root) {
                continue;
            }
            previous = Some(root);

            let cache_key = self.cache_key(&root);
            if cache.has(&cache_key) {
                return cache.get(&cache_key).cloned().map(|map| (root, map));
            }
        }

        let fetch_root = compute_parent_key(key, INDEX_DEPTH);
        let _ = cache.get(&self.cache_key(&fetch_root));
        None
    }

    fn cache_key(&self, root: &QuadKey) -> String {
        format!("{}/{}", self.layer_id, to_morton(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ParentQuad, QuadTreeIndex, ResolveError, SubQuad};
    use crate::provider::TransportError;
    use crate::quadkey::QuadKeyError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Query backend serving canned fragments keyed by root Morton code.
    #[derive(Default)]
    struct MockQueryBackend {
        fragments: HashMap<String, QuadTreeIndex>,
        failure: Option<TransportError>,
        calls: AtomicUsize,
        requests: parking_lot::Mutex<Vec<(String, String, u8, Option<i64>)>>,
    }

    impl MockQueryBackend {
        fn with_fragment(mut self, root: u64, index: QuadTreeIndex) -> Self {
            self.fragments.insert(root.to_string(), index);
            self
        }

        fn failing(error: TransportError) -> Self {
            Self {
                failure: Some(error),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl QueryBackend for MockQueryBackend {
        async fn fetch_quad_tree_index(
            &self,
            layer_id: &str,
            root_morton: &str,
            depth: u8,
            version: Option<i64>,
        ) -> Result<QuadTreeIndex, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push((
                layer_id.to_string(),
                root_morton.to_string(),
                depth,
                version,
            ));
            // Let concurrent callers interleave at the fetch boundary
            tokio::task::yield_now().await;
            if let Some(error) = &self.failure {
                return Err(error.clone());
            }
            Ok(self.fragments.get(root_morton).cloned().unwrap_or_default())
        }
    }

    /// Fragment rooted at (101, 137, 8) with two populated descendants.
    fn scenario_fragment() -> QuadTreeIndex {
        QuadTreeIndex {
            sub_quads: Some(vec![
                SubQuad::new("19", "da5a1b"),
                SubQuad::new("79", "edac2f"),
            ]),
            parent_quads: None,
        }
    }

    /// Level 12 descendant of (405, 549, 10), whose fragment root is 92259.
    fn deep_tile() -> QuadKey {
        QuadKey::new(405 * 4 + 2, 549 * 4 + 1, 12)
    }

    #[tokio::test]
    async fn test_fetches_fragment_four_levels_up() {
        let backend = MockQueryBackend::default().with_fragment(92259, scenario_fragment());
        let resolver = QuadTreeIndexResolver::new(backend, "roads", Some(7));

        let handle = resolver.get_data_handle(&deep_tile()).await.unwrap();

        assert_eq!(handle, None);
        assert_eq!(
            resolver.backend.requests.lock()[0],
            ("roads".to_string(), "92259".to_string(), 4, Some(7))
        );
        assert!(resolver.is_cached(&QuadKey::new(101, 137, 8)));
    }

    #[tokio::test]
    async fn test_cached_ancestor_fragment_is_reused() {
        let backend = MockQueryBackend::default().with_fragment(92259, scenario_fragment());
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        resolver.get_data_handle(&deep_tile()).await.unwrap();
        let tile = QuadKey::new(405, 549, 10);
        let handle = resolver.get_data_handle(&tile).await.unwrap();
        let again = resolver.get_data_handle(&tile).await.unwrap();

        assert_eq!(handle.as_deref(), Some("da5a1b"));
        assert_eq!(again.as_deref(), Some("da5a1b"));
        assert_eq!(resolver.backend.calls(), 1);
        assert_eq!(resolver.cached_fragment_count(), 1);
    }

    #[tokio::test]
    async fn test_aggregated_lookup_walks_to_ancestor() {
        let backend = MockQueryBackend::default().with_fragment(92259, scenario_fragment());
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        let result = resolver
            .get_aggregated_data_handle(&deep_tile())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.data_handle, "da5a1b");
        assert_eq!(result.quad_key, QuadKey::new(405, 549, 10));
    }

    #[tokio::test]
    async fn test_aggregated_lookup_prefers_exact_tile() {
        // 313 is the deep tile relative to 92259: (6, 5, 4)
        let fragment = QuadTreeIndex {
            sub_quads: Some(vec![
                SubQuad::new("1", "fragment-root"),
                SubQuad::new("19", "mid"),
                SubQuad::new("313", "exact"),
            ]),
            parent_quads: None,
        };
        let backend = MockQueryBackend::default().with_fragment(92259, fragment);
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        let result = resolver
            .get_aggregated_data_handle(&deep_tile())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.data_handle, "exact");
        assert_eq!(result.quad_key, deep_tile());
    }

    #[tokio::test]
    async fn test_aggregated_lookup_uses_parent_quads() {
        let fragment = QuadTreeIndex {
            sub_quads: Some(vec![]),
            parent_quads: Some(vec![ParentQuad::new("22", "coarse")]),
        };
        let backend = MockQueryBackend::default().with_fragment(92259, fragment);
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        let result = resolver
            .get_aggregated_data_handle(&deep_tile())
            .await
            .unwrap()
            .unwrap();

        // 22 = level 2, row 1, column 2
        assert_eq!(result.quad_key, QuadKey::new(1, 2, 2));
        assert!(result.quad_key.is_ancestor_of(&deep_tile()));
        assert_eq!(result.data_handle, "coarse");
    }

    #[tokio::test]
    async fn test_aggregated_lookup_falls_back_to_world_root() {
        let fragment = QuadTreeIndex {
            sub_quads: Some(vec![]),
            parent_quads: Some(vec![ParentQuad::new("1", "world")]),
        };
        let backend = MockQueryBackend::default().with_fragment(92259, fragment);
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        let result = resolver
            .get_aggregated_data_handle(&deep_tile())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.quad_key, QuadKey::ROOT);
        assert_eq!(result.data_handle, "world");
    }

    #[tokio::test]
    async fn test_coarsest_cached_fragment_wins() {
        let fine = QuadTreeIndex {
            sub_quads: Some(vec![SubQuad::new("1", "fine")]),
            parent_quads: None,
        };
        let backend = MockQueryBackend::default()
            .with_fragment(92259, scenario_fragment())
            .with_fragment(1_476_147, fine);
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        let coarse = resolver.download_index(&QuadKey::new(101, 137, 8)).await.unwrap();
        let other = resolver.download_index(&QuadKey::new(405, 549, 10)).await.unwrap();
        assert_eq!(resolver.cached_fragment_count(), 2);

        let map = resolver.get_index_for(&deep_tile()).await.unwrap();

        assert!(Arc::ptr_eq(&map, &coarse));
        assert!(!Arc::ptr_eq(&map, &other));
        assert_eq!(map.get_key(&QuadKey::new(405, 549, 10)), Some("da5a1b"));
        assert_eq!(resolver.backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_lookup_counts_one_hit_or_miss() {
        let backend = MockQueryBackend::default().with_fragment(92259, scenario_fragment());
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        resolver.download_index(&QuadKey::new(101, 137, 8)).await.unwrap();
        resolver.get_index_for(&QuadKey::new(405, 549, 10)).await.unwrap();

        let stats = resolver.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);

        // Every candidate root of a level 1 tile but one is the world root
        let resolver = QuadTreeIndexResolver::new(MockQueryBackend::default(), "roads", None);
        let shallow = QuadKey::new(0, 0, 1);
        resolver.get_index_for(&shallow).await.unwrap();
        resolver.get_index_for(&shallow).await.unwrap();

        let stats = resolver.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(resolver.backend.calls(), 1);
        assert_eq!(resolver.backend.requests.lock()[0].1, "1");
    }

    #[tokio::test]
    async fn test_aggregated_lookup_absent_when_nothing_populated() {
        let resolver = QuadTreeIndexResolver::new(MockQueryBackend::default(), "roads", None);

        let result = resolver.get_aggregated_data_handle(&deep_tile()).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_empty_fragment_yields_absent_and_is_cached() {
        let resolver = QuadTreeIndexResolver::new(MockQueryBackend::default(), "roads", None);

        assert_eq!(resolver.get_data_handle(&deep_tile()).await.unwrap(), None);
        assert_eq!(resolver.get_data_handle(&deep_tile()).await.unwrap(), None);
        assert_eq!(resolver.backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_shallow_tiles_use_root_fragment() {
        let fragment = QuadTreeIndex {
            sub_quads: Some(vec![SubQuad::new("19", "shallow")]),
            parent_quads: None,
        };
        let backend = MockQueryBackend::default().with_fragment(1, fragment);
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        let handle = resolver.get_data_handle(&QuadKey::new(1, 1, 2)).await.unwrap();

        assert_eq!(handle.as_deref(), Some("shallow"));
        assert_eq!(resolver.backend.requests.lock()[0].1, "1");
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_fetch() {
        let resolver = QuadTreeIndexResolver::new(MockQueryBackend::default(), "roads", None);

        let result = resolver.get_data_handle(&QuadKey::new(4, 0, 2)).await;

        assert_eq!(
            result,
            Err(ResolveError::InvalidQuadKey(QuadKeyError::OutOfRange {
                row: 4,
                column: 0,
                level: 2
            }))
        );
        assert_eq!(resolver.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_errors_propagate_and_cache_nothing() {
        let error = TransportError::Status {
            status: 503,
            url: "q".to_string(),
        };
        let resolver = QuadTreeIndexResolver::new(MockQueryBackend::failing(error.clone()), "roads", None);

        let result = resolver.get_data_handle(&deep_tile()).await;

        assert_eq!(result, Err(ResolveError::Transport(error)));
        assert_eq!(resolver.cached_fragment_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_twice_cache_once() {
        let backend = MockQueryBackend::default().with_fragment(92259, scenario_fragment());
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);
        let tile = deep_tile();

        let (a, b) = tokio::join!(resolver.get_index_for(&tile), resolver.get_index_for(&tile));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(resolver.backend.calls(), 2);
        assert_eq!(resolver.cached_fragment_count(), 1);
        assert!(Arc::ptr_eq(&a, &b), "loser should return the winner's fragment");
    }

    #[tokio::test]
    async fn test_fragment_too_large_is_returned_uncached() {
        let backend = MockQueryBackend::default().with_fragment(92259, scenario_fragment());
        let resolver = QuadTreeIndexResolver::with_cache_capacity_mb(backend, "roads", None, 0);
        let tile = QuadKey::new(405, 549, 10);

        let map = resolver.download_index(&QuadKey::new(101, 137, 8)).await.unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(resolver.cached_fragment_count(), 0);
        assert_eq!(resolver.get_data_handle(&tile).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let backend = MockQueryBackend::default().with_fragment(92259, scenario_fragment());
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        resolver.get_data_handle(&deep_tile()).await.unwrap();
        resolver.clear_cache();
        resolver.get_data_handle(&deep_tile()).await.unwrap();

        assert_eq!(resolver.backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_keys_are_per_layer_and_root() {
        let resolver = QuadTreeIndexResolver::new(MockQueryBackend::default(), "roads", None);
        assert_eq!(resolver.cache_key(&QuadKey::new(101, 137, 8)), "roads/92259");
        assert_eq!(resolver.cache_key(&QuadKey::ROOT), "roads/1");
    }

    #[tokio::test]
    async fn test_set_cache_capacity_evicts() {
        let backend = MockQueryBackend::default().with_fragment(92259, scenario_fragment());
        let resolver = QuadTreeIndexResolver::new(backend, "roads", None);

        resolver.get_data_handle(&deep_tile()).await.unwrap();
        assert_eq!(resolver.cached_fragment_count(), 1);

        resolver.set_cache_capacity_mb(0);
        assert_eq!(resolver.cached_fragment_count(), 0);
        assert_eq!(resolver.cache_stats().evictions, 1);
    }
}
