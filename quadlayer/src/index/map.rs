//! Flattened view of one index fragment.

use std::collections::HashMap;
use std::mem;

use tracing::warn;

use super::types::QuadTreeIndex;
use crate::quadkey::{add_quadkeys, from_morton_str, to_morton, QuadKey};

/// Bytes charged per entry on top of the data handle text: the Morton code
/// plus the `String` header.
pub const ENTRY_OVERHEAD_BYTES: usize = mem::size_of::<u64>() + mem::size_of::<String>();

/// Mapping from absolute Morton code to data handle.
///
/// Holds every populated tile of one fetched fragment plus any populated
/// ancestors the backend reported for it. Built once by [`parse_index`] and
/// never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    entries: HashMap<u64, String>,
}

impl IndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data handle stored for a Morton code.
    pub fn get(&self, code: u64) -> Option<&str> {
        self.entries.get(&code).map(String::as_str)
    }

    /// Data handle stored for a key.
    pub fn get_key(&self, key: &QuadKey) -> Option<&str> {
        self.get(to_morton(key))
    }

    pub fn contains(&self, code: u64) -> bool {
        self.entries.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (Morton code, data handle) pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.entries.iter().map(|(code, handle)| (*code, handle.as_str()))
    }

    /// Size charged against the index cache: a fixed overhead per entry
    /// plus the length of each data handle.
    pub fn approximate_size(&self) -> usize {
        self.entries
            .values()
            .map(|handle| ENTRY_OVERHEAD_BYTES + handle.len())
            .sum()
    }
}

impl FromIterator<(u64, String)> for IndexMap {
    fn from_iter<I: IntoIterator<Item = (u64, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Builds the map for a fragment rooted at `root`.
///
/// Sub-quad keys are relative to `root` and are composed with it before
/// insertion. Parent-quad partitions are already absolute. Entries whose key
/// does not decode to a valid tile are skipped with a warning; missing
/// arrays produce an empty map.
pub fn parse_index(root: &QuadKey, index: &QuadTreeIndex) -> IndexMap {
    let mut entries = HashMap::new();

    for sub_quad in index.sub_quads.iter().flatten() {
        let absolute = from_morton_str(&sub_quad.sub_quad_key)
            .map(|sub_key| add_quadkeys(root, &sub_key))
            .and_then(|key| QuadKey::try_new(key.row, key.column, key.level));
        match absolute {
            Ok(key) => {
                entries.insert(to_morton(&key), sub_quad.data_handle.clone());
            }
            Err(e) => {
                warn!(
                    root = %root,
                    sub_quad_key = %sub_quad.sub_quad_key,
                    error = %e,
                    "Skipping sub-quad with undecodable key"
                );
            }
        }
    }

    for parent_quad in index.parent_quads.iter().flatten() {
        let key = from_morton_str(&parent_quad.partition)
            .and_then(|key| QuadKey::try_new(key.row, key.column, key.level));
        match key {
            Ok(key) => {
                entries.insert(to_morton(&key), parent_quad.data_handle.clone());
            }
            Err(e) => {
                warn!(
                    root = %root,
                    partition = %parent_quad.partition,
                    error = %e,
                    "Skipping parent-quad with undecodable partition"
                );
            }
        }
    }

    IndexMap { entries }
}
