//! Quad-tree index response types
//!
//! These mirror the JSON returned by the query service. Only `subQuadKey`,
//! `partition` and `dataHandle` drive resolution; the remaining fields are
//! carried for callers that want them.

use serde::{Deserialize, Serialize};

/// One index fragment as returned by the query service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuadTreeIndex {
    /// Populated tiles below the fragment root, keyed relative to it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_quads: Option<Vec<SubQuad>>,

    /// Populated tiles above the fragment root, keyed absolutely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_quads: Option<Vec<ParentQuad>>,
}

/// A populated tile inside the fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuad {
    /// Morton code of the tile relative to the fragment root, as text
    pub sub_quad_key: String,
    pub data_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_metadata: Option<String>,
}

/// A populated ancestor of the fragment root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentQuad {
    /// Absolute Morton code of the tile, as text
    pub partition: String,
    pub data_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_metadata: Option<String>,
}

impl SubQuad {
    pub fn new(sub_quad_key: impl Into<String>, data_handle: impl Into<String>) -> Self {
        Self {
            sub_quad_key: sub_quad_key.into(),
            data_handle: data_handle.into(),
            version: None,
            data_size: None,
            checksum: None,
            additional_metadata: None,
        }
    }
}

impl ParentQuad {
    pub fn new(partition: impl Into<String>, data_handle: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            data_handle: data_handle.into(),
            version: None,
            data_size: None,
            checksum: None,
            additional_metadata: None,
        }
    }
}
