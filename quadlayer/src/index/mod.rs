//! Quad-tree index resolution.
//!
//! The query service describes which tiles of a layer carry data as index
//! fragments: a root tile plus the populated tiles up to a fixed depth below
//! it. This module decodes those fragments ([`QuadTreeIndex`]), flattens
//! them into Morton-keyed lookups ([`IndexMap`]) and resolves individual
//! tiles through a cache of fragments ([`QuadTreeIndexResolver`]).

mod error;
mod map;
mod resolver;
mod types;

pub use error::{ResolveError, ResolveResult};
pub use map::{parse_index, IndexMap, ENTRY_OVERHEAD_BYTES};
pub use resolver::{AggregatedDataHandle, QuadTreeIndexResolver, INDEX_DEPTH};
pub use types::{ParentQuad, QuadTreeIndex, SubQuad};
