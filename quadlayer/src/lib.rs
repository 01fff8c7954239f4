//! QuadLayer - tiled map data access over a quad-tree index
//!
//! This library resolves quad-tree tiles of a layer to the data handles
//! holding their content and downloads the blobs behind them. Index
//! fragments are fetched from a query service and kept in a byte-bounded
//! LRU cache, so neighbouring tiles resolve without further requests.
//!
//! # Modules
//!
//! - [`quadkey`] - tile addresses, Morton codes and quadkey strings
//! - [`cache`] - byte-bounded LRU cache
//! - [`index`] - index fragments and the resolver
//! - [`provider`] - query and blob service backends
//! - [`client`] - per-layer facade
//! - [`config`] - client configuration
//! - [`logging`] - tracing setup

pub mod cache;
pub mod client;
pub mod config;
pub mod index;
pub mod logging;
pub mod provider;
pub mod quadkey;
