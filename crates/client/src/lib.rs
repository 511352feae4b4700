//! Client code for shellcache.
//!
//! This crate provides the network fetch layer, URL normalization and
//! asset discovery shared by the worker lifecycle.

pub mod discover;
pub mod fetch;

pub use discover::{AssetManifest, discover_assets};
pub use fetch::{FetchClient, FetchConfig, Network, UrlError, is_same_origin, normalize};
