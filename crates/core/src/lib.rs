//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Cache store implementation with SQLite backend
//! - Unified error types
//! - Configuration structures
//! - Request/response model and scope layout

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod scope;

pub use cache::{CacheDb, Registration};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use model::{CacheMode, CachedResponse, FetchRequest, RequestKey, RequestMode};
pub use scope::{Scope, StoreNames};
