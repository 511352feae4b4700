//! SQLite-backed cache storage.
//!
//! This module provides persistent, named cache stores using SQLite with
//! async access via tokio-rusqlite. It supports:
//!
//! - Request-identity keyed entries (SHA-256 of method + URL)
//! - Whole-store deletion with entry cascade
//! - The persisted active registration
//! - Automatic schema migrations

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod registration;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use registration::Registration;
