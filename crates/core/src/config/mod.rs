//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELLCACHE_*)
//! 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELLCACHE_*)
/// 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Build version identifier embedded in every store name.
    ///
    /// Set via SHELLCACHE_VERSION; must change on every deployment.
    #[serde(default = "default_version")]
    pub version: String,

    /// Base location of the application (the directory holding the entry
    /// document and the worker script).
    ///
    /// Set via SHELLCACHE_SCOPE_URL environment variable.
    #[serde(default = "default_scope_url")]
    pub scope_url: String,

    /// Entry document, relative to the scope.
    #[serde(default = "default_entry_document")]
    pub entry_document: String,

    /// Metadata file that is always precached, relative to the scope.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    /// The interceptor's own script, never precached, relative to the scope.
    #[serde(default = "default_worker_script")]
    pub worker_script: String,

    /// Path to SQLite cache database.
    ///
    /// Set via SHELLCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address the HTTP front listens on.
    ///
    /// Set via SHELLCACHE_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP transport timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_version() -> String {
    concat!("shellcache-", env!("CARGO_PKG_VERSION")).into()
}

fn default_scope_url() -> String {
    "http://127.0.0.1:8080/".into()
}

fn default_entry_document() -> String {
    "index.html".into()
}

fn default_metadata_file() -> String {
    "manifest.json".into()
}

fn default_worker_script() -> String {
    "sw.js".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shellcache.sqlite")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_user_agent() -> String {
    "shellcache/0.1".into()
}

fn default_max_bytes() -> usize {
    20_971_520 // 20MB
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            scope_url: default_scope_url(),
            entry_document: default_entry_document(),
            metadata_file: default_metadata_file(),
            worker_script: default_worker_script(),
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHELLCACHE_`
    /// 2. TOML file from `SHELLCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELLCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELLCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.version.starts_with("shellcache-"));
        assert_eq!(config.scope_url, "http://127.0.0.1:8080/");
        assert_eq!(config.entry_document, "index.html");
        assert_eq!(config.metadata_file, "manifest.json");
        assert_eq!(config.worker_script, "sw.js");
        assert_eq!(config.db_path, PathBuf::from("./shellcache.sqlite"));
        assert_eq!(config.listen_addr, "127.0.0.1:8787");
        assert_eq!(config.max_bytes, 20_971_520);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_load_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "shellcache.toml",
                r#"
                version = "from-file"
                scope_url = "https://app.example/explorer/"
                "#,
            )?;
            jail.set_env("SHELLCACHE_CONFIG_FILE", "shellcache.toml");
            jail.set_env("SHELLCACHE_VERSION", "from-env");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.version, "from-env");
            assert_eq!(config.scope_url, "https://app.example/explorer/");
            assert_eq!(config.entry_document, "index.html");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_scope() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SHELLCACHE_SCOPE_URL", "not a url");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "scope_url"));
            Ok(())
        });
    }
}
