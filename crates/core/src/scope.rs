//! Scope layout and versioned store naming.

use url::{Origin, Url};

use crate::Error;
use crate::config::AppConfig;

/// Resolved locations of the application the worker controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Site root; always ends with `/`.
    pub root: Url,
    pub entry_document: Url,
    pub metadata_file: Url,
    pub worker_script: Url,
}

impl Scope {
    /// Resolve the well-known paths against `scope_url`.
    pub fn new(scope_url: &str, entry_document: &str, metadata_file: &str, worker_script: &str) -> Result<Self, Error> {
        let mut root = Url::parse(scope_url).map_err(|e| Error::InvalidUrl(format!("{scope_url}: {e}")))?;
        root.set_fragment(None);
        root.set_query(None);
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }

        let resolve = |rel: &str| root.join(rel).map_err(|e| Error::InvalidUrl(format!("{rel}: {e}")));

        Ok(Self {
            entry_document: resolve(entry_document)?,
            metadata_file: resolve(metadata_file)?,
            worker_script: resolve(worker_script)?,
            root,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(&config.scope_url, &config.entry_document, &config.metadata_file, &config.worker_script)
    }

    pub fn origin(&self) -> Origin {
        self.root.origin()
    }
}

/// Names of the three stores belonging to one version.
///
/// Each name is a role prefix joined to the version identifier; activation
/// compares names against the version, so this layout must stay stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNames {
    version: String,
}

impl StoreNames {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into() }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn precache(&self) -> String {
        format!("precache-{}", self.version)
    }

    pub fn staging(&self) -> String {
        format!("temp-{}", self.version)
    }

    pub fn runtime(&self) -> String {
        format!("runtime-{}", self.version)
    }

    /// Whether a store name belongs to this version.
    pub fn owns(&self, store_name: &str) -> bool {
        store_name.contains(&self.version)
    }
}
