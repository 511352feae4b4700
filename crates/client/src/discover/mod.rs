//! Asset discovery from the entry document.
//!
//! ### Algorithm
//! - Apply a fixed list of case-insensitive attribute patterns to the raw
//!   markup (no parser; malformed markup still yields whatever matches).
//! - Normalize every capture against the document URL, keep same-origin
//!   references only.
//! - Always add the site root, the entry document and the metadata file;
//!   always remove the worker script.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use shellcache_core::Scope;
use url::Url;

use crate::fetch::{is_same_origin, normalize};

/// Attribute patterns applied in order; group 1 is the reference.
static ASSET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)<script[^>]+src=["']([^"']+)["']"#,
        r#"(?i)<link[^>]+href=["']([^"']+)["']"#,
        r#"(?i)<img[^>]+src=["']([^"']+)["']"#,
        r#"(?i)<source[^>]+src=["']([^"']+)["']"#,
        r#"(?i)<video[^>]+src=["']([^"']+)["']"#,
        r#"(?i)src=["']([^"']+)["']"#,
        r#"(?i)href=["']([^"']+)["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid asset pattern"))
    .collect()
});

/// Deduplicated set of canonical same-origin URLs to precache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
    urls: BTreeSet<Url>,
}

impl AssetManifest {
    pub fn insert(&mut self, url: Url) -> bool {
        self.urls.insert(url)
    }

    pub fn remove(&mut self, url: &Url) -> bool {
        self.urls.remove(url)
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.urls.iter()
    }
}

impl IntoIterator for AssetManifest {
    type Item = Url;
    type IntoIter = std::collections::btree_set::IntoIter<Url>;

    fn into_iter(self) -> Self::IntoIter {
        self.urls.into_iter()
    }
}

/// Build the precache manifest for an entry document.
///
/// `document_url` is the base for relative references and defines the origin
/// that discovered references must share.
pub fn discover_assets(html: &str, document_url: &Url, scope: &Scope) -> AssetManifest {
    let mut manifest = AssetManifest::default();

    for pattern in ASSET_PATTERNS.iter() {
        for captures in pattern.captures_iter(html) {
            let Some(reference) = captures.get(1) else { continue };
            match normalize(reference.as_str(), document_url) {
                Ok(url) if is_same_origin(&url, document_url) => {
                    manifest.insert(url);
                }
                Ok(url) => tracing::trace!(%url, "skipping cross-origin reference"),
                Err(e) => tracing::trace!(error = %e, "skipping unresolvable reference"),
            }
        }
    }

    manifest.insert(scope.root.clone());
    manifest.insert(scope.entry_document.clone());
    manifest.insert(scope.metadata_file.clone());
    manifest.remove(&scope.worker_script);

    tracing::debug!(assets = manifest.len(), document = %document_url, "discovered precache manifest");

    manifest
}
