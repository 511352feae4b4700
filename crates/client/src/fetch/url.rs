//! URL normalization and origin filtering for discovered references.

use url::Url;

/// Error type for URL normalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty reference")]
    Empty,

    #[error("unresolvable reference {reference:?}: {reason}")]
    Unresolvable { reference: String, reason: String },
}

/// Resolve a raw reference against `base` into a canonical absolute URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Resolve relative to `base`
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
pub fn normalize(raw: &str, base: &Url) -> Result<Url, UrlError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut resolved = base
        .join(trimmed)
        .map_err(|e| UrlError::Unresolvable { reference: trimmed.to_string(), reason: e.to_string() })?;

    resolved.set_fragment(None);

    Ok(resolved)
}

/// Whether `url` has the same (scheme, host, port) origin as `base`.
///
/// Opaque origins (`data:`, `mailto:`, `javascript:`) never match.
pub fn is_same_origin(url: &Url, base: &Url) -> bool {
    let origin = url.origin();
    origin.is_tuple() && origin == base.origin()
}
