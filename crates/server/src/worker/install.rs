//! Install: build a complete cache generation in a staging store, then
//! promote it to the precache store.
//!
//! Phases: `idle → staging → validating → committing → done | failed`.
//! Any network failure or non-success status aborts the install before the
//! precache store is touched, so a version is never partially cached.

use serde::Serialize;
use shellcache_client::{AssetManifest, Network, discover_assets};
use shellcache_core::{CacheDb, CachedResponse, Error, FetchRequest, RequestKey, Scope, StoreNames};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallPhase {
    Idle,
    Staging,
    Validating,
    Committing,
    Done,
    Failed,
}

/// Outcome of a successful install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub version: String,
    pub manifest: AssetManifest,
    pub precached: usize,
}

struct PhaseTracker<'a> {
    version: &'a str,
    phase: InstallPhase,
}

impl PhaseTracker<'_> {
    fn enter(&mut self, next: InstallPhase) {
        tracing::info!(version = self.version, from = ?self.phase, to = ?next, "install phase");
        self.phase = next;
    }
}

/// Run one install cycle for the version named by `names`.
///
/// # Errors
///
/// Returns the first fetch or storage error; the precache store is left as it
/// was and the staging store is abandoned.
pub async fn install(
    db: &CacheDb, network: &dyn Network, scope: &Scope, names: &StoreNames,
) -> Result<InstallReport, Error> {
    let mut tracker = PhaseTracker { version: names.version(), phase: InstallPhase::Idle };

    match run(db, network, scope, names, &mut tracker).await {
        Ok(report) => {
            tracker.enter(InstallPhase::Done);
            tracing::info!(
                version = names.version(),
                precached = report.precached,
                "install complete, precache built"
            );
            Ok(report)
        }
        Err(e) => {
            tracing::error!(version = names.version(), phase = ?tracker.phase, error = %e, "install failed");
            tracker.enter(InstallPhase::Failed);
            Err(e)
        }
    }
}

async fn run(
    db: &CacheDb, network: &dyn Network, scope: &Scope, names: &StoreNames, tracker: &mut PhaseTracker<'_>,
) -> Result<InstallReport, Error> {
    tracker.enter(InstallPhase::Staging);
    let staging = names.staging();
    if db.delete_store(&staging).await? {
        tracing::debug!(store = %staging, "discarded leftover staging store");
    }
    db.open_store(&staging).await?;

    let entry = fetch_for_precache(network, &scope.entry_document).await?;
    db.put(&staging, &RequestKey::get(scope.entry_document.clone()), &entry)
        .await?;
    let manifest = discover_assets(&entry.text(), &scope.entry_document, scope);

    tracker.enter(InstallPhase::Validating);
    for url in manifest.iter() {
        if *url == scope.worker_script {
            continue;
        }
        let response = fetch_for_precache(network, url).await?;
        db.put(&staging, &RequestKey::get(url.clone()), &response).await?;
    }

    tracker.enter(InstallPhase::Committing);
    let precached = db.promote_store(&staging, &names.precache()).await?;

    Ok(InstallReport { version: names.version().to_string(), manifest, precached })
}

/// Fetch bypassing caches; only success statuses are acceptable.
async fn fetch_for_precache(network: &dyn Network, url: &Url) -> Result<CachedResponse, Error> {
    let response = network.fetch(&FetchRequest::get(url.clone()).no_store()).await?;
    if !response.is_success() {
        return Err(Error::HttpError(format!("{url}: status {}", response.status)));
    }
    Ok(response)
}
