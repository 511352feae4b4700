//! Activation: register the version, then reap every store that doesn't
//! belong to it.

use async_trait::async_trait;
use shellcache_core::{CacheDb, Error, Registration, StoreNames};

/// Store operations activation relies on.
#[async_trait]
pub trait StoreCatalog: Send + Sync {
    async fn store_names(&self) -> Result<Vec<String>, Error>;
    async fn delete_store(&self, name: &str) -> Result<bool, Error>;
    async fn set_active_version(&self, version: &str) -> Result<Registration, Error>;
}

#[async_trait]
impl StoreCatalog for CacheDb {
    async fn store_names(&self) -> Result<Vec<String>, Error> {
        CacheDb::store_names(self).await
    }

    async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        CacheDb::delete_store(self, name).await
    }

    async fn set_active_version(&self, version: &str) -> Result<Registration, Error> {
        CacheDb::set_active_version(self, version).await
    }
}

/// Stores removed (and those that could not be) during one activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Make `names` the active version and delete all stores whose names don't
/// contain it.
///
/// The registration is written before reaping: runtime writes for an older
/// version only create stores while that version is registered, so none can
/// reappear once the listing below has been taken. Deletions are independent;
/// one failure is logged and recorded without stopping the others.
///
/// # Errors
///
/// Fails if the registration can't be written or the store listing can't be
/// read.
pub async fn activate<S: StoreCatalog + ?Sized>(stores: &S, names: &StoreNames) -> Result<ActivationReport, Error> {
    stores.set_active_version(names.version()).await?;
    let mut report = ActivationReport::default();

    for store in stores.store_names().await? {
        if names.owns(&store) {
            continue;
        }
        match stores.delete_store(&store).await {
            Ok(_) => {
                tracing::info!(store = %store, version = names.version(), "deleted stale store");
                report.deleted.push(store);
            }
            Err(e) => {
                tracing::warn!(store = %store, error = %e, "failed to delete stale store");
                report.failed.push(store);
            }
        }
    }

    Ok(report)
}
