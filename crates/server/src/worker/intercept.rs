//! Per-request routing through the layered cache/network strategy.
//!
//! Only same-origin GETs are intercepted. Routing order:
//! 1. precache hit, without touching the network
//! 2. live network; success statuses are copied into the runtime store in a
//!    detached task, every status is returned as-is
//! 3. on network failure, the runtime store
//! 4. for navigations, the precached entry document or site root
//! 5. the synthetic `503 Offline` response

use std::sync::Arc;

use serde::Serialize;
use shellcache_client::{Network, is_same_origin};
use shellcache_core::{CacheDb, CachedResponse, FetchRequest, RequestKey, Scope, StoreNames};

/// Which layer produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Precache,
    Network,
    Runtime,
    NavigationFallback,
    Offline,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Precache => "precache",
            ResponseSource::Network => "network",
            ResponseSource::Runtime => "runtime",
            ResponseSource::NavigationFallback => "navigation-fallback",
            ResponseSource::Offline => "offline",
        }
    }
}

/// Result of offering a request to the interceptor.
#[derive(Debug, Clone)]
pub enum Interception {
    /// Not ours: default handling applies.
    Passthrough,
    Respond { response: CachedResponse, source: ResponseSource },
}

/// Route one request for the version named by `names`.
pub async fn intercept(
    db: &CacheDb, network: &Arc<dyn Network>, scope: &Scope, names: &StoreNames, request: &FetchRequest,
) -> Interception {
    if !request.is_get() || !is_same_origin(&request.url, &scope.root) {
        return Interception::Passthrough;
    }

    let (response, source) = respond(db, network, scope, names, request).await;
    tracing::debug!(
        url = %request.url,
        status = response.status,
        source = source.as_str(),
        "intercepted request"
    );
    Interception::Respond { response, source }
}

async fn respond(
    db: &CacheDb, network: &Arc<dyn Network>, scope: &Scope, names: &StoreNames, request: &FetchRequest,
) -> (CachedResponse, ResponseSource) {
    let key = request.key();
    let precache = names.precache();

    if let Some(hit) = lookup(db, &precache, &key).await {
        return (hit, ResponseSource::Precache);
    }

    match network.fetch(request).await {
        Ok(response) => {
            if response.is_success() {
                cache_runtime_copy(db, names, key, response.clone());
            }
            return (response, ResponseSource::Network);
        }
        Err(e) => tracing::debug!(url = %request.url, error = %e, "network unavailable, falling back"),
    }

    if let Some(hit) = lookup(db, &names.runtime(), &key).await {
        return (hit, ResponseSource::Runtime);
    }

    if request.is_navigation() {
        for shell in [&scope.entry_document, &scope.root] {
            if let Some(hit) = lookup(db, &precache, &RequestKey::get(shell.clone())).await {
                return (hit, ResponseSource::NavigationFallback);
            }
        }
    }

    (CachedResponse::offline(), ResponseSource::Offline)
}

/// Store reads that fail count as misses.
async fn lookup(db: &CacheDb, store: &str, key: &RequestKey) -> Option<CachedResponse> {
    match db.match_request(store, key).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(store, url = %key.url, error = %e, "cache lookup failed");
            None
        }
    }
}

/// Write a runtime copy without holding up the response. The task is never
/// joined and its failure is discarded. The write is skipped once `names` is
/// no longer the registered version.
fn cache_runtime_copy(db: &CacheDb, names: &StoreNames, key: RequestKey, response: CachedResponse) {
    let db = db.clone();
    let names = names.clone();
    tokio::spawn(async move {
        let store = names.runtime();
        match db.put_for_version(&store, names.version(), &key, &response).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(store = %store, url = %key.url, "version superseded, runtime copy skipped"),
            Err(e) => tracing::debug!(store = %store, url = %key.url, error = %e, "runtime cache write discarded"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::{MockNetwork, app_scope, eventually_cached};
    use url::Url;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    async fn setup() -> (CacheDb, Arc<MockNetwork>, StoreNames) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let names = StoreNames::new("v1");
        db.set_active_version(names.version()).await.unwrap();
        db.open_store(&names.precache()).await.unwrap();
        (db, MockNetwork::new(), names)
    }

    fn expect_response(interception: Interception) -> (CachedResponse, ResponseSource) {
        match interception {
            Interception::Respond { response, source } => (response, source),
            Interception::Passthrough => panic!("expected the request to be intercepted"),
        }
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();
        let request = FetchRequest { method: "POST".into(), ..FetchRequest::get(url("https://app.test/api")) };

        let result = intercept(&db, &net, &app_scope(), &names, &request).await;

        assert!(matches!(result, Interception::Passthrough));
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_cross_origin_passes_through() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();
        let request = FetchRequest::get(url("https://cdn.other.test/lib.js"));

        let result = intercept(&db, &net, &app_scope(), &names, &request).await;

        assert!(matches!(result, Interception::Passthrough));
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_precache_hit_skips_network() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();
        db.put(&names.precache(), &RequestKey::get(url("https://app.test/app.js")), &CachedResponse::new(200, "OK", "cached"))
            .await
            .unwrap();
        network.serve("https://app.test/app.js", 200, "live");

        let request = FetchRequest::get(url("https://app.test/app.js"));
        let (response, source) = expect_response(intercept(&db, &net, &app_scope(), &names, &request).await);

        assert_eq!(source, ResponseSource::Precache);
        assert_eq!(response.text(), "cached");
        assert_eq!(network.calls("https://app.test/app.js"), 0);
    }

    #[tokio::test]
    async fn test_network_success_populates_runtime() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();
        network.serve("https://app.test/data.json?page=2", 200, "[1,2]");

        let request = FetchRequest::get(url("https://app.test/data.json?page=2"));
        let (response, source) = expect_response(intercept(&db, &net, &app_scope(), &names, &request).await);

        assert_eq!(source, ResponseSource::Network);
        assert_eq!(response.text(), "[1,2]");

        let cached = eventually_cached(&db, &names.runtime(), &request.key()).await;
        assert_eq!(cached.text(), "[1,2]");
    }

    #[tokio::test]
    async fn test_http_error_returned_not_cached() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();

        let request = FetchRequest::get(url("https://app.test/missing"));
        let (response, source) = expect_response(intercept(&db, &net, &app_scope(), &names, &request).await);

        assert_eq!(source, ResponseSource::Network);
        assert_eq!(response.status, 404);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(db.match_request(&names.runtime(), &request.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_uses_runtime_entry() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();
        let request = FetchRequest::get(url("https://app.test/data.json"));
        db.open_store(&names.runtime()).await.unwrap();
        db.put(&names.runtime(), &request.key(), &CachedResponse::new(200, "OK", "earlier"))
            .await
            .unwrap();
        network.set_online(false);

        let (response, source) = expect_response(intercept(&db, &net, &app_scope(), &names, &request).await);

        assert_eq!(source, ResponseSource::Runtime);
        assert_eq!(response.text(), "earlier");
        assert_eq!(network.calls("https://app.test/data.json"), 1);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_entry_document() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();
        db.put(&names.precache(), &RequestKey::get(url("https://app.test/index.html")), &CachedResponse::new(200, "OK", "shell"))
            .await
            .unwrap();
        network.set_online(false);

        let request = FetchRequest::navigate(url("https://app.test/deep/link?x=1"));
        let (response, source) = expect_response(intercept(&db, &net, &app_scope(), &names, &request).await);

        assert_eq!(source, ResponseSource::NavigationFallback);
        assert_eq!(response.text(), "shell");
    }

    #[tokio::test]
    async fn test_offline_navigation_falls_back_to_root() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();
        db.put(&names.precache(), &RequestKey::get(url("https://app.test/")), &CachedResponse::new(200, "OK", "root"))
            .await
            .unwrap();
        network.set_online(false);

        let request = FetchRequest::navigate(url("https://app.test/settings"));
        let (response, source) = expect_response(intercept(&db, &net, &app_scope(), &names, &request).await);

        assert_eq!(source, ResponseSource::NavigationFallback);
        assert_eq!(response.text(), "root");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_precache() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = MockNetwork::new();
        let net: Arc<dyn Network> = network.clone();
        network.set_online(false);

        let request = FetchRequest::navigate(url("https://app.test/"));
        let (response, source) =
            expect_response(intercept(&db, &net, &app_scope(), &StoreNames::new("v1"), &request).await);

        assert_eq!(source, ResponseSource::Offline);
        assert_eq!(response.status, 503);
        assert_eq!(response.status_text, "Offline");
    }

    #[tokio::test]
    async fn test_offline_subresource_gets_503() {
        let (db, network, names) = setup().await;
        let net: Arc<dyn Network> = network.clone();
        db.put(&names.precache(), &RequestKey::get(url("https://app.test/index.html")), &CachedResponse::new(200, "OK", "shell"))
            .await
            .unwrap();
        network.set_online(false);

        let request = FetchRequest::get(url("https://app.test/img/photo.png"));
        let (response, source) = expect_response(intercept(&db, &net, &app_scope(), &names, &request).await);

        assert_eq!(source, ResponseSource::Offline);
        assert_eq!(response.status, 503);
        assert_eq!(response.text(), "Offline");
    }
}
