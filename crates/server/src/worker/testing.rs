//! Scripted network and fixtures shared by worker tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shellcache_client::Network;
use shellcache_core::{CacheDb, CachedResponse, Error, FetchRequest, RequestKey, Scope};

/// In-memory origin: fixed responses per URL, unknown URLs answer 404,
/// and an offline switch that turns every fetch into a transport failure.
pub struct MockNetwork {
    routes: Mutex<HashMap<String, CachedResponse>>,
    log: Mutex<Vec<FetchRequest>>,
    online: AtomicBool,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { routes: Mutex::default(), log: Mutex::default(), online: AtomicBool::new(true) })
    }

    pub fn serve(&self, url: &str, status: u16, body: &'static str) {
        let response = CachedResponse::new(status, if status < 400 { "OK" } else { "Error" }, body)
            .with_header("content-type", content_type(url));
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of fetches attempted for `url`, offline attempts included.
    pub fn calls(&self, url: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|r| r.url.as_str() == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, Error> {
        self.log.lock().unwrap().push(request.clone());
        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: connection refused", request.url)));
        }
        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| CachedResponse::new(404, "Not Found", "not found")))
    }
}

fn content_type(url: &str) -> &'static str {
    match url.rsplit('.').next() {
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("css") => "text/css",
        _ => "text/html; charset=utf-8",
    }
}

pub fn app_scope() -> Scope {
    Scope::new("https://app.test/", "index.html", "manifest.json", "sw.js").unwrap()
}

/// Poll until a detached write lands in `store`.
pub async fn eventually_cached(db: &CacheDb, store: &str, key: &RequestKey) -> CachedResponse {
    for _ in 0..100 {
        if let Some(found) = db.match_request(store, key).await.unwrap() {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never appeared in {store}", key.url);
}
