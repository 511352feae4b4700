//! The offline cache worker: lifecycle state, install/activate orchestration
//! and request interception for one build version.
//!
//! A worker starts `parsed`. Installing builds the precache for its version;
//! activating reaps other versions and makes this version the serving one.
//! Until some version has been activated, requests are not intercepted.

pub mod activate;
pub mod control;
pub mod install;
pub mod intercept;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::Serialize;
use shellcache_client::Network;
use shellcache_core::{CacheDb, Error, FetchRequest, Registration, Scope, StoreNames};
use tokio::sync::{Mutex, RwLock, watch};

use activate::ActivationReport;
use install::InstallReport;
pub use intercept::{Interception, ResponseSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Worker {
    db: CacheDb,
    network: Arc<dyn Network>,
    scope: Scope,
    names: StoreNames,
    state: watch::Sender<WorkerState>,
    /// Version whose stores answer intercepted requests.
    serving: RwLock<Option<StoreNames>>,
    skip_waiting: AtomicBool,
    /// Serializes install and activate.
    lifecycle: Mutex<()>,
}

impl Worker {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, scope: Scope, version: impl Into<String>) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self {
            db,
            network,
            scope,
            names: StoreNames::new(version),
            state,
            serving: RwLock::new(None),
            skip_waiting: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    /// Resume serving the version recorded by the last activation, if any.
    pub async fn restore(&self) -> Result<Option<Registration>, Error> {
        let registration = self.db.registration().await?;
        if let Some(reg) = &registration {
            tracing::info!(
                active_version = %reg.active_version,
                activated_at = %reg.activated_at,
                "restored registration"
            );
            *self.serving.write().await = Some(StoreNames::new(reg.active_version.clone()));
        }
        Ok(registration)
    }

    /// Bring this worker's version into service: install, then activate.
    ///
    /// If this version is already the serving one and its precache exists,
    /// nothing is fetched, the worker is marked activated and `None` is
    /// returned.
    pub async fn run_lifecycle(&self) -> Result<Option<InstallReport>, Error> {
        if self.is_serving_current().await? {
            tracing::info!(version = self.version(), "version already active, skipping install");
            self.set_state(WorkerState::Activated);
            return Ok(None);
        }

        // Install signals skip-waiting, so an installed worker never waits.
        let report = self.install().await?;
        self.activate().await?;
        Ok(Some(report))
    }

    async fn is_serving_current(&self) -> Result<bool, Error> {
        let serving = self.serving.read().await;
        match serving.as_ref() {
            Some(names) if *names == self.names => self.db.has_store(&self.names.precache()).await,
            _ => Ok(false),
        }
    }

    /// Build the precache for this version.
    ///
    /// On failure the worker becomes redundant and the previously serving
    /// version, if any, keeps answering requests.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let _guard = self.lifecycle.lock().await;
        self.skip_waiting();
        self.set_state(WorkerState::Installing);

        match install::install(&self.db, self.network.as_ref(), &self.scope, &self.names).await {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                Ok(report)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Activate an installed worker. Returns `None` when the worker isn't
    /// waiting in the installed state.
    pub async fn activate(&self) -> Result<Option<ActivationReport>, Error> {
        let _guard = self.lifecycle.lock().await;
        if self.state() != WorkerState::Installed {
            tracing::debug!(state = %self.state(), "activation skipped");
            return Ok(None);
        }

        self.set_state(WorkerState::Activating);
        let report = match activate::activate(&self.db, &self.names).await {
            Ok(report) => report,
            Err(e) => {
                self.set_state(WorkerState::Installed);
                return Err(e);
            }
        };
        self.claim().await;
        self.set_state(WorkerState::Activated);

        tracing::info!(
            version = self.version(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "activated"
        );
        Ok(Some(report))
    }

    /// Route subsequent requests through this version's stores.
    async fn claim(&self) {
        let mut serving = self.serving.write().await;
        if let Some(previous) = serving.replace(self.names.clone())
            && previous != self.names
        {
            tracing::info!(from = previous.version(), to = self.version(), "clients claimed");
        }
    }

    /// Offer a request to the serving version.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Interception {
        let serving = self.serving.read().await.clone();
        match serving {
            Some(names) => intercept::intercept(&self.db, &self.network, &self.scope, &names, request).await,
            None => Interception::Passthrough,
        }
    }

    fn set_state(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(version = self.version(), from = %previous, to = %next, "worker state");
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub async fn serving_version(&self) -> Option<String> {
        self.serving.read().await.as_ref().map(|n| n.version().to_string())
    }

    pub fn version(&self) -> &str {
        self.names.version()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{MockNetwork, app_scope};
    use url::Url;

    const INDEX: &str = r#"<html><script src="app.js"></script><script src="sw.js"></script></html>"#;

    fn serve_app(network: &MockNetwork) {
        network.serve("https://app.test/", 200, INDEX);
        network.serve("https://app.test/index.html", 200, INDEX);
        network.serve("https://app.test/manifest.json", 200, "{}");
        network.serve("https://app.test/app.js", 200, "console.log(1)");
    }

    fn worker(db: &CacheDb, network: &Arc<MockNetwork>, version: &str) -> Worker {
        let net: Arc<dyn Network> = network.clone();
        Worker::new(db.clone(), net, app_scope(), version)
    }

    fn get(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_uncontrolled_before_activation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = MockNetwork::new();
        let worker = worker(&db, &network, "v1");

        assert_eq!(worker.state(), WorkerState::Parsed);
        assert!(matches!(worker.handle_fetch(&get("https://app.test/app.js")).await, Interception::Passthrough));
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_installs_and_activates() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = MockNetwork::new();
        serve_app(&network);
        let worker = worker(&db, &network, "v1");
        let mut states = worker.subscribe();

        let report = worker.run_lifecycle().await.unwrap().unwrap();
        assert_eq!(report.version, "v1");
        assert_eq!(report.precached, 4);

        assert_eq!(worker.state(), WorkerState::Activated);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), WorkerState::Activated);
        assert_eq!(worker.serving_version().await.as_deref(), Some("v1"));
        assert_eq!(db.registration().await.unwrap().unwrap().active_version, "v1");

        network.set_online(false);
        match worker.handle_fetch(&get("https://app.test/app.js")).await {
            Interception::Respond { response, source } => {
                assert_eq!(source, ResponseSource::Precache);
                assert_eq!(response.text(), "console.log(1)");
            }
            Interception::Passthrough => panic!("expected a precached response"),
        }
    }

    #[tokio::test]
    async fn test_restart_skips_install() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = MockNetwork::new();
        serve_app(&network);
        worker(&db, &network, "v1").run_lifecycle().await.unwrap();
        let before = network.total_calls();

        let restarted = worker(&db, &network, "v1");
        restarted.restore().await.unwrap();
        assert!(restarted.run_lifecycle().await.unwrap().is_none());

        assert_eq!(restarted.state(), WorkerState::Activated);
        assert_eq!(network.total_calls(), before);
    }

    #[tokio::test]
    async fn test_new_version_replaces_old() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = MockNetwork::new();
        serve_app(&network);
        worker(&db, &network, "v1").run_lifecycle().await.unwrap();
        db.open_store("runtime-v1").await.unwrap();

        let next = worker(&db, &network, "v2");
        next.restore().await.unwrap();
        assert_eq!(next.serving_version().await.as_deref(), Some("v1"));
        next.run_lifecycle().await.unwrap();

        assert_eq!(next.serving_version().await.as_deref(), Some("v2"));
        let mut stores = db.store_names().await.unwrap();
        stores.sort();
        assert_eq!(stores, vec!["precache-v2"]);
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_version() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = MockNetwork::new();
        serve_app(&network);
        worker(&db, &network, "v1").run_lifecycle().await.unwrap();

        network.set_online(false);
        let next = worker(&db, &network, "v2");
        next.restore().await.unwrap();
        let result = next.run_lifecycle().await;

        assert!(matches!(result, Err(ref e) if e.is_network_failure()));
        assert_eq!(next.state(), WorkerState::Redundant);
        assert_eq!(next.serving_version().await.as_deref(), Some("v1"));
        assert!(db.has_store("precache-v1").await.unwrap());
        assert!(!db.has_store("precache-v2").await.unwrap());
        assert_eq!(db.registration().await.unwrap().unwrap().active_version, "v1");

        match next.handle_fetch(&FetchRequest::navigate(Url::parse("https://app.test/about").unwrap())).await {
            Interception::Respond { source, .. } => assert_eq!(source, ResponseSource::NavigationFallback),
            Interception::Passthrough => panic!("expected the previous version to answer"),
        }
    }

    #[tokio::test]
    async fn test_activate_requires_installed() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = MockNetwork::new();
        let worker = worker(&db, &network, "v1");

        assert!(worker.activate().await.unwrap().is_none());
        assert_eq!(worker.state(), WorkerState::Parsed);
        assert!(db.registration().await.unwrap().is_none());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&WorkerState::Activated).unwrap(), "\"activated\"");
        assert_eq!(WorkerState::Redundant.to_string(), "redundant");
    }
}
