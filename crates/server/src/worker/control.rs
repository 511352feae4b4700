//! Control channel: messages posted to the worker by its clients.

use std::sync::atomic::Ordering;

use serde::Serialize;
use serde_json::Value;
use shellcache_core::Error;

use super::{Worker, WorkerState};

const SKIP_WAITING: &str = "SKIP_WAITING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    SkipWaiting,
}

impl ControlMessage {
    /// Accepts `"SKIP_WAITING"` or `{"type": "SKIP_WAITING"}`.
    pub fn parse(message: &Value) -> Option<Self> {
        let kind = match message {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("type")?.as_str()?,
            _ => return None,
        };
        (kind == SKIP_WAITING).then_some(ControlMessage::SkipWaiting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlOutcome {
    Ignored,
    AlreadySignalled,
    Signalled,
    Activated,
}

impl Worker {
    /// Set the skip-waiting flag. Returns true only for the first signal.
    pub fn skip_waiting(&self) -> bool {
        !self.skip_waiting.swap(true, Ordering::SeqCst)
    }

    /// Handle one posted message. A waiting (installed) worker is activated.
    pub async fn post_message(&self, message: &Value) -> Result<ControlOutcome, Error> {
        let Some(ControlMessage::SkipWaiting) = ControlMessage::parse(message) else {
            tracing::debug!(%message, "ignoring unknown control message");
            return Ok(ControlOutcome::Ignored);
        };

        let first = self.skip_waiting();
        if self.state() == WorkerState::Installed && self.activate().await?.is_some() {
            return Ok(ControlOutcome::Activated);
        }

        Ok(if first { ControlOutcome::Signalled } else { ControlOutcome::AlreadySignalled })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::{MockNetwork, app_scope};
    use serde_json::json;
    use shellcache_client::Network;
    use shellcache_core::CacheDb;
    use std::sync::Arc;

    #[test]
    fn test_parse_forms() {
        assert_eq!(ControlMessage::parse(&json!("SKIP_WAITING")), Some(ControlMessage::SkipWaiting));
        assert_eq!(ControlMessage::parse(&json!({"type": "SKIP_WAITING"})), Some(ControlMessage::SkipWaiting));
        assert_eq!(ControlMessage::parse(&json!("skip_waiting")), None);
        assert_eq!(ControlMessage::parse(&json!({"kind": "SKIP_WAITING"})), None);
        assert_eq!(ControlMessage::parse(&json!({"type": 1})), None);
        assert_eq!(ControlMessage::parse(&json!(null)), None);
    }

    async fn idle_worker() -> Worker {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network: Arc<dyn Network> = MockNetwork::new();
        Worker::new(db, network, app_scope(), "v1")
    }

    #[tokio::test]
    async fn test_skip_waiting_idempotent() {
        let worker = idle_worker().await;

        assert_eq!(worker.post_message(&json!("SKIP_WAITING")).await.unwrap(), ControlOutcome::Signalled);
        assert_eq!(
            worker.post_message(&json!({"type": "SKIP_WAITING"})).await.unwrap(),
            ControlOutcome::AlreadySignalled
        );
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_unknown_message_ignored() {
        let worker = idle_worker().await;

        assert_eq!(worker.post_message(&json!({"type": "CLAIM"})).await.unwrap(), ControlOutcome::Ignored);
        assert!(worker.skip_waiting());
    }

    #[tokio::test]
    async fn test_waiting_worker_is_activated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = MockNetwork::new();
        network.serve("https://app.test/", 200, "<html></html>");
        network.serve("https://app.test/index.html", 200, "<html></html>");
        network.serve("https://app.test/manifest.json", 200, "{}");
        let net: Arc<dyn Network> = network.clone();
        let worker = Worker::new(db.clone(), net, app_scope(), "v1");

        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Installed);
        assert_eq!(worker.serving_version().await, None);

        assert_eq!(worker.post_message(&json!("SKIP_WAITING")).await.unwrap(), ControlOutcome::Activated);
        assert_eq!(worker.state(), WorkerState::Activated);
        assert_eq!(worker.serving_version().await.as_deref(), Some("v1"));
        assert_eq!(
            worker.post_message(&json!("SKIP_WAITING")).await.unwrap(),
            ControlOutcome::AlreadySignalled
        );
    }
}
