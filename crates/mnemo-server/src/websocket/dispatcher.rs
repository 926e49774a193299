//! Admin-initiated event fan-out.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::registry::ConnectionRegistry;

/// Pushes arbitrary tagged events to one user or to everyone connected.
///
/// Authorization is the route's concern; the dispatcher delivers to
/// whatever audience it is told.
pub struct EventDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl EventDispatcher {
    /// Build a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast `event_type`/`data` to `user_id`, or to every connected
    /// user when `user_id` is `None`.
    ///
    /// Returns the number of users targeted.
    pub async fn broadcast(
        &self,
        event_type: &str,
        data: Value,
        user_id: Option<&str>,
    ) -> usize {
        let targets = match user_id {
            Some(user) => vec![user.to_string()],
            None => self.registry.users().await,
        };
        info!(event_type, targets = targets.len(), "dispatching broadcast");
        for user in &targets {
            self.registry
                .broadcast_to_user(user, event_type, data.clone(), None)
                .await;
        }
        targets.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::registry::ConnectionHandle;
    use serde_json::json;
    use tokio::sync::mpsc;

    async fn register(
        registry: &ConnectionRegistry,
        user: &str,
        session: &str,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(8);
        registry
            .register(ConnectionHandle::new(user.into(), session.into(), tx))
            .await;
        rx
    }

    #[tokio::test]
    async fn broadcast_to_single_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut rx1 = register(&registry, "u1", "s1").await;
        let mut rx2 = register(&registry, "u2", "s1").await;

        let dispatcher = EventDispatcher::new(Arc::clone(&registry));
        let targeted = dispatcher
            .broadcast("maintenance", json!({"at": "soon"}), Some("u1"))
            .await;

        assert_eq!(targeted, 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_all_users() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut rx1 = register(&registry, "u1", "s1").await;
        let mut rx2 = register(&registry, "u2", "s1").await;

        let dispatcher = EventDispatcher::new(Arc::clone(&registry));
        let targeted = dispatcher.broadcast("maintenance", json!({}), None).await;

        assert_eq!(targeted, 2);
        let wire = rx1.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed["type"], "maintenance");
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_with_nobody_connected() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = EventDispatcher::new(registry);
        assert_eq!(dispatcher.broadcast("maintenance", json!({}), None).await, 0);
    }
}
