use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use murmur_types::events::GatewayEvent;

/// The presence relay: which account is connected on which socket, plus the
/// fan-out channels used to reach them.
///
/// Process-local. Running more than one server process would need a shared
/// presence store in front of this.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel: every open socket receives every event sent here
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// account id -> (connection id, targeted sender). A newer connection for
    /// the same account replaces the entry.
    connections: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to broadcast events. Subscribe before calling `connect` so
    /// the socket sees its own `getOnlineUsers`.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all open sockets.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register `user_id` as connected and announce the new online set.
    /// Returns the connection id and the receiver for targeted events.
    pub async fn connect(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some((previous, _)) = self.inner.connections.write().await.insert(user_id, (conn_id, tx)) {
            debug!("{} reconnected, replacing connection {}", user_id, previous);
        }

        self.announce_online_users().await;
        (conn_id, rx)
    }

    /// Remove `user_id`'s entry if `conn_id` still owns it, then announce the
    /// online set. A stale socket closing never evicts a newer one.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: Uuid) {
        {
            let mut connections = self.inner.connections.write().await;
            if connections.get(&user_id).is_some_and(|(owner, _)| *owner == conn_id) {
                connections.remove(&user_id);
            }
        }

        self.announce_online_users().await;
    }

    /// Broadcast `getOnlineUsers` with the current online set.
    pub async fn announce_online_users(&self) {
        let online = self.online_users().await;
        self.broadcast(GatewayEvent::GetOnlineUsers(online));
    }

    /// Connected account ids, sorted.
    pub async fn online_users(&self) -> Vec<Uuid> {
        let mut online: Vec<Uuid> = self.inner.connections.read().await.keys().copied().collect();
        online.sort();
        online
    }

    /// Push an event to one account's live connection. Returns false when the
    /// account is offline; nothing is queued in that case.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }
}
