use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, trace, warn};
use uuid::Uuid;

use murmur_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one `/socket` connection until either side closes it.
///
/// `user_id` comes from the handshake query. A socket without one still
/// receives broadcasts but is never entered in the presence map.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: Option<Uuid>) {
    let (sender, mut receiver) = socket.split();

    // Subscribe first so this socket sees the announcement its own connect triggers
    let broadcast_rx = dispatcher.subscribe();

    let registration = match user_id {
        Some(uid) => {
            let (conn_id, user_rx) = dispatcher.connect(uid).await;
            info!("{} connected to gateway (connection {})", uid, conn_id);
            Some((uid, conn_id, user_rx))
        }
        None => {
            info!("anonymous socket connected to gateway");
            dispatcher.announce_online_users().await;
            None
        }
    };

    let (identity, user_rx) = match registration {
        Some((uid, conn_id, rx)) => (Some((uid, conn_id)), Some(rx)),
        None => (None, None),
    };

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(forward_events(sender, broadcast_rx, user_rx, pong_flag_send));

    // Clients have nothing to say beyond keeping the socket alive
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Text(text) => {
                    trace!("ignoring {}-byte client frame", text.len());
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    match identity {
        Some((uid, conn_id)) => {
            dispatcher.disconnect(uid, conn_id).await;
            info!("{} disconnected from gateway (connection {})", uid, conn_id);
        }
        None => {
            dispatcher.announce_online_users().await;
            info!("anonymous socket disconnected from gateway");
        }
    }
}

/// Relay broadcasts and targeted events to the client, with heartbeat.
async fn forward_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut broadcast_rx: broadcast::Receiver<GatewayEvent>,
    mut user_rx: Option<mpsc::UnboundedReceiver<GatewayEvent>>,
    pong_flag: Arc<AtomicBool>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        let event = tokio::select! {
            result = broadcast_rx.recv() => match result {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Broadcast receiver lagged by {} messages", n);
                    continue;
                }
                Err(_) => break,
            },
            result = recv_targeted(&mut user_rx) => match result {
                Some(event) => event,
                None => {
                    // A newer connection for the same account took over the
                    // presence entry; this socket keeps receiving broadcasts only.
                    user_rx = None;
                    continue;
                }
            },
            _ = heartbeat.tick() => {
                if pong_flag.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode gateway event: {}", e);
                continue;
            }
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

async fn recv_targeted(rx: &mut Option<mpsc::UnboundedReceiver<GatewayEvent>>) -> Option<GatewayEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
