use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use tandem_proto::{ClientMessage, PeerId, ServerMessage};

use crate::error::RelayError;
use crate::matchmaker::Matchmaker;
use crate::registry::SessionRegistry;

/// Queue, registry and the outbound channel of every connected client,
/// behind one lock. Pairing must be a single critical section (dequeue,
/// create, notify), and disconnects must serialize against in-flight
/// pairing, so a sharded map is not an option here.
#[derive(Default)]
struct Coordinator {
    matchmaker: Matchmaker,
    registry: SessionRegistry,
    clients: HashMap<PeerId, mpsc::UnboundedSender<ServerMessage>>,
}

impl Coordinator {
    fn send_to(&self, peer_id: &PeerId, message: ServerMessage) {
        if let Some(tx) = self.clients.get(peer_id) {
            let _ = tx.send(message);
        } else {
            warn!(peer = %peer_id, "dropping message for unknown peer");
        }
    }

    fn broadcast_users_online(&self) {
        let size = self.clients.len();
        for tx in self.clients.values() {
            let _ = tx.send(ServerMessage::UsersOnline { size });
        }
    }
}

/// Shared relay state handed to every websocket task.
#[derive(Clone, Default)]
pub struct RelayState {
    coordinator: Arc<Mutex<Coordinator>>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, peer_id: PeerId, tx: mpsc::UnboundedSender<ServerMessage>) {
        let mut state = self.coordinator.lock().await;
        state.clients.insert(peer_id, tx);
        state.broadcast_users_online();
    }

    /// Disconnect cleanup: leave the queue, close any live session and
    /// tell the counterpart, then forget the client.
    async fn unregister(&self, peer_id: &PeerId) {
        let mut state = self.coordinator.lock().await;
        state.matchmaker.remove(peer_id);
        if let Some(session) = state.registry.close_for(peer_id) {
            if let Some(counterpart) = session.counterpart_of(peer_id) {
                info!(peer = %peer_id, session = %session.id, "peer left mid-session");
                state.send_to(&counterpart, ServerMessage::PeerGone);
            }
        }
        state.clients.remove(peer_id);
        state.broadcast_users_online();
    }
}

/// WebSocket upgrade handler for `/ws`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(relay): State<RelayState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

async fn handle_socket(socket: WebSocket, relay: RelayState) {
    let peer_id = PeerId::generate();
    let (mut sender, mut receiver) = socket.split();

    // Outbound pump: everything addressed to this client goes through one
    // unbounded channel so state mutation never awaits the socket.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let pump_peer = peer_id;
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
        debug!(peer = %pump_peer, "outbound pump ended");
    });

    relay.register(peer_id, tx.clone()).await;
    debug!(peer = %peer_id, "websocket connected");

    while let Some(msg_result) = receiver.next().await {
        let msg = match msg_result {
            Ok(m) => m,
            Err(err) => {
                debug!(peer = %peer_id, error = %err, "websocket error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, &peer_id, &relay, &tx).await;
                }
                Err(err) => {
                    warn!(peer = %peer_id, error = %err, "malformed client message");
                    let _ = tx.send(ServerMessage::Error {
                        message: format!("invalid message: {err}"),
                    });
                }
            },
            Message::Close(_) => break,
            // Ping/Pong frames are handled by axum; binary is not part of
            // the signaling protocol.
            _ => {}
        }
    }

    relay.unregister(&peer_id).await;
    debug!(peer = %peer_id, "websocket disconnected");
}

async fn handle_client_message(
    message: ClientMessage,
    peer_id: &PeerId,
    relay: &RelayState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    match message {
        ClientMessage::Identify => {
            let _ = tx.send(ServerMessage::Identity { id: *peer_id });
        }

        ClientMessage::QueueJoin => {
            let mut state = relay.coordinator.lock().await;
            if state.registry.session_of(peer_id).is_some() {
                let _ = tx.send(ServerMessage::Error {
                    message: RelayError::AlreadyInSession.to_string(),
                });
                return;
            }
            if let Err(err) = state.matchmaker.enqueue(*peer_id) {
                let _ = tx.send(ServerMessage::Error {
                    message: err.to_string(),
                });
                return;
            }
            debug!(peer = %peer_id, waiting = state.matchmaker.len(), "joined queue");

            // Pair inside the same critical section so no client can be
            // dequeued twice or paired after disconnecting.
            if let Some((host, guest)) = state.matchmaker.dequeue_pair() {
                match state.registry.create(host, guest) {
                    Ok(session_id) => {
                        info!(session = %session_id, %host, %guest, "paired");
                        state.send_to(
                            &host,
                            ServerMessage::PairFound {
                                session_id,
                                counterpart: guest,
                                role: tandem_proto::Role::Host,
                            },
                        );
                        state.send_to(
                            &guest,
                            ServerMessage::PairFound {
                                session_id,
                                counterpart: host,
                                role: tandem_proto::Role::Guest,
                            },
                        );
                        state.registry.begin_negotiation(&session_id);
                    }
                    Err(err) => {
                        // Unreachable while queue entries are unique; do
                        // not let it poison the coordinator.
                        warn!(%host, %guest, error = %err, "pairing failed");
                    }
                }
            }
        }

        ClientMessage::QueueLeave => {
            let mut state = relay.coordinator.lock().await;
            if state.matchmaker.remove(peer_id) {
                debug!(peer = %peer_id, "left queue");
            } else if let Some(session) = state.registry.close_for(peer_id) {
                // The leave crossed a pairFound already on the wire: the
                // client is no longer queued but now holds a session it
                // believes it cancelled. Tear it down and tell the
                // counterpart, same as a disconnect.
                if let Some(counterpart) = session.counterpart_of(peer_id) {
                    info!(peer = %peer_id, session = %session.id, "left after pairing");
                    state.send_to(&counterpart, ServerMessage::PeerGone);
                }
            }
        }

        ClientMessage::Signal { to, payload } => {
            let state = relay.coordinator.lock().await;
            match state.registry.counterpart(peer_id) {
                Some(counterpart) => {
                    if to != counterpart {
                        // The claimed recipient is audit-only; routing is
                        // always by session membership.
                        warn!(
                            peer = %peer_id,
                            claimed = %to,
                            actual = %counterpart,
                            "signal addressed to a non-member, rerouted"
                        );
                    }
                    debug!(peer = %peer_id, kind = payload.kind(), "relaying signal");
                    state.send_to(
                        &counterpart,
                        ServerMessage::Signal {
                            from: *peer_id,
                            payload,
                        },
                    );
                }
                None => {
                    let _ = tx.send(ServerMessage::SessionNotFound);
                }
            }
        }

        ClientMessage::SessionReady => {
            let mut state = relay.coordinator.lock().await;
            let session_id = state.registry.session_of(peer_id).map(|s| s.id);
            match session_id {
                Some(id) => {
                    state.registry.mark_connected(&id);
                    state.registry.close(&id);
                    info!(session = %id, peer = %peer_id, "session established, relay done");
                }
                // Both participants report readiness; the second one finds
                // the session already retired. Closing is idempotent.
                None => {
                    debug!(peer = %peer_id, "session ready for already-closed session");
                }
            }
        }

        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong);
        }
    }
}
