//! WebSocket connection to the signaling relay: typed send/receive over a
//! pair of channels, with the identify handshake performed up front.

use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use tandem_proto::{ClientMessage, PeerId, ServerMessage};

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

pub struct RelayConnection {
    peer_id: PeerId,
    tx: Option<mpsc::UnboundedSender<ClientMessage>>,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
    /// Messages that arrived while waiting for the identity handshake.
    pending: VecDeque<ServerMessage>,
    ws_task: tokio::task::JoinHandle<()>,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl RelayConnection {
    /// Connect, identify, and return once the relay has assigned an id.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await?;

        let (tx_client, rx_client) = mpsc::unbounded_channel::<ClientMessage>();
        let (tx_server, mut rx_server) = mpsc::unbounded_channel::<ServerMessage>();

        let ws_task = tokio::spawn(async move {
            handle_websocket(ws_stream, rx_client, tx_server).await;
        });

        let tx_heartbeat = tx_client.clone();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = interval(HEARTBEAT_PERIOD);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                if tx_heartbeat.send(ClientMessage::Ping).is_err() {
                    break;
                }
            }
        });

        tx_client
            .send(ClientMessage::Identify)
            .map_err(|_| anyhow!("relay connection closed before identify"))?;

        let mut pending = VecDeque::new();
        let peer_id = loop {
            let next = tokio::time::timeout(IDENTIFY_TIMEOUT, rx_server.recv())
                .await
                .map_err(|_| anyhow!("timed out waiting for relay identity"))?
                .ok_or_else(|| anyhow!("relay closed during identify"))?;
            match next {
                ServerMessage::Identity { id } => break id,
                other => pending.push_back(other),
            }
        };
        debug!(peer = %peer_id, "identified with relay");

        Ok(Self {
            peer_id,
            tx: Some(tx_client),
            rx: rx_server,
            pending,
            ws_task,
            heartbeat,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Fire-and-forget; a dropped connection surfaces as a closed `recv`.
    pub fn send(&self, message: ClientMessage) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(message);
        }
    }

    /// `None` once the relay connection is gone.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        if let Some(buffered) = self.pending.pop_front() {
            return Some(buffered);
        }
        if self.tx.is_none() {
            return None;
        }
        self.rx.recv().await
    }

    /// Drop the connection; safe to call more than once.
    pub fn shutdown(&mut self) {
        self.heartbeat.abort();
        self.tx = None;
        self.ws_task.abort();
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_client: mpsc::UnboundedReceiver<ClientMessage>,
    tx_server: mpsc::UnboundedSender<ServerMessage>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx_client.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Ok(server_msg) = serde_json::from_str::<ServerMessage>(text.as_str()) {
                    if tx_server.send(server_msg).is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}
