use std::time::Duration;

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use tandem_proto::{ClientMessage, PeerId, Role, ServerMessage, SignalPayload};
use tandem_relay::{router, websocket::RelayState};

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_relay() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(RelayState::new());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

struct TestClient {
    sink: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    stream: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    id: PeerId,
}

impl TestClient {
    async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.unwrap();
        let (sink, stream) = ws.split();
        let mut client = Self {
            sink,
            stream,
            id: PeerId::generate(), // replaced by the relay-assigned id below
        };
        client.send(&ClientMessage::Identify).await;
        loop {
            if let ServerMessage::Identity { id } = client.recv().await {
                client.id = id;
                return client;
            }
        }
    }

    async fn send(&mut self, msg: &ClientMessage) {
        let json = serde_json::to_string(msg).unwrap();
        self.sink.send(Message::text(json)).await.unwrap();
    }

    /// Next message of any kind, bounded.
    async fn recv(&mut self) -> ServerMessage {
        let frame = tokio::time::timeout(WAIT, self.stream.next())
            .await
            .expect("timed out waiting for a relay message")
            .expect("relay closed the connection")
            .unwrap();
        match frame {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    /// Next message that is not an informational broadcast.
    async fn recv_signaling(&mut self) -> ServerMessage {
        loop {
            match self.recv().await {
                ServerMessage::UsersOnline { .. } | ServerMessage::Pong => continue,
                other => return other,
            }
        }
    }

    /// Prove the inbound queue holds nothing but broadcasts: a ping must
    /// be answered by the very next non-broadcast message.
    async fn assert_no_pending_signaling(&mut self) {
        self.send(&ClientMessage::Ping).await;
        loop {
            match self.recv().await {
                ServerMessage::UsersOnline { .. } => continue,
                ServerMessage::Pong => return,
                other => panic!("unexpected pending message: {other:?}"),
            }
        }
    }
}

fn expect_pair_found(msg: ServerMessage) -> (tandem_proto::SessionId, PeerId, Role) {
    match msg {
        ServerMessage::PairFound {
            session_id,
            counterpart,
            role,
        } => (session_id, counterpart, role),
        other => panic!("expected pairFound, got {other:?}"),
    }
}

#[tokio::test]
async fn assigns_distinct_identities() {
    let url = spawn_relay().await;
    let a = TestClient::connect(&url).await;
    let b = TestClient::connect(&url).await;
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn pairs_fifo_with_complementary_roles() {
    let url = spawn_relay().await;
    let mut a = TestClient::connect(&url).await;
    let mut b = TestClient::connect(&url).await;

    a.send(&ClientMessage::QueueJoin).await;
    // Ping barrier: joins arrive on separate connections, so make sure the
    // relay has processed A's join before B enters the queue.
    a.assert_no_pending_signaling().await;
    b.send(&ClientMessage::QueueJoin).await;

    let (session_a, counterpart_a, role_a) = expect_pair_found(a.recv_signaling().await);
    let (session_b, counterpart_b, role_b) = expect_pair_found(b.recv_signaling().await);

    assert_eq!(session_a, session_b);
    assert_eq!(counterpart_a, b.id);
    assert_eq!(counterpart_b, a.id);
    // First-arrived initiates.
    assert_eq!(role_a, Role::Host);
    assert_eq!(role_b, Role::Guest);
}

#[tokio::test]
async fn signal_routing_ignores_forged_recipient() {
    let url = spawn_relay().await;
    let mut a = TestClient::connect(&url).await;
    let mut b = TestClient::connect(&url).await;
    let mut c = TestClient::connect(&url).await;

    a.send(&ClientMessage::QueueJoin).await;
    b.send(&ClientMessage::QueueJoin).await;
    a.recv_signaling().await;
    b.recv_signaling().await;

    // A claims the offer is for C. Membership routing must deliver it to
    // B and to nobody else.
    a.send(&ClientMessage::Signal {
        to: c.id,
        payload: SignalPayload::Offer { sdp: "v=0".into() },
    })
    .await;

    match b.recv_signaling().await {
        ServerMessage::Signal { from, payload } => {
            assert_eq!(from, a.id);
            assert_eq!(payload, SignalPayload::Offer { sdp: "v=0".into() });
        }
        other => panic!("expected relayed signal, got {other:?}"),
    }
    c.assert_no_pending_signaling().await;
}

#[tokio::test]
async fn disconnected_client_is_never_paired() {
    let url = spawn_relay().await;
    let mut a = TestClient::connect(&url).await;
    a.send(&ClientMessage::QueueJoin).await;
    let a_id = a.id;
    drop(a);

    // Let the relay process the disconnect before anyone else joins.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut b = TestClient::connect(&url).await;
    let mut c = TestClient::connect(&url).await;
    b.send(&ClientMessage::QueueJoin).await;
    c.send(&ClientMessage::QueueJoin).await;

    let (_, counterpart_b, _) = expect_pair_found(b.recv_signaling().await);
    let (_, counterpart_c, _) = expect_pair_found(c.recv_signaling().await);
    assert_eq!(counterpart_b, c.id);
    assert_eq!(counterpart_c, b.id);
    assert_ne!(counterpart_b, a_id);
}

#[tokio::test]
async fn counterpart_is_told_when_peer_disconnects_mid_session() {
    let url = spawn_relay().await;
    let mut a = TestClient::connect(&url).await;
    let mut b = TestClient::connect(&url).await;

    a.send(&ClientMessage::QueueJoin).await;
    b.send(&ClientMessage::QueueJoin).await;
    a.recv_signaling().await;
    b.recv_signaling().await;

    drop(b);

    assert!(matches!(a.recv_signaling().await, ServerMessage::PeerGone));
}

#[tokio::test]
async fn duplicate_and_in_session_queue_joins_are_rejected() {
    let url = spawn_relay().await;
    let mut a = TestClient::connect(&url).await;

    a.send(&ClientMessage::QueueJoin).await;
    a.send(&ClientMessage::QueueJoin).await;
    match a.recv_signaling().await {
        ServerMessage::Error { message } => assert!(message.contains("queue"), "{message}"),
        other => panic!("expected an error, got {other:?}"),
    }

    let mut b = TestClient::connect(&url).await;
    b.send(&ClientMessage::QueueJoin).await;
    a.recv_signaling().await;
    b.recv_signaling().await;

    // Queued-while-in-session is the explicit precondition violation.
    a.send(&ClientMessage::QueueJoin).await;
    match a.recv_signaling().await {
        ServerMessage::Error { message } => assert!(message.contains("session"), "{message}"),
        other => panic!("expected an error, got {other:?}"),
    }
}

#[tokio::test]
async fn signal_without_session_answers_session_not_found() {
    let url = spawn_relay().await;
    let mut a = TestClient::connect(&url).await;

    a.send(&ClientMessage::Signal {
        to: PeerId::generate(),
        payload: SignalPayload::Answer { sdp: "v=0".into() },
    })
    .await;

    assert!(matches!(
        a.recv_signaling().await,
        ServerMessage::SessionNotFound
    ));
}

#[tokio::test]
async fn queue_leave_crossing_pair_found_tears_the_session_down() {
    let url = spawn_relay().await;
    let mut a = TestClient::connect(&url).await;
    let mut b = TestClient::connect(&url).await;

    a.send(&ClientMessage::QueueJoin).await;
    a.assert_no_pending_signaling().await;
    // B's cancellation races the pairFound already heading its way; the
    // join pairs first, so the leave lands on a session, not the queue.
    b.send(&ClientMessage::QueueJoin).await;
    b.send(&ClientMessage::QueueLeave).await;

    expect_pair_found(a.recv_signaling().await);
    expect_pair_found(b.recv_signaling().await);

    // The counterpart must not be left negotiating against nobody.
    assert!(matches!(a.recv_signaling().await, ServerMessage::PeerGone));

    // And the leaver is free again, not stuck "in an active session".
    b.send(&ClientMessage::QueueJoin).await;
    b.assert_no_pending_signaling().await;
}

#[tokio::test]
async fn queue_leave_takes_client_out_of_rotation() {
    let url = spawn_relay().await;
    let mut a = TestClient::connect(&url).await;
    let mut b = TestClient::connect(&url).await;
    let mut c = TestClient::connect(&url).await;

    a.send(&ClientMessage::QueueJoin).await;
    a.send(&ClientMessage::QueueLeave).await;
    a.assert_no_pending_signaling().await;

    b.send(&ClientMessage::QueueJoin).await;
    c.send(&ClientMessage::QueueJoin).await;
    let (_, counterpart_b, _) = expect_pair_found(b.recv_signaling().await);
    assert_eq!(counterpart_b, c.id);
    a.assert_no_pending_signaling().await;
}
