//! The per-client session state machine. Pure transition logic: events in,
//! actions out, no I/O. The driver owns the sockets, the transport handle
//! and the timer, and feeds exactly one event at a time, which is what
//! keeps the three event sources (relay, transport, user) serialized.

use tandem_proto::{ClientMessage, PeerId, Role, ServerMessage, SessionId, SignalPayload};

use crate::error::SessionError;
use crate::media::MediaStream;
use crate::transport::TransportEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    AwaitingPair,
    Negotiating,
    Connected,
    Closed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    JoinQueue,
    LeaveQueue,
    HangUp,
}

/// Everything that can reach the machine, from any of its three sources.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Command(UserCommand),
    /// The capture binding produced the local stream.
    LocalStreamReady,
    Relay(ServerMessage),
    /// The signaling channel is gone.
    RelayClosed,
    Transport(TransportEvent),
    /// The guest waited too long for the host's offer.
    OfferTimeout,
}

/// UI-facing output. Rendering is out of scope; the embedder decides what
/// these look like.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    UsersOnline(usize),
    Connected,
    RemoteStream(MediaStream),
    ChatMessage(Vec<u8>),
    /// Orderly end of the call; return to the idle screen, no error shown.
    Ended,
    /// Irrecoverable; must be presented with an explanation.
    Failed(SessionError),
}

/// Side effects for the driver to carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendRelay(ClientMessage),
    CreateTransport { initiator: bool },
    FeedTransport(SignalPayload),
    CloseTransport,
    CloseRelay,
    ReleaseStreams,
    StartOfferTimer,
    CancelOfferTimer,
    Notify(SessionNotice),
}

#[derive(Debug)]
pub struct SessionMachine {
    state: ConnectionState,
    self_id: Option<PeerId>,
    session_id: Option<SessionId>,
    counterpart: Option<PeerId>,
    role: Option<Role>,
    stream_ready: bool,
    /// A join requested before the local stream was ready; sent on
    /// `LocalStreamReady`, never dropped.
    join_pending: bool,
    /// Once the transport reports connectivity, locally produced
    /// negotiation artifacts are suppressed.
    transport_connected: bool,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            self_id: None,
            session_id: None,
            counterpart: None,
            role: None,
            stream_ready: false,
            join_pending: false,
            transport_connected: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Apply one event. Every (state, event) pair not covered below is a
    /// no-op; the machine never panics on an out-of-place event.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Action> {
        use ConnectionState::*;

        // Closed and Failed are absorbing.
        if matches!(self.state, Closed | Failed) {
            return Vec::new();
        }

        match event {
            SessionEvent::Command(UserCommand::JoinQueue) => match self.state {
                Idle if self.stream_ready => {
                    self.state = AwaitingPair;
                    vec![Action::SendRelay(ClientMessage::QueueJoin)]
                }
                Idle => {
                    self.join_pending = true;
                    Vec::new()
                }
                _ => Vec::new(),
            },

            SessionEvent::LocalStreamReady => {
                self.stream_ready = true;
                if self.join_pending && self.state == Idle {
                    self.join_pending = false;
                    self.state = AwaitingPair;
                    vec![Action::SendRelay(ClientMessage::QueueJoin)]
                } else {
                    Vec::new()
                }
            }

            SessionEvent::Command(UserCommand::LeaveQueue) => match self.state {
                AwaitingPair => {
                    self.state = Idle;
                    vec![Action::SendRelay(ClientMessage::QueueLeave)]
                }
                Idle => {
                    self.join_pending = false;
                    Vec::new()
                }
                _ => Vec::new(),
            },

            SessionEvent::Command(UserCommand::HangUp) => match self.state {
                AwaitingPair => {
                    self.state = Idle;
                    vec![Action::SendRelay(ClientMessage::QueueLeave)]
                }
                Negotiating | Connected => {
                    // Dropping the relay channel is what tells the relay to
                    // inform the counterpart while we are mid-negotiation.
                    self.state = Closed;
                    vec![
                        Action::CancelOfferTimer,
                        Action::CloseTransport,
                        Action::CloseRelay,
                        Action::ReleaseStreams,
                        Action::Notify(SessionNotice::Ended),
                    ]
                }
                Idle => {
                    self.join_pending = false;
                    Vec::new()
                }
                _ => Vec::new(),
            },

            SessionEvent::Relay(message) => self.handle_relay(message),

            SessionEvent::RelayClosed => match self.state {
                AwaitingPair | Negotiating => self.fail(SessionError::RelayLost),
                // Once connected the relay is no longer required.
                _ => Vec::new(),
            },

            SessionEvent::Transport(event) => self.handle_transport(event),

            SessionEvent::OfferTimeout => {
                if self.state == Negotiating
                    && self.role == Some(Role::Guest)
                    && !self.transport_connected
                {
                    self.fail(SessionError::NegotiationTimeout)
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn handle_relay(&mut self, message: ServerMessage) -> Vec<Action> {
        use ConnectionState::*;

        match message {
            ServerMessage::Identity { id } => {
                self.self_id = Some(id);
                Vec::new()
            }

            ServerMessage::UsersOnline { size } => {
                vec![Action::Notify(SessionNotice::UsersOnline(size))]
            }

            ServerMessage::PairFound {
                session_id,
                counterpart,
                role,
            } => match self.state {
                AwaitingPair => {
                    self.state = Negotiating;
                    self.session_id = Some(session_id);
                    self.counterpart = Some(counterpart);
                    self.role = Some(role);
                    let mut actions = vec![Action::CreateTransport {
                        initiator: role.is_host(),
                    }];
                    if role == Role::Guest {
                        actions.push(Action::StartOfferTimer);
                    }
                    actions
                }
                // A duplicate pairFound must not restart negotiation.
                _ => Vec::new(),
            },

            ServerMessage::Signal { from, payload } => match self.state {
                Negotiating if self.counterpart == Some(from) => {
                    let mut actions = Vec::new();
                    if matches!(payload, SignalPayload::Offer { .. })
                        && self.role == Some(Role::Guest)
                    {
                        actions.push(Action::CancelOfferTimer);
                    }
                    actions.push(Action::FeedTransport(payload));
                    actions
                }
                _ => Vec::new(),
            },

            ServerMessage::PeerGone => match self.state {
                AwaitingPair | Negotiating | Connected => self.fail(SessionError::PeerGone),
                _ => Vec::new(),
            },

            ServerMessage::SessionNotFound => match self.state {
                AwaitingPair | Negotiating | Connected => {
                    self.fail(SessionError::SessionNotFound)
                }
                _ => Vec::new(),
            },

            ServerMessage::Error { message } => match self.state {
                AwaitingPair | Negotiating => self.fail(SessionError::Relay(message)),
                _ => Vec::new(),
            },

            ServerMessage::Pong => Vec::new(),
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) -> Vec<Action> {
        use ConnectionState::*;

        match event {
            TransportEvent::Signal(payload) => {
                if self.state == Negotiating && !self.transport_connected {
                    match self.counterpart {
                        Some(to) => {
                            vec![Action::SendRelay(ClientMessage::Signal { to, payload })]
                        }
                        None => Vec::new(),
                    }
                } else {
                    // Suppressed: the transport already reported
                    // connectivity, or we are past negotiation.
                    Vec::new()
                }
            }

            TransportEvent::Connected => match self.state {
                Negotiating => {
                    self.state = Connected;
                    self.transport_connected = true;
                    vec![
                        Action::CancelOfferTimer,
                        Action::SendRelay(ClientMessage::SessionReady),
                        Action::CloseRelay,
                        Action::Notify(SessionNotice::Connected),
                    ]
                }
                _ => Vec::new(),
            },

            TransportEvent::RemoteStream(stream) => match self.state {
                Negotiating | Connected => {
                    vec![Action::Notify(SessionNotice::RemoteStream(stream))]
                }
                _ => Vec::new(),
            },

            TransportEvent::Data(bytes) => match self.state {
                Connected => vec![Action::Notify(SessionNotice::ChatMessage(bytes))],
                _ => Vec::new(),
            },

            TransportEvent::Closed => match self.state {
                // Orderly remote hang-up: a normal end, not an error.
                Connected => {
                    self.state = Closed;
                    vec![
                        Action::CloseTransport,
                        Action::ReleaseStreams,
                        Action::Notify(SessionNotice::Ended),
                    ]
                }
                Negotiating => {
                    self.fail(SessionError::Transport("closed before connecting".into()))
                }
                _ => Vec::new(),
            },

            TransportEvent::Error(message) => match self.state {
                Negotiating | Connected => self.fail(SessionError::Transport(message)),
                _ => Vec::new(),
            },
        }
    }

    fn fail(&mut self, reason: SessionError) -> Vec<Action> {
        self.state = ConnectionState::Failed;
        vec![
            Action::CancelOfferTimer,
            Action::CloseTransport,
            Action::CloseRelay,
            Action::ReleaseStreams,
            Action::Notify(SessionNotice::Failed(reason)),
        ]
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
