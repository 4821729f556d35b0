//! Runs a session: one task owning the relay connection, the transport
//! handle, the local stream and the offer timer, pumping every event
//! source through the state machine one event at a time.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Sleep};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::media::{DeviceCapture, MediaConstraints, MediaStream};
use crate::relay::RelayConnection;
use crate::session::machine::{
    Action, ConnectionState, SessionEvent, SessionMachine, SessionNotice, UserCommand,
};
use crate::transport::{PeerTransport, TransportConfig, TransportEvent, TransportFactory};

const DEFAULT_OFFER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub relay_url: String,
    /// Bounded wait for the host's offer while we are the guest.
    pub offer_timeout: Duration,
    pub constraints: MediaConstraints,
}

impl SessionConfig {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            offer_timeout: DEFAULT_OFFER_TIMEOUT,
            constraints: MediaConstraints::default(),
        }
    }
}

enum DriverCommand {
    User(UserCommand),
    SendChat(Vec<u8>),
}

/// Embedder's handle to a running session task.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<DriverCommand>,
    notices: mpsc::UnboundedReceiver<SessionNotice>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    pub fn join_queue(&self) {
        let _ = self.commands.send(DriverCommand::User(UserCommand::JoinQueue));
    }

    pub fn leave_queue(&self) {
        let _ = self.commands.send(DriverCommand::User(UserCommand::LeaveQueue));
    }

    pub fn hang_up(&self) {
        let _ = self.commands.send(DriverCommand::User(UserCommand::HangUp));
    }

    pub fn send_chat(&self, bytes: Vec<u8>) {
        let _ = self.commands.send(DriverCommand::SendChat(bytes));
    }

    pub async fn next_notice(&mut self) -> Option<SessionNotice> {
        self.notices.recv().await
    }

    /// Wait for the session task to finish tearing down. Dropping the
    /// command channel first lets a still-idle session wind down.
    pub async fn join(self) {
        let SessionHandle {
            commands,
            notices,
            task,
        } = self;
        drop(commands);
        drop(notices);
        let _ = task.await;
    }
}

/// Acquire the local stream, connect to the relay and spawn the session
/// task. Capture failures are reported here, before any signaling happens,
/// matching the permission gate the user sees first.
pub async fn start(
    config: SessionConfig,
    capture: Arc<dyn DeviceCapture>,
    factory: Arc<dyn TransportFactory>,
) -> Result<SessionHandle, SessionError> {
    let local_stream = capture
        .acquire(&config.constraints)
        .await
        .map_err(SessionError::from)?;

    let relay = match RelayConnection::connect(&config.relay_url).await {
        Ok(relay) => relay,
        Err(err) => {
            warn!(error = %err, "relay connection failed");
            capture.release(local_stream);
            return Err(SessionError::RelayLost);
        }
    };

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(run(
        config,
        capture,
        factory,
        relay,
        local_stream,
        cmd_rx,
        notice_tx,
    ));

    Ok(SessionHandle {
        commands: cmd_tx,
        notices: notice_rx,
        task,
    })
}

async fn run(
    config: SessionConfig,
    capture: Arc<dyn DeviceCapture>,
    factory: Arc<dyn TransportFactory>,
    mut relay: RelayConnection,
    stream: MediaStream,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
    notices: mpsc::UnboundedSender<SessionNotice>,
) {
    let mut machine = SessionMachine::new();
    let mut transport: Option<Box<dyn PeerTransport>> = None;
    let mut transport_events: Option<mpsc::UnboundedReceiver<TransportEvent>> = None;
    let mut local_stream = Some(stream);
    let mut remote_stream: Option<MediaStream> = None;
    let mut offer_deadline: Option<Pin<Box<Sleep>>> = None;
    let mut relay_open = true;
    let mut shutdown = false;

    machine.handle(SessionEvent::LocalStreamReady);

    loop {
        let event = tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(DriverCommand::User(command)) => SessionEvent::Command(command),
                Some(DriverCommand::SendChat(bytes)) => {
                    if machine.state() == ConnectionState::Connected {
                        if let Some(t) = &transport {
                            t.send(&bytes);
                        }
                    }
                    continue;
                }
                // The embedder dropped the handle: treat as a hang-up.
                None => {
                    shutdown = true;
                    SessionEvent::Command(UserCommand::HangUp)
                }
            },

            msg = relay.recv(), if relay_open => match msg {
                Some(message) => SessionEvent::Relay(message),
                None => {
                    relay_open = false;
                    SessionEvent::RelayClosed
                }
            },

            ev = async { transport_events.as_mut().expect("guarded").recv().await },
                if transport_events.is_some() =>
            {
                match ev {
                    Some(event) => SessionEvent::Transport(event),
                    None => {
                        transport_events = None;
                        continue;
                    }
                }
            }

            _ = async { offer_deadline.as_mut().expect("guarded").as_mut().await },
                if offer_deadline.is_some() =>
            {
                offer_deadline = None;
                SessionEvent::OfferTimeout
            }
        };

        for action in machine.handle(event) {
            match action {
                Action::SendRelay(message) => {
                    if relay_open {
                        relay.send(message);
                    }
                }
                Action::CreateTransport { initiator } => match &local_stream {
                    Some(stream) => {
                        let (instance, events) = factory.create(TransportConfig {
                            initiator,
                            local_stream: stream.clone(),
                        });
                        transport = Some(instance);
                        transport_events = Some(events);
                    }
                    None => warn!("no local stream available for the transport"),
                },
                Action::FeedTransport(payload) => {
                    if let Some(t) = &transport {
                        t.signal(payload);
                    }
                }
                Action::CloseTransport => {
                    if let Some(t) = transport.take() {
                        t.close();
                    }
                    transport_events = None;
                }
                Action::CloseRelay => {
                    relay.shutdown();
                    relay_open = false;
                }
                Action::ReleaseStreams => {
                    if let Some(stream) = local_stream.take() {
                        capture.release(stream);
                    }
                    remote_stream = None;
                }
                Action::StartOfferTimer => {
                    offer_deadline = Some(Box::pin(sleep(config.offer_timeout)));
                }
                Action::CancelOfferTimer => {
                    offer_deadline = None;
                }
                Action::Notify(notice) => {
                    if let SessionNotice::RemoteStream(stream) = &notice {
                        remote_stream = Some(stream.clone());
                    }
                    let _ = notices.send(notice);
                }
            }
        }

        if shutdown
            || matches!(
                machine.state(),
                ConnectionState::Closed | ConnectionState::Failed
            )
        {
            break;
        }
    }

    // Belt-and-braces teardown for paths that exit without the machine's
    // own release actions (handle dropped while idle, for instance).
    if let Some(t) = transport.take() {
        t.close();
    }
    if let Some(stream) = local_stream.take() {
        capture.release(stream);
    }
    remote_stream.take();
    relay.shutdown();
    debug!(state = ?machine.state(), "session task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::CaptureError;
    use crate::transport::mock::MockTransportFactory;
    use async_trait::async_trait;

    struct DeniedCapture;

    #[async_trait]
    impl DeviceCapture for DeniedCapture {
        async fn enumerate(&self) -> Result<Vec<crate::media::DeviceInfo>, CaptureError> {
            Ok(Vec::new())
        }
        async fn acquire(
            &self,
            _constraints: &MediaConstraints,
        ) -> Result<MediaStream, CaptureError> {
            Err(CaptureError::PermissionDenied)
        }
        fn release(&self, _stream: MediaStream) {}
    }

    #[tokio::test]
    async fn capture_denial_fails_before_any_signaling() {
        let result = start(
            SessionConfig::new("ws://127.0.0.1:1/ws"),
            Arc::new(DeniedCapture),
            Arc::new(MockTransportFactory::new()),
        )
        .await;
        assert_eq!(result.err(), Some(SessionError::PermissionDenied));
    }

    #[tokio::test]
    async fn unreachable_relay_reports_relay_lost_and_releases_the_stream() {
        let capture = Arc::new(crate::media::HeadlessCapture::new());
        let result = start(
            // Port 1 refuses connections.
            SessionConfig::new("ws://127.0.0.1:1/ws"),
            capture.clone(),
            Arc::new(MockTransportFactory::new()),
        )
        .await;
        assert_eq!(result.err(), Some(SessionError::RelayLost));
        assert_eq!(capture.live_streams(), 0);
    }
}
