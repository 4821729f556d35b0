//! Peer-transport contract. The library that actually moves media bytes
//! is external; the session machine only needs this seam: fire-and-forget
//! operations plus one persistent event stream per instance.

pub mod mock;

use tokio::sync::mpsc;

use tandem_proto::SignalPayload;

use crate::media::MediaStream;

/// Callbacks from a peer transport, delivered on the event stream handed
/// out at creation. One stream per instance; handlers are never
/// re-registered per message.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Locally produced negotiation artifact that must reach the
    /// counterpart through the relay.
    Signal(SignalPayload),
    /// The remote participant's media arrived.
    RemoteStream(MediaStream),
    /// Direct connectivity established.
    Connected,
    /// Application data channel bytes.
    Data(Vec<u8>),
    /// Orderly close.
    Closed,
    /// Fatal transport error.
    Error(String),
}

pub struct TransportConfig {
    pub initiator: bool,
    pub local_stream: MediaStream,
}

/// A live peer-transport instance. All operations are fire-and-forget;
/// outcomes surface as later events.
pub trait PeerTransport: Send {
    /// Feed a negotiation artifact received from the counterpart.
    fn signal(&self, payload: SignalPayload);
    /// Send application data once connected.
    fn send(&self, data: &[u8]);
    fn close(&self);
}

pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        config: TransportConfig,
    ) -> (Box<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>);
}
