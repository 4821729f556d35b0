//! In-process fake peer transport. Negotiation completes purely from the
//! signals it is fed, so two mock-backed clients talking through a real
//! relay will reach `Connected`; data and close cross directly between the
//! two halves created by one factory.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

use tandem_proto::SignalPayload;

use super::{PeerTransport, TransportConfig, TransportEvent, TransportFactory};
use crate::media::MediaStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    Normal,
    /// Produce no offer and answer none; drives the guest offer timeout.
    SwallowOffer,
    /// Report a fatal error immediately after creation.
    FailOnCreate,
}

struct Half {
    events: mpsc::UnboundedSender<TransportEvent>,
    peer: Mutex<Option<Weak<Half>>>,
}

impl Half {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn peer(&self) -> Option<Arc<Half>> {
        self.peer.lock().ok().and_then(|guard| {
            guard.as_ref().and_then(Weak::upgrade)
        })
    }
}

pub struct MockTransportFactory {
    pending: Mutex<Option<Arc<Half>>>,
    behavior: MockBehavior,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::Normal)
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            pending: Mutex::new(None),
            behavior,
        }
    }
}

impl Default for MockTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        config: TransportConfig,
    ) -> (Box<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let half = Arc::new(Half {
            events: tx,
            peer: Mutex::new(None),
        });

        // Consecutive creations are wired as a pair so data/close cross.
        if let Ok(mut pending) = self.pending.lock() {
            match pending.take() {
                Some(other) => {
                    if let (Ok(mut a), Ok(mut b)) = (other.peer.lock(), half.peer.lock()) {
                        *a = Some(Arc::downgrade(&half));
                        *b = Some(Arc::downgrade(&other));
                    }
                }
                None => *pending = Some(half.clone()),
            }
        }

        match self.behavior {
            MockBehavior::FailOnCreate => {
                half.emit(TransportEvent::Error("scripted transport failure".into()));
            }
            MockBehavior::Normal if config.initiator => {
                half.emit(TransportEvent::Signal(SignalPayload::Offer {
                    sdp: "v=0 mock offer".into(),
                }));
            }
            _ => {}
        }

        (
            Box::new(MockTransport {
                initiator: config.initiator,
                behavior: self.behavior,
                half,
            }),
            rx,
        )
    }
}

pub struct MockTransport {
    initiator: bool,
    behavior: MockBehavior,
    half: Arc<Half>,
}

impl MockTransport {
    fn establish(&self) {
        self.half.emit(TransportEvent::Connected);
        self.half
            .emit(TransportEvent::RemoteStream(MediaStream::new("mock-remote")));
    }
}

impl PeerTransport for MockTransport {
    fn signal(&self, payload: SignalPayload) {
        match payload {
            SignalPayload::Offer { .. } if !self.initiator => {
                if self.behavior == MockBehavior::SwallowOffer {
                    return;
                }
                self.half.emit(TransportEvent::Signal(SignalPayload::Answer {
                    sdp: "v=0 mock answer".into(),
                }));
                self.establish();
            }
            SignalPayload::Answer { .. } if self.initiator => {
                self.establish();
            }
            // Candidates and glare are the real library's problem.
            _ => {}
        }
    }

    fn send(&self, data: &[u8]) {
        if let Some(peer) = self.half.peer() {
            peer.emit(TransportEvent::Data(data.to_vec()));
        }
    }

    fn close(&self) {
        if let Some(peer) = self.half.peer() {
            peer.emit(TransportEvent::Closed);
        }
        if let Ok(mut guard) = self.half.peer.lock() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> MediaStream {
        MediaStream::new("test-local")
    }

    #[tokio::test]
    async fn initiator_produces_an_offer_on_creation() {
        let factory = MockTransportFactory::new();
        let (_host, mut events) = factory.create(TransportConfig {
            initiator: true,
            local_stream: stream(),
        });
        match events.recv().await.unwrap() {
            TransportEvent::Signal(SignalPayload::Offer { .. }) => {}
            other => panic!("expected offer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn guest_answers_and_both_sides_connect() {
        let factory = MockTransportFactory::new();
        let (host, mut host_events) = factory.create(TransportConfig {
            initiator: true,
            local_stream: stream(),
        });
        let (guest, mut guest_events) = factory.create(TransportConfig {
            initiator: false,
            local_stream: stream(),
        });

        let TransportEvent::Signal(offer) = host_events.recv().await.unwrap() else {
            panic!("expected host offer");
        };
        guest.signal(offer);

        let TransportEvent::Signal(answer) = guest_events.recv().await.unwrap() else {
            panic!("expected guest answer");
        };
        assert!(matches!(guest_events.recv().await.unwrap(), TransportEvent::Connected));

        host.signal(answer);
        assert!(matches!(host_events.recv().await.unwrap(), TransportEvent::Connected));
    }

    #[tokio::test]
    async fn data_and_close_cross_between_paired_halves() {
        let factory = MockTransportFactory::new();
        let (host, mut host_events) = factory.create(TransportConfig {
            initiator: true,
            local_stream: stream(),
        });
        let (guest, mut guest_events) = factory.create(TransportConfig {
            initiator: false,
            local_stream: stream(),
        });
        host_events.recv().await.unwrap(); // discard the offer

        host.send(b"hello");
        assert!(matches!(
            guest_events.recv().await.unwrap(),
            TransportEvent::Data(ref d) if d == b"hello"
        ));

        guest.close();
        assert!(matches!(host_events.recv().await.unwrap(), TransportEvent::Closed));
    }

    #[tokio::test]
    async fn muted_initiator_emits_no_offer() {
        let factory = MockTransportFactory::with_behavior(MockBehavior::SwallowOffer);
        let (_host, mut events) = factory.create(TransportConfig {
            initiator: true,
            local_stream: stream(),
        });
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn swallowed_offer_produces_no_answer() {
        let factory = MockTransportFactory::with_behavior(MockBehavior::SwallowOffer);
        let (guest, mut guest_events) = factory.create(TransportConfig {
            initiator: false,
            local_stream: stream(),
        });
        guest.signal(SignalPayload::Offer { sdp: "v=0".into() });
        assert!(guest_events.try_recv().is_err());
    }
}
