use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tandem_proto::{PeerId, SessionId};
use tracing::warn;

use crate::error::RelayError;

/// Relay-side session lifecycle. Transitions are monotonic: the only
/// backward edge is into `Closed`, which is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Pairing,
    Negotiating,
    Connected,
    Closed,
}

/// An active or pending two-party session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub host: PeerId,
    pub guest: PeerId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn counterpart_of(&self, peer_id: &PeerId) -> Option<PeerId> {
        if *peer_id == self.host {
            Some(self.guest)
        } else if *peer_id == self.guest {
            Some(self.host)
        } else {
            None
        }
    }

    /// Apply a forward transition. Anything else is refused, except that
    /// `Closed` is always reachable.
    fn advance(&mut self, next: SessionState) -> bool {
        if next == SessionState::Closed || next > self.state {
            self.state = next;
            true
        } else {
            false
        }
    }
}

/// Owns every live session and the peer -> session index used for routing.
/// Routing is derived from session membership only; a client-supplied
/// destination is never trusted.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    by_peer: HashMap<PeerId, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, host: PeerId, guest: PeerId) -> Result<SessionId, RelayError> {
        if host == guest {
            return Err(RelayError::InvalidPair);
        }
        let id = SessionId::generate();
        self.sessions.insert(
            id,
            Session {
                id,
                host,
                guest,
                state: SessionState::Pairing,
                created_at: Utc::now(),
            },
        );
        self.by_peer.insert(host, id);
        self.by_peer.insert(guest, id);
        Ok(id)
    }

    pub fn lookup(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn session_of(&self, peer_id: &PeerId) -> Option<&Session> {
        self.by_peer
            .get(peer_id)
            .and_then(|id| self.sessions.get(id))
    }

    /// Counterpart of `peer_id` in its live session, if any.
    pub fn counterpart(&self, peer_id: &PeerId) -> Option<PeerId> {
        self.session_of(peer_id)
            .filter(|session| session.state != SessionState::Closed)
            .and_then(|session| session.counterpart_of(peer_id))
    }

    pub fn begin_negotiation(&mut self, id: &SessionId) {
        if let Some(session) = self.sessions.get_mut(id) {
            if !session.advance(SessionState::Negotiating) {
                warn!(session = %id, state = ?session.state, "refusing backward transition");
            }
        }
    }

    pub fn mark_connected(&mut self, id: &SessionId) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.advance(SessionState::Connected);
        }
    }

    /// Close and drop the session. Idempotent: closing an unknown id
    /// returns `None`. The removed session is handed back so the caller
    /// can notify the surviving participant.
    pub fn close(&mut self, id: &SessionId) -> Option<Session> {
        let mut session = self.sessions.remove(id)?;
        session.advance(SessionState::Closed);
        self.by_peer.remove(&session.host);
        self.by_peer.remove(&session.guest);
        Some(session)
    }

    /// Close whatever session `peer_id` is part of.
    pub fn close_for(&mut self, peer_id: &PeerId) -> Option<Session> {
        let id = *self.by_peer.get(peer_id)?;
        self.close(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_self_pairing() {
        let mut registry = SessionRegistry::new();
        let a = PeerId::generate();
        assert_eq!(registry.create(a, a), Err(RelayError::InvalidPair));
    }

    #[test]
    fn counterpart_is_derived_from_membership() {
        let mut registry = SessionRegistry::new();
        let (a, b, stranger) = (PeerId::generate(), PeerId::generate(), PeerId::generate());
        let id = registry.create(a, b).unwrap();

        assert_eq!(registry.counterpart(&a), Some(b));
        assert_eq!(registry.counterpart(&b), Some(a));
        assert_eq!(registry.counterpart(&stranger), None);
        assert_eq!(registry.lookup(&id).unwrap().state, SessionState::Pairing);
    }

    #[test]
    fn transitions_are_monotonic() {
        let mut session = Session {
            id: SessionId::generate(),
            host: PeerId::generate(),
            guest: PeerId::generate(),
            state: SessionState::Pairing,
            created_at: Utc::now(),
        };
        assert!(session.advance(SessionState::Negotiating));
        assert!(!session.advance(SessionState::Pairing));
        assert!(session.advance(SessionState::Connected));
        assert!(!session.advance(SessionState::Negotiating));
        assert!(session.advance(SessionState::Closed));
    }

    #[test]
    fn close_is_idempotent_and_stops_routing() {
        let mut registry = SessionRegistry::new();
        let (a, b) = (PeerId::generate(), PeerId::generate());
        let id = registry.create(a, b).unwrap();

        let closed = registry.close(&id).unwrap();
        assert_eq!(closed.state, SessionState::Closed);
        assert!(registry.close(&id).is_none());
        assert_eq!(registry.counterpart(&a), None);
        assert_eq!(registry.counterpart(&b), None);
    }

    #[test]
    fn close_for_finds_the_session_by_either_peer() {
        let mut registry = SessionRegistry::new();
        let (a, b) = (PeerId::generate(), PeerId::generate());
        registry.create(a, b).unwrap();

        let closed = registry.close_for(&b).unwrap();
        assert_eq!(closed.counterpart_of(&b), Some(a));
        assert!(registry.close_for(&a).is_none());
    }
}
