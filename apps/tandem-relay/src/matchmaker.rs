use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tandem_proto::PeerId;

use crate::error::RelayError;

/// A client waiting to be paired.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub peer_id: PeerId,
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO matchmaking queue. A peer id appears at most once; duplicates are
/// rejected rather than reordered so a client cannot jump the line by
/// re-joining.
#[derive(Debug, Default)]
pub struct Matchmaker {
    entries: VecDeque<QueueEntry>,
    present: HashSet<PeerId>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, peer_id: PeerId) -> Result<(), RelayError> {
        if !self.present.insert(peer_id) {
            return Err(RelayError::AlreadyQueued);
        }
        self.entries.push_back(QueueEntry {
            peer_id,
            enqueued_at: Utc::now(),
        });
        Ok(())
    }

    /// Pop the two longest-waiting entries. The first-arrived peer is
    /// returned first and becomes the session host; the tie-break is
    /// arrival order, so pairing is deterministic.
    pub fn dequeue_pair(&mut self) -> Option<(PeerId, PeerId)> {
        if self.entries.len() < 2 {
            return None;
        }
        let first = self.entries.pop_front()?;
        let second = self.entries.pop_front()?;
        self.present.remove(&first.peer_id);
        self.present.remove(&second.peer_id);
        Some((first.peer_id, second.peer_id))
    }

    /// Safe to call for a peer that is not queued.
    pub fn remove(&mut self, peer_id: &PeerId) -> bool {
        if !self.present.remove(peer_id) {
            return false;
        }
        self.entries.retain(|entry| entry.peer_id != *peer_id);
        true
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.present.contains(peer_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
