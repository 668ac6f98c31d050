//! Conversation history store
//!
//! Append-only, time-ordered round-trip log behind a single-writer lock.
//! The session event loop is the only writer; other activities read
//! through `snapshot`.

use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::session::{Conversation, RoundTrip};

/// Thread-safe handle to one session's history
#[derive(Debug, Clone)]
pub struct HistoryStore {
    conversation_id: Uuid,
    round_trips: Arc<Mutex<Vec<RoundTrip>>>,
}

impl HistoryStore {
    /// Create an empty history for a new conversation
    pub fn new() -> Self {
        Self {
            conversation_id: Uuid::new_v4(),
            round_trips: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Conversation this history belongs to
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Append a completed round trip; entries are never mutated after
    pub fn append(&self, round_trip: RoundTrip) {
        self.round_trips
            .lock()
            .expect("history lock poisoned")
            .push(round_trip);
    }

    /// Number of round trips collected so far
    pub fn len(&self) -> usize {
        self.round_trips.lock().expect("history lock poisoned").len()
    }

    /// Whether any round trips were collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent copy of the round trips collected so far
    pub fn snapshot(&self) -> Vec<RoundTrip> {
        self.round_trips
            .lock()
            .expect("history lock poisoned")
            .clone()
    }

    /// Close out the history into an owned conversation
    pub fn into_conversation(self) -> Conversation {
        Conversation {
            id: self.conversation_id,
            round_trips: self.snapshot(),
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}
