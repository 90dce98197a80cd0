//! FIFO of key presses waiting for the next tick.

use std::collections::VecDeque;

use crate::registry::SessionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub session: SessionId,
    pub key: String,
}

/// Ordered buffer of input events across all sessions
///
/// Events are only ever appended at the back and taken from the front, so
/// arrival order is preserved across sessions and within each session.
/// Nothing is removed when a session disconnects; the drain skips events
/// whose session is no longer registered.
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, session: SessionId, key: impl Into<String>) {
        self.events.push_back(InputEvent {
            session,
            key: key.into(),
        });
    }

    pub fn pop(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
