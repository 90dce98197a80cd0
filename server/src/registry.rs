//! Live session tracking and broadcast delivery.
//!
//! This module owns every connected session for the lifetime of its
//! connection:
//! - Session registration with a capacity limit and monotonically assigned ids
//! - Name lookups so the identity allocator can avoid live collisions
//! - Direct and broadcast delivery of outbound messages
//!
//! Sessions are stored in id order so broadcasts reach clients in the order
//! they connected.

use log::{info, warn};
use shared::Outbound;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

use crate::menu::MenuState;
use crate::world::OrganismId;

/// Server-assigned session identifier.
pub type SessionId = u32;

/// Outbound half of a client connection.
///
/// The network layer owns the receiving end and writes whatever arrives to
/// the socket. Once the connection is gone every send fails, which is how
/// dead sessions are discovered during delivery.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Creates a handle together with the receiver that would normally be
    /// drained by a connection writer.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, message: Outbound) -> Result<(), mpsc::error::SendError<Outbound>> {
        self.tx.send(message)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One connected client
///
/// A session keeps:
/// - Its display name, fixed for the lifetime of the connection
/// - The handle used to reach the client
/// - The menu it last loaded, including the materialized choices
/// - The organism it is currently looking at, if any
pub struct Session {
    pub id: SessionId,
    pub name: String,
    handle: SessionHandle,
    pub menu: Option<MenuState>,
    pub focus: Option<OrganismId>,
}

impl Session {
    pub fn new(id: SessionId, name: String, handle: SessionHandle) -> Self {
        Self {
            id,
            name,
            handle,
            menu: None,
            focus: None,
        }
    }

    pub fn send(&self, message: Outbound) -> Result<(), mpsc::error::SendError<Outbound>> {
        self.handle.send(message)
    }

    /// Key of the currently loaded menu.
    pub fn menu_key(&self) -> Option<&str> {
        self.menu.as_ref().map(|menu| menu.key.as_str())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("menu", &self.menu_key())
            .field("focus", &self.focus)
            .finish()
    }
}

/// Registry of all live sessions
///
/// The registry is owned by the coordinator and only touched from its loop,
/// so no locking is involved. Removing a session here is what takes it out
/// of every future broadcast.
pub struct ConnectionRegistry {
    /// Live sessions indexed by id
    sessions: BTreeMap<SessionId, Session>,
    /// Next id handed to a new session
    next_session_id: SessionId,
    /// Maximum number of concurrent sessions
    max_sessions: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry that accepts up to `max_sessions` sessions.
    /// Ids start from 1.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_session_id: 1,
            max_sessions,
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    /// Registers a new session under `name`
    ///
    /// Returns `None` when the registry is at capacity. The caller is
    /// responsible for having picked a name no live session holds.
    pub fn register(&mut self, name: String, handle: SessionHandle) -> Option<SessionId> {
        if self.is_full() {
            return None;
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} registered as {}", id, name);
        self.sessions.insert(id, Session::new(id, name, handle));
        Some(id)
    }

    /// Removes a session, returning it if it was still registered.
    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id);
        if let Some(session) = &session {
            info!("Session {} ({}) unregistered", id, session.name);
        }
        session
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn is_name_taken(&self, name: &str) -> bool {
        self.sessions.values().any(|session| session.name == name)
    }

    /// Names of all live sessions in connection order.
    pub fn names(&self) -> Vec<String> {
        self.sessions
            .values()
            .map(|session| session.name.clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Sends a message to a single session.
    ///
    /// Returns false if the session is unknown or its connection is gone.
    pub fn send_to(&self, id: SessionId, message: Outbound) -> bool {
        match self.sessions.get(&id) {
            Some(session) => session.send(message).is_ok(),
            None => false,
        }
    }

    /// Delivers a rendered message to every live session.
    pub fn broadcast<F>(&self, render: F) -> Vec<SessionId>
    where
        F: FnMut(&Session) -> Option<Outbound>,
    {
        self.broadcast_except(None, render)
    }

    /// Delivers a rendered message to every live session except `exclude`
    ///
    /// `render` may return `None` to skip a session. The id list is taken
    /// up front and each entry is looked up again before sending, so a
    /// session that vanished is simply skipped. A failed send is logged and
    /// does not stop delivery to the rest; the ids of failed sessions are
    /// returned so the caller can drop them.
    pub fn broadcast_except<F>(&self, exclude: Option<SessionId>, mut render: F) -> Vec<SessionId>
    where
        F: FnMut(&Session) -> Option<Outbound>,
    {
        let mut failed = Vec::new();

        for id in self.ids() {
            if Some(id) == exclude {
                continue;
            }
            let Some(session) = self.sessions.get(&id) else {
                continue;
            };
            let Some(message) = render(session) else {
                continue;
            };
            if let Err(e) = session.send(message) {
                warn!("Failed to send to session {} ({}): {}", id, session.name, e);
                failed.push(id);
            }
        }

        failed
    }

    /// Returns the number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
