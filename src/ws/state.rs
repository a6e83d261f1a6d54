use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::traits::Socket;
use crate::Result;
use crate::error::Error;

/// Status code used for every close initiated by this crate.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Reason sent alongside [`NORMAL_CLOSURE`].
pub const CLOSE_REASON: &str = "disconnect";

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionState {
    /// No session, or the session has been shut down
    Idle,
    /// A connect has been issued and the socket is not open yet
    Connecting {
        /// Connect attempts made in this session, including this one
        attempt: u32,
    },
    /// The transport reported the socket as open
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// An explicit shutdown is closing the socket
    Closing,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// One `open` ... `close` span. The id tells sessions apart after a reopen.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) token: CancellationToken,
}

#[derive(Default)]
struct Slot {
    socket: Option<Arc<dyn Socket>>,
    session: Option<Session>,
    next_id: u64,
}

/// Owner of the single live socket handle.
///
/// Every transition goes through one mutex, so an explicit shutdown racing a
/// reconnect can neither lose the close nor close the same socket twice.
#[derive(Default)]
pub(crate) struct SocketSlot {
    inner: Mutex<Slot>,
}

impl SocketSlot {
    // Nothing here leaves the slot half-updated, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the slot for a new session.
    pub(crate) fn begin_session(&self) -> Result<Session> {
        let mut slot = self.lock();
        if slot.socket.is_some() || slot.session.is_some() {
            return Err(Error::validation(
                "the websocket is running, please shut it down before opening it again",
            ));
        }

        slot.next_id = slot.next_id.wrapping_add(1);
        let session = Session {
            id: slot.next_id,
            token: CancellationToken::new(),
        };
        slot.session = Some(session.clone());
        Ok(session)
    }

    /// Whether a session currently holds the slot.
    pub(crate) fn in_session(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Store `socket` as the active one if `session` is still current.
    ///
    /// Returns `false` when the session has ended in the meantime. The caller
    /// then owns the socket and must close it.
    pub(crate) fn adopt(&self, session: &Session, socket: Arc<dyn Socket>) -> bool {
        let mut slot = self.lock();
        if !is_current(&slot, session) {
            return false;
        }
        slot.socket = Some(socket);
        true
    }

    /// Take the active socket of `session` so it can be discarded before a reconnect.
    pub(crate) fn release(&self, session: &Session) -> Option<Arc<dyn Socket>> {
        let mut slot = self.lock();
        if !is_current(&slot, session) {
            return None;
        }
        slot.socket.take()
    }

    /// End `session` if it still holds the slot, handing the socket it held to `f`.
    ///
    /// `f` runs under the slot lock, so no new session can start before it
    /// returns. Returns `false` without calling `f` when the session had already
    /// ended (an explicit shutdown got there first).
    pub(crate) fn end_session<F: FnOnce(Option<Arc<dyn Socket>>)>(&self, session: &Session, f: F) -> bool {
        let mut slot = self.lock();
        if slot.session.as_ref().is_none_or(|s| s.id != session.id) {
            return false;
        }
        slot.session = None;
        session.token.cancel();
        f(slot.socket.take());
        true
    }

    /// Run `f` under the slot lock, but only while `session` is current.
    pub(crate) fn with_current<R, F: FnOnce() -> R>(&self, session: &Session, f: F) -> Option<R> {
        let slot = self.lock();
        is_current(&slot, session).then(f)
    }

    /// End whichever session holds the slot, handing the active socket (if the
    /// session had got that far) to `f`.
    ///
    /// `f` runs under the slot lock. Returns `false` without calling `f` when the
    /// slot was already free.
    pub(crate) fn shut_down<F: FnOnce(Option<Arc<dyn Socket>>)>(&self, f: F) -> bool {
        let mut slot = self.lock();
        let session = slot.session.take();
        let socket = slot.socket.take();
        if session.is_none() && socket.is_none() {
            return false;
        }
        if let Some(session) = session {
            session.token.cancel();
        }
        f(socket);
        true
    }

    /// The active socket, if one is open.
    pub(crate) fn socket(&self) -> Option<Arc<dyn Socket>> {
        self.lock().socket.clone()
    }
}

fn is_current(slot: &Slot, session: &Session) -> bool {
    !session.token.is_cancelled() && slot.session.as_ref().is_some_and(|s| s.id == session.id)
}
