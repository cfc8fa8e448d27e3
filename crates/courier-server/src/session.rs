//! One live connection: identity, lifecycle state, and outbound writes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_core::{ChatMessage, SessionId, UserId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::sink::{FrameSink, SinkError};

/// Session lifecycle.
///
/// States advance strictly in declaration order; any state may jump to
/// `Closed`, and `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Upgrade handshake in progress.
    ///
    /// This phase belongs to the listener (`ws_handler`). A [`Session`] is
    /// built only once the token has been read, so it is never observed in
    /// this state.
    Connecting,
    /// Validating the identity assertion.
    Authenticating,
    /// Streaming conversation history.
    Replaying,
    /// Registered and exchanging live messages.
    Active,
    /// Torn down.
    Closed,
}

impl SessionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::{Active, Authenticating, Closed, Connecting, Replaying};
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Replaying)
                | (Replaying, Active)
                | (Connecting | Authenticating | Replaying | Active, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Replaying => "replaying",
            Self::Active => "active",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// An authenticated connection.
///
/// A `Session` is created once the upgrade has completed and its identity
/// is known, so it starts in [`SessionState::Authenticating`]; the
/// `Connecting → Authenticating` step happens before it exists.
pub struct Session {
    id: SessionId,
    user: UserId,
    peer: Option<UserId>,
    sink: Arc<dyn FrameSink>,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Session {
    /// Bind an authenticated user (and optional peer) to a sink.
    ///
    /// Cancelling `cancel` (or calling [`close`](Self::close)) stops the
    /// session's read loop.
    pub fn new(
        user: UserId,
        peer: Option<UserId>,
        sink: Arc<dyn FrameSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user,
            peer,
            sink,
            state: Mutex::new(SessionState::Authenticating),
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    /// Unique id of this connection.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Authenticated user.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Conversation counterpart, fixed for the session's lifetime.
    pub fn peer(&self) -> Option<&UserId> {
        self.peer.as_ref()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `next` if the transition is legal. Returns whether it moved.
    pub fn advance(&self, next: SessionState) -> bool {
        let mut state = self.state.lock();
        let current = *state;
        if current.can_advance_to(next) {
            debug!(session_id = %self.id, from = %current, to = %next, "session state");
            *state = next;
            true
        } else {
            false
        }
    }

    /// Write a message as a JSON text frame.
    pub async fn send_message(&self, message: &ChatMessage) -> Result<(), SinkError> {
        self.send_text(message.to_frame()?).await
    }

    /// Write a raw text frame.
    pub async fn send_text(&self, text: String) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.sink.send_text(text).await
    }

    /// Resolves once the session has been closed or cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Move to `Closed`, stop the read loop, and close the sink.
    ///
    /// Idempotent; only the first call touches the sink.
    pub async fn close(&self) {
        let _ = self.advance(SessionState::Closed);
        self.cancel.cancel();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sink.close().await;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
