//! Per-connection state machine.
//!
//! `Connecting → Authenticating → Replaying → Active → Closed`. The listener
//! completes the upgrade (Connecting) and hands the split socket to
//! [`SessionHandler::run`], which drives the rest:
//!
//! 1. **Authenticating**: parse `Authorization: <scheme> <token>` and validate
//!    the token. Failure sends `"unauthorized"`, closes, and never registers.
//! 2. **Replaying**: stream the `{self, peer}` conversation from the durable
//!    log. A query failure is logged and treated as empty history; a write
//!    failure ends the session.
//! 3. **Active**: register (closing any displaced session; a session that
//!    finished replaying after a newer one registered closes itself), then read frames
//!    until the stream ends, the session is cancelled, or the idle timeout
//!    fires. Each valid frame is appended to the log, then submitted to the
//!    router, regardless of whether the append succeeded.
//! 4. **Closed**: conditional unregister, then close the sink.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use courier_auth::{TokenValidator, parse_authorization};
use courier_core::{ChatMessage, InboundEnvelope, UserId};
use courier_store::MessageLog;
use futures::{Stream, StreamExt};
use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::SessionError;
use crate::metrics::{
    AUTH_FAILURES_TOTAL, MESSAGES_RECEIVED_TOTAL, PERSIST_FAILURES_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL,
};
use crate::registry::ConnectionRegistry;
use crate::router::RouterHandle;
use crate::session::{Session, SessionState};
use crate::sink::FrameSink;

/// Text sent before closing an unauthenticated channel.
pub const UNAUTHORIZED_NOTICE: &str = "unauthorized";

/// An inbound frame, decoupled from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping or pong control frame.
    Control,
    /// Peer sent a close frame.
    Close,
    /// Transport error.
    Error(String),
}

impl From<Result<Message, axum::Error>> for InboundFrame {
    fn from(frame: Result<Message, axum::Error>) -> Self {
        match frame {
            Ok(Message::Text(text)) => Self::Text(text.to_string()),
            Ok(Message::Binary(bytes)) => Self::Binary(bytes.to_vec()),
            Ok(Message::Ping(_) | Message::Pong(_)) => Self::Control,
            Ok(Message::Close(_)) => Self::Close,
            Err(e) => Self::Error(e.to_string()),
        }
    }
}

/// Why an authenticated session left the Active loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the channel or the stream ended.
    StreamEnded,
    /// Closed from outside: replaced by a newer session, a failed delivery, or shutdown.
    Cancelled,
    /// No inbound frame within the idle timeout.
    IdleTimeout,
}

/// Drives sessions from authentication to teardown.
pub struct SessionHandler {
    registry: Arc<ConnectionRegistry>,
    log: Arc<dyn MessageLog>,
    validator: Arc<dyn TokenValidator>,
    router: RouterHandle,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl SessionHandler {
    /// Create a handler. Sessions are cancelled when `shutdown` fires.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        log: Arc<dyn MessageLog>,
        validator: Arc<dyn TokenValidator>,
        router: RouterHandle,
        idle_timeout: Option<Duration>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            log,
            validator,
            router,
            idle_timeout,
            shutdown,
        }
    }

    /// Run one upgraded connection to completion.
    ///
    /// `authorization` is the raw `Authorization` header; `peer` comes from
    /// the `username` query parameter.
    #[instrument(skip_all, fields(peer = ?peer.as_ref().map(UserId::as_str)))]
    pub async fn run<S>(
        &self,
        mut inbound: S,
        sink: Arc<dyn FrameSink>,
        authorization: Option<&str>,
        peer: Option<UserId>,
    ) -> Result<CloseReason, SessionError>
    where
        S: Stream<Item = InboundFrame> + Unpin + Send,
    {
        counter!(WS_CONNECTIONS_TOTAL).increment(1);

        let user = match self.authenticate(authorization) {
            Ok(user) => user,
            Err(error) => {
                warn!(%error, "rejecting connection");
                counter!(AUTH_FAILURES_TOTAL, "surface" => "ws").increment(1);
                let _ = sink.send_text(UNAUTHORIZED_NOTICE.to_string()).await;
                sink.close().await;
                return Err(error);
            }
        };

        let session = Arc::new(Session::new(
            user,
            peer,
            sink,
            self.shutdown.child_token(),
        ));
        info!(user = %session.user(), session_id = %session.id(), "session authenticated");

        let _ = session.advance(SessionState::Replaying);
        if let Err(error) = self.replay(&session).await {
            warn!(session_id = %session.id(), %error, "history replay failed, closing");
            session.close().await;
            return Err(error);
        }

        let _ = session.advance(SessionState::Active);
        if let Some(displaced) = self.registry.register(Arc::clone(&session)) {
            if displaced.id() == session.id() {
                info!(
                    user = %session.user(),
                    session_id = %session.id(),
                    "newer session already registered, closing"
                );
                session.close().await;
                return Ok(CloseReason::Cancelled);
            }
            info!(
                user = %session.user(),
                displaced = %displaced.id(),
                "replacing existing session"
            );
            displaced.close().await;
        }
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let outcome = self.read_loop(&session, &mut inbound).await;

        let _ = self.registry.unregister(session.user(), &session);
        session.close().await;
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        match &outcome {
            Ok(reason) => info!(session_id = %session.id(), ?reason, "session closed"),
            Err(error) => warn!(session_id = %session.id(), %error, "session closed"),
        }
        outcome
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<UserId, SessionError> {
        let header = authorization.ok_or(courier_auth::AuthError::MalformedHeader)?;
        let token = parse_authorization(header)?;
        let assertion = self.validator.validate(token)?;
        Ok(assertion.subject().clone())
    }

    /// Write the stored conversation. Returns how many frames were sent.
    async fn replay(&self, session: &Session) -> Result<usize, SessionError> {
        let Some(peer) = session.peer() else {
            return Ok(0);
        };
        let history = match self.log.conversation(session.user(), peer).await {
            Ok(history) => history,
            Err(error) => {
                warn!(session_id = %session.id(), %error, "history query failed, continuing without it");
                return Ok(0);
            }
        };
        for message in &history {
            session.send_message(message).await?;
        }
        debug!(session_id = %session.id(), count = history.len(), "history replayed");
        Ok(history.len())
    }

    async fn read_loop<S>(&self, session: &Session, inbound: &mut S) -> Result<CloseReason, SessionError>
    where
        S: Stream<Item = InboundFrame> + Unpin + Send,
    {
        loop {
            let next = tokio::select! {
                biased;
                () = session.cancelled() => return Ok(CloseReason::Cancelled),
                next = next_frame(inbound, self.idle_timeout) => next,
            };
            let Some(frame) = next else {
                return Ok(CloseReason::IdleTimeout);
            };
            match frame {
                None | Some(InboundFrame::Close) => return Ok(CloseReason::StreamEnded),
                Some(InboundFrame::Error(e)) => return Err(SessionError::Read(e)),
                Some(InboundFrame::Control) => {}
                Some(InboundFrame::Text(text)) => self.accept(session, &text).await,
                Some(InboundFrame::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => self.accept(session, &text).await,
                    Err(_) => debug!(session_id = %session.id(), "dropping non-UTF-8 binary frame"),
                },
            }
        }
    }

    /// Validate, persist, then route one frame. Invalid frames are dropped.
    async fn accept(&self, session: &Session, text: &str) {
        let message = match InboundEnvelope::parse(text)
            .and_then(|envelope| envelope.into_message(session.user(), session.peer()))
        {
            Ok(message) => message,
            Err(error) => {
                warn!(session_id = %session.id(), %error, "dropping invalid frame");
                return;
            }
        };
        counter!(MESSAGES_RECEIVED_TOTAL).increment(1);
        self.persist(&message).await;
        if !self.router.submit(message) {
            warn!(session_id = %session.id(), "router stopped, message not routed");
        }
    }

    async fn persist(&self, message: &ChatMessage) {
        if let Err(error) = self.log.append(message).await {
            counter!(PERSIST_FAILURES_TOTAL).increment(1);
            warn!(from = %message.from, to = %message.to, %error, "failed to persist message");
        }
    }
}

/// Next frame, or `None` if the idle timeout elapsed first.
async fn next_frame<S>(inbound: &mut S, idle_timeout: Option<Duration>) -> Option<Option<InboundFrame>>
where
    S: Stream<Item = InboundFrame> + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, inbound.next()).await.ok(),
        None => Some(inbound.next().await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use crate::sink::testing::{RecordingSink, SinkEvent, drain};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use courier_auth::{Assertion, AuthError};
    use courier_store::StoreError;
    use futures::channel::mpsc as frame_channel;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::task::JoinHandle;

    const WAIT: Duration = Duration::from_secs(2);

    // ─── Fakes ───

    #[derive(Default)]
    struct FakeLog {
        rows: parking_lot::Mutex<Vec<ChatMessage>>,
        fail_append: AtomicBool,
        fail_query: AtomicBool,
        /// Park the next `conversation` call until `release_query` fires.
        hold_next_query: AtomicBool,
        query_held: Notify,
        release_query: Notify,
    }

    impl FakeLog {
        fn rows(&self) -> Vec<ChatMessage> {
            self.rows.lock().clone()
        }
    }

    #[async_trait]
    impl MessageLog for FakeLog {
        async fn append(&self, message: &ChatMessage) -> courier_store::Result<()> {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(StoreError::Internal("disk full".into()));
            }
            self.rows.lock().push(message.clone());
            Ok(())
        }

        async fn conversation(
            &self,
            a: &UserId,
            b: &UserId,
        ) -> courier_store::Result<Vec<ChatMessage>> {
            if self.hold_next_query.swap(false, Ordering::SeqCst) {
                self.query_held.notify_one();
                self.release_query.notified().await;
            }
            if self.fail_query.load(Ordering::SeqCst) {
                return Err(StoreError::Internal("db locked".into()));
            }
            Ok(self
                .rows
                .lock()
                .iter()
                .filter(|m| m.is_between(a, b))
                .cloned()
                .collect())
        }
    }

    /// Accepts tokens of the form `valid-<login>`.
    struct PrefixValidator;

    impl TokenValidator for PrefixValidator {
        fn validate(&self, token: &str) -> courier_auth::Result<Assertion> {
            token
                .strip_prefix("valid-")
                .filter(|login| !login.is_empty())
                .map(|login| Assertion::new(UserId::new(login)))
                .ok_or_else(|| AuthError::InvalidToken("bad signature".into()))
        }
    }

    // ─── Harness ───

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        log: Arc<FakeLog>,
        handler: Arc<SessionHandler>,
        shutdown: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_idle_timeout(None)
        }

        fn with_idle_timeout(idle_timeout: Option<Duration>) -> Self {
            let registry = Arc::new(ConnectionRegistry::new());
            let log = Arc::new(FakeLog::default());
            let shutdown = CancellationToken::new();
            let (router, handle) = Router::new(Arc::clone(&registry));
            let _ = tokio::spawn(router.run(shutdown.clone()));
            let handler = Arc::new(SessionHandler::new(
                Arc::clone(&registry),
                log.clone(),
                Arc::new(PrefixValidator),
                handle,
                idle_timeout,
                shutdown.clone(),
            ));
            Self {
                registry,
                log,
                handler,
                shutdown,
            }
        }

        fn seed(&self, from: &str, to: &str, body: &str) {
            self.log.rows.lock().push(msg(from, to, body));
        }

        /// Start a session in the background.
        fn connect(&self, auth: Option<&str>, peer: Option<&str>) -> Client {
            let (sink, events) = RecordingSink::new();
            self.connect_with(sink, events, auth, peer)
        }

        fn connect_with(
            &self,
            sink: Arc<RecordingSink>,
            events: UnboundedReceiver<SinkEvent>,
            auth: Option<&str>,
            peer: Option<&str>,
        ) -> Client {
            let (frames_tx, frames_rx) = frame_channel::unbounded();
            let handler = Arc::clone(&self.handler);
            let auth = auth.map(str::to_owned);
            let peer = peer.map(UserId::new);
            let task = tokio::spawn(async move {
                handler.run(frames_rx, sink, auth.as_deref(), peer).await
            });
            Client {
                frames: frames_tx,
                events,
                task,
            }
        }

        async fn wait_registered(&self, user: &str) -> Arc<Session> {
            let user = UserId::new(user);
            tokio::time::timeout(WAIT, async {
                loop {
                    if let Some(session) = self.registry.lookup(&user) {
                        return session;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .unwrap()
        }
    }

    struct Client {
        frames: frame_channel::UnboundedSender<InboundFrame>,
        events: UnboundedReceiver<SinkEvent>,
        task: JoinHandle<Result<CloseReason, SessionError>>,
    }

    impl Client {
        fn send(&self, text: &str) {
            self.frames
                .unbounded_send(InboundFrame::Text(text.to_string()))
                .unwrap();
        }

        async fn next_event(&mut self) -> SinkEvent {
            tokio::time::timeout(WAIT, self.events.recv())
                .await
                .unwrap()
                .unwrap()
        }

        async fn next_json(&mut self) -> serde_json::Value {
            match self.next_event().await {
                SinkEvent::Text(t) => serde_json::from_str(&t).unwrap(),
                SinkEvent::Closed => panic!("expected a frame, got close"),
            }
        }

        async fn finish(self) -> Result<CloseReason, SessionError> {
            tokio::time::timeout(WAIT, self.task).await.unwrap().unwrap()
        }
    }

    fn msg(from: &str, to: &str, body: &str) -> ChatMessage {
        ChatMessage::new(UserId::new(from), UserId::new(to), body).unwrap()
    }

    // ─── Authenticating ───

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let h = Harness::new();
        let mut client = h.connect(None, Some("bob"));
        assert_eq!(client.next_event().await, SinkEvent::Text("unauthorized".into()));
        assert_eq!(client.next_event().await, SinkEvent::Closed);
        assert_matches!(client.finish().await, Err(SessionError::Unauthorized(_)));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn malformed_header_is_unauthorized() {
        let h = Harness::new();
        for header in ["valid-alice", "Bearer", "Bearer valid-alice extra", ""] {
            let mut client = h.connect(Some(header), Some("bob"));
            assert_eq!(client.next_event().await, SinkEvent::Text("unauthorized".into()));
            assert_matches!(
                client.finish().await,
                Err(SessionError::Unauthorized(AuthError::MalformedHeader))
            );
        }
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let h = Harness::new();
        h.seed("alice", "bob", "secret history");
        let mut client = h.connect(Some("Bearer forged"), Some("bob"));
        assert_eq!(client.next_event().await, SinkEvent::Text("unauthorized".into()));
        assert_eq!(client.next_event().await, SinkEvent::Closed);
        assert_matches!(
            client.finish().await,
            Err(SessionError::Unauthorized(AuthError::InvalidToken(_)))
        );
        assert!(h.registry.is_empty());
    }

    // ─── Replaying ───

    #[tokio::test]
    async fn replays_pair_history_in_order() {
        let h = Harness::new();
        h.seed("alice", "bob", "1");
        h.seed("carol", "alice", "not ours");
        h.seed("bob", "alice", "2");
        h.seed("alice", "bob", "3");

        let mut alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        for expected in ["1", "2", "3"] {
            assert_eq!(alice.next_json().await["msg"], expected);
        }
        let _ = h.wait_registered("alice").await;
        assert!(alice.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn history_query_failure_is_not_fatal() {
        let h = Harness::new();
        h.seed("alice", "bob", "1");
        h.log.fail_query.store(true, Ordering::SeqCst);
        let _alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let session = h.wait_registered("alice").await;
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn replay_write_failure_closes_without_registering() {
        let h = Harness::new();
        h.seed("alice", "bob", "1");
        let (sink, events) = RecordingSink::new();
        sink.fail_writes();
        let client = h.connect_with(sink, events, Some("Bearer valid-alice"), Some("bob"));
        assert_matches!(client.finish().await, Err(SessionError::Write(_)));
        assert!(h.registry.is_empty());
    }

    // ─── Active ───

    #[tokio::test]
    async fn message_is_persisted_and_delivered() {
        let h = Harness::new();
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let mut bob = h.connect(Some("Bearer valid-bob"), Some("alice"));
        let _ = h.wait_registered("alice").await;
        let _ = h.wait_registered("bob").await;

        alice.send(r#"{"msg":"hi"}"#);
        assert_eq!(
            bob.next_json().await,
            serde_json::json!({"from": "alice", "to": "bob", "msg": "hi"})
        );
        assert_eq!(h.log.rows(), [msg("alice", "bob", "hi")]);
    }

    #[tokio::test]
    async fn client_supplied_identities_are_ignored() {
        let h = Harness::new();
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let mut bob = h.connect(Some("Bearer valid-bob"), Some("alice"));
        let _ = h.wait_registered("alice").await;
        let _ = h.wait_registered("bob").await;

        alice.send(r#"{"from":"mallory","to":"carol","msg":"hi"}"#);
        let frame = bob.next_json().await;
        assert_eq!(frame["from"], "alice");
        assert_eq!(frame["to"], "bob");
    }

    #[tokio::test]
    async fn malformed_frame_keeps_session_active() {
        let h = Harness::new();
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let mut bob = h.connect(Some("Bearer valid-bob"), Some("alice"));
        let alice_session = h.wait_registered("alice").await;
        let _ = h.wait_registered("bob").await;

        alice.send("{not json");
        alice.send(r#"{"msg":""}"#);
        alice.send(r#"{"msg":"after"}"#);
        assert_eq!(bob.next_json().await["msg"], "after");
        assert_eq!(alice_session.state(), SessionState::Active);
        assert_eq!(h.log.rows(), [msg("alice", "bob", "after")]);
    }

    #[tokio::test]
    async fn binary_utf8_frame_is_accepted() {
        let h = Harness::new();
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let mut bob = h.connect(Some("Bearer valid-bob"), Some("alice"));
        let _ = h.wait_registered("alice").await;
        let _ = h.wait_registered("bob").await;

        alice
            .frames
            .unbounded_send(InboundFrame::Binary(vec![0xff, 0xfe]))
            .unwrap();
        alice.frames.unbounded_send(InboundFrame::Control).unwrap();
        alice
            .frames
            .unbounded_send(InboundFrame::Binary(br#"{"msg":"bin"}"#.to_vec()))
            .unwrap();
        assert_eq!(bob.next_json().await["msg"], "bin");
    }

    #[tokio::test]
    async fn persist_failure_still_routes() {
        let h = Harness::new();
        h.log.fail_append.store(true, Ordering::SeqCst);
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let mut bob = h.connect(Some("Bearer valid-bob"), Some("alice"));
        let _ = h.wait_registered("alice").await;
        let _ = h.wait_registered("bob").await;

        alice.send(r#"{"msg":"hi"}"#);
        assert_eq!(bob.next_json().await["msg"], "hi");
        assert!(h.log.rows().is_empty());
    }

    #[tokio::test]
    async fn offline_recipient_still_persisted() {
        let h = Harness::new();
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let _ = h.wait_registered("alice").await;

        alice.send(r#"{"msg":"later"}"#);
        alice.frames.unbounded_send(InboundFrame::Close).unwrap();
        assert_eq!(alice.finish().await.unwrap(), CloseReason::StreamEnded);
        assert_eq!(h.log.rows(), [msg("alice", "bob", "later")]);
    }

    #[tokio::test]
    async fn without_peer_messages_are_dropped() {
        let h = Harness::new();
        h.seed("alice", "bob", "1");
        let Client {
            frames,
            mut events,
            task,
        } = h.connect(Some("Bearer valid-alice"), None);
        let _ = h.wait_registered("alice").await;

        frames
            .unbounded_send(InboundFrame::Text(r#"{"msg":"nowhere"}"#.into()))
            .unwrap();
        frames.unbounded_send(InboundFrame::Close).unwrap();
        let outcome = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), CloseReason::StreamEnded);
        assert_eq!(drain(&mut events), [SinkEvent::Closed]);
        assert_eq!(h.log.rows(), [msg("alice", "bob", "1")]);
    }

    // ─── Closed ───

    #[tokio::test]
    async fn stream_end_unregisters_and_closes() {
        let h = Harness::new();
        let mut alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let _ = h.wait_registered("alice").await;

        alice.frames.close_channel();
        assert_eq!(alice.next_event().await, SinkEvent::Closed);
        assert_eq!(alice.finish().await.unwrap(), CloseReason::StreamEnded);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn read_error_closes_session() {
        let h = Harness::new();
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let _ = h.wait_registered("alice").await;
        alice
            .frames
            .unbounded_send(InboundFrame::Error("reset".into()))
            .unwrap();
        assert_matches!(alice.finish().await, Err(SessionError::Read(_)));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn reconnect_replaces_and_closes_old_session() {
        let h = Harness::new();
        let mut first = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let s1 = h.wait_registered("alice").await;

        let _second = h.connect(Some("Bearer valid-alice"), Some("bob"));
        assert_eq!(first.next_event().await, SinkEvent::Closed);
        assert_eq!(first.finish().await.unwrap(), CloseReason::Cancelled);

        let current = h.wait_registered("alice").await;
        assert_ne!(current.id(), s1.id());
        assert_eq!(current.state(), SessionState::Active);
        assert_eq!(s1.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn slow_replay_does_not_displace_newer_session() {
        let h = Harness::new();
        h.log.hold_next_query.store(true, Ordering::SeqCst);
        let mut first = h.connect(Some("Bearer valid-alice"), Some("bob"));
        tokio::time::timeout(WAIT, h.log.query_held.notified())
            .await
            .unwrap();

        let mut second = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let s2 = h.wait_registered("alice").await;
        h.log.release_query.notify_one();

        assert_eq!(first.next_event().await, SinkEvent::Closed);
        assert_eq!(first.finish().await.unwrap(), CloseReason::Cancelled);

        let current = h.registry.lookup(&UserId::new("alice")).unwrap();
        assert_eq!(current.id(), s2.id());
        assert_eq!(s2.state(), SessionState::Active);
        assert!(second.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn idle_timeout_closes_session() {
        let h = Harness::with_idle_timeout(Some(Duration::from_millis(50)));
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        assert_eq!(alice.finish().await.unwrap(), CloseReason::IdleTimeout);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_active_sessions() {
        let h = Harness::new();
        let alice = h.connect(Some("Bearer valid-alice"), Some("bob"));
        let _ = h.wait_registered("alice").await;
        h.shutdown.cancel();
        assert_eq!(alice.finish().await.unwrap(), CloseReason::Cancelled);
        assert!(h.registry.is_empty());
    }

    #[test]
    fn axum_frames_map_to_inbound_frames() {
        assert_eq!(
            InboundFrame::from(Ok::<_, axum::Error>(Message::Text("hi".to_string().into()))),
            InboundFrame::Text("hi".into())
        );
        assert_eq!(
            InboundFrame::from(Ok::<_, axum::Error>(Message::Ping(Vec::new().into()))),
            InboundFrame::Control
        );
        assert_eq!(InboundFrame::from(Ok::<_, axum::Error>(Message::Close(None))), InboundFrame::Close);
    }
}
