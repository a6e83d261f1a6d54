#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff as _;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, sleep_until};

use super::config::ConnectionConfig;
use super::error::WsError;
use super::state::{CLOSE_REASON, ConnectionState, NORMAL_CLOSURE, Session, SocketSlot};
use super::stream::{self, Delivery, Emitter, MessageStream};
use super::traits::{ConnectRequest, Socket, Transport, TransportEvent};
use crate::Result;
use crate::error::Error;

/// Stand-in deadline for inactivity windows too long for the clock to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How one connect cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    /// Timed out, failed or closed by the peer: connect again
    Restart,
    /// The session is over
    Stop,
}

/// Settings a running session reads, captured when it opens.
struct SessionConfig {
    request: ConnectRequest,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    throttle: backoff::backoff::Constant,
    capacity: usize,
}

/// Drives the connection through `Idle -> Connecting -> Open -> Closing -> Idle`.
///
/// The supervisor handles all connection concerns of a session:
/// - Connecting lazily, once the returned [`MessageStream`] is first polled
/// - Forwarding inbound text frames in arrival order
/// - Restarting after a transport failure, a peer close, or `timeout_seconds`
///   without any transport event, with a fixed pause before every reconnect
/// - Owning the single active socket, so `send` and `shut_down` see a
///   consistent handle
///
/// Retries are unconditional: a session only ends through
/// [`ConnectionSupervisor::shut_down`] or by dropping its stream.
pub struct ConnectionSupervisor {
    slot: SocketSlot,
    /// Watch channel sender for state changes
    state_tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionSupervisor {
    fn default() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            slot: SocketSlot::default(),
            state_tx,
        }
    }
}

impl ConnectionSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `config`, reserve the connection and start a session.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `config` is incomplete or another
    /// session is still running. No connect attempt is made in that case.
    pub fn open(self: &Arc<Self>, config: &ConnectionConfig) -> Result<MessageStream> {
        let (request, transport) = config.prepare()?;
        let session = self.slot.begin_session()?;

        let settings = SessionConfig {
            request,
            transport,
            timeout: config.timeout(),
            throttle: config.reconnect_backoff(),
            capacity: config.buffer_capacity(),
        };
        let (emitter, stream, start) = stream::channel(settings.capacity);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            session = session.id,
            url = %settings.request.url,
            timeout = ?settings.timeout,
            "Opening WebSocket session"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(session, settings, emitter, start).await;
        });

        Ok(stream)
    }

    /// Send a text frame on the active socket.
    ///
    /// Returns `false` without touching the transport when no socket is open.
    pub fn send(&self, text: &str) -> bool {
        let Some(socket) = self.slot.socket() else {
            #[cfg(feature = "tracing")]
            tracing::debug!("No active WebSocket, message not sent");
            return false;
        };

        let sent = socket.send(text);
        #[cfg(feature = "tracing")]
        tracing::debug!(result = sent, %text, "Sent WebSocket message");
        sent
    }

    /// Close the active socket with `1000 "disconnect"` and end the session.
    ///
    /// A connect still in flight is abandoned: its socket is closed as soon as
    /// the session task notices, and never becomes the active one. Does nothing
    /// when no session is running.
    pub fn shut_down(&self) {
        // Published under the slot lock, so a session opened right after cannot be overwritten.
        self.slot.shut_down(|socket| {
            self.state_tx.send_replace(ConnectionState::Closing);
            if let Some(socket) = socket {
                #[cfg(feature = "tracing")]
                tracing::info!("Closing WebSocket");
                socket.close(NORMAL_CLOSURE, CLOSE_REASON);
            }
            self.state_tx.send_replace(ConnectionState::Idle);
        });
    }

    /// Whether a session is running, connected or not.
    #[must_use]
    pub fn in_session(&self) -> bool {
        self.slot.in_session()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Publish `state` unless `session` has been shut down meanwhile.
    fn publish(&self, session: &Session, state: ConnectionState) {
        self.slot
            .with_current(session, || self.state_tx.send_replace(state));
    }

    /// Session task: wait for the first poll, supervise, then release the slot.
    async fn run(
        self: Arc<Self>,
        session: Session,
        mut settings: SessionConfig,
        emitter: Emitter,
        start: oneshot::Receiver<()>,
    ) {
        // Cold until the consumer first asks for an item.
        let started = tokio::select! {
            biased;

            () = session.token.cancelled() => false,
            started = start => started.is_ok(),
        };

        if started {
            self.supervise(&session, &mut settings, &emitter).await;
        }

        // Reached when the stream was dropped; an explicit shutdown has already cleaned up.
        self.slot.end_session(&session, |held| {
            if let Some(socket) = held {
                socket.close(NORMAL_CLOSURE, CLOSE_REASON);
            }
            self.state_tx.send_replace(ConnectionState::Idle);
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(session = session.id, "WebSocket session ended");
    }

    /// Connect loop with unconditional reconnection.
    async fn supervise(&self, session: &Session, settings: &mut SessionConfig, emitter: &Emitter) {
        let mut attempt = 0_u32;

        loop {
            if attempt > 0
                && let Some(delay) = settings.throttle.next_backoff()
            {
                #[cfg(feature = "tracing")]
                tracing::debug!(?delay, attempt, "Waiting before reconnecting");

                tokio::select! {
                    biased;

                    () = session.token.cancelled() => break,
                    () = emitter.closed() => break,
                    () = sleep(delay) => {}
                }
            }

            attempt = attempt.saturating_add(1);
            self.publish(session, ConnectionState::Connecting { attempt });

            #[cfg(feature = "tracing")]
            tracing::info!(attempt, url = %settings.request.url, "Connecting WebSocket");

            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let socket = settings.transport.connect(&settings.request, events_tx);

            let mut adopted = false;
            let cycle = self
                .drive(session, &socket, events_rx, settings.timeout, emitter, &mut adopted)
                .await;

            match cycle {
                Cycle::Restart => {
                    // The old socket goes before the next connect is issued. An adopted socket
                    // missing from the slot was already closed by `shut_down`.
                    if self.slot.release(session).is_some() || !adopted {
                        socket.close(NORMAL_CLOSURE, CLOSE_REASON);
                    }
                }
                Cycle::Stop => {
                    // Never adopted means nobody else knows about it.
                    if !adopted {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Closing socket of abandoned connect");
                        socket.close(NORMAL_CLOSURE, CLOSE_REASON);
                    }
                    break;
                }
            }
        }
    }

    /// Handle one connect attempt until it has to be restarted or the session ends.
    async fn drive(
        &self,
        session: &Session,
        socket: &Arc<dyn Socket>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        timeout: Duration,
        emitter: &Emitter,
        adopted: &mut bool,
    ) -> Cycle {
        let deadline = sleep_until(deadline_after(timeout));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                () = session.token.cancelled() => return Cycle::Stop,
                () = emitter.closed() => return Cycle::Stop,
                event = events.recv() => {
                    let Some(event) = event else {
                        let error = WsError::Transport("transport stopped reporting events".to_owned());
                        return Self::fail(emitter, error.into());
                    };
                    deadline.as_mut().reset(deadline_after(timeout));

                    match event {
                        TransportEvent::Open => {
                            if !self.slot.adopt(session, Arc::clone(socket)) {
                                #[cfg(feature = "tracing")]
                                tracing::debug!("Socket opened after shutdown, closing it");
                                return Cycle::Stop;
                            }
                            *adopted = true;
                            self.publish(session, ConnectionState::Open { since: Instant::now() });

                            #[cfg(feature = "tracing")]
                            tracing::info!("WebSocket open");
                        }
                        TransportEvent::Message(text) => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!(%text, "Received WebSocket text message");

                            if emitter.emit(Ok(text)) == Delivery::Closed {
                                return Cycle::Stop;
                            }
                        }
                        TransportEvent::Closing { code, reason } => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(code, %reason, "WebSocket closing");
                            #[cfg(not(feature = "tracing"))]
                            let _ = (&code, &reason);
                        }
                        TransportEvent::Closed { code, reason } => {
                            return Self::fail(emitter, WsError::ConnectionClosed { code, reason }.into());
                        }
                        TransportEvent::Failure(error) => {
                            return Self::fail(emitter, error);
                        }
                    }
                }
                () = &mut deadline => {
                    return Self::fail(emitter, WsError::Timeout { after: timeout }.into());
                }
            }
        }
    }

    /// Report `error` to the consumer and decide whether to reconnect.
    fn fail(emitter: &Emitter, error: Error) -> Cycle {
        #[cfg(feature = "tracing")]
        tracing::warn!(%error, "WebSocket failed, reconnecting");

        match emitter.emit(Err(error)) {
            Delivery::Closed => Cycle::Stop,
            Delivery::Delivered | Delivery::Dropped => Cycle::Restart,
        }
    }
}

/// Instant `timeout` from now, capped so huge windows never overflow.
fn deadline_after(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}
