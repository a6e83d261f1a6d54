//! [`Transport`] backed by `tokio-tungstenite`.
//!
//! **Feature flag:** `tungstenite` (enabled by default)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{Sink, SinkExt as _, Stream, StreamExt as _};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

use super::state::{CLOSE_REASON, NORMAL_CLOSURE};
use super::traits::{ConnectRequest, EventSender, Socket, Transport, TransportEvent};
use crate::Result;

/// Close code reported when the peer went away without a close frame.
const NO_STATUS_RECEIVED: u16 = 1005;
/// How long a locally initiated close waits for the peer's close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Opens sockets with [`tokio_tungstenite::connect_async`].
///
/// Each socket runs on its own tokio task. Text frames are reported as
/// [`TransportEvent::Message`]; binary frames are ignored and ping/pong is
/// answered by tungstenite itself.
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TungsteniteTransport {
    fn connect(&self, request: &ConnectRequest, events: EventSender) -> Arc<dyn Socket> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let request = request.clone();

        tokio::spawn(async move {
            socket_loop(request, commands_rx, events).await;
        });

        Arc::new(TungsteniteSocket {
            commands: commands_tx,
            closing: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
enum Command {
    Text(String),
    Close { code: u16, reason: String },
}

struct TungsteniteSocket {
    commands: mpsc::UnboundedSender<Command>,
    closing: AtomicBool,
}

impl Socket for TungsteniteSocket {
    fn send(&self, text: &str) -> bool {
        if self.closing.load(Ordering::Acquire) {
            return false;
        }
        self.commands.send(Command::Text(text.to_owned())).is_ok()
    }

    fn close(&self, code: u16, reason: &str) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.commands
            .send(Command::Close {
                code,
                reason: reason.to_owned(),
            })
            .is_ok()
    }
}

fn upgrade_request(request: &ConnectRequest) -> Result<Request> {
    let mut upgrade = request.url.as_str().into_client_request()?;
    let headers = upgrade.headers_mut();
    for (name, value) in &request.headers {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }
    Ok(upgrade)
}

/// Connect, then pump frames both ways until the socket is closed or fails.
async fn socket_loop(
    request: ConnectRequest,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventSender,
) {
    let upgrade = match upgrade_request(&request) {
        Ok(upgrade) => upgrade,
        Err(e) => {
            _ = events.send(TransportEvent::Failure(e));
            return;
        }
    };

    // Frames sent before the handshake completes go out right after it.
    let mut pending = Vec::new();
    let connecting = connect_async(upgrade);
    tokio::pin!(connecting);

    let ws_stream = loop {
        tokio::select! {
            connected = &mut connecting => match connected {
                Ok((ws_stream, _)) => break ws_stream,
                Err(e) => {
                    _ = events.send(TransportEvent::Failure(e.into()));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Text(text)) => pending.push(text),
                // Closed before it ever opened
                Some(Command::Close { .. }) | None => return,
            },
        }
    };

    let (mut write, mut read) = ws_stream.split();

    if events.send(TransportEvent::Open).is_err() {
        // Nobody is listening any more, so the socket is of no use.
        close_gracefully(&mut write, &mut read, close_message(NORMAL_CLOSURE, CLOSE_REASON)).await;
        return;
    }

    for text in pending {
        if let Err(e) = write.send(Message::Text(text.into())).await {
            _ = events.send(TransportEvent::Failure(e.into()));
            return;
        }
    }

    let mut peer_close: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if events.send(TransportEvent::Message(text.as_str().to_owned())).is_err() {
                        close_gracefully(&mut write, &mut read, close_message(NORMAL_CLOSURE, CLOSE_REASON)).await;
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((NO_STATUS_RECEIVED, String::new()), |frame| {
                        (u16::from(frame.code), frame.reason.as_str().to_owned())
                    });
                    _ = events.send(TransportEvent::Closing {
                        code,
                        reason: reason.clone(),
                    });
                    peer_close = Some((code, reason));
                }
                Some(Ok(_)) => {
                    // Binary frames are not supported and ping/pong is handled by tungstenite.
                }
                None | Some(Err(tungstenite::Error::ConnectionClosed)) => {
                    let (code, reason) =
                        peer_close.unwrap_or_else(|| (NO_STATUS_RECEIVED, String::new()));
                    _ = events.send(TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Err(e)) => {
                    _ = events.send(TransportEvent::Failure(e.into()));
                    return;
                }
            },
            // Once the supervisor closes a socket it stops reading its events.
            command = commands.recv() => match command {
                Some(Command::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        _ = events.send(TransportEvent::Failure(e.into()));
                        return;
                    }
                }
                Some(Command::Close { code, reason }) => {
                    close_gracefully(&mut write, &mut read, close_message(code, &reason)).await;
                    return;
                }
                None => {
                    close_gracefully(&mut write, &mut read, close_message(NORMAL_CLOSURE, CLOSE_REASON)).await;
                    return;
                }
            },
        }
    }
}

/// Send `close` and wait for the peer's reply, giving up after [`CLOSE_GRACE`].
///
/// A peer that stopped reading would otherwise keep the task and its TCP
/// connection alive for good.
async fn close_gracefully<W, R>(write: &mut W, read: &mut R, close: Message)
where
    W: Sink<Message> + Unpin,
    R: Stream<Item = tungstenite::Result<Message>> + Unpin,
{
    let closing = async {
        if write.send(close).await.is_ok() {
            while let Some(Ok(_)) = read.next().await {}
        }
    };

    if tokio::time::timeout(CLOSE_GRACE, closing).await.is_err() {
        #[cfg(feature = "tracing")]
        tracing::debug!(grace = ?CLOSE_GRACE, "Peer did not finish the closing handshake, dropping connection");
    }
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_owned().into(),
    }))
}
