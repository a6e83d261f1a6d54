use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt as _};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::traits::Subscriber;
use crate::Result;

/// Inbound text messages of one session.
///
/// The stream is cold: the supervisor makes its first connect attempt only
/// once the stream is polled (or handed to [`MessageStream::subscribe`]).
/// `Err` items report a failed or timed out connection and are followed by a
/// reconnect, so they never end the stream. It ends after the client's
/// [`shut_down_socket`](crate::WebSocketClient::shut_down_socket).
///
/// A consumer that falls behind loses messages instead of slowing the
/// connection down: once `buffer_capacity` items are waiting, new ones are
/// discarded and counted in [`MessageStream::dropped`].
///
/// Dropping the stream ends the session and closes the socket.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<Result<String>>,
    start: Option<oneshot::Sender<()>>,
    dropped: Arc<AtomicU64>,
}

impl MessageStream {
    /// Number of items discarded so far because the consumer was not keeping up.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drive `subscriber` with this stream's items on a background task.
    ///
    /// # Example
    ///
    /// ```ignore
    /// struct Printer;
    ///
    /// #[async_trait]
    /// impl Subscriber for Printer {
    ///     async fn on_message(&mut self, message: String) {
    ///         println!("{message}");
    ///     }
    /// }
    ///
    /// let subscription = client.open()?.subscribe(Printer);
    /// ```
    pub fn subscribe<S: Subscriber>(self, mut subscriber: S) -> Subscription {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let mut stream = self;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    () = cancelled.cancelled() => break,
                    item = stream.next() => match item {
                        Some(Ok(message)) => subscriber.on_message(message).await,
                        Some(Err(error)) => subscriber.on_error(error).await,
                        None => {
                            subscriber.on_complete().await;
                            break;
                        }
                    },
                }
            }
        });

        Subscription {
            token,
            handle: Some(handle),
        }
    }
}

impl Stream for MessageStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(start) = self.start.take() {
            _ = start.send(());
        }
        self.rx.poll_recv(cx)
    }
}

/// A [`Subscriber`] attached to a [`MessageStream`].
///
/// Dropping the subscription detaches the subscriber and, with it, the stream,
/// which ends the session.
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivering to the subscriber. `on_complete` is not called.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    /// Whether the subscriber task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait until the stream completes or the subscription is cancelled.
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Result of handing one item to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Dropped,
    /// The [`MessageStream`] is gone
    Closed,
}

/// Producer half of a [`MessageStream`]. Never blocks.
#[derive(Debug)]
pub(crate) struct Emitter {
    tx: mpsc::Sender<Result<String>>,
    dropped: Arc<AtomicU64>,
}

impl Emitter {
    pub(crate) fn emit(&self, item: Result<String>) -> Delivery {
        match self.tx.try_send(item) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(item)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                tracing::trace!(?item, "Consumer is behind, dropping item");
                #[cfg(not(feature = "tracing"))]
                drop(item);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Resolves once the consumer has dropped its [`MessageStream`].
    pub(crate) async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Create a stream, its producer and the signal fired on the stream's first poll.
pub(crate) fn channel(capacity: usize) -> (Emitter, MessageStream, oneshot::Receiver<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let (start_tx, start_rx) = oneshot::channel();
    let dropped = Arc::new(AtomicU64::new(0));

    let emitter = Emitter {
        tx,
        dropped: Arc::clone(&dropped),
    };
    let stream = MessageStream {
        rx,
        start: Some(start_tx),
        dropped,
    };

    (emitter, stream, start_rx)
}
