//! Hot, multi-subscriber event hubs.
//!
//! Every event stream in tabmux (process output, lifecycle changes, window
//! resizes) is a broadcast hub: subscribers only see events emitted after
//! they subscribed, and nothing is replayed.

use futures::{StreamExt, stream::BoxStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

/// Default number of undelivered events a hub buffers per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast hub for events of type `T`.
///
/// Cloning a hub yields another handle to the same channel.
#[derive(Debug)]
pub struct EventHub<T> {
    sender: broadcast::Sender<T>,
}

impl<T> Clone for EventHub<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventHub<T> {
    /// Create a hub with [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a hub that buffers at most `capacity` events per subscriber.
    ///
    /// Subscribers that fall further behind skip the oldest events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver an event to every current subscriber.
    ///
    /// Returns how many subscribers received it. Emitting with no
    /// subscribers is not an error; the event is simply dropped.
    pub fn emit(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of events emitted from now on. Lagged gaps are logged and skipped.
    #[must_use]
    pub fn stream(&self) -> BoxStream<'static, T> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event stream lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}

/// Receive the next event, skipping over lag gaps.
///
/// Returns `None` once every sender is gone.
pub async fn recv_next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Subscriber lagged, dropping oldest events");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Shared "window size changed" notifier.
///
/// Carries no payload: listeners re-fit their surface and read the new size
/// themselves.
#[derive(Debug, Clone, Default)]
pub struct WindowEvents {
    hub: EventHub<()>,
}

impl WindowEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tell every listener that the window size changed.
    pub fn notify_resized(&self) -> usize {
        self.hub.emit(())
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.hub.subscribe()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.hub.receiver_count()
    }
}
