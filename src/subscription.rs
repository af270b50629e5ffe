use crate::error::{MpdError, Result};
use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Multicast point that remembers the latest value
///
/// New subscribers receive the current value immediately, then every later
/// value in publish order. Values are not deduplicated.
pub struct Distributor<T> {
    latest: Mutex<Option<T>>,
    tx: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> Distributor<T> {
    /// Create a distributor with no value yet
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            latest: Mutex::new(None),
            tx,
        }
    }

    /// Create a distributor that starts out with `initial`
    pub fn with_initial(initial: T) -> Self {
        let distributor = Self::new();
        *distributor.latest.lock() = Some(initial);
        distributor
    }

    /// Store `value` as the latest and deliver it to every subscriber
    pub fn publish(&self, value: T) {
        let mut latest = self.latest.lock();
        *latest = Some(value.clone());
        // No receivers is fine, the value is still cached
        let _ = self.tx.send(value);
    }

    /// Get the latest value
    pub fn latest(&self) -> Option<T> {
        self.latest.lock().clone()
    }

    /// Subscribe, starting with the latest value
    pub fn subscribe(&self) -> Subscription<T> {
        // Holding the lock keeps a concurrent publish from landing between
        // the snapshot and the receiver
        let latest = self.latest.lock();
        Subscription {
            pending: latest.clone(),
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for Distributor<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of a [`Distributor`]
pub struct Subscription<T> {
    pending: Option<T>,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Receive the next value
    ///
    /// A subscriber that falls behind skips straight to the oldest value
    /// still buffered. Returns [`MpdError::ConnectionClosed`] once the
    /// distributor is gone.
    pub async fn recv(&mut self) -> Result<T> {
        if let Some(value) = self.pending.take() {
            return Ok(value);
        }
        loop {
            match self.rx.recv().await {
                Ok(value) => return Ok(value),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Subscriber lagged by {} values", n);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(MpdError::ConnectionClosed),
            }
        }
    }

    /// Try to receive a value without waiting
    ///
    /// Returns `None` if no value is available.
    pub fn try_recv(&mut self) -> Result<Option<T>> {
        if let Some(value) = self.pending.take() {
            return Ok(Some(value));
        }
        loop {
            match self.rx.try_recv() {
                Ok(value) => return Ok(Some(value)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(MpdError::ConnectionClosed)
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Subscriber lagged by {} values", n);
                }
            }
        }
    }

    /// Adapt into a [`Stream`] that ends when the distributor is dropped
    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.recv().await.ok().map(|value| (value, sub))
        })
    }
}
