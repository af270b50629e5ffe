use crate::config::DEFAULT_POOL_CAPACITY;
use crate::types::Endpoint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-endpoint guard and its counters
struct EndpointGuard {
    semaphore: Arc<Semaphore>,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Snapshot of one endpoint's pool usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    /// Slots currently held
    pub in_use: usize,
    /// Slots handed out since the pool was created
    pub acquired: u64,
    /// Slots given back since the pool was created
    pub released: u64,
}

/// Bounds the number of simultaneous connections per endpoint
///
/// Shared between every connection user (command dispatch and monitors) that
/// targets the same daemon. Waiters are served in FIFO order.
pub struct ConnectionPool {
    capacity: usize,
    guards: Mutex<HashMap<Endpoint, Arc<EndpointGuard>>>,
}

impl ConnectionPool {
    /// Create a pool allowing `capacity` connections per endpoint
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Get the per-endpoint capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn guard(&self, endpoint: &Endpoint) -> Arc<EndpointGuard> {
        let mut guards = self.guards.lock();
        guards
            .entry(endpoint.clone())
            .or_insert_with(|| {
                Arc::new(EndpointGuard {
                    semaphore: Arc::new(Semaphore::new(self.capacity)),
                    acquired: AtomicU64::new(0),
                    released: AtomicU64::new(0),
                })
            })
            .clone()
    }

    /// Wait for a free slot on `endpoint`
    pub async fn acquire(&self, endpoint: &Endpoint) -> ConnectionSlot {
        let guard = self.guard(endpoint);
        if guard.semaphore.available_permits() == 0 {
            tracing::debug!("Waiting for a free connection slot on {}", endpoint);
        }

        // The semaphore is owned by the pool and never closed
        let permit = match guard.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("pool semaphore closed"),
        };
        guard.acquired.fetch_add(1, Ordering::SeqCst);

        ConnectionSlot {
            endpoint: endpoint.clone(),
            guard,
            permit: Some(permit),
        }
    }

    /// Get usage counters for `endpoint`
    pub fn stats(&self, endpoint: &Endpoint) -> PoolStats {
        let guard = self.guard(endpoint);
        PoolStats {
            capacity: self.capacity,
            in_use: self.capacity - guard.semaphore.available_permits(),
            acquired: guard.acquired.load(Ordering::SeqCst),
            released: guard.released.load(Ordering::SeqCst),
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

/// A lease on one connection to an endpoint
///
/// Released exactly once: explicitly through [`ConnectionSlot::release`] or
/// when dropped.
pub struct ConnectionSlot {
    endpoint: Endpoint,
    guard: Arc<EndpointGuard>,
    permit: Option<OwnedSemaphorePermit>,
}

impl ConnectionSlot {
    /// Get the endpoint this slot belongs to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Give the slot back to the pool
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
            self.guard.released.fetch_add(1, Ordering::SeqCst);
            tracing::trace!("Released connection slot on {}", self.endpoint);
        }
    }
}

impl std::fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSlot")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
