//! Bounded pool of database connections shared across load workers.
//!
//! Semaphore-guarded free-list: a connection is handed off completely on
//! `acquire` and only re-enters the pool on `release`, so no handle is ever
//! aliased between two jobs. A connection that failed mid-use is still
//! returned rather than discarded; the pool does not validate health on
//! release, so a broken connection degrades subsequent jobs (known
//! limitation).

use crate::connection::BulkConnection;
use tokio::sync::{Mutex, Semaphore};
use tracing::warn;

/// Fixed-capacity pool created from pre-established connections.
pub struct ConnectionPool<C> {
    idle: Mutex<Vec<C>>,
    permits: Semaphore,
    capacity: usize,
}

impl<C: Send> ConnectionPool<C> {
    pub fn new(connections: Vec<C>) -> Self {
        let capacity = connections.len();
        assert!(capacity > 0, "pool requires at least one connection");
        Self {
            idle: Mutex::new(connections),
            permits: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Take exclusive ownership of a connection, waiting until one is idle.
    pub async fn acquire(&self) -> C {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("pool semaphore is never closed");
        permit.forget();
        self.idle
            .lock()
            .await
            .pop()
            .expect("a permit guarantees an idle connection")
    }

    /// Return a connection to the pool, unblocking one waiting `acquire`.
    ///
    /// Called on the success and failure paths alike.
    pub async fn release(&self, conn: C) {
        self.idle.lock().await.push(conn);
        self.permits.add_permits(1);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of connections currently sitting idle in the pool.
    pub async fn idle(&self) -> usize {
        self.idle.lock().await.len()
    }

    /// Wait until no job holds a connection, then take back the whole set.
    async fn drain(&self) -> Vec<C> {
        let permit = self
            .permits
            .acquire_many(self.capacity as u32)
            .await
            .expect("pool semaphore is never closed");
        permit.forget();
        self.idle.lock().await.drain(..).collect()
    }
}

impl<C: BulkConnection> ConnectionPool<C> {
    /// Drain the pool and close every connection.
    ///
    /// Waits for in-flight jobs to release their handles first; must only
    /// be called once all file loads have finished submitting work.
    pub async fn close_all(&self) {
        for conn in self.drain().await {
            if let Err(err) = conn.close().await {
                warn!("Error closing connection: {}", err);
            }
        }
    }
}
