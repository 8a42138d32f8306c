use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, SessionError};

/// Fixed pool of request identifiers `0..size`.
///
/// [`acquire`](Self::acquire) waits while every identifier is in use, which
/// bounds the number of requests in flight. Identifiers return to the back
/// of the pool when their [`RequestId`] guard is dropped, so a released id is
/// handed out again only after every other free id has been used.
#[derive(Debug, Clone)]
pub struct RequestIdPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    permits: Arc<Semaphore>,
    free: Mutex<VecDeque<u8>>,
    size: usize,
}

impl PoolInner {
    fn free_list(&self) -> MutexGuard<'_, VecDeque<u8>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestIdPool {
    /// Create a pool holding identifiers `0..size`. `size` is capped at 256.
    pub fn new(size: usize) -> Self {
        let size = size.min(usize::from(u8::MAX) + 1);
        let free: VecDeque<u8> = (0..size).filter_map(|id| u8::try_from(id).ok()).collect();
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(free.len())),
                free: Mutex::new(free),
                size,
            }),
        }
    }

    /// Take a free identifier, waiting until one is released if needed.
    ///
    /// Fails with [`SessionError::ConnectionClosed`] once the pool is closed.
    /// Cancel safe: dropping the future gives nothing away.
    pub async fn acquire(&self) -> Result<RequestId> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| SessionError::ConnectionClosed)?;
        // Each permit stands for exactly one entry in the free list.
        let id = self
            .inner
            .free_list()
            .pop_front()
            .ok_or(SessionError::ConnectionClosed)?;
        Ok(RequestId {
            id,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Close the pool. Pending and future [`acquire`](Self::acquire) calls fail.
    pub fn close(&self) {
        self.inner.permits.close();
    }

    /// Number of identifiers currently free.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Total number of identifiers.
    pub fn size(&self) -> usize {
        self.inner.size
    }
}

/// An identifier on loan from a [`RequestIdPool`].
#[derive(Debug)]
pub struct RequestId {
    id: u8,
    pool: Arc<PoolInner>,
    // Dropped after `Drop::drop` has put the id back.
    _permit: OwnedSemaphorePermit,
}

impl RequestId {
    pub fn get(&self) -> u8 {
        self.id
    }
}

impl Drop for RequestId {
    fn drop(&mut self) {
        self.pool.free_list().push_back(self.id);
    }
}
