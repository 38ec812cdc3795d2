//! The pool-wide cap on live connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Error;

/// A permit proving a slot in the pool's connection budget was acquired.
///
/// Dropping it releases the slot, the same "release on drop" shape as
/// `httpcore.pool.ConnectionSemaphore`'s context-manager use in the
/// original source, just expressed as RAII instead of `async with`.
#[derive(Debug)]
pub(crate) enum Permit {
    Bounded(OwnedSemaphorePermit),
    Unbounded,
}

/// Wraps `tokio::sync::Semaphore` to add the pool's `PoolTimeout` error and
/// an "unbounded" mode for when no `max_connections` limit is configured.
///
/// `tokio::sync::Semaphore::acquire` is already FIFO-fair and already
/// permit-safe under cancellation, so this type adds no queueing logic of
/// its own.
#[derive(Debug, Clone)]
pub(crate) struct PoolSemaphore {
    inner: Option<Arc<Semaphore>>,
}

impl PoolSemaphore {
    pub(crate) fn new(max: Option<usize>) -> PoolSemaphore {
        PoolSemaphore {
            inner: max.map(Semaphore::new).map(Arc::new),
        }
    }

    /// Waits for a free slot, failing with [`Error::is_pool_timeout`] if
    /// `timeout` elapses first. `timeout: None` waits indefinitely.
    pub(crate) async fn acquire(&self, timeout: Option<Duration>) -> Result<Permit, Error> {
        let sem = match &self.inner {
            None => return Ok(Permit::Unbounded),
            Some(sem) => Arc::clone(sem),
        };

        let acquire = sem.acquire_owned();
        let permit = match timeout {
            None => acquire.await.expect("semaphore is never closed"),
            Some(dur) => tokio::time::timeout(dur, acquire)
                .await
                .map_err(|_| Error::pool_timeout())?
                .expect("semaphore is never closed"),
        };
        Ok(Permit::Bounded(permit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unbounded_never_blocks() {
        let sem = PoolSemaphore::new(None);
        let _a = sem.acquire(None).await.unwrap();
        let _b = sem.acquire(None).await.unwrap();
    }

    #[tokio::test]
    async fn bounded_times_out_when_exhausted() {
        let sem = PoolSemaphore::new(Some(1));
        let _permit = sem.acquire(None).await.unwrap();
        let err = sem
            .acquire(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_pool_timeout());
    }

    #[tokio::test]
    async fn releasing_a_permit_unblocks_the_next_waiter() {
        let sem = PoolSemaphore::new(Some(1));
        let permit = sem.acquire(None).await.unwrap();
        drop(permit);
        sem.acquire(Some(Duration::from_millis(50))).await.unwrap();
    }
}
