//! Worker pool for per-connection readiness loops.
//!
//! # Responsibilities
//! - Run one unit of work (accept-listener registration + readiness loop)
//!   per (connection × accept listener)
//! - Enforce the configured worker bound via semaphore
//! - Apply the overflow policy when all workers are busy
//! - Track active workers so an owning server can drain on shutdown
//!
//! There is no work queue: growth is driven strictly by concurrent demand.
//! With [`OverflowPolicy::Wait`] the submitting task itself is held until a
//! slot frees up, which backpressures the accept loop.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::{OverflowPolicy, PoolConfig};

/// Error type for pool submission.
#[derive(Debug, PartialEq, Eq)]
pub enum PoolError {
    /// All workers are busy and the policy is [`OverflowPolicy::Reject`].
    Saturated,
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Saturated => write!(f, "worker pool saturated"),
        }
    }
}

impl std::error::Error for PoolError {}

/// A bounded (or unbounded) pool of connection workers.
///
/// Units of work run as independent tokio tasks; the pool only limits how
/// many are in flight at once.
#[derive(Debug)]
pub struct WorkerPool {
    /// Worker slots; `None` means unbounded.
    slots: Option<Arc<Semaphore>>,
    overflow: OverflowPolicy,
    /// Current count of in-flight workers.
    active: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Create a pool from configuration.
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            slots: config.max_workers.map(|n| Arc::new(Semaphore::new(n))),
            overflow: config.overflow,
            active: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create an unbounded pool.
    pub fn unbounded() -> Self {
        Self::new(&PoolConfig::default())
    }

    /// Create a pool with at most `max_workers` concurrent units.
    pub fn bounded(max_workers: usize, overflow: OverflowPolicy) -> Self {
        Self::new(&PoolConfig {
            max_workers: Some(max_workers),
            overflow,
        })
    }

    /// Submit one unit of work.
    ///
    /// Waits for a free slot under [`OverflowPolicy::Wait`]; fails fast with
    /// [`PoolError::Saturated`] under [`OverflowPolicy::Reject`].
    pub async fn submit<F>(&self, unit: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match &self.slots {
            None => None,
            Some(slots) => match self.overflow {
                OverflowPolicy::Wait => Some(
                    Arc::clone(slots)
                        .acquire_owned()
                        .await
                        .expect("worker semaphore closed unexpectedly"),
                ),
                OverflowPolicy::Reject => match Arc::clone(slots).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => return Err(PoolError::Saturated),
                },
            },
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
        };

        tokio::spawn(async move {
            // Slot and counter are released when the task ends, panics included.
            let _permit = permit;
            let _guard = guard;
            unit.await;
        });

        Ok(())
    }

    /// Current count of in-flight workers.
    pub fn active_workers(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until every in-flight worker has finished.
    ///
    /// Workers are not interrupted; they drain to their own natural
    /// termination (EOF, error or close).
    pub async fn drain(&self) {
        while self.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// Guard that tracks one worker's lifetime. Decrements the active count when
/// dropped.
#[derive(Debug)]
struct ActiveGuard {
    active: Arc<AtomicU64>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
