//! Worker pool - bounds how many sandboxes run at once
//!
//! Without a capacity every submission is admitted immediately. With one,
//! excess submissions are either rejected or queued FIFO depending on the
//! [`OverflowPolicy`]. Queued submissions wait in their own task, so the
//! session that sent them keeps processing frames.
//!
//! A waiter joins the queue inside [`WorkerPool::try_admit`], and a released
//! slot is handed straight to the oldest live waiter, so a later submission
//! can never take a slot ahead of one already queued.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::config::{OverflowPolicy, PoolConfig};
use crate::error::{Error, Result};

/// Pool counters, readable without locking
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Submissions currently holding a slot
    pub active: AtomicUsize,
    /// Submissions waiting for a slot
    pub queued: AtomicUsize,
    /// Slots released
    pub completed: AtomicU64,
    /// Submissions turned away
    pub rejected: AtomicU64,
}

impl PoolStats {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Decision for one incoming submission
#[derive(Debug)]
pub enum Admission {
    /// Run now
    Granted(Slot),
    /// Wait for a slot
    Queued(Waiter),
    /// Refuse
    Rejected,
}

#[derive(Debug, Default)]
struct Queue {
    /// Slots handed out and not yet released
    held: usize,
    /// Grant channels of queued submissions, oldest first
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct Shared {
    capacity: Option<usize>,
    policy: OverflowPolicy,
    max_queued: usize,
    queue: Mutex<Queue>,
    stats: PoolStats,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Give a freed slot to the oldest live waiter, or return it to the pool
    fn release(&self) {
        let mut queue = self.lock();
        while let Some(waiter) = queue.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        queue.held -= 1;
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Bounded (or unbounded) set of execution slots
#[derive(Debug, Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    pub fn new(config: &PoolConfig) -> Self {
        tracing::info!(
            max_concurrent = ?config.max_concurrent,
            overflow = ?config.overflow,
            max_queued = config.max_queued,
            "Creating worker pool"
        );

        WorkerPool {
            shared: Arc::new(Shared {
                capacity: config.max_concurrent,
                policy: config.overflow,
                max_queued: config.max_queued,
                queue: Mutex::new(Queue::default()),
                stats: PoolStats::default(),
            }),
        }
    }

    /// Pool with no limit
    pub fn unbounded() -> Self {
        Self::new(&PoolConfig::default())
    }

    pub fn stats(&self) -> &PoolStats {
        &self.shared.stats
    }

    /// Decide what happens to a new submission. Never blocks on a slot.
    pub fn try_admit(&self) -> Admission {
        let shared = &self.shared;
        let mut queue = shared.lock();
        queue.waiters.retain(|waiter| !waiter.is_closed());

        let has_room = shared.capacity.map_or(true, |cap| queue.held < cap);
        if has_room && queue.waiters.is_empty() {
            queue.held += 1;
            shared.stats.active.fetch_add(1, Ordering::Relaxed);
            return Admission::Granted(Slot::new(shared.clone()));
        }

        let queue_full = queue.waiters.len() >= shared.max_queued;
        if shared.policy == OverflowPolicy::Reject || queue_full {
            shared.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(queue_full, "Worker pool at capacity, rejecting");
            return Admission::Rejected;
        }

        let (tx, rx) = oneshot::channel();
        queue.waiters.push_back(tx);
        shared.stats.queued.fetch_add(1, Ordering::Relaxed);
        Admission::Queued(Waiter {
            grant: Some(rx),
            shared: shared.clone(),
        })
    }
}

/// A place in the queue
#[derive(Debug)]
pub struct Waiter {
    grant: Option<oneshot::Receiver<()>>,
    shared: Arc<Shared>,
}

impl Waiter {
    /// Wait for a slot
    pub async fn acquire(mut self) -> Result<Slot> {
        let granted = match self.grant.as_mut() {
            Some(grant) => grant.await.is_ok(),
            None => false,
        };
        self.leave_queue();
        if !granted {
            return Err(Error::Capacity("worker pool closed".to_string()));
        }
        Ok(Slot::new(self.shared.clone()))
    }

    fn leave_queue(&mut self) {
        if self.grant.take().is_some() {
            self.shared.stats.queued.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let Some(mut grant) = self.grant.take() else {
            return;
        };
        self.shared.stats.queued.fetch_sub(1, Ordering::Relaxed);
        // a slot handed over before we went away must go back to the pool
        grant.close();
        if grant.try_recv().is_ok() {
            self.shared.release();
        }
    }
}

/// Held for the whole run of one submission; frees the slot on drop
#[derive(Debug)]
pub struct Slot {
    shared: Arc<Shared>,
}

impl Slot {
    fn new(shared: Arc<Shared>) -> Self {
        Slot { shared }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.shared.stats.completed.fetch_add(1, Ordering::Relaxed);
        self.shared.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;

    fn pool(max: usize, overflow: OverflowPolicy, max_queued: usize) -> WorkerPool {
        WorkerPool::new(&PoolConfig {
            max_concurrent: Some(max),
            overflow,
            max_queued,
        })
    }

    #[test]
    fn test_unbounded_always_grants() {
        let pool = WorkerPool::unbounded();
        let slots: Vec<_> = (0..100)
            .map(|_| match pool.try_admit() {
                Admission::Granted(slot) => slot,
                other => panic!("expected grant, got {:?}", other),
            })
            .collect();
        assert_eq!(pool.stats().active(), 100);
        drop(slots);
        assert_eq!(pool.stats().active(), 0);
        assert_eq!(pool.stats().completed(), 100);
    }

    #[test]
    fn test_reject_policy() {
        let pool = pool(1, OverflowPolicy::Reject, 10);
        let slot = pool.try_admit();
        assert!(matches!(slot, Admission::Granted(_)));
        assert!(matches!(pool.try_admit(), Admission::Rejected));
        assert_eq!(pool.stats().rejected(), 1);

        drop(slot);
        assert!(matches!(pool.try_admit(), Admission::Granted(_)));
    }

    #[test]
    fn test_delay_policy_queue_limit() {
        let pool = pool(1, OverflowPolicy::Delay, 1);
        let _slot = pool.try_admit();
        let waiter = pool.try_admit();
        assert!(matches!(waiter, Admission::Queued(_)));
        assert_eq!(pool.stats().queued(), 1);
        assert!(matches!(pool.try_admit(), Admission::Rejected));

        drop(waiter);
        assert_eq!(pool.stats().queued(), 0);
    }

    #[test]
    fn test_freed_slot_goes_to_queued_waiter_not_newcomer() {
        let pool = pool(1, OverflowPolicy::Delay, 10);
        let Admission::Granted(first) = pool.try_admit() else {
            panic!("expected grant");
        };
        let Admission::Queued(second) = pool.try_admit() else {
            panic!("expected queue");
        };

        // the waiter has not been polled yet when the slot frees
        drop(first);
        assert!(matches!(pool.try_admit(), Admission::Queued(_)));

        let slot = second.acquire().now_or_never().expect("slot handed over").unwrap();
        assert_eq!(pool.stats().active(), 1);
        drop(slot);
    }

    #[test]
    fn test_dropped_waiter_with_grant_returns_slot() {
        let pool = pool(1, OverflowPolicy::Delay, 10);
        let Admission::Granted(first) = pool.try_admit() else {
            panic!("expected grant");
        };
        let waiter = pool.try_admit();
        drop(first);
        drop(waiter);

        assert_eq!(pool.stats().active(), 0);
        assert_eq!(pool.stats().queued(), 0);
        assert!(matches!(pool.try_admit(), Admission::Granted(_)));
    }

    #[test]
    fn test_concurrent_admission_respects_max_queued() {
        let pool = pool(1, OverflowPolicy::Delay, 3);
        let _held = pool.try_admit();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || pool.try_admit())
            })
            .collect();
        let admissions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let queued = admissions
            .iter()
            .filter(|a| matches!(a, Admission::Queued(_)))
            .count();
        assert_eq!(queued, 3);
        assert_eq!(pool.stats().queued(), 3);
        assert_eq!(pool.stats().rejected(), 13);
    }

    #[tokio::test]
    async fn test_waiters_are_served_fifo() {
        let pool = pool(1, OverflowPolicy::Delay, 10);
        let Admission::Granted(first) = pool.try_admit() else {
            panic!("expected grant");
        };

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for i in 0..3 {
            let Admission::Queued(waiter) = pool.try_admit() else {
                panic!("expected queue");
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let slot = waiter.acquire().await.unwrap();
                tx.send(i).unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(slot);
            });
        }
        drop(tx);

        assert_eq!(pool.stats().queued(), 3);
        drop(first);

        let mut order = Vec::new();
        while let Some(i) = rx.recv().await {
            order.push(i);
        }
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(pool.stats().queued(), 0);
        assert_eq!(pool.stats().active(), 0);
    }
}
