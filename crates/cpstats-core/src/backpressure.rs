//! Bounded concurrency with a bounded FIFO wait queue.
//!
//! `tokio`'s semaphore hands released permits to waiters in arrival order, so
//! queued work is admitted FIFO. The gate only adds the queue bound on top.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Rejection returned when both the concurrency slots and the queue are full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull {
    pub in_flight: usize,
    pub queued: usize,
    pub max_queue: usize,
}

/// Point-in-time view of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressureSnapshot {
    pub in_flight: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queue: usize,
}

/// Execution slot. Releasing it admits the next queued waiter.
#[derive(Debug)]
pub struct BackpressurePermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct BackpressureGate {
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
    max_concurrent: usize,
    max_queue: usize,
}

impl BackpressureGate {
    pub fn new(max_concurrent: usize, max_queue: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            queued: AtomicUsize::new(0),
            max_concurrent,
            max_queue,
        }
    }

    /// Runs immediately when a slot is free, otherwise waits in the queue if
    /// it has room, otherwise fails fast with [`QueueFull`].
    pub async fn acquire(&self) -> Result<BackpressurePermit, QueueFull> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(BackpressurePermit { _permit: permit });
        }

        let reserved = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < self.max_queue).then_some(queued + 1)
            });
        if let Err(queued) = reserved {
            return Err(QueueFull {
                in_flight: self.in_flight(),
                queued,
                max_queue: self.max_queue,
            });
        }

        let _slot = QueueSlot {
            queued: &self.queued,
        };
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| QueueFull {
                in_flight: self.in_flight(),
                queued: self.queued(),
                max_queue: self.max_queue,
            })?;

        Ok(BackpressurePermit { _permit: permit })
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> BackpressureSnapshot {
        BackpressureSnapshot {
            in_flight: self.in_flight(),
            queued: self.queued(),
            max_concurrent: self.max_concurrent,
            max_queue: self.max_queue,
        }
    }
}

/// Frees a queue position once its waiter is admitted or dropped.
struct QueueSlot<'a> {
    queued: &'a AtomicUsize,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn admits_up_to_capacity_then_queues_then_rejects() {
        let gate = Arc::new(BackpressureGate::new(1, 1));

        let first = gate.acquire().await.expect("free slot");
        assert_eq!(gate.in_flight(), 1);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.queued(), 1);

        let rejected = gate.acquire().await.expect_err("queue is full");
        assert_eq!(
            rejected,
            QueueFull {
                in_flight: 1,
                queued: 1,
                max_queue: 1
            }
        );

        drop(first);
        waiter
            .await
            .expect("waiter task joins")
            .expect("queued waiter is admitted");
        assert_eq!(gate.queued(), 0);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn queued_waiters_are_admitted_in_arrival_order() {
        let gate = Arc::new(BackpressureGate::new(1, 8));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let held = gate.acquire().await.expect("free slot");

        let mut tasks = Vec::new();
        for index in 0..4 {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.expect("queued");
                order.lock().expect("order lock").push(index);
            }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        drop(held);
        for task in tasks {
            task.await.expect("task joins");
        }

        assert_eq!(*order.lock().expect("order lock"), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_queue_fails_fast_when_busy() {
        let gate = BackpressureGate::new(1, 0);
        let _held = gate.acquire().await.expect("free slot");

        let rejected = gate.acquire().await.expect_err("no queue");
        assert_eq!(rejected.max_queue, 0);
        assert_eq!(rejected.in_flight, 1);
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_queue_position() {
        let gate = Arc::new(BackpressureGate::new(1, 1));
        let _held = gate.acquire().await.expect("free slot");

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _ = gate.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.queued(), 1);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(gate.queued(), 0);
    }
}
