//! Bounded, first-come first-served admission for resolver processes.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Default)]
struct PoolState {
    running: usize,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

/// Caps how many resolver processes run at once.
///
/// Waiters are admitted in arrival order. A waiter that reaches its
/// deadline leaves the queue without blocking the ones behind it.
#[derive(Debug)]
pub struct InvocationPool {
    capacity: usize,
    state: Mutex<PoolState>,
    changed: Condvar,
}

impl InvocationPool {
    /// Creates a pool admitting at most `capacity` holders (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(PoolState::default()),
            changed: Condvar::new(),
        }
    }

    /// Maximum concurrent holders.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Holders currently admitted.
    #[must_use]
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Waiters currently queued.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Waits for a slot until `deadline`.
    ///
    /// Returns `None` if the deadline passes first.
    pub fn acquire_until(&self, deadline: Instant) -> Option<PoolPermit<'_>> {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.queue.push_back(ticket);

        loop {
            if state.queue.front() == Some(&ticket) && state.running < self.capacity {
                state.queue.pop_front();
                state.running += 1;
                self.changed.notify_all();
                return Some(PoolPermit { pool: self });
            }
            let now = Instant::now();
            if now >= deadline {
                state.queue.retain(|waiting| *waiting != ticket);
                self.changed.notify_all();
                return None;
            }
            state = self
                .changed
                .wait_timeout(state, deadline.saturating_duration_since(now))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        self.changed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A held pool slot, released on drop.
#[derive(Debug)]
pub struct PoolPermit<'a> {
    pool: &'a InvocationPool,
}

impl Drop for PoolPermit<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn capacity_is_at_least_one() {
        assert_eq!(InvocationPool::new(0).capacity(), 1);
    }

    #[test]
    fn permits_are_released_on_drop() {
        let pool = InvocationPool::new(1);
        let deadline = Instant::now() + Duration::from_secs(1);
        let permit = pool.acquire_until(deadline).expect("free slot");
        assert_eq!(pool.running(), 1);
        drop(permit);
        assert_eq!(pool.running(), 0);
        assert!(pool.acquire_until(deadline).is_some());
    }

    #[test]
    fn full_pool_times_out_and_leaves_the_queue() {
        let pool = InvocationPool::new(1);
        let _held = pool
            .acquire_until(Instant::now() + Duration::from_secs(1))
            .expect("free slot");

        let waited = pool.acquire_until(Instant::now() + Duration::from_millis(30));

        assert!(waited.is_none());
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn waiters_are_admitted_in_arrival_order() {
        let pool = InvocationPool::new(1);
        let deadline = Instant::now() + Duration::from_secs(5);
        let held = pool.acquire_until(deadline).expect("free slot");
        let (order_tx, order_rx) = mpsc::channel();

        thread::scope(|scope| {
            for id in 0..3_u32 {
                let order = order_tx.clone();
                let shared = &pool;
                scope.spawn(move || {
                    let _permit = shared.acquire_until(deadline).expect("admitted");
                    order.send(id).expect("send order");
                });
                while pool.queued() < usize::try_from(id + 1).expect("small") {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            drop(held);
        });
        drop(order_tx);

        let order: Vec<u32> = order_rx.iter().collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
