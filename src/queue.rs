//! Self-feeding work queue: the crawler's only producers are its own
//! consumers, so "queue empty" does not by itself mean "done" — a worker may
//! still be about to call `offer`. Termination requires tracking outstanding
//! work alongside the pending list, as described in the module-level design
//! notes this queue is built to satisfy.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, Notify};

use crate::addr_key::Endpoint;

struct State {
    pending: VecDeque<Endpoint>,
    seen: HashSet<Endpoint>,
    outstanding: usize,
    shutdown: bool,
}

/// FIFO, exact-set-deduplicated, unbounded. `offer`/`poll`/`complete` form a
/// closed loop: every `poll` that returns `Some` must eventually be matched
/// by a `complete`, or the queue can never observe quiescence.
pub struct WorkQueue {
    state: Mutex<State>,
    notify: Notify,
    offers_total: AtomicUsize,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                seen: HashSet::new(),
                outstanding: 0,
                shutdown: false,
            }),
            notify: Notify::new(),
            offers_total: AtomicUsize::new(0),
        }
    }

    /// Enqueues `endpoint` unless it has been offered before. Returns
    /// whether it was newly added. Every endpoint appears in `pending` at
    /// most once over the queue's lifetime, even across many `offer` calls.
    pub async fn offer(&self, endpoint: Endpoint) -> bool {
        self.offers_total.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().await;
        if state.seen.contains(&endpoint) {
            return false;
        }
        state.seen.insert(endpoint.clone());
        state.pending.push_back(endpoint);
        state.outstanding += 1;
        drop(state);
        self.notify.notify_waiters();
        true
    }

    /// Blocks until an endpoint is available, the queue has quiesced
    /// (nothing pending and nothing outstanding), or shutdown has been
    /// requested. Returns `None` in the latter two cases — the caller
    /// (the crawler's dispatcher) treats either as end-of-stream.
    pub async fn poll(&self) -> Option<Endpoint> {
        loop {
            // Registering interest before dropping the lock, not after, is
            // what makes this race-free: `notify_waiters` only wakes waiters
            // that are already registered, so a `notify_waiters` call landing
            // between `drop(state)` and `notified().await` would otherwise be
            // missed forever. Creating the future and `enable`-ing it while
            // the lock is still held (or right before dropping it) registers
            // the waiter atomically with the state check above.
            let notified = self.notify.notified();
            tokio::pin!(notified);

            let mut state = self.state.lock().await;
            if state.shutdown {
                return None;
            }
            if let Some(endpoint) = state.pending.pop_front() {
                return Some(endpoint);
            }
            if state.outstanding == 0 {
                return None;
            }
            notified.as_mut().enable();
            drop(state);
            notified.await;
        }
    }

    /// Marks one previously-polled item as finished, whether or not it led
    /// to further `offer` calls. This is the only operation that can
    /// decrease `outstanding`, and therefore the only one that can promote
    /// an empty queue to end-of-stream.
    pub async fn complete(&self) {
        let mut state = self.state.lock().await;
        state.outstanding = state.outstanding.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Stops the queue: any blocked or future `poll` returns `None`
    /// immediately. Idempotent. In-flight workers still call `complete`,
    /// they just no longer get new work handed to them.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Whether `shutdown` has fired. Exposed for tests that need to assert
    /// on it directly rather than inferring it from `poll` behavior.
    #[cfg(test)]
    pub async fn is_shutdown(&self) -> bool {
        self.state.lock().await.shutdown
    }

    /// Total number of endpoints that survived dedup and were actually
    /// enqueued. Advisory, for logging only.
    pub async fn count(&self) -> usize {
        self.state.lock().await.seen.len()
    }

    /// Total number of `offer` calls, including ones rejected as duplicates.
    pub fn offers_total(&self) -> usize {
        self.offers_total.load(Ordering::Relaxed)
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn duplicate_offer_is_dispatched_exactly_once() {
        let queue = Arc::new(WorkQueue::new());
        assert!(queue.offer(Endpoint::new("1.2.3.4:8333")).await);
        assert!(!queue.offer(Endpoint::new("1.2.3.4:8333")).await);
        assert_eq!(queue.count().await, 1);
        assert_eq!(queue.offers_total(), 2);

        assert_eq!(queue.poll().await, Some(Endpoint::new("1.2.3.4:8333")));
        queue.complete().await;
        assert_eq!(queue.poll().await, None);
    }

    #[tokio::test]
    async fn poll_blocks_until_outstanding_work_offers_more() {
        let queue = Arc::new(WorkQueue::new());
        queue.offer(Endpoint::new("a:1")).await;

        let first = queue.poll().await.unwrap();
        assert_eq!(first.as_str(), "a:1");

        let queue2 = queue.clone();
        let waiter = tokio::spawn(async move { queue2.poll().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.offer(Endpoint::new("b:2")).await;
        queue.complete().await;

        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("poll should have resolved")
            .unwrap();
        assert_eq!(second.unwrap().as_str(), "b:2");
    }

    #[tokio::test]
    async fn quiescence_without_further_offers_ends_the_stream() {
        let queue = Arc::new(WorkQueue::new());
        queue.offer(Endpoint::new("a:1")).await;
        let item = queue.poll().await.unwrap();
        assert_eq!(item.as_str(), "a:1");

        let queue2 = queue.clone();
        let waiter = tokio::spawn(async move { queue2.poll().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.complete().await;

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("poll should have resolved")
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn shutdown_ends_the_stream_even_with_pending_work() {
        let queue = Arc::new(WorkQueue::new());
        queue.offer(Endpoint::new("a:1")).await;
        queue.offer(Endpoint::new("b:2")).await;

        queue.shutdown().await;
        queue.shutdown().await; // idempotent

        assert_eq!(queue.poll().await, None);
    }
}
