// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use log::debug;
use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use crate::consumer::BarrierConsumer;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of [`BarrierQueue::wait_for_barrier_reset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierWait {
    /// The consumer reset the barrier; the producer may move to its next bucket.
    Released,
    /// The cancellation token fired first. The producer's check-in was withdrawn.
    Cancelled,
    /// The consumer went away; nothing will ever reset the barrier again.
    Closed,
}

/// Proof of a producer check-in, tied to the barrier round it was made in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "pass the check-in to wait_for_barrier_reset"]
pub struct CheckIn {
    round: u64,
}

impl CheckIn {
    pub fn round(&self) -> u64 {
        self.round
    }
}

/// Shared half of a multi-producer, single-consumer queue whose producers synchronise
/// on a barrier: each producer checks in when it finishes a bucket and waits until the
/// consumer has seen every active producer check in and reset the barrier.
///
/// Counter changes happen under the buffer lock so that a waiter can never miss the
/// notification for a change it is waiting on.
pub struct BarrierQueue<T> {
    pub(crate) shared: Mutex<VecDeque<T>>,
    pub(crate) items_ready: Condvar,
    barrier_changed: Condvar,
    checked_in: AtomicUsize,
    active: AtomicUsize,
    round: AtomicU64,
    closed: AtomicBool,
    poll_interval: Duration,
}

impl<T> BarrierQueue<T> {
    /// Builds a queue for `producers` producers and returns the shared handle together
    /// with the only consumer.
    pub fn with_producers(producers: usize) -> (Arc<Self>, BarrierConsumer<T>) {
        Self::with_poll_interval(producers, DEFAULT_POLL_INTERVAL)
    }

    /// Like [`with_producers`](Self::with_producers); barrier waits re-check their
    /// cancellation token at least every `poll_interval`.
    pub fn with_poll_interval(
        producers: usize,
        poll_interval: Duration,
    ) -> (Arc<Self>, BarrierConsumer<T>) {
        let queue = Arc::new(Self {
            shared: Mutex::new(VecDeque::new()),
            items_ready: Condvar::new(),
            barrier_changed: Condvar::new(),
            checked_in: AtomicUsize::new(0),
            active: AtomicUsize::new(producers),
            round: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            poll_interval,
        });
        let consumer = BarrierConsumer::new(Arc::clone(&queue));
        (queue, consumer)
    }

    pub fn enqueue(&self, item: T) {
        self.shared.lock().push_back(item);
        self.items_ready.notify_one();
    }

    pub fn enqueue_batch<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.shared.lock().extend(items);
        self.items_ready.notify_all();
    }

    /// Checks the calling producer in for the current barrier round.
    pub fn mark_producer_done(&self) -> CheckIn {
        let _guard = self.shared.lock();
        let checked_in = self.checked_in.fetch_add(1, Ordering::AcqRel) + 1;
        let round = self.round.load(Ordering::Acquire);
        debug!(
            "producer checked in for round {round} ({checked_in}/{})",
            self.active.load(Ordering::Acquire)
        );
        self.items_ready.notify_all();
        CheckIn { round }
    }

    /// True once at least one producer has checked in and every active producer has.
    pub fn is_barrier_satisfied(&self) -> bool {
        let checked_in = self.checked_in.load(Ordering::Acquire);
        checked_in > 0 && checked_in >= self.active.load(Ordering::Acquire)
    }

    /// Clears all check-ins and releases every producer waiting on the barrier.
    pub fn reset_barrier(&self) {
        let _guard = self.shared.lock();
        self.reset_locked();
    }

    pub(crate) fn reset_locked(&self) {
        self.checked_in.store(0, Ordering::Release);
        let round = self.round.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("barrier reset; entering round {round}");
        self.barrier_changed.notify_all();
    }

    /// Blocks until the barrier has been reset since `check_in` was made, `cancel`
    /// fires, or the consumer is dropped.
    ///
    /// A cancelled waiter withdraws its own check-in so it cannot complete the barrier
    /// for producers that have not arrived.
    pub fn wait_for_barrier_reset(
        &self,
        check_in: CheckIn,
        cancel: &CancellationToken,
    ) -> BarrierWait {
        let mut shared = self.shared.lock();
        loop {
            if self.round.load(Ordering::Acquire) != check_in.round {
                return BarrierWait::Released;
            }
            if self.closed.load(Ordering::Acquire) {
                return BarrierWait::Closed;
            }
            if cancel.is_cancelled() {
                let withdrawn = self.checked_in.load(Ordering::Acquire).saturating_sub(1);
                self.checked_in.store(withdrawn, Ordering::Release);
                return BarrierWait::Cancelled;
            }
            self.barrier_changed
                .wait_for(&mut shared, self.poll_interval);
        }
    }

    /// Removes a producer that will never check in again.
    pub fn deregister_producer(&self) {
        let _guard = self.shared.lock();
        let remaining = self.active.load(Ordering::Acquire).saturating_sub(1);
        self.active.store(remaining, Ordering::Release);
        debug!("producer deregistered; {remaining} active");
        self.items_ready.notify_all();
    }

    /// Wakes every blocked producer and the consumer so they re-check their state.
    pub fn wake_all(&self) {
        let _guard = self.shared.lock();
        self.items_ready.notify_all();
        self.barrier_changed.notify_all();
    }

    pub(crate) fn close(&self) {
        let _guard = self.shared.lock();
        self.closed.store(true, Ordering::Release);
        self.barrier_changed.notify_all();
    }

    /// True once the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Items waiting in the shared buffer (not counting the consumer's local batch).
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().is_empty()
    }

    pub fn active_producers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn checked_in(&self) -> usize {
        self.checked_in.load(Ordering::Acquire)
    }

    /// Number of barrier resets so far.
    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Instant};

    use super::*;

    #[test]
    fn barrier_needs_every_active_producer() {
        let (queue, _consumer) = BarrierQueue::<u32>::with_producers(3);
        assert!(!queue.is_barrier_satisfied());

        let _first = queue.mark_producer_done();
        let _second = queue.mark_producer_done();
        assert_eq!(queue.checked_in(), 2);
        assert!(!queue.is_barrier_satisfied());

        let _third = queue.mark_producer_done();
        assert!(queue.is_barrier_satisfied());

        queue.reset_barrier();
        assert_eq!(queue.checked_in(), 0);
        assert_eq!(queue.round(), 1);
        assert!(!queue.is_barrier_satisfied());
    }

    #[test]
    fn deregistering_lowers_the_bar() {
        let (queue, _consumer) = BarrierQueue::<u32>::with_producers(2);
        let _check_in = queue.mark_producer_done();
        assert!(!queue.is_barrier_satisfied());
        queue.deregister_producer();
        assert_eq!(queue.active_producers(), 1);
        assert!(queue.is_barrier_satisfied());
    }

    #[test]
    fn wait_returns_after_reset() {
        let (queue, _consumer) = BarrierQueue::<u32>::with_producers(1);
        let check_in = queue.mark_producer_done();
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for_barrier_reset(check_in, &CancellationToken::new()))
        };
        thread::sleep(Duration::from_millis(20));
        queue.reset_barrier();
        assert_eq!(waiter.join().unwrap(), BarrierWait::Released);
    }

    #[test]
    fn wait_after_an_earlier_reset_does_not_block() {
        let (queue, _consumer) = BarrierQueue::<u32>::with_producers(2);
        let slow = queue.mark_producer_done();
        let _fast = queue.mark_producer_done();
        queue.reset_barrier();
        // The fast producer is already checked in for the next round.
        let _fast_again = queue.mark_producer_done();
        assert_eq!(
            queue.wait_for_barrier_reset(slow, &CancellationToken::new()),
            BarrierWait::Released
        );
    }

    #[test]
    fn cancellation_withdraws_the_check_in() {
        let (queue, _consumer) =
            BarrierQueue::<u32>::with_poll_interval(2, Duration::from_millis(5));
        let check_in = queue.mark_producer_done();
        let cancel = CancellationToken::new();
        let waiter = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            thread::spawn(move || queue.wait_for_barrier_reset(check_in, &cancel))
        };
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        cancel.cancel();
        assert_eq!(waiter.join().unwrap(), BarrierWait::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(queue.checked_in(), 0);
    }

    #[test]
    fn dropping_the_consumer_closes_the_barrier() {
        let (queue, consumer) = BarrierQueue::<u32>::with_producers(2);
        let check_in = queue.mark_producer_done();
        drop(consumer);
        assert!(queue.is_closed());
        assert_eq!(
            queue.wait_for_barrier_reset(check_in, &CancellationToken::new()),
            BarrierWait::Closed
        );
    }
}
