// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{collections::VecDeque, sync::Arc};

use crate::queue::BarrierQueue;

/// The single consumer of a [`BarrierQueue`].
///
/// Items are moved out of the shared buffer in bulk: one lock acquisition takes the
/// oldest item and swaps the rest into a local buffer that later calls drain without
/// touching the lock.
pub struct BarrierConsumer<T> {
    queue: Arc<BarrierQueue<T>>,
    local: VecDeque<T>,
}

impl<T> BarrierConsumer<T> {
    pub(crate) fn new(queue: Arc<BarrierQueue<T>>) -> Self {
        Self {
            queue,
            local: VecDeque::new(),
        }
    }

    pub fn queue(&self) -> &Arc<BarrierQueue<T>> {
        &self.queue
    }

    /// Takes the next item without blocking.
    pub fn try_dequeue(&mut self) -> Option<T> {
        if let Some(item) = self.local.pop_front() {
            return Some(item);
        }
        let mut shared = self.queue.shared.lock();
        take_batch(&mut shared, &mut self.local)
    }

    /// Blocks until an item is available. Returns `None` only once every producer has
    /// deregistered and nothing is left to drain.
    pub fn dequeue(&mut self) -> Option<T> {
        self.next_item(false)
    }

    /// Blocks for the next item, resetting the barrier whenever every active producer
    /// has checked in. Returns `None` once every producer has deregistered and the
    /// queue is drained.
    pub fn recv(&mut self) -> Option<T> {
        self.next_item(true)
    }

    /// Items buffered locally plus those still in the shared buffer.
    pub fn len(&self) -> usize {
        self.local.len() + self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.queue.is_empty()
    }

    fn next_item(&mut self, drive_barrier: bool) -> Option<T> {
        if drive_barrier && self.queue.is_barrier_satisfied() {
            self.queue.reset_barrier();
        }
        if let Some(item) = self.local.pop_front() {
            return Some(item);
        }
        let queue = &self.queue;
        let mut shared = queue.shared.lock();
        loop {
            if let Some(item) = take_batch(&mut shared, &mut self.local) {
                return Some(item);
            }
            if drive_barrier && queue.is_barrier_satisfied() {
                queue.reset_locked();
                continue;
            }
            if queue.active_producers() == 0 {
                return None;
            }
            queue.items_ready.wait(&mut shared);
        }
    }
}

/// Pops the oldest shared item and swaps the remainder into `local` (which is empty).
fn take_batch<T>(shared: &mut VecDeque<T>, local: &mut VecDeque<T>) -> Option<T> {
    let item = shared.pop_front()?;
    std::mem::swap(shared, local);
    Some(item)
}

impl<T> Iterator for BarrierConsumer<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.recv()
    }
}

impl<T> Drop for BarrierConsumer<T> {
    fn drop(&mut self) {
        self.queue.close();
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn bulk_move_preserves_order() {
        let (queue, mut consumer) = BarrierQueue::with_producers(1);
        queue.enqueue_batch(0..10);
        assert_eq!(consumer.try_dequeue(), Some(0));
        assert!(queue.is_empty());
        assert_eq!(consumer.len(), 9);
        queue.enqueue(10);
        let rest: Vec<i32> = std::iter::from_fn(|| consumer.try_dequeue()).collect();
        assert_eq!(rest, (1..=10).collect::<Vec<_>>());
        assert_eq!(consumer.try_dequeue(), None);
    }

    #[test]
    fn dequeue_blocks_until_an_item_arrives() {
        let (queue, mut consumer) = BarrierQueue::with_producers(1);
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                queue.enqueue("late");
            })
        };
        assert_eq!(consumer.dequeue(), Some("late"));
        producer.join().unwrap();
    }

    #[test]
    fn dequeue_ends_when_producers_are_gone() {
        let (queue, mut consumer) = BarrierQueue::with_producers(2);
        queue.enqueue(1);
        queue.deregister_producer();
        queue.deregister_producer();
        assert_eq!(consumer.dequeue(), Some(1));
        assert_eq!(consumer.dequeue(), None);
    }

    #[test]
    fn recv_resets_a_satisfied_barrier() {
        let (queue, mut consumer) = BarrierQueue::with_producers(1);
        queue.enqueue(1);
        let _check_in = queue.mark_producer_done();
        assert_eq!(consumer.recv(), Some(1));
        assert_eq!(queue.checked_in(), 0);
        assert_eq!(queue.round(), 1);
    }
}
