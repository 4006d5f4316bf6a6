use std::{
    collections::HashMap,
    sync::Arc,
    thread,
    time::Duration,
};

use barrier_queue::{BarrierQueue, BarrierWait};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Item {
    producer: usize,
    seq: usize,
    bucket: u32,
}

#[test]
fn per_producer_order_is_preserved() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 5_000;

    let (queue, consumer) = BarrierQueue::with_producers(PRODUCERS);
    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.enqueue(Item {
                        producer,
                        seq,
                        bucket: 0,
                    });
                }
                queue.deregister_producer();
            })
        })
        .collect();

    let mut next_seq = vec![0usize; PRODUCERS];
    let mut total = 0;
    for item in consumer {
        assert_eq!(item.seq, next_seq[item.producer], "producer {}", item.producer);
        next_seq[item.producer] += 1;
        total += 1;
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(total, PRODUCERS * PER_PRODUCER);
    assert!(next_seq.iter().all(|&n| n == PER_PRODUCER));
}

/// Three producers at different speeds emit three buckets each; once the consumer sees
/// an item from bucket `b`, it never sees one from an earlier bucket.
#[test]
fn producers_advance_buckets_together() {
    const BUCKETS: u32 = 3;
    let delays = [0u64, 1, 3];

    let (queue, consumer) = BarrierQueue::with_producers(delays.len());
    let cancel = CancellationToken::new();
    let handles: Vec<_> = delays
        .iter()
        .enumerate()
        .map(|(producer, &delay)| {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            thread::spawn(move || {
                let mut seq = 0;
                for bucket in 0..BUCKETS {
                    if bucket > 0 {
                        let check_in = queue.mark_producer_done();
                        assert_eq!(
                            queue.wait_for_barrier_reset(check_in, &cancel),
                            BarrierWait::Released
                        );
                    }
                    for _ in 0..20 {
                        thread::sleep(Duration::from_millis(delay));
                        queue.enqueue(Item {
                            producer,
                            seq,
                            bucket,
                        });
                        seq += 1;
                    }
                }
                queue.deregister_producer();
            })
        })
        .collect();

    let mut highest = 0;
    let mut per_bucket: HashMap<u32, usize> = HashMap::new();
    for item in consumer {
        assert!(
            item.bucket >= highest,
            "bucket {} from producer {} arrived after bucket {highest}",
            item.bucket,
            item.producer
        );
        highest = item.bucket;
        *per_bucket.entry(item.bucket).or_default() += 1;
    }
    for handle in handles {
        handle.join().unwrap();
    }
    for bucket in 0..BUCKETS {
        assert_eq!(per_bucket.get(&bucket), Some(&(20 * delays.len())));
    }
}

#[test]
fn finished_producer_does_not_hold_back_the_rest() {
    let (queue, consumer) = BarrierQueue::with_producers(2);
    let cancel = CancellationToken::new();

    let quitter = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            queue.enqueue(0u32);
            queue.deregister_producer();
        })
    };
    let runner = {
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        thread::spawn(move || {
            queue.enqueue(0u32);
            thread::sleep(Duration::from_millis(20));
            let check_in = queue.mark_producer_done();
            let outcome = queue.wait_for_barrier_reset(check_in, &cancel);
            queue.enqueue(1u32);
            queue.deregister_producer();
            outcome
        })
    };

    let items: Vec<u32> = consumer.collect();
    quitter.join().unwrap();
    assert_eq!(runner.join().unwrap(), BarrierWait::Released);
    assert_eq!(items, vec![0, 0, 1]);
}

#[test]
fn cancellation_unblocks_a_waiting_producer() {
    let (queue, _consumer) = BarrierQueue::<u32>::with_producers(2);
    let cancel = CancellationToken::new();
    let waiter = {
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        thread::spawn(move || {
            let check_in = queue.mark_producer_done();
            queue.wait_for_barrier_reset(check_in, &cancel)
        })
    };
    thread::sleep(Duration::from_millis(30));
    cancel.cancel();
    queue.wake_all();
    assert_eq!(waiter.join().unwrap(), BarrierWait::Cancelled);
    assert_eq!(queue.checked_in(), 0);
}
