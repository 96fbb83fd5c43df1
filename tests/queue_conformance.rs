//! Queue family conformance suite.
//!
//! End-to-end scenarios for the blocking, bounded, and monitored queues:
//! - QUEUE-001: bounded backpressure with a capacity of two
//! - QUEUE-002: cancellation unblocks every parked consumer
//! - QUEUE-003: capacity-zero rendezvous
//! - QUEUE-004: FIFO delivery across producers
//! - QUEUE-005: empty-awareness of the monitored queue

use parkway::queue::{BlockingQueue, BoundedQueue, MonitoredQueue};
use parkway::sync::Cancelable;
use std::sync::Arc;
use std::time::Duration;

/// QUEUE-001: a `BoundedQueue` of capacity 2 refuses a third value with a
/// zero timeout, and a blocked add completes once a consumer drains one.
#[test]
fn queue_001_bounded_backpressure() {
    let queue = Arc::new(BoundedQueue::new(2));
    queue.add(1).expect("first add fits");
    queue.add(2).expect("second add fits");

    let admitted = queue.try_add(3, Duration::ZERO).expect("try_add");
    assert!(!admitted, "a full queue refuses a zero-timeout add");

    let producer = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || queue.add(3))
    };
    std::thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished(), "the indefinite add is parked");

    let got = queue.next().expect("next");
    assert_eq!(got, 1, "FIFO: the oldest value comes out first");

    producer
        .join()
        .expect("producer thread should complete")
        .expect("the parked add completed after the drain");
    assert_eq!(queue.size().expect("size"), 2);
    assert_eq!(queue.next().expect("next"), 2);
    assert_eq!(queue.next().expect("next"), 3);
}

/// QUEUE-002: canceling a `BlockingQueue` wakes every parked consumer with
/// a canceled error and rejects later producers.
#[test]
fn queue_002_cancel_unblocks_consumers() {
    let queue: Arc<BlockingQueue<u32>> = Arc::new(BlockingQueue::new());

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.next())
        })
        .collect();

    std::thread::sleep(Duration::from_millis(50));
    queue.cancel().expect("cancel");

    for consumer in consumers {
        let result = consumer.join().expect("consumer thread should complete");
        let err = result.expect_err("parked consumers wake with an error");
        assert!(err.is_canceled(), "the error kind is canceled");
    }

    let err = queue.add(7).expect_err("producers are rejected after cancel");
    assert!(err.is_canceled());
    assert!(queue.is_canceled(), "the canceled state never reverts");
    queue.cancel().expect("cancel is idempotent");
}

/// QUEUE-003: a capacity-zero `BoundedQueue` is a rendezvous: every add
/// blocks until a paired next.
#[test]
fn queue_003_capacity_zero_rendezvous() {
    let queue = Arc::new(BoundedQueue::new(0));

    let lone = queue
        .try_add(1, Duration::from_millis(30))
        .expect("try_add");
    assert!(!lone, "an unpaired add cannot make progress");

    let producer = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || queue.add(99))
    };
    let got = queue.next().expect("the paired next receives the value");
    assert_eq!(got, 99);
    producer
        .join()
        .expect("producer thread should complete")
        .expect("the paired add completed");
    assert_eq!(queue.size().expect("size"), 0);
}

/// QUEUE-004: values drain in insertion order even with several producers,
/// and every produced value is delivered exactly once.
#[test]
fn queue_004_fifo_delivery_across_producers() {
    let queue: Arc<BlockingQueue<(usize, usize)>> = Arc::new(BlockingQueue::new());
    let per_producer = 50;

    let producers: Vec<_> = (0..3)
        .map(|id| {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for seq in 0..per_producer {
                    queue.add((id, seq)).expect("add");
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread should complete");
    }

    // Per-producer sequences must arrive in order; the interleaving between
    // producers is unconstrained.
    let mut last_seen = [None::<usize>; 3];
    for _ in 0..3 * per_producer {
        let (id, seq) = queue.next().expect("next");
        if let Some(previous) = last_seen[id] {
            assert!(seq > previous, "producer {id} reordered: {previous} then {seq}");
        }
        last_seen[id] = Some(seq);
    }
    assert_eq!(queue.size().expect("size"), 0, "every value was delivered");
}

/// QUEUE-005: `MonitoredQueue::wait_empty` parks until consumers drain the
/// queue, and returns at once when it is already empty.
#[test]
fn queue_005_monitored_empty_awareness() {
    let queue = Arc::new(MonitoredQueue::new());
    queue.add(1).expect("add");

    let watcher = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || queue.wait_empty())
    };
    std::thread::sleep(Duration::from_millis(50));
    assert!(!watcher.is_finished(), "the watcher is parked while occupied");

    assert_eq!(queue.next().expect("next"), 1);
    watcher
        .join()
        .expect("watcher thread should complete")
        .expect("wait_empty returned after the drain");

    // Already-empty queues never park the caller.
    queue.wait_empty().expect("immediate return");
    let drained = queue
        .wait_empty_timeout(Duration::ZERO)
        .expect("timed variant");
    assert!(drained);
}

/// QUEUE-006: a timed next on an empty queue reports a timeout error and
/// leaves the queue usable.
#[test]
fn queue_006_timed_next_expires() {
    let queue: BlockingQueue<u32> = BlockingQueue::new();
    let err = queue
        .try_next(Duration::from_millis(30))
        .expect_err("an empty queue must time out");
    assert!(err.is_timeout());

    queue.add(5).expect("add still works");
    assert_eq!(
        queue.try_next(Duration::from_millis(30)).expect("try_next"),
        5
    );
}
