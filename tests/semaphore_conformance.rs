//! Semaphore conformance suite.
//!
//! End-to-end scenarios for the counting semaphores:
//! - SEM-001: blocked acquire consumes a release donation
//! - SEM-002: checked semaphore rejects release at saturation
//! - SEM-003: count=K admits exactly K acquires without a release
//! - SEM-004: priority-ordered wake order
//! - SEM-005: interrupted acquire leaves the count intact
//! - SEM-006: zero timeout never blocks

use parkway::sync::{PrioritySemaphore, Semaphore};
use parkway::thread::ThreadHandle;
use parkway::ErrorKind;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// SEM-001: single producer / single consumer over `Semaphore(0, 1)`.
///
/// A blocked `wait` returns once `post` donates the count, and the count
/// reads zero afterwards because the waiter consumed it.
#[test]
fn sem_001_blocked_acquire_consumes_donation() {
    let sem = Arc::new(Semaphore::new(0, 1));

    let consumer = {
        let sem = Arc::clone(&sem);
        std::thread::spawn(move || sem.wait())
    };

    // Let the consumer park, then donate.
    std::thread::sleep(Duration::from_millis(50));
    sem.post().expect("post should succeed");

    consumer
        .join()
        .expect("consumer thread should complete")
        .expect("blocked wait should succeed after post");
    assert_eq!(sem.count(), 0, "the waiter consumed the donated count");
}

/// SEM-002: a checked semaphore fails `post` at its maximum.
#[test]
fn sem_002_checked_release_rejected_at_max() {
    let sem = Semaphore::new(0, 1);

    sem.post().expect("count 0 -> 1 fits");
    let err = sem.post().expect_err("count 1 == max must be rejected");
    assert_eq!(err.kind(), ErrorKind::InvalidOp);
    assert_eq!(sem.count(), 1, "failed post must not change the count");

    // After consuming, posting works again.
    sem.wait().expect("count available");
    sem.post().expect("post fits again after wait");
    assert_eq!(sem.count(), 1);
}

/// SEM-003: a semaphore built with count=K admits exactly K acquires.
#[test]
fn sem_003_initial_count_admits_exactly_k() {
    let k = 5;
    let sem = Semaphore::new(k, k);
    for _ in 0..k {
        assert!(
            sem.try_wait(Duration::ZERO).expect("try_wait"),
            "each of the K counts admits one acquire"
        );
    }
    assert!(
        !sem.try_wait(Duration::ZERO).expect("try_wait"),
        "the K+1st acquire must be refused"
    );
}

/// SEM-004: priority-ordered semaphore wakes by descending priority.
///
/// Threads with priorities 1, 5, 3 block in that arrival order; three
/// sequential posts must wake them as 5, 3, 1.
#[test]
fn sem_004_priority_wake_order() {
    let sem = Arc::new(PrioritySemaphore::unbounded(0));
    let (wake_tx, wake_rx) = mpsc::channel();
    let (ready_tx, ready_rx) = mpsc::channel();

    let mut workers = Vec::new();
    for priority in [1, 5, 3] {
        let sem = Arc::clone(&sem);
        let wake_tx = wake_tx.clone();
        let ready_tx = ready_tx.clone();
        workers.push(std::thread::spawn(move || {
            ThreadHandle::current().set_priority(priority);
            ready_tx.send(priority).expect("announce arrival");
            sem.wait().expect("acquire");
            wake_tx.send(priority).expect("announce wake");
        }));
        // Keep arrival order deterministic.
        std::thread::sleep(Duration::from_millis(30));
    }
    for _ in 0..3 {
        ready_rx.recv().expect("all workers announced");
    }
    // A worker announces before it parks; give the slowest one time to
    // reach the waiter list before the first donation.
    std::thread::sleep(Duration::from_millis(200));

    let mut wake_order = Vec::new();
    for _ in 0..3 {
        sem.post().expect("post");
        wake_order.push(
            wake_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("a waiter should wake per post"),
        );
    }
    for worker in workers {
        worker.join().expect("worker thread should complete");
    }

    assert_eq!(
        wake_order,
        vec![5, 3, 1],
        "highest priority first, regardless of arrival order"
    );
}

/// SEM-005: interrupting a blocked acquire aborts it without touching the
/// count, and the semaphore keeps working afterwards.
#[test]
fn sem_005_interrupted_acquire_preserves_count() {
    let sem = Arc::new(Semaphore::new(0, 1));
    let (handle_tx, handle_rx) = mpsc::channel();

    let blocked = {
        let sem = Arc::clone(&sem);
        std::thread::spawn(move || {
            handle_tx
                .send(ThreadHandle::current())
                .expect("send handle");
            sem.wait()
        })
    };

    let handle = handle_rx.recv().expect("receive handle");
    std::thread::sleep(Duration::from_millis(50));
    handle.interrupt();

    let result = blocked.join().expect("blocked thread should complete");
    let err = result.expect_err("interrupt must abort the acquire");
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert_eq!(sem.count(), 0, "aborted acquire must not consume a count");

    sem.post().expect("a subsequent post still succeeds");
    assert_eq!(sem.count(), 1, "post raised the count normally");
}

/// SEM-006: zero timeout means no blocking at all.
#[test]
fn sem_006_zero_timeout_returns_immediately() {
    let sem = Semaphore::new(0, 1);
    let start = std::time::Instant::now();
    let admitted = sem.try_wait(Duration::ZERO).expect("try_wait");
    assert!(!admitted, "an empty semaphore refuses a zero-timeout wait");
    assert!(
        start.elapsed() < Duration::from_millis(50),
        "zero timeout must not sleep"
    );
}

/// SEM-007: FIFO handoff under a stream of contenders: every acquire is
/// matched by exactly one successful release and the count ends at its
/// starting point.
#[test]
fn sem_007_acquire_release_balance_under_contention() {
    let sem = Arc::new(Semaphore::new(2, 2));
    let iterations = 200;

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let sem = Arc::clone(&sem);
            std::thread::spawn(move || {
                for _ in 0..iterations {
                    sem.wait().expect("acquire");
                    sem.post().expect("release");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread should complete");
    }

    assert_eq!(sem.count(), 2, "count returns to its initial value");
}
