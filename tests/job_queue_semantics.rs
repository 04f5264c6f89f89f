//! Integration tests for the job queue's synchronization contract.
//!
//! Each test pins down one observable property: FIFO ordering, capacity
//! backpressure, loss-free shutdown, the drain barrier, idempotent stop and
//! the zero-capacity rendezvous. Blocking expectations are verified with
//! bounded channel timeouts so a regression fails instead of hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use vio_collect::JobQueue;

#[test]
fn test_fifo_order_single_producer_single_consumer() {
    let queue = Arc::new(JobQueue::new());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..100 {
                assert!(queue.push(i));
            }
        })
    };

    let mut seen = Vec::new();
    for _ in 0..100 {
        seen.push(queue.pop().expect("queue is not stopped"));
    }
    producer.join().expect("producer panicked");

    assert_eq!(seen, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_backpressure_blocks_at_capacity() {
    let queue = Arc::new(JobQueue::bounded(3));
    for i in 0..3 {
        assert!(queue.push(i));
    }

    let entered = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let pusher = {
        let queue = Arc::clone(&queue);
        let entered = Arc::clone(&entered);
        thread::spawn(move || {
            entered.store(true, Ordering::SeqCst);
            let accepted = queue.push(3);
            tx.send(accepted).expect("main thread is alive");
        })
    };

    // The fourth push must still be blocked well after it started.
    thread::sleep(Duration::from_millis(100));
    assert!(entered.load(Ordering::SeqCst));
    assert!(rx.try_recv().is_err());
    assert_eq!(queue.len(), 3);

    // One pop frees one slot and the push completes promptly.
    assert_eq!(queue.pop(), Some(0));
    let accepted = rx
        .recv_timeout(Duration::from_secs(1))
        .expect("push did not unblock after pop");
    assert!(accepted);
    pusher.join().expect("pusher panicked");

    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.pop(), Some(2));
    assert_eq!(queue.pop(), Some(3));
}

#[test]
fn test_stop_preserves_backlog() {
    let queue = JobQueue::new();
    for i in 0..3 {
        assert!(queue.push(i));
    }

    queue.stop();

    assert_eq!(queue.pop(), Some(0));
    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.pop(), Some(2));
    assert_eq!(queue.pop(), None);
}

#[test]
fn test_stop_unblocks_waiting_pop() {
    let queue: Arc<JobQueue<u32>> = Arc::new(JobQueue::new());

    let (tx, rx) = mpsc::channel();
    let popper = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            tx.send(queue.pop()).expect("main thread is alive");
        })
    };

    thread::sleep(Duration::from_millis(100));
    queue.stop();

    let result = rx
        .recv_timeout(Duration::from_secs(1))
        .expect("pop did not unblock after stop");
    assert_eq!(result, None);
    popper.join().expect("popper panicked");
}

#[test]
fn test_wait_returns_only_after_drain() {
    let queue = Arc::new(JobQueue::new());
    for i in 0..4 {
        assert!(queue.push(i));
    }

    let barrier = Arc::new(Barrier::new(2));
    let returned = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let waiter = {
        let queue = Arc::clone(&queue);
        let barrier = Arc::clone(&barrier);
        let returned = Arc::clone(&returned);
        thread::spawn(move || {
            barrier.wait();
            queue.wait();
            returned.store(true, Ordering::SeqCst);
            tx.send(()).expect("main thread is alive");
        })
    };

    barrier.wait();
    thread::sleep(Duration::from_millis(50));

    // Not released while a backlog remains.
    for i in 0..3 {
        assert_eq!(queue.pop(), Some(i));
    }
    thread::sleep(Duration::from_millis(50));
    assert!(!returned.load(Ordering::SeqCst));

    // Released by the pop that empties the queue.
    assert_eq!(queue.pop(), Some(3));
    rx.recv_timeout(Duration::from_secs(1))
        .expect("wait did not return after the final pop");
    assert!(returned.load(Ordering::SeqCst));
    waiter.join().expect("waiter panicked");
}

#[test]
fn test_wait_releases_all_concurrent_callers() {
    let queue = Arc::new(JobQueue::new());
    assert!(queue.push(1));

    let (tx, rx) = mpsc::channel();
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            thread::spawn(move || {
                queue.wait();
                tx.send(()).expect("main thread is alive");
            })
        })
        .collect();
    drop(tx);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(queue.pop(), Some(1));

    for _ in 0..3 {
        rx.recv_timeout(Duration::from_secs(1))
            .expect("a waiter was not released");
    }
    for waiter in waiters {
        waiter.join().expect("waiter panicked");
    }
}

#[test]
fn test_concurrent_stop_is_idempotent() {
    let queue = Arc::new(JobQueue::new());
    assert!(queue.push(1));
    assert!(queue.push(2));

    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for _ in 0..50 {
                    queue.stop();
                }
            })
        })
        .collect();
    for stopper in stoppers {
        stopper.join().expect("stopper panicked");
    }

    assert!(queue.is_stopped());
    assert!(!queue.push(3));
    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.pop(), Some(2));
    assert_eq!(queue.pop(), None);
}

#[test]
fn test_zero_capacity_rendezvous() {
    let queue = Arc::new(JobQueue::bounded(0));
    let epoch = Instant::now();

    let (tx, rx) = mpsc::channel();
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let push_started = epoch.elapsed();
            let accepted = queue.push(7u32);
            let push_finished = epoch.elapsed();
            tx.send((push_started, accepted, push_finished))
                .expect("main thread is alive");
        })
    };

    thread::sleep(Duration::from_millis(200));
    let pop_issued = epoch.elapsed();
    assert_eq!(queue.pop(), Some(7));

    let (push_started, accepted, push_finished) = rx
        .recv_timeout(Duration::from_secs(1))
        .expect("rendezvous push never completed");
    producer.join().expect("producer panicked");

    assert!(accepted);
    // The push overlapped the pop in time: it started long before the pop was
    // issued and could only finish afterwards.
    assert!(push_started < Duration::from_millis(100));
    assert!(push_finished >= pop_issued);
}

#[test]
fn test_multi_producer_multi_consumer_conserves_items() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 250;
    const CONSUMERS: usize = 3;

    let queue = Arc::new(JobQueue::bounded(16));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    assert!(queue.push(p * PER_PRODUCER + i));
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut taken = Vec::new();
                while let Some(item) = queue.pop() {
                    taken.push(item);
                }
                taken
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer panicked");
    }
    // Flush-then-stop: drain everything, then release the consumers.
    queue.wait();
    queue.stop();

    let mut all: Vec<usize> = consumers
        .into_iter()
        .flat_map(|consumer| consumer.join().expect("consumer panicked"))
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
}
