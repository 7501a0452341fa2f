use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use floodgate::queue::WorkQueue;

use crate::common::{ConcurrencyProbe, init_tracing};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrency_of_one_never_overlaps_tasks() {
    init_tracing();
    let queue = WorkQueue::new(1, 1000);
    let probe = ConcurrencyProbe::default();
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..1000 {
        let probe = probe.clone();
        let completed = Arc::clone(&completed);
        queue
            .exec(async move {
                probe.enter();
                tokio::task::yield_now().await;
                probe.exit();
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .await;
    }

    queue.wait_idle().await;
    assert_eq!(completed.load(Ordering::SeqCst), 1000);
    assert_eq!(probe.high_water(), 1);
    assert_eq!(queue.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrency_bound_is_respected_under_load() {
    init_tracing();
    let queue = WorkQueue::new(4, 64);
    let probe = ConcurrencyProbe::default();
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..200 {
        let probe = probe.clone();
        let completed = Arc::clone(&completed);
        queue
            .exec(async move {
                probe.enter();
                tokio::time::sleep(Duration::from_millis(1)).await;
                probe.exit();
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .await;
    }

    queue.wait_idle().await;
    assert_eq!(completed.load(Ordering::SeqCst), 200);
    assert!(probe.high_water() <= 4);
    assert!(probe.high_water() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_tasks_do_not_block_later_submissions() {
    init_tracing();
    let queue = WorkQueue::new(2, 16);
    let completed = Arc::new(AtomicUsize::new(0));

    for index in 0..20 {
        let completed = Arc::clone(&completed);
        queue
            .exec(async move {
                if index % 4 == 0 {
                    panic!("injected task failure");
                }
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .await;
    }

    queue.wait_idle().await;
    assert_eq!(completed.load(Ordering::SeqCst), 15);
    assert_eq!(queue.in_flight(), 0);
}
