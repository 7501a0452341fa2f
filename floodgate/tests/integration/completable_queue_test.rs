use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use floodgate::error::ErrorKind;
use floodgate::queue::CompletableQueue;

use crate::common::init_tracing;

#[tokio::test]
async fn drains_in_enqueue_order_then_signals_completion() {
    init_tracing();
    let queue = CompletableQueue::new(128);

    for value in 1u64..=100 {
        queue.put(value).await.unwrap();
    }
    queue.complete();

    for expected in 1u64..=100 {
        assert_eq!(queue.take().await.unwrap(), expected);
    }

    // The completion signal repeats on every subsequent retrieval.
    for _ in 0..3 {
        let err = queue.take().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueCompleted);
    }
    let err = queue.try_take().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueueCompleted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn no_item_is_lost_or_duplicated_across_producers_and_consumers() {
    init_tracing();
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 250;

    let queue = Arc::new(CompletableQueue::new(16));

    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.push(tokio::spawn(async move {
            for sequence in 0..PER_PRODUCER {
                // Encode the producer in the high bits so per-producer order is
                // recoverable on the consumer side.
                queue.put(producer * PER_PRODUCER + sequence).await.unwrap();
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        consumers.push(tokio::spawn(async move {
            let mut received = Vec::new();
            loop {
                match queue.take().await {
                    Ok(item) => received.push(item),
                    Err(err) => {
                        assert_eq!(err.kind(), ErrorKind::QueueCompleted);
                        break;
                    }
                }
            }
            received
        }));
    }

    for producer in producers {
        producer.await.unwrap();
    }
    queue.complete();

    let mut all = Vec::new();
    for consumer in consumers {
        let received = consumer.await.unwrap();

        // FIFO hand-out: the items one consumer sees from a single producer must be in
        // that producer's enqueue order.
        let mut last_seen: HashMap<u64, u64> = HashMap::new();
        for item in &received {
            let producer = item / PER_PRODUCER;
            if let Some(previous) = last_seen.insert(producer, *item) {
                assert!(previous < *item, "per-producer order violated");
            }
        }

        all.extend(received);
    }

    all.sort_unstable();
    let expected: Vec<u64> = (0..PRODUCERS * PER_PRODUCER).collect();
    assert_eq!(all, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminate_releases_suspended_consumers() {
    init_tracing();
    let queue = Arc::new(CompletableQueue::<u64>::new(8));

    let mut takers = Vec::new();
    for _ in 0..3 {
        let queue = Arc::clone(&queue);
        takers.push(tokio::spawn(async move { queue.take().await }));
    }

    // Give the takers a moment to suspend on the empty queue.
    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.terminate();

    for taker in takers {
        let err = taker.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueTerminated);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminate_releases_suspended_producers_and_discards_items() {
    init_tracing();
    let queue = Arc::new(CompletableQueue::new(2));
    queue.put(1u64).await.unwrap();
    queue.put(2u64).await.unwrap();

    let mut putters = Vec::new();
    for value in 3u64..=5 {
        let queue = Arc::clone(&queue);
        putters.push(tokio::spawn(async move { queue.put(value).await }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.terminate();

    for putter in putters {
        let err = putter.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueTerminated);
    }
    assert!(queue.is_empty());
    assert_eq!(
        queue.take().await.unwrap_err().kind(),
        ErrorKind::QueueTerminated
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn complete_releases_suspended_consumers_once_drained() {
    init_tracing();
    let queue = Arc::new(CompletableQueue::<u64>::new(8));

    let taker = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.take().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.complete();

    let err = taker.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueueCompleted);
}

#[tokio::test]
async fn take_timeout_bounds_the_wait() {
    init_tracing();
    let queue = CompletableQueue::<u64>::new(8);

    let started = tokio::time::Instant::now();
    let polled = queue.take_timeout(Duration::from_millis(30)).await.unwrap();
    assert_eq!(polled, None);
    assert!(started.elapsed() >= Duration::from_millis(30));

    queue.put(7).await.unwrap();
    let polled = queue.take_timeout(Duration::from_millis(30)).await.unwrap();
    assert_eq!(polled, Some(7));
}
