use std::sync::Arc;

use floodgate::config::{BatchConfig, BatchQueueConfig};
use floodgate::queue::BatchingBoundedQueue;

use crate::common::{CollectingConsumer, init_tracing};

fn config(capacity: usize, max_size: usize, max_fill_ms: u64) -> BatchQueueConfig {
    BatchQueueConfig {
        capacity,
        batch: BatchConfig {
            max_size,
            max_fill_ms,
        },
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batches_by_size_with_one_final_partial_flush() {
    init_tracing();
    let consumer = CollectingConsumer::default();
    // A flush interval far beyond the test duration isolates size-based delivery.
    let queue = BatchingBoundedQueue::new(&config(64, 10, 600_000), consumer.clone()).unwrap();

    for value in 1u64..=25 {
        queue.put(value).await.unwrap();
    }
    queue.shutdown().await.unwrap();

    let batches = consumer.batches();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(consumer.flattened(), (1u64..=25).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interval_elapsing_flushes_a_single_item() {
    init_tracing();
    let consumer = CollectingConsumer::default();
    let queue = BatchingBoundedQueue::new(&config(64, 10, 50), consumer.clone()).unwrap();

    queue.put(99u64).await.unwrap();
    consumer.wait_for_batch_count(1).await;

    assert_eq!(consumer.batches(), vec![vec![99]]);
    queue.shutdown().await.unwrap();
    // Nothing was pending, so shutdown adds no extra batch.
    assert_eq!(consumer.batches(), vec![vec![99]]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn order_is_preserved_across_concurrent_producers() {
    init_tracing();
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 200;

    let consumer = CollectingConsumer::default();
    let queue = Arc::new(
        BatchingBoundedQueue::new(&config(32, 16, 600_000), consumer.clone()).unwrap(),
    );

    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.push(tokio::spawn(async move {
            for sequence in 0..PER_PRODUCER {
                queue.put(producer * PER_PRODUCER + sequence).await.unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    queue.shutdown().await.unwrap();

    let delivered = consumer.flattened();
    assert_eq!(delivered.len() as u64, PRODUCERS * PER_PRODUCER);

    // Enqueue order is preserved across batches: per producer, items must appear in
    // sequence order.
    for producer in 0..PRODUCERS {
        let sequence: Vec<u64> = delivered
            .iter()
            .filter(|item| *item / PER_PRODUCER == producer)
            .copied()
            .collect();
        let expected: Vec<u64> =
            (producer * PER_PRODUCER..(producer + 1) * PER_PRODUCER).collect();
        assert_eq!(sequence, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_with_pending_items_flushes_them_exactly_once() {
    init_tracing();
    let consumer = CollectingConsumer::default();
    let queue = BatchingBoundedQueue::new(&config(16, 10, 600_000), consumer.clone()).unwrap();

    for value in 1u64..=3 {
        queue.put(value).await.unwrap();
    }
    queue.shutdown().await.unwrap();

    assert_eq!(consumer.batches(), vec![vec![1, 2, 3]]);

    // Shutdown is idempotent and delivers nothing further.
    queue.shutdown().await.unwrap();
    assert_eq!(consumer.batches(), vec![vec![1, 2, 3]]);
}
