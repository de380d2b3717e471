//! End-to-end behaviour of `ReliableQueue` over the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use spool_core::ports::ManualClock;
use spool_core::{
    Envelope, InMemoryStore, KeyValueStore, MessageQueue, QueueConfig, ReliableQueue, SpoolError,
};

type TestQueue = ReliableQueue<InMemoryStore, ManualClock>;

fn setup(ack_timeout_ms: u64) -> (InMemoryStore, ManualClock, TestQueue) {
    let store = InMemoryStore::new();
    let clock = ManualClock::default();
    let config = QueueConfig {
        ack_timeout_ms,
        ..QueueConfig::default()
    };
    let queue = ReliableQueue::with_clock(store.clone(), "orders", config, clock.clone()).unwrap();
    (store, clock, queue)
}

fn envelopes(n: usize) -> Vec<Envelope> {
    (0..n).map(|i| Envelope::new(json!({ "seq": i }))).collect()
}

fn ids(envelopes: &[Envelope]) -> Vec<String> {
    envelopes.iter().map(|e| e.id().to_string()).collect()
}

#[tokio::test]
async fn published_envelope_comes_back_unchanged() {
    let (_, _, queue) = setup(30_000);
    let sent = Envelope::new(json!({"user": "ada", "tags": ["a", "b"], "n": 1.5}));
    queue.publish_now(&[sent.clone()]).await.unwrap();

    let received = queue.consume(1, false).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id(), sent.id());
    assert_eq!(received[0].message(), sent.message());
}

#[tokio::test]
async fn consume_preserves_publish_order_across_batches() {
    let (_, _, queue) = setup(30_000);
    let sent = envelopes(7);
    queue.publish_now(&sent[..3]).await.unwrap();
    queue.publish_now(&sent[3..]).await.unwrap();

    let mut received = Vec::new();
    for quantity in [2, 4, 5] {
        received.extend(queue.consume(quantity, false).await.unwrap());
    }
    assert_eq!(ids(&received), ids(&sent));
}

#[rstest]
#[case(5, 1, 1)]
#[case(5, 5, 5)]
#[case(5, 20, 5)]
#[case(0, 3, 0)]
#[tokio::test]
async fn consume_returns_at_most_quantity(
    #[case] published: usize,
    #[case] quantity: usize,
    #[case] expected: usize,
) {
    let (_, _, queue) = setup(30_000);
    queue.publish_now(&envelopes(published)).await.unwrap();

    let received = queue.consume(quantity, true).await.unwrap();
    assert_eq!(received.len(), expected);
    assert_eq!(queue.stats().await.unwrap().ready, published - expected);
}

#[tokio::test]
async fn delayed_message_is_invisible_until_due() {
    let (_, clock, queue) = setup(30_000);
    let sent = Envelope::new(json!("later"));
    queue.publish(&[sent.clone()], Duration::from_secs(10)).await.unwrap();

    assert!(queue.consume(10, false).await.unwrap().is_empty());
    clock.advance(Duration::from_millis(9_999));
    assert!(queue.consume(10, false).await.unwrap().is_empty());

    clock.advance(Duration::from_millis(1));
    let received = queue.consume(10, false).await.unwrap();
    assert_eq!(ids(&received), vec![sent.id().to_string()]);
}

#[tokio::test]
async fn due_delayed_messages_queue_behind_ready_ones() {
    let (_, clock, queue) = setup(30_000);
    let delayed = Envelope::new(json!("delayed"));
    let ready = Envelope::new(json!("ready"));
    queue.publish(&[delayed.clone()], Duration::from_secs(1)).await.unwrap();
    queue.publish_now(&[ready.clone()]).await.unwrap();

    clock.advance(Duration::from_secs(1));
    let received = queue.consume(2, false).await.unwrap();
    assert_eq!(ids(&received), ids(&[ready, delayed]));
}

#[tokio::test]
async fn unacknowledged_message_is_redelivered_after_timeout() {
    let (_, clock, queue) = setup(5_000);
    let sent = Envelope::new(json!({"job": 1}));
    queue.publish_now(&[sent.clone()]).await.unwrap();

    let first = queue.consume(1, true).await.unwrap();
    assert_eq!(first.len(), 1);

    clock.advance(Duration::from_millis(4_999));
    assert!(queue.consume(1, true).await.unwrap().is_empty());

    clock.advance(Duration::from_millis(1));
    let second = queue.consume(1, true).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id(), sent.id());
    assert_eq!(second[0].message(), sent.message());

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.in_flight, 1);
    assert_eq!(stats.ack_storage, 1);
}

#[tokio::test]
async fn acknowledged_message_is_never_redelivered() {
    let (_, clock, queue) = setup(5_000);
    queue.publish_now(&envelopes(3)).await.unwrap();

    let received = queue.consume(3, true).await.unwrap();
    queue.acknowledge(&received).await.unwrap();

    clock.advance(Duration::from_secs(60));
    assert!(queue.consume(10, true).await.unwrap().is_empty());
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.ack_storage, 0);
}

#[tokio::test]
async fn partial_acknowledge_redelivers_only_the_rest() {
    let (_, clock, queue) = setup(1_000);
    let sent = envelopes(3);
    queue.publish_now(&sent).await.unwrap();

    let received = queue.consume(3, true).await.unwrap();
    queue.acknowledge(&received[..1]).await.unwrap();

    clock.advance(Duration::from_secs(1));
    let redelivered = queue.consume(10, false).await.unwrap();
    let expected: HashSet<String> = ids(&sent[1..]).into_iter().collect();
    let got: HashSet<String> = ids(&redelivered).into_iter().collect();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn acknowledge_is_idempotent_and_ignores_unknown_ids() {
    let (_, _, queue) = setup(30_000);
    queue.publish_now(&envelopes(2)).await.unwrap();
    let received = queue.consume(2, true).await.unwrap();

    queue.acknowledge(&received).await.unwrap();
    let after_first = queue.stats().await.unwrap();
    queue.acknowledge(&received).await.unwrap();
    queue.acknowledge(&[Envelope::new(json!("stranger"))]).await.unwrap();

    assert_eq!(queue.stats().await.unwrap(), after_first);
    assert_eq!(after_first.in_flight, 0);
}

#[tokio::test]
async fn flush_removes_every_structure() {
    let (store, _, queue) = setup(30_000);
    queue.publish_now(&envelopes(3)).await.unwrap();
    queue.publish(&envelopes(2), Duration::from_secs(30)).await.unwrap();
    queue.consume(1, true).await.unwrap();

    queue.flush().await.unwrap();

    assert!(store.keys().unwrap().is_empty());
    assert!(queue.consume(10, true).await.unwrap().is_empty());
    queue.flush().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumers_never_share_a_message() {
    let (store, clock, queue) = setup(30_000);
    let sent = envelopes(200);
    queue.publish_now(&sent).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let consumer = Arc::new(
            ReliableQueue::with_clock(store.clone(), "orders", QueueConfig::default(), clock.clone())
                .unwrap(),
        );
        handles.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                let batch = consumer.consume(7, true).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                seen.extend(ids(&batch));
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(all.len(), sent.len());
    assert_eq!(unique.len(), sent.len());
    assert_eq!(queue.stats().await.unwrap().in_flight, sent.len());
}

#[rstest]
#[case::without_ack(false)]
#[case::with_ack(true)]
#[tokio::test]
async fn malformed_entries_are_reported_then_skipped(#[case] require_ack: bool) {
    let (store, _, queue) = setup(30_000);
    let sent = envelopes(2);
    store
        .rpush(&queue.keys().main, &["{not json".to_string()])
        .await
        .unwrap();
    queue.publish_now(&sent[..1]).await.unwrap();
    store
        .rpush(&queue.keys().main, &[r#"{"id":"no-message"}"#.to_string()])
        .await
        .unwrap();
    queue.publish_now(&sent[1..]).await.unwrap();

    let err = queue.consume(10, require_ack).await.unwrap_err();
    assert!(matches!(err, SpoolError::MalformedEnvelope(_)));
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.ready, 2);
    assert_eq!(stats.in_flight, 0);

    let received = queue.consume(10, require_ack).await.unwrap();
    assert_eq!(ids(&received), ids(&sent));
}

#[tokio::test]
async fn consume_with_maximal_quantity_drains_everything() {
    let (_, _, queue) = setup(30_000);
    let sent = envelopes(3);
    queue.publish_now(&sent).await.unwrap();

    let received = queue.consume(usize::MAX, true).await.unwrap();
    assert_eq!(ids(&received), ids(&sent));
    assert_eq!(queue.stats().await.unwrap().in_flight, 3);
}

#[tokio::test]
async fn store_outage_surfaces_as_unavailable() {
    let (store, _, queue) = setup(30_000);
    store.set_offline(true);

    let err = queue.publish_now(&envelopes(1)).await.unwrap_err();
    assert!(matches!(err, SpoolError::StoreUnavailable(_)));
    let err = queue.consume(1, true).await.unwrap_err();
    assert!(matches!(err, SpoolError::StoreUnavailable(_)));
}
