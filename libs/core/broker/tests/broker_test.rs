//! Integration tests for the broker layer against a real Redis.

use broker::{
    ConsumerConfig, DELAYED_SET, JobEnvelope, JobQueue, PayloadMap, QueueConsumer, QueueProducer,
    dlq::PoisonQueue,
};
use chrono::{Duration, Utc};
use test_utils::TestRedis;

fn envelope(tag: &str) -> JobEnvelope {
    let mut payload = PayloadMap::new();
    payload.insert("tag".to_string(), serde_json::json!(tag));
    JobEnvelope::new(
        uuid::Uuid::new_v4().to_string(),
        "send_email",
        payload,
    )
}

fn consumer(redis: &TestRedis) -> QueueConsumer {
    QueueConsumer::new(
        redis.connection(),
        ConsumerConfig::new()
            .with_consumer_id("test-consumer")
            .with_batch_size(10),
    )
}

#[tokio::test]
async fn test_publish_consume_ack_round_trip() {
    let redis = TestRedis::new().await;
    let producer = QueueProducer::new(redis.connection());
    let consumer = consumer(&redis);

    consumer.ensure_groups().await.unwrap();

    let sent = envelope("round-trip");
    producer.publish(&sent, JobQueue::Medium).await.unwrap();

    let deliveries = consumer.read_new().await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].queue, JobQueue::Medium);

    let received = deliveries[0].envelope.as_ref().unwrap();
    assert_eq!(received, &sent);

    consumer
        .ack(JobQueue::Medium, &deliveries[0].message_id)
        .await
        .unwrap();

    // ACKed entries no longer show up as pending
    let pending = consumer.read_pending().await.unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_backlog_published_before_group_exists_is_delivered() {
    let redis = TestRedis::new().await;
    let producer = QueueProducer::new(redis.connection());

    let sent = envelope("early");
    producer.publish(&sent, JobQueue::Low).await.unwrap();

    let consumer = consumer(&redis);
    consumer.ensure_groups().await.unwrap();

    let deliveries = consumer.read_new().await.unwrap();
    assert_eq!(deliveries.len(), 1);
}

#[tokio::test]
async fn test_deliveries_ordered_high_medium_low() {
    let redis = TestRedis::new().await;
    let producer = QueueProducer::new(redis.connection());
    let consumer = consumer(&redis);

    consumer.ensure_groups().await.unwrap();

    producer.publish(&envelope("l"), JobQueue::Low).await.unwrap();
    producer.publish(&envelope("m"), JobQueue::Medium).await.unwrap();
    producer.publish(&envelope("h"), JobQueue::High).await.unwrap();

    let deliveries = consumer.read_new().await.unwrap();
    let order: Vec<JobQueue> = deliveries.iter().map(|d| d.queue).collect();
    assert_eq!(order, vec![JobQueue::High, JobQueue::Medium, JobQueue::Low]);
}

#[tokio::test]
async fn test_unacked_entry_stays_pending() {
    let redis = TestRedis::new().await;
    let producer = QueueProducer::new(redis.connection());
    let consumer = consumer(&redis);

    consumer.ensure_groups().await.unwrap();
    producer.publish(&envelope("sticky"), JobQueue::High).await.unwrap();

    let first = consumer.read_new().await.unwrap();
    assert_eq!(first.len(), 1);

    // Not ACKed: the entry is redelivered on the pending read
    let pending = consumer.read_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].message_id, first[0].message_id);
}

#[tokio::test]
async fn test_delayed_publish_held_until_promoted() {
    let redis = TestRedis::new().await;
    let producer = QueueProducer::new(redis.connection());
    let consumer = consumer(&redis);

    consumer.ensure_groups().await.unwrap();

    let sent = envelope("later");
    producer
        .publish_delayed(&sent, JobQueue::High, Duration::seconds(30))
        .await
        .unwrap();

    // Parked, not visible
    assert_eq!(producer.delayed_depth().await.unwrap(), 1);
    assert!(consumer.read_new().await.unwrap().is_empty());

    // Not due yet
    assert_eq!(producer.promote_due(Utc::now()).await.unwrap(), 0);

    // Due once the clock catches up
    let promoted = producer
        .promote_due(Utc::now() + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(promoted, 1);
    assert_eq!(producer.delayed_depth().await.unwrap(), 0);

    let deliveries = consumer.read_new().await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].envelope.as_ref().unwrap(), &sent);
}

#[tokio::test]
async fn test_undecodable_entry_surfaces_as_decode_failure() {
    let redis = TestRedis::new().await;
    let consumer = consumer(&redis);

    consumer.ensure_groups().await.unwrap();

    // Raw XADD bypassing the producer: body is not an envelope
    let mut conn = redis.connection();
    let _: String = redis::cmd("XADD")
        .arg(JobQueue::Medium.stream())
        .arg("*")
        .arg("job")
        .arg("{not valid json")
        .query_async(&mut conn)
        .await
        .unwrap();

    let deliveries = consumer.read_new().await.unwrap();
    assert_eq!(deliveries.len(), 1);

    let failure = deliveries[0].envelope.as_ref().unwrap_err();
    assert_eq!(failure.raw, "{not valid json");
}

#[tokio::test]
async fn test_reject_to_dlq_and_requeue() {
    let redis = TestRedis::new().await;
    let producer = QueueProducer::new(redis.connection());
    let consumer = consumer(&redis);
    let poison = PoisonQueue::new(redis.connection());

    consumer.ensure_groups().await.unwrap();

    let sent = envelope("poisonous");
    producer.publish(&sent, JobQueue::Low).await.unwrap();

    let deliveries = consumer.read_new().await.unwrap();
    let body = sent.to_json().unwrap();
    consumer
        .reject_to_dlq(JobQueue::Low, &deliveries[0].message_id, &body, "no handler")
        .await
        .unwrap();
    consumer
        .ack(JobQueue::Low, &deliveries[0].message_id)
        .await
        .unwrap();

    let stats = poison.stats().await.unwrap();
    assert_eq!(stats.length, 1);

    let entries = poison.list(10, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source.as_deref(), Some("jobs.low"));
    assert_eq!(entries[0].error, "no handler");

    // Requeue puts the body back on its source stream
    let requeued = poison.requeue(&entries[0].dlq_id).await.unwrap();
    assert!(requeued);
    assert_eq!(poison.stats().await.unwrap().length, 0);

    let redelivered = consumer.read_new().await.unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].envelope.as_ref().unwrap(), &sent);
}

#[tokio::test]
async fn test_promote_due_is_batched_per_entry() {
    let redis = TestRedis::new().await;
    let producer = QueueProducer::new(redis.connection());
    let consumer = consumer(&redis);

    consumer.ensure_groups().await.unwrap();

    for i in 0..5 {
        producer
            .publish_delayed(
                &envelope(&format!("d{}", i)),
                JobQueue::Medium,
                Duration::seconds(i),
            )
            .await
            .unwrap();
    }

    let promoted = producer
        .promote_due(Utc::now() + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(promoted, 5);

    let mut conn = redis.connection();
    let remaining: i64 = redis::cmd("ZCARD")
        .arg(DELAYED_SET)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}
