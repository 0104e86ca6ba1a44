//! Queue consumer tests over in-memory store, claims and sources.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use stockpulse_common::error::AppError;
use stockpulse_common::types::{Stock, User, Wishlist};
use stockpulse_consumer::{
    DeadLetterRecord, DeadLetterSink, Disposition, MessageSource, QueueConsumer, RetryPolicy,
};
use stockpulse_engine::lock::LocalClaimLock;
use stockpulse_engine::store::{MemoryStore, WishlistStore};
use stockpulse_engine::{ErrorKind, NotificationPipeline, PipelineState};
use stockpulse_notifier::{EmailNotifier, SimulatedTransport};

// ============================================================
// Shared helpers
// ============================================================

/// Fails the first `failures` user lookups, then behaves like the inner store.
struct FlakyStore {
    inner: MemoryStore,
    failures: u32,
    user_calls: AtomicU32,
}

impl FlakyStore {
    fn new(inner: MemoryStore, failures: u32) -> Self {
        Self {
            inner,
            failures,
            user_calls: AtomicU32::new(0),
        }
    }

    fn user_calls(&self) -> u32 {
        self.user_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WishlistStore for FlakyStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let call = self.user_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(AppError::Internal("connection reset".to_string()));
        }
        self.inner.find_user(user_id).await
    }

    async fn find_stock(&self, stock_id: &str) -> Result<Option<Stock>, AppError> {
        self.inner.find_stock(stock_id).await
    }

    async fn find_wishlist(&self, wishlist_id: &str) -> Result<Option<Wishlist>, AppError> {
        self.inner.find_wishlist(wishlist_id).await
    }

    async fn mark_notified(&self, wishlist: &Wishlist) -> Result<bool, AppError> {
        self.inner.mark_notified(wishlist).await
    }

    async fn list_wishlists_by_user(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> Result<Vec<Wishlist>, AppError> {
        self.inner.list_wishlists_by_user(user_id, active_only).await
    }

    async fn list_pending_wishlists(&self) -> Result<Vec<Wishlist>, AppError> {
        self.inner.list_pending_wishlists().await
    }
}

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl RecordingSink {
    fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingSink {
    async fn push(&self, record: &DeadLetterRecord) -> Result<(), AppError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl DeadLetterSink for BrokenSink {
    async fn push(&self, _record: &DeadLetterRecord) -> Result<(), AppError> {
        Err(AppError::Internal("dead-letter list unavailable".to_string()))
    }
}

/// Scripted source: each step is a payload, an empty poll or a receive error.
/// Once the script runs out it keeps returning empty polls.
struct VecSource {
    items: VecDeque<Result<Option<String>, String>>,
}

impl VecSource {
    /// Payloads with an empty poll in between.
    fn new(payloads: &[&str]) -> Self {
        let mut items = VecDeque::new();
        for payload in payloads {
            items.push_back(Ok(Some(payload.to_string())));
            items.push_back(Ok(None));
        }
        Self { items }
    }

    fn then_fail(mut self, reason: &str) -> Self {
        self.items.push_back(Err(reason.to_string()));
        self
    }

    fn then_deliver(mut self, payload: &str) -> Self {
        self.items.push_back(Ok(Some(payload.to_string())));
        self
    }
}

#[async_trait]
impl MessageSource for VecSource {
    async fn receive(&mut self) -> Result<Option<String>, AppError> {
        match self.items.pop_front() {
            Some(step) => step.map_err(AppError::Internal),
            None => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(None)
            }
        }
    }
}

fn seeded_store() -> MemoryStore {
    let now = Utc::now();
    let store = MemoryStore::new();
    store.insert_user(User {
        id: "u1".to_string(),
        name: Some("Asha".to_string()),
        email: Some("u1@x.com".to_string()),
        phone: None,
        password_hash: None,
        created_at: now,
        updated_at: now,
    });
    store.insert_stock(Stock {
        id: "s1".to_string(),
        symbol: "ACME".to_string(),
        name: "Acme".to_string(),
        current_price: Some(2500.0),
        exchange: None,
        sector: None,
    });
    store.insert_wishlist(Wishlist {
        id: "u1::s1".to_string(),
        user_id: "u1".to_string(),
        stock_id: "s1".to_string(),
        rule_type: "percentage_increase".to_string(),
        rule_value_in_percent: "5%".to_string(),
        rate_value_targeted: Some(2500.0),
        rule_value_at_set: Some(2200.0),
        created_at: now,
        updated_at: now,
        active: true,
        notified: false,
    });
    store
}

fn pipeline_over(store: Arc<dyn WishlistStore>) -> Arc<NotificationPipeline> {
    Arc::new(NotificationPipeline::new(
        store,
        EmailNotifier::new(Arc::new(SimulatedTransport::new(Duration::ZERO))),
        Arc::new(LocalClaimLock::new()),
    ))
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(1))
}

// ============================================================
// consume
// ============================================================

#[tokio::test]
async fn test_consume_processes_valid_message() {
    let store = Arc::new(seeded_store());
    let consumer = QueueConsumer::new(pipeline_over(store.clone()));

    match consumer.consume(r#"{"id":"u1::s1"}"#).await {
        Disposition::Processed(outcome) => assert_eq!(outcome.state, PipelineState::Notified),
        other => panic!("expected Processed, got {other:?}"),
    }
    assert!(store.wishlist("u1::s1").unwrap().notified);
}

#[tokio::test]
async fn test_no_retry_by_default() {
    let store = Arc::new(FlakyStore::new(seeded_store(), 1));
    let consumer = QueueConsumer::new(pipeline_over(store.clone()));

    match consumer.consume(r#"{"id":"u1::s1"}"#).await {
        Disposition::Dropped(failure) => assert_eq!(failure.kind(), ErrorKind::Unexpected),
        other => panic!("expected Dropped, got {other:?}"),
    }
    assert_eq!(store.user_calls(), 1);
}

#[tokio::test]
async fn test_unexpected_failure_retried_until_store_recovers() {
    let store = Arc::new(FlakyStore::new(seeded_store(), 2));
    let consumer = QueueConsumer::new(pipeline_over(store.clone())).with_retry(fast_retry(3));

    match consumer.consume(r#"{"id":"u1::s1"}"#).await {
        Disposition::Processed(outcome) => assert_eq!(outcome.state, PipelineState::Notified),
        other => panic!("expected Processed, got {other:?}"),
    }
    assert_eq!(store.user_calls(), 3);
}

#[tokio::test]
async fn test_retries_exhausted_then_dead_lettered() {
    let store = Arc::new(FlakyStore::new(seeded_store(), 10));
    let sink = Arc::new(RecordingSink::default());
    let consumer = QueueConsumer::new(pipeline_over(store.clone()))
        .with_retry(fast_retry(2))
        .with_dead_letter(sink.clone());

    let disposition = consumer.consume(r#"{"id":"u1::s1"}"#).await;

    assert!(matches!(disposition, Disposition::DeadLettered(_)));
    assert_eq!(store.user_calls(), 3);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload, r#"{"id":"u1::s1"}"#);
    assert_eq!(records[0].kind, ErrorKind::Unexpected);
    assert_eq!(records[0].attempts, 3);
}

#[tokio::test]
async fn test_business_failure_not_retried() {
    let store = Arc::new(FlakyStore::new(seeded_store(), 0));
    let sink = Arc::new(RecordingSink::default());
    let consumer = QueueConsumer::new(pipeline_over(store.clone()))
        .with_retry(fast_retry(5))
        .with_dead_letter(sink.clone());

    let disposition = consumer.consume(r#"{"id":"u9::s1"}"#).await;

    match disposition {
        Disposition::DeadLettered(failure) => {
            assert_eq!(failure.kind(), ErrorKind::NotFound);
            assert_eq!(failure.state, PipelineState::Rejected);
        }
        other => panic!("expected DeadLettered, got {other:?}"),
    }
    assert_eq!(store.user_calls(), 1);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attempts, 1);
    assert!(records[0].error.contains("u9"));
}

#[tokio::test]
async fn test_malformed_payload_dropped_without_sink() {
    let consumer = QueueConsumer::new(pipeline_over(Arc::new(seeded_store())));

    match consumer.consume("not json").await {
        Disposition::Dropped(failure) => assert_eq!(failure.kind(), ErrorKind::MalformedMessage),
        other => panic!("expected Dropped, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_dead_letter_push_drops() {
    let consumer =
        QueueConsumer::new(pipeline_over(Arc::new(seeded_store()))).with_dead_letter(Arc::new(BrokenSink));

    assert!(matches!(
        consumer.consume(r#"{"id":""}"#).await,
        Disposition::Dropped(_)
    ));
}

// ============================================================
// run
// ============================================================

#[tokio::test]
async fn test_run_consumes_queued_payloads() {
    let store = Arc::new(seeded_store());
    let sink = Arc::new(RecordingSink::default());
    let consumer = QueueConsumer::new(pipeline_over(store.clone())).with_dead_letter(sink.clone());
    let mut source = VecSource::new(&[r#"{"id":"u1::s1"}"#, "garbage", r#"{"id":"u1::s1"}"#]);

    let stopped = tokio::time::timeout(Duration::from_millis(300), consumer.run(&mut source)).await;

    assert!(stopped.is_err(), "run only ends when its future is dropped");
    assert!(store.wishlist("u1::s1").unwrap().notified);
    // Only the garbage payload failed; the redelivery was skipped
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload, "garbage");
    assert_eq!(records[0].kind, ErrorKind::MalformedMessage);
}

#[tokio::test]
async fn test_run_keeps_polling_after_receive_error() {
    let store = Arc::new(seeded_store());
    let consumer = QueueConsumer::new(pipeline_over(store.clone()))
        .with_error_backoff(Duration::from_millis(5));
    let mut source = VecSource::new(&[])
        .then_fail("redis connection reset")
        .then_deliver(r#"{"id":"u1::s1"}"#);

    let stopped = tokio::time::timeout(Duration::from_millis(300), consumer.run(&mut source)).await;

    assert!(stopped.is_err());
    assert!(store.wishlist("u1::s1").unwrap().notified);
}
