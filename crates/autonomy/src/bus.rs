// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority/dedup/retry event bus.
//!
//! Events are queued in a priority heap (critical before high before
//! medium before low, FIFO within a tier) and dispatched to subscribed
//! handlers by a background task. A handler that keeps failing after
//! `max_retries` moves its event to the dead letter queue instead of
//! blocking the rest of the queue.

use ag3nt_core::defaults::EVENT_DEDUP_WINDOW;
use ag3nt_core::id::EventId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for EventPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl EventPriority {
    fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub priority: EventPriority,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(uuid::Uuid::new_v4().to_string()),
            event_type: event_type.into(),
            source: source.into(),
            payload: Value::Null,
            priority: EventPriority::Medium,
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Deterministic digest over `(event_type, source, payload)`. Two
    /// events carrying the same logical content collapse to the same key
    /// regardless of when they were constructed.
    pub fn dedup_key(&self) -> String {
        let canonical = canonicalize(&self.payload);
        let mut hasher = Sha256::new();
        hasher.update(self.event_type.as_bytes());
        hasher.update(b":");
        hasher.update(self.source.as_bytes());
        hasher.update(b":");
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Recursively sorts object keys so semantically identical payloads always
/// serialize to the same string, independent of field insertion order.
fn canonicalize(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by_key(|(k, _)| k.clone());
                let mut out = Map::new();
                for (k, v) in entries {
                    out.insert(k.clone(), sorted(v));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// Builds an event with an arbitrary set of extra metadata fields, mirroring
/// the original `create_event(**kwargs)` convenience constructor.
pub fn create_event(
    event_type: impl Into<String>,
    source: impl Into<String>,
    payload: Option<Value>,
    priority: EventPriority,
    metadata: Map<String, Value>,
) -> Event {
    let mut event = Event::new(event_type, source).with_priority(priority);
    if let Some(payload) = payload {
        event = event.with_payload(payload);
    }
    event.with_metadata(metadata)
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), String>;
}

struct Subscription {
    id: u64,
    event_types: Option<HashSet<String>>,
    handler: Arc<dyn EventHandler>,
}

impl Subscription {
    fn matches(&self, event: &Event) -> bool {
        match &self.event_types {
            Some(types) => types.contains(&event.event_type),
            None => true,
        }
    }
}

struct QueuedEvent {
    rank: u8,
    arrival_seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.arrival_seq == other.arrival_seq
    }
}
impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher rank pops first; among equal ranks, earlier arrival pops first.
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.arrival_seq.cmp(&self.arrival_seq))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DlqEntry {
    pub event: Event,
    pub error: String,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BusMetrics {
    pub events_received: u64,
    pub events_processed: u64,
    pub events_deduplicated: u64,
    pub events_failed: u64,
    pub subscriptions: usize,
}

struct BusState {
    queue: BinaryHeap<QueuedEvent>,
    subscriptions: Vec<Subscription>,
    recent_dedup: VecDeque<(String, DateTime<Utc>)>,
    dlq: Vec<DlqEntry>,
    metrics: BusMetrics,
}

/// Priority/dedup/retry event bus with a dead letter queue for handlers
/// that keep failing.
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
    arrival_seq: AtomicU64,
    subscription_seq: AtomicU64,
    dedup_window: Duration,
    max_retries: u32,
    retry_delay: Duration,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

impl EventBus {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                queue: BinaryHeap::new(),
                subscriptions: Vec::new(),
                recent_dedup: VecDeque::new(),
                dlq: Vec::new(),
                metrics: BusMetrics::default(),
            })),
            arrival_seq: AtomicU64::new(0),
            subscription_seq: AtomicU64::new(0),
            dedup_window: EVENT_DEDUP_WINDOW,
            max_retries,
            retry_delay,
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(AtomicOrdering::SeqCst)
    }

    /// Registers a handler, optionally filtered to a set of event types.
    /// Returns a subscription id usable with [`EventBus::unsubscribe`].
    pub fn subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        event_types: Option<HashSet<String>>,
    ) -> u64 {
        let id = self.subscription_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = self.state.lock();
        state.subscriptions.push(Subscription {
            id,
            event_types,
            handler,
        });
        state.metrics.subscriptions = state.subscriptions.len();
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != id);
        state.metrics.subscriptions = state.subscriptions.len();
        state.subscriptions.len() != before
    }

    /// Queues `event` for dispatch. Returns `false` (without queueing) if
    /// an event with the same [`Event::dedup_key`] was published within
    /// the dedup window.
    pub async fn publish(&self, event: Event) -> bool {
        let mut state = self.state.lock();
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(self.dedup_window).unwrap_or_default();
        state.recent_dedup.retain(|(_, seen_at)| *seen_at >= cutoff);

        let key = event.dedup_key();
        if state.recent_dedup.iter().any(|(k, _)| k == &key) {
            state.metrics.events_deduplicated += 1;
            return false;
        }

        state.recent_dedup.push_back((key, now));
        state.metrics.events_received += 1;

        let arrival_seq = self.arrival_seq.fetch_add(1, AtomicOrdering::SeqCst);
        state.queue.push(QueuedEvent {
            rank: event.priority.rank(),
            arrival_seq,
            event,
        });
        drop(state);
        self.wake.notify_one();
        true
    }

    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        let bus = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while bus.running.load(AtomicOrdering::SeqCst) {
                let next = {
                    let mut state = bus.state.lock();
                    state.queue.pop()
                };
                match next {
                    Some(queued) => bus.dispatch(queued.event).await,
                    None => {
                        tokio::select! {
                            _ = bus.wake.notified() => {}
                            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                        }
                    }
                }
            }
        });
        *self.worker.lock() = Some(handle);
    }

    pub async fn stop(&self) {
        self.running.store(false, AtomicOrdering::SeqCst);
        self.wake.notify_waiters();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn dispatch(&self, event: Event) {
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let state = self.state.lock();
            state
                .subscriptions
                .iter()
                .filter(|s| s.matches(&event))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in handlers {
            let mut attempt = 0;
            loop {
                match handler.handle(&event).await {
                    Ok(()) => {
                        self.state.lock().metrics.events_processed += 1;
                        break;
                    }
                    Err(err) => {
                        attempt += 1;
                        if attempt > self.max_retries {
                            let mut state = self.state.lock();
                            state.metrics.events_failed += 1;
                            state.dlq.push(DlqEntry {
                                event: event.clone(),
                                error: err,
                                retry_count: attempt - 1,
                            });
                            break;
                        }
                        tracing::warn!(event_type = %event.event_type, attempt, %err, "event handler failed, retrying");
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
    }

    pub fn get_dlq(&self) -> Vec<DlqEntry> {
        self.state.lock().dlq.clone()
    }

    pub fn get_metrics(&self) -> BusMetrics {
        self.state.lock().metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<Event>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &Event) -> Result<(), String> {
            self.seen.lock().push(event.clone());
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &Event) -> Result<(), String> {
            Err("handler failed".to_string())
        }
    }

    #[tokio::test]
    async fn start_stop_toggles_running_flag() {
        let bus = Arc::new(EventBus::default());
        bus.start().await;
        assert!(bus.is_running());
        bus.stop().await;
        assert!(!bus.is_running());
    }

    #[tokio::test]
    async fn subscribe_and_publish_delivers_event() {
        let bus = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(RecordingHandler { seen: Arc::clone(&seen) }), None);
        bus.start().await;

        bus.publish(Event::new("test", "src")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        bus.stop().await;

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].event_type, "test");
    }

    #[tokio::test]
    async fn type_filtered_subscription_ignores_other_types() {
        let bus = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut types = HashSet::new();
        types.insert("type_a".to_string());
        bus.subscribe(Arc::new(RecordingHandler { seen: Arc::clone(&seen) }), Some(types));
        bus.start().await;

        bus.publish(Event::new("type_a", "src")).await;
        bus.publish(Event::new("type_b", "src")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        bus.stop().await;

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].event_type, "type_a");
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let bus = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = bus.subscribe(Arc::new(RecordingHandler { seen: Arc::clone(&seen) }), None);
        bus.start().await;

        bus.publish(Event::new("test", "src")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(bus.unsubscribe(id));

        bus.publish(Event::new("test2", "src")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        bus.stop().await;

        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_payload_is_deduplicated() {
        let bus = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(RecordingHandler { seen: Arc::clone(&seen) }), None);
        bus.start().await;

        let payload = serde_json::json!({"key": "value"});
        assert!(bus.publish(Event::new("test", "src").with_payload(payload.clone())).await);
        assert!(!bus.publish(Event::new("test", "src").with_payload(payload)).await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        bus.stop().await;

        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn critical_events_are_dispatched_before_queued_low_priority() {
        let bus = Arc::new(EventBus::default());
        let order = Arc::new(Mutex::new(Vec::new()));
        struct OrderHandler(Arc<Mutex<Vec<EventPriority>>>);
        #[async_trait]
        impl EventHandler for OrderHandler {
            async fn handle(&self, event: &Event) -> Result<(), String> {
                self.0.lock().push(event.priority);
                Ok(())
            }
        }
        bus.subscribe(Arc::new(OrderHandler(Arc::clone(&order))), None);

        bus.publish(Event::new("low", "src").with_priority(EventPriority::Low)).await;
        bus.publish(Event::new("critical", "src").with_priority(EventPriority::Critical)).await;
        bus.publish(Event::new("medium", "src").with_priority(EventPriority::Medium)).await;

        bus.start().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        bus.stop().await;

        assert_eq!(order.lock()[0], EventPriority::Critical);
    }

    #[tokio::test]
    async fn failing_handler_lands_in_dead_letter_queue() {
        let bus = Arc::new(EventBus::new(2, Duration::from_millis(10)));
        bus.subscribe(Arc::new(FailingHandler), None);
        bus.start().await;

        bus.publish(Event::new("test", "src")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.stop().await;

        let dlq = bus.get_dlq();
        assert_eq!(dlq.len(), 1);
        assert!(dlq[0].error.contains("handler failed"));
        assert_eq!(dlq[0].retry_count, 2);
    }

    #[tokio::test]
    async fn metrics_count_received_and_processed() {
        let bus = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(RecordingHandler { seen }), None);
        bus.start().await;

        bus.publish(Event::new("test", "src")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        bus.stop().await;

        let metrics = bus.get_metrics();
        assert_eq!(metrics.events_received, 1);
        assert_eq!(metrics.events_processed, 1);
        assert_eq!(metrics.subscriptions, 1);
    }

    #[test]
    fn dedup_key_matches_for_identical_content() {
        let e1 = Event::new("test", "src").with_payload(serde_json::json!({"a": 1}));
        let e2 = Event::new("test", "src").with_payload(serde_json::json!({"a": 1}));
        assert_eq!(e1.dedup_key(), e2.dedup_key());
    }

    #[test]
    fn dedup_key_differs_for_different_content() {
        let e1 = Event::new("test", "src").with_payload(serde_json::json!({"a": 1}));
        let e2 = Event::new("test", "src").with_payload(serde_json::json!({"a": 2}));
        assert_ne!(e1.dedup_key(), e2.dedup_key());
    }

    #[test]
    fn create_event_carries_metadata() {
        let mut metadata = Map::new();
        metadata.insert("custom_field".to_string(), Value::String("value".to_string()));
        let event = create_event(
            "http_check",
            "monitor",
            Some(serde_json::json!({"status": 500})),
            EventPriority::High,
            metadata,
        );
        assert_eq!(event.priority, EventPriority::High);
        assert_eq!(event.metadata.get("custom_field").unwrap(), "value");
    }
}
