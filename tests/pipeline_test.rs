//! End-to-end behaviour of the alert pipeline against the in-memory store.
//!
//! Run with: cargo test --test pipeline_test

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use greengrow::alerts::{
    Alert, AlertStore, MemoryAlertStore, NewAlert, Severity, StoreError, ThresholdTable,
};
use greengrow::live::{GroupKey, SubscriptionRegistry, UpdatePublisher};
use greengrow::pipeline::{AlertPipeline, ReadingDispatcher, StorePolicy};
use greengrow::reading::Reading;

const GREENHOUSE: i64 = 7;
const TEMP_SENSOR: i64 = 1;

fn test_policy() -> StorePolicy {
    StorePolicy {
        timeout: Duration::from_millis(50),
        max_retries: 2,
        retry_delay: Duration::from_millis(1),
    }
}

fn reading(sensor_id: i64, kind: &str, value: f64) -> Reading {
    Reading {
        sensor_id,
        sensor_kind: kind.to_string(),
        sensor_name: format!("{kind} sensor"),
        greenhouse_id: GREENHOUSE,
        value,
        observed_at: Utc::now(),
    }
}

fn temp(value: f64) -> Reading {
    reading(TEMP_SENSOR, "TEMP", value)
}

struct Harness {
    pipeline: AlertPipeline,
    store: Arc<MemoryAlertStore>,
    registry: Arc<SubscriptionRegistry>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryAlertStore::new());
    let registry = Arc::new(SubscriptionRegistry::new(32));
    let pipeline = AlertPipeline::new(
        Arc::new(ThresholdTable::builtin()),
        store.clone(),
        UpdatePublisher::new(registry.clone()),
        test_policy(),
    );
    Harness {
        pipeline,
        store,
        registry,
    }
}

/// Store double that fails every call and counts attempts.
#[derive(Default)]
struct DownStore {
    calls: AtomicUsize,
}

impl DownStore {
    fn fail(&self) -> StoreError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StoreError::Unavailable("connection refused".to_string())
    }
}

#[async_trait]
impl AlertStore for DownStore {
    async fn ensure_open(&self, _alert: NewAlert) -> Result<(Alert, bool), StoreError> {
        Err(self.fail())
    }

    async fn resolve_all_open_for_sensor(&self, _sensor_id: i64) -> Result<u64, StoreError> {
        Err(self.fail())
    }

    async fn open_for_sensor(&self, _sensor_id: i64) -> Result<Vec<Alert>, StoreError> {
        Err(self.fail())
    }

    async fn list_for_greenhouse(
        &self,
        _greenhouse_id: i64,
        _resolved: Option<bool>,
    ) -> Result<Vec<Alert>, StoreError> {
        Err(self.fail())
    }

    async fn resolve_by_ids(&self, _ids: &[Uuid]) -> Result<u64, StoreError> {
        Err(self.fail())
    }
}

/// Store double that never answers within the policy timeout.
struct HangingStore;

#[async_trait]
impl AlertStore for HangingStore {
    async fn ensure_open(&self, _alert: NewAlert) -> Result<(Alert, bool), StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(StoreError::Unavailable("unreachable".to_string()))
    }

    async fn resolve_all_open_for_sensor(&self, _sensor_id: i64) -> Result<u64, StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(0)
    }

    async fn open_for_sensor(&self, _sensor_id: i64) -> Result<Vec<Alert>, StoreError> {
        Ok(Vec::new())
    }

    async fn list_for_greenhouse(
        &self,
        _greenhouse_id: i64,
        _resolved: Option<bool>,
    ) -> Result<Vec<Alert>, StoreError> {
        Ok(Vec::new())
    }

    async fn resolve_by_ids(&self, _ids: &[Uuid]) -> Result<u64, StoreError> {
        Ok(0)
    }
}

/// Store double whose writes hit a constraint, e.g. a sensor deleted
/// between evaluation and insert.
#[derive(Default)]
struct RejectingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl AlertStore for RejectingStore {
    async fn ensure_open(&self, _alert: NewAlert) -> Result<(Alert, bool), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Rejected("violates foreign key constraint".to_string()))
    }

    async fn resolve_all_open_for_sensor(&self, _sensor_id: i64) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn open_for_sensor(&self, _sensor_id: i64) -> Result<Vec<Alert>, StoreError> {
        Ok(Vec::new())
    }

    async fn list_for_greenhouse(
        &self,
        _greenhouse_id: i64,
        _resolved: Option<bool>,
    ) -> Result<Vec<Alert>, StoreError> {
        Ok(Vec::new())
    }

    async fn resolve_by_ids(&self, _ids: &[Uuid]) -> Result<u64, StoreError> {
        Ok(0)
    }
}

#[tokio::test]
async fn high_temperature_opens_alert_and_publishes_update() {
    let h = harness();
    let mut subscriber = h.registry.connect(GroupKey::for_greenhouse(GREENHOUSE)).await;

    let outcome = h.pipeline.handle_reading(temp(35.0)).await;
    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.delivered, 1);

    let open = h.store.open_for_sensor(TEMP_SENSOR).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(
        open[0].message,
        "TEMP High Temperature Alert: Temperature is 35.0°C"
    );
    assert_eq!(open[0].severity, Severity::Critical);
    assert_eq!(open[0].greenhouse_id, GREENHOUSE);

    let payload = subscriber.receiver.recv().await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(json["type"], "sensor_data_update");
    assert_eq!(json["message"]["sensor_id"], TEMP_SENSOR);
    assert_eq!(json["message"]["latest_reading"]["value"], 35.0);
    assert_eq!(json["message"]["sensor_type"], "TEMP");
}

#[tokio::test]
async fn normal_reading_resolves_previous_alert() {
    let h = harness();
    h.pipeline.handle_reading(temp(35.0)).await;

    let outcome = h.pipeline.handle_reading(temp(22.0)).await;
    assert_eq!(outcome.resolved, 1);
    assert!(outcome.created.is_empty());

    let all = h.store.all().await;
    assert_eq!(all.len(), 1);
    assert!(all[0].is_resolved);
}

#[tokio::test]
async fn repeated_violation_creates_alert_once() {
    let h = harness();

    for _ in 0..5 {
        h.pipeline.handle_reading(temp(35.0)).await;
    }

    assert_eq!(h.store.len().await, 1);
    assert_eq!(h.store.open_for_sensor(TEMP_SENSOR).await.unwrap().len(), 1);
}

#[tokio::test]
async fn violation_after_resolution_creates_new_record() {
    let h = harness();

    let first = h.pipeline.handle_reading(temp(35.0)).await;
    h.pipeline.handle_reading(temp(22.0)).await;
    let second = h.pipeline.handle_reading(temp(35.0)).await;

    assert_eq!(first.created.len(), 1);
    assert_eq!(second.created.len(), 1);
    assert_ne!(first.created[0], second.created[0]);

    let all = h.store.all().await;
    assert_eq!(all.len(), 2);
    assert!(all[0].is_resolved);
    assert!(!all[1].is_resolved);
}

#[tokio::test]
async fn passing_reading_resolves_every_open_alert_of_the_sensor() {
    let h = harness();

    // Two different high readings leave two distinct open alerts.
    h.pipeline.handle_reading(temp(35.0)).await;
    h.pipeline.handle_reading(temp(40.0)).await;
    assert_eq!(h.store.open_for_sensor(TEMP_SENSOR).await.unwrap().len(), 2);

    // An unrelated sensor keeps its alert.
    h.pipeline.handle_reading(reading(2, "CO2", 1500.0)).await;

    let outcome = h.pipeline.handle_reading(temp(20.0)).await;
    assert_eq!(outcome.resolved, 2);
    assert!(h.store.open_for_sensor(TEMP_SENSOR).await.unwrap().is_empty());
    assert_eq!(h.store.open_for_sensor(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unconfigured_kind_neither_opens_nor_resolves() {
    let h = harness();
    let mut subscriber = h.registry.connect(GroupKey::for_greenhouse(GREENHOUSE)).await;

    // Open an alert on the soil sensor through the store directly.
    h.store
        .ensure_open(NewAlert {
            greenhouse_id: GREENHOUSE,
            sensor_id: Some(5),
            message: "manual".to_string(),
            severity: Severity::Warning,
        })
        .await
        .unwrap();

    let outcome = h.pipeline.handle_reading(reading(5, "SOIL_MOIST", 12.0)).await;
    assert!(outcome.created.is_empty());
    assert_eq!(outcome.resolved, 0);
    assert_eq!(outcome.delivered, 1);
    assert_eq!(h.store.open_for_sensor(5).await.unwrap().len(), 1);
    assert!(subscriber.receiver.recv().await.is_some());
}

#[tokio::test]
async fn sensor_deletion_resolves_open_alerts() {
    let h = harness();
    h.pipeline.handle_reading(temp(35.0)).await;
    h.pipeline.handle_reading(temp(5.0)).await;

    assert_eq!(h.pipeline.handle_sensor_deleted(TEMP_SENSOR).await.unwrap(), 2);
    assert!(h.store.open_for_sensor(TEMP_SENSOR).await.unwrap().is_empty());
    assert_eq!(h.pipeline.handle_sensor_deleted(TEMP_SENSOR).await.unwrap(), 0);
}

#[tokio::test]
async fn store_outage_does_not_block_live_updates() {
    let store = Arc::new(DownStore::default());
    let registry = Arc::new(SubscriptionRegistry::new(8));
    let pipeline = AlertPipeline::new(
        Arc::new(ThresholdTable::builtin()),
        store.clone(),
        UpdatePublisher::new(registry.clone()),
        test_policy(),
    );
    let mut subscriber = registry.connect(GroupKey::for_greenhouse(GREENHOUSE)).await;

    let outcome = pipeline.handle_reading(temp(35.0)).await;

    assert_eq!(outcome.store_failures, 1);
    assert_eq!(outcome.delivered, 1);
    // One attempt plus two retries
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    assert!(subscriber.receiver.recv().await.is_some());

    assert!(matches!(
        pipeline.handle_sensor_deleted(TEMP_SENSOR).await,
        Err(StoreError::Unavailable(_))
    ));
}

#[tokio::test]
async fn hanging_store_is_bounded_by_timeout() {
    let registry = Arc::new(SubscriptionRegistry::new(8));
    let pipeline = AlertPipeline::new(
        Arc::new(ThresholdTable::builtin()),
        Arc::new(HangingStore),
        UpdatePublisher::new(registry.clone()),
        test_policy(),
    );
    let mut subscriber = registry.connect(GroupKey::for_greenhouse(GREENHOUSE)).await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.handle_reading(temp(35.0)),
    )
    .await
    .expect("pipeline must give up on a hanging store");

    assert_eq!(outcome.store_failures, 1);
    assert!(subscriber.receiver.recv().await.is_some());
}

#[tokio::test]
async fn malformed_reading_is_published_but_not_evaluated() {
    let h = harness();
    let mut subscriber = h.registry.connect(GroupKey::for_greenhouse(GREENHOUSE)).await;

    let outcome = h.pipeline.handle_reading(reading(TEMP_SENSOR, "", 99.0)).await;
    assert!(outcome.rejected);
    assert!(outcome.created.is_empty());
    assert!(h.store.is_empty().await);
    assert!(subscriber.receiver.recv().await.is_some());
}

#[tokio::test]
async fn other_greenhouses_do_not_receive_updates() {
    let h = harness();
    let mut seven_a = h.registry.connect(GroupKey::for_greenhouse(7)).await;
    let mut seven_b = h.registry.connect(GroupKey::for_greenhouse(7)).await;
    let mut eight = h.registry.connect(GroupKey::for_greenhouse(8)).await;

    let outcome = h.pipeline.handle_reading(temp(21.0)).await;
    assert_eq!(outcome.delivered, 2);

    assert!(seven_a.receiver.recv().await.is_some());
    assert!(seven_b.receiver.recv().await.is_some());
    assert!(eight.receiver.try_recv().is_err());
}

#[tokio::test]
async fn dispatcher_preserves_per_sensor_order() {
    let h = harness();
    let dispatcher = ReadingDispatcher::spawn(h.pipeline.clone(), 3, 16);

    dispatcher.submit_reading(temp(35.0)).await.unwrap();
    dispatcher.submit_reading(temp(22.0)).await.unwrap();
    dispatcher.submit_reading(temp(35.0)).await.unwrap();
    dispatcher.submit_reading(reading(4, "CO2", 1200.0)).await.unwrap();

    // Queued behind the three TEMP readings on the same shard.
    let resolved = dispatcher.sensor_deleted(TEMP_SENSOR).await.unwrap();
    assert_eq!(resolved, 1);

    let temp_alerts: Vec<_> = h
        .store
        .all()
        .await
        .into_iter()
        .filter(|a| a.sensor_id == Some(TEMP_SENSOR))
        .collect();
    assert_eq!(temp_alerts.len(), 2);
    assert!(temp_alerts.iter().all(|a| a.is_resolved));
}

#[tokio::test]
async fn live_updates_do_not_wait_for_alert_store() {
    let registry = Arc::new(SubscriptionRegistry::new(8));
    let pipeline = AlertPipeline::new(
        Arc::new(ThresholdTable::builtin()),
        Arc::new(HangingStore),
        UpdatePublisher::new(registry.clone()),
        StorePolicy::default(),
    );
    let dispatcher = ReadingDispatcher::spawn(pipeline, 4, 1024);
    let mut subscriber = registry.connect(GroupKey::for_greenhouse(GREENHOUSE)).await;

    dispatcher.submit_reading(temp(35.0)).await.unwrap();
    dispatcher.submit_reading(temp(36.0)).await.unwrap();

    for expected in [35.0, 36.0] {
        let payload = tokio::time::timeout(Duration::from_secs(1), subscriber.receiver.recv())
            .await
            .expect("update must not queue behind the store")
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["message"]["latest_reading"]["value"], expected);
    }
}

#[tokio::test]
async fn full_alert_queue_still_delivers_every_update() {
    let registry = Arc::new(SubscriptionRegistry::new(32));
    let pipeline = AlertPipeline::new(
        Arc::new(ThresholdTable::builtin()),
        Arc::new(HangingStore),
        UpdatePublisher::new(registry.clone()),
        StorePolicy {
            timeout: Duration::from_secs(60),
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
        },
    );
    let dispatcher = ReadingDispatcher::spawn(pipeline, 1, 1);
    let mut subscriber = registry.connect(GroupKey::for_greenhouse(GREENHOUSE)).await;

    // The worker hangs on the first intent and the queue holds one more, so
    // most alert work is refused. Every update is still published.
    let mut refused = 0;
    for _ in 0..10 {
        if dispatcher.submit_reading(temp(35.0)).await.is_err() {
            refused += 1;
        }
    }
    assert!(refused > 0);

    for _ in 0..10 {
        assert!(subscriber.receiver.try_recv().is_ok());
    }
}

#[tokio::test]
async fn constraint_violations_are_not_retried() {
    let store = Arc::new(RejectingStore::default());
    let pipeline = AlertPipeline::new(
        Arc::new(ThresholdTable::builtin()),
        store.clone(),
        UpdatePublisher::new(Arc::new(SubscriptionRegistry::new(8))),
        test_policy(),
    );

    let outcome = pipeline.handle_reading(temp(35.0)).await;
    assert_eq!(outcome.store_failures, 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}
