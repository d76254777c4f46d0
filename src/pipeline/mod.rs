//! Per-reading driver: evaluate, publish, then apply alert mutations.
//!
//! Evaluation and publishing are cheap and never touch the store, so they run
//! as soon as a reading arrives. Only the resulting intents are queued.
//! Failures stay here. A store that is down or slow costs at most
//! `(max_retries + 1) * timeout` plus the retry delays per intent, then the
//! intent is logged and skipped.

pub mod dispatcher;

pub use dispatcher::{DispatchError, PipelineEvent, ReadingDispatcher};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::alerts::{AlertEvaluator, AlertIntent, AlertStore, Evaluation, StoreError, ThresholdTable};
use crate::config::Config;
use crate::live::{BroadcastReport, UpdateEnvelope, UpdatePublisher};
use crate::reading::{Reading, SensorId};

/// Bounds applied to every alert-store call made by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl StorePolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.store_timeout_ms),
            max_retries: config.store_retry_max,
            retry_delay: Duration::from_millis(config.store_retry_delay_ms),
        }
    }
}

/// What happened to one reading.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadingOutcome {
    pub created: Vec<Uuid>,
    pub already_open: usize,
    pub resolved: u64,
    pub store_failures: usize,
    pub rejected: bool,
    pub delivered: usize,
}

#[derive(Clone)]
pub struct AlertPipeline {
    evaluator: AlertEvaluator,
    store: Arc<dyn AlertStore>,
    publisher: UpdatePublisher,
    policy: StorePolicy,
}

impl AlertPipeline {
    pub fn new(
        table: Arc<ThresholdTable>,
        store: Arc<dyn AlertStore>,
        publisher: UpdatePublisher,
        policy: StorePolicy,
    ) -> Self {
        Self {
            evaluator: AlertEvaluator::new(table),
            store,
            publisher,
            policy,
        }
    }

    /// Decide what a reading means for its sensor's alerts. Pure apart from
    /// logging a rejected reading.
    #[must_use]
    pub fn evaluate(&self, reading: &Reading) -> Evaluation {
        let evaluation = self.evaluator.evaluate(reading);

        if let Some(err) = &evaluation.rejected {
            tracing::error!(
                error = %err,
                sensor_id = reading.sensor_id,
                greenhouse_id = reading.greenhouse_id,
                "Malformed reading skipped for alert evaluation"
            );
        }

        evaluation
    }

    pub async fn publish(&self, envelope: &UpdateEnvelope) -> BroadcastReport {
        self.publisher.publish(envelope).await
    }

    /// Apply intents in order. Never fails: store problems are logged and
    /// counted in the returned outcome.
    pub async fn apply_intents(&self, intents: Vec<AlertIntent>) -> ReadingOutcome {
        let mut outcome = ReadingOutcome::default();
        for intent in intents {
            self.apply(intent, &mut outcome).await;
        }
        outcome
    }

    /// Evaluate, publish, then apply, all inline.
    pub async fn handle_reading(&self, reading: Reading) -> ReadingOutcome {
        let evaluation = self.evaluate(&reading);
        let report = self.publish(&evaluation.envelope).await;

        let mut outcome = self.apply_intents(evaluation.intents).await;
        outcome.rejected = evaluation.rejected.is_some();
        outcome.delivered = report.delivered;
        outcome
    }

    /// Resolve the open alerts of a sensor that is being deleted.
    ///
    /// # Errors
    ///
    /// Returns the last store error once retries are exhausted.
    pub async fn handle_sensor_deleted(&self, sensor_id: SensorId) -> Result<u64, StoreError> {
        let result = self
            .with_retry("resolve_for_deleted_sensor", || {
                self.store.resolve_for_deleted_sensor(sensor_id)
            })
            .await;

        match &result {
            Ok(resolved) => tracing::info!(
                sensor_id,
                resolved,
                "Resolved open alerts of deleted sensor"
            ),
            Err(e) => tracing::error!(
                error = %e,
                sensor_id,
                "Failed to resolve alerts of deleted sensor"
            ),
        }

        result
    }

    async fn apply(&self, intent: AlertIntent, outcome: &mut ReadingOutcome) {
        match intent {
            AlertIntent::EnsureOpen(new_alert) => {
                let result = self
                    .with_retry("ensure_open", || self.store.ensure_open(new_alert.clone()))
                    .await;

                match result {
                    Ok((alert, true)) => {
                        tracing::info!(
                            alert_id = %alert.id,
                            greenhouse_id = alert.greenhouse_id,
                            sensor_id = ?alert.sensor_id,
                            severity = %alert.severity,
                            message = %alert.message,
                            "Alert opened"
                        );
                        outcome.created.push(alert.id);
                    }
                    Ok((alert, false)) => {
                        tracing::debug!(alert_id = %alert.id, "Alert already open");
                        outcome.already_open += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            greenhouse_id = new_alert.greenhouse_id,
                            message = %new_alert.message,
                            "Skipping alert creation"
                        );
                        outcome.store_failures += 1;
                    }
                }
            }
            AlertIntent::ResolveAllForSensor { sensor_id } => {
                let result = self
                    .with_retry("resolve_all_open_for_sensor", || {
                        self.store.resolve_all_open_for_sensor(sensor_id)
                    })
                    .await;

                match result {
                    Ok(0) => {}
                    Ok(resolved) => {
                        tracing::info!(sensor_id, resolved, "Alerts resolved");
                        outcome.resolved += resolved;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, sensor_id, "Skipping alert resolution");
                        outcome.store_failures += 1;
                    }
                }
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retries = 0;

        loop {
            let result = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.policy.timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.policy.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        error = %e,
                        operation,
                        retry = retries,
                        max_retries = self.policy.max_retries,
                        "Alert store call failed, retrying"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
