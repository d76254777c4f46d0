//! Alert store contract and the in-process implementation.
//!
//! The store owns alert records. Callers hand it mutation intents; it applies
//! them atomically per key:
//!
//! - `ensure_open` is a get-or-create on `(greenhouse_id, message)` among open
//!   alerts. Concurrent calls for one key yield a single record.
//! - `resolve_all_open_for_sensor` flips every open alert tied to a sensor.
//!
//! Records are never deleted; resolution is a state transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::reading::{GreenhouseId, SensorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Accepts the canonical names plus the legacy `high` marker written by
    /// older dashboards, which maps to `Critical`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "CRITICAL" | "HIGH" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub greenhouse_id: GreenhouseId,
    pub sensor_id: Option<SensorId>,
    pub message: String,
    pub severity: Severity,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to open an alert if none is open for its key.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub greenhouse_id: GreenhouseId,
    pub sensor_id: Option<SensorId>,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Alert store unavailable: {0}")]
    Unavailable(String),

    #[error("Alert store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Open alert for greenhouse {greenhouse_id} changed during upsert: {message}")]
    Conflict {
        greenhouse_id: GreenhouseId,
        message: String,
    },

    #[error("Alert store rejected the write: {0}")]
    Rejected(String),

    #[error("Corrupt alert record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Transient failures worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Corrupt(_) | Self::Rejected(_))
    }
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err.sql_err() {
            // Constraint violations fail the same way on every attempt, e.g.
            // an alert for a sensor that was deleted meanwhile.
            Some(
                sea_orm::SqlErr::ForeignKeyConstraintViolation(_)
                | sea_orm::SqlErr::UniqueConstraintViolation(_),
            ) => Self::Rejected(err.to_string()),
            _ => Self::Unavailable(err.to_string()),
        }
    }
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Atomic get-or-create keyed by `(greenhouse_id, message)` among open
    /// alerts. Returns the alert and whether this call created it. An existing
    /// open alert is returned untouched.
    async fn ensure_open(&self, alert: NewAlert) -> Result<(Alert, bool), StoreError>;

    /// Resolve every open alert tied to `sensor_id`, returning how many changed.
    async fn resolve_all_open_for_sensor(&self, sensor_id: SensorId) -> Result<u64, StoreError>;

    async fn open_for_sensor(&self, sensor_id: SensorId) -> Result<Vec<Alert>, StoreError>;

    /// Alerts of a greenhouse, newest first, optionally filtered by resolution.
    async fn list_for_greenhouse(
        &self,
        greenhouse_id: GreenhouseId,
        resolved: Option<bool>,
    ) -> Result<Vec<Alert>, StoreError>;

    /// Bulk "mark resolved". Already-resolved and unknown ids are skipped.
    async fn resolve_by_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError>;

    /// Cascade for a sensor deleted by the persistence layer.
    async fn resolve_for_deleted_sensor(&self, sensor_id: SensorId) -> Result<u64, StoreError> {
        self.resolve_all_open_for_sensor(sensor_id).await
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// Insertion order doubles as creation order.
    alerts: Vec<Alert>,
    open: HashMap<(GreenhouseId, String), usize>,
}

/// In-process store. A single lock makes every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryAlertStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.alerts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<Alert> {
        self.inner.lock().await.alerts.clone()
    }
}

impl MemoryInner {
    fn resolve_at(&mut self, index: usize) -> bool {
        let alert = &mut self.alerts[index];
        if alert.is_resolved {
            return false;
        }
        alert.is_resolved = true;
        self.open.remove(&(alert.greenhouse_id, alert.message.clone()));
        true
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn ensure_open(&self, alert: NewAlert) -> Result<(Alert, bool), StoreError> {
        let mut inner = self.inner.lock().await;
        let key = (alert.greenhouse_id, alert.message);

        if let Some(&index) = inner.open.get(&key) {
            return Ok((inner.alerts[index].clone(), false));
        }

        let created = Alert {
            id: Uuid::new_v4(),
            greenhouse_id: key.0,
            sensor_id: alert.sensor_id,
            message: key.1.clone(),
            severity: alert.severity,
            is_resolved: false,
            created_at: Utc::now(),
        };
        inner.alerts.push(created.clone());
        let index = inner.alerts.len() - 1;
        inner.open.insert(key, index);
        Ok((created, true))
    }

    async fn resolve_all_open_for_sensor(&self, sensor_id: SensorId) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let targets: Vec<usize> = inner
            .alerts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.sensor_id == Some(sensor_id) && !a.is_resolved)
            .map(|(i, _)| i)
            .collect();

        let mut resolved = 0;
        for index in targets {
            if inner.resolve_at(index) {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    async fn open_for_sensor(&self, sensor_id: SensorId) -> Result<Vec<Alert>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .alerts
            .iter()
            .filter(|a| a.sensor_id == Some(sensor_id) && !a.is_resolved)
            .cloned()
            .collect())
    }

    async fn list_for_greenhouse(
        &self,
        greenhouse_id: GreenhouseId,
        resolved: Option<bool>,
    ) -> Result<Vec<Alert>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .alerts
            .iter()
            .rev()
            .filter(|a| a.greenhouse_id == greenhouse_id)
            .filter(|a| resolved.is_none_or(|r| a.is_resolved == r))
            .cloned()
            .collect())
    }

    async fn resolve_by_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let targets: Vec<usize> = inner
            .alerts
            .iter()
            .enumerate()
            .filter(|(_, a)| ids.contains(&a.id))
            .map(|(i, _)| i)
            .collect();

        let mut resolved = 0;
        for index in targets {
            if inner.resolve_at(index) {
                resolved += 1;
            }
        }
        Ok(resolved)
    }
}
