//! Sensor metadata lookup for the ingest path.
//!
//! Every reading needs its sensor's kind, name and greenhouse. Those change
//! rarely, so they are cached with a TTL and evicted explicitly when a sensor
//! is deleted.

use moka::future::Cache;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::time::Duration;

use crate::config::Config;
use crate::entity::sensors;
use crate::error::AppResult;
use crate::reading::{GreenhouseId, SensorId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub id: SensorId,
    pub greenhouse_id: GreenhouseId,
    pub kind: String,
    pub name: String,
    /// Cleared while the sensor is being deleted; inactive sensors take no readings.
    pub is_active: bool,
}

impl From<sensors::Model> for SensorInfo {
    fn from(model: sensors::Model) -> Self {
        Self {
            id: model.id,
            greenhouse_id: model.greenhouse_id,
            kind: model.sensor_type,
            name: model.name,
            is_active: model.is_active,
        }
    }
}

pub type SensorCache = Cache<SensorId, SensorInfo>;

#[must_use]
pub fn build_cache(config: &Config) -> SensorCache {
    Cache::builder()
        .max_capacity(config.sensor_cache_max_entries)
        .time_to_live(Duration::from_secs(config.sensor_cache_ttl_seconds))
        .build()
}

/// Fetch sensor metadata, from cache when possible.
///
/// # Errors
///
/// Returns a database error if the lookup query fails.
pub async fn lookup(
    db: &DatabaseConnection,
    cache: &SensorCache,
    sensor_id: SensorId,
) -> AppResult<Option<SensorInfo>> {
    if let Some(info) = cache.get(&sensor_id).await {
        tracing::trace!(sensor_id, "sensor_cache_hit");
        return Ok(Some(info));
    }

    let Some(model) = sensors::Entity::find_by_id(sensor_id).one(db).await? else {
        return Ok(None);
    };

    let info = SensorInfo::from(model);
    cache.insert(sensor_id, info.clone()).await;
    tracing::debug!(sensor_id, "sensor_cache_stored");
    Ok(Some(info))
}

pub async fn invalidate(cache: &SensorCache, sensor_id: SensorId) {
    cache.invalidate(&sensor_id).await;
    tracing::debug!(sensor_id, "sensor_cache_invalidated");
}
