//! Sensor readings as seen by the alert pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type GreenhouseId = i64;
pub type SensorId = i64;

/// One timestamped numeric observation, joined with the sensor metadata the
/// pipeline needs (kind, display name, owning greenhouse).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: SensorId,
    pub sensor_kind: String,
    pub sensor_name: String,
    pub greenhouse_id: GreenhouseId,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

/// A reading that breaks the upstream contract and cannot be evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedReading {
    #[error("reading for sensor {0} has no sensor kind")]
    MissingKind(SensorId),

    #[error("reading for sensor {sensor_id} has no greenhouse linkage (got {greenhouse_id})")]
    MissingGreenhouse {
        sensor_id: SensorId,
        greenhouse_id: GreenhouseId,
    },

    #[error("reading for sensor {sensor_id} has non-finite value {value}")]
    NonFiniteValue { sensor_id: SensorId, value: f64 },
}

impl Reading {
    /// Check the linkage invariants the persistence layer is expected to uphold.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), MalformedReading> {
        if self.sensor_kind.trim().is_empty() {
            return Err(MalformedReading::MissingKind(self.sensor_id));
        }
        if self.greenhouse_id <= 0 {
            return Err(MalformedReading::MissingGreenhouse {
                sensor_id: self.sensor_id,
                greenhouse_id: self.greenhouse_id,
            });
        }
        if !self.value.is_finite() {
            return Err(MalformedReading::NonFiniteValue {
                sensor_id: self.sensor_id,
                value: self.value,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(kind: &str, greenhouse_id: GreenhouseId, value: f64) -> Reading {
        Reading {
            sensor_id: 1,
            sensor_kind: kind.to_string(),
            sensor_name: "Capteur".to_string(),
            greenhouse_id,
            value,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn well_formed_reading_passes() {
        assert_eq!(reading("TEMP", 7, 21.5).validate(), Ok(()));
    }

    #[test]
    fn contract_violations_are_reported() {
        assert_eq!(
            reading(" ", 7, 21.5).validate(),
            Err(MalformedReading::MissingKind(1))
        );
        assert!(matches!(
            reading("TEMP", 0, 21.5).validate(),
            Err(MalformedReading::MissingGreenhouse { .. })
        ));
        assert!(matches!(
            reading("TEMP", 7, f64::NAN).validate(),
            Err(MalformedReading::NonFiniteValue { .. })
        ));
    }
}
