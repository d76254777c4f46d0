use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::reading::{GreenhouseId, Reading, SensorId};

/// Subscriber group of one greenhouse, rendered as `greenhouse_<id>`.
///
/// Only constructed from a numeric id, so two greenhouses can never share a
/// group name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey(GreenhouseId);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid greenhouse id '{0}': expected a positive integer")]
pub struct InvalidGroupId(pub String);

impl GroupKey {
    #[must_use]
    pub fn for_greenhouse(greenhouse_id: GreenhouseId) -> Self {
        Self(greenhouse_id)
    }

    /// Validate a greenhouse id taken from a URL segment. Only ASCII digits
    /// forming a positive `i64` are accepted; signs, whitespace and anything
    /// else are rejected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGroupId` carrying the raw segment.
    pub fn parse(raw: &str) -> Result<Self, InvalidGroupId> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidGroupId(raw.to_string()));
        }
        match raw.parse::<GreenhouseId>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(InvalidGroupId(raw.to_string())),
        }
    }

    #[must_use]
    pub fn greenhouse_id(self) -> GreenhouseId {
        self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "greenhouse_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    SensorDataUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReading {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorUpdate {
    pub sensor_id: SensorId,
    pub latest_reading: LatestReading,
    pub sensor_type: String,
    pub sensor_name: String,
}

/// The message pushed to subscribers for every reading.
///
/// Serializes as
/// `{"type": "sensor_data_update", "message": {"sensor_id", "latest_reading": {"value", "timestamp"}, "sensor_type", "sensor_name"}}`
/// with an RFC 3339 timestamp. The greenhouse id only routes the envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(skip)]
    pub greenhouse_id: GreenhouseId,
    pub message: SensorUpdate,
}

impl UpdateEnvelope {
    #[must_use]
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            kind: EnvelopeKind::SensorDataUpdate,
            greenhouse_id: reading.greenhouse_id,
            message: SensorUpdate {
                sensor_id: reading.sensor_id,
                latest_reading: LatestReading {
                    value: reading.value,
                    timestamp: reading.observed_at,
                },
                sensor_type: reading.sensor_kind.clone(),
                sensor_name: reading.sensor_name.clone(),
            },
        }
    }

    #[must_use]
    pub fn group(&self) -> GroupKey {
        GroupKey::for_greenhouse(self.greenhouse_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn group_key_format() {
        assert_eq!(GroupKey::for_greenhouse(7).to_string(), "greenhouse_7");
    }

    #[test]
    fn group_key_rejects_non_numeric_ids() {
        assert_eq!(GroupKey::parse("42"), Ok(GroupKey::for_greenhouse(42)));
        for raw in ["", "0", "-3", "+3", "7_8", "7 ", "abc", "99999999999999999999"] {
            assert!(GroupKey::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn envelope_wire_shape() {
        let reading = Reading {
            sensor_id: 12,
            sensor_kind: "TEMP".to_string(),
            sensor_name: "Capteur Température".to_string(),
            greenhouse_id: 7,
            value: 35.0,
            observed_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap(),
        };
        let envelope = UpdateEnvelope::from_reading(&reading);
        assert_eq!(envelope.group().to_string(), "greenhouse_7");

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "sensor_data_update",
                "message": {
                    "sensor_id": 12,
                    "latest_reading": {
                        "value": 35.0,
                        "timestamp": "2025-06-01T12:30:00Z"
                    },
                    "sensor_type": "TEMP",
                    "sensor_name": "Capteur Température"
                }
            })
        );
    }
}
