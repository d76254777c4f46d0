//! Per-reading alert decisions.
//!
//! Evaluation is pure: it reads the threshold table and the reading and
//! returns the store mutations to perform plus the live-update envelope.
//! Applying the intents is the pipeline's job.

use std::sync::Arc;

use crate::alerts::store::{NewAlert, Severity};
use crate::alerts::thresholds::ThresholdTable;
use crate::live::envelope::UpdateEnvelope;
use crate::reading::{MalformedReading, Reading, SensorId};

/// Severity assigned to alerts raised by threshold rules.
pub const THRESHOLD_ALERT_SEVERITY: Severity = Severity::Critical;

#[derive(Debug, Clone, PartialEq)]
pub enum AlertIntent {
    /// Open the alert unless one with the same key is already open.
    EnsureOpen(NewAlert),
    /// Resolve every open alert of the sensor, whichever rule raised it.
    ResolveAllForSensor { sensor_id: SensorId },
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub intents: Vec<AlertIntent>,
    pub envelope: UpdateEnvelope,
    /// Set when the reading failed validation and was not evaluated.
    pub rejected: Option<MalformedReading>,
}

#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    table: Arc<ThresholdTable>,
}

impl AlertEvaluator {
    pub fn new(table: Arc<ThresholdTable>) -> Self {
        Self { table }
    }

    /// Evaluate one reading.
    ///
    /// - Kinds without rules produce no intents.
    /// - Every satisfied rule produces an `EnsureOpen` for its rendered message.
    /// - When rules exist but none is satisfied, the sensor's open alerts are
    ///   all resolved.
    ///
    /// The envelope is built in every case, including rejected readings.
    #[must_use]
    pub fn evaluate(&self, reading: &Reading) -> Evaluation {
        let envelope = UpdateEnvelope::from_reading(reading);

        if let Err(err) = reading.validate() {
            return Evaluation {
                intents: Vec::new(),
                envelope,
                rejected: Some(err),
            };
        }

        let rules = self.table.lookup(&reading.sensor_kind);
        if rules.is_empty() {
            tracing::debug!(
                sensor_id = reading.sensor_id,
                sensor_kind = %reading.sensor_kind,
                "No threshold rules for sensor kind"
            );
            return Evaluation {
                intents: Vec::new(),
                envelope,
                rejected: None,
            };
        }

        let intents: Vec<AlertIntent> = rules
            .iter()
            .filter(|rule| rule.is_met(reading.value))
            .map(|rule| {
                AlertIntent::EnsureOpen(NewAlert {
                    greenhouse_id: reading.greenhouse_id,
                    sensor_id: Some(reading.sensor_id),
                    message: rule.render_message(reading.value),
                    severity: THRESHOLD_ALERT_SEVERITY,
                })
            })
            .collect();

        let intents = if intents.is_empty() {
            vec![AlertIntent::ResolveAllForSensor {
                sensor_id: reading.sensor_id,
            }]
        } else {
            intents
        };

        tracing::debug!(
            sensor_id = reading.sensor_id,
            sensor_kind = %reading.sensor_kind,
            value = reading.value,
            intents = intents.len(),
            "Reading evaluated"
        );

        Evaluation {
            intents,
            envelope,
            rejected: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::thresholds::{Condition, ThresholdRule};
    use chrono::Utc;

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(Arc::new(ThresholdTable::builtin()))
    }

    fn reading(kind: &str, value: f64) -> Reading {
        Reading {
            sensor_id: 3,
            sensor_kind: kind.to_string(),
            sensor_name: "Capteur".to_string(),
            greenhouse_id: 7,
            value,
            observed_at: Utc::now(),
        }
    }

    fn opened_messages(evaluation: &Evaluation) -> Vec<&str> {
        evaluation
            .intents
            .iter()
            .filter_map(|i| match i {
                AlertIntent::EnsureOpen(a) => Some(a.message.as_str()),
                AlertIntent::ResolveAllForSensor { .. } => None,
            })
            .collect()
    }

    #[test]
    fn high_temperature_opens_critical_alert() {
        let evaluation = evaluator().evaluate(&reading("TEMP", 35.0));

        assert_eq!(
            evaluation.intents,
            vec![AlertIntent::EnsureOpen(NewAlert {
                greenhouse_id: 7,
                sensor_id: Some(3),
                message: "TEMP High Temperature Alert: Temperature is 35.0°C".to_string(),
                severity: Severity::Critical,
            })]
        );
        assert_eq!(evaluation.envelope.message.latest_reading.value, 35.0);
        assert!(evaluation.rejected.is_none());
    }

    #[test]
    fn normal_value_resolves_sensor() {
        let evaluation = evaluator().evaluate(&reading("TEMP", 22.0));
        assert_eq!(
            evaluation.intents,
            vec![AlertIntent::ResolveAllForSensor { sensor_id: 3 }]
        );
    }

    #[test]
    fn unconfigured_kinds_are_neutral() {
        for kind in ["SOIL_MOIST", "WATER_LVL", "NOT_A_KIND"] {
            let evaluation = evaluator().evaluate(&reading(kind, 1.0e6));
            assert!(evaluation.intents.is_empty(), "{kind}");
            assert_eq!(evaluation.envelope.message.sensor_type, kind);
        }
    }

    #[test]
    fn overlapping_rules_open_one_alert_each() {
        let table = ThresholdTable::new([
            ThresholdRule::new("TEMP", Condition::GreaterThan, 10.0, "above {{ value }}"),
            ThresholdRule::new("TEMP", Condition::LessThan, 40.0, "below {{ value }}"),
        ]);
        let evaluation = AlertEvaluator::new(Arc::new(table)).evaluate(&reading("TEMP", 20.0));

        assert_eq!(
            opened_messages(&evaluation),
            ["TEMP above 20.0", "TEMP below 20.0"]
        );
    }

    #[test]
    fn malformed_reading_still_yields_envelope() {
        let evaluation = evaluator().evaluate(&reading("", 35.0));

        assert!(evaluation.intents.is_empty());
        assert_eq!(evaluation.rejected, Some(MalformedReading::MissingKind(3)));
        assert_eq!(evaluation.envelope.greenhouse_id, 7);
    }
}
