//! Static threshold rules keyed by sensor kind.
//!
//! The table is built once at startup, either from the built-in defaults or
//! from a JSON file (`THRESHOLDS_FILE`), and is read-only afterwards. Rules
//! for one kind keep the order they were configured in so that messages are
//! produced deterministically.
//!
//! File format:
//!
//! ```text
//! [
//!   {"sensor_kind": "TEMP", "condition": "greater_than", "threshold": 30.0,
//!    "message": "High Temperature Alert: Temperature is {{ value }}°C"}
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Placeholder substituted with the observed value in message templates.
pub const VALUE_PLACEHOLDER: &str = "{{ value }}";

/// Width of the `alerts.message` column.
pub const MAX_MESSAGE_CHARS: usize = 255;

/// Widest string [`format_value`] returns (`-2.2250738585072014e-308`).
const MAX_VALUE_CHARS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    GreaterThan,
    LessThan,
}

impl Condition {
    #[must_use]
    pub fn is_met(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub sensor_kind: String,
    pub condition: Condition,
    pub threshold: f64,
    #[serde(rename = "message")]
    pub message_template: String,
}

impl ThresholdRule {
    pub fn new(
        sensor_kind: impl Into<String>,
        condition: Condition,
        threshold: f64,
        message_template: impl Into<String>,
    ) -> Self {
        Self {
            sensor_kind: sensor_kind.into(),
            condition,
            threshold,
            message_template: message_template.into(),
        }
    }

    #[must_use]
    pub fn is_met(&self, value: f64) -> bool {
        self.condition.is_met(value, self.threshold)
    }

    /// Alert message for `value`: the sensor kind, a space, then the template
    /// with every placeholder replaced by the formatted value.
    #[must_use]
    pub fn render_message(&self, value: f64) -> String {
        let body = self
            .message_template
            .replace(VALUE_PLACEHOLDER, &format_value(value));
        format!("{} {}", self.sensor_kind, body)
    }

    /// Upper bound on the length, in characters, of any rendered message.
    #[must_use]
    pub fn max_message_chars(&self) -> usize {
        let placeholders = self.message_template.matches(VALUE_PLACEHOLDER).count();
        let fixed = self.message_template.chars().count()
            - placeholders * VALUE_PLACEHOLDER.chars().count();

        self.sensor_kind.chars().count() + 1 + fixed + placeholders * MAX_VALUE_CHARS
    }
}

/// Render a reading value for alert messages. Whole numbers keep one
/// fractional digit (`35.0`, not `35`) and exponents carry a sign and at
/// least two digits (`1e+16`, `1e-07`), as stored messages always have.
#[must_use]
pub fn format_value(value: f64) -> String {
    let shortest = format!("{value:?}");
    let Some((mantissa, exponent)) = shortest.split_once('e') else {
        return shortest;
    };

    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

#[derive(Debug, thiserror::Error)]
pub enum ThresholdError {
    #[error("Failed to read threshold file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid threshold file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid threshold rule: {0}")]
    InvalidRule(String),
}

/// Sensor kind → ordered rules.
#[derive(Debug, Clone, Default)]
pub struct ThresholdTable {
    rules: HashMap<String, Vec<ThresholdRule>>,
}

impl ThresholdTable {
    pub fn new(rules: impl IntoIterator<Item = ThresholdRule>) -> Self {
        let mut table = Self::default();
        for rule in rules {
            table
                .rules
                .entry(rule.sensor_kind.clone())
                .or_default()
                .push(rule);
        }
        table
    }

    /// The greenhouse defaults. Soil moisture, soil temperature, water level
    /// and solar voltage sensors have no rules.
    #[must_use]
    pub fn builtin() -> Self {
        use Condition::{GreaterThan, LessThan};

        Self::new([
            ThresholdRule::new(
                "TEMP",
                GreaterThan,
                30.0,
                "High Temperature Alert: Temperature is {{ value }}°C",
            ),
            ThresholdRule::new(
                "TEMP",
                LessThan,
                10.0,
                "Low Temperature Alert: Temperature is {{ value }}°C",
            ),
            ThresholdRule::new(
                "AIR_HUM",
                GreaterThan,
                80.0,
                "High Humidity Alert: Humidity is {{ value }}%",
            ),
            ThresholdRule::new(
                "AIR_HUM",
                LessThan,
                30.0,
                "Low Humidity Alert: Humidity is {{ value }}%",
            ),
            ThresholdRule::new(
                "CO2",
                GreaterThan,
                1000.0,
                "High CO2 Level Alert: CO2 is {{ value }} ppm",
            ),
            ThresholdRule::new(
                "LIGHT",
                LessThan,
                200.0,
                "Low Light Level Alert: Light is {{ value }} lux",
            ),
        ])
    }

    /// Parse a JSON rule array.
    ///
    /// # Errors
    ///
    /// Returns `ThresholdError::Parse` on malformed JSON and
    /// `ThresholdError::InvalidRule` for an empty kind, a non-finite threshold
    /// or a template whose messages may not fit in [`MAX_MESSAGE_CHARS`].
    pub fn from_json(json: &str) -> Result<Self, ThresholdError> {
        let rules: Vec<ThresholdRule> = serde_json::from_str(json)?;

        for rule in &rules {
            if rule.sensor_kind.trim().is_empty() {
                return Err(ThresholdError::InvalidRule(
                    "sensor_kind must not be empty".to_string(),
                ));
            }
            if !rule.threshold.is_finite() {
                return Err(ThresholdError::InvalidRule(format!(
                    "{} {} threshold must be finite",
                    rule.sensor_kind,
                    rule.condition.as_str()
                )));
            }
            if rule.max_message_chars() > MAX_MESSAGE_CHARS {
                return Err(ThresholdError::InvalidRule(format!(
                    "{} {} message may exceed {MAX_MESSAGE_CHARS} characters",
                    rule.sensor_kind,
                    rule.condition.as_str()
                )));
            }
        }

        Ok(Self::new(rules))
    }

    /// Load the table from `path`, or fall back to [`ThresholdTable::builtin`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ThresholdError> {
        let Some(path) = path else {
            return Ok(Self::builtin());
        };

        let json = std::fs::read_to_string(path).map_err(|source| ThresholdError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Rules for `sensor_kind` in configuration order; empty when unconfigured.
    #[must_use]
    pub fn lookup(&self, sensor_kind: &str) -> &[ThresholdRule] {
        self.rules
            .get(sensor_kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }
}
