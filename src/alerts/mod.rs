//! Threshold alerting: rule table, per-reading evaluation and the alert store.

pub mod db_store;
pub mod evaluator;
pub mod store;
pub mod thresholds;

pub use db_store::SeaOrmAlertStore;
pub use evaluator::{AlertEvaluator, AlertIntent, Evaluation};
pub use store::{Alert, AlertStore, MemoryAlertStore, NewAlert, Severity, StoreError};
pub use thresholds::{Condition, ThresholdError, ThresholdRule, ThresholdTable};
