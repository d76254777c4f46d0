use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::alerts::{Alert, Severity};

/// Alert as exposed to dashboards
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: Uuid,
    pub sensor_id: Option<i64>,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub is_resolved: bool,
}

impl From<Alert> for AlertResponse {
    fn from(alert: Alert) -> Self {
        Self {
            id: alert.id,
            sensor_id: alert.sensor_id,
            message: alert.message,
            severity: alert.severity,
            created_at: alert.created_at,
            is_resolved: alert.is_resolved,
        }
    }
}

/// Query parameters for listing alerts
#[derive(Debug, Deserialize, IntoParams)]
pub struct AlertsQuery {
    /// Filter by resolution state; omit for all alerts
    pub resolved: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveAlertsRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveAlertsResponse {
    /// Alerts that changed from open to resolved
    pub resolved: u64,
}
