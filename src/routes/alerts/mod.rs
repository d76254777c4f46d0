mod handlers;
mod types;

pub use handlers::{list_greenhouse_alerts, resolve_alerts};
pub use types::{AlertResponse, AlertsQuery, ResolveAlertsRequest, ResolveAlertsResponse};

// Re-export utoipa path structs for OpenAPI documentation
pub use handlers::{__path_list_greenhouse_alerts, __path_resolve_alerts};
