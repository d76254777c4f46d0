use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, Statement, Value,
};
use uuid::Uuid;

use crate::alerts::store::{Alert, AlertStore, NewAlert, StoreError};
use crate::entity::alerts;
use crate::reading::{GreenhouseId, SensorId};

/// Insert-if-absent against the partial unique index `alerts_open_key_idx`.
/// Returns the row only when this statement created it.
const UPSERT_OPEN_SQL: &str = r"
INSERT INTO alerts (id, greenhouse_id, sensor_id, message, severity, is_resolved, created_at)
VALUES ($1, $2, $3, $4, $5, FALSE, NOW())
ON CONFLICT (greenhouse_id, message) WHERE NOT is_resolved DO NOTHING
RETURNING id, greenhouse_id, sensor_id, message, severity, is_resolved, created_at
";

/// Postgres-backed alert store.
#[derive(Debug, Clone)]
pub struct SeaOrmAlertStore {
    db: DatabaseConnection,
}

impl SeaOrmAlertStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl TryFrom<alerts::Model> for Alert {
    type Error = StoreError;

    fn try_from(model: alerts::Model) -> Result<Self, Self::Error> {
        let severity = model
            .severity
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("alert {}: {e}", model.id)))?;

        Ok(Self {
            id: model.id,
            greenhouse_id: model.greenhouse_id,
            sensor_id: model.sensor_id,
            message: model.message,
            severity,
            is_resolved: model.is_resolved,
            created_at: model.created_at.with_timezone(&Utc),
        })
    }
}

fn into_alerts(models: Vec<alerts::Model>) -> Result<Vec<Alert>, StoreError> {
    models.into_iter().map(Alert::try_from).collect()
}

#[async_trait]
impl AlertStore for SeaOrmAlertStore {
    async fn ensure_open(&self, alert: NewAlert) -> Result<(Alert, bool), StoreError> {
        let values: Vec<Value> = vec![
            Uuid::new_v4().into(),
            alert.greenhouse_id.into(),
            alert.sensor_id.into(),
            alert.message.clone().into(),
            alert.severity.as_str().into(),
        ];

        let inserted = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                UPSERT_OPEN_SQL,
                values,
            ))
            .await?;

        if let Some(row) = inserted {
            let model = alerts::Model::from_query_result(&row, "")?;
            return Ok((model.try_into()?, true));
        }

        // Lost the insert to an open alert with the same key; return it.
        let existing = alerts::Entity::find()
            .filter(alerts::Column::GreenhouseId.eq(alert.greenhouse_id))
            .filter(alerts::Column::Message.eq(alert.message.as_str()))
            .filter(alerts::Column::IsResolved.eq(false))
            .one(&self.db)
            .await?;

        match existing {
            Some(model) => Ok((model.try_into()?, false)),
            // Resolved between the two statements; the caller retries.
            None => Err(StoreError::Conflict {
                greenhouse_id: alert.greenhouse_id,
                message: alert.message,
            }),
        }
    }

    async fn resolve_all_open_for_sensor(&self, sensor_id: SensorId) -> Result<u64, StoreError> {
        let result = alerts::Entity::update_many()
            .col_expr(alerts::Column::IsResolved, Expr::value(true))
            .filter(alerts::Column::SensorId.eq(sensor_id))
            .filter(alerts::Column::IsResolved.eq(false))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn open_for_sensor(&self, sensor_id: SensorId) -> Result<Vec<Alert>, StoreError> {
        let models = alerts::Entity::find()
            .filter(alerts::Column::SensorId.eq(sensor_id))
            .filter(alerts::Column::IsResolved.eq(false))
            .order_by_desc(alerts::Column::CreatedAt)
            .all(&self.db)
            .await?;

        into_alerts(models)
    }

    async fn list_for_greenhouse(
        &self,
        greenhouse_id: GreenhouseId,
        resolved: Option<bool>,
    ) -> Result<Vec<Alert>, StoreError> {
        let mut query = alerts::Entity::find().filter(alerts::Column::GreenhouseId.eq(greenhouse_id));

        if let Some(resolved) = resolved {
            query = query.filter(alerts::Column::IsResolved.eq(resolved));
        }

        let models = query
            .order_by_desc(alerts::Column::CreatedAt)
            .all(&self.db)
            .await?;

        into_alerts(models)
    }

    async fn resolve_by_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = alerts::Entity::update_many()
            .col_expr(alerts::Column::IsResolved, Expr::value(true))
            .filter(alerts::Column::Id.is_in(ids.iter().copied()))
            .filter(alerts::Column::IsResolved.eq(false))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
