use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Alert rows. `severity` holds the `Severity` name (`INFO`, `WARNING`, `CRITICAL`).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub greenhouse_id: i64,
    pub sensor_id: Option<i64>,
    pub message: String,
    pub severity: String,
    pub is_resolved: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::greenhouses::Entity",
        from = "Column::GreenhouseId",
        to = "super::greenhouses::Column::Id"
    )]
    Greenhouse,
    #[sea_orm(
        belongs_to = "super::sensors::Entity",
        from = "Column::SensorId",
        to = "super::sensors::Column::Id"
    )]
    Sensor,
}

impl Related<super::greenhouses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Greenhouse.def()
    }
}

impl Related<super::sensors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sensor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
