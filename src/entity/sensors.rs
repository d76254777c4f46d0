use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sensors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub greenhouse_id: i64,
    #[sea_orm(column_name = "type")]
    pub sensor_type: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::greenhouses::Entity",
        from = "Column::GreenhouseId",
        to = "super::greenhouses::Column::Id"
    )]
    Greenhouse,
    #[sea_orm(has_many = "super::sensor_data::Entity")]
    SensorData,
    #[sea_orm(has_many = "super::alerts::Entity")]
    Alerts,
}

impl Related<super::greenhouses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Greenhouse.def()
    }
}

impl Related<super::sensor_data::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SensorData.def()
    }
}

impl Related<super::alerts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alerts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
