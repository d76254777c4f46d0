use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== GREENHOUSES ==========
        manager
            .create_table(
                Table::create()
                    .table(Greenhouses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Greenhouses::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Greenhouses::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Greenhouses::Location).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Greenhouses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== SENSORS ==========
        manager
            .create_table(
                Table::create()
                    .table(Sensors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sensors::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sensors::GreenhouseId).big_integer().not_null())
                    .col(ColumnDef::new(Sensors::Type).string_len(15).not_null())
                    .col(ColumnDef::new(Sensors::Name).string_len(50).not_null())
                    .col(
                        ColumnDef::new(Sensors::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sensors_greenhouse")
                            .from(Sensors::Table, Sensors::GreenhouseId)
                            .to(Greenhouses::Table, Greenhouses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("sensors_greenhouse_idx")
                    .table(Sensors::Table)
                    .col(Sensors::GreenhouseId)
                    .to_owned(),
            )
            .await?;

        // ========== SENSOR DATA ==========
        manager
            .create_table(
                Table::create()
                    .table(SensorData::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SensorData::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SensorData::SensorId).big_integer().not_null())
                    .col(ColumnDef::new(SensorData::Value).double().not_null())
                    .col(
                        ColumnDef::new(SensorData::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(
                        ColumnDef::new(SensorData::Notes)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sensor_data_sensor")
                            .from(SensorData::Table, SensorData::SensorId)
                            .to(Sensors::Table, Sensors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX sensor_data_sensor_time_idx ON sensor_data (sensor_id, timestamp DESC)",
            )
            .await?;

        // ========== ALERTS ==========
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alerts::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Alerts::GreenhouseId).big_integer().not_null())
                    .col(ColumnDef::new(Alerts::SensorId).big_integer())
                    .col(ColumnDef::new(Alerts::Message).string_len(255).not_null())
                    .col(ColumnDef::new(Alerts::Severity).string_len(10).not_null())
                    .col(
                        ColumnDef::new(Alerts::IsResolved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_alerts_greenhouse")
                            .from(Alerts::Table, Alerts::GreenhouseId)
                            .to(Greenhouses::Table, Greenhouses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    // Alerts outlive their sensor; resolution happens before the delete.
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_alerts_sensor")
                            .from(Alerts::Table, Alerts::SensorId)
                            .to(Sensors::Table, Sensors::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one open alert per (greenhouse, message). The upsert in the
        // alert store targets this index with ON CONFLICT DO NOTHING.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX alerts_open_key_idx ON alerts (greenhouse_id, message) WHERE NOT is_resolved",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX alerts_open_sensor_idx ON alerts (sensor_id) WHERE NOT is_resolved",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX alerts_greenhouse_created_idx ON alerts (greenhouse_id, created_at DESC)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alerts::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SensorData::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sensors::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Greenhouses::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Greenhouses {
    Table,
    Id,
    Name,
    Location,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Sensors {
    Table,
    Id,
    GreenhouseId,
    Type,
    Name,
    IsActive,
}

#[derive(DeriveIden)]
enum SensorData {
    Table,
    Id,
    SensorId,
    Value,
    Timestamp,
    Notes,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    GreenhouseId,
    SensorId,
    Message,
    Severity,
    IsResolved,
    CreatedAt,
}
