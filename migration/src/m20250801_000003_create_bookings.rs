use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250801_000002_create_schedules::Schedules;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bookings::Table)
                    .if_not_exists()
                    .col(pk_auto(Bookings::Id))
                    .col(integer(Bookings::ScheduleId))
                    .col(integer(Bookings::Row))
                    .col(integer(Bookings::Seat))
                    .col(big_integer(Bookings::Timestamp))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bookings_schedule_id")
                            .from(Bookings::Table, Bookings::ScheduleId)
                            .to(Schedules::Table, Schedules::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bookings_seat_unique")
                    .table(Bookings::Table)
                    .col(Bookings::ScheduleId)
                    .col(Bookings::Row)
                    .col(Bookings::Seat)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Bookings::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Bookings {
    Table,
    Id,
    ScheduleId,
    Row,
    Seat,
    Timestamp,
}
