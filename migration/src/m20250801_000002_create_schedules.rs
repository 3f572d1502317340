use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250801_000001_create_catalog::{Movies, Rooms};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Schedules::Table)
                    .if_not_exists()
                    .col(pk_auto(Schedules::Id))
                    .col(integer(Schedules::RoomId))
                    .col(integer(Schedules::MovieId))
                    .col(string(Schedules::StartTime))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedules_room_id")
                            .from(Schedules::Table, Schedules::RoomId)
                            .to(Rooms::Table, Rooms::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedules_movie_id")
                            .from(Schedules::Table, Schedules::MovieId)
                            .to(Movies::Table, Movies::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // One showing per room per start time.
        manager
            .create_index(
                Index::create()
                    .name("idx_schedules_room_start_unique")
                    .table(Schedules::Table)
                    .col(Schedules::RoomId)
                    .col(Schedules::StartTime)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_schedules_movie_room")
                    .table(Schedules::Table)
                    .col(Schedules::MovieId)
                    .col(Schedules::RoomId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Schedules::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Schedules {
    Table,
    Id,
    RoomId,
    MovieId,
    StartTime,
}
