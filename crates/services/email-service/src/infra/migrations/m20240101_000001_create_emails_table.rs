//! Migration: Create emails table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Emails::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Emails::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Emails::DedupKey).uuid().not_null())
                    .col(ColumnDef::new(Emails::UserId).uuid().not_null())
                    .col(ColumnDef::new(Emails::EmailFrom).string().not_null())
                    .col(ColumnDef::new(Emails::EmailTo).string().not_null())
                    .col(ColumnDef::new(Emails::Subject).string().not_null())
                    .col(ColumnDef::new(Emails::Text).text().not_null())
                    .col(
                        ColumnDef::new(Emails::SentAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Emails::Status).string_len(16).not_null())
                    .to_owned(),
            )
            .await?;

        // One record per logical message, however often it is redelivered
        manager
            .create_index(
                Index::create()
                    .name("idx_emails_dedup_key_unique")
                    .table(Emails::Table)
                    .col(Emails::DedupKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_emails_user_id")
                    .table(Emails::Table)
                    .col(Emails::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Emails::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Emails {
    Table,
    Id,
    DedupKey,
    UserId,
    EmailFrom,
    EmailTo,
    Subject,
    Text,
    SentAt,
    Status,
}
