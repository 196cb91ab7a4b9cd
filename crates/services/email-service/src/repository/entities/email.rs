//! Email record entity for SeaORM.

use sea_orm::entity::prelude::*;
use sea_orm::Set;

use common::AppError;
use domain::{EmailNotification, EmailStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "emails")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub dedup_key: Uuid,
    pub user_id: Uuid,
    pub email_from: String,
    pub email_to: String,
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub text: String,
    pub sent_at: DateTimeUtc,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Convert database model to domain record
impl TryFrom<Model> for EmailNotification {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status: EmailStatus = model.status.parse()?;
        Ok(EmailNotification {
            id: model.id,
            dedup_key: model.dedup_key,
            user_id: model.user_id,
            email_from: model.email_from,
            email_to: model.email_to,
            subject: model.subject,
            text: model.text,
            sent_at: model.sent_at,
            status,
        })
    }
}

impl From<EmailNotification> for ActiveModel {
    fn from(record: EmailNotification) -> Self {
        ActiveModel {
            id: Set(record.id),
            dedup_key: Set(record.dedup_key),
            user_id: Set(record.user_id),
            email_from: Set(record.email_from),
            email_to: Set(record.email_to),
            subject: Set(record.subject),
            text: Set(record.text),
            sent_at: Set(record.sent_at),
            status: Set(record.status.as_str().to_string()),
        }
    }
}
