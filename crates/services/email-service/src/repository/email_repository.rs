//! Email repository: trait and SeaORM implementation.

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, SqlErr, Statement,
};
use uuid::Uuid;

use super::entities::email::{self, ActiveModel, Entity as EmailEntity};
use common::{AppError, AppResult};
use domain::{EmailNotification, EmailStatus};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Outcome of a guarded insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted {
    /// The record was written
    Created(EmailNotification),
    /// A record with the same dedup key already exists
    Duplicate,
}

/// Email repository trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait EmailRepository: Send + Sync {
    /// Find record by ID
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EmailNotification>>;

    /// Find the record created for a logical message
    async fn find_by_dedup_key(&self, key: Uuid) -> AppResult<Option<EmailNotification>>;

    /// Insert unless a record with the same dedup key exists
    async fn insert(&self, record: EmailNotification) -> AppResult<Inserted>;

    /// Move a record to a new delivery status
    async fn set_status(&self, id: Uuid, status: EmailStatus) -> AppResult<()>;

    /// All records, oldest first
    async fn list(&self) -> AppResult<Vec<EmailNotification>>;

    /// Records addressed on behalf of one user, oldest first
    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<EmailNotification>>;

    /// Check store connectivity
    async fn ping(&self) -> AppResult<()>;
}

/// Postgres-backed email repository
pub struct EmailStore {
    db: DatabaseConnection,
}

impl EmailStore {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_records(models: Vec<email::Model>) -> AppResult<Vec<EmailNotification>> {
    models.into_iter().map(EmailNotification::try_from).collect()
}

#[async_trait]
impl EmailRepository for EmailStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EmailNotification>> {
        EmailEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(EmailNotification::try_from)
            .transpose()
    }

    async fn find_by_dedup_key(&self, key: Uuid) -> AppResult<Option<EmailNotification>> {
        EmailEntity::find()
            .filter(email::Column::DedupKey.eq(key))
            .one(&self.db)
            .await?
            .map(EmailNotification::try_from)
            .transpose()
    }

    async fn insert(&self, record: EmailNotification) -> AppResult<Inserted> {
        match ActiveModel::from(record).insert(&self.db).await {
            Ok(model) => Ok(Inserted::Created(EmailNotification::try_from(model)?)),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Ok(Inserted::Duplicate),
                _ => Err(AppError::from(e)),
            },
        }
    }

    async fn set_status(&self, id: Uuid, status: EmailStatus) -> AppResult<()> {
        let result = EmailEntity::update_many()
            .col_expr(email::Column::Status, Expr::value(status.as_str()))
            .filter(email::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::not_found("Email"));
        }
        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<EmailNotification>> {
        let models = EmailEntity::find()
            .order_by_asc(email::Column::SentAt)
            .all(&self.db)
            .await?;

        to_records(models)
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<EmailNotification>> {
        let models = EmailEntity::find()
            .filter(email::Column::UserId.eq(user_id))
            .order_by_asc(email::Column::SentAt)
            .all(&self.db)
            .await?;

        to_records(models)
    }

    async fn ping(&self) -> AppResult<()> {
        self.db
            .execute(Statement::from_string(
                self.db.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }
}
