//! User repository: trait and SeaORM implementation.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, Statement, TransactionTrait,
};
use uuid::Uuid;

use super::entities::user::{self, ActiveModel, Entity as UserEntity};
use common::{AppError, AppResult, OptionExt};
use domain::{User, UserDetails};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User repository trait for dependency injection.
///
/// Emails are expected in normalized form. Writes that would give two
/// users the same email fail with `AppError::DuplicateEmail`, however
/// many callers race on the same address.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by ID
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Find user by email address
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// All users in creation order
    async fn list(&self) -> AppResult<Vec<User>>;

    /// Persist a new user
    async fn insert(&self, user: User) -> AppResult<User>;

    /// Replace name and email of an existing user
    async fn update(&self, id: Uuid, details: UserDetails) -> AppResult<User>;

    /// Remove a user
    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Check store connectivity
    async fn ping(&self) -> AppResult<()>;
}

/// Postgres-backed user repository
pub struct UserStore {
    db: DatabaseConnection,
}

impl UserStore {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Map a failed write, turning unique-index violations into `DuplicateEmail`
fn write_error(err: DbErr, email: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::duplicate_email(email),
        _ => AppError::from(err),
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let result = UserEntity::find_by_id(id).one(&self.db).await?;
        Ok(result.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let result = UserEntity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?;

        Ok(result.map(User::from))
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let models = UserEntity::find()
            .order_by_asc(user::Column::CreatedAt)
            .order_by_asc(user::Column::Id)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(User::from).collect())
    }

    async fn insert(&self, user: User) -> AppResult<User> {
        let email = user.email.clone();
        let model = ActiveModel::from(user)
            .insert(&self.db)
            .await
            .map_err(|e| write_error(e, &email))?;

        Ok(User::from(model))
    }

    async fn update(&self, id: Uuid, details: UserDetails) -> AppResult<User> {
        let txn = self.db.begin().await?;

        let existing = UserEntity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_not_found("User")?;

        let mut user = User::from(existing.clone());
        if user.changes_email(&details) {
            let taken = UserEntity::find()
                .filter(user::Column::Email.eq(details.email.as_str()))
                .filter(user::Column::Id.ne(id))
                .one(&txn)
                .await?;
            if taken.is_some() {
                return Err(AppError::duplicate_email(details.email));
            }
        }

        user.apply(details);
        let mut active: ActiveModel = existing.into();
        active.name = Set(user.name.clone());
        active.email = Set(user.email.clone());
        active.updated_at = Set(user.updated_at);

        let model = active
            .update(&txn)
            .await
            .map_err(|e| write_error(e, &user.email))?;
        txn.commit().await?;

        Ok(User::from(model))
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let txn = self.db.begin().await?;

        let result = UserEntity::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(AppError::not_found("User"));
        }

        txn.commit().await?;
        Ok(())
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
