//! User registrar - creates, reads, updates and deletes users, and emits
//! email notifications through the event channel.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use common::{AppError, AppResult, OptionExt};
use domain::{EmailMessage, User, UserDetails};
use messaging::EventChannel;

use crate::config::{NotificationPolicy, UserServiceConfig};
use crate::repository::UserRepository;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User service trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserService: Send + Sync {
    /// Register a new user.
    ///
    /// Fails with `DuplicateEmail` when the address is taken; under the
    /// default policy the owner of the address is notified.
    async fn create(&self, name: String, email: String) -> AppResult<User>;

    /// Get user by ID
    async fn get(&self, id: Uuid) -> AppResult<User>;

    /// All users in creation order
    async fn list(&self) -> AppResult<Vec<User>>;

    /// Replace name and email. The new email must not belong to another user.
    async fn update(&self, id: Uuid, name: String, email: String) -> AppResult<User>;

    /// Delete user by ID
    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

/// Registrar backed by a user repository and an event channel.
pub struct UserRegistrar {
    repo: Arc<dyn UserRepository>,
    channel: Arc<dyn EventChannel>,
    topic: String,
    sender: String,
    policy: NotificationPolicy,
}

impl UserRegistrar {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        channel: Arc<dyn EventChannel>,
        config: &UserServiceConfig,
    ) -> Self {
        Self {
            repo,
            channel,
            topic: config.channel.topic.clone(),
            sender: config.notification_sender.clone(),
            policy: config.notify_on,
        }
    }

    async fn publish(&self, message: EmailMessage) -> AppResult<()> {
        let payload = message.with_from(&self.sender).encode()?;
        let id = self.channel.publish(&self.topic, payload).await?;
        tracing::debug!(topic = %self.topic, message = %id, "Email notification published");
        Ok(())
    }

    /// Duplicate path: notify the address owner, then reject the attempt
    async fn reject_duplicate(&self, details: &UserDetails) -> AppResult<User> {
        tracing::info!(email = %details.email, "Registration rejected, email already registered");

        if self.policy == NotificationPolicy::OnDuplicate {
            let attempt_id = Uuid::new_v4();
            let message =
                EmailMessage::duplicate_registration(attempt_id, &details.name, &details.email);
            if let Err(e) = self.publish(message).await {
                tracing::error!(email = %details.email, error = %e, "Duplicate notification not published");
                return Err(e);
            }
        }

        Err(AppError::duplicate_email(details.email.clone()))
    }

    /// Create path under `OnCreate`: the user only stays if the welcome
    /// message was published
    async fn announce(&self, user: &User) -> AppResult<()> {
        let Err(e) = self.publish(EmailMessage::welcome(user)).await else {
            return Ok(());
        };

        tracing::error!(user_id = %user.id, error = %e, "Welcome notification not published, removing user");
        if let Err(cleanup) = self.repo.delete(user.id).await {
            tracing::error!(user_id = %user.id, error = %cleanup, "Failed to remove unannounced user");
        }

        if e.is_infrastructure() {
            Err(e)
        } else {
            Err(AppError::infrastructure("Event channel"))
        }
    }
}

#[async_trait]
impl UserService for UserRegistrar {
    async fn create(&self, name: String, email: String) -> AppResult<User> {
        let details = UserDetails::parse(&name, &email)?;

        if self.repo.find_by_email(&details.email).await?.is_some() {
            return self.reject_duplicate(&details).await;
        }

        // The store's unique index settles races between concurrent creates
        let user = match self.repo.insert(User::new(details.clone())).await {
            Ok(user) => user,
            Err(AppError::DuplicateEmail(_)) => return self.reject_duplicate(&details).await,
            Err(e) => return Err(e),
        };

        if self.policy == NotificationPolicy::OnCreate {
            self.announce(&user).await?;
        }

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> AppResult<User> {
        self.repo.find_by_id(id).await?.ok_or_not_found("User")
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        self.repo.list().await
    }

    async fn update(&self, id: Uuid, name: String, email: String) -> AppResult<User> {
        let details = UserDetails::parse(&name, &email)?;
        let user = self.repo.update(id, details).await?;
        tracing::info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.repo.delete(id).await?;
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }
}
