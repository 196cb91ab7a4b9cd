//! In-process user repository for single-process runs and tests.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use common::{AppError, AppResult, OptionExt};
use domain::{User, UserDetails};

use super::UserRepository;

/// Users kept in creation order behind one lock, so the uniqueness check
/// and the write happen atomically.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<User>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<User>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserRepository for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.read().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.read().iter().find(|u| u.email == email).cloned())
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        Ok(self.read().clone())
    }

    async fn insert(&self, user: User) -> AppResult<User> {
        let mut users = self.write();
        if users.iter().any(|u| u.email == user.email) {
            return Err(AppError::duplicate_email(user.email));
        }
        users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, details: UserDetails) -> AppResult<User> {
        let mut users = self.write();
        if users
            .iter()
            .any(|u| u.id != id && u.email == details.email)
        {
            return Err(AppError::duplicate_email(details.email));
        }

        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_not_found("User")?;
        user.apply(details);
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut users = self.write();
        let position = users
            .iter()
            .position(|u| u.id == id)
            .ok_or_not_found("User")?;
        users.remove(position);
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
