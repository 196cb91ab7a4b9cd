//! In-process email repository for single-process runs and tests.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use common::{AppResult, OptionExt};
use domain::{EmailNotification, EmailStatus};

use super::{EmailRepository, Inserted};

/// Records in insertion order; dedup check and insert share one write lock.
#[derive(Default)]
pub struct MemoryEmailStore {
    records: RwLock<Vec<EmailNotification>>,
}

impl MemoryEmailStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<EmailNotification>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EmailNotification>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn select(&self, filter: impl Fn(&EmailNotification) -> bool) -> Vec<EmailNotification> {
        let mut records: Vec<_> = self.read().iter().filter(|r| filter(r)).cloned().collect();
        records.sort_by_key(|r| r.sent_at);
        records
    }
}

#[async_trait]
impl EmailRepository for MemoryEmailStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EmailNotification>> {
        Ok(self.read().iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_dedup_key(&self, key: Uuid) -> AppResult<Option<EmailNotification>> {
        Ok(self.read().iter().find(|r| r.dedup_key == key).cloned())
    }

    async fn insert(&self, record: EmailNotification) -> AppResult<Inserted> {
        let mut records = self.write();
        if records.iter().any(|r| r.dedup_key == record.dedup_key) {
            return Ok(Inserted::Duplicate);
        }
        records.push(record.clone());
        Ok(Inserted::Created(record))
    }

    async fn set_status(&self, id: Uuid, status: EmailStatus) -> AppResult<()> {
        let mut records = self.write();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_not_found("Email")?;
        record.status = status;
        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<EmailNotification>> {
        Ok(self.select(|_| true))
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<EmailNotification>> {
        Ok(self.select(|r| r.user_id == user_id))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
