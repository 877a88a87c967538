use super::keys;
use crate::ephemeral::{EphemeralStore, StoreError};
use async_trait::async_trait;
use domain::booth::{BoothError, WaitlistRepository};
use domain::value::UserId;
use std::sync::Arc;

/// `waitlist` 列表键上的等待队列仓储
#[derive(Clone)]
pub struct EphemeralWaitlist {
    store: Arc<dyn EphemeralStore>,
}

impl EphemeralWaitlist {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store }
    }
}

fn store_err(err: StoreError) -> BoothError {
    BoothError::StoreErr(err.to_string())
}

#[async_trait]
impl WaitlistRepository for EphemeralWaitlist {
    async fn snapshot(&self) -> Result<Vec<UserId>, BoothError> {
        Ok(self
            .store
            .lrange(keys::WAITLIST, 0, -1)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(UserId::from)
            .collect())
    }

    async fn head(&self) -> Result<Option<UserId>, BoothError> {
        Ok(self
            .store
            .lindex(keys::WAITLIST, 0)
            .await
            .map_err(store_err)?
            .map(UserId::from))
    }

    async fn push_tail(&self, user: &UserId) -> Result<(), BoothError> {
        self.store
            .rpush(keys::WAITLIST, user.as_str())
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn pop_head(&self) -> Result<Option<UserId>, BoothError> {
        Ok(self
            .store
            .lpop(keys::WAITLIST)
            .await
            .map_err(store_err)?
            .map(UserId::from))
    }

    async fn contains(&self, user: &UserId) -> Result<bool, BoothError> {
        Ok(self
            .store
            .lrange(keys::WAITLIST, 0, -1)
            .await
            .map_err(store_err)?
            .iter()
            .any(|member| member == user.as_str()))
    }

    async fn remove(&self, user: &UserId) -> Result<bool, BoothError> {
        let removed = self
            .store
            .lrem(keys::WAITLIST, user.as_str())
            .await
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> Result<(), BoothError> {
        self.store.del(keys::WAITLIST).await.map_err(store_err)
    }
}
