use super::keys;
use crate::ephemeral::{EphemeralStore, StoreError};
use async_trait::async_trait;
use domain::booth::{AdvanceLease, AdvanceLock, BoothError};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// `booth:advancing` 键上的租约互斥锁
///
/// 每次抢占铸造一个随机令牌；续约和释放都先比较令牌，
/// 过期后被别人接管的锁不会被陈旧持有者碰到。
#[derive(Clone)]
pub struct EphemeralAdvanceLock {
    store: Arc<dyn EphemeralStore>,
}

impl EphemeralAdvanceLock {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store }
    }
}

fn store_err(err: StoreError) -> BoothError {
    BoothError::StoreErr(err.to_string())
}

#[async_trait]
impl AdvanceLock for EphemeralAdvanceLock {
    async fn acquire(&self, ttl: Duration) -> Result<Box<dyn AdvanceLease>, BoothError> {
        let token = Uuid::new_v4().simple().to_string();
        let acquired = self
            .store
            .set_nx_px(keys::ADVANCE_LOCK, &token, ttl)
            .await
            .map_err(store_err)?;
        if !acquired {
            return Err(BoothError::AdvanceInProgress);
        }
        Ok(Box::new(EphemeralLease {
            store: self.store.clone(),
            token,
        }))
    }
}

/// 一次成功抢占对应的租约
pub struct EphemeralLease {
    store: Arc<dyn EphemeralStore>,
    token: String,
}

#[async_trait]
impl AdvanceLease for EphemeralLease {
    async fn extend(&self, ttl: Duration) -> Result<(), BoothError> {
        let extended = self
            .store
            .pexpire_eq(keys::ADVANCE_LOCK, &self.token, ttl)
            .await
            .map_err(store_err)?;
        if extended {
            Ok(())
        } else {
            Err(BoothError::LeaseLost)
        }
    }

    async fn release(&self) -> Result<(), BoothError> {
        // 令牌不匹配说明锁已被接管，没什么可释放的
        self.store
            .del_eq(keys::ADVANCE_LOCK, &self.token)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    fn token(&self) -> &str {
        &self.token
    }
}
