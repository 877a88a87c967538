use crate::command::booth::{AdvanceOptions, BoothService};
use crate::error::AppError;
use crate::event::broadcast::{self, BroadcastBus};
use domain::booth::{AdvanceLock, BoothError, BoothStateRepository, WaitlistRepository};
use domain::user::{UserError, UserRepository};
use domain::value::UserId;
use log::warn;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// 等待队列应用服务
///
/// 队列和 booth 状态一样只归 advance 锁的持有者改写，
/// 所以加入/离开也先抢租约，再动列表。
pub struct WaitlistService {
    waitlist: Arc<dyn WaitlistRepository>,
    booth_state: Arc<dyn BoothStateRepository>,
    advance_lock: Arc<dyn AdvanceLock>,
    users: Arc<dyn UserRepository>,
    bus: Arc<dyn BroadcastBus>,
    booth: BoothService,
    lock_ttl: Duration,
}

impl WaitlistService {
    pub fn new(
        waitlist: Arc<dyn WaitlistRepository>,
        booth_state: Arc<dyn BoothStateRepository>,
        advance_lock: Arc<dyn AdvanceLock>,
        users: Arc<dyn UserRepository>,
        bus: Arc<dyn BroadcastBus>,
        booth: BoothService,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            waitlist,
            booth_state,
            advance_lock,
            users,
            bus,
            booth,
            lock_ttl,
        }
    }

    /// 用户排到队尾。房间空闲时顺手开播。
    ///
    /// 拒绝重复排队和现任 DJ（现任 DJ 永远不该出现在队列里）。
    pub async fn join(&self, user_id: &UserId) -> Result<Vec<UserId>, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| UserError::UserNotFound(user_id.to_string()))?;

        let snapshot = {
            let lease = self.advance_lock.acquire(self.lock_ttl).await?;
            let result = self.join_locked(&user.id).await;
            if let Err(err) = lease.release().await {
                log::debug!("waitlist lease release failed: {}", err);
            }
            result?
        };
        self.publish_update(&snapshot).await;

        // 房间空着就直接开播
        if self.booth_state.current_history_id().await?.is_none() {
            match self.booth.advance(AdvanceOptions::default()).await {
                Ok(_) => {}
                Err(err) if err.is_advance_in_progress() => {}
                Err(err) => warn!("auto advance after join failed: {}", err),
            }
        }
        Ok(snapshot)
    }

    async fn join_locked(&self, user_id: &UserId) -> Result<Vec<UserId>, AppError> {
        if self.booth_state.current_dj().await?.as_ref() == Some(user_id) {
            return Err(BoothError::CurrentlyPlaying(user_id.clone()).into());
        }
        if self.waitlist.contains(user_id).await? {
            return Err(BoothError::AlreadyQueued(user_id.clone()).into());
        }
        self.waitlist.push_tail(user_id).await?;
        Ok(self.waitlist.snapshot().await?)
    }

    /// 离开队列
    pub async fn leave(&self, user_id: &UserId) -> Result<Vec<UserId>, AppError> {
        let snapshot = {
            let lease = self.advance_lock.acquire(self.lock_ttl).await?;
            let result = async {
                if !self.waitlist.remove(user_id).await? {
                    return Err(AppError::BoothError(BoothError::NotQueued(user_id.clone())));
                }
                Ok(self.waitlist.snapshot().await?)
            }
            .await;
            if let Err(err) = lease.release().await {
                log::debug!("waitlist lease release failed: {}", err);
            }
            result?
        };
        self.publish_update(&snapshot).await;
        Ok(snapshot)
    }

    /// 清空队列（管理操作）
    pub async fn clear(&self) -> Result<(), AppError> {
        let lease = self.advance_lock.acquire(self.lock_ttl).await?;
        let result = self.waitlist.clear().await;
        if let Err(err) = lease.release().await {
            log::debug!("waitlist lease release failed: {}", err);
        }
        result?;
        self.publish_update(&[]).await;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<Vec<UserId>, AppError> {
        Ok(self.waitlist.snapshot().await?)
    }

    async fn publish_update(&self, snapshot: &[UserId]) {
        let list: Vec<String> = snapshot.iter().map(|id| id.to_string()).collect();
        let payload = serde_json::to_value(list).unwrap_or(Value::Null);
        broadcast::publish_or_log(self.bus.as_ref(), broadcast::TOPIC_WAITLIST_UPDATE, payload)
            .await;
    }
}
