use crate::history::VoteTally;
use crate::value::{HistoryEntryId, UserId};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// 点播台（booth）领域错误
#[derive(Error, Debug)]
pub enum BoothError {
    #[error("another advance is already in progress")]
    AdvanceInProgress,
    #[error("advance lease expired")]
    LeaseLost,
    #[error("active playlist is empty")]
    EmptyPlaylist,
    #[error("nothing is currently playing")]
    NothingPlaying,
    #[error("user is already in the waitlist: {0}")]
    AlreadyQueued(UserId),
    #[error("user is currently playing: {0}")]
    CurrentlyPlaying(UserId),
    #[error("user is not in the waitlist: {0}")]
    NotQueued(UserId),
    #[error("{0}")]
    StoreErr(String),
}

/// 对当前播放的投票方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    Down,
}

/// 当前播放状态仓储接口
///
/// 背后是临时存储里的 booth:* 键组。所有实例共享同一份状态；
/// 写入方必须持有 advance 租约（投票除外，见 `cast_vote`）。
#[async_trait]
pub trait BoothStateRepository: Send + Sync {
    /// 正在播放的历史条目 ID；None 表示房间空闲
    async fn current_history_id(&self) -> Result<Option<HistoryEntryId>, BoothError>;

    async fn current_dj(&self) -> Result<Option<UserId>, BoothError>;

    /// 读取当前三个投票集合
    async fn vote_tally(&self) -> Result<VoteTally, BoothError>;

    /// 进入新的播放：清空三个投票集合并写入 historyID/currentDJ，
    /// 整体原子。看到新 historyID 的观察者不会看到旧投票。
    async fn begin_play(&self, history_id: &HistoryEntryId, dj: &UserId) -> Result<(), BoothError>;

    /// 房间转空：原子清掉全部 booth 状态键
    async fn clear(&self) -> Result<(), BoothError>;

    /// 投票。换边时从另一个集合移除并加入目标集合，同一原子批次完成，
    /// 用户任一时刻只占据一边。
    async fn cast_vote(&self, user: &UserId, vote: Vote) -> Result<(), BoothError>;

    async fn add_favorite(&self, user: &UserId) -> Result<(), BoothError>;

    /// 栅栏检查：historyID 是否仍是调用方读到的那个
    async fn verify_current(&self, expected: Option<&HistoryEntryId>) -> Result<bool, BoothError>;
}

/// 等待队列仓储接口（队首 = 下一个 DJ）
#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    async fn snapshot(&self) -> Result<Vec<UserId>, BoothError>;

    async fn head(&self) -> Result<Option<UserId>, BoothError>;

    async fn push_tail(&self, user: &UserId) -> Result<(), BoothError>;

    async fn pop_head(&self) -> Result<Option<UserId>, BoothError>;

    /// 用户是否已在队列里
    async fn contains(&self, user: &UserId) -> Result<bool, BoothError>;

    /// 移除任意位置的用户；返回是否确实在队列里
    async fn remove(&self, user: &UserId) -> Result<bool, BoothError>;

    async fn clear(&self) -> Result<(), BoothError>;
}

/// advance 互斥锁
///
/// 基于临时存储的带 TTL 租约。临界区总是先加锁再重读状态，
/// 因此在竞争下是安全的。
#[async_trait]
pub trait AdvanceLock: Send + Sync {
    /// 抢占 advance 权；已被占用时返回 `AdvanceInProgress`
    async fn acquire(&self, ttl: Duration) -> Result<Box<dyn AdvanceLease>, BoothError>;
}

/// 一次成功抢占得到的租约，携带栅栏令牌
#[async_trait]
pub trait AdvanceLease: Send + Sync {
    /// 续约；令牌已不匹配时返回 `LeaseLost`
    async fn extend(&self, ttl: Duration) -> Result<(), BoothError>;

    /// 释放。失败无害，TTL 到期会自行清理。
    async fn release(&self) -> Result<(), BoothError>;

    fn token(&self) -> &str;
}
