pub mod in_memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// 临时存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ephemeral store unavailable: {0}")]
    Unavailable(String),
    #[error("ephemeral store command failed: {0}")]
    Command(String),
}

/// 原子写批次里的单个操作
#[derive(Debug, Clone)]
pub enum StoreOp {
    Set { key: String, value: String },
    Del { key: String },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    RPush { key: String, value: String },
    LPop { key: String },
}

/// 临时存储客户端
///
/// 对远端 key/value + list + set 存储的薄封装：原子写批次、
/// 发布订阅、带 TTL 的比较原语（分布式锁用）。调度核心只依赖
/// 这个抽象面，任何提供这些语义的存储都可以接进来。
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError>;
    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>, StoreError>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;
    async fn llen(&self, key: &str) -> Result<u64, StoreError>;
    /// 移除列表中所有等于 value 的元素，返回移除个数
    async fn lrem(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// 原子执行一串写操作；观察者看不到中间状态
    async fn exec_multi(&self, ops: Vec<StoreOp>) -> Result<(), StoreError>;

    /// SET key value NX PX ttl；键不存在时写入并设过期，返回是否成功
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;
    /// 键的当前值等于 expected 时重置过期时间，返回是否命中
    async fn pexpire_eq(&self, key: &str, expected: &str, ttl: Duration)
        -> Result<bool, StoreError>;
    /// 键的当前值等于 expected 时删除，返回是否命中
    async fn del_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError>;
    async fn subscribe(&self, topic: &str)
        -> Result<mpsc::UnboundedReceiver<String>, StoreError>;
}
