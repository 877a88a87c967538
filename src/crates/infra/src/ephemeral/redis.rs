use super::{EphemeralStore, StoreError, StoreOp};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tokio::sync::mpsc;

// GET 比较后再动键，配合租约令牌实现栅栏式续约/释放
const PEXPIRE_EQ: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('pexpire', KEYS[1], ARGV[2])
else
  return 0
end
"#;

const DEL_EQ: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('del', KEYS[1])
else
  return 0
end
"#;

/// redis 后端的临时存储
///
/// 多实例部署时的共享状态底座：MULTI/EXEC 承担原子批次，
/// SET NX PX 加 Lua 比较脚本承担租约，pub/sub 承担广播。
pub struct RedisEphemeralStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisEphemeralStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self { client, conn })
    }
}

fn store_err(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

#[async_trait]
impl EphemeralStore for RedisEphemeralStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(store_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await.map_err(store_err)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(store_err)?;
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.lpop(key, None).await.map_err(store_err)?;
        Ok(value)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.rpush(key, value).await.map_err(store_err)?;
        Ok(len)
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.lindex(key, index as isize).await.map_err(store_err)?;
        Ok(value)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn
            .lrange(key, start as isize, stop as isize)
            .await
            .map_err(store_err)?;
        Ok(values)
    }

    async fn llen(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(key).await.map_err(store_err)?;
        Ok(len)
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.lrem(key, 0, value).await.map_err(store_err)?;
        Ok(removed)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: bool = conn.sadd(key, member).await.map_err(store_err)?;
        Ok(added)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: bool = conn.srem(key, member).await.map_err(store_err)?;
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await.map_err(store_err)?;
        Ok(members)
    }

    async fn exec_multi(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                StoreOp::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                StoreOp::Del { key } => {
                    pipe.del(key).ignore();
                }
                StoreOp::SAdd { key, member } => {
                    pipe.sadd(key, member).ignore();
                }
                StoreOp::SRem { key, member } => {
                    pipe.srem(key, member).ignore();
                }
                StoreOp::RPush { key, value } => {
                    pipe.rpush(key, value).ignore();
                }
                StoreOp::LPop { key } => {
                    pipe.lpop(key, None).ignore();
                }
            }
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(store_err)?;
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(reply.is_some())
    }

    async fn pexpire_eq(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let hit: i64 = Script::new(PEXPIRE_EQ)
            .key(key)
            .arg(expected)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(hit == 1)
    }

    async fn del_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let hit: i64 = Script::new(DEL_EQ)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(hit == 1)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(topic, payload).await.map_err(store_err)?;
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<mpsc::UnboundedReceiver<String>, StoreError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(store_err)?;
        pubsub.subscribe(topic).await.map_err(store_err)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let Ok(payload) = message.get_payload::<String>() else {
                    continue;
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
