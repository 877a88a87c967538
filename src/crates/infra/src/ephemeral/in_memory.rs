use super::{EphemeralStore, StoreError, StoreOp};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// 键空间里的一个值
#[derive(Debug, Clone)]
enum Value {
    Str {
        value: String,
        /// 只有锁键带过期时间
        expires_at: Option<Instant>,
    },
    List(VecDeque<String>),
    Set(HashSet<String>),
}

/// 单进程内存版临时存储
///
/// 整个键空间在一把锁后面，`exec_multi` 的原子性不言自明。
/// 测试和单机运行使用；多实例部署换 redis 后端。
#[derive(Clone, Default)]
pub struct InMemoryEphemeralStore {
    keys: Arc<Mutex<HashMap<String, Value>>>,
    topics: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>>,
}

impl InMemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 读字符串键，顺手清掉已过期的
fn live_str(keys: &mut HashMap<String, Value>, key: &str) -> Option<String> {
    let (value, expired) = match keys.get(key) {
        Some(Value::Str { value, expires_at }) => (
            value.clone(),
            expires_at.map(|at| at <= Instant::now()).unwrap_or(false),
        ),
        _ => return None,
    };
    if expired {
        keys.remove(key);
        None
    } else {
        Some(value)
    }
}

fn apply_op(keys: &mut HashMap<String, Value>, op: StoreOp) {
    match op {
        StoreOp::Set { key, value } => {
            keys.insert(
                key,
                Value::Str {
                    value,
                    expires_at: None,
                },
            );
        }
        StoreOp::Del { key } => {
            keys.remove(&key);
        }
        StoreOp::SAdd { key, member } => {
            if let Value::Set(set) = keys
                .entry(key)
                .or_insert_with(|| Value::Set(HashSet::new()))
            {
                set.insert(member);
            }
        }
        StoreOp::SRem { key, member } => {
            if let Some(Value::Set(set)) = keys.get_mut(&key) {
                set.remove(&member);
                if set.is_empty() {
                    keys.remove(&key);
                }
            }
        }
        StoreOp::RPush { key, value } => {
            if let Value::List(list) = keys
                .entry(key)
                .or_insert_with(|| Value::List(VecDeque::new()))
            {
                list.push_back(value);
            }
        }
        StoreOp::LPop { key } => {
            if let Some(Value::List(list)) = keys.get_mut(&key) {
                list.pop_front();
                if list.is_empty() {
                    keys.remove(&key);
                }
            }
        }
    }
}

fn list_of<'a>(keys: &'a HashMap<String, Value>, key: &str) -> Option<&'a VecDeque<String>> {
    match keys.get(key) {
        Some(Value::List(list)) => Some(list),
        _ => None,
    }
}

#[async_trait]
impl EphemeralStore for InMemoryEphemeralStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(live_str(&mut self.keys.lock(), key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.keys.lock().insert(
            key.to_string(),
            Value::Str {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.keys.lock().remove(key);
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut keys = self.keys.lock();
        if let Some(Value::List(list)) = keys.get_mut(key) {
            let head = list.pop_front();
            if list.is_empty() {
                keys.remove(key);
            }
            Ok(head)
        } else {
            Ok(None)
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut keys = self.keys.lock();
        apply_op(
            &mut keys,
            StoreOp::RPush {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
        Ok(list_of(&keys, key).map(|list| list.len() as u64).unwrap_or(0))
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>, StoreError> {
        let keys = self.keys.lock();
        let Some(list) = list_of(&keys, key) else {
            return Ok(None);
        };
        let index = if index < 0 {
            let back = index.unsigned_abs() as usize;
            match list.len().checked_sub(back) {
                Some(i) => i,
                None => return Ok(None),
            }
        } else {
            index as usize
        };
        Ok(list.get(index).cloned())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let keys = self.keys.lock();
        let Some(list) = list_of(&keys, key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start >= len || stop < start {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn llen(&self, key: &str) -> Result<u64, StoreError> {
        let keys = self.keys.lock();
        Ok(list_of(&keys, key).map(|list| list.len() as u64).unwrap_or(0))
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut keys = self.keys.lock();
        if let Some(Value::List(list)) = keys.get_mut(key) {
            let before = list.len();
            list.retain(|item| item != value);
            let removed = (before - list.len()) as u64;
            if list.is_empty() {
                keys.remove(key);
            }
            Ok(removed)
        } else {
            Ok(0)
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut keys = self.keys.lock();
        if let Value::Set(set) = keys
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()))
        {
            Ok(set.insert(member.to_string()))
        } else {
            Err(StoreError::Command(format!(
                "WRONGTYPE key {} is not a set",
                key
            )))
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut keys = self.keys.lock();
        if let Some(Value::Set(set)) = keys.get_mut(key) {
            let removed = set.remove(member);
            if set.is_empty() {
                keys.remove(key);
            }
            Ok(removed)
        } else {
            Ok(false)
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let keys = self.keys.lock();
        match keys.get(key) {
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn exec_multi(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut keys = self.keys.lock();
        for op in ops {
            apply_op(&mut keys, op);
        }
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut keys = self.keys.lock();
        if live_str(&mut keys, key).is_some() {
            return Ok(false);
        }
        keys.insert(
            key.to_string(),
            Value::Str {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn pexpire_eq(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut keys = self.keys.lock();
        if live_str(&mut keys, key).as_deref() != Some(expected) {
            return Ok(false);
        }
        keys.insert(
            key.to_string(),
            Value::Str {
                value: expected.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn del_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut keys = self.keys.lock();
        if live_str(&mut keys, key).as_deref() != Some(expected) {
            return Ok(false);
        }
        keys.remove(key);
        Ok(true)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError> {
        let mut topics = self.topics.lock();
        if let Some(senders) = topics.get_mut(topic) {
            senders.retain(|sender| sender.send(payload.to_string()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<mpsc::UnboundedReceiver<String>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.lock().entry(topic.to_string()).or_default().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_ops_keep_order() {
        let store = InMemoryEphemeralStore::new();
        store.rpush("q", "a").await.unwrap();
        store.rpush("q", "b").await.unwrap();
        store.rpush("q", "c").await.unwrap();

        assert_eq!(store.lindex("q", 0).await.unwrap(), Some("a".to_string()));
        assert_eq!(store.lindex("q", -1).await.unwrap(), Some("c".to_string()));
        assert_eq!(
            store.lrange("q", 0, -1).await.unwrap(),
            vec!["a", "b", "c"]
        );
        assert_eq!(store.lpop("q").await.unwrap(), Some("a".to_string()));
        assert_eq!(store.llen("q").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn multi_applies_all_ops_atomically() {
        let store = InMemoryEphemeralStore::new();
        store.sadd("votes", "u1").await.unwrap();
        store
            .exec_multi(vec![
                StoreOp::Del {
                    key: "votes".to_string(),
                },
                StoreOp::Set {
                    key: "current".to_string(),
                    value: "h2".to_string(),
                },
            ])
            .await
            .unwrap();
        assert!(store.smembers("votes").await.unwrap().is_empty());
        assert_eq!(store.get("current").await.unwrap(), Some("h2".to_string()));
    }

    #[tokio::test]
    async fn nx_px_behaves_like_a_lease() {
        let store = InMemoryEphemeralStore::new();
        assert!(store
            .set_nx_px("lock", "t1", Duration::from_millis(20))
            .await
            .unwrap());
        // 已被占用
        assert!(!store
            .set_nx_px("lock", "t2", Duration::from_millis(20))
            .await
            .unwrap());
        // 令牌不匹配的续约与删除都不生效
        assert!(!store
            .pexpire_eq("lock", "t2", Duration::from_millis(20))
            .await
            .unwrap());
        assert!(!store.del_eq("lock", "t2").await.unwrap());
        assert!(store.del_eq("lock", "t1").await.unwrap());
        // 释放后可以再次抢占
        assert!(store
            .set_nx_px("lock", "t3", Duration::from_millis(20))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn expired_lease_is_gone() {
        let store = InMemoryEphemeralStore::new();
        assert!(store
            .set_nx_px("lock", "t1", Duration::from_millis(5))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(store.get("lock").await.unwrap(), None);
        assert!(store
            .set_nx_px("lock", "t2", Duration::from_millis(50))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let store = InMemoryEphemeralStore::new();
        let mut rx = store.subscribe("topic").await.unwrap();
        store.publish("topic", "hello").await.unwrap();
        assert_eq!(rx.recv().await, Some("hello".to_string()));
    }
}
