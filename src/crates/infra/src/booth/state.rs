use super::keys;
use crate::ephemeral::{EphemeralStore, StoreOp};
use async_trait::async_trait;
use domain::booth::{BoothError, BoothStateRepository, Vote};
use domain::history::VoteTally;
use domain::value::{HistoryEntryId, UserId};
use std::sync::Arc;

/// booth:* 键组上的类型化状态仓储
#[derive(Clone)]
pub struct EphemeralBoothState {
    store: Arc<dyn EphemeralStore>,
}

impl EphemeralBoothState {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store }
    }

    async fn members(&self, key: &str) -> Result<Vec<UserId>, BoothError> {
        Ok(self
            .store
            .smembers(key)
            .await
            .map_err(|err| BoothError::StoreErr(err.to_string()))?
            .into_iter()
            .map(UserId::from)
            .collect())
    }
}

fn store_err(err: crate::ephemeral::StoreError) -> BoothError {
    BoothError::StoreErr(err.to_string())
}

#[async_trait]
impl BoothStateRepository for EphemeralBoothState {
    async fn current_history_id(&self) -> Result<Option<HistoryEntryId>, BoothError> {
        Ok(self
            .store
            .get(keys::CURRENT_HISTORY)
            .await
            .map_err(store_err)?
            .map(HistoryEntryId::from))
    }

    async fn current_dj(&self) -> Result<Option<UserId>, BoothError> {
        Ok(self
            .store
            .get(keys::CURRENT_DJ)
            .await
            .map_err(store_err)?
            .map(UserId::from))
    }

    async fn vote_tally(&self) -> Result<VoteTally, BoothError> {
        Ok(VoteTally {
            upvotes: self.members(keys::UPVOTES).await?,
            downvotes: self.members(keys::DOWNVOTES).await?,
            favorites: self.members(keys::FAVORITES).await?,
        })
    }

    async fn begin_play(&self, history_id: &HistoryEntryId, dj: &UserId) -> Result<(), BoothError> {
        // 清投票和写新 historyID/currentDJ 必须在同一个原子批次里：
        // 看到新 historyID 的观察者不能看到上一首的投票
        self.store
            .exec_multi(vec![
                StoreOp::Del {
                    key: keys::UPVOTES.to_string(),
                },
                StoreOp::Del {
                    key: keys::DOWNVOTES.to_string(),
                },
                StoreOp::Del {
                    key: keys::FAVORITES.to_string(),
                },
                StoreOp::Set {
                    key: keys::CURRENT_HISTORY.to_string(),
                    value: history_id.to_string(),
                },
                StoreOp::Set {
                    key: keys::CURRENT_DJ.to_string(),
                    value: dj.to_string(),
                },
            ])
            .await
            .map_err(store_err)
    }

    async fn clear(&self) -> Result<(), BoothError> {
        self.store
            .exec_multi(vec![
                StoreOp::Del {
                    key: keys::CURRENT_HISTORY.to_string(),
                },
                StoreOp::Del {
                    key: keys::CURRENT_DJ.to_string(),
                },
                StoreOp::Del {
                    key: keys::UPVOTES.to_string(),
                },
                StoreOp::Del {
                    key: keys::DOWNVOTES.to_string(),
                },
                StoreOp::Del {
                    key: keys::FAVORITES.to_string(),
                },
            ])
            .await
            .map_err(store_err)
    }

    async fn cast_vote(&self, user: &UserId, vote: Vote) -> Result<(), BoothError> {
        let (add_to, remove_from) = match vote {
            Vote::Up => (keys::UPVOTES, keys::DOWNVOTES),
            Vote::Down => (keys::DOWNVOTES, keys::UPVOTES),
        };
        // 换边的两步在一个批次里，用户任一时刻只在一边
        self.store
            .exec_multi(vec![
                StoreOp::SRem {
                    key: remove_from.to_string(),
                    member: user.to_string(),
                },
                StoreOp::SAdd {
                    key: add_to.to_string(),
                    member: user.to_string(),
                },
            ])
            .await
            .map_err(store_err)
    }

    async fn add_favorite(&self, user: &UserId) -> Result<(), BoothError> {
        self.store
            .sadd(keys::FAVORITES, user.as_str())
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn verify_current(&self, expected: Option<&HistoryEntryId>) -> Result<bool, BoothError> {
        let current = self
            .store
            .get(keys::CURRENT_HISTORY)
            .await
            .map_err(store_err)?;
        Ok(current.as_deref() == expected.map(|id| id.as_str()))
    }
}
