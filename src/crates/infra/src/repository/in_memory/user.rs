use async_trait::async_trait;
use dashmap::DashMap;
use domain::user::{User, UserError, UserRepository};
use domain::value::UserId;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    store: Arc<DashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError> {
        Ok(self.store.get(id).map(|user| user.clone()))
    }

    async fn save(&self, user: &User) -> Result<(), UserError> {
        self.store.insert(user.id.clone(), user.clone());
        Ok(())
    }
}
