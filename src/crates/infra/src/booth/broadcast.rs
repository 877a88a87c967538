use crate::ephemeral::EphemeralStore;
use application::error::AppError;
use application::event::broadcast::BroadcastBus;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// 把广播总线落到临时存储的 pub/sub 上
#[derive(Clone)]
pub struct EphemeralBroadcastBus {
    store: Arc<dyn EphemeralStore>,
}

impl EphemeralBroadcastBus {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BroadcastBus for EphemeralBroadcastBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), AppError> {
        self.store
            .publish(topic, &payload.to_string())
            .await
            .map_err(|err| AppError::BroadcastError(err.to_string()))
    }
}
