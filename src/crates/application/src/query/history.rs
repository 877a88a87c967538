use crate::error::AppError;
use domain::history::{HistoryEntry, HistoryRepository};
use std::sync::Arc;

/// 播放历史查询服务
#[derive(Clone)]
pub struct GetHistory {
    history: Arc<dyn HistoryRepository>,
}

impl GetHistory {
    pub fn new(history: Arc<dyn HistoryRepository>) -> Self {
        Self { history }
    }

    /// 最近的播放记录，新的在前
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
        Ok(self.history.find_recent(limit).await?)
    }
}
