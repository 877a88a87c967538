use async_trait::async_trait;
use dashmap::DashMap;
use domain::history::{HistoryEntry, HistoryError, HistoryRepository, VoteTally};
use domain::value::HistoryEntryId;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryHistoryRepository {
    store: Arc<DashMap<HistoryEntryId, HistoryEntry>>,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn find_by_id(&self, id: &HistoryEntryId) -> Result<Option<HistoryEntry>, HistoryError> {
        Ok(self.store.get(id).map(|entry| entry.clone()))
    }

    async fn save(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        self.store.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn seal(&self, id: &HistoryEntryId, tally: VoteTally) -> Result<(), HistoryError> {
        let mut entry = self
            .store
            .get_mut(id)
            .ok_or_else(|| HistoryError::EntryNotFound(id.to_string()))?;
        if entry.sealed {
            return Err(HistoryError::AlreadySealed(id.to_string()));
        }
        entry.upvotes = tally.upvotes;
        entry.downvotes = tally.downvotes;
        entry.favorites = tally.favorites;
        entry.sealed = true;
        entry.updated_at = chrono::Utc::now().naive_utc();
        Ok(())
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries: Vec<HistoryEntry> =
            self.store.iter().map(|entry| entry.clone()).collect();
        entries.sort_by(|a, b| b.played_at.cmp(&a.played_at));
        entries.truncate(limit);
        Ok(entries)
    }
}
