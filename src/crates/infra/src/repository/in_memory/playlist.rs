use async_trait::async_trait;
use dashmap::DashMap;
use domain::playlist::{
    Playlist, PlaylistError, PlaylistItem, PlaylistItemRepository, PlaylistRepository,
};
use domain::value::{PlaylistId, PlaylistItemId, UserId};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryPlaylistRepository {
    store: Arc<DashMap<PlaylistId, Playlist>>,
}

impl InMemoryPlaylistRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaylistRepository for InMemoryPlaylistRepository {
    async fn find_by_id(&self, id: &PlaylistId) -> Result<Option<Playlist>, PlaylistError> {
        Ok(self.store.get(id).map(|playlist| playlist.clone()))
    }

    async fn find_by_author(&self, author: &UserId) -> Result<Vec<Playlist>, PlaylistError> {
        Ok(self
            .store
            .iter()
            .filter(|playlist| playlist.author == *author)
            .map(|playlist| playlist.clone())
            .collect())
    }

    async fn save(&self, playlist: &Playlist) -> Result<(), PlaylistError> {
        self.store.insert(playlist.id.clone(), playlist.clone());
        Ok(())
    }

    async fn delete(&self, id: &PlaylistId) -> Result<(), PlaylistError> {
        self.store.remove(id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPlaylistItemRepository {
    store: Arc<DashMap<PlaylistItemId, PlaylistItem>>,
}

impl InMemoryPlaylistItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaylistItemRepository for InMemoryPlaylistItemRepository {
    async fn find_by_id(&self, id: &PlaylistItemId) -> Result<Option<PlaylistItem>, PlaylistError> {
        Ok(self.store.get(id).map(|item| item.clone()))
    }

    async fn find_many(&self, ids: &[PlaylistItemId]) -> Result<Vec<PlaylistItem>, PlaylistError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.store.get(id).map(|item| item.clone()))
            .collect())
    }

    async fn save(&self, item: &PlaylistItem) -> Result<(), PlaylistError> {
        self.store.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn save_many(&self, items: &[PlaylistItem]) -> Result<(), PlaylistError> {
        for item in items {
            self.store.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[PlaylistItemId]) -> Result<(), PlaylistError> {
        for id in ids {
            self.store.remove(id);
        }
        Ok(())
    }
}
