use async_trait::async_trait;
use dashmap::DashMap;
use domain::media::{Media, MediaError, MediaRepository};
use domain::value::{MediaId, SourceType};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryMediaRepository {
    store: Arc<DashMap<MediaId, Media>>,
}

impl InMemoryMediaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaRepository for InMemoryMediaRepository {
    async fn find_by_id(&self, id: &MediaId) -> Result<Option<Media>, MediaError> {
        Ok(self.store.get(id).map(|media| media.clone()))
    }

    async fn find_by_source_refs(
        &self,
        source_type: &SourceType,
        source_ids: &[String],
    ) -> Result<Vec<Media>, MediaError> {
        Ok(self
            .store
            .iter()
            .filter(|media| {
                media.source_type == *source_type && source_ids.contains(&media.source_id)
            })
            .map(|media| media.clone())
            .collect())
    }

    async fn save_many(&self, media: &[Media]) -> Result<(), MediaError> {
        for item in media {
            self.store.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }
}
