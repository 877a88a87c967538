use crate::command::shared::IdGenerator;
use crate::error::AppError;
use domain::media::{Media, MediaRepository, ProviderMedia, SourceError, SourceProvider};
use domain::value::{MediaId, SourceType};
use std::collections::HashMap;
use std::sync::Arc;

/// 已注册的媒体来源适配器表
///
/// 进程启动时由宿主注册 YouTube/SoundCloud 等适配器；
/// 本核心只通过 `SourceProvider` 接口调用它们。
#[derive(Default)]
pub struct SourceRegistry {
    providers: HashMap<SourceType, Arc<dyn SourceProvider>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, source_type: SourceType, provider: Arc<dyn SourceProvider>) {
        self.providers.insert(source_type, provider);
    }

    fn get(&self, source_type: &SourceType) -> Result<&Arc<dyn SourceProvider>, SourceError> {
        self.providers
            .get(source_type)
            .ok_or_else(|| SourceError::UnknownType(source_type.clone()))
    }
}

/// 媒体解析应用服务
///
/// 把 (sourceType, sourceID) 变成持久化的媒体记录。
/// 首次见到的媒体先落库再返回，之后同一来源引用命中库里那条。
pub struct SourceResolver {
    media_repository: Arc<dyn MediaRepository>,
    registry: SourceRegistry,
    id_generator: Arc<dyn IdGenerator>,
}

impl SourceResolver {
    pub fn new(
        media_repository: Arc<dyn MediaRepository>,
        registry: SourceRegistry,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            media_repository,
            registry,
            id_generator,
        }
    }

    pub async fn get_one(&self, source_type: &SourceType, source_id: &str) -> Result<Media, AppError> {
        let mut media = self.get_many(source_type, &[source_id.to_string()]).await?;
        media.pop().ok_or_else(|| {
            AppError::SourceError(SourceError::LookupFailed(format!(
                "{}:{}",
                source_type, source_id
            )))
        })
    }

    /// 批量解析。已知媒体一次查询取回；未知 ID 打包成一次适配器调用，
    /// 返回前先持久化。结果按输入 ID 顺序排列，解析不出的 ID 被丢弃。
    pub async fn get_many(
        &self,
        source_type: &SourceType,
        source_ids: &[String],
    ) -> Result<Vec<Media>, AppError> {
        let known = self
            .media_repository
            .find_by_source_refs(source_type, source_ids)
            .await?;
        let mut by_source_id: HashMap<String, Media> = known
            .into_iter()
            .map(|media| (media.source_id.clone(), media))
            .collect();

        let unknown: Vec<String> = source_ids
            .iter()
            .filter(|id| !by_source_id.contains_key(*id))
            .cloned()
            .collect();

        if !unknown.is_empty() {
            let provider = self.registry.get(source_type)?;
            let descriptors = provider.lookup(source_type, &unknown).await?;
            let mut fresh = Vec::with_capacity(descriptors.len());
            for descriptor in descriptors {
                fresh.push(self.materialize(source_type, descriptor).await?);
            }
            self.media_repository.save_many(&fresh).await?;
            for media in fresh {
                by_source_id.insert(media.source_id.clone(), media);
            }
        }

        Ok(source_ids
            .iter()
            .filter_map(|id| by_source_id.get(id).cloned())
            .collect())
    }

    async fn materialize(
        &self,
        source_type: &SourceType,
        descriptor: ProviderMedia,
    ) -> Result<Media, AppError> {
        Ok(Media {
            id: MediaId::from(self.id_generator.next_id().await?),
            source_type: source_type.clone(),
            source_id: descriptor.source_id,
            duration: descriptor.duration,
            artist: descriptor.artist,
            title: descriptor.title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use domain::media::MediaError;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct FakeMedia {
        store: DashMap<MediaId, Media>,
    }

    #[async_trait]
    impl MediaRepository for FakeMedia {
        async fn find_by_id(&self, id: &MediaId) -> Result<Option<Media>, MediaError> {
            Ok(self.store.get(id).map(|m| m.clone()))
        }
        async fn find_by_source_refs(
            &self,
            source_type: &SourceType,
            source_ids: &[String],
        ) -> Result<Vec<Media>, MediaError> {
            Ok(self
                .store
                .iter()
                .filter(|m| m.source_type == *source_type && source_ids.contains(&m.source_id))
                .map(|m| m.clone())
                .collect())
        }
        async fn save_many(&self, media: &[Media]) -> Result<(), MediaError> {
            for item in media {
                self.store.insert(item.id.clone(), item.clone());
            }
            Ok(())
        }
    }

    /// 记录调用次数的适配器
    struct CountingProvider(AtomicU64);

    #[async_trait]
    impl SourceProvider for CountingProvider {
        async fn lookup(
            &self,
            _source_type: &SourceType,
            source_ids: &[String],
        ) -> Result<Vec<ProviderMedia>, SourceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(source_ids
                .iter()
                .map(|id| ProviderMedia {
                    source_id: id.clone(),
                    duration: 240,
                    artist: "artist".to_string(),
                    title: format!("title-{}", id),
                })
                .collect())
        }
    }

    struct Ids(AtomicU64);

    #[async_trait]
    impl IdGenerator for Ids {
        async fn next_id(&self) -> Result<String, AppError> {
            Ok(format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    #[tokio::test]
    async fn first_sight_persists_then_reuses() {
        let media_repo = Arc::new(FakeMedia::default());
        let provider = Arc::new(CountingProvider(AtomicU64::new(0)));
        let mut registry = SourceRegistry::new();
        registry.register("test".into(), provider.clone());
        let resolver = SourceResolver::new(
            media_repo.clone(),
            registry,
            Arc::new(Ids(AtomicU64::new(0))),
        );

        let source_type = SourceType::from("test");
        let first = resolver.get_one(&source_type, "abc").await.unwrap();
        assert_eq!(first.title, "title-abc");
        // 已经落库
        assert_eq!(media_repo.store.len(), 1);

        // 第二次命中库里那条，适配器不再被调用
        let second = resolver.get_one(&source_type, "abc").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_source_type_is_an_error() {
        let resolver = SourceResolver::new(
            Arc::new(FakeMedia::default()),
            SourceRegistry::new(),
            Arc::new(Ids(AtomicU64::new(0))),
        );
        let err = resolver
            .get_one(&SourceType::from("nope"), "x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::SourceError(SourceError::UnknownType(_))
        ));
    }
}
