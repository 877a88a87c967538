use crate::command::shared::IdGenerator;
use crate::command::source::SourceResolver;
use crate::error::AppError;
use domain::media::{Media, MediaRepository};
use domain::playlist::{
    Playlist, PlaylistError, PlaylistItem, PlaylistItemPatch, PlaylistItemRepository,
    PlaylistRepository,
};
use domain::user::{UserError, UserRepository};
use domain::value::{PlaylistId, PlaylistItemId, SourceType, UserId};
use log::error;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;

/// sourceID 在线上协议里既可能是字符串也可能是数字；
/// 在边界上归一化成字符串
#[derive(Debug, Clone)]
pub enum SourceIdInput {
    Text(String),
    Number(i64),
}

impl SourceIdInput {
    pub fn normalize(&self) -> String {
        match self {
            SourceIdInput::Text(id) => id.clone(),
            SourceIdInput::Number(id) => id.to_string(),
        }
    }
}

/// 添加条目的原始输入
#[derive(Debug, Clone)]
pub struct PlaylistItemInput {
    pub source_type: String,
    pub source_id: SourceIdInput,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// 播放列表的局部更新
#[derive(Debug, Clone, Default)]
pub struct PlaylistPatch {
    pub name: Option<String>,
}

/// `add_items` 的结果
#[derive(Debug)]
pub struct AddItemsResult {
    pub added: Vec<PlaylistItem>,
    pub after_id: Option<PlaylistItemId>,
    pub playlist_size: usize,
}

/// 播放列表应用服务
pub struct PlaylistService {
    playlists: Arc<dyn PlaylistRepository>,
    items: Arc<dyn PlaylistItemRepository>,
    media: Arc<dyn MediaRepository>,
    users: Arc<dyn UserRepository>,
    resolver: Arc<SourceResolver>,
    id_generator: Arc<dyn IdGenerator>,
}

impl PlaylistService {
    pub fn new(
        playlists: Arc<dyn PlaylistRepository>,
        items: Arc<dyn PlaylistItemRepository>,
        media: Arc<dyn MediaRepository>,
        users: Arc<dyn UserRepository>,
        resolver: Arc<SourceResolver>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            playlists,
            items,
            media,
            users,
            resolver,
            id_generator,
        }
    }

    pub async fn get_playlist(&self, id: &PlaylistId) -> Result<Playlist, AppError> {
        self.playlists
            .find_by_id(id)
            .await?
            .ok_or_else(|| PlaylistError::PlaylistNotFound(id.to_string()).into())
    }

    /// 按所有者取播放列表；不存在或不属于该用户都按不存在处理
    pub async fn get_user_playlist(
        &self,
        user_id: &UserId,
        id: &PlaylistId,
    ) -> Result<Playlist, AppError> {
        let playlist = self.get_playlist(id).await?;
        if playlist.author != *user_id {
            return Err(PlaylistError::PlaylistNotFound(id.to_string()).into());
        }
        Ok(playlist)
    }

    pub async fn get_user_playlists(&self, user_id: &UserId) -> Result<Vec<Playlist>, AppError> {
        Ok(self.playlists.find_by_author(user_id).await?)
    }

    pub async fn create_playlist(
        &self,
        user_id: &UserId,
        name: &str,
    ) -> Result<Playlist, AppError> {
        let playlist = Playlist::new(
            PlaylistId::from(self.id_generator.next_id().await?),
            user_id.clone(),
            name,
        );
        self.playlists.save(&playlist).await?;
        Ok(playlist)
    }

    pub async fn update_playlist(
        &self,
        id: &PlaylistId,
        patch: PlaylistPatch,
    ) -> Result<Playlist, AppError> {
        let mut playlist = self.get_playlist(id).await?;
        if let Some(name) = patch.name {
            playlist.rename(&name);
        }
        self.playlists.save(&playlist).await?;
        Ok(playlist)
    }

    /// 洗牌：只打乱顺序，条目多重集不变
    pub async fn shuffle_playlist(&self, id: &PlaylistId) -> Result<Playlist, AppError> {
        let mut playlist = self.get_playlist(id).await?;
        let mut order = playlist.media.clone();
        order.shuffle(&mut rand::thread_rng());
        playlist.replace_order(order);
        self.playlists.save(&playlist).await?;
        Ok(playlist)
    }

    /// 删除播放列表及其全部条目记录
    pub async fn delete_playlist(&self, id: &PlaylistId) -> Result<(), AppError> {
        let playlist = self.get_playlist(id).await?;
        self.items.delete_many(&playlist.media).await?;
        self.playlists.delete(id).await?;
        Ok(())
    }

    /// 把用户的某个播放列表设为上台用的激活列表
    pub async fn activate_playlist(
        &self,
        user_id: &UserId,
        id: &PlaylistId,
    ) -> Result<(), AppError> {
        let playlist = self.get_user_playlist(user_id, id).await?;
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| UserError::UserNotFound(user_id.to_string()))?;
        user.set_active_playlist(Some(playlist.id));
        self.users.save(&user).await?;
        Ok(())
    }

    /// 批量添加条目。
    ///
    /// 输入先校验，再按来源类型分组：已知媒体一次查询取回，
    /// 未知的打包成一次适配器调用并先持久化。条目批量落库后
    /// 作为整体插入到 `after` 之后（None 时插到队首）。
    pub async fn add_items(
        &self,
        playlist_id: &PlaylistId,
        inputs: Vec<PlaylistItemInput>,
        after: Option<PlaylistItemId>,
    ) -> Result<AddItemsResult, AppError> {
        validate_inputs(&inputs)?;
        let mut playlist = self.get_playlist(playlist_id).await?;

        // 每个来源类型一个去重后的 ID 批次
        let mut grouped: HashMap<SourceType, Vec<String>> = HashMap::new();
        for input in &inputs {
            let ids = grouped
                .entry(SourceType::from(input.source_type.as_str()))
                .or_default();
            let id = input.source_id.normalize();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut media_by_ref: HashMap<(SourceType, String), Media> = HashMap::new();
        for (source_type, source_ids) in &grouped {
            let media = self.resolver.get_many(source_type, source_ids).await?;
            for item in media {
                media_by_ref.insert((item.source_type.clone(), item.source_id.clone()), item);
            }
        }

        // 按输入顺序生成条目；展示名缺省取自媒体
        let mut added = Vec::new();
        for input in &inputs {
            let key = (
                SourceType::from(input.source_type.as_str()),
                input.source_id.normalize(),
            );
            let Some(media) = media_by_ref.get(&key) else {
                continue;
            };
            let artist = input
                .artist
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| media.artist.clone());
            let title = input
                .title
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| media.title.clone());
            added.push(PlaylistItem::new(
                PlaylistItemId::from(self.id_generator.next_id().await?),
                media.id.clone(),
                &artist,
                &title,
                input.start,
                input.end,
                media.duration,
            ));
        }

        if let Err(err) = self.items.save_many(&added).await {
            error!("bulk playlist item save failed: {}", err);
            return Err(AppError::UnknownError(
                "Could not save playlist items".to_string(),
            ));
        }

        let ids: Vec<PlaylistItemId> = added.iter().map(|item| item.id.clone()).collect();
        playlist.insert_after(ids, after.as_ref());
        self.playlists.save(&playlist).await?;

        Ok(AddItemsResult {
            added,
            after_id: after,
            playlist_size: playlist.size(),
        })
    }

    /// 把给定条目移动到 `after` 之后，保持 `item_ids` 内部的顺序
    pub async fn move_items(
        &self,
        playlist_id: &PlaylistId,
        item_ids: &[PlaylistItemId],
        after: Option<PlaylistItemId>,
    ) -> Result<Playlist, AppError> {
        let mut playlist = self.get_playlist(playlist_id).await?;
        playlist.move_ids(item_ids, after.as_ref());
        self.playlists.save(&playlist).await?;
        Ok(playlist)
    }

    /// 移除条目：同时删除引用和条目记录，只触碰确实在列表里的
    pub async fn remove_items(
        &self,
        playlist_id: &PlaylistId,
        item_ids: &[PlaylistItemId],
    ) -> Result<Playlist, AppError> {
        let mut playlist = self.get_playlist(playlist_id).await?;
        let removed = playlist.remove_ids(item_ids);
        self.items.delete_many(&removed).await?;
        self.playlists.save(&playlist).await?;
        Ok(playlist)
    }

    /// 取单个条目及其媒体
    pub async fn get_item(&self, item_id: &PlaylistItemId) -> Result<(PlaylistItem, Media), AppError> {
        let item = self
            .items
            .find_by_id(item_id)
            .await?
            .ok_or_else(|| PlaylistError::ItemNotFound(item_id.to_string()))?;
        let media = self
            .media
            .find_by_id(&item.media_id)
            .await?
            .ok_or_else(|| PlaylistError::ItemNotFound(item_id.to_string()))?;
        Ok((item, media))
    }

    /// 更新条目展示名/裁剪区间，按媒体时长重新夹取
    pub async fn update_item(
        &self,
        item_id: &PlaylistItemId,
        patch: PlaylistItemPatch,
    ) -> Result<PlaylistItem, AppError> {
        let (mut item, media) = self.get_item(item_id).await?;
        item.apply_patch(patch, media.duration);
        self.items.save(&item).await?;
        Ok(item)
    }
}

fn validate_inputs(inputs: &[PlaylistItemInput]) -> Result<(), AppError> {
    for input in inputs {
        if input.source_type.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Expected sourceType to be a string".to_string(),
            ));
        }
        if let SourceIdInput::Text(id) = &input.source_id {
            if id.trim().is_empty() {
                return Err(AppError::InvalidInput(
                    "Expected sourceID to be a string or number".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::source::SourceRegistry;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use domain::media::{MediaError, ProviderMedia, SourceError, SourceProvider};
    use domain::user::User;
    use domain::value::MediaId;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct FakePlaylists {
        store: DashMap<PlaylistId, Playlist>,
    }

    #[async_trait]
    impl PlaylistRepository for FakePlaylists {
        async fn find_by_id(&self, id: &PlaylistId) -> Result<Option<Playlist>, PlaylistError> {
            Ok(self.store.get(id).map(|p| p.clone()))
        }
        async fn find_by_author(&self, author: &UserId) -> Result<Vec<Playlist>, PlaylistError> {
            Ok(self
                .store
                .iter()
                .filter(|entry| entry.author == *author)
                .map(|entry| entry.clone())
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

    #[derive(Default)]
    struct FakeItems {
        store: DashMap<PlaylistItemId, PlaylistItem>,
    }

    #[async_trait]
    impl PlaylistItemRepository for FakeItems {
        async fn find_by_id(
            &self,
            id: &PlaylistItemId,
        ) -> Result<Option<PlaylistItem>, PlaylistError> {
            Ok(self.store.get(id).map(|item| item.clone()))
        }
        async fn find_many(
            &self,
            ids: &[PlaylistItemId],
        ) -> Result<Vec<PlaylistItem>, PlaylistError> {
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

    #[derive(Default)]
    struct FakeUsers {
        store: DashMap<UserId, User>,
    }

    #[async_trait]
    impl UserRepository for FakeUsers {
        async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError> {
            Ok(self.store.get(id).map(|u| u.clone()))
        }
        async fn save(&self, user: &User) -> Result<(), UserError> {
            self.store.insert(user.id.clone(), user.clone());
            Ok(())
        }
    }

    struct SeqIds(AtomicU64);

    #[async_trait]
    impl IdGenerator for SeqIds {
        async fn next_id(&self) -> Result<String, AppError> {
            Ok(format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    /// 每个 ID 都能解析出一条 180 秒的媒体
    struct EchoProvider;

    #[async_trait]
    impl SourceProvider for EchoProvider {
        async fn lookup(
            &self,
            _source_type: &SourceType,
            source_ids: &[String],
        ) -> Result<Vec<ProviderMedia>, SourceError> {
            Ok(source_ids
                .iter()
                .map(|id| ProviderMedia {
                    source_id: id.clone(),
                    duration: 180,
                    artist: format!("artist-{}", id),
                    title: format!("title-{}", id),
                })
                .collect())
        }
    }

    struct Fixture {
        service: PlaylistService,
        playlists: Arc<FakePlaylists>,
        items: Arc<FakeItems>,
    }

    fn fixture() -> Fixture {
        let playlists = Arc::new(FakePlaylists::default());
        let items = Arc::new(FakeItems::default());
        let media = Arc::new(FakeMedia::default());
        let users = Arc::new(FakeUsers::default());
        let ids: Arc<dyn IdGenerator> = Arc::new(SeqIds(AtomicU64::new(0)));
        let mut registry = SourceRegistry::new();
        registry.register(SourceType::from("test"), Arc::new(EchoProvider));
        let resolver = Arc::new(SourceResolver::new(media.clone(), registry, ids.clone()));
        let service = PlaylistService::new(
            playlists.clone(),
            items.clone(),
            media,
            users,
            resolver,
            ids,
        );
        Fixture {
            service,
            playlists,
            items,
        }
    }

    fn input(id: &str) -> PlaylistItemInput {
        PlaylistItemInput {
            source_type: "test".to_string(),
            source_id: SourceIdInput::Text(id.to_string()),
            artist: None,
            title: None,
            start: None,
            end: None,
        }
    }

    #[tokio::test]
    async fn add_then_remove_restores_playlist() {
        let fx = fixture();
        let playlist = fx
            .service
            .create_playlist(&"u1".into(), "mix")
            .await
            .unwrap();

        let result = fx
            .service
            .add_items(&playlist.id, vec![input("a"), input("b")], None)
            .await
            .unwrap();
        assert_eq!(result.added.len(), 2);
        assert_eq!(result.playlist_size, 2);

        let ids: Vec<PlaylistItemId> = result.added.iter().map(|i| i.id.clone()).collect();
        let after = fx.service.remove_items(&playlist.id, &ids).await.unwrap();
        assert!(after.is_empty());
        // 条目记录也被删除
        assert!(fx.items.store.is_empty());
    }

    #[tokio::test]
    async fn add_items_rejects_malformed_input() {
        let fx = fixture();
        let playlist = fx
            .service
            .create_playlist(&"u1".into(), "mix")
            .await
            .unwrap();

        let mut bad = input("a");
        bad.source_type = "".to_string();
        let err = fx
            .service
            .add_items(&playlist.id, vec![bad], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn add_items_inserts_after_anchor() {
        let fx = fixture();
        let playlist = fx
            .service
            .create_playlist(&"u1".into(), "mix")
            .await
            .unwrap();
        let first = fx
            .service
            .add_items(&playlist.id, vec![input("a"), input("b")], None)
            .await
            .unwrap();
        let anchor = first.added[0].id.clone();

        let second = fx
            .service
            .add_items(&playlist.id, vec![input("c")], Some(anchor.clone()))
            .await
            .unwrap();
        assert_eq!(second.after_id, Some(anchor.clone()));

        let stored = fx.playlists.store.get(&playlist.id).unwrap().clone();
        assert_eq!(stored.media[0], anchor);
        assert_eq!(stored.media[1], second.added[0].id);
    }

    #[tokio::test]
    async fn add_items_reuses_known_media() {
        let fx = fixture();
        let playlist = fx
            .service
            .create_playlist(&"u1".into(), "mix")
            .await
            .unwrap();
        let first = fx
            .service
            .add_items(&playlist.id, vec![input("a")], None)
            .await
            .unwrap();
        let second = fx
            .service
            .add_items(&playlist.id, vec![input("a")], None)
            .await
            .unwrap();
        // 同一个来源引用落到同一条媒体上
        assert_eq!(first.added[0].media_id, second.added[0].media_id);
    }

    #[tokio::test]
    async fn shuffle_preserves_media_multiset() {
        let fx = fixture();
        let playlist = fx
            .service
            .create_playlist(&"u1".into(), "mix")
            .await
            .unwrap();
        fx.service
            .add_items(
                &playlist.id,
                vec![input("a"), input("b"), input("c"), input("d")],
                None,
            )
            .await
            .unwrap();

        let before = fx.playlists.store.get(&playlist.id).unwrap().clone();
        let shuffled = fx.service.shuffle_playlist(&playlist.id).await.unwrap();

        let mut expected = before.media.clone();
        let mut actual = shuffled.media.clone();
        expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        actual.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(expected, actual);
    }

    #[tokio::test]
    async fn update_item_reclamps_range() {
        let fx = fixture();
        let playlist = fx
            .service
            .create_playlist(&"u1".into(), "mix")
            .await
            .unwrap();
        let added = fx
            .service
            .add_items(&playlist.id, vec![input("a")], None)
            .await
            .unwrap();
        let item_id = added.added[0].id.clone();

        let updated = fx
            .service
            .update_item(
                &item_id,
                PlaylistItemPatch {
                    start: Some(30),
                    end: Some(9999),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.start, 30);
        // 媒体时长 180 秒，终点被夹回去
        assert_eq!(updated.end, 180);
    }
}
