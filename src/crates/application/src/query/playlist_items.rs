use crate::error::AppError;
use crate::query::dto::{Page, Pagination, PlaylistItemView};
use domain::media::MediaRepository;
use domain::playlist::{PlaylistError, PlaylistItem, PlaylistItemRepository, PlaylistRepository};
use domain::value::PlaylistId;
use regex::RegexBuilder;
use std::sync::Arc;

/// 播放列表条目分页查询服务
#[derive(Clone)]
pub struct GetPlaylistItems {
    playlists: Arc<dyn PlaylistRepository>,
    items: Arc<dyn PlaylistItemRepository>,
    media: Arc<dyn MediaRepository>,
}

impl GetPlaylistItems {
    pub fn new(
        playlists: Arc<dyn PlaylistRepository>,
        items: Arc<dyn PlaylistItemRepository>,
        media: Arc<dyn MediaRepository>,
    ) -> Self {
        Self {
            playlists,
            items,
            media,
        }
    }

    /// 取一页条目。
    ///
    /// 过滤是对 artist/title 的大小写不敏感字面子串匹配，
    /// 用户输入先转义；命中条目保持原始顺序。
    pub async fn page(
        &self,
        playlist_id: &PlaylistId,
        filter: Option<&str>,
        pagination: Pagination,
    ) -> Result<Page<PlaylistItemView>, AppError> {
        let playlist = self
            .playlists
            .find_by_id(playlist_id)
            .await?
            .ok_or_else(|| PlaylistError::PlaylistNotFound(playlist_id.to_string()))?;
        let total = playlist.size();

        let all = self.items.find_many(&playlist.media).await?;
        let matching: Vec<PlaylistItem> = match filter {
            Some(pattern) if !pattern.is_empty() => {
                let matcher = RegexBuilder::new(&regex::escape(pattern))
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| AppError::InvalidInput(err.to_string()))?;
                all.into_iter()
                    .filter(|item| matcher.is_match(&item.artist) || matcher.is_match(&item.title))
                    .collect()
            }
            _ => all,
        };
        let filtered = matching.len();

        let mut items = Vec::new();
        for item in matching
            .into_iter()
            .skip(pagination.offset)
            .take(pagination.limit)
        {
            let Some(media) = self.media.find_by_id(&item.media_id).await? else {
                continue;
            };
            items.push(PlaylistItemView { item, media });
        }

        let next = (pagination.offset + pagination.limit < filtered).then(|| Pagination {
            offset: pagination.offset + pagination.limit,
            limit: pagination.limit,
        });
        let previous = (pagination.offset > 0).then(|| Pagination {
            offset: pagination.offset.saturating_sub(pagination.limit),
            limit: pagination.limit,
        });

        Ok(Page {
            items,
            page_size: pagination.limit,
            filtered,
            total,
            current: pagination,
            next,
            previous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use domain::media::{Media, MediaError};
    use domain::playlist::Playlist;
    use domain::value::{MediaId, PlaylistItemId, SourceType, UserId};
    use std::sync::Arc;

    #[derive(Default)]
    struct Fakes {
        playlists: DashMap<PlaylistId, Playlist>,
        items: DashMap<PlaylistItemId, PlaylistItem>,
        media: DashMap<MediaId, Media>,
    }

    #[async_trait]
    impl PlaylistRepository for Fakes {
        async fn find_by_id(&self, id: &PlaylistId) -> Result<Option<Playlist>, PlaylistError> {
            Ok(self.playlists.get(id).map(|p| p.clone()))
        }
        async fn find_by_author(&self, _author: &UserId) -> Result<Vec<Playlist>, PlaylistError> {
            Ok(Vec::new())
        }
        async fn save(&self, playlist: &Playlist) -> Result<(), PlaylistError> {
            self.playlists.insert(playlist.id.clone(), playlist.clone());
            Ok(())
        }
        async fn delete(&self, _id: &PlaylistId) -> Result<(), PlaylistError> {
            Ok(())
        }
    }

    #[async_trait]
    impl PlaylistItemRepository for Fakes {
        async fn find_by_id(
            &self,
            id: &PlaylistItemId,
        ) -> Result<Option<PlaylistItem>, PlaylistError> {
            Ok(self.items.get(id).map(|i| i.clone()))
        }
        async fn find_many(
            &self,
            ids: &[PlaylistItemId],
        ) -> Result<Vec<PlaylistItem>, PlaylistError> {
            Ok(ids
                .iter()
                .filter_map(|id| self.items.get(id).map(|i| i.clone()))
                .collect())
        }
        async fn save(&self, item: &PlaylistItem) -> Result<(), PlaylistError> {
            self.items.insert(item.id.clone(), item.clone());
            Ok(())
        }
        async fn save_many(&self, items: &[PlaylistItem]) -> Result<(), PlaylistError> {
            for item in items {
                self.items.insert(item.id.clone(), item.clone());
            }
            Ok(())
        }
        async fn delete_many(&self, _ids: &[PlaylistItemId]) -> Result<(), PlaylistError> {
            Ok(())
        }
    }

    #[async_trait]
    impl domain::media::MediaRepository for Fakes {
        async fn find_by_id(&self, id: &MediaId) -> Result<Option<Media>, MediaError> {
            Ok(self.media.get(id).map(|m| m.clone()))
        }
        async fn find_by_source_refs(
            &self,
            _source_type: &SourceType,
            _source_ids: &[String],
        ) -> Result<Vec<Media>, MediaError> {
            Ok(Vec::new())
        }
        async fn save_many(&self, media: &[Media]) -> Result<(), MediaError> {
            for item in media {
                self.media.insert(item.id.clone(), item.clone());
            }
            Ok(())
        }
    }

    async fn seeded(titles: &[(&str, &str)]) -> (Arc<Fakes>, PlaylistId) {
        let fakes = Arc::new(Fakes::default());
        let playlist_id = PlaylistId::from("p1");
        let mut playlist = Playlist::new(playlist_id.clone(), "u1".into(), "mix");
        for (index, (artist, title)) in titles.iter().enumerate() {
            let media = Media {
                id: MediaId::from(format!("m{}", index)),
                source_type: "test".into(),
                source_id: format!("s{}", index),
                duration: 200,
                artist: artist.to_string(),
                title: title.to_string(),
            };
            fakes.media.insert(media.id.clone(), media.clone());
            let item = PlaylistItem::new(
                PlaylistItemId::from(format!("i{}", index)),
                media.id.clone(),
                artist,
                title,
                None,
                None,
                media.duration,
            );
            fakes.items.insert(item.id.clone(), item.clone());
            playlist.media.push(item.id.clone());
        }
        fakes.playlists.insert(playlist_id.clone(), playlist);
        (fakes, playlist_id)
    }

    fn query(fakes: &Arc<Fakes>) -> GetPlaylistItems {
        GetPlaylistItems::new(fakes.clone(), fakes.clone(), fakes.clone())
    }

    #[tokio::test]
    async fn paginates_with_cursors() {
        let (fakes, playlist_id) = seeded(&[
            ("a", "one"),
            ("a", "two"),
            ("a", "three"),
            ("a", "four"),
            ("a", "five"),
        ])
        .await;
        let page = query(&fakes)
            .page(
                &playlist_id,
                None,
                Pagination {
                    offset: 2,
                    limit: 2,
                },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.filtered, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].item.title, "three");
        assert_eq!(page.next, Some(Pagination { offset: 4, limit: 2 }));
        assert_eq!(page.previous, Some(Pagination { offset: 0, limit: 2 }));
    }

    #[tokio::test]
    async fn filter_is_case_insensitive_and_literal() {
        let (fakes, playlist_id) = seeded(&[
            ("Daft Punk", "One More Time"),
            ("Queen", "Bohemian Rhapsody"),
            ("daft punk", "Around the World"),
            ("C+C Music Factory", "Gonna Make You Sweat"),
        ])
        .await;

        let page = query(&fakes)
            .page(&playlist_id, Some("daft"), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.filtered, 2);
        assert_eq!(page.total, 4);
        // 原始顺序保持不变
        assert_eq!(page.items[0].item.title, "One More Time");
        assert_eq!(page.items[1].item.title, "Around the World");

        // 正则元字符按字面处理
        let page = query(&fakes)
            .page(&playlist_id, Some("c+c"), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.filtered, 1);
        assert_eq!(page.items[0].item.artist, "C+C Music Factory");
    }
}

