use crate::value::{MediaId, PlaylistId, PlaylistItemId, UserId};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use thiserror::Error;

/// 播放列表领域错误
#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("playlist not found: {0}")]
    PlaylistNotFound(String),
    #[error("playlist item not found: {0}")]
    ItemNotFound(String),
    #[error("{0}")]
    DbErr(String),
    #[error("{0}")]
    OtherErr(String),
}

/// Clamp a requested play range against the media duration.
///
/// `start` falls back to 0 when absent or negative; `end` falls back to the
/// full duration when absent, zero, or past the end, and can never precede
/// `start`. Inputs are i64 so out-of-range patches are representable.
pub fn clamp_range(start: Option<i64>, end: Option<i64>, duration: u32) -> (u32, u32) {
    let duration = i64::from(duration);
    let start = start.unwrap_or(0).clamp(0, duration);
    let end = match end {
        Some(end) if end != 0 => end.clamp(start, duration),
        _ => duration,
    };
    (start as u32, end as u32)
}

/// 播放列表条目实体
///
/// 引用一个不可变的媒体，携带可编辑的展示名和裁剪区间。
#[derive(Debug, Clone)]
pub struct PlaylistItem {
    pub id: PlaylistItemId,
    pub media_id: MediaId,
    pub artist: String,
    pub title: String,
    /// 播放起点（秒），0 ≤ start ≤ end
    pub start: u32,
    /// 播放终点（秒），end ≤ media.duration
    pub end: u32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PlaylistItem {
    pub fn new(
        id: PlaylistItemId,
        media_id: MediaId,
        artist: &str,
        title: &str,
        start: Option<i64>,
        end: Option<i64>,
        duration: u32,
    ) -> Self {
        let (start, end) = clamp_range(start, end, duration);
        let now = Utc::now().naive_utc();
        Self {
            id,
            media_id,
            artist: artist.to_string(),
            title: title.to_string(),
            start,
            end,
            created_at: now,
            updated_at: now,
        }
    }

    /// 应用局部更新，重新夹取 start/end
    pub fn apply_patch(&mut self, patch: PlaylistItemPatch, duration: u32) {
        if let Some(artist) = patch.artist {
            self.artist = artist;
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        let (start, end) = clamp_range(
            Some(patch.start.unwrap_or(i64::from(self.start))),
            Some(patch.end.unwrap_or(i64::from(self.end))),
            duration,
        );
        self.start = start;
        self.end = end;
        self.updated_at = Utc::now().naive_utc();
    }
}

/// 条目可变字段的局部更新
#[derive(Debug, Clone, Default)]
pub struct PlaylistItemPatch {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// 播放列表聚合根
///
/// 独占拥有其条目 ID 的有序列表；条目实体单独存储。
#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: PlaylistId,
    pub author: UserId,
    pub name: String,
    pub media: Vec<PlaylistItemId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Playlist {
    pub fn new(id: PlaylistId, author: UserId, name: &str) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id,
            author,
            name: name.to_string(),
            media: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn size(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    pub fn first_item(&self) -> Option<&PlaylistItemId> {
        self.media.first()
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
        self.touch();
    }

    /// 循环：把队首移到队尾（播放过后调用）
    pub fn cycle(&mut self) {
        if !self.media.is_empty() {
            let head = self.media.remove(0);
            self.media.push(head);
            self.touch();
        }
    }

    /// 在 `after` 之后连续插入一串条目
    ///
    /// `after` 为 None 或不在列表中时插入到队首。返回插入位置。
    pub fn insert_after(
        &mut self,
        ids: Vec<PlaylistItemId>,
        after: Option<&PlaylistItemId>,
    ) -> usize {
        let index = match after {
            Some(after) => self
                .media
                .iter()
                .position(|id| id == after)
                .map(|pos| pos + 1)
                .unwrap_or(0),
            None => 0,
        };
        self.media.splice(index..index, ids);
        self.touch();
        index
    }

    /// 移除给定条目，只触碰实际存在的；返回被移除的 ID
    pub fn remove_ids(&mut self, ids: &[PlaylistItemId]) -> Vec<PlaylistItemId> {
        let mut removed = Vec::new();
        self.media.retain(|id| {
            if ids.contains(id) {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.touch();
        }
        removed
    }

    /// 把给定条目按 `ids` 中的顺序移动到 `after` 之后
    ///
    /// 先摘除再整体插入，幂等：重复执行得到相同顺序。
    pub fn move_ids(&mut self, ids: &[PlaylistItemId], after: Option<&PlaylistItemId>) {
        let mut moved = Vec::new();
        for id in ids {
            if self.media.contains(id) {
                moved.push(id.clone());
            }
        }
        if moved.is_empty() {
            return;
        }
        self.media.retain(|id| !moved.contains(id));
        self.insert_after(moved, after);
    }

    /// 整体替换顺序（洗牌等），调用方负责保持条目多重集不变
    pub fn replace_order(&mut self, order: Vec<PlaylistItemId>) {
        self.media = order;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().naive_utc();
    }
}

/// 播放列表仓储接口
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    async fn find_by_id(&self, id: &PlaylistId) -> Result<Option<Playlist>, PlaylistError>;

    /// 某个用户拥有的全部播放列表
    async fn find_by_author(&self, author: &UserId) -> Result<Vec<Playlist>, PlaylistError>;

    async fn save(&self, playlist: &Playlist) -> Result<(), PlaylistError>;

    async fn delete(&self, id: &PlaylistId) -> Result<(), PlaylistError>;
}

/// 播放列表条目仓储接口
#[async_trait]
pub trait PlaylistItemRepository: Send + Sync {
    async fn find_by_id(&self, id: &PlaylistItemId) -> Result<Option<PlaylistItem>, PlaylistError>;

    /// 按给定 ID 顺序批量查找；缺失的 ID 被跳过
    async fn find_many(&self, ids: &[PlaylistItemId]) -> Result<Vec<PlaylistItem>, PlaylistError>;

    async fn save(&self, item: &PlaylistItem) -> Result<(), PlaylistError>;

    async fn save_many(&self, items: &[PlaylistItem]) -> Result<(), PlaylistError>;

    async fn delete_many(&self, ids: &[PlaylistItemId]) -> Result<(), PlaylistError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<PlaylistItemId> {
        raw.iter().map(|s| PlaylistItemId::from(*s)).collect()
    }

    fn playlist_with(raw: &[&str]) -> Playlist {
        let mut playlist = Playlist::new("p1".into(), "u1".into(), "test");
        playlist.media = ids(raw);
        playlist
    }

    #[test]
    fn clamp_range_defaults_to_full_media() {
        assert_eq!(clamp_range(None, None, 300), (0, 300));
        assert_eq!(clamp_range(Some(0), Some(0), 300), (0, 300));
    }

    #[test]
    fn clamp_range_enforces_bounds() {
        // 负的起点回落到 0
        assert_eq!(clamp_range(Some(-5), Some(100), 300), (0, 100));
        // 终点不能超过时长
        assert_eq!(clamp_range(Some(10), Some(500), 300), (10, 300));
        // 终点不能先于起点
        assert_eq!(clamp_range(Some(200), Some(100), 300), (200, 200));
        // 起点不能超过时长
        assert_eq!(clamp_range(Some(400), None, 300), (300, 300));
    }

    #[test]
    fn cycle_moves_head_to_tail() {
        let mut playlist = playlist_with(&["a", "b", "c"]);
        playlist.cycle();
        assert_eq!(playlist.media, ids(&["b", "c", "a"]));
    }

    #[test]
    fn insert_after_missing_anchor_goes_to_head() {
        let mut playlist = playlist_with(&["a", "b"]);
        let index = playlist.insert_after(ids(&["x", "y"]), Some(&"gone".into()));
        assert_eq!(index, 0);
        assert_eq!(playlist.media, ids(&["x", "y", "a", "b"]));
    }

    #[test]
    fn insert_after_anchor_is_contiguous() {
        let mut playlist = playlist_with(&["a", "b", "c"]);
        playlist.insert_after(ids(&["x", "y"]), Some(&"a".into()));
        assert_eq!(playlist.media, ids(&["a", "x", "y", "b", "c"]));
    }

    #[test]
    fn move_ids_is_idempotent() {
        let mut playlist = playlist_with(&["a", "b", "c", "d"]);
        let moving = ids(&["d", "b"]);
        playlist.move_ids(&moving, Some(&"a".into()));
        assert_eq!(playlist.media, ids(&["a", "d", "b", "c"]));
        playlist.move_ids(&moving, Some(&"a".into()));
        assert_eq!(playlist.media, ids(&["a", "d", "b", "c"]));
    }

    #[test]
    fn remove_ids_ignores_unknown() {
        let mut playlist = playlist_with(&["a", "b"]);
        let removed = playlist.remove_ids(&ids(&["b", "nope"]));
        assert_eq!(removed, ids(&["b"]));
        assert_eq!(playlist.media, ids(&["a"]));
    }
}
