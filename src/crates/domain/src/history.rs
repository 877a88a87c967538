use crate::value::{HistoryEntryId, MediaId, PlaylistId, PlaylistItemId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use thiserror::Error;

/// 播放历史领域错误
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history entry not found: {0}")]
    EntryNotFound(String),
    #[error("history entry already sealed: {0}")]
    AlreadySealed(String),
    #[error("{0}")]
    DbErr(String),
    #[error("{0}")]
    OtherErr(String),
}

/// 播放那一刻的媒体快照
///
/// artist/title/start/end 是值拷贝，之后对条目的编辑不会改写历史。
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSnapshot {
    pub media_id: MediaId,
    pub artist: String,
    pub title: String,
    pub start: u32,
    pub end: u32,
}

impl MediaSnapshot {
    /// 实际播放时长（秒）
    pub fn play_duration(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// 一次播放的投票结果
#[derive(Debug, Clone, Default)]
pub struct VoteTally {
    pub upvotes: Vec<UserId>,
    pub downvotes: Vec<UserId>,
    pub favorites: Vec<UserId>,
}

/// 播放历史条目
///
/// 每次 advance 产生一条；投票数组在下一次 advance 封存时一次性写入，
/// 之后不再改写。
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub user_id: UserId,
    pub playlist_id: PlaylistId,
    pub item_id: PlaylistItemId,
    pub media: MediaSnapshot,
    pub played_at: DateTime<Utc>,
    pub upvotes: Vec<UserId>,
    pub downvotes: Vec<UserId>,
    pub favorites: Vec<UserId>,
    pub sealed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl HistoryEntry {
    pub fn new(
        id: HistoryEntryId,
        user_id: UserId,
        playlist_id: PlaylistId,
        item_id: PlaylistItemId,
        media: MediaSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            playlist_id,
            item_id,
            media,
            played_at: now,
            upvotes: Vec::new(),
            downvotes: Vec::new(),
            favorites: Vec::new(),
            sealed: false,
            created_at: now.naive_utc(),
            updated_at: now.naive_utc(),
        }
    }

    /// 这次播放应当结束的时刻
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.played_at + Duration::seconds(i64::from(self.media.play_duration()))
    }
}

/// 播放历史仓储接口
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn find_by_id(&self, id: &HistoryEntryId) -> Result<Option<HistoryEntry>, HistoryError>;

    async fn save(&self, entry: &HistoryEntry) -> Result<(), HistoryError>;

    /// 封存：写入最终投票数组，只允许一次
    async fn seal(&self, id: &HistoryEntryId, tally: VoteTally) -> Result<(), HistoryError>;

    /// 最近的播放记录，新的在前
    async fn find_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError>;
}
