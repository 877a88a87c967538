use crate::value::{PlaylistId, UserId};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use thiserror::Error;

/// 用户领域错误
#[derive(Error, Debug)]
pub enum UserError {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("{0}")]
    DbErr(String),
    #[error("{0}")]
    OtherErr(String),
}

/// 用户聚合根
///
/// 用户由外部的账号系统创建和管理；本核心只关心展示名
/// 和当前激活的播放列表（DJ 上台时播放的来源）。
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    /// 上台时使用的播放列表；None 表示该用户无法当 DJ
    pub active_playlist_id: Option<PlaylistId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn new(id: UserId, display_name: &str) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id,
            display_name: display_name.to_string(),
            active_playlist_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 切换激活播放列表
    pub fn set_active_playlist(&mut self, playlist_id: Option<PlaylistId>) {
        self.active_playlist_id = playlist_id;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().naive_utc();
    }
}

/// 用户仓储接口
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 根据用户ID查找用户
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError>;

    /// 保存用户（创建或更新）
    async fn save(&self, user: &User) -> Result<(), UserError>;
}
