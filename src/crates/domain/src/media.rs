use crate::value::{MediaId, SourceRef, SourceType};
use async_trait::async_trait;
use thiserror::Error;

/// 媒体领域错误
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("media not found: {0}")]
    MediaNotFound(String),
    #[error("{0}")]
    DbErr(String),
    #[error("{0}")]
    OtherErr(String),
}

/// 媒体实体
///
/// 首次被引用时惰性创建，之后不可变。
/// (source_type, source_id) 全局唯一。
#[derive(Debug, Clone)]
pub struct Media {
    pub id: MediaId,
    pub source_type: SourceType,
    pub source_id: String,
    /// 完整时长（秒）
    pub duration: u32,
    pub artist: String,
    pub title: String,
}

impl Media {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef::new(self.source_type.clone(), self.source_id.clone())
    }
}

/// 媒体仓储接口
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn find_by_id(&self, id: &MediaId) -> Result<Option<Media>, MediaError>;

    /// 按来源批量查找已知媒体（一种来源类型一次查询）
    async fn find_by_source_refs(
        &self,
        source_type: &SourceType,
        source_ids: &[String],
    ) -> Result<Vec<Media>, MediaError>;

    /// 批量保存新媒体
    async fn save_many(&self, media: &[Media]) -> Result<(), MediaError>;
}

/// 来源查询错误
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("unknown media source: {0}")]
    UnknownType(SourceType),
    #[error("source lookup failed: {0}")]
    LookupFailed(String),
}

/// 外部媒体适配器返回的裸描述符（尚未持久化）
#[derive(Debug, Clone)]
pub struct ProviderMedia {
    pub source_id: String,
    pub duration: u32,
    pub artist: String,
    pub title: String,
}

/// 媒体来源适配器接口
///
/// YouTube/SoundCloud 等适配器在进程启动时注册。
/// 批量查询，一次调用解析同一来源的多个 ID。
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn lookup(
        &self,
        source_type: &SourceType,
        source_ids: &[String],
    ) -> Result<Vec<ProviderMedia>, SourceError>;
}
