use domain::media::Media;
use domain::playlist::PlaylistItem;

/// 分页游标：偏移 + 每页大小
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// 一页查询结果，带相邻页游标
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_size: usize,
    /// 过滤后命中的条数；没有过滤时等于 total
    pub filtered: usize,
    pub total: usize,
    pub current: Pagination,
    pub next: Option<Pagination>,
    pub previous: Option<Pagination>,
}

/// 条目与其媒体的组合视图
#[derive(Debug, Clone)]
pub struct PlaylistItemView {
    pub item: PlaylistItem,
    pub media: Media,
}
