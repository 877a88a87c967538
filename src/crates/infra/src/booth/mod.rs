pub mod broadcast;
pub mod lock;
pub mod state;
pub mod waitlist;

/// 临时存储键空间（与其他服务之间的稳定契约）
pub mod keys {
    pub const CURRENT_HISTORY: &str = "booth:historyID";
    pub const CURRENT_DJ: &str = "booth:currentDJ";
    pub const UPVOTES: &str = "booth:upvotes";
    pub const DOWNVOTES: &str = "booth:downvotes";
    pub const FAVORITES: &str = "booth:favorites";
    pub const WAITLIST: &str = "waitlist";
    pub const ADVANCE_LOCK: &str = "booth:advancing";
}
