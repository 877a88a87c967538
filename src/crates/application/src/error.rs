use domain::booth::BoothError;
use domain::history::HistoryError;
use domain::media::{MediaError, SourceError};
use domain::playlist::PlaylistError;
use domain::user::UserError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("User error: {0}")]
    UserError(#[from] UserError),
    #[error("Playlist error: {0}")]
    PlaylistError(#[from] PlaylistError),
    #[error("Media error: {0}")]
    MediaError(#[from] MediaError),
    #[error("History error: {0}")]
    HistoryError(#[from] HistoryError),
    #[error("Booth error: {0}")]
    BoothError(#[from] BoothError),
    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),
    #[error("Broadcast error: {0}")]
    BroadcastError(String),
    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl AppError {
    /// 锁竞争失败：调用方可以退避重试，计时器回调直接放弃
    pub fn is_advance_in_progress(&self) -> bool {
        matches!(self, AppError::BoothError(BoothError::AdvanceInProgress))
    }
}
