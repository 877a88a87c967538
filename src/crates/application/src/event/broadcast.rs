use crate::error::AppError;
use async_trait::async_trait;
use domain::history::HistoryEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// 对外广播的主题，载荷形状是与其他服务之间的稳定契约
pub const TOPIC_ADVANCE_COMPLETE: &str = "advance:complete";
pub const TOPIC_PLAYLIST_CYCLE: &str = "playlist:cycle";
pub const TOPIC_USER_PLAY: &str = "user:play";
pub const TOPIC_WAITLIST_UPDATE: &str = "waitlist:update";

/// 广播总线抽象
///
/// 只发不收。订阅方是不受信的观察者，投递语义 at-least-once；
/// 权威状态始终在存储里，观察者漏掉消息后自行对账。
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), AppError>;
}

/// 状态已经提交后才广播，所以发布失败只记日志不回滚
pub async fn publish_or_log(bus: &dyn BroadcastBus, topic: &str, payload: Value) {
    if let Err(err) = bus.publish(topic, payload).await {
        log::warn!("broadcast publish failed on {}: {}", topic, err);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSnapshotPayload {
    pub media: String,
    pub artist: String,
    pub title: String,
    pub start: u32,
    pub end: u32,
}

/// `advance:complete` 载荷；房间转空时整个载荷为 null
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceCompletePayload {
    #[serde(rename = "historyID")]
    pub history_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "playlistID")]
    pub playlist_id: String,
    #[serde(rename = "itemID")]
    pub item_id: String,
    pub media: MediaSnapshotPayload,
    /// epoch 毫秒
    #[serde(rename = "playedAt")]
    pub played_at: i64,
}

impl AdvanceCompletePayload {
    pub fn from_entry(entry: &HistoryEntry) -> Self {
        Self {
            history_id: entry.id.to_string(),
            user_id: entry.user_id.to_string(),
            playlist_id: entry.playlist_id.to_string(),
            item_id: entry.item_id.to_string(),
            media: MediaSnapshotPayload {
                media: entry.media.media_id.to_string(),
                artist: entry.media.artist.clone(),
                title: entry.media.title.clone(),
                start: entry.media.start,
                end: entry.media.end,
            },
            played_at: entry.played_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistCyclePayload {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "playlistID")]
    pub playlist_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPlayPayload {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub artist: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::history::MediaSnapshot;

    #[test]
    fn advance_payload_uses_wire_field_names() {
        let entry = HistoryEntry::new(
            "h1".into(),
            "u1".into(),
            "p1".into(),
            "i1".into(),
            MediaSnapshot {
                media_id: "m1".into(),
                artist: "Daft Punk".to_string(),
                title: "Around the World".to_string(),
                start: 0,
                end: 30,
            },
        );
        let value = serde_json::to_value(AdvanceCompletePayload::from_entry(&entry)).unwrap();
        assert_eq!(value["historyID"], "h1");
        assert_eq!(value["userID"], "u1");
        assert_eq!(value["playlistID"], "p1");
        assert_eq!(value["itemID"], "i1");
        assert_eq!(value["media"]["media"], "m1");
        assert_eq!(value["media"]["end"], 30);
        assert!(value["playedAt"].is_i64());
    }
}
