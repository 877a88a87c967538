use crate::command::shared::IdGenerator;
use crate::error::AppError;
use crate::event::broadcast::{
    self, AdvanceCompletePayload, BroadcastBus, PlaylistCyclePayload, UserPlayPayload,
};
use chrono::Utc;
use domain::booth::{
    AdvanceLease, AdvanceLock, BoothError, BoothStateRepository, Vote, WaitlistRepository,
};
use domain::history::{HistoryEntry, HistoryError, HistoryRepository, MediaSnapshot};
use domain::playlist::{PlaylistItemRepository, PlaylistRepository};
use domain::user::UserRepository;
use domain::value::{HistoryEntryId, UserId};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// `advance` 的调用选项
#[derive(Debug, Clone, Copy)]
pub struct AdvanceOptions {
    /// 跳过/替换语义：上一位 DJ 不回队尾，空队列时也不连任
    pub remove: bool,
    /// false 时不广播（内部恢复等场景）
    pub publish: bool,
}

impl Default for AdvanceOptions {
    fn default() -> Self {
        Self {
            remove: false,
            publish: true,
        }
    }
}

/// 一次 advance 内连续跳过不可播用户的上限，保证推进有界
const MAX_ADVANCE_HOPS: usize = 10;

/// 选人阶段的结果
enum Picked {
    /// 下一条播放，尚未保存
    Entry(Box<HistoryEntry>),
    /// 队首用户当前不可播（空列表/悬空引用），弹出后重选
    SkipWaitlisted(UserId),
    /// 没有可上台的人，房间转空
    Nobody,
}

/// 点播台调度服务
///
/// 拥有 advance 协议、崩溃恢复和到点计时器。进程内只持有一个
/// 待触发的计时器句柄，全部房间状态都在临时存储里，重启无损。
#[derive(Clone)]
pub struct BoothService {
    booth_state: Arc<dyn BoothStateRepository>,
    waitlist: Arc<dyn WaitlistRepository>,
    advance_lock: Arc<dyn AdvanceLock>,
    users: Arc<dyn UserRepository>,
    playlists: Arc<dyn PlaylistRepository>,
    items: Arc<dyn PlaylistItemRepository>,
    history: Arc<dyn HistoryRepository>,
    bus: Arc<dyn BroadcastBus>,
    id_generator: Arc<dyn IdGenerator>,
    lock_ttl: Duration,
    timer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl BoothService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        booth_state: Arc<dyn BoothStateRepository>,
        waitlist: Arc<dyn WaitlistRepository>,
        advance_lock: Arc<dyn AdvanceLock>,
        users: Arc<dyn UserRepository>,
        playlists: Arc<dyn PlaylistRepository>,
        items: Arc<dyn PlaylistItemRepository>,
        history: Arc<dyn HistoryRepository>,
        bus: Arc<dyn BroadcastBus>,
        id_generator: Arc<dyn IdGenerator>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            booth_state,
            waitlist,
            advance_lock,
            users,
            playlists,
            items,
            history,
            bus,
            id_generator,
            lock_ttl,
            timer: Arc::new(Mutex::new(None)),
        }
    }

    /// 推进点播台：密封上一条、选出下一条、轮转队列、广播转换。
    ///
    /// 整个系统同一时刻只有一个实例能走到里面；竞争失败的调用方
    /// 收到 `AdvanceInProgress`，不自动重试。
    pub async fn advance(&self, options: AdvanceOptions) -> Result<Option<HistoryEntry>, AppError> {
        let lease = self.advance_lock.acquire(self.lock_ttl).await?;
        let result = self.advance_locked(lease.as_ref(), options).await;
        if let Err(err) = lease.release().await {
            // TTL 到期会清理，释放失败无害
            debug!("advance lease release failed: {}", err);
        }
        result
    }

    async fn advance_locked(
        &self,
        lease: &dyn AdvanceLease,
        options: AdvanceOptions,
    ) -> Result<Option<HistoryEntry>, AppError> {
        for _ in 0..MAX_ADVANCE_HOPS {
            lease.extend(self.lock_ttl).await?;

            let previous = self.current_entry().await?;
            match self.pick_next(options.remove).await? {
                Picked::Entry(entry) => {
                    return self.commit(lease, options, previous, Some(*entry)).await;
                }
                Picked::Nobody => {
                    return self.commit(lease, options, previous, None).await;
                }
                Picked::SkipWaitlisted(user_id) => {
                    // 队首用户没法播：弹出且不回队尾，跳过一轮重选。
                    // 这是对空列表递归 advance({remove:true}) 的循环写法。
                    info!("next DJ {} has no playable playlist, skipping", user_id);
                    self.waitlist.pop_head().await?;
                }
            }
        }
        Err(AppError::BoothError(BoothError::EmptyPlaylist))
    }

    /// 选出下一位 DJ 并构造未保存的历史条目。
    ///
    /// remove 模式只考虑等待队列；常规模式下空队列让现任 DJ 连任。
    async fn pick_next(&self, remove: bool) -> Result<Picked, AppError> {
        let head = self.waitlist.head().await?;
        let from_waitlist = head.is_some();
        let user_id = match head {
            Some(id) => Some(id),
            None if !remove => self.booth_state.current_dj().await?,
            None => None,
        };
        let Some(user_id) = user_id else {
            return Ok(Picked::Nobody);
        };

        let Some(user) = self.users.find_by_id(&user_id).await? else {
            // 队列里的幽灵用户
            return Ok(skip_or_idle(from_waitlist, user_id));
        };
        let Some(playlist_id) = user.active_playlist_id.clone() else {
            // 没有激活播放列表的用户当不了 DJ
            return Ok(Picked::Nobody);
        };
        let playlist = match self.playlists.find_by_id(&playlist_id).await? {
            // 悬空的激活列表按空列表对待：跳过用户而不是让房间停摆
            Some(playlist) if !playlist.is_empty() => playlist,
            _ => return Ok(skip_or_idle(from_waitlist, user_id)),
        };
        let Some(first) = playlist.first_item().cloned() else {
            return Ok(skip_or_idle(from_waitlist, user_id));
        };
        let Some(item) = self.items.find_by_id(&first).await? else {
            return Ok(skip_or_idle(from_waitlist, user_id));
        };

        let entry = HistoryEntry::new(
            HistoryEntryId::from(self.id_generator.next_id().await?),
            user.id,
            playlist.id,
            item.id,
            MediaSnapshot {
                media_id: item.media_id,
                artist: item.artist,
                title: item.title,
                start: item.start,
                end: item.end,
            },
        );
        Ok(Picked::Entry(Box::new(entry)))
    }

    async fn commit(
        &self,
        lease: &dyn AdvanceLease,
        options: AdvanceOptions,
        previous: Option<HistoryEntry>,
        next: Option<HistoryEntry>,
    ) -> Result<Option<HistoryEntry>, AppError> {
        // 密封上一条：趁投票集合还没被清掉读出最终结果并落库
        if let Some(prev) = &previous {
            let tally = self.booth_state.vote_tally().await?;
            match self.history.seal(&prev.id, tally).await {
                Ok(()) => {}
                Err(HistoryError::AlreadySealed(_)) => {
                    // 崩溃后的重放，上一条已经封存过
                    debug!("previous entry {} already sealed", prev.id);
                }
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(next) = &next {
            self.history.save(next).await?;
        } else {
            self.stop_timer().await;
        }

        // 轮转等待队列：有人排队时弹出队首，非 remove 模式下把上一位
        // DJ 送回队尾。没人排队时独占 DJ 原地连任，不重新排队。
        if self.waitlist.head().await?.is_some() {
            self.waitlist.pop_head().await?;
            if let Some(prev) = &previous {
                if !options.remove {
                    self.waitlist.push_tail(&prev.user_id).await?;
                }
            }
        }

        // 栅栏检查：租约已保证独占，但终态写入前仍确认 historyID
        // 没被别的实例动过，防御租约过期后的陈旧写入
        let expected = previous.as_ref().map(|prev| &prev.id);
        if !self.booth_state.verify_current(expected).await? {
            warn!("booth state moved under our lease, aborting advance");
            return Err(AppError::BoothError(BoothError::LeaseLost));
        }
        lease.extend(self.lock_ttl).await?;

        if let Some(next) = &next {
            // 清投票 + 写 historyID/currentDJ 在一个原子批次里
            self.booth_state.begin_play(&next.id, &next.user_id).await?;
            self.cycle_playlist(next).await?;
            self.arm_timer(Duration::from_secs(u64::from(next.media.play_duration())))
                .await;
        } else {
            self.booth_state.clear().await?;
        }

        if options.publish {
            self.publish_transition(next.as_ref()).await;
        }

        Ok(next)
    }

    /// 播放过的条目从队首轮到队尾
    async fn cycle_playlist(&self, entry: &HistoryEntry) -> Result<(), AppError> {
        if let Some(mut playlist) = self.playlists.find_by_id(&entry.playlist_id).await? {
            playlist.cycle();
            self.playlists.save(&playlist).await?;
        }
        Ok(())
    }

    /// 固定顺序广播一次转换：advance:complete、playlist:cycle、
    /// user:play、waitlist:update
    async fn publish_transition(&self, next: Option<&HistoryEntry>) {
        let payload = match next {
            Some(entry) => serde_json::to_value(AdvanceCompletePayload::from_entry(entry))
                .unwrap_or(Value::Null),
            None => Value::Null,
        };
        broadcast::publish_or_log(self.bus.as_ref(), broadcast::TOPIC_ADVANCE_COMPLETE, payload)
            .await;

        if let Some(entry) = next {
            let cycle = serde_json::to_value(PlaylistCyclePayload {
                user_id: entry.user_id.to_string(),
                playlist_id: entry.playlist_id.to_string(),
            })
            .unwrap_or(Value::Null);
            broadcast::publish_or_log(self.bus.as_ref(), broadcast::TOPIC_PLAYLIST_CYCLE, cycle)
                .await;

            let play = serde_json::to_value(UserPlayPayload {
                user_id: entry.user_id.to_string(),
                artist: entry.media.artist.clone(),
                title: entry.media.title.clone(),
            })
            .unwrap_or(Value::Null);
            broadcast::publish_or_log(self.bus.as_ref(), broadcast::TOPIC_USER_PLAY, play).await;
        }

        match self.waitlist.snapshot().await {
            Ok(snapshot) => {
                let list: Vec<String> = snapshot.iter().map(|id| id.to_string()).collect();
                let payload = serde_json::to_value(list).unwrap_or(Value::Null);
                broadcast::publish_or_log(
                    self.bus.as_ref(),
                    broadcast::TOPIC_WAITLIST_UPDATE,
                    payload,
                )
                .await;
            }
            Err(err) => warn!("waitlist snapshot for broadcast failed: {}", err),
        }
    }

    /// 布置单发的到点计时器；任何转换都先取消旧的
    fn arm_timer(
        &self,
        duration: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut slot = self.timer.lock().await;
            if let Some(handle) = slot.take() {
                handle.abort();
            }
            let service = self.clone();
            let timer_future: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> =
                Box::pin(async move {
                    tokio::time::sleep(duration).await;
                    // 先摘掉自己的句柄，advance 里重新布置计时器时才不会
                    // 中止正在执行的这个任务
                    service.timer.lock().await.take();
                    match service.advance(AdvanceOptions::default()).await {
                        Ok(_) => {}
                        Err(err) if err.is_advance_in_progress() => {
                            debug!("track-end advance lost the race, another instance drives");
                        }
                        Err(err) => warn!("track-end advance failed: {}", err),
                    }
                });
            *slot = Some(tokio::spawn(timer_future));
        })
    }

    async fn stop_timer(&self) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
        }
    }

    /// 进程启动恢复：临时存储里还有正在播放的条目时续上剩余时长的
    /// 计时器；已经过点则立即推进。
    pub async fn on_start(&self) -> Result<(), AppError> {
        let Some(history_id) = self.booth_state.current_history_id().await? else {
            return Ok(());
        };
        let Some(entry) = self.history.find_by_id(&history_id).await? else {
            // 临时存储和持久层出现分叉（比如数据库回档）。孤儿键必须
            // 先清掉：current_entry 会把它读成 None，advance 的栅栏检查
            // 拿 None 去比对还留在键里的死 ID，永远对不上，房间就卡死了
            warn!("booth points at unknown history entry {}, clearing and advancing", history_id);
            self.booth_state.clear().await?;
            return self.advance_tolerant().await;
        };
        let remaining = entry.ends_at() - Utc::now();
        match remaining.to_std() {
            Ok(remaining) if !remaining.is_zero() => {
                info!("resuming play {} with {:?} left", entry.id, remaining);
                self.arm_timer(remaining).await;
                Ok(())
            }
            _ => {
                info!("current play {} already ended, advancing", entry.id);
                self.advance_tolerant().await
            }
        }
    }

    /// 停机：只取消本地计时器。booth 状态不动，
    /// 留给其他实例或下次启动接手。
    pub async fn on_stop(&self) {
        self.stop_timer().await;
    }

    /// 有没有布置好的计时器（诊断/测试用）
    pub async fn timer_armed(&self) -> bool {
        self.timer.lock().await.is_some()
    }

    /// 当前正在播放的历史条目（权威读取）
    pub async fn current_entry(&self) -> Result<Option<HistoryEntry>, AppError> {
        match self.booth_state.current_history_id().await? {
            Some(id) => Ok(self.history.find_by_id(&id).await?),
            None => Ok(None),
        }
    }

    /// 对当前播放投票。换边从另一个集合移除并加入目标集合，
    /// 同一原子批次完成。
    pub async fn cast_vote(&self, user: &UserId, vote: Vote) -> Result<(), AppError> {
        if self.booth_state.current_history_id().await?.is_none() {
            return Err(AppError::BoothError(BoothError::NothingPlaying));
        }
        self.booth_state.cast_vote(user, vote).await?;
        Ok(())
    }

    /// 收藏当前播放；与投票方向无关
    pub async fn add_favorite(&self, user: &UserId) -> Result<(), AppError> {
        if self.booth_state.current_history_id().await?.is_none() {
            return Err(AppError::BoothError(BoothError::NothingPlaying));
        }
        self.booth_state.add_favorite(user).await?;
        Ok(())
    }

    async fn advance_tolerant(&self) -> Result<(), AppError> {
        match self.advance(AdvanceOptions::default()).await {
            Ok(_) => Ok(()),
            // 别的实例抢到了推进权
            Err(err) if err.is_advance_in_progress() => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn skip_or_idle(from_waitlist: bool, user_id: UserId) -> Picked {
    if from_waitlist {
        Picked::SkipWaitlisted(user_id)
    } else {
        Picked::Nobody
    }
}
