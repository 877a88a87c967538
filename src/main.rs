use std::sync::Arc;

use application::command::booth::BoothService;
use application::command::shared::IdGenerator;
use infra::booth::broadcast::EphemeralBroadcastBus;
use infra::booth::lock::EphemeralAdvanceLock;
use infra::booth::state::EphemeralBoothState;
use infra::booth::waitlist::EphemeralWaitlist;
use infra::config::AppConfigImpl;
use infra::ephemeral::in_memory::InMemoryEphemeralStore;
use infra::ephemeral::redis::RedisEphemeralStore;
use infra::ephemeral::EphemeralStore;
use infra::id_generator::SnowflakeIdGenerator;
use infra::repository::in_memory::history::InMemoryHistoryRepository;
use infra::repository::in_memory::playlist::{
    InMemoryPlaylistItemRepository, InMemoryPlaylistRepository,
};
use infra::repository::in_memory::user::InMemoryUserRepository;
use log::{info, warn};
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 配置日志同时输出到控制台和文件
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {m}{n}",
        )))
        .build("app.log")
        .unwrap();

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .appender(Appender::builder().build(
            "stdout",
            Box::new(log4rs::append::console::ConsoleAppender::builder().build()),
        ))
        .build(
            Root::builder()
                .appender("file")
                .appender("stdout")
                .build(log_level.parse().unwrap_or(log::LevelFilter::Info)),
        )
        .unwrap();

    log4rs::init_config(config).unwrap();

    let cfg = AppConfigImpl::load().unwrap();
    let booth_cfg = cfg.booth();

    // 配了连接串就用共享的 redis 后端（多实例部署），
    // 否则退回进程内存版，只适合单实例
    let store: Arc<dyn EphemeralStore> = match cfg.ephemeral_url() {
        Some(url) => {
            info!("connecting shared ephemeral store");
            Arc::new(
                RedisEphemeralStore::connect(&url)
                    .await
                    .expect("Failed to connect to ephemeral store"),
            )
        }
        None => {
            warn!("no ephemeral store configured, falling back to in-process store");
            Arc::new(InMemoryEphemeralStore::new())
        }
    };

    let id_generator: Arc<dyn IdGenerator> =
        Arc::new(SnowflakeIdGenerator::new(cfg.node_id).unwrap());

    let booth = BoothService::new(
        Arc::new(EphemeralBoothState::new(store.clone())),
        Arc::new(EphemeralWaitlist::new(store.clone())),
        Arc::new(EphemeralAdvanceLock::new(store.clone())),
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemoryPlaylistRepository::new()),
        Arc::new(InMemoryPlaylistItemRepository::new()),
        Arc::new(InMemoryHistoryRepository::new()),
        Arc::new(EphemeralBroadcastBus::new(store.clone())),
        id_generator,
        booth_cfg.lock_ttl,
    );

    // 接手可能残留的播放状态：续上计时器或立即推进
    if let Err(err) = booth.on_start().await {
        warn!("booth recovery failed: {}", err);
    }
    info!("booth scheduler running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    // 只取消本地计时器；booth 状态留给其他实例或下次启动
    booth.on_stop().await;
    Ok(())
}
