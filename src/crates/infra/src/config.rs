use config::{Config, Environment, File};
use dotenvy::dotenv;
use serde::Deserialize;
use std::error::Error;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    /// 临时存储连接串（redis://…）；留空时用进程内存版
    ephemeral_url: String,
    /// 雪花算法节点ID，多实例部署时每个进程一个
    node_id: i64,
    booth: RawBoothConfig,
}

/// 点播台配置（原始配置）
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawBoothConfig {
    /// advance 互斥锁的租约时长（毫秒）
    lock_ttl_ms: u64,
    /// 历史查询默认条数
    history_page_size: usize,
}

impl Default for RawBoothConfig {
    fn default() -> Self {
        Self {
            // 正常一次 advance 毫秒级完成；TTL 限定崩溃后别的实例
            // 最多等多久就能接管
            lock_ttl_ms: 2000,
            history_page_size: 25,
        }
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            ephemeral_url: "".to_string(),
            node_id: 1,
            booth: RawBoothConfig::default(),
        }
    }
}

/// 点播台配置
#[derive(Debug, Clone)]
pub struct BoothConfig {
    pub lock_ttl: Duration,
    pub history_page_size: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfigImpl {
    pub ephemeral_url: Arc<RwLock<String>>,
    pub node_id: i64,
    pub booth: Arc<RwLock<BoothConfig>>,
}

impl AppConfigImpl {
    fn new(data: RawConfig) -> Self {
        let booth_config = BoothConfig {
            lock_ttl: Duration::from_millis(data.booth.lock_ttl_ms),
            history_page_size: data.booth.history_page_size,
        };
        AppConfigImpl {
            ephemeral_url: Arc::new(RwLock::new(data.ephemeral_url)),
            node_id: data.node_id,
            booth: Arc::new(RwLock::new(booth_config)),
        }
    }

    pub fn load() -> Result<AppConfigImpl, Box<dyn Error>> {
        dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("UWAVE").separator("__"))
            .build()?;

        let raw: RawConfig = config.try_deserialize()?; // serde 自动填充默认值
        Ok(AppConfigImpl::new(raw))
    }

    /// 临时存储连接串；空串表示没配
    pub fn ephemeral_url(&self) -> Option<String> {
        let cfg_val = self.ephemeral_url.read().unwrap();
        if cfg_val.is_empty() {
            None
        } else {
            Some(cfg_val.clone())
        }
    }

    pub fn booth(&self) -> BoothConfig {
        let cfg_val = self.booth.read().unwrap();
        cfg_val.clone()
    }
}
