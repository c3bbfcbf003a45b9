// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

/// master 地址环境变量
pub const ENV_MASTER_URL: &str = "SEAWEEDFS_MASTER_URL";

/// 协议环境变量
pub const ENV_SCHEME: &str = "SEAWEEDFS_SCHEME";

/// 分片阈值环境变量（字节）
pub const ENV_CHUNK_SIZE: &str = "SEAWEEDFS_CHUNK_SIZE";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 集群客户端配置
    #[serde(default)]
    pub client: ClientConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 集群客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// master 地址（如 "localhost:9333"）
    #[serde(default = "default_master")]
    pub master: String,
    /// 协议（http / https）
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// 分片阈值（字节），超过该大小的文件分片上传，0 表示不分片
    #[serde(default)]
    pub chunk_size: u64,
    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 卷位置缓存时长（秒）
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_master() -> String {
    "localhost:9333".to_string()
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_cache_ttl_secs() -> u64 {
    10 * 60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            master: default_master(),
            scheme: default_scheme(),
            chunk_size: 0,
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.master.trim().is_empty() {
            anyhow::bail!("master 地址不能为空");
        }
        if self.scheme != "http" && self.scheme != "https" {
            anyhow::bail!("不支持的协议: {}（只支持 http / https）", self.scheme);
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("请求超时必须大于 0");
        }
        Ok(())
    }

    /// 使用环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(master) = lookup(ENV_MASTER_URL).filter(|v| !v.is_empty()) {
            self.master = master;
        }
        if let Some(scheme) = lookup(ENV_SCHEME).filter(|v| !v.is_empty()) {
            self.scheme = scheme;
        }
        if let Some(chunk_size) = lookup(ENV_CHUNK_SIZE) {
            match chunk_size.trim().parse::<u64>() {
                Ok(size) => self.chunk_size = size,
                Err(e) => warn!("忽略无效的 {}={}: {}", ENV_CHUNK_SIZE, chunk_size, e),
            }
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .client
            .validate()
            .context("配置文件中的客户端配置无效")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.client.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("配置已保存: {}", path);
        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                // 尝试保存默认配置
                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {}", e);
                }

                default_config
            }
        }
    }
}
