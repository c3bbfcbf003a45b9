//! 日志系统配置
//!
//! 支持控制台输出和文件持久化，日志文件按天滚动，启动时清理过期日志

use crate::config::LogConfig;
use chrono::Local;
use std::fs;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀，滚动后的文件名为 `seaweedfs-rust.log.YYYY-MM-DD`
pub const LOG_FILE_PREFIX: &str = "seaweedfs-rust.log";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志系统守卫
/// 必须保持存活，否则日志写入线程会终止
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// # Arguments
/// * `config` - 日志配置
///
/// # Returns
/// * `LogGuard` - 日志守卫，需要保持存活直到程序结束
pub fn init_logging(config: &LogConfig) -> LogGuard {
    // RUST_LOG 优先于配置中的级别
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(true);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard { _file_guard: None };
    }

    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        eprintln!("创建日志目录失败: {:?}, 错误: {}", config.log_dir, e);
        // 回退到只使用控制台输出
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return LogGuard { _file_guard: None };
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    // 文件输出层（不带 ANSI 颜色）
    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}",
        config.log_dir, config.retention_days, config.level
    );

    let deleted = cleanup_old_logs(&config.log_dir, config.retention_days);
    if deleted > 0 {
        info!("已清理 {} 个过期日志文件", deleted);
    }

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

/// 清理过期日志文件，返回删除数量
///
/// 文件名中带日期的按日期判断，否则按修改时间判断
fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> usize {
    let today = Local::now().date_naive();
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let mut deleted_count = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let filename = match path.file_name().and_then(|s| s.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !filename.starts_with(LOG_FILE_PREFIX) {
            continue;
        }

        let expired = match extract_date_from_filename(filename) {
            Some(date) => today.signed_duration_since(date) > retention,
            None => expired_by_modified_time(&entry, retention),
        };

        if expired {
            match fs::remove_file(&path) {
                Ok(()) => {
                    deleted_count += 1;
                    tracing::debug!("已删除过期日志文件: {:?}", path);
                }
                Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
            }
        }
    }

    deleted_count
}

/// 从 `seaweedfs-rust.log.YYYY-MM-DD` 中提取日期
fn extract_date_from_filename(filename: &str) -> Option<chrono::NaiveDate> {
    let date = filename.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// 根据文件修改时间检查是否过期
fn expired_by_modified_time(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    entry
        .metadata()
        .and_then(|m| m.modified())
        .map(|modified| {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            chrono::Utc::now().signed_duration_since(modified) > retention
        })
        .unwrap_or(false)
}
