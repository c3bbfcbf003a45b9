// 卷位置缓存
//
// 卷ID -> LookupResult，写入后固定时长过期
// 使用 DashMap 支持多个上传/查询任务并发读写，同一个键后写覆盖先写

use crate::cluster::LookupResult;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// 默认缓存时长: 10 分钟
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: LookupResult,
    expires_at: Instant,
}

/// 卷位置缓存
#[derive(Debug)]
pub struct LocationCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl LocationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// 缓存时长
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 读取未过期的缓存项，过期项顺带清除
    pub fn get(&self, volume_id: &str) -> Option<LookupResult> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(volume_id) {
            if entry.expires_at > now {
                return Some(entry.result.clone());
            }
        } else {
            return None;
        }

        // 过期：只删除仍然过期的那一项，避免误删并发写入的新值
        self.entries
            .remove_if(volume_id, |_, entry| entry.expires_at <= now);
        debug!("卷位置缓存过期: volume={}", volume_id);
        None
    }

    /// 写入缓存（覆盖旧值并重新计时）
    pub fn insert(&self, volume_id: impl Into<String>, result: LookupResult) {
        self.entries.insert(
            volume_id.into(),
            CacheEntry {
                result,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// 删除某个卷的缓存
    pub fn invalidate(&self, volume_id: &str) {
        self.entries.remove(volume_id);
    }

    /// 清理所有过期项，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
