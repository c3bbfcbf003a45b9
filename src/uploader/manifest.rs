// 分片清单
//
// 大文件分片上传后，顶层文件ID保存的是一份 JSON 清单：
// {"name":"big.bin","mime":"application/octet-stream","size":12345,
//  "chunks":[{"fid":"3,01","offset":0,"size":8192}, ...]}
//
// 写入时总是明文 JSON；读取时可能是 gzip 压缩过的
// 服务端不保证 chunks 的顺序，读取后按 offset 重新排序

use crate::error::{Result, SeaweedError};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::warn;

/// 分片清单的内容类型
pub const MANIFEST_MIME_TYPE: &str = "application/json";

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// 单个分片
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// 分片文件ID
    #[serde(default, rename = "fid")]
    pub file_id: String,
    /// 在原文件中的偏移
    #[serde(default)]
    pub offset: u64,
    /// 服务端记录的分片大小
    #[serde(default)]
    pub size: u64,
}

/// 分片清单
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, rename = "mime", skip_serializing_if = "String::is_empty")]
    pub mime_type: String,

    /// 原文件总大小
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkInfo>,
}

impl ChunkManifest {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            chunks: Vec::new(),
        }
    }

    /// 按 offset 升序排列分片
    pub fn sort_chunks(&mut self) {
        self.chunks.sort_by_key(|c| c.offset);
    }

    /// 分片大小之和
    pub fn chunks_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }

    /// 校验总大小与分片大小之和是否一致
    pub fn validate(&self) -> Result<()> {
        let actual = self.chunks_size();
        if actual != self.size {
            return Err(SeaweedError::ManifestSizeMismatch {
                declared: self.size,
                actual,
            });
        }
        Ok(())
    }

    /// 序列化为 JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| SeaweedError::decode("分片清单", &[], source))
    }
}

/// 解析分片清单
///
/// # 参数
/// * `buffer` - 清单内容
/// * `is_gzipped` - 内容是否经过 gzip 压缩
///
/// # 返回
/// 分片按 offset 排好序的清单
pub fn load_chunk_manifest(buffer: &[u8], is_gzipped: bool) -> Result<ChunkManifest> {
    let mut manifest: ChunkManifest = if is_gzipped {
        let mut plain = Vec::new();
        GzDecoder::new(buffer).read_to_end(&mut plain)?;
        serde_json::from_slice(&plain).map_err(|source| SeaweedError::decode("分片清单", &plain, source))?
    } else {
        serde_json::from_slice(buffer).map_err(|source| SeaweedError::decode("分片清单", buffer, source))?
    };

    manifest.sort_chunks();

    if let Err(e) = manifest.validate() {
        warn!("分片清单 {} 大小不一致: {}", manifest.name, e);
    }

    Ok(manifest)
}
