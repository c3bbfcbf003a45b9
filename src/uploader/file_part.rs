// 待上传文件描述
//
// FilePart 持有数据源 reader，只能被上传流程消费一次，
// 上传结束（无论成功失败）后 reader 随 FilePart 一起释放

use crate::cluster::BoxedReader;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::debug;

/// 待上传文件
pub struct FilePart {
    /// 数据源
    pub reader: BoxedReader,
    /// 文件名（可以带路径，上传时只取文件名部分）
    pub file_name: String,
    /// 声明的文件大小，用于决定是否分片
    pub file_size: u64,
    /// 内容是否已经 gzip 压缩
    pub is_gzipped: bool,
    /// 内容类型（空字符串表示不设置）
    pub mime_type: String,
    /// 修改时间（unix 秒，0 表示未知）
    pub mod_time: i64,
    pub collection: String,
    pub ttl: String,
    /// 已分配的服务器
    pub server: Option<String>,
    /// 已分配的文件ID（替换已有文件时由调用方给出）
    pub file_id: Option<String>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("file_name", &self.file_name)
            .field("file_size", &self.file_size)
            .field("is_gzipped", &self.is_gzipped)
            .field("mime_type", &self.mime_type)
            .field("mod_time", &self.mod_time)
            .field("collection", &self.collection)
            .field("ttl", &self.ttl)
            .field("server", &self.server)
            .field("file_id", &self.file_id)
            .finish()
    }
}

impl FilePart {
    /// 从任意 reader 创建
    ///
    /// # 参数
    /// * `reader` - 数据源
    /// * `file_name` - 文件名
    /// * `file_size` - 数据大小
    pub fn from_reader(
        reader: impl AsyncRead + Send + Unpin + 'static,
        file_name: impl Into<String>,
        file_size: u64,
    ) -> Self {
        let file_name = file_name.into();
        let mime_type = guess_mime_type(&file_name).to_string();
        Self {
            reader: Box::new(reader),
            file_name,
            file_size,
            is_gzipped: false,
            mime_type,
            mod_time: 0,
            collection: String::new(),
            ttl: String::new(),
            server: None,
            file_id: None,
        }
    }

    /// 从本地文件创建
    ///
    /// `.gz` 文件按已压缩内容上传，内容类型取去掉 `.gz` 后的扩展名
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;

        let file_name = path.to_string_lossy().to_string();
        let is_gzipped = file_name.to_lowercase().ends_with(".gz");
        let mime_source = if is_gzipped {
            &file_name[..file_name.len() - 3]
        } else {
            file_name.as_str()
        };
        let mime_type = guess_mime_type(mime_source).to_string();

        let mod_time = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp())
            .unwrap_or(0);

        debug!(
            "打开上传文件: {:?}, 大小={} bytes, gzip={}",
            path,
            metadata.len(),
            is_gzipped
        );

        Ok(Self {
            reader: Box::new(file),
            file_name,
            file_size: metadata.len(),
            is_gzipped,
            mime_type,
            mod_time,
            collection: String::new(),
            ttl: String::new(),
            server: None,
            file_id: None,
        })
    }

    /// 批量打开本地文件
    pub async fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Self>> {
        let mut parts = Vec::with_capacity(paths.len());
        for path in paths {
            parts.push(Self::from_path(path).await?);
        }
        Ok(parts)
    }

    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = collection.to_string();
        self
    }

    pub fn with_ttl(mut self, ttl: &str) -> Self {
        self.ttl = ttl.to_string();
        self
    }

    /// 上传到已有的文件ID
    pub fn with_file_id(mut self, file_id: &str) -> Self {
        self.file_id = Some(file_id.to_string());
        self
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = mime_type.to_string();
        self
    }

    pub fn with_mod_time(mut self, mod_time: i64) -> Self {
        self.mod_time = mod_time;
        self
    }

    /// 不带目录的文件名
    pub fn base_name(&self) -> String {
        base_name(&self.file_name)
    }
}

/// 取路径最后一段（同时支持 `/` 与 `\` 分隔）
pub fn base_name(file_name: &str) -> String {
    file_name
        .rsplit(|c| c == '/' || c == '\\')
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

/// 根据扩展名猜测内容类型，未知返回空字符串
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let extension = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => return "",
    };

    match extension.as_str() {
        "txt" | "log" => "text/plain; charset=utf-8",
        "htm" | "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "xml" => "text/xml; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "",
    }
}
