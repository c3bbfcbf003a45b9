// 客户端错误类型
//
// 对应集群交互中的几类失败：
// - 输入错误（文件ID格式不正确，不发起任何网络请求）
// - 文件不存在（卷查询返回 0 个位置）
// - 分配失败（count 为 0 或返回 error 字段）
// - 传输错误（网络、超时、非预期状态码）
// - 分片清理失败（补偿删除时部分分片未能删除）

use crate::cluster::SubmitResult;
use thiserror::Error;

/// 客户端统一结果类型
pub type Result<T> = std::result::Result<T, SeaweedError>;

/// 客户端错误
#[derive(Debug, Error)]
pub enum SeaweedError {
    /// 文件ID格式错误（无法拆分为 卷ID + 文件键）
    #[error("无效的文件ID: {0}")]
    InvalidFileId(String),

    /// 卷查询没有返回任何位置
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    /// 分配文件ID失败
    #[error("分配文件ID失败: {0}")]
    Assign(String),

    /// 卷查询返回 error 字段
    #[error("查询卷 {volume_id} 失败: {message}")]
    Lookup { volume_id: String, message: String },

    /// 网络层错误（连接失败、超时等）
    #[error("{operation} {url} 请求失败: {source}")]
    Transport {
        operation: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// 服务端返回非预期状态码
    #[error("{operation} {url} 返回状态码 {status}: {message}")]
    Status {
        operation: &'static str,
        url: String,
        status: u16,
        message: String,
    },

    /// 响应 JSON 解析失败
    #[error("解析 {endpoint} 响应失败: {source}, body={body}")]
    Decode {
        endpoint: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// 上传被服务端拒绝
    #[error("上传 {url} 失败: {message}")]
    Upload { url: String, message: String },

    /// 删除失败
    #[error("删除 {target} 失败: {message}")]
    Delete { target: String, message: String },

    /// 下载失败（非 200）
    #[error("下载 {url} 失败: 状态码 {status}")]
    Download { url: String, status: u16 },

    /// 补偿删除时部分分片删除失败
    #[error("未能删除全部分片: {failed}/{total} 个失败")]
    ChunkCleanup {
        failed: usize,
        total: usize,
        /// (分片文件ID, 错误信息)
        errors: Vec<(String, String)>,
    },

    /// 分片清单总大小与分片大小之和不一致
    #[error("分片清单大小不一致: size={declared}, 分片合计={actual}")]
    ManifestSizeMismatch { declared: u64, actual: u64 },

    /// 无法构造请求地址
    #[error("无效的地址: {0}")]
    InvalidUrl(String),

    /// 本地 I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 批量上传整体失败（共用的文件ID分配失败，或无法打开本地文件）
///
/// results 中每个槽位都带有同一个错误
#[derive(Debug, Error)]
#[error("批量上传失败: {source}")]
pub struct BatchUploadError {
    #[source]
    pub source: SeaweedError,
    pub results: Vec<SubmitResult>,
}

impl SeaweedError {
    /// 是否为"文件不存在"
    pub fn is_not_found(&self) -> bool {
        matches!(self, SeaweedError::FileNotFound(_))
    }

    /// 构造 JSON 解析错误
    pub(crate) fn decode(endpoint: impl Into<String>, body: &[u8], source: serde_json::Error) -> Self {
        SeaweedError::Decode {
            endpoint: endpoint.into(),
            body: String::from_utf8_lossy(body).chars().take(256).collect(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinguishable() {
        assert!(SeaweedError::FileNotFound("3,01637037d6".to_string()).is_not_found());
        assert!(!SeaweedError::InvalidFileId("3".to_string()).is_not_found());
        assert!(!SeaweedError::Lookup {
            volume_id: "3".to_string(),
            message: "volume id 3 not found".to_string(),
        }
        .is_not_found());
    }

    #[test]
    fn test_decode_truncates_body() {
        let body = vec![b'x'; 1024];
        let source = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        match SeaweedError::decode("/dir/assign", &body, source) {
            SeaweedError::Decode { endpoint, body, .. } => {
                assert_eq!(endpoint, "/dir/assign");
                assert_eq!(body.len(), 256);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
