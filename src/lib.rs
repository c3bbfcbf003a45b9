// SeaweedFS Rust Client Library
// SeaweedFS 集群 Rust 客户端核心库

// 错误类型
pub mod error;

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 集群访问模块（目录接口、卷位置缓存、HTTP 传输）
pub mod cluster;

// 上传模块（分片、分片清单、补偿删除、批量上传）
pub mod uploader;

// 导出常用类型
pub use cluster::{
    AssignArgs, AssignResult, ClusterTransport, GrowArgs, HttpTransport, LocationCache,
    LookupResult, Params, SeaweedClient, SubmitResult, VolumeLocation,
};
pub use config::{AppConfig, ClientConfig, LogConfig};
pub use error::{BatchUploadError, Result, SeaweedError};
pub use uploader::{
    load_chunk_manifest, ChunkInfo, ChunkManifest, ChunkPlan, FilePart, UploadEngine,
    UploadOutcome,
};
