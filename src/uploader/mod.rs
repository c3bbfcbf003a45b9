// 上传模块
//
// - chunk：分片规划
// - manifest：分片清单的序列化与解析
// - file_part：待上传文件描述
// - engine：整体/分片上传、补偿删除、替换、submit
// - batch：共用一次分配的并发批量上传

pub mod batch;
pub mod chunk;
pub mod engine;
pub mod file_part;
pub mod manifest;

pub use batch::derive_file_id;
pub use chunk::{ChunkPlan, PlannedChunk, CHUNK_MIME_TYPE};
pub use engine::{UploadEngine, UploadOutcome};
pub use file_part::{base_name, guess_mime_type, FilePart};
pub use manifest::{load_chunk_manifest, ChunkInfo, ChunkManifest, MANIFEST_MIME_TYPE};
