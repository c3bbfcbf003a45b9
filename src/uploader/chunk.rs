// 上传分片规划
//
// 分片规则：
// - chunk_size 为 0 或文件 <= chunk_size：不分片，整体上传
// - 否则规划 file_size / chunk_size + 1 个分片，第 i 个分片起始于 i * chunk_size
//   文件大小恰好是 chunk_size 整数倍时最后一个分片长度为 0，不会上传
// - 数据从同一个源按顺序读取，每个分片最多读取 chunk_size 字节

use std::ops::Range;
use tracing::debug;

/// 分片数据的内容类型
pub const CHUNK_MIME_TYPE: &str = "application/octet-stream";

/// 规划出的一个分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    /// 分片索引
    pub index: usize,
    /// 在原文件中的字节范围
    pub range: Range<u64>,
}

impl PlannedChunk {
    pub fn new(index: usize, range: Range<u64>) -> Self {
        Self { index, range }
    }

    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn offset(&self) -> u64 {
        self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// 分片上传时使用的文件名: `{base}_{index+1}`
    pub fn name(&self, base_name: &str) -> String {
        format!("{}_{}", base_name, self.index + 1)
    }
}

/// 分片规划
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    chunks: Vec<PlannedChunk>,
    file_size: u64,
    chunk_size: u64,
    chunked: bool,
}

impl ChunkPlan {
    /// 是否需要分片上传
    pub fn needs_chunking(file_size: u64, chunk_size: u64) -> bool {
        chunk_size > 0 && file_size > chunk_size
    }

    /// 创建分片规划
    ///
    /// # 参数
    /// * `file_size` - 文件大小
    /// * `chunk_size` - 分片阈值（0 表示不分片）
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        if !Self::needs_chunking(file_size, chunk_size) {
            return Self {
                chunks: vec![PlannedChunk::new(0, 0..file_size)],
                file_size,
                chunk_size,
                chunked: false,
            };
        }

        let count = file_size / chunk_size + 1;
        let chunks: Vec<PlannedChunk> = (0..count)
            .map(|i| {
                let start = i * chunk_size;
                let end = std::cmp::min(start + chunk_size, file_size);
                PlannedChunk::new(i as usize, start..end.max(start))
            })
            .collect();

        debug!(
            "创建分片规划: 文件大小={} bytes, 分片大小={} bytes, 分片数量={}",
            file_size,
            chunk_size,
            chunks.len()
        );

        Self {
            chunks,
            file_size,
            chunk_size,
            chunked: true,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// 规划的分片数量（包括长度为 0 的尾分片）
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[PlannedChunk] {
        &self.chunks
    }

    /// 需要实际上传的分片
    pub fn data_chunks(&self) -> impl Iterator<Item = &PlannedChunk> {
        self.chunks.iter().filter(|c| !c.is_empty())
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_unit() {
        let plan = ChunkPlan::new(100, 0);
        assert!(!plan.is_chunked());
        assert_eq!(plan.chunk_count(), 1);

        let plan = ChunkPlan::new(100, 100);
        assert!(!plan.is_chunked());
        assert_eq!(plan.chunks()[0].range, 0..100);
    }

    #[test]
    fn test_chunk_calculation() {
        // 不完整尾分片
        let plan = ChunkPlan::new(11, 5);
        assert!(plan.is_chunked());
        assert_eq!(plan.chunk_count(), 3);
        assert_eq!(plan.chunks()[2].range, 10..11);
        assert_eq!(plan.data_chunks().count(), 3);

        // 整数倍：尾分片为空
        let plan = ChunkPlan::new(10, 5);
        assert_eq!(plan.chunk_count(), 3);
        assert!(plan.chunks()[2].is_empty());
        assert_eq!(plan.chunks()[2].offset(), 10);
        assert_eq!(plan.data_chunks().count(), 2);
    }

    #[test]
    fn test_chunk_name() {
        let plan = ChunkPlan::new(11, 5);
        assert_eq!(plan.chunks()[0].name("big.bin"), "big.bin_1");
        assert_eq!(plan.chunks()[2].name("big.bin"), "big.bin_3");
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_file(size in 1u64..1_000_000, threshold in 1u64..10_000) {
            prop_assume!(size > threshold);
            let plan = ChunkPlan::new(size, threshold);

            prop_assert_eq!(plan.chunk_count() as u64, size / threshold + 1);
            for (i, chunk) in plan.chunks().iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.offset(), i as u64 * threshold);
                prop_assert!(chunk.size() <= threshold);
            }

            let covered: u64 = plan.data_chunks().map(|c| c.size()).sum();
            prop_assert_eq!(covered, size);
            // 只有最后一个分片可能为空
            prop_assert!(plan.chunks()[..plan.chunk_count() - 1].iter().all(|c| !c.is_empty()));
        }
    }
}
