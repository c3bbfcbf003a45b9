// 批量上传
//
// 一批文件共用一次分配：第一个文件使用分配到的文件ID，
// 第 i 个文件（i >= 1）使用 `{fid}_{i}`，都写入同一台服务器
// 每个文件一个并发任务，单个文件失败只记录在自己的结果槽位中

use crate::cluster::{AssignArgs, AssignResult, SubmitResult};
use crate::error::BatchUploadError;
use crate::uploader::engine::UploadEngine;
use crate::uploader::file_part::FilePart;
use std::path::Path;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// 批量上传中第 index 个文件的文件ID
pub fn derive_file_id(file_id: &str, index: usize) -> String {
    if index == 0 {
        file_id.to_string()
    } else {
        format!("{}_{}", file_id, index)
    }
}

/// 文件的对外访问地址: `{publicUrl}/{fid}`
///
/// master 没有返回 publicUrl 时退回写入服务器地址
fn public_file_url(assign: &AssignResult, file_id: &str) -> String {
    let host = if assign.public_url.is_empty() {
        warn!("分配结果缺少 publicUrl，使用写入地址: {}", assign.url);
        &assign.url
    } else {
        &assign.public_url
    };
    format!("{}/{}", host.trim_end_matches('/'), file_id)
}

impl UploadEngine {
    /// 并发上传一批文件
    ///
    /// # 参数
    /// * `files` - 待上传文件
    /// * `collection` - 集合
    /// * `ttl` - 过期时间
    ///
    /// # 返回
    /// 与输入顺序一一对应的结果；只有共用的分配失败时返回错误
    pub async fn batch_upload_file_parts(
        &self,
        files: Vec<FilePart>,
        collection: &str,
        ttl: &str,
    ) -> Result<Vec<SubmitResult>, BatchUploadError> {
        let mut results: Vec<SubmitResult> = files
            .iter()
            .map(|f| SubmitResult::named(f.file_name.as_str()))
            .collect();
        if files.is_empty() {
            return Ok(results);
        }

        let args = AssignArgs::new(collection, ttl).with_count(files.len() as u64);
        let assign = match self.client().assign(&args).await {
            Ok(assign) => assign,
            Err(e) => {
                error!("批量上传分配文件ID失败: {}", e);
                let message = e.to_string();
                for result in &mut results {
                    result.error = Some(message.clone());
                }
                return Err(BatchUploadError { source: e, results });
            }
        };

        info!(
            "开始批量上传: 文件数={}, fid={}, server={}",
            files.len(),
            assign.file_id,
            assign.url
        );

        let mut join_set = JoinSet::new();

        for (index, mut file) in files.into_iter().enumerate() {
            let file_id = derive_file_id(&assign.file_id, index);
            let slot = &mut results[index];
            slot.file_id = file_id.clone();
            slot.file_url = public_file_url(&assign, &file_id);
            slot.size = file.file_size;
            // 任务异常退出时保留该错误
            slot.error = Some("上传任务异常退出".to_string());

            file.file_id = Some(file_id);
            file.server = Some(assign.url.clone());
            file.collection = collection.to_string();
            file.ttl = ttl.to_string();

            let engine = self.clone();
            join_set.spawn(async move { (index, engine.upload_file_part(file).await) });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(outcome))) => {
                    results[index].size = outcome.size;
                    results[index].error = None;
                }
                Ok((index, Err(e))) => {
                    warn!("批量上传第 {} 个文件失败: {}", index, e);
                    results[index].error = Some(e.to_string());
                }
                Err(e) => error!("批量上传任务异常: {}", e),
            }
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!("批量上传完成: 成功={}, 失败={}", results.len() - failed, failed);
        Ok(results)
    }

    /// 批量上传本地文件
    pub async fn batch_upload_files<P: AsRef<Path>>(
        &self,
        paths: &[P],
        collection: &str,
        ttl: &str,
    ) -> Result<Vec<SubmitResult>, BatchUploadError> {
        match FilePart::from_paths(paths).await {
            Ok(files) => self.batch_upload_file_parts(files, collection, ttl).await,
            Err(e) => {
                let message = e.to_string();
                let results = paths
                    .iter()
                    .map(|p| SubmitResult {
                        error: Some(message.clone()),
                        ..SubmitResult::named(p.as_ref().to_string_lossy())
                    })
                    .collect();
                Err(BatchUploadError { source: e, results })
            }
        }
    }
}
