// 上传引擎
//
// 核心功能：
// 1. 小文件整体上传到分配好的文件ID
// 2. 大文件按分片阈值顺序切片，每个分片单独分配文件ID上传，
//    最后把分片清单（cm=true）写入顶层文件ID
// 3. 任一分片或清单写入失败时，并发删除已上传的分片（补偿删除），
//    返回最初的错误
//
// 并发策略：
// - 分片上传严格顺序进行（共用同一个数据源）
// - 补偿删除使用 JoinSet 并发执行，结果按索引写入预分配的槽位

use crate::cluster::{
    client::decode_response, AssignArgs, AssignResult, HttpResponse, Params, SeaweedClient,
    SubmitResult, UploadRequest, UploadResult,
};
use crate::config::ClientConfig;
use crate::error::{Result, SeaweedError};
use crate::uploader::chunk::{ChunkPlan, CHUNK_MIME_TYPE};
use crate::uploader::file_part::{base_name, FilePart};
use crate::uploader::manifest::{ChunkInfo, ChunkManifest, MANIFEST_MIME_TYPE};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 一次上传的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// 顶层文件ID
    pub file_id: String,
    /// 写入的服务器
    pub server: String,
    /// 完整访问地址
    pub url: String,
    /// 服务端记录的大小（分片上传时为各分片之和）
    pub size: u64,
    /// 分片上传时的清单
    pub manifest: Option<ChunkManifest>,
}

impl UploadOutcome {
    pub fn is_chunked(&self) -> bool {
        self.manifest.is_some()
    }
}

/// 检查上传响应，返回服务端记录的结果
fn check_upload_response(url: &str, response: &HttpResponse) -> Result<UploadResult> {
    let result: UploadResult = decode_response("上传", url, response)?;

    if !result.error.is_empty() {
        return Err(SeaweedError::Upload {
            url: url.to_string(),
            message: result.error,
        });
    }
    if !response.is_success() {
        return Err(SeaweedError::Upload {
            url: url.to_string(),
            message: format!("状态码 {}", response.status),
        });
    }
    Ok(result)
}

// =====================================================
// 上传引擎
// =====================================================

/// 上传引擎
///
/// 克隆开销很小，批量上传时每个任务持有一份
#[derive(Debug, Clone)]
pub struct UploadEngine {
    /// 集群客户端
    client: SeaweedClient,
    /// 分片阈值（0 表示不分片）
    chunk_size: u64,
}

impl UploadEngine {
    /// 创建上传引擎
    ///
    /// # 参数
    /// * `client` - 集群客户端
    /// * `chunk_size` - 分片阈值，超过该大小的文件分片上传（0 表示不分片）
    pub fn new(client: SeaweedClient, chunk_size: u64) -> Self {
        Self { client, chunk_size }
    }

    /// 按配置创建客户端和上传引擎
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let client = SeaweedClient::new(config)?;
        Ok(Self::new(client, config.chunk_size))
    }

    pub fn client(&self) -> &SeaweedClient {
        &self.client
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// 上传一个文件
    ///
    /// # 上传流程
    /// 1. 没有文件ID时先分配；没有服务器时按文件ID查询主副本
    /// 2. 文件不超过分片阈值：整体上传
    /// 3. 否则顺序上传各分片，再写入分片清单
    ///
    /// reader 在返回前释放
    pub async fn upload_file_part(&self, part: FilePart) -> Result<UploadOutcome> {
        let FilePart {
            mut reader,
            file_name,
            file_size,
            is_gzipped,
            mime_type,
            mod_time,
            collection,
            ttl,
            server,
            file_id,
        } = part;

        // 1. 确定文件ID和服务器
        let (file_id, server) = match file_id {
            Some(file_id) => (file_id, server),
            None => {
                let assign = self.client.assign(&AssignArgs::new(&collection, &ttl)).await?;
                (assign.file_id, Some(assign.url))
            }
        };
        let server = match server.filter(|s| !s.is_empty()) {
            Some(server) => server,
            None => {
                self.client
                    .resolve_server_for_file(&file_id, &Params::collection(&collection), false)
                    .await?
            }
        };

        let name = base_name(&file_name);
        let url = self.client.make_url(&server, &file_id, &Params::new())?;
        let plan = ChunkPlan::new(file_size, self.chunk_size);

        info!(
            "开始上传: name={}, fid={}, server={}, size={}, 分片={}",
            name,
            file_id,
            server,
            file_size,
            if plan.is_chunked() { plan.chunk_count() } else { 0 }
        );

        // 2. 整体上传
        if !plan.is_chunked() {
            let mut params = Params::new();
            if mod_time != 0 {
                params.set("ts", mod_time.to_string());
            }
            let target = self.client.make_url(&server, &file_id, &params)?;
            let request = UploadRequest {
                url: &target,
                file_name: &name,
                mime_type: &mime_type,
                is_gzipped,
            };
            let response = self.client.transport().upload(request, &mut *reader).await?;
            let result = check_upload_response(&target, &response)?;

            info!("上传完成: fid={}, size={}", file_id, result.size);
            return Ok(UploadOutcome {
                file_id,
                server,
                url,
                size: result.size,
                manifest: None,
            });
        }

        // 3. 分片上传
        let mut manifest = ChunkManifest::new(name.as_str(), mime_type.as_str(), file_size);
        let cleanup_args = Params::collection(&collection);
        let mut source = BufReader::new(reader);

        for chunk in plan.data_chunks() {
            let chunk_name = chunk.name(&name);
            // 数据源比声明的大小短：不再为空分片分配文件ID
            let uploaded = match source.fill_buf().await.map(|buf| buf.is_empty()) {
                Ok(true) => Err(SeaweedError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("数据源提前结束: 已读取 {} / {} 字节", chunk.offset(), file_size),
                ))),
                Ok(false) => {
                    self.upload_chunk(&mut source, &chunk_name, &collection, &ttl)
                        .await
                }
                Err(e) => Err(e.into()),
            };
            match uploaded {
                Ok((assign, size)) => {
                    debug!(
                        "分片 #{} 上传完成: fid={}, offset={}, size={}",
                        chunk.index,
                        assign.file_id,
                        chunk.offset(),
                        size
                    );
                    manifest.chunks.push(ChunkInfo {
                        file_id: assign.file_id,
                        offset: chunk.offset(),
                        size,
                    });
                }
                Err(e) => {
                    error!("分片 #{} 上传失败: name={}, 错误: {}", chunk.index, chunk_name, e);
                    self.cleanup_chunks(&manifest, &cleanup_args).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self
            .upload_manifest(&server, &file_id, mod_time, &manifest)
            .await
        {
            error!("分片清单写入失败: fid={}, 错误: {}", file_id, e);
            self.cleanup_chunks(&manifest, &cleanup_args).await;
            return Err(e);
        }

        info!(
            "分片上传完成: fid={}, 分片数={}, size={}",
            file_id,
            manifest.chunks.len(),
            manifest.chunks_size()
        );
        Ok(UploadOutcome {
            file_id,
            server,
            url,
            size: manifest.chunks_size(),
            manifest: Some(manifest),
        })
    }

    /// 上传一个分片：单独分配文件ID，从数据源读取至多 chunk_size 字节
    ///
    /// # 返回
    /// (分配结果, 服务端记录的分片大小)
    async fn upload_chunk(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        chunk_name: &str,
        collection: &str,
        ttl: &str,
    ) -> Result<(AssignResult, u64)> {
        let assign = self.client.assign(&AssignArgs::new(collection, ttl)).await?;
        let url = self
            .client
            .make_url(&assign.url, &assign.file_id, &Params::new())?;

        let mut limited = reader.take(self.chunk_size);
        let request = UploadRequest {
            url: &url,
            file_name: chunk_name,
            mime_type: CHUNK_MIME_TYPE,
            is_gzipped: false,
        };
        let response = self.client.transport().upload(request, &mut limited).await?;
        let result = check_upload_response(&url, &response)?;

        Ok((assign, result.size))
    }

    /// 把分片清单写入顶层文件ID
    async fn upload_manifest(
        &self,
        server: &str,
        file_id: &str,
        mod_time: i64,
        manifest: &ChunkManifest,
    ) -> Result<()> {
        let body = manifest.to_json()?;

        let mut params = Params::new().with("cm", "true");
        if mod_time != 0 {
            params.set("ts", mod_time.to_string());
        }
        let url = self.client.make_url(server, file_id, &params)?;

        let request = UploadRequest {
            url: &url,
            file_name: &manifest.name,
            mime_type: MANIFEST_MIME_TYPE,
            is_gzipped: false,
        };
        let response = self
            .client
            .transport()
            .upload(request, &mut body.as_slice())
            .await?;
        check_upload_response(&url, &response)?;
        Ok(())
    }

    /// 补偿删除，失败只记录日志
    async fn cleanup_chunks(&self, manifest: &ChunkManifest, args: &Params) {
        if manifest.chunks.is_empty() {
            return;
        }
        warn!("补偿删除已上传的 {} 个分片", manifest.chunks.len());
        if let Err(e) = self.delete_chunks(manifest, args).await {
            warn!("补偿删除分片失败: {}", e);
        }
    }

    /// 并发删除清单中的全部分片
    ///
    /// 所有删除任务结束后返回；任一分片删除失败时返回 `ChunkCleanup`，
    /// 其中列出每个失败分片的文件ID和错误
    pub async fn delete_chunks(&self, manifest: &ChunkManifest, args: &Params) -> Result<()> {
        let total = manifest.chunks.len();
        if total == 0 {
            return Ok(());
        }

        // 预分配槽位：任务异常退出时保留默认错误
        let mut slots: Vec<Option<String>> = vec![Some("删除任务异常退出".to_string()); total];
        let mut join_set: JoinSet<(usize, Result<()>)> = JoinSet::new();

        for (index, chunk) in manifest.chunks.iter().enumerate() {
            let client = self.client.clone();
            let file_id = chunk.file_id.clone();
            let args = args.clone();
            join_set.spawn(async move { (index, client.delete_file(&file_id, &args).await) });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    slots[index] = result.err().map(|e| e.to_string());
                }
                Err(e) => error!("删除分片任务异常: {}", e),
            }
        }

        let errors: Vec<(String, String)> = manifest
            .chunks
            .iter()
            .zip(slots)
            .filter_map(|(chunk, slot)| slot.map(|message| (chunk.file_id.clone(), message)))
            .collect();

        if errors.is_empty() {
            debug!("删除 {} 个分片完成", total);
            return Ok(());
        }

        Err(SeaweedError::ChunkCleanup {
            failed: errors.len(),
            total,
            errors,
        })
    }

    // =====================================================
    // 便捷接口
    // =====================================================

    /// 上传任意数据源
    pub async fn upload(
        &self,
        reader: impl AsyncRead + Send + Unpin + 'static,
        file_name: &str,
        file_size: u64,
        collection: &str,
        ttl: &str,
    ) -> Result<UploadOutcome> {
        let part = FilePart::from_reader(reader, file_name, file_size)
            .with_collection(collection)
            .with_ttl(ttl);
        self.upload_file_part(part).await
    }

    /// 上传本地文件
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        collection: &str,
        ttl: &str,
    ) -> Result<UploadOutcome> {
        let part = FilePart::from_path(path)
            .await?
            .with_collection(collection)
            .with_ttl(ttl);
        self.upload_file_part(part).await
    }

    /// 通过 master 的 `/submit` 接口直接上传（由 master 分配文件ID）
    pub async fn submit_file_part(&self, part: FilePart, args: &Params) -> Result<SubmitResult> {
        let FilePart {
            mut reader,
            file_name,
            is_gzipped,
            mime_type,
            collection,
            ttl,
            ..
        } = part;

        let mut params = args.clone();
        params.set("collection", collection);
        params.set("ttl", ttl);
        let url = self
            .client
            .make_url(self.client.master(), "/submit", &params)?;

        let name = base_name(&file_name);
        let request = UploadRequest {
            url: &url,
            file_name: &name,
            mime_type: &mime_type,
            is_gzipped,
        };
        let response = self.client.transport().upload(request, &mut *reader).await?;
        let mut result: SubmitResult = decode_response("提交文件", &url, &response)?;

        if let Some(message) = result.error.take().filter(|e| !e.is_empty()) {
            return Err(SeaweedError::Upload { url, message });
        }
        if result.file_name.is_empty() {
            result.file_name = file_name;
        }

        info!("提交文件完成: name={}, fid={}", result.file_name, result.file_id);
        Ok(result)
    }

    /// 提交本地文件
    pub async fn submit(
        &self,
        path: impl AsRef<Path>,
        collection: &str,
        ttl: &str,
    ) -> Result<SubmitResult> {
        let part = FilePart::from_path(path)
            .await?
            .with_collection(collection)
            .with_ttl(ttl);
        self.submit_file_part(part, &Params::new()).await
    }

    /// 用新内容替换已有文件ID
    ///
    /// # 参数
    /// * `part` - 必须带有 file_id
    /// * `delete_first` - 先删除旧内容（删除失败只记录日志）
    ///
    /// # 返回
    /// 文件ID
    pub async fn replace_file_part(&self, part: FilePart, delete_first: bool) -> Result<String> {
        let file_id = part
            .file_id
            .clone()
            .ok_or_else(|| SeaweedError::InvalidFileId(String::new()))?;

        if delete_first {
            if let Err(e) = self
                .client
                .delete_file(&file_id, &Params::collection(&part.collection))
                .await
            {
                warn!("替换前删除旧文件失败: fid={}, 错误: {}", file_id, e);
            }
        }

        let outcome = self.upload_file_part(part).await?;
        Ok(outcome.file_id)
    }

    /// 用任意数据源替换已有文件ID
    #[allow(clippy::too_many_arguments)]
    pub async fn replace(
        &self,
        file_id: &str,
        reader: impl AsyncRead + Send + Unpin + 'static,
        file_name: &str,
        file_size: u64,
        collection: &str,
        ttl: &str,
        delete_first: bool,
    ) -> Result<String> {
        let part = FilePart::from_reader(reader, file_name, file_size)
            .with_collection(collection)
            .with_ttl(ttl)
            .with_file_id(file_id);
        self.replace_file_part(part, delete_first).await
    }

    /// 用本地文件替换已有文件ID
    pub async fn replace_file(
        &self,
        file_id: &str,
        path: impl AsRef<Path>,
        delete_first: bool,
    ) -> Result<String> {
        let part = FilePart::from_path(path).await?.with_file_id(file_id);
        self.replace_file_part(part, delete_first).await
    }
}
