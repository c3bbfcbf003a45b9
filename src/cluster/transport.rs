// 集群 HTTP 传输层
//
// 客户端核心只依赖 ClusterTransport 提供的几个原语：
// - get / post_form：访问 master 的目录接口
// - upload：以 multipart 流式上传一段内容
// - delete：删除资源（200/202/404 都视为成功）
// - download：把响应体流式写入调用方提供的 writer
//
// HttpTransport 的上传采用"管道"模式：
// 一个 future 把源数据分块写入内存管道，另一个 future 以管道读端作为请求体发送，
// 两者并发推进，不需要把整个文件缓存到内存；
// 数据源读取失败时错误经管道传给请求体，请求被中止而不是以截断的内容正常结束

use crate::error::{Result, SeaweedError};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_ENCODING};
use reqwest::multipart;
use reqwest::Client;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// 每次从数据源读取的大小: 64KB
const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// 管道中最多排队的数据块
const PIPE_DEPTH: usize = 4;

/// 管道写端的结束原因
#[derive(Debug)]
enum PipeError {
    /// 读取数据源失败
    Read(std::io::Error),
    /// 请求端已结束，读端被关闭
    Closed,
}

/// 调用方持有的上传数据源
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// 原始 HTTP 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 一次 multipart 上传的描述
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// 目标地址
    pub url: &'a str,
    /// multipart 中的文件名
    pub file_name: &'a str,
    /// 内容类型（空字符串表示不设置）
    pub mime_type: &'a str,
    /// 内容是否已经 gzip 压缩
    pub is_gzipped: bool,
}

/// 集群访问原语
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// GET 请求
    async fn get(&self, url: &str) -> Result<HttpResponse>;

    /// 表单 POST 请求
    async fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<HttpResponse>;

    /// multipart 上传，从 reader 读取直到 EOF
    async fn upload(
        &self,
        request: UploadRequest<'_>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<HttpResponse>;

    /// 删除资源
    async fn delete(&self, url: &str) -> Result<()>;

    /// 下载资源到 writer，返回 Content-Disposition 中的文件名
    async fn download(
        &self,
        url: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Option<String>>;
}

/// 基于 reqwest 的传输实现
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// 创建传输层，所有请求共享同一个超时
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| SeaweedError::Transport {
                operation: "构建 HTTP 客户端",
                url: String::new(),
                source,
            })?;

        Ok(Self { client })
    }

    /// 使用已有的 reqwest 客户端
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn read_response(
        operation: &'static str,
        url: &str,
        response: reqwest::Response,
    ) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|source| SeaweedError::Transport {
                operation,
                url: url.to_string(),
                source,
            })?;

        debug!("{} 响应: url={}, status={}, {} bytes", operation, url, status, body.len());

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl ClusterTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SeaweedError::Transport {
                operation: "GET",
                url: url.to_string(),
                source,
            })?;

        Self::read_response("GET", url, response).await
    }

    async fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<HttpResponse> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|source| SeaweedError::Transport {
                operation: "POST",
                url: url.to_string(),
                source,
            })?;

        Self::read_response("POST", url, response).await
    }

    async fn upload(
        &self,
        request: UploadRequest<'_>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<HttpResponse> {
        let url = request.url;
        let (mut pipe_writer, pipe_reader) = mpsc::channel::<std::io::Result<Vec<u8>>>(PIPE_DEPTH);

        // 请求体从管道读端流式读取；读端收到错误时请求中止，不会发出完整的 multipart 结尾
        let body = reqwest::Body::wrap_stream(pipe_reader);
        let mut part = multipart::Part::stream(body).file_name(normalize_name(request.file_name));
        if !request.mime_type.is_empty() {
            part = part
                .mime_str(request.mime_type)
                .map_err(|source| SeaweedError::Transport {
                    operation: "构建上传请求",
                    url: url.to_string(),
                    source,
                })?;
        }
        if request.is_gzipped {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            part = part.headers(headers);
        }
        let form = multipart::Form::new().part("file", part);

        // 写端：分块读取源数据送入管道，读取失败时把错误也送入管道
        let encode = async move {
            let mut buffer = vec![0u8; PIPE_BUFFER_SIZE];
            let mut copied = 0u64;
            loop {
                let n = match reader.read(&mut buffer).await {
                    Ok(0) => return Ok(copied),
                    Ok(n) => n,
                    Err(e) => {
                        let forwarded = std::io::Error::new(e.kind(), e.to_string());
                        let _ = pipe_writer.send(Err(forwarded)).await;
                        return Err(PipeError::Read(e));
                    }
                };
                if pipe_writer.send(Ok(buffer[..n].to_vec())).await.is_err() {
                    return Err(PipeError::Closed);
                }
                copied += n as u64;
            }
        };

        // 读端：发送请求
        let send = async {
            let response = self
                .client
                .post(url)
                .multipart(form)
                .send()
                .await
                .map_err(|source| SeaweedError::Transport {
                    operation: "上传",
                    url: url.to_string(),
                    source,
                })?;
            Self::read_response("上传", url, response).await
        };

        let (encoded, sent) = tokio::join!(encode, send);
        match (encoded, sent) {
            (Ok(copied), Ok(response)) => {
                debug!("上传完成: url={}, 发送 {} bytes", url, copied);
                Ok(response)
            }
            // 请求端先结束（失败或服务端提前应答）导致管道关闭：以请求结果为准
            (Err(PipeError::Closed), sent) => sent,
            // 读取源数据失败：请求已被中止，返回读取错误
            (Err(PipeError::Read(e)), _) => Err(SeaweedError::Upload {
                url: url.to_string(),
                message: format!("读取上传内容失败: {}", e),
            }),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|source| SeaweedError::Transport {
                operation: "DELETE",
                url: url.to_string(),
                source,
            })?;

        let response = Self::read_response("DELETE", url, response).await?;
        interpret_delete_response(url, &response)
    }

    async fn download(
        &self,
        url: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SeaweedError::Transport {
                operation: "下载",
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(SeaweedError::Download {
                url: url.to_string(),
                status,
            });
        }

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition);

        let mut stream = response.bytes_stream();
        let mut total = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| SeaweedError::Transport {
                operation: "下载",
                url: url.to_string(),
                source,
            })?;
            writer.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        writer.flush().await?;

        debug!("下载完成: url={}, {} bytes, filename={:?}", url, total, filename);
        Ok(filename)
    }
}

/// 解释删除响应
///
/// 200/202/404 视为成功（404 表示已经不存在，删除是幂等的）；
/// 其他状态码优先使用响应 JSON 中的 error 字段
pub(crate) fn interpret_delete_response(url: &str, response: &HttpResponse) -> Result<()> {
    match response.status {
        200 | 202 | 404 => Ok(()),
        status => {
            let message = serde_json::from_slice::<serde_json::Value>(&response.body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or_else(|| format!("状态码 {}，响应无法解析", status));

            Err(SeaweedError::Delete {
                target: url.to_string(),
                message,
            })
        }
    }
}

/// 从 Content-Disposition 中提取文件名（去掉引号）
pub(crate) fn parse_content_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|item| item.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

/// 只保留 [A-Za-z0-9._-] 字符
pub(crate) fn normalize_name(name: &str) -> String {
    let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
    if name.chars().all(valid) {
        return name.to_string();
    }
    name.chars().filter(|c| valid(*c)).collect()
}
