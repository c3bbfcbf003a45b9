// 测试用内存集群
//
// 模拟 master 的 assign / lookup 接口和 volume server 的上传、删除、下载，
// 记录每一次调用，支持按上传文件名注入失败和延迟

use crate::cluster::{ClusterTransport, HttpResponse, UploadRequest};
use crate::error::{Result, SeaweedError};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// 默认分配使用的卷
pub(crate) const ASSIGN_VOLUME: &str = "7";

/// 默认卷所在服务器
pub(crate) const ASSIGN_SERVER: &str = "vs1:8080";

/// 一次被记录的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Get(String),
    PostForm(String, Vec<(String, String)>),
    Upload {
        url: String,
        file_name: String,
        mime_type: String,
        body: Vec<u8>,
    },
    Delete(String),
    Download(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    volumes: HashMap<String, Vec<String>>,
    assign_error: Option<String>,
    failing_uploads: Vec<String>,
    failing_deletes: Vec<String>,
    upload_delays: HashMap<String, Duration>,
    stored: HashMap<String, Vec<u8>>,
}

/// 内存集群
pub(crate) struct MockTransport {
    state: Mutex<MockState>,
    next_key: AtomicU64,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        let mut state = MockState::default();
        state
            .volumes
            .insert(ASSIGN_VOLUME.to_string(), vec![ASSIGN_SERVER.to_string()]);
        Self {
            state: Mutex::new(state),
            next_key: AtomicU64::new(1),
        }
    }

    /// 注册一个卷及其副本地址
    pub(crate) fn with_volume(self, volume_id: &str, urls: &[&str]) -> Self {
        self.state.lock().unwrap().volumes.insert(
            volume_id.to_string(),
            urls.iter().map(|u| u.to_string()).collect(),
        );
        self
    }

    /// 之后所有 assign 返回错误
    pub(crate) fn fail_assign(&self, message: &str) {
        self.state.lock().unwrap().assign_error = Some(message.to_string());
    }

    /// multipart 文件名为 file_name 的上传返回错误
    pub(crate) fn fail_upload_named(&self, file_name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_uploads
            .push(file_name.to_string());
    }

    /// 删除 URL 中包含 pattern 的请求返回错误
    pub(crate) fn fail_delete_matching(&self, pattern: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .push(pattern.to_string());
    }

    /// 文件名为 file_name 的上传延迟返回
    pub(crate) fn delay_upload_named(&self, file_name: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .upload_delays
            .insert(file_name.to_string(), delay);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// 发往某个接口（路径后缀）的表单请求次数
    pub(crate) fn post_count(&self, endpoint: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::PostForm(url, _) if url.ends_with(endpoint)))
            .count()
    }

    /// 所有上传（按发生顺序）：(url, 文件名, 内容)
    pub(crate) fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload {
                    url,
                    file_name,
                    body,
                    ..
                } => Some((url, file_name, body)),
                _ => None,
            })
            .collect()
    }

    /// 所有删除请求的 URL
    pub(crate) fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn json(status: u16, value: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status,
            body: serde_json::to_vec(&value).unwrap(),
        }
    }

    fn strip_query(url: &str) -> String {
        url.split('?').next().unwrap_or(url).to_string()
    }

    fn locations(urls: &[String]) -> serde_json::Value {
        urls.iter()
            .map(|u| json!({ "url": u, "publicUrl": format!("pub-{}", u) }))
            .collect()
    }

    fn assign(&self, form: &[(String, String)]) -> HttpResponse {
        if let Some(message) = self.state.lock().unwrap().assign_error.clone() {
            return Self::json(200, json!({ "error": message }));
        }
        let count: u64 = form
            .iter()
            .find(|(k, _)| k == "count")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(1);
        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        Self::json(
            200,
            json!({
                "fid": format!("{},{:08x}", ASSIGN_VOLUME, key),
                "url": ASSIGN_SERVER,
                "publicUrl": format!("pub-{}", ASSIGN_SERVER),
                "count": count,
            }),
        )
    }

    fn lookup(&self, form: &[(String, String)]) -> HttpResponse {
        let volume_id = form
            .iter()
            .find(|(k, _)| k == "volumeId")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let state = self.state.lock().unwrap();
        match state.volumes.get(&volume_id) {
            Some(urls) => Self::json(
                200,
                json!({ "volumeId": volume_id, "locations": Self::locations(urls) }),
            ),
            None => Self::json(
                404,
                json!({ "volumeId": volume_id, "error": format!("volume id {} not found", volume_id) }),
            ),
        }
    }

    fn lookup_many(&self, form: &[(String, String)]) -> HttpResponse {
        let state = self.state.lock().unwrap();
        let mut found = serde_json::Map::new();
        for (_, volume_id) in form.iter().filter(|(k, _)| k == "volumeId") {
            if let Some(urls) = state.volumes.get(volume_id) {
                found.insert(
                    volume_id.clone(),
                    json!({ "volumeId": volume_id, "locations": Self::locations(urls) }),
                );
            }
        }
        Self::json(200, serde_json::Value::Object(found))
    }
}

#[async_trait]
impl ClusterTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.record(Call::Get(url.to_string()));
        let path = Self::strip_query(url);
        if path.ends_with("/dir/status") {
            return Ok(Self::json(
                200,
                json!({ "Topology": { "Free": 3, "Max": 7 }, "Version": "mock" }),
            ));
        }
        if path.ends_with("/cluster/status") {
            return Ok(Self::json(
                200,
                json!({ "IsLeader": true, "Leader": "localhost:9333", "Peers": [] }),
            ));
        }
        Ok(Self::json(200, json!({})))
    }

    async fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<HttpResponse> {
        self.record(Call::PostForm(url.to_string(), form.to_vec()));
        if url.ends_with("/dir/assign") {
            Ok(self.assign(form))
        } else if url.ends_with("/dir/lookup") {
            Ok(self.lookup(form))
        } else if url.ends_with("/vol/lookup") {
            Ok(self.lookup_many(form))
        } else {
            Ok(Self::json(404, json!({ "error": "unknown endpoint" })))
        }
    }

    async fn upload(
        &self,
        request: UploadRequest<'_>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<HttpResponse> {
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await?;

        self.record(Call::Upload {
            url: request.url.to_string(),
            file_name: request.file_name.to_string(),
            mime_type: request.mime_type.to_string(),
            body: body.clone(),
        });

        let (delay, fail) = {
            let state = self.state.lock().unwrap();
            (
                state.upload_delays.get(request.file_name).copied(),
                state.failing_uploads.iter().any(|n| n == request.file_name),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(SeaweedError::Upload {
                url: request.url.to_string(),
                message: "injected failure".to_string(),
            });
        }

        if Self::strip_query(request.url).ends_with("/submit") {
            let key = self.next_key.fetch_add(1, Ordering::SeqCst);
            let fid = format!("{},{:08x}", ASSIGN_VOLUME, key);
            return Ok(Self::json(
                201,
                json!({
                    "fileName": request.file_name,
                    "fileUrl": format!("pub-{}/{}", ASSIGN_SERVER, fid),
                    "fid": fid,
                    "size": body.len(),
                }),
            ));
        }

        let size = body.len();
        self.state
            .lock()
            .unwrap()
            .stored
            .insert(Self::strip_query(request.url), body);
        Ok(Self::json(
            201,
            json!({ "name": request.file_name, "size": size }),
        ))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.record(Call::Delete(url.to_string()));
        let fail = self
            .state
            .lock()
            .unwrap()
            .failing_deletes
            .iter()
            .any(|p| url.contains(p.as_str()));
        if fail {
            return Err(SeaweedError::Delete {
                target: url.to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.state
            .lock()
            .unwrap()
            .stored
            .remove(&Self::strip_query(url));
        Ok(())
    }

    async fn download(
        &self,
        url: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Option<String>> {
        self.record(Call::Download(url.to_string()));
        let body = self
            .state
            .lock()
            .unwrap()
            .stored
            .get(&Self::strip_query(url))
            .cloned();
        match body {
            Some(body) => {
                writer.write_all(&body).await?;
                writer.flush().await?;
                Ok(Some("stored.bin".to_string()))
            }
            None => Err(SeaweedError::Download {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
