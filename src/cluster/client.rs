// 集群客户端实现
//
// master 目录接口（assign / lookup / grow / vacuum / status）
// 以及基于文件ID的定位、删除、下载

use crate::cluster::{
    AssignResult, ClusterStatus, ClusterTransport, HttpResponse, HttpTransport, LocationCache,
    LookupResult, Params, SystemStatus,
};
use crate::config::ClientConfig;
use crate::error::{Result, SeaweedError};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

/// 分配文件ID的参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignArgs {
    pub collection: String,
    pub ttl: String,
    /// 预留的文件ID数量（0 按 1 处理）
    pub count: u64,
    pub replication: String,
    pub data_center: String,
}

impl AssignArgs {
    pub fn new(collection: &str, ttl: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ttl: ttl.to_string(),
            count: 1,
            ..Default::default()
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn to_params(&self) -> Params {
        Params::new()
            .with("collection", self.collection.as_str())
            .with("ttl", self.ttl.as_str())
            .with("count", self.count.max(1).to_string())
            .with("replication", self.replication.as_str())
            .with("dataCenter", self.data_center.as_str())
    }
}

/// 扩容卷的参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrowArgs {
    pub collection: String,
    pub replication: String,
    /// 新增卷数量（0 表示由 master 决定）
    pub count: u64,
    pub data_center: String,
    pub ttl: String,
}

impl GrowArgs {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new()
            .with("collection", self.collection.as_str())
            .with("replication", self.replication.as_str())
            .with("dataCenter", self.data_center.as_str())
            .with("ttl", self.ttl.as_str());
        if self.count > 0 {
            params.set("count", self.count.to_string());
        }
        params
    }
}

/// 拼接请求地址: `{scheme}://{host}/{path}?{params}`
///
/// host 已带协议时直接使用
pub fn make_url(scheme: &str, host: &str, path: &str, params: &Params) -> Result<String> {
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("{}://{}", scheme, host)
    };
    let mut url = Url::parse(&base).map_err(|e| SeaweedError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.set_path(&format!("/{}", path.trim_start_matches('/')));
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.as_slice());
    }
    Ok(url.to_string())
}

/// 拆分文件ID为 (卷ID, 文件键)
///
/// 支持 `3,01637037d6` 与 `3/01637037d6` 两种写法，必须恰好两段且都不为空
pub fn split_file_id(file_id: &str) -> Result<(&str, &str)> {
    let separator = if file_id.contains(',') { ',' } else { '/' };
    let parts: Vec<&str> = file_id.split(separator).collect();
    match parts.as_slice() {
        [volume_id, key] if !volume_id.is_empty() && !key.is_empty() => Ok((*volume_id, *key)),
        _ => Err(SeaweedError::InvalidFileId(file_id.to_string())),
    }
}

/// 解析 JSON 响应；无法解析时按状态码区分"状态码错误"与"格式错误"
pub(crate) fn decode_response<T: DeserializeOwned>(
    operation: &'static str,
    url: &str,
    response: &HttpResponse,
) -> Result<T> {
    match serde_json::from_slice::<T>(&response.body) {
        Ok(value) => Ok(value),
        Err(source) if response.is_success() => Err(SeaweedError::decode(url, &response.body, source)),
        Err(_) => Err(SeaweedError::Status {
            operation,
            url: url.to_string(),
            status: response.status,
            message: String::from_utf8_lossy(&response.body).chars().take(256).collect(),
        }),
    }
}

/// 管理类接口：2xx 视为成功，否则取 error 字段
fn check_admin_response(operation: &'static str, url: &str, response: &HttpResponse) -> Result<()> {
    let error = serde_json::from_slice::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .filter(|e| !e.is_empty());

    match error {
        None if response.is_success() => Ok(()),
        error => Err(SeaweedError::Status {
            operation,
            url: url.to_string(),
            status: response.status,
            message: error.unwrap_or_default(),
        }),
    }
}

/// 集群客户端
///
/// 克隆开销很小（传输层与缓存都是共享引用），可以放进并发任务
#[derive(Clone)]
pub struct SeaweedClient {
    scheme: String,
    master: String,
    transport: Arc<dyn ClusterTransport>,
    cache: Arc<LocationCache>,
}

impl fmt::Debug for SeaweedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeaweedClient")
            .field("scheme", &self.scheme)
            .field("master", &self.master)
            .field("cached_volumes", &self.cache.len())
            .finish()
    }
}

impl SeaweedClient {
    /// 按配置创建客户端（reqwest 传输层 + 独立的卷位置缓存）
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.timeout())?;
        info!(
            "初始化集群客户端: master={}://{}, 超时={:?}",
            config.scheme,
            config.master,
            config.timeout()
        );
        Ok(Self::with_parts(
            &config.scheme,
            &config.master,
            Arc::new(transport),
            Arc::new(LocationCache::new(config.cache_ttl())),
        ))
    }

    /// 使用指定的传输层和缓存
    ///
    /// # 参数
    /// * `scheme` - 协议（http / https）
    /// * `master` - master 地址（如 "localhost:9333"）
    /// * `transport` - 集群访问原语
    /// * `cache` - 卷位置缓存，可在多个客户端之间共享
    pub fn with_parts(
        scheme: &str,
        master: &str,
        transport: Arc<dyn ClusterTransport>,
        cache: Arc<LocationCache>,
    ) -> Self {
        Self {
            scheme: scheme.to_string(),
            master: master.to_string(),
            transport,
            cache,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    pub fn cache(&self) -> &Arc<LocationCache> {
        &self.cache
    }

    pub fn transport(&self) -> &Arc<dyn ClusterTransport> {
        &self.transport
    }

    /// 以客户端协议拼接地址
    pub fn make_url(&self, host: &str, path: &str, params: &Params) -> Result<String> {
        make_url(&self.scheme, host, path, params)
    }

    fn master_url(&self, path: &str, params: &Params) -> Result<String> {
        make_url(&self.scheme, &self.master, path, params)
    }

    // =====================================================
    // 分配
    // =====================================================

    /// 申请新的文件ID及其所在服务器
    ///
    /// count 为 0 或带 error 字段都视为失败
    pub async fn assign(&self, args: &AssignArgs) -> Result<AssignResult> {
        let url = self.master_url("/dir/assign", &Params::new())?;
        let form = args.to_params();
        let response = self.transport.post_form(&url, form.as_slice()).await?;
        let result: AssignResult = decode_response("分配文件ID", &url, &response)?;

        if !result.error.is_empty() {
            return Err(SeaweedError::Assign(result.error));
        }
        if result.count == 0 {
            return Err(SeaweedError::Assign(format!(
                "master 返回 count=0, fid={}",
                result.file_id
            )));
        }

        info!(
            "分配文件ID成功: fid={}, url={}, count={}",
            result.file_id, result.url, result.count
        );
        Ok(result)
    }

    // =====================================================
    // 卷查询
    // =====================================================

    /// 查询卷位置，优先使用缓存
    pub async fn lookup(&self, volume_id: &str, args: &Params) -> Result<LookupResult> {
        if let Some(cached) = self.cache.get(volume_id) {
            debug!("卷位置缓存命中: volume={}", volume_id);
            return Ok(cached);
        }
        self.lookup_no_cache(volume_id, args).await
    }

    /// 总是请求 master，成功后刷新缓存
    pub async fn lookup_no_cache(&self, volume_id: &str, args: &Params) -> Result<LookupResult> {
        let result = self.do_lookup(volume_id, args).await?;
        self.cache.insert(volume_id, result.clone());
        Ok(result)
    }

    async fn do_lookup(&self, volume_id: &str, args: &Params) -> Result<LookupResult> {
        let url = self.master_url("/dir/lookup", &Params::new())?;
        let form = args.clone().with("volumeId", volume_id);
        let response = self.transport.post_form(&url, form.as_slice()).await?;
        let result: LookupResult = decode_response("查询卷", &url, &response)?;

        if !result.error.is_empty() {
            return Err(SeaweedError::Lookup {
                volume_id: volume_id.to_string(),
                message: result.error,
            });
        }

        debug!(
            "查询卷成功: volume={}, 位置数={}",
            volume_id,
            result.locations.len()
        );
        Ok(result)
    }

    /// 批量查询卷位置
    ///
    /// 缓存中已有的直接返回，其余合并成一次 `/vol/lookup` 请求；
    /// master 没有返回的卷不出现在结果中
    pub async fn lookup_volume_ids(
        &self,
        volume_ids: &[String],
    ) -> Result<HashMap<String, LookupResult>> {
        let mut results = HashMap::with_capacity(volume_ids.len());
        let mut unknown = Params::new();

        for volume_id in volume_ids {
            if results.contains_key(volume_id) || unknown.as_slice().iter().any(|(_, v)| v == volume_id) {
                continue;
            }
            match self.cache.get(volume_id) {
                Some(cached) => {
                    results.insert(volume_id.clone(), cached);
                }
                None => unknown.add("volumeId", volume_id.as_str()),
            }
        }

        if unknown.is_empty() {
            return Ok(results);
        }

        let url = self.master_url("/vol/lookup", &Params::new())?;
        let response = self.transport.post_form(&url, unknown.as_slice()).await?;
        let resolved: HashMap<String, LookupResult> =
            decode_response("批量查询卷", &url, &response)?;

        for (volume_id, result) in resolved {
            if !result.is_success() || result.locations.is_empty() {
                debug!("批量查询未解析: volume={}, error={}", volume_id, result.error);
                continue;
            }
            self.cache.insert(volume_id.as_str(), result.clone());
            results.insert(volume_id, result);
        }

        Ok(results)
    }

    /// 定位文件所在的服务器
    ///
    /// # 参数
    /// * `file_id` - 文件ID
    /// * `args` - 附加查询参数（如 collection）
    /// * `readonly` - true 时随机选择任一副本，false 时选择主副本
    ///
    /// # 返回
    /// 服务器地址（如 "localhost:8080"）
    pub async fn resolve_server_for_file(
        &self,
        file_id: &str,
        args: &Params,
        readonly: bool,
    ) -> Result<String> {
        let (volume_id, _) = split_file_id(file_id)?;
        let result = self.lookup(volume_id, args).await?;

        let location = if readonly {
            result.locations.random_pick_for_read()
        } else {
            result.locations.head()
        };

        location
            .map(|l| l.url.clone())
            .ok_or_else(|| SeaweedError::FileNotFound(file_id.to_string()))
    }

    /// 文件的完整访问地址: `{scheme}://{server}/{fid}`
    pub async fn lookup_file_id(&self, file_id: &str, args: &Params, readonly: bool) -> Result<String> {
        let server = self.resolve_server_for_file(file_id, args, readonly).await?;
        self.make_url(&server, file_id, &Params::new())
    }

    // =====================================================
    // 卷管理 / 状态
    // =====================================================

    /// 预分配新卷
    pub async fn grow(&self, args: &GrowArgs) -> Result<()> {
        let url = self.master_url("/vol/grow", &args.to_params())?;
        let response = self.transport.get(&url).await?;
        check_admin_response("扩容卷", &url, &response)?;
        info!("扩容卷成功: collection={}, count={}", args.collection, args.count);
        Ok(())
    }

    /// 触发垃圾回收
    ///
    /// # 参数
    /// * `threshold` - 垃圾比例阈值（如 0.3）
    pub async fn vacuum(&self, threshold: f64) -> Result<()> {
        let params = Params::new().with("garbageThreshold", threshold.to_string());
        let url = self.master_url("/vol/vacuum", &params)?;
        let response = self.transport.get(&url).await?;
        check_admin_response("垃圾回收", &url, &response)?;
        info!("垃圾回收完成: threshold={}", threshold);
        Ok(())
    }

    /// 集群拓扑状态
    pub async fn status(&self) -> Result<SystemStatus> {
        let url = self.master_url("/dir/status", &Params::new())?;
        let response = self.transport.get(&url).await?;
        let status: SystemStatus = decode_response("集群状态", &url, &response)?;
        if !status.error.is_empty() {
            return Err(SeaweedError::Status {
                operation: "集群状态",
                url,
                status: response.status,
                message: status.error,
            });
        }
        Ok(status)
    }

    /// master 选主状态
    pub async fn cluster_status(&self) -> Result<ClusterStatus> {
        let url = self.master_url("/cluster/status", &Params::new())?;
        let response = self.transport.get(&url).await?;
        decode_response("master 状态", &url, &response)
    }

    // =====================================================
    // 文件操作
    // =====================================================

    /// 删除文件（文件已不存在也视为成功）
    pub async fn delete_file(&self, file_id: &str, args: &Params) -> Result<()> {
        let url = self.lookup_file_id(file_id, args, false).await?;
        self.transport.delete(&url).await?;
        info!("删除文件成功: fid={}", file_id);
        Ok(())
    }

    /// 下载文件到 writer，返回服务端给出的文件名
    pub async fn download_file(
        &self,
        file_id: &str,
        args: &Params,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Option<String>> {
        let url = self.lookup_file_id(file_id, args, true).await?;
        debug!("下载文件: fid={}, url={}", file_id, url);
        self.transport.download(&url, writer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::testing::{Call, MockTransport, ASSIGN_SERVER};
    use std::collections::HashSet;

    fn client_with(mock: Arc<MockTransport>) -> SeaweedClient {
        SeaweedClient::with_parts(
            "http",
            "master:9333",
            mock,
            Arc::new(LocationCache::default()),
        )
    }

    #[test]
    fn test_make_url() {
        let params = Params::new().with("ts", "5").with("cm", "true");
        assert_eq!(
            make_url("http", "vs1:8080", "3,01637037d6", &params).unwrap(),
            "http://vs1:8080/3,01637037d6?ts=5&cm=true"
        );
        assert_eq!(
            make_url("https", "master:9333", "/dir/assign", &Params::new()).unwrap(),
            "https://master:9333/dir/assign"
        );
        assert_eq!(
            make_url("http", "https://vs1:8080", "3,01", &Params::new()).unwrap(),
            "https://vs1:8080/3,01"
        );
    }

    #[test]
    fn test_split_file_id() {
        assert_eq!(split_file_id("3,01637037d6").unwrap(), ("3", "01637037d6"));
        assert_eq!(split_file_id("3/01637037d6").unwrap(), ("3", "01637037d6"));

        for bad in ["3", "", "3,a,b", "3/a/b", ",abc"] {
            assert!(
                matches!(split_file_id(bad), Err(SeaweedError::InvalidFileId(_))),
                "{bad} 应当无效"
            );
        }
    }

    #[test]
    fn test_assign_args_params() {
        let mut args = AssignArgs::new("pics", "");
        args.data_center = "dc1".to_string();
        let params = args.to_params();

        assert_eq!(params.get("collection"), Some("pics"));
        assert_eq!(params.get("ttl"), None);
        assert_eq!(params.get("count"), Some("1"));
        assert_eq!(params.get("dataCenter"), Some("dc1"));
    }

    #[tokio::test]
    async fn test_assign() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(mock.clone());

        let result = client.assign(&AssignArgs::new("", "").with_count(3)).await.unwrap();
        assert_eq!(result.url, ASSIGN_SERVER);
        assert_eq!(result.count, 3);

        mock.fail_assign("No free volumes left!");
        let err = client.assign(&AssignArgs::new("", "")).await.unwrap_err();
        assert!(matches!(err, SeaweedError::Assign(ref m) if m.contains("No free volumes")));
    }

    #[tokio::test]
    async fn test_lookup_reads_through_cache() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(mock.clone());

        let first = client.lookup("7", &Params::new()).await.unwrap();
        assert_eq!(mock.post_count("/dir/lookup"), 1);

        let second = client.lookup("7", &Params::new()).await.unwrap();
        assert_eq!(mock.post_count("/dir/lookup"), 1);
        assert_eq!(first, second);

        // 绕过缓存但刷新缓存
        client.lookup_no_cache("7", &Params::new()).await.unwrap();
        assert_eq!(mock.post_count("/dir/lookup"), 2);
        client.lookup("7", &Params::new()).await.unwrap();
        assert_eq!(mock.post_count("/dir/lookup"), 2);
    }

    #[tokio::test]
    async fn test_lookup_error_is_not_cached() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(mock.clone());

        for _ in 0..2 {
            let err = client.lookup("99", &Params::new()).await.unwrap_err();
            assert!(matches!(err, SeaweedError::Lookup { ref volume_id, .. } if volume_id == "99"));
        }
        assert_eq!(mock.post_count("/dir/lookup"), 2);
        assert!(client.cache().get("99").is_none());
    }

    #[tokio::test]
    async fn test_lookup_forwards_args() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(mock.clone());

        client
            .lookup_no_cache("7", &Params::collection("pics"))
            .await
            .unwrap();

        let form = mock
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::PostForm(url, form) if url.ends_with("/dir/lookup") => Some(form),
                _ => None,
            })
            .unwrap();
        assert!(form.contains(&("collection".to_string(), "pics".to_string())));
        assert!(form.contains(&("volumeId".to_string(), "7".to_string())));
    }

    #[tokio::test]
    async fn test_replica_selection() {
        let mock = Arc::new(MockTransport::new().with_volume("3", &["a:8080", "b:8080", "c:8080"]));
        let client = client_with(mock.clone());

        for _ in 0..20 {
            let server = client
                .resolve_server_for_file("3,01637037d6", &Params::new(), false)
                .await
                .unwrap();
            assert_eq!(server, "a:8080");
        }

        let all: HashSet<&str> = ["a:8080", "b:8080", "c:8080"].into_iter().collect();
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let server = client
                .resolve_server_for_file("3,01637037d6", &Params::new(), true)
                .await
                .unwrap();
            assert!(all.contains(server.as_str()));
            seen.insert(server);
        }
        assert!(seen.len() > 1);

        // 只查询过一次 master
        assert_eq!(mock.post_count("/dir/lookup"), 1);
    }

    #[tokio::test]
    async fn test_invalid_file_id_makes_no_request() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(mock.clone());

        let err = client
            .resolve_server_for_file("3,a,b", &Params::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SeaweedError::InvalidFileId(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_locations_is_not_found() {
        let mock = Arc::new(MockTransport::new().with_volume("5", &[]));
        let client = client_with(mock);

        let err = client
            .lookup_file_id("5,0102", &Params::new(), true)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_lookup_file_id() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(mock);

        let url = client
            .lookup_file_id("7/0a1b", &Params::new(), false)
            .await
            .unwrap();
        assert_eq!(url, format!("http://{}/7/0a1b", ASSIGN_SERVER));
    }

    #[tokio::test]
    async fn test_lookup_volume_ids() {
        let mock = Arc::new(MockTransport::new().with_volume("3", &["a:8080"]));
        let client = client_with(mock.clone());

        // 先缓存卷 7
        client.lookup("7", &Params::new()).await.unwrap();

        let ids: Vec<String> = ["7", "3", "42", "3"].iter().map(|s| s.to_string()).collect();
        let results = client.lookup_volume_ids(&ids).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.contains_key("7"));
        assert_eq!(results["3"].locations.head().unwrap().url, "a:8080");
        assert!(!results.contains_key("42"));

        // 只有未缓存的卷进入批量请求
        let form = mock
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::PostForm(url, form) if url.ends_with("/vol/lookup") => Some(form),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            form,
            vec![
                ("volumeId".to_string(), "3".to_string()),
                ("volumeId".to_string(), "42".to_string()),
            ]
        );
        assert!(client.cache().get("3").is_some());

        // 全部命中缓存时不再请求
        client.lookup_volume_ids(&ids[..2]).await.unwrap();
        assert_eq!(mock.post_count("/vol/lookup"), 1);
    }

    #[tokio::test]
    async fn test_delete_file_uses_primary() {
        let mock = Arc::new(MockTransport::new().with_volume("3", &["a:8080", "b:8080"]));
        let client = client_with(mock.clone());

        client.delete_file("3,0102", &Params::new()).await.unwrap();
        assert_eq!(mock.deletes(), vec!["http://a:8080/3,0102".to_string()]);
    }

    #[tokio::test]
    async fn test_status_and_admin() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(mock.clone());

        let status = client.status().await.unwrap();
        assert_eq!(status.version, "mock");
        assert_eq!(status.topology.max, 7);

        let cluster = client.cluster_status().await.unwrap();
        assert!(cluster.is_leader);

        client.vacuum(0.3).await.unwrap();
        client
            .grow(&GrowArgs {
                collection: "pics".to_string(),
                count: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        let gets: Vec<String> = mock
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Get(url) => Some(url),
                _ => None,
            })
            .collect();
        assert!(gets.contains(&"http://master:9333/vol/vacuum?garbageThreshold=0.3".to_string()));
        assert!(gets.contains(&"http://master:9333/vol/grow?collection=pics&count=2".to_string()));
    }
}
