// 集群 API 数据类型

use rand::Rng;
use serde::{Deserialize, Serialize};

// =====================================================
// 请求参数
// =====================================================

/// 查询/表单参数，保持插入顺序，值为空的参数不会写入
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只带 collection 的参数
    pub fn collection(collection: &str) -> Self {
        Self::new().with("collection", collection)
    }

    /// 设置参数（同名参数被替换，空值忽略）
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.0.retain(|(k, _)| k != key);
        self.0.push((key.to_string(), value));
    }

    /// 追加参数（允许同名多值，如批量查询的 volumeId）
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.0.push((key.to_string(), value));
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// 读取第一个同名参数
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =====================================================
// 卷位置 / 查询
// =====================================================

/// 卷所在的服务器地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLocation {
    /// 内部地址（如 "localhost:8080"）
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    /// 对外地址
    #[serde(default, rename = "publicUrl", skip_serializing_if = "String::is_empty")]
    pub public_url: String,
}

/// 卷的全部副本位置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeLocations(pub Vec<VolumeLocation>);

impl VolumeLocations {
    /// 第一个位置（写操作使用的主副本）
    pub fn head(&self) -> Option<&VolumeLocation> {
        self.0.first()
    }

    /// 随机选择一个位置用于读操作，分摊负载
    pub fn random_pick_for_read(&self) -> Option<&VolumeLocation> {
        if self.0.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.0.len());
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<VolumeLocation>> for VolumeLocations {
    fn from(locations: Vec<VolumeLocation>) -> Self {
        Self(locations)
    }
}

/// 卷查询结果
///
/// 响应示例:
/// ```json
/// {"volumeId":"3","locations":[{"url":"localhost:8080","publicUrl":"localhost:8080"}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    /// 卷ID
    #[serde(default, rename = "volumeId", skip_serializing_if = "String::is_empty")]
    pub volume_id: String,

    /// 副本位置
    #[serde(default, rename = "locations", skip_serializing_if = "VolumeLocations::is_empty")]
    pub locations: VolumeLocations,

    /// 错误信息
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl LookupResult {
    /// 是否成功（没有 error 字段）
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

// =====================================================
// 分配 / 上传
// =====================================================

/// 分配结果
///
/// 响应示例:
/// ```json
/// {"fid":"1,0a1653fd0f","url":"localhost:8899","publicUrl":"localhost:8899","count":1}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignResult {
    /// 分配到的文件ID
    #[serde(default, rename = "fid")]
    pub file_id: String,

    /// 负责写入的服务器
    #[serde(default)]
    pub url: String,

    /// 对外地址
    #[serde(default, rename = "publicUrl")]
    pub public_url: String,

    /// 预留的文件ID数量（0 表示失败）
    #[serde(default)]
    pub count: u64,

    /// 错误信息
    #[serde(default)]
    pub error: String,
}

impl AssignResult {
    /// 是否分配成功
    pub fn is_success(&self) -> bool {
        self.count > 0 && self.error.is_empty()
    }
}

/// 数据上传响应
///
/// 响应示例: `{"name":"go1.8.3.linux-amd64.tar.gz","size":82565628,"error":""}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// 服务端实际保存的字节数（可能因压缩与发送字节数不同）
    #[serde(default)]
    pub size: u64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// 单个文件的提交结果（submit 与批量上传共用）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    #[serde(default, rename = "fileName", skip_serializing_if = "String::is_empty")]
    pub file_name: String,

    #[serde(default, rename = "fileUrl", skip_serializing_if = "String::is_empty")]
    pub file_url: String,

    #[serde(default, rename = "fid", skip_serializing_if = "String::is_empty")]
    pub file_id: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitResult {
    /// 仅带文件名的结果槽位
    pub fn named(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// =====================================================
// 集群状态
// =====================================================

/// `/dir/status` 响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemStatus {
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub error: String,
}

/// 集群拓扑
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Topology {
    #[serde(default)]
    pub data_centers: Vec<DataCenter>,
    #[serde(default)]
    pub free: i64,
    #[serde(default)]
    pub max: i64,
    #[serde(default)]
    pub layouts: Vec<Layout>,
}

/// 数据中心
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataCenter {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub free: i64,
    #[serde(default)]
    pub max: i64,
    #[serde(default)]
    pub racks: Vec<Rack>,
}

/// 机架
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rack {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data_nodes: Vec<DataNode>,
    #[serde(default)]
    pub free: i64,
    #[serde(default)]
    pub max: i64,
}

/// 数据节点
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataNode {
    #[serde(default)]
    pub free: i64,
    #[serde(default)]
    pub max: i64,
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub volumes: i64,
}

/// 卷布局
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Layout {
    #[serde(default)]
    pub replication: String,
    #[serde(default)]
    pub writables: Vec<u64>,
}

/// `/cluster/status` 响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub is_leader: bool,
    #[serde(default)]
    pub leader: String,
    #[serde(default)]
    pub peers: Vec<String>,
}
