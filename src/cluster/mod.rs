// 集群访问模块

pub mod cache;
pub mod client;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{LocationCache, DEFAULT_CACHE_TTL};
pub use client::{make_url, split_file_id, AssignArgs, GrowArgs, SeaweedClient};
pub use transport::{BoxedReader, ClusterTransport, HttpResponse, HttpTransport, UploadRequest};
pub use types::*;
