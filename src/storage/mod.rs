pub mod azblob;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

pub use azblob::AzblobBackend;
pub use memory::MemoryBackend;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, stat 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 分块上传的块大小
pub const BLOCK_SIZE: usize = 8 * 1024 * 1024;
/// 单个对象的最大传输大小
pub const MAX_OBJECT_SIZE: u64 = 1024 * 1024 * 1024;
/// 列表分页大小（仅作为建议值）
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// 创建成功
pub const STATUS_CREATED: u16 = 201;

/// 远程对象（列表时刻的快照）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub name: String,
    pub size: u64,
}

impl RemoteObject {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// 一页列表结果
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub items: Vec<RemoteObject>,
    /// 下一页的续传标记，None 表示已到末尾
    pub next_token: Option<String>,
}

/// 下载字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Blob 存储后端接口
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// 获取一页对象列表，token 为 None 时从头开始
    async fn list_page(&self, token: Option<&str>, max_results: usize) -> Result<CatalogPage>;

    /// 上传一个块，返回状态码
    async fn put_block(&self, name: &str, block_index: u32, data: Bytes) -> Result<u16>;

    /// 提交已上传的块，生成对象
    async fn commit_blocks(&self, name: &str, block_count: u32) -> Result<u16>;

    /// 放弃未提交的块，没有进行中的上传时什么也不做
    async fn abort_upload(&self, name: &str) -> Result<()>;

    /// 读取 [offset, offset + count) 范围，对象较短时流提前结束
    async fn download_range(&self, name: &str, offset: u64, count: u64) -> Result<ByteStream>;

    /// 获取后端名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置创建 Azure Blob 后端
pub fn create_backend(settings: &crate::config::Settings) -> Result<Arc<dyn BlobBackend>> {
    tracing::debug!(
        "初始化 Azure Blob 存储: account={}, container={}",
        settings.account_name,
        settings.container_name
    );
    Ok(Arc::new(AzblobBackend::new(settings)?) as Arc<dyn BlobBackend>)
}
