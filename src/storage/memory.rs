//! 内存存储后端 - 分页行为可控，可注入故障

use super::{BlobBackend, ByteStream, CatalogPage, RemoteObject, STATUS_CREATED};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

/// 下载流每次产出的字节数
const STREAM_CHUNK: usize = 64 * 1024;

/// 上传失败时返回的状态码
const STATUS_SERVER_ERROR: u16 = 500;

#[derive(Debug, Default)]
struct Failures {
    /// 第 N 页（从 0 开始）请求失败
    list_pages: HashSet<usize>,
    /// 对象名 -> 从第几个块（从 0 开始）起返回失败状态
    uploads: HashMap<String, u32>,
    /// 这些对象的下载在中途断开
    downloads: HashSet<String>,
}

pub struct MemoryBackend {
    objects: RwLock<Vec<(String, Bytes)>>,
    staged: Mutex<HashMap<String, Vec<Bytes>>>,
    /// 固定的每页条目数，最后一页之后不再给出续传标记
    page_layout: Option<Vec<usize>>,
    failures: Mutex<Failures>,
    pages_served: AtomicUsize,
    blocks_received: AtomicUsize,
    name: String,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(Vec::new()),
            staged: Mutex::new(HashMap::new()),
            page_layout: None,
            failures: Mutex::new(Failures::default()),
            pages_served: AtomicUsize::new(0),
            blocks_received: AtomicUsize::new(0),
            name: "memory://".to_string(),
        }
    }

    /// 按给定的页大小序列分页，忽略调用方的 max_results
    pub fn with_page_layout(layout: Vec<usize>) -> Self {
        Self {
            page_layout: Some(layout),
            ..Self::new()
        }
    }

    /// 添加或替换对象，新对象追加到列表末尾
    pub async fn insert(&self, name: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let mut objects = self.objects.write().await;
        match objects.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = data,
            None => objects.push((name.to_string(), data)),
        }
    }

    pub async fn get(&self, name: &str) -> Option<Bytes> {
        self.objects
            .read()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.clone())
    }

    pub async fn fail_list_page(&self, page: usize) {
        self.failures.lock().await.list_pages.insert(page);
    }

    pub async fn fail_upload(&self, name: &str) {
        self.fail_upload_at(name, 0).await;
    }

    /// 前 block_index 个块正常接收，之后的块返回失败状态
    pub async fn fail_upload_at(&self, name: &str, block_index: u32) {
        self.failures
            .lock()
            .await
            .uploads
            .insert(name.to_string(), block_index);
    }

    pub async fn fail_download(&self, name: &str) {
        self.failures.lock().await.downloads.insert(name.to_string());
    }

    /// 已响应的列表页数
    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    /// 已接收的块数
    pub fn blocks_received(&self) -> usize {
        self.blocks_received.load(Ordering::SeqCst)
    }

    /// 有暂存块但尚未提交的上传数
    pub async fn pending_uploads(&self) -> usize {
        self.staged.lock().await.len()
    }

    /// 解析续传标记 "页号:偏移"
    fn parse_token(token: &str) -> Result<(usize, usize)> {
        let (page, offset) = token
            .split_once(':')
            .ok_or_else(|| anyhow!("无效的续传标记: {}", token))?;
        Ok((page.parse()?, offset.parse()?))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn list_page(&self, token: Option<&str>, max_results: usize) -> Result<CatalogPage> {
        let (page, offset) = match token {
            Some(t) => Self::parse_token(t)?,
            None => (0, 0),
        };

        if self.failures.lock().await.list_pages.contains(&page) {
            return Err(anyhow!("模拟的列表失败 (第 {} 页)", page));
        }
        self.pages_served.fetch_add(1, Ordering::SeqCst);

        let objects = self.objects.read().await;
        let offset = offset.min(objects.len());

        let (take, has_next) = match &self.page_layout {
            Some(layout) => {
                let take = layout.get(page).copied().unwrap_or(0);
                (take, page + 1 < layout.len())
            }
            None => {
                let take = max_results.max(1);
                (take, offset + take < objects.len())
            }
        };

        let end = (offset + take).min(objects.len());
        let items = objects[offset..end]
            .iter()
            .map(|(name, data)| RemoteObject::new(name.as_str(), data.len() as u64))
            .collect();

        Ok(CatalogPage {
            items,
            next_token: has_next.then(|| format!("{}:{}", page + 1, end)),
        })
    }

    async fn put_block(&self, name: &str, block_index: u32, data: Bytes) -> Result<u16> {
        let fail_from = self.failures.lock().await.uploads.get(name).copied();
        if fail_from.is_some_and(|first| block_index >= first) {
            return Ok(STATUS_SERVER_ERROR);
        }
        self.blocks_received.fetch_add(1, Ordering::SeqCst);

        let mut staged = self.staged.lock().await;
        if block_index == 0 {
            staged.insert(name.to_string(), Vec::new());
        }
        staged
            .get_mut(name)
            .ok_or_else(|| anyhow!("{} 没有进行中的上传 (块 {})", name, block_index))?
            .push(data);

        Ok(STATUS_CREATED)
    }

    async fn commit_blocks(&self, name: &str, block_count: u32) -> Result<u16> {
        let blocks = self.staged.lock().await.remove(name).unwrap_or_default();
        if blocks.len() != block_count as usize {
            return Err(anyhow!(
                "{} 块数不一致: 已接收 {}, 提交 {}",
                name,
                blocks.len(),
                block_count
            ));
        }

        let data: Vec<u8> = blocks.iter().flat_map(|b| b.iter().copied()).collect();
        self.insert(name, data).await;

        Ok(STATUS_CREATED)
    }

    async fn abort_upload(&self, name: &str) -> Result<()> {
        self.staged.lock().await.remove(name);
        Ok(())
    }

    async fn download_range(&self, name: &str, offset: u64, count: u64) -> Result<ByteStream> {
        let data = self
            .get(name)
            .await
            .ok_or_else(|| anyhow!("对象不存在: {}", name))?;

        let start = (offset as usize).min(data.len());
        let end = (offset.saturating_add(count) as usize).min(data.len());
        let body = data.slice(start..end);

        let mut chunks: Vec<Result<Bytes>> = body
            .chunks(STREAM_CHUNK)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        // 只发出前一半数据，然后断开
        if self.failures.lock().await.downloads.contains(name) {
            chunks.truncate(chunks.len() / 2);
            chunks.push(Err(anyhow!("模拟的连接中断: {}", name)));
        }

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
