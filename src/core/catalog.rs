//! 远程对象列表 - 按续传标记逐页拉取

use crate::error::{Result, SyncError};
use crate::storage::{BlobBackend, RemoteObject, DEFAULT_PAGE_SIZE};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

/// 列表选项
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// 每页条目数（仅作为建议值，服务端可以返回更少）
    pub page_size: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// 分页游标状态
enum Cursor {
    Start,
    Next(String),
    Done,
}

/// 远程对象列表
pub struct RemoteCatalog {
    backend: Arc<dyn BlobBackend>,
    options: ListOptions,
}

impl RemoteCatalog {
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self::with_options(backend, ListOptions::default())
    }

    pub fn with_options(backend: Arc<dyn BlobBackend>, options: ListOptions) -> Self {
        Self { backend, options }
    }

    /// 惰性对象流
    ///
    /// 只有在消费者拉取时才请求下一页；每次调用都从第一页重新开始。
    /// 任何一页失败都会以 `SyncError::Catalog` 结束流，已产出的对象不受影响。
    pub fn list(&self) -> impl Stream<Item = Result<RemoteObject>> + Send + 'static {
        let backend = self.backend.clone();
        let page_size = self.options.page_size;

        stream::try_unfold(Cursor::Start, move |cursor| {
            let backend = backend.clone();
            async move {
                let token = match cursor {
                    Cursor::Done => return Ok(None),
                    Cursor::Start => None,
                    Cursor::Next(token) => Some(token),
                };

                let page = backend
                    .list_page(token.as_deref(), page_size)
                    .await
                    .map_err(|e| SyncError::Catalog(format!("{}: {}", backend.name(), e)))?;

                debug!(
                    "列表页: {} 个对象, 下一页={}",
                    page.items.len(),
                    page.next_token.is_some()
                );

                let next = match page.next_token {
                    Some(token) => Cursor::Next(token),
                    None => Cursor::Done,
                };
                Ok::<_, SyncError>(Some((page.items, next)))
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, SyncError>)))
        .try_flatten()
    }

    /// 拉取全部对象，生成本次运行使用的快照
    pub async fn snapshot(&self) -> Result<Catalog> {
        let objects: Vec<RemoteObject> = self.list().try_collect().await?;
        debug!("远程共有 {} 个对象", objects.len());
        Ok(Catalog::new(objects))
    }

    /// 查找第一个满足条件的对象，找到后不再请求后续页
    pub async fn find_first<P>(&self, mut predicate: P) -> Result<Option<RemoteObject>>
    where
        P: FnMut(&RemoteObject) -> bool,
    {
        let mut objects = Box::pin(self.list());
        while let Some(obj) = objects.next().await {
            let obj = obj?;
            if predicate(&obj) {
                return Ok(Some(obj));
            }
        }
        Ok(None)
    }
}

/// 一次运行内的远程对象快照，按列表到达顺序保存
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    objects: Vec<RemoteObject>,
}

impl Catalog {
    pub fn new(objects: Vec<RemoteObject>) -> Self {
        Self { objects }
    }

    pub fn find(&self, name: &str) -> Option<&RemoteObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RemoteObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a RemoteObject;
    type IntoIter = std::slice::Iter<'a, RemoteObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}
