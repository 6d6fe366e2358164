use super::{
    BlobBackend, ByteStream, CatalogPage, RemoteObject, BLOCK_SIZE, IO_TIMEOUT_SECS,
    OP_TIMEOUT_SECS, STATUS_CREATED,
};
use crate::config::Settings;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::layers::TimeoutLayer;
use opendal::raw::HttpClient;
use opendal::{Lister, Metakey, Operator, Writer};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// 未读完的列表会话，按续传标记暂存
struct ListSession {
    lister: Lister,
    /// 为判断是否还有下一页而预读的对象
    pending: Option<RemoteObject>,
}

pub struct AzblobBackend {
    operator: Operator,
    name: String,
    sessions: Mutex<HashMap<String, ListSession>>,
    writers: Mutex<HashMap<String, Writer>>,
}

impl AzblobBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        use opendal::services::Azblob;

        let endpoint = format!("https://{}.blob.core.windows.net", settings.account_name);

        let mut builder = Azblob::default()
            .container(&settings.container_name)
            .endpoint(&endpoint)
            .account_name(&settings.account_name)
            .account_key(&settings.account_key);

        if let Some(ref proxy) = settings.proxy {
            let proxy_url = format!("http://{}:{}", proxy.host, proxy.port);
            tracing::info!("使用代理: {}", proxy_url);
            let client = reqwest::Client::builder()
                .proxy(reqwest::Proxy::https(&proxy_url)?)
                .build()?;
            builder = builder.http_client(HttpClient::with(client));
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let name = format!("azblob://{}/{}", settings.account_name, settings.container_name);

        Ok(Self {
            operator,
            name,
            sessions: Mutex::new(HashMap::new()),
            writers: Mutex::new(HashMap::new()),
        })
    }

    /// 读取下一个文件对象，跳过目录条目
    async fn next_object(lister: &mut Lister) -> Result<Option<RemoteObject>> {
        while let Some(entry) = lister.try_next().await? {
            let meta = entry.metadata();
            if meta.is_dir() {
                continue;
            }
            let path = entry.path().trim_start_matches('/');
            if path.is_empty() {
                continue;
            }
            return Ok(Some(RemoteObject::new(path, meta.content_length())));
        }
        Ok(None)
    }
}

#[async_trait]
impl BlobBackend for AzblobBackend {
    async fn list_page(&self, token: Option<&str>, max_results: usize) -> Result<CatalogPage> {
        let mut session = match token {
            None => ListSession {
                lister: self
                    .operator
                    .lister_with("")
                    .recursive(true)
                    .metakey(Metakey::ContentLength | Metakey::Mode)
                    .await?,
                pending: None,
            },
            Some(t) => self
                .sessions
                .lock()
                .await
                .remove(t)
                .ok_or_else(|| anyhow!("未知的续传标记: {}", t))?,
        };

        let max_results = max_results.max(1);
        let mut items = Vec::with_capacity(max_results);
        items.extend(session.pending.take());

        while items.len() < max_results {
            match Self::next_object(&mut session.lister).await? {
                Some(obj) => items.push(obj),
                None => {
                    return Ok(CatalogPage {
                        items,
                        next_token: None,
                    })
                }
            }
        }

        // 预读一个对象，确认是否还有下一页
        match Self::next_object(&mut session.lister).await? {
            Some(obj) => {
                session.pending = Some(obj);
                let next = uuid::Uuid::new_v4().to_string();
                self.sessions.lock().await.insert(next.clone(), session);
                Ok(CatalogPage {
                    items,
                    next_token: Some(next),
                })
            }
            None => Ok(CatalogPage {
                items,
                next_token: None,
            }),
        }
    }

    async fn put_block(&self, name: &str, block_index: u32, data: Bytes) -> Result<u16> {
        let mut writers = self.writers.lock().await;

        // 第一个块开启新的写入，覆盖之前未完成的同名上传
        if block_index == 0 {
            let writer = self.operator.writer_with(name).chunk(BLOCK_SIZE).await?;
            writers.insert(name.to_string(), writer);
        }

        let writer = writers
            .get_mut(name)
            .ok_or_else(|| anyhow!("{} 没有进行中的上传 (块 {})", name, block_index))?;

        let written = writer.write(data).await;
        if let Err(e) = written {
            if let Some(mut writer) = writers.remove(name) {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!("放弃写入失败 {}: {}", name, abort_err);
                }
            }
            return Err(e.into());
        }

        Ok(STATUS_CREATED)
    }

    async fn commit_blocks(&self, name: &str, block_count: u32) -> Result<u16> {
        let pending = self.writers.lock().await.remove(name);

        let mut writer = match pending {
            Some(w) => w,
            // 空文件：没有任何块
            None if block_count == 0 => self.operator.writer(name).await?,
            None => return Err(anyhow!("{} 没有可提交的块", name)),
        };
        writer.close().await?;

        Ok(STATUS_CREATED)
    }

    async fn abort_upload(&self, name: &str) -> Result<()> {
        let pending = self.writers.lock().await.remove(name);
        if let Some(mut writer) = pending {
            writer.abort().await?;
        }
        Ok(())
    }

    async fn download_range(&self, name: &str, offset: u64, count: u64) -> Result<ByteStream> {
        let meta = self.operator.stat(name).await?;
        let end = offset.saturating_add(count).min(meta.content_length());

        if offset >= end {
            return Ok(Box::pin(futures::stream::empty()));
        }

        let reader = self.operator.reader(name).await?;
        let stream = reader.into_bytes_stream(offset..end).await?;

        Ok(Box::pin(stream.map_err(anyhow::Error::from)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
