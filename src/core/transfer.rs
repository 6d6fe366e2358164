//! 单个对象的分块上传与流式下载

use crate::error::{Result, SyncError};
use crate::storage::{BlobBackend, BLOCK_SIZE, MAX_OBJECT_SIZE, STATUS_CREATED};
use bytes::Bytes;
use futures::TryStreamExt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

/// 传输引擎，不做自动重试
pub struct TransferEngine {
    backend: Arc<dyn BlobBackend>,
}

impl TransferEngine {
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self { backend }
    }

    /// 以文件名（去掉目录部分）为对象名上传，返回上传的字节数
    pub async fn upload(&self, source: &Path) -> Result<u64> {
        let label = source.display().to_string();
        let upload_err = |reason: String| SyncError::Upload {
            file: label.clone(),
            reason,
        };

        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| upload_err("无法从路径确定对象名称".to_string()))?;

        let mut file = File::open(source)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| upload_err(e.to_string()))?
            .len();

        if size > MAX_OBJECT_SIZE {
            return Err(upload_err(format!(
                "文件大小 {} 超过单个对象上限 {}",
                size, MAX_OBJECT_SIZE
            )));
        }

        debug!("上传: {} -> {} ({}字节)", label, name, size);

        match self.put_all_blocks(&mut file, name, &label).await {
            Ok(uploaded) => Ok(uploaded),
            Err(e) => {
                // 放弃已暂存的块，失败的上传不留下未完成的写入
                if let Err(abort_err) = self.backend.abort_upload(name).await {
                    warn!("放弃未完成的上传失败 {}: {}", name, abort_err);
                }
                Err(e)
            }
        }
    }

    /// 逐块上传并提交，返回上传的字节数
    async fn put_all_blocks(&self, file: &mut File, name: &str, label: &str) -> Result<u64> {
        let upload_err = |reason: String| SyncError::Upload {
            file: label.to_string(),
            reason,
        };

        let mut block_index = 0u32;
        let mut uploaded = 0u64;

        loop {
            let block = read_block(file)
                .await
                .map_err(|e| upload_err(e.to_string()))?;
            if block.is_empty() {
                break;
            }
            let len = block.len();

            let status = self
                .backend
                .put_block(name, block_index, block)
                .await
                .map_err(|e| upload_err(e.to_string()))?;
            if !is_success(status) {
                return Err(SyncError::UploadStatus {
                    file: label.to_string(),
                    status,
                });
            }

            block_index += 1;
            uploaded += len as u64;

            if len < BLOCK_SIZE {
                break;
            }
        }

        let status = self
            .backend
            .commit_blocks(name, block_index)
            .await
            .map_err(|e| upload_err(e.to_string()))?;

        info!("响应状态 {} : {}", status, name);
        if status != STATUS_CREATED {
            return Err(SyncError::UploadStatus {
                file: label.to_string(),
                status,
            });
        }

        Ok(uploaded)
    }

    /// 下载对象到本地文件（存在则覆盖），边接收边写入
    ///
    /// 失败时目标文件可能只写入了一部分，不做清理。
    pub async fn download(&self, name: &str, dest: &Path) -> Result<u64> {
        let download_err = |reason: String| SyncError::Download {
            name: name.to_string(),
            reason,
        };

        let stream = self
            .backend
            .download_range(name, 0, MAX_OBJECT_SIZE)
            .await
            .map_err(|e| download_err(e.to_string()))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| download_err(e.to_string()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dest)
            .await
            .map_err(|e| download_err(e.to_string()))?;

        let mut reader = StreamReader::new(stream.map_err(io::Error::other));
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| download_err(e.to_string()))?;
        file.flush().await.map_err(|e| download_err(e.to_string()))?;

        if written == MAX_OBJECT_SIZE {
            warn!("{} 达到单次下载上限 {} 字节，内容可能不完整", name, MAX_OBJECT_SIZE);
        }

        Ok(written)
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// 读取最多 BLOCK_SIZE 字节，只有到达文件末尾时才会少于 BLOCK_SIZE
async fn read_block(file: &mut File) -> io::Result<Bytes> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut filled = 0;

    while filled < BLOCK_SIZE {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    buf.truncate(filled);
    Ok(Bytes::from(buf))
}
