//! 本地目录检查 - 每次按需读取文件系统，不维护索引

use crate::error::{Result, SyncError};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// 本地已有文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub size: u64,
}

/// 目标目录
pub struct LocalInventory {
    dest_dir: PathBuf,
}

impl LocalInventory {
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
        }
    }

    /// 确保目标目录存在
    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dest_dir).await?;
        Ok(())
    }

    /// 对象名对应的本地路径，拒绝会逃出目标目录的名称
    pub fn target_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let safe = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if !safe {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("对象名称 {:?} 不能映射到目标目录内的路径", name),
            )));
        }
        Ok(self.dest_dir.join(relative))
    }

    /// 查找本地同名文件
    pub async fn lookup(&self, name: &str) -> Result<Option<LocalFile>> {
        let path = self.target_path(name)?;

        match fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(LocalFile {
                path,
                size: metadata.len(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
