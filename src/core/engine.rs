use crate::core::catalog::{Catalog, ListOptions, RemoteCatalog};
use crate::core::inventory::LocalInventory;
use crate::core::planner::{SyncDecision, SyncPlanner};
use crate::core::transfer::TransferEngine;
use crate::error::{Result, SyncError};
use crate::storage::{BlobBackend, RemoteObject};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 一批传输的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub transferred: Vec<String>,
    pub skipped: Vec<String>,
    /// (名称, 错误信息)
    pub failed: Vec<(String, String)>,
    pub bytes_transferred: u64,
}

impl BatchReport {
    fn record_transfer(&mut self, name: &str, bytes: u64) {
        self.transferred.push(name.to_string());
        self.bytes_transferred += bytes;
    }

    fn record_skip(&mut self, name: &str) {
        self.skipped.push(name.to_string());
    }

    fn record_failure(&mut self, name: &str, err: &SyncError) {
        error!("{}", err);
        self.failed.push((name.to_string(), err.to_string()));
    }

    fn log_summary(&self, verb: &str) {
        info!(
            "{} 完成: 传输 {} 个 ({} 字节), 跳过 {} 个, 失败 {} 个",
            verb,
            self.transferred.len(),
            self.bytes_transferred,
            self.skipped.len(),
            self.failed.len()
        );
    }
}

/// 命令执行器
///
/// 每个命令单次顺序执行：一个文件传输完成（或失败）后才开始下一个。
/// 远程列表快照由每次命令重新获取，不在命令之间共享。
pub struct SyncEngine {
    catalog: RemoteCatalog,
    transfer: TransferEngine,
    /// 静默模式只关闭输出，不改变执行流程
    silent: bool,
}

impl SyncEngine {
    pub fn new(backend: Arc<dyn BlobBackend>, silent: bool) -> Self {
        Self::with_options(backend, ListOptions::default(), silent)
    }

    pub fn with_options(backend: Arc<dyn BlobBackend>, options: ListOptions, silent: bool) -> Self {
        Self {
            catalog: RemoteCatalog::with_options(backend.clone(), options),
            transfer: TransferEngine::new(backend),
            silent,
        }
    }

    /// list：拉取全部对象并逐个输出名称
    pub async fn list(&self) -> Result<Catalog> {
        let mut objects = Box::pin(self.catalog.list());
        let mut collected = Vec::new();

        while let Some(obj) = objects.next().await {
            let obj = obj?;
            if !self.silent {
                println!("{}", obj.name);
            }
            collected.push(obj);
        }

        let catalog = Catalog::new(collected);
        debug!("共列出 {} 个对象, {} 字节", catalog.len(), catalog.total_bytes());
        Ok(catalog)
    }

    /// send：逐个上传，单个文件失败不影响后续文件
    pub async fn send(&self, files: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();

        for path in files {
            let label = path.display().to_string();
            match self.transfer.upload(path).await {
                Ok(bytes) => {
                    info!("上传成功: {} ({} 字节)", label, bytes);
                    report.record_transfer(&label, bytes);
                }
                Err(e) => {
                    warn!("上传失败，继续处理下一个文件: {}", label);
                    report.record_failure(&label, &e);
                }
            }
        }

        report.log_summary("send");
        report
    }

    /// get：下载指定名称的对象
    ///
    /// 本地已存在且远程列表中找不到该名称时立即返回 `PlanningInconsistency`，
    /// 之前已完成的下载保留在磁盘上。
    pub async fn get(&self, names: &[String], dest: &Path) -> Result<BatchReport> {
        let catalog = self.catalog.snapshot().await?;
        let inventory = LocalInventory::new(dest);
        inventory.ensure_dir().await?;

        let mut report = BatchReport::default();

        for name in names {
            let decision = match inventory.lookup(name).await {
                Err(e) => SyncDecision::Error(e.to_string()),
                Ok(None) => SyncDecision::Transfer,
                Ok(Some(local)) => {
                    let remote = catalog
                        .find(name)
                        .ok_or_else(|| SyncError::PlanningInconsistency { name: name.clone() })?;
                    SyncPlanner::decide(remote, Some(&local))
                }
            };

            self.apply(name, &decision, &inventory, &mut report).await;
        }

        report.log_summary("get");
        Ok(report)
    }

    /// getAll：下载远程列表中的全部对象
    pub async fn get_all(&self, dest: &Path) -> Result<BatchReport> {
        let catalog = self.catalog.snapshot().await?;
        let inventory = LocalInventory::new(dest);
        inventory.ensure_dir().await?;

        if catalog.is_empty() {
            info!("远程容器中没有对象");
        }

        let mut planned: Vec<(&RemoteObject, SyncDecision)> = Vec::with_capacity(catalog.len());
        for remote in &catalog {
            let decision = match inventory.lookup(&remote.name).await {
                Ok(local) => SyncPlanner::decide(remote, local.as_ref()),
                Err(e) => SyncDecision::Error(e.to_string()),
            };
            planned.push((remote, decision));
        }

        let summary = SyncPlanner::summarize(planned.iter().map(|(r, d)| (*r, d)));
        info!(
            "远程 {} 个对象: 需要下载 {} 个 ({} 字节), 跳过 {} 个",
            summary.total_files(),
            summary.transfer_count,
            summary.transfer_bytes,
            summary.skip_count
        );

        let mut report = BatchReport::default();
        for (remote, decision) in &planned {
            self.apply(&remote.name, decision, &inventory, &mut report).await;
        }

        report.log_summary("getAll");
        Ok(report)
    }

    /// 执行单个决定，错误只记录到报告中
    async fn apply(
        &self,
        name: &str,
        decision: &SyncDecision,
        inventory: &LocalInventory,
        report: &mut BatchReport,
    ) {
        match decision {
            SyncDecision::Skip => {
                info!("本地已有当前副本，跳过: {}", name);
                report.record_skip(name);
            }
            SyncDecision::Error(reason) => {
                let err = SyncError::Download {
                    name: name.to_string(),
                    reason: reason.clone(),
                };
                report.record_failure(name, &err);
            }
            SyncDecision::Transfer => {
                let target = match inventory.target_path(name) {
                    Ok(p) => p,
                    Err(e) => return report.record_failure(name, &e),
                };
                info!("下载: {} -> {}", name, target.display());

                match self.transfer.download(name, &target).await {
                    Ok(bytes) => {
                        info!("已下载到 {} ({} 字节)", target.display(), bytes);
                        report.record_transfer(name, bytes);
                    }
                    Err(e) => report.record_failure(name, &e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use pretty_assertions::assert_eq;

    fn engine(backend: &Arc<MemoryBackend>) -> SyncEngine {
        SyncEngine::new(backend.clone(), true)
    }

    #[tokio::test]
    async fn test_list_collects_all_pages() {
        let backend = Arc::new(MemoryBackend::with_page_layout(vec![1, 1, 1]));
        for name in ["c", "a", "b"] {
            backend.insert(name, name).await;
        }

        let catalog = engine(&backend).list().await.unwrap();
        let names: Vec<_> = catalog.iter().map(|o| o.name.as_str()).collect();
        // 保持服务端返回顺序，不排序
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_list_propagates_catalog_error() {
        let backend = Arc::new(MemoryBackend::with_page_layout(vec![1, 1]));
        backend.insert("a", "1").await;
        backend.insert("b", "2").await;
        backend.fail_list_page(1).await;

        let err = engine(&backend).list().await.unwrap_err();
        assert!(matches!(err, SyncError::Catalog(_)));
    }

    #[tokio::test]
    async fn test_send_continues_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = ["one.txt", "two.txt", "three.txt"]
            .iter()
            .map(|n| {
                let p = dir.path().join(n);
                std::fs::write(&p, n.as_bytes()).unwrap();
                p
            })
            .collect();

        let backend = Arc::new(MemoryBackend::new());
        backend.fail_upload("two.txt").await;

        let report = engine(&backend).send(&files).await;

        assert_eq!(report.transferred.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("two.txt"));
        assert_eq!(backend.get("one.txt").await.unwrap().as_ref(), b"one.txt");
        assert_eq!(backend.get("three.txt").await.unwrap().as_ref(), b"three.txt");
        assert!(backend.get("two.txt").await.is_none());
    }

    #[tokio::test]
    async fn test_get_all_skips_matching_and_downloads_missing() {
        let dir = tempfile::tempdir().unwrap();
        let original = vec![b'r'; 500];
        std::fs::write(dir.path().join("report.csv"), &original).unwrap();

        let backend = Arc::new(MemoryBackend::new());
        backend.insert("report.csv", vec![b'R'; 500]).await;
        backend.insert("image.png", vec![7u8; 2048]).await;

        let report = engine(&backend).get_all(dir.path()).await.unwrap();

        assert_eq!(report.skipped, vec!["report.csv".to_string()]);
        assert_eq!(report.transferred, vec!["image.png".to_string()]);
        assert!(report.failed.is_empty());
        // 大小相同的文件保持原样
        assert_eq!(std::fs::read(dir.path().join("report.csv")).unwrap(), original);
        assert_eq!(
            std::fs::read(dir.path().join("image.png")).unwrap(),
            vec![7u8; 2048]
        );
    }

    #[tokio::test]
    async fn test_get_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("a.bin", vec![1u8; 10]).await;
        backend.insert("b.bin", vec![2u8; 20]).await;

        let first = engine(&backend).get_all(dir.path()).await.unwrap();
        let second = engine(&backend).get_all(dir.path()).await.unwrap();

        assert_eq!(first.transferred.len(), 2);
        assert!(second.transferred.is_empty());
        assert_eq!(second.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_get_redownloads_on_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.zip"), vec![0u8; 50]).unwrap();

        let backend = Arc::new(MemoryBackend::new());
        backend.insert("a.zip", vec![9u8; 100]).await;

        let report = engine(&backend)
            .get(&["a.zip".to_string()], dir.path())
            .await
            .unwrap();

        assert_eq!(report.transferred, vec!["a.zip".to_string()]);
        assert_eq!(std::fs::read(dir.path().join("a.zip")).unwrap(), vec![9u8; 100]);
    }

    #[tokio::test]
    async fn test_get_unknown_existing_name_fails_after_earlier_downloads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stale.txt"), b"old").unwrap();

        let backend = Arc::new(MemoryBackend::new());
        backend.insert("first.txt", "first").await;
        backend.insert("last.txt", "last").await;

        let names = vec![
            "first.txt".to_string(),
            "stale.txt".to_string(),
            "last.txt".to_string(),
        ];
        let err = engine(&backend).get(&names, dir.path()).await.unwrap_err();

        assert!(matches!(err, SyncError::PlanningInconsistency { ref name } if name == "stale.txt"));
        // 之前的下载保留，之后的不再执行
        assert!(dir.path().join("first.txt").exists());
        assert!(!dir.path().join("last.txt").exists());
    }

    #[tokio::test]
    async fn test_get_missing_remote_without_local_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("real.txt", "data").await;

        let names = vec!["ghost.txt".to_string(), "real.txt".to_string()];
        let report = engine(&backend).get(&names, dir.path()).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "ghost.txt");
        assert_eq!(report.transferred, vec!["real.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_get_all_continues_after_download_failure() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("broken.bin", vec![3u8; 256 * 1024]).await;
        backend.insert("fine.bin", vec![4u8; 10]).await;
        backend.fail_download("broken.bin").await;

        let report = engine(&backend).get_all(dir.path()).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken.bin");
        assert_eq!(report.transferred, vec!["fine.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_get_all_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("../outside.txt", "nope").await;
        backend.insert("inside.txt", "ok").await;

        let report = engine(&backend).get_all(&dest).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.transferred, vec!["inside.txt".to_string()]);
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn test_get_all_catalog_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::with_page_layout(vec![1, 1]));
        backend.insert("a", "1").await;
        backend.insert("b", "2").await;
        backend.fail_list_page(1).await;

        let err = engine(&backend).get_all(dir.path()).await.unwrap_err();
        assert!(matches!(err, SyncError::Catalog(_)));
        // 列表失败时不开始任何下载
        assert!(!dir.path().join("a").exists());
    }
}
