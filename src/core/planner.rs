use crate::core::inventory::LocalFile;
use crate::storage::RemoteObject;

/// 单个对象的同步决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    /// 本地已有当前副本
    Skip,
    /// 需要下载（新文件或覆盖）
    Transfer,
    /// 无法处理该对象
    Error(String),
}

/// 同步决策器
///
/// 只比较大小：大小相同即认为本地副本是当前的，不计算也不比较内容。
pub struct SyncPlanner;

impl SyncPlanner {
    pub fn decide(remote: &RemoteObject, local: Option<&LocalFile>) -> SyncDecision {
        match local {
            None => SyncDecision::Transfer,
            Some(local) if local.size == remote.size => SyncDecision::Skip,
            Some(local) => {
                tracing::debug!(
                    "文件大小不同: {} (remote={}, local={})",
                    remote.name,
                    remote.size,
                    local.size
                );
                SyncDecision::Transfer
            }
        }
    }

    /// 统计决定
    pub fn summarize<'a, I>(decisions: I) -> ActionSummary
    where
        I: IntoIterator<Item = (&'a RemoteObject, &'a SyncDecision)>,
    {
        let mut summary = ActionSummary::default();

        for (remote, decision) in decisions {
            match decision {
                SyncDecision::Transfer => {
                    summary.transfer_count += 1;
                    summary.transfer_bytes += remote.size;
                }
                SyncDecision::Skip => summary.skip_count += 1,
                SyncDecision::Error(_) => summary.error_count += 1,
            }
        }

        summary
    }
}

/// 决定统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSummary {
    pub transfer_count: usize,
    pub transfer_bytes: u64,
    pub skip_count: usize,
    pub error_count: usize,
}

impl ActionSummary {
    pub fn total_files(&self) -> usize {
        self.transfer_count + self.skip_count + self.error_count
    }
}
