//! 错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// 凭据、容器或代理配置缺失/无效，整个运行终止
    #[error("配置错误: {0}")]
    Setup(String),

    /// 列表分页请求失败，当前列表操作终止
    #[error("列出远程对象失败: {0}")]
    Catalog(String),

    #[error("上传失败 {file}: {reason}")]
    Upload { file: String, reason: String },

    #[error("上传失败 {file}: 响应状态 {status}")]
    UploadStatus { file: String, status: u16 },

    #[error("下载失败 {name}: {reason}")]
    Download { name: String, reason: String },

    /// 请求的名称在远程列表中不存在
    #[error("远程容器中没有名为 {name} 的对象")]
    PlanningInconsistency { name: String },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
