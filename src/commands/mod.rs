//! 命令行参数与命令分发

use crate::config::DEFAULT_CONFIG_PATH;
use crate::core::SyncEngine;
use crate::error::Result;
use crate::storage::BlobBackend;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "azc", version, about = "Azure Blobstore Client - send and receive files")]
pub struct Cli {
    /// 配置文件位置（properties 或 .json）
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// 不输出任何内容，只通过退出码表示失败
    #[arg(short, long)]
    pub silent: bool,

    /// 要执行的命令
    #[arg(short, long, value_enum, default_value_t = Verb::List)]
    pub verb: Verb,

    /// get 时为对象名，send 时为完整文件路径，可重复
    #[arg(short = 'f', long = "file")]
    pub files: Vec<String>,

    /// get / getAll 的目标目录，默认为当前目录
    #[arg(short, long)]
    pub dest: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    List,
    Send,
    Get,
    #[value(name = "getAll")]
    GetAll,
}

/// 执行命令，只有致命错误才返回 Err
pub async fn run(cli: &Cli, backend: Arc<dyn BlobBackend>) -> Result<()> {
    let engine = SyncEngine::new(backend, cli.silent);

    match cli.verb {
        Verb::List => {
            engine.list().await?;
        }
        Verb::Send => {
            if cli.files.is_empty() {
                warn!("send 需要至少一个 --file");
                return Ok(());
            }
            let paths: Vec<PathBuf> = cli.files.iter().map(PathBuf::from).collect();
            engine.send(&paths).await;
        }
        Verb::Get => {
            if cli.files.is_empty() {
                warn!("get 需要至少一个 --file");
                return Ok(());
            }
            engine.get(&cli.files, &dest_dir(cli)?).await?;
        }
        Verb::GetAll => {
            engine.get_all(&dest_dir(cli)?).await?;
        }
    }

    Ok(())
}

fn dest_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.dest {
        Some(d) => Ok(d.clone()),
        None => Ok(std::env::current_dir()?),
    }
}
