use azc_lib::commands::{self, Cli};
use azc_lib::config::Settings;
use azc_lib::error::SyncError;
use azc_lib::{logging, storage};
use clap::{CommandFactory, Parser};
use std::process::ExitCode;

/// 致命错误：静默模式下只通过退出码表示
fn fail(err: &SyncError, silent: bool) -> ExitCode {
    if !silent {
        eprintln!("错误: {}", err);
    }
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    // 没有任何参数时只显示帮助
    if std::env::args_os().len() <= 1 {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    }

    let cli = Cli::parse();

    let settings = match Settings::load(&cli.config) {
        Ok(s) => s,
        Err(e) => return fail(&e, cli.silent),
    };

    // 文件日志的 guard 需要保持到进程结束
    let _log_guard = logging::init(&settings.log, cli.silent);

    let backend = match storage::create_backend(&settings) {
        Ok(b) => b,
        Err(e) => return fail(&SyncError::Setup(e.to_string()), cli.silent),
    };

    match commands::run(&cli, backend).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e, cli.silent),
    }
}
