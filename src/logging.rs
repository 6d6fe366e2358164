//! 日志模块 - 控制台日志和带大小限制的文件日志

use crate::config::LogSettings;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "azc.log";

/// 初始化日志系统
///
/// 静默模式下不安装任何输出层。返回的 guard 需要保持到进程结束，
/// 否则文件日志的缓冲内容会丢失。
pub fn init(config: &LogSettings, silent: bool) -> Option<WorkerGuard> {
    if silent {
        return None;
    }

    // RUST_LOG 优先，其次是配置中的级别
    let env_filter = ["hyper=warn", "reqwest=warn", "opendal=warn"]
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(
            EnvFilter::builder()
                .with_default_directive(config.tracing_level().into())
                .from_env_lossy(),
            |filter, directive| filter.add_directive(directive),
        );

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let mut guard = None;
    let file_layer = config.dir.as_ref().and_then(|dir| {
        let max_size = (config.max_size_mb as u64) * 1024 * 1024;
        match SizeRotatingWriter::new(Path::new(dir), max_size) {
            Ok(writer) => {
                let (non_blocking, g) = tracing_appender::non_blocking(writer);
                guard = Some(g);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(false),
                )
            }
            Err(e) => {
                // 文件日志创建失败，只输出到控制台
                eprintln!("无法创建日志文件 {}: {}", dir, e);
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}

/// 带大小限制的日志写入器，超过上限时把当前文件轮转为 .old
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    written: u64,
    writer: Option<BufWriter<File>>,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE_NAME);
        let writer = Self::open_file(&file_path, max_size)?;
        let written = fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file_path,
            max_size,
            written,
            writer: Some(writer),
        })
    }

    fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
        // 现有文件已超过限制则先轮转
        if let Ok(metadata) = fs::metadata(file_path) {
            if metadata.len() > max_size {
                Self::rotate_log(file_path)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(BufWriter::new(file))
    }

    /// azc.log -> azc.log.old
    fn rotate_log(file_path: &Path) -> io::Result<()> {
        let backup_path = file_path.with_extension("log.old");

        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }
        fs::rename(file_path, &backup_path)
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut w) = self.writer.take() {
            w.flush()?;
        }
        Self::rotate_log(&self.file_path)?;
        self.writer = Some(Self::open_file(&self.file_path, self.max_size)?);
        self.written = 0;
        Ok(())
    }
}

impl Write for SizeRotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Writer not available"))?;
        let n = writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotates_past_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SizeRotatingWriter::new(dir.path(), 16).unwrap();

        writer.write_all(b"first line 0123\n").unwrap();
        writer.write_all(b"second line\n").unwrap();
        writer.flush().unwrap();

        let current = fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        let old = fs::read_to_string(dir.path().join("azc.log.old")).unwrap();
        assert_eq!(current, "second line\n");
        assert_eq!(old, "first line 0123\n");
    }

    #[test]
    fn test_appends_below_max_size() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer = SizeRotatingWriter::new(dir.path(), 1024).unwrap();
            writer.write_all(b"a\n").unwrap();
            writer.flush().unwrap();
        }
        let mut writer = SizeRotatingWriter::new(dir.path(), 1024).unwrap();
        writer.write_all(b"b\n").unwrap();
        writer.flush().unwrap();

        let current = fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(current, "a\nb\n");
        assert!(!dir.path().join("azc.log.old").exists());
    }
}
