//! 应用配置模块 - 凭据解析，环境变量优先于配置文件

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "./azc.properties";

pub const KEY_ACCOUNT: &str = "AZURE_STORAGE_ACCOUNT";
pub const KEY_ACCESS_KEY: &str = "AZURE_STORAGE_ACCESS_KEY";
pub const KEY_CONTAINER: &str = "CONTAINER_NAME";
pub const KEY_USE_PROXY: &str = "USE_PROXY";
pub const KEY_PROXY_HOST: &str = "HTTPS_PROXY";
pub const KEY_PROXY_PORT: &str = "HTTPS_PROXY_PORT";
pub const KEY_LOG_LEVEL: &str = "LOG_LEVEL";
pub const KEY_LOG_DIR: &str = "LOG_DIR";
pub const KEY_LOG_MAX_SIZE_MB: &str = "LOG_MAX_SIZE_MB";

/// 代理配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    pub level: String,
    /// 设置后同时写入该目录下的日志文件
    pub dir: Option<String>,
    /// 最大日志文件大小（MB）
    pub max_size_mb: u32,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
            max_size_mb: default_max_size_mb(),
        }
    }
}

impl LogSettings {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 解析完成的运行配置
#[derive(Debug, Clone)]
pub struct Settings {
    pub account_name: String,
    pub account_key: String,
    pub container_name: String,
    pub proxy: Option<ProxySettings>,
    pub log: LogSettings,
}

/// JSON 格式的配置文件（扁平对象）
#[derive(Debug, Default, Deserialize)]
struct JsonConfig {
    #[serde(flatten)]
    values: HashMap<String, serde_json::Value>,
}

impl Settings {
    /// 从配置文件和进程环境变量解析
    pub fn load(config_path: &Path) -> Result<Self> {
        let file = load_config_file(config_path)?;
        Self::resolve(|key| std::env::var(key).ok(), &file)
    }

    /// 按 "环境变量 > 配置文件" 的顺序解析各项配置
    pub fn resolve<F>(env: F, file: &HashMap<String, String>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| -> Option<String> {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.get(key).cloned())
                .map(|v| v.trim().to_string())
        };
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SyncError::Setup(format!("未定义 {}", key)))
        };

        let account_name = required(KEY_ACCOUNT)?;
        let account_key = required(KEY_ACCESS_KEY)?;
        let container_name = required(KEY_CONTAINER)?;

        let use_proxy = lookup(KEY_USE_PROXY)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let proxy = if use_proxy {
            let host = required(KEY_PROXY_HOST)?;
            let port = required(KEY_PROXY_PORT)?;
            let port = port
                .parse::<u16>()
                .map_err(|_| SyncError::Setup(format!("{} 不是有效端口: {}", KEY_PROXY_PORT, port)))?;
            Some(ProxySettings { host, port })
        } else {
            None
        };

        let log = LogSettings {
            level: lookup(KEY_LOG_LEVEL).unwrap_or_else(default_level),
            dir: lookup(KEY_LOG_DIR),
            max_size_mb: lookup(KEY_LOG_MAX_SIZE_MB)
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_size_mb),
        };

        Ok(Self {
            account_name,
            account_key,
            container_name,
            proxy,
            log,
        })
    }
}

/// 读取配置文件，文件不存在时返回空表（配置可能全部来自环境变量）
pub fn load_config_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        tracing::debug!("配置文件不存在: {:?}", path);
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| SyncError::Setup(format!("无法读取配置文件 {:?}: {}", path, e)))?;

    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        parse_json(&content)
    } else {
        Ok(parse_properties(&content))
    }
}

fn parse_json(content: &str) -> Result<HashMap<String, String>> {
    let config: JsonConfig = serde_json::from_str(content)
        .map_err(|e| SyncError::Setup(format!("配置文件格式错误: {}", e)))?;

    Ok(config
        .values
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k, s)),
            serde_json::Value::Bool(b) => Some((k, b.to_string())),
            serde_json::Value::Number(n) => Some((k, n.to_string())),
            _ => None,
        })
        .collect())
}

/// 解析 properties 格式: key=value 或 key: value，# 和 ! 开头为注释
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let idx = line.find(['=', ':'])?;
            let key = line[..idx].trim();
            let value = line[idx + 1..].trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_properties() {
        let props = parse_properties(
            "# comment\n! other comment\n\nAZURE_STORAGE_ACCOUNT = acct\nCONTAINER_NAME: box\nHTTPS_PROXY=http://p:1\n",
        );
        assert_eq!(props.get("AZURE_STORAGE_ACCOUNT").unwrap(), "acct");
        assert_eq!(props.get("CONTAINER_NAME").unwrap(), "box");
        // 只在第一个分隔符处切分
        assert_eq!(props.get("HTTPS_PROXY").unwrap(), "http://p:1");
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = file_map(&[
            (KEY_ACCOUNT, "file-acct"),
            (KEY_ACCESS_KEY, "file-key"),
            (KEY_CONTAINER, "file-box"),
        ]);
        let env = |key: &str| match key {
            KEY_ACCOUNT => Some("env-acct".to_string()),
            KEY_CONTAINER => Some("".to_string()),
            _ => None,
        };

        let settings = Settings::resolve(env, &file).unwrap();
        assert_eq!(settings.account_name, "env-acct");
        assert_eq!(settings.account_key, "file-key");
        // 空环境变量视为未设置
        assert_eq!(settings.container_name, "file-box");
        assert_eq!(settings.proxy, None);
        assert_eq!(settings.log, LogSettings::default());
    }

    #[test]
    fn test_missing_required_is_setup_error() {
        let file = file_map(&[(KEY_ACCOUNT, "a"), (KEY_ACCESS_KEY, "k")]);
        let err = Settings::resolve(no_env, &file).unwrap_err();
        assert!(matches!(err, SyncError::Setup(ref m) if m.contains(KEY_CONTAINER)));
    }

    #[test]
    fn test_proxy_settings() {
        let mut file = file_map(&[
            (KEY_ACCOUNT, "a"),
            (KEY_ACCESS_KEY, "k"),
            (KEY_CONTAINER, "c"),
            (KEY_USE_PROXY, "TRUE"),
            (KEY_PROXY_HOST, "proxy.local"),
            (KEY_PROXY_PORT, "3128"),
        ]);
        let settings = Settings::resolve(no_env, &file).unwrap();
        assert_eq!(
            settings.proxy,
            Some(ProxySettings {
                host: "proxy.local".to_string(),
                port: 3128
            })
        );

        file.insert(KEY_PROXY_PORT.to_string(), "not-a-port".to_string());
        assert!(matches!(
            Settings::resolve(no_env, &file),
            Err(SyncError::Setup(_))
        ));
    }

    #[test]
    fn test_load_json_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();

        let missing = load_config_file(&dir.path().join("none.properties")).unwrap();
        assert!(missing.is_empty());

        let path = dir.path().join("azc.json");
        fs::write(
            &path,
            r#"{"AZURE_STORAGE_ACCOUNT":"a","USE_PROXY":false,"HTTPS_PROXY_PORT":8080,"nested":{}}"#,
        )
        .unwrap();
        let values = load_config_file(&path).unwrap();
        assert_eq!(values.get(KEY_ACCOUNT).unwrap(), "a");
        assert_eq!(values.get(KEY_USE_PROXY).unwrap(), "false");
        assert_eq!(values.get(KEY_PROXY_PORT).unwrap(), "8080");
        assert!(!values.contains_key("nested"));
    }

    #[test]
    fn test_log_settings_from_file() {
        let file = file_map(&[
            (KEY_ACCOUNT, "a"),
            (KEY_ACCESS_KEY, "k"),
            (KEY_CONTAINER, "c"),
            (KEY_LOG_LEVEL, "debug"),
            (KEY_LOG_DIR, "/tmp/azc-logs"),
            (KEY_LOG_MAX_SIZE_MB, "12"),
        ]);
        let settings = Settings::resolve(no_env, &file).unwrap();
        assert_eq!(settings.log.tracing_level(), tracing::Level::DEBUG);
        assert_eq!(settings.log.dir.as_deref(), Some("/tmp/azc-logs"));
        assert_eq!(settings.log.max_size_mb, 12);
    }
}
