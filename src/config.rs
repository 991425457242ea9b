use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// 执行后端
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// 每个分桶一个子进程
    Subprocess,
    /// 每个分桶一个线程（共享进程）
    Thread,
    /// 有界进程池，超时后整体回退到线程
    Process,
}

impl FromStr for StrategyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subprocess" => Ok(StrategyKind::Subprocess),
            "thread" | "threads" => Ok(StrategyKind::Thread),
            "process" | "pool" | "process-pool" => Ok(StrategyKind::Process),
            other => Err(AppError::config(format!(
                "未知的执行策略 '{}' (可选: subprocess|thread|process)",
                other
            ))),
        }
    }
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Subprocess => "subprocess",
            StrategyKind::Thread => "thread",
            StrategyKind::Process => "process",
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 执行后端
    pub strategy: StrategyKind,
    /// 最大并发 worker 数
    pub max_workers: usize,
    /// 分桶最小尺寸
    pub min_bucket_size: usize,
    /// 是否尝试单进程快速路径
    pub fast_path: bool,
    /// 进程池等待首个完成的超时
    pub pool_timeout: Duration,
    /// 下拉框重新填充的等待上限
    pub repopulation_timeout: Duration,
    /// 下拉框重新填充的轮询间隔
    pub repopulation_poll: Duration,
    /// 门户地址
    pub base_url: String,
    /// 浏览器调试端口（设置后连接已有浏览器而非启动新浏览器）
    pub browser_debug_port: Option<u16>,
    /// 浏览器可执行文件
    pub chrome_executable: Option<String>,
    /// 有界面模式
    pub headful: bool,
    /// 每个浏览器动作前的延迟（毫秒）
    pub slow_mo_ms: u64,
    /// 每个任务最多翻页数
    pub max_pages: usize,
    /// 导航重试次数
    pub nav_retries: u32,
    /// 输出日志文件
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Process,
            max_workers: 4,
            min_bucket_size: 2,
            fast_path: false,
            pool_timeout: Duration::from_secs(60),
            repopulation_timeout: Duration::from_millis(15_000),
            repopulation_poll: Duration::from_millis(250),
            base_url: "https://www.in.gov.br/leiturajornal".to_string(),
            browser_debug_port: None,
            chrome_executable: None,
            headful: false,
            slow_mo_ms: 0,
            max_pages: 5,
            nav_retries: 3,
            log_file: None,
        }
    }
}

impl Config {
    /// 从环境变量读取配置，缺省值见 `Default`
    ///
    /// 执行策略名称无法识别时返回配置错误，其余数值解析失败时回退到默认值。
    pub fn from_env() -> AppResult<Self> {
        let default = Self::default();
        let strategy = match std::env::var("EXECUTOR_STRATEGY") {
            Ok(v) if !v.trim().is_empty() => v.parse()?,
            _ => default.strategy,
        };

        Ok(Self {
            strategy,
            max_workers: env_parse("MAX_WORKERS").unwrap_or(default.max_workers).max(1),
            min_bucket_size: env_parse("MIN_BUCKET_SIZE")
                .unwrap_or(default.min_bucket_size)
                .max(1),
            fast_path: env_flag("FAST_PATH").unwrap_or(default.fast_path),
            pool_timeout: env_parse("POOL_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.pool_timeout),
            repopulation_timeout: env_parse("REPOPULATION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.repopulation_timeout),
            repopulation_poll: env_parse("REPOPULATION_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.repopulation_poll),
            base_url: std::env::var("BASE_URL").unwrap_or(default.base_url),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT"),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok(),
            headful: env_flag("HEADFUL").unwrap_or(default.headful),
            slow_mo_ms: env_parse("SLOW_MO_MS").unwrap_or(default.slow_mo_ms),
            max_pages: env_parse("MAX_PAGES").unwrap_or(default.max_pages).max(1),
            nav_retries: env_parse("NAV_RETRIES").unwrap_or(default.nav_retries).max(1),
            log_file: std::env::var("LOG_FILE").ok(),
        })
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("thread".parse::<StrategyKind>().unwrap(), StrategyKind::Thread);
        assert_eq!(
            " Subprocess ".parse::<StrategyKind>().unwrap(),
            StrategyKind::Subprocess
        );
        assert_eq!("pool".parse::<StrategyKind>().unwrap(), StrategyKind::Process);

        let err = "fibers".parse::<StrategyKind>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.min_bucket_size, 2);
        assert_eq!(config.pool_timeout, Duration::from_secs(60));
        assert_eq!(config.repopulation_poll, Duration::from_millis(250));
    }
}
