use std::fmt;

use thiserror::Error;

/// 错误分类
///
/// 用于日志和每个任务的指标（`error_kind` 字段）。
/// 只有 `Config` 会让进程以非零状态退出，其余都记入批量报告的 `fail` 计数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 批量配置缺失或无效
    Config,
    /// 级联下拉框在某一级选择失败
    Selection,
    /// 网络/导航超时（重试耗尽后按选择失败处理）
    Navigation,
    /// 进程池在超时内没有任何完成
    WorkerPoolTimeout,
    /// 单个任务执行中的其他错误
    Job,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Selection => "SelectionError",
            ErrorKind::Navigation => "NavigationError",
            ErrorKind::WorkerPoolTimeout => "WorkerPoolTimeout",
            ErrorKind::Job => "JobError",
        };
        f.write_str(name)
    }
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 级联选择失败（level 为失败的层级，0 表示导航阶段）
    #[error("第 {level} 级选择失败: {reason}")]
    Selection { level: u8, reason: String },

    /// 导航失败
    #[error("导航到 {url} 失败 (已尝试 {attempts} 次): {reason}")]
    Navigation {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// 进程池超时
    #[error("进程池在 {timeout_secs} 秒内没有任何任务完成")]
    WorkerPoolTimeout { timeout_secs: u64 },

    /// 任务执行错误
    #[error("任务错误: {0}")]
    Job(String),

    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(String),

    /// 文件操作错误
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON 序列化/解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他 IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// 错误所属的分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) => ErrorKind::Config,
            AppError::Selection { .. } => ErrorKind::Selection,
            AppError::Navigation { .. } => ErrorKind::Navigation,
            AppError::WorkerPoolTimeout { .. } => ErrorKind::WorkerPoolTimeout,
            AppError::Job(_)
            | AppError::Browser(_)
            | AppError::File { .. }
            | AppError::Json(_)
            | AppError::Io(_) => ErrorKind::Job,
        }
    }

    /// 失败的级联层级（仅选择/导航错误有）
    pub fn level_failed(&self) -> Option<u8> {
        match self {
            AppError::Selection { level, .. } => Some(*level),
            AppError::Navigation { .. } => Some(0),
            _ => None,
        }
    }

    // ========== 便捷构造函数 ==========

    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Config(msg.into())
    }

    /// 创建选择错误
    pub fn selection(level: u8, reason: impl Into<String>) -> Self {
        AppError::Selection {
            level,
            reason: reason.into(),
        }
    }

    /// 创建任务错误
    pub fn job(msg: impl Into<String>) -> Self {
        AppError::Job(msg.into())
    }

    /// 创建浏览器错误
    pub fn browser(source: impl fmt::Display) -> Self {
        AppError::Browser(source.to_string())
    }

    /// 创建带路径的文件错误
    pub fn file(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(format!("TOML解析失败: {}", err))
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(AppError::config("x").kind(), ErrorKind::Config);
        assert_eq!(AppError::selection(2, "x").kind(), ErrorKind::Selection);
        assert_eq!(AppError::browser("boom").kind(), ErrorKind::Job);
        assert_eq!(
            AppError::WorkerPoolTimeout { timeout_secs: 60 }.kind(),
            ErrorKind::WorkerPoolTimeout
        );
    }

    #[test]
    fn test_level_failed() {
        assert_eq!(AppError::selection(3, "x").level_failed(), Some(3));
        let nav = AppError::Navigation {
            url: "http://x".into(),
            attempts: 3,
            reason: "timeout".into(),
        };
        assert_eq!(nav.level_failed(), Some(0));
        assert_eq!(nav.kind(), ErrorKind::Navigation);
        assert_eq!(AppError::job("x").level_failed(), None);
    }
}
