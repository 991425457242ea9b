//! Worker 载荷
//!
//! 父进程与 worker 进程之间只通过这里的序列化文件交换数据。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::browser::BrowserOptions;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::job::Job;
use crate::models::report::PartialReport;
use crate::services::write_json_atomic;
use crate::workflow::FlowSettings;

/// 所有 worker 共用的设置（从配置和命令行复制而来，只读）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub flow: FlowSettings,
    #[serde(default)]
    pub browser: BrowserOptions,
    /// 去重账本文件
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<String>,
    /// 同一版面的连续任务复用页面
    #[serde(default)]
    pub reuse_page: bool,
}

impl WorkerSettings {
    /// 由程序配置生成，输出写到 `out_dir`
    pub fn from_config(config: &Config, out_dir: &Path) -> Self {
        Self {
            flow: FlowSettings {
                base_url: config.base_url.clone(),
                nav_retries: config.nav_retries,
                max_pages: config.max_pages,
                repopulation_timeout_ms: config.repopulation_timeout.as_millis() as u64,
                repopulation_poll_ms: config.repopulation_poll.as_millis() as u64,
                out_dir: out_dir.to_path_buf(),
                cache_dir: Some(out_dir.join(".cache")),
                ..Default::default()
            },
            browser: BrowserOptions::from_config(config),
            state_file: None,
            log_file: config.log_file.clone(),
            reuse_page: false,
        }
    }
}

/// 交给一个 worker 的分桶
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerBucket {
    /// 分桶序号（从1开始）
    pub index: usize,
    pub jobs: Vec<Job>,
}

/// 写给 worker 进程的载荷
///
/// 普通 worker 只收到一个分桶；快速路径会收到全部分桶。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub buckets: Vec<WorkerBucket>,
    pub settings: WorkerSettings,
}

impl WorkerPayload {
    pub fn job_count(&self) -> usize {
        self.buckets.iter().map(|b| b.jobs.len()).sum()
    }

    pub fn write_to(&self, path: &Path) -> AppResult<()> {
        write_json_atomic(path, self)
    }

    pub fn read_from(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AppError::file(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::config(format!("无法解析载荷 {}: {}", path.display(), e)))
    }
}

/// 读取 worker 写回的结果
pub fn read_result(path: &Path) -> AppResult<PartialReport> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::file(path, e))?;
    Ok(serde_json::from_str(&content)?)
}
