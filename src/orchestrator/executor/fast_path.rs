//! 快速路径
//!
//! 把所有分桶放进一个进程：一个浏览器，每个分桶一个独立上下文，
//! 在同一个运行时中并发执行。调用方已处于异步运行时中时，
//! 改为在一个 `worker --fast` 子进程中执行，不嵌套运行时。
//!
//! 任何失败都直接返回错误，由调用方回退到常规策略。

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::BrowserLauncher;
use crate::models::report::PartialReport;
use crate::orchestrator::executor::process::WorkerCommand;
use crate::orchestrator::executor::{Execution, Executor};
use crate::orchestrator::payload::{read_result, WorkerBucket, WorkerPayload, WorkerSettings};
use crate::orchestrator::worker::{current_thread_runtime, new_accumulator, run_bucket_in_session};
use crate::workflow::{lock_accumulator, EditionFlow};

pub struct FastPath {
    command: WorkerCommand,
    launcher: Arc<dyn BrowserLauncher>,
}

impl FastPath {
    pub fn new(command: WorkerCommand, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { command, launcher }
    }

    fn run_in_subprocess(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<PartialReport> {
        let workdir = tempfile::Builder::new().prefix("dou_batch_fast_").tempdir()?;
        let payload_path = workdir.path().join("payload.json");
        let result_path = workdir.path().join("result.json");
        WorkerPayload {
            buckets: buckets.to_vec(),
            settings: settings.clone(),
        }
        .write_to(&payload_path)?;

        let status = self
            .command
            .spawn(&payload_path, &result_path, true)?
            .wait()?;
        if !status.success() {
            return Err(AppError::job(format!("快速路径子进程异常退出: {}", status)));
        }
        read_result(&result_path)
    }
}

/// 在当前进程中执行（调用方不能处于异步运行时中）
pub fn run_in_process(
    buckets: &[WorkerBucket],
    settings: &WorkerSettings,
    launcher: &dyn BrowserLauncher,
) -> AppResult<PartialReport> {
    let runtime = current_thread_runtime()?;
    let acc = Mutex::new(new_accumulator(settings)?);
    let flow = EditionFlow::new(settings.flow.clone())?;

    runtime.block_on(async {
        let session = launcher.launch().await?;
        join_all(
            buckets
                .iter()
                .map(|bucket| run_bucket_in_session(session.as_ref(), bucket, settings, &flow, &acc)),
        )
        .await;
        if let Err(e) = session.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        Ok::<(), AppError>(())
    })?;

    let report = lock_accumulator(&acc).take_report();
    Ok(report)
}

impl Executor for FastPath {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn execute(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<Execution> {
        let expected: usize = buckets.iter().map(|b| b.jobs.len()).sum();
        let report = if tokio::runtime::Handle::try_current().is_ok() {
            info!("⚡ 快速路径: 当前已有异步运行时，改在子进程中执行");
            self.run_in_subprocess(buckets, settings)?
        } else {
            info!("⚡ 快速路径: 单浏览器 {} 个上下文并发执行", buckets.len());
            run_in_process(buckets, settings, self.launcher.as_ref())?
        };

        if report.total() != expected {
            return Err(AppError::job(format!(
                "快速路径结果不完整: {}/{}",
                report.total(),
                expected
            )));
        }
        Ok(Execution::new(self.name(), report))
    }
}
