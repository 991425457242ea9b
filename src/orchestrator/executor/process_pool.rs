//! 进程池策略：最多 `max_workers` 个 worker 进程
//!
//! 在 `timeout` 内没有任何进程完成时返回 [`AppError::WorkerPoolTimeout`](crate::error::AppError)，
//! 由 [`WithFallback`](super::WithFallback) 决定如何回退。

use std::time::Duration;

use tracing::info;

use crate::error::AppResult;
use crate::orchestrator::executor::process::{run_processes, WorkerCommand};
use crate::orchestrator::executor::{Execution, Executor};
use crate::orchestrator::payload::{WorkerBucket, WorkerSettings};

pub struct ProcessPoolExecutor {
    command: WorkerCommand,
    max_workers: usize,
    timeout: Duration,
}

impl ProcessPoolExecutor {
    pub fn new(command: WorkerCommand, max_workers: usize, timeout: Duration) -> Self {
        Self {
            command,
            max_workers: max_workers.max(1),
            timeout,
        }
    }
}

impl Executor for ProcessPoolExecutor {
    fn name(&self) -> &'static str {
        "process"
    }

    fn execute(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<Execution> {
        info!(
            "🏊 进程池策略: {} 个分桶, 最多 {} 个进程, 首个完成期限 {:?}",
            buckets.len(),
            self.max_workers,
            self.timeout
        );
        let report = run_processes(
            &self.command,
            buckets,
            settings,
            self.max_workers,
            Some(self.timeout),
        )?;
        Ok(Execution::new(self.name(), report))
    }
}
