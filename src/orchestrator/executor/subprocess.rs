//! 子进程策略：每个分桶一个 worker 进程，全部同时启动

use tracing::info;

use crate::error::AppResult;
use crate::orchestrator::executor::process::{run_processes, WorkerCommand};
use crate::orchestrator::executor::{Execution, Executor};
use crate::orchestrator::payload::{WorkerBucket, WorkerSettings};

pub struct SubprocessExecutor {
    command: WorkerCommand,
}

impl SubprocessExecutor {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }
}

impl Executor for SubprocessExecutor {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    fn execute(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<Execution> {
        info!("🧩 子进程策略: 启动 {} 个 worker 进程", buckets.len());
        let report = run_processes(&self.command, buckets, settings, buckets.len(), None)?;
        Ok(Execution::new(self.name(), report))
    }
}
