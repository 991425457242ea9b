//! 执行策略
//!
//! 三种可互换的策略都包装同一个单任务流程：
//!
//! - `subprocess`：每个分桶一个进程，隔离性最好
//! - `thread`：每个分桶一个线程（各自的运行时和浏览器）
//! - `process`：有上限的进程池，首个完成超时后整体回退到线程策略
//!
//! 另有可选的快速路径（[`FastPath`]），失败时静默回退到上述策略。

pub mod fallback;
pub mod fast_path;
pub mod process;
pub mod process_pool;
pub mod subprocess;
pub mod thread;

use std::sync::Arc;
use std::time::Duration;

use crate::config::StrategyKind;
use crate::error::AppResult;
use crate::infrastructure::BrowserLauncher;
use crate::models::report::PartialReport;
use crate::orchestrator::payload::{WorkerBucket, WorkerSettings};

pub use fallback::WithFallback;
pub use fast_path::FastPath;
pub use process::WorkerCommand;
pub use process_pool::ProcessPoolExecutor;
pub use subprocess::SubprocessExecutor;
pub use thread::ThreadExecutor;

/// 一次执行的结果
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub report: PartialReport,
    /// 实际完成工作的策略
    pub strategy: String,
    pub fallback_used: bool,
}

impl Execution {
    pub fn new(strategy: &str, report: PartialReport) -> Self {
        Self {
            report,
            strategy: strategy.to_string(),
            fallback_used: false,
        }
    }
}

/// 执行策略
///
/// 同步接口：策略自己管理线程、进程或运行时。
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<Execution>;
}

/// 可配置的策略（封闭集合）
pub enum ExecutorStrategy {
    Subprocess(SubprocessExecutor),
    Thread(ThreadExecutor),
    Process(WithFallback<ProcessPoolExecutor, ThreadExecutor>),
}

impl ExecutorStrategy {
    pub fn build(
        kind: StrategyKind,
        command: WorkerCommand,
        launcher: Arc<dyn BrowserLauncher>,
        max_workers: usize,
        pool_timeout: Duration,
    ) -> Self {
        match kind {
            StrategyKind::Subprocess => {
                ExecutorStrategy::Subprocess(SubprocessExecutor::new(command))
            }
            StrategyKind::Thread => ExecutorStrategy::Thread(ThreadExecutor::new(launcher)),
            StrategyKind::Process => ExecutorStrategy::Process(WithFallback::new(
                ProcessPoolExecutor::new(command, max_workers, pool_timeout),
                ThreadExecutor::new(launcher),
            )),
        }
    }
}

impl Executor for ExecutorStrategy {
    fn name(&self) -> &'static str {
        match self {
            ExecutorStrategy::Subprocess(e) => e.name(),
            ExecutorStrategy::Thread(e) => e.name(),
            ExecutorStrategy::Process(e) => e.name(),
        }
    }

    fn execute(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<Execution> {
        match self {
            ExecutorStrategy::Subprocess(e) => e.execute(buckets, settings),
            ExecutorStrategy::Thread(e) => e.execute(buckets, settings),
            ExecutorStrategy::Process(e) => e.execute(buckets, settings),
        }
    }
}
