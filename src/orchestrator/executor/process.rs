//! 子进程管理
//!
//! 子进程策略和进程池策略共用：为每个分桶写载荷文件、启动 worker 进程、
//! 轮询退出状态、读回结果文件。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::report::PartialReport;
use crate::orchestrator::payload::{read_result, WorkerBucket, WorkerPayload, WorkerSettings};

/// 轮询子进程的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 启动 worker 的命令
///
/// 默认是当前可执行文件；测试中可以换成任意程序。
/// 实际参数为 `args... worker --payload P --result R [--fast]`。
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// 当前可执行文件
    pub fn current() -> AppResult<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, Vec::new()))
    }

    pub fn spawn(&self, payload: &Path, result: &Path, fast: bool) -> std::io::Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("worker")
            .arg("--payload")
            .arg(payload)
            .arg("--result")
            .arg(result);
        if fast {
            command.arg("--fast");
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
    }
}

/// 一个分桶对应的进程任务
struct ProcessTask {
    bucket: WorkerBucket,
    payload_path: PathBuf,
    result_path: PathBuf,
}

struct Running {
    task: ProcessTask,
    child: Child,
}

fn kill_all(running: &mut Vec<Running>) {
    for r in running.iter_mut() {
        if let Err(e) = r.child.kill() {
            debug!("结束 worker 进程失败 (可能已退出): {}", e);
        }
        let _ = r.child.wait();
    }
    running.clear();
}

/// 根据退出状态和结果文件得到分桶结果；任何异常都记为整桶失败
fn collect_outcome(task: &ProcessTask, status: ExitStatus) -> PartialReport {
    let jobs = &task.bucket.jobs;
    if !status.success() {
        warn!("[分桶 {}] ⚠️ worker 异常退出: {}", task.bucket.index, status);
        return PartialReport::lost_bucket(jobs, &format!("worker 异常退出: {}", status));
    }
    match read_result(&task.result_path) {
        Ok(mut report) => {
            let filled = report.fill_missing(jobs, "worker 结果中缺少该任务");
            if filled > 0 {
                warn!("[分桶 {}] ⚠️ 结果中缺少 {} 个任务", task.bucket.index, filled);
            }
            report
        }
        Err(e) => {
            warn!("[分桶 {}] ⚠️ 无法读取 worker 结果: {}", task.bucket.index, e);
            PartialReport::lost_bucket(jobs, &format!("无法读取 worker 结果: {}", e))
        }
    }
}

/// 以子进程执行全部分桶
///
/// - 同时运行的进程数不超过 `max_parallel`
/// - 给出 `first_deadline` 时：若在期限内没有任何进程完成，结束所有进程并返回
///   [`AppError::WorkerPoolTimeout`]；第一个完成之后不再有期限
pub fn run_processes(
    command: &WorkerCommand,
    buckets: &[WorkerBucket],
    settings: &WorkerSettings,
    max_parallel: usize,
    first_deadline: Option<Duration>,
) -> AppResult<PartialReport> {
    let workdir = tempfile::Builder::new().prefix("dou_batch_").tempdir()?;
    let mut pending: VecDeque<ProcessTask> = VecDeque::new();
    for bucket in buckets {
        let payload_path = workdir.path().join(format!("payload_{}.json", bucket.index));
        let result_path = workdir.path().join(format!("result_{}.json", bucket.index));
        WorkerPayload {
            buckets: vec![bucket.clone()],
            settings: settings.clone(),
        }
        .write_to(&payload_path)?;
        pending.push_back(ProcessTask {
            bucket: bucket.clone(),
            payload_path,
            result_path,
        });
    }

    let max_parallel = max_parallel.max(1);
    let started = Instant::now();
    let mut running: Vec<Running> = Vec::new();
    let mut report = PartialReport::default();
    let mut completed = 0usize;

    loop {
        while running.len() < max_parallel {
            let Some(task) = pending.pop_front() else {
                break;
            };
            match command.spawn(&task.payload_path, &task.result_path, false) {
                Ok(child) => {
                    debug!("[分桶 {}] worker 进程已启动 (pid {})", task.bucket.index, child.id());
                    running.push(Running { task, child });
                }
                Err(e) if first_deadline.is_some() && completed == 0 => {
                    kill_all(&mut running);
                    return Err(AppError::job(format!("无法启动 worker 进程: {}", e)));
                }
                Err(e) => {
                    error!("[分桶 {}] ❌ 无法启动 worker 进程: {}", task.bucket.index, e);
                    report.merge(PartialReport::lost_bucket(
                        &task.bucket.jobs,
                        &format!("无法启动 worker 进程: {}", e),
                    ));
                }
            }
        }

        if running.is_empty() && pending.is_empty() {
            break;
        }

        let mut i = 0;
        while i < running.len() {
            match running[i].child.try_wait() {
                Ok(Some(status)) => {
                    let done = running.swap_remove(i);
                    let partial = collect_outcome(&done.task, status);
                    info!(
                        "[分桶 {}] worker 结束: 成功 {}/{}",
                        done.task.bucket.index,
                        partial.ok,
                        partial.total()
                    );
                    report.merge(partial);
                    completed += 1;
                }
                Ok(None) => i += 1,
                Err(e) => {
                    let mut lost = running.swap_remove(i);
                    let _ = lost.child.kill();
                    error!("[分桶 {}] ❌ 无法获取 worker 状态: {}", lost.task.bucket.index, e);
                    report.merge(PartialReport::lost_bucket(
                        &lost.task.bucket.jobs,
                        &format!("无法获取 worker 状态: {}", e),
                    ));
                    completed += 1;
                }
            }
        }

        if completed == 0 {
            if let Some(deadline) = first_deadline {
                if started.elapsed() >= deadline {
                    warn!(
                        "⏱️ {} 秒内没有任何 worker 完成，结束 {} 个进程",
                        deadline.as_secs(),
                        running.len()
                    );
                    kill_all(&mut running);
                    return Err(AppError::WorkerPoolTimeout {
                        timeout_secs: deadline.as_secs(),
                    });
                }
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    Ok(report)
}
