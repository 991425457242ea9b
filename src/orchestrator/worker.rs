//! 分桶执行器 - 编排层
//!
//! 一个分桶内的任务严格按顺序执行；开启 `reuse_page` 时，
//! 同一版面的连续任务共用一个页面（独立浏览器上下文）。
//!
//! 也是隐藏子命令 `worker` 的入口：读取载荷、执行、写回结果文件。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::browser::ChromiumLauncher;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{BrowserLauncher, BrowserSession, DomHandle};
use crate::models::job::Job;
use crate::models::report::{JobMetric, PartialReport};
use crate::orchestrator::executor::fast_path;
use crate::orchestrator::payload::{WorkerBucket, WorkerPayload, WorkerSettings};
use crate::services::{write_json_atomic, DedupLedger};
use crate::utils::logging::{init_tracing, log_bucket_complete, log_bucket_start};
use crate::workflow::{lock_accumulator, Accumulator, EditionFlow, JobCtx};

/// 打开去重账本（每个进程只调用一次）
pub fn open_ledger(state_file: Option<&Path>) -> AppResult<DedupLedger> {
    match state_file {
        Some(path) => DedupLedger::open(path),
        None => Ok(DedupLedger::in_memory()),
    }
}

/// 为一个进程准备累加器
pub fn new_accumulator(settings: &WorkerSettings) -> AppResult<Accumulator> {
    Ok(Accumulator::new(open_ledger(settings.state_file.as_deref())?))
}

/// 构建单线程运行时
pub fn current_thread_runtime() -> AppResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::from)
}

fn record_job_error(acc: &Mutex<Accumulator>, job: &Job, err: &AppError) {
    let mut metric = JobMetric::for_job(job);
    metric.error_kind = Some(err.kind());
    metric.error = Some(err.to_string());
    lock_accumulator(acc).record(metric);
}

async fn close_page(page: Box<dyn DomHandle>) {
    if let Err(e) = page.close().await {
        warn!("关闭页面失败: {}", e);
    }
}

/// 在已启动的浏览器中执行一个分桶
pub async fn run_bucket_in_session(
    session: &dyn BrowserSession,
    bucket: &WorkerBucket,
    settings: &WorkerSettings,
    flow: &EditionFlow,
    acc: &Mutex<Accumulator>,
) {
    log_bucket_start(bucket.index, bucket.jobs.len());

    let mut current: Option<(Box<dyn DomHandle>, (String, String))> = None;
    let mut ok = 0;

    for job in &bucket.jobs {
        let ctx = JobCtx::new(bucket.index, job);
        let edition = (job.date.clone(), job.section.clone());

        let reusable = settings.reuse_page
            && current.as_ref().is_some_and(|(_, open)| *open == edition);
        if !reusable {
            if let Some((page, _)) = current.take() {
                close_page(page).await;
            }
            match session.new_page().await {
                Ok(page) => current = Some((page, edition)),
                Err(e) => {
                    error!("{} ❌ [{}] 无法创建页面: {}", ctx, e.kind(), e);
                    record_job_error(acc, job, &e);
                    continue;
                }
            }
        }

        if let Some((page, _)) = &current {
            if flow.run(page.as_ref(), job, &ctx, acc).await.ok {
                ok += 1;
            }
        }

        if !settings.reuse_page {
            if let Some((page, _)) = current.take() {
                close_page(page).await;
            }
        }
    }

    if let Some((page, _)) = current.take() {
        close_page(page).await;
    }
    log_bucket_complete(bucket.index, ok, bucket.jobs.len());
}

/// 启动浏览器并执行一个分桶；启动失败时整个分桶记为失败
pub async fn run_bucket(
    launcher: &dyn BrowserLauncher,
    bucket: &WorkerBucket,
    settings: &WorkerSettings,
    flow: &EditionFlow,
    acc: &Mutex<Accumulator>,
) {
    let session = match launcher.launch().await {
        Ok(session) => session,
        Err(e) => {
            error!("[分桶 {}] ❌ [{}] 浏览器启动失败: {}", bucket.index, e.kind(), e);
            lock_accumulator(acc).fill_missing(&bucket.jobs, &format!("浏览器启动失败: {}", e));
            return;
        }
    };

    run_bucket_in_session(session.as_ref(), bucket, settings, flow, acc).await;

    if let Err(e) = session.close().await {
        warn!("[分桶 {}] 关闭浏览器失败: {}", bucket.index, e);
    }
}

/// 在当前线程中依次执行若干分桶（普通 worker 进程使用）
pub fn run_buckets_blocking(
    buckets: &[WorkerBucket],
    settings: &WorkerSettings,
    launcher: &dyn BrowserLauncher,
) -> AppResult<PartialReport> {
    let runtime = current_thread_runtime()?;
    let acc = Mutex::new(new_accumulator(settings)?);
    let flow = EditionFlow::new(settings.flow.clone())?;

    runtime.block_on(async {
        for bucket in buckets {
            run_bucket(launcher, bucket, settings, &flow, &acc).await;
        }
    });

    let report = lock_accumulator(&acc).take_report();
    Ok(report)
}

/// 隐藏子命令 `worker` 的入口
pub fn run_worker(payload_path: &Path, result_path: &Path, fast: bool) -> AppResult<()> {
    let payload = WorkerPayload::read_from(payload_path)?;
    init_tracing(payload.settings.log_file.as_deref())?;
    info!(
        "🔧 worker 启动: {} 个分桶, {} 个任务{}",
        payload.buckets.len(),
        payload.job_count(),
        if fast { " (快速路径)" } else { "" }
    );

    let launcher = ChromiumLauncher::new(payload.settings.browser.clone());
    let report = if fast {
        fast_path::run_in_process(&payload.buckets, &payload.settings, &launcher)?
    } else {
        run_buckets_blocking(&payload.buckets, &payload.settings, &launcher)?
    };

    write_json_atomic(result_path, &report)?;
    info!("🔧 worker 结束: 成功 {}/{}", report.ok, report.total());
    Ok(())
}

/// 单个任务（`run` 子命令）：结果写到 `out`
pub async fn run_single(
    job: Job,
    mut settings: WorkerSettings,
    launcher: &dyn BrowserLauncher,
    out: &Path,
) -> AppResult<JobMetric> {
    settings.flow.out_dir = out
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    settings.flow.pattern = out
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| AppError::config(format!("无效的输出路径: {}", out.display())))?;

    let acc = Mutex::new(new_accumulator(&settings)?);
    let flow = EditionFlow::new(settings.flow.clone())?;
    let bucket = WorkerBucket {
        index: 1,
        jobs: vec![job],
    };
    run_bucket(launcher, &bucket, &settings, &flow, &acc).await;

    let mut report = lock_accumulator(&acc).take_report();
    report
        .metrics
        .pop()
        .ok_or_else(|| AppError::job("任务没有产生结果"))
}
