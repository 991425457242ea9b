mod common;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{job, worker_settings, FakeLauncher, PortalTree};
use dou_batch::config::{Config, StrategyKind};
use dou_batch::error::{AppError, AppResult, ErrorKind};
use dou_batch::models::job::Job;
use dou_batch::models::output::JobOutput;
use dou_batch::models::report::BatchReport;
use dou_batch::orchestrator::distribute;
use dou_batch::orchestrator::executor::{
    Execution, Executor, SubprocessExecutor, ThreadExecutor, WithFallback, WorkerCommand,
};
use dou_batch::orchestrator::executor::ProcessPoolExecutor;
use dou_batch::orchestrator::payload::{WorkerBucket, WorkerSettings};
use dou_batch::orchestrator::{BatchOptions, BatchProcessor};

fn four_jobs() -> Vec<Job> {
    vec![
        job(0, "Ministério da Saúde", "Portaria"),
        job(1, "Ministério da Saúde", "Despacho"),
        job(2, "Ministério da Fazenda", "Portaria"),
        job(3, "Ministério da Fazenda", "Instrução Normativa"),
    ]
}

fn buckets_for(jobs: &[Job], workers: usize) -> Vec<WorkerBucket> {
    distribute(jobs, workers, 1)
        .into_iter()
        .enumerate()
        .map(|(i, indices)| WorkerBucket {
            index: i + 1,
            jobs: indices.into_iter().map(|j| jobs[j].clone()).collect(),
        })
        .collect()
}

fn titles_in(outputs: &[String]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for path in outputs {
        let output: JobOutput =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        for item in output.itens {
            *counts.entry(item.titulo).or_insert(0) += 1;
        }
    }
    counts
}

#[test]
fn test_thread_strategy_shares_one_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = worker_settings(&dir.path().join("out"));
    settings.state_file = Some(dir.path().join("state.jsonl"));

    let jobs = four_jobs();
    let buckets = buckets_for(&jobs, 2);
    assert_eq!(buckets.len(), 2);

    let launcher = Arc::new(FakeLauncher::new(PortalTree::sample()));
    let executor = ThreadExecutor::new(launcher.clone());
    let execution = executor.execute(&buckets, &settings).unwrap();

    assert_eq!(execution.strategy, "thread");
    assert!(!execution.fallback_used);
    assert_eq!(execution.report.ok, 4);
    assert_eq!(execution.report.total(), 4);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);

    // 公共条目只会被一个任务收录
    let titles = titles_in(&execution.report.outputs);
    assert_eq!(titles.get("Aviso geral"), Some(&1));
    assert_eq!(execution.report.items_total, 4 * 2 + 1);

    let ledger = std::fs::read_to_string(dir.path().join("state.jsonl")).unwrap();
    assert_eq!(ledger.lines().count(), 9);

    // 再跑一次：全部命中账本
    let again = executor.execute(&buckets, &settings).unwrap();
    assert_eq!(again.report.ok, 4);
    assert_eq!(again.report.items_total, 0);
}

#[test]
fn test_failed_job_does_not_stop_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let settings = worker_settings(dir.path());
    let mut jobs = four_jobs();
    jobs.push(job(4, "Ministério da Saúde", "Decreto"));
    let buckets = buckets_for(&jobs, 1);

    let executor = ThreadExecutor::new(Arc::new(FakeLauncher::new(PortalTree::sample())));
    let report = executor.execute(&buckets, &settings).unwrap().report;

    assert_eq!(report.ok, 4);
    assert_eq!(report.fail, 1);
    let failed = report.metrics.iter().find(|m| !m.ok).unwrap();
    assert_eq!(failed.ordinal, 4);
    assert_eq!(failed.error_kind, Some(ErrorKind::Selection));
}

#[test]
fn test_reuse_page_opens_one_page_per_edition() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = four_jobs();
    let buckets = buckets_for(&jobs, 1);

    let mut settings = worker_settings(dir.path());
    settings.reuse_page = true;
    let reusing = Arc::new(FakeLauncher::new(PortalTree::sample()));
    let report = ThreadExecutor::new(reusing.clone())
        .execute(&buckets, &settings)
        .unwrap()
        .report;
    assert_eq!(report.ok, 4);
    assert_eq!(reusing.pages.load(Ordering::SeqCst), 1);

    settings.reuse_page = false;
    let fresh = Arc::new(FakeLauncher::new(PortalTree::sample()));
    ThreadExecutor::new(fresh.clone())
        .execute(&buckets, &settings)
        .unwrap();
    assert_eq!(fresh.pages.load(Ordering::SeqCst), 4);
}

/// 先把任务全部跑完（写入账本），再报告超时
struct CollectsThenTimesOut(ThreadExecutor);

impl Executor for CollectsThenTimesOut {
    fn name(&self) -> &'static str {
        "process"
    }

    fn execute(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<Execution> {
        self.0.execute(buckets, settings)?;
        Err(AppError::WorkerPoolTimeout { timeout_secs: 60 })
    }
}

#[test]
fn test_fallback_rerun_keeps_items_collected_by_abandoned_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.jsonl");
    std::fs::write(&state, "{\"hash\":\"older-run\"}\n").unwrap();
    let mut settings = worker_settings(&dir.path().join("out"));
    settings.state_file = Some(state.clone());

    let jobs = four_jobs();
    let buckets = buckets_for(&jobs, 2);
    let launcher = Arc::new(FakeLauncher::new(PortalTree::sample()));
    let executor = WithFallback::new(
        CollectsThenTimesOut(ThreadExecutor::new(launcher.clone())),
        ThreadExecutor::new(launcher),
    );

    let execution = executor.execute(&buckets, &settings).unwrap();
    assert!(execution.fallback_used);
    assert_eq!(execution.report.ok, 4);
    assert_eq!(execution.report.items_total, 4 * 2 + 1);
    assert_eq!(titles_in(&execution.report.outputs).get("Aviso geral"), Some(&1));

    // 之前运行留下的哈希保留，被作废的那次追加不重复
    let ledger = std::fs::read_to_string(&state).unwrap();
    assert!(ledger.starts_with("{\"hash\":\"older-run\"}"));
    assert_eq!(ledger.lines().count(), 1 + 9);
}

#[cfg(unix)]
fn shell(script: &str) -> WorkerCommand {
    WorkerCommand::new("sh", vec!["-c".into(), script.into(), "sh".into()])
}

#[cfg(unix)]
#[test]
fn test_pool_timeout_falls_back_to_threads() {
    let dir = tempfile::tempdir().unwrap();
    let settings = worker_settings(dir.path());
    let jobs = four_jobs();
    let buckets = buckets_for(&jobs, 2);

    let pool = ProcessPoolExecutor::new(
        shell("exec sleep 30"),
        2,
        std::time::Duration::from_millis(300),
    );
    let launcher = Arc::new(FakeLauncher::new(PortalTree::sample()));
    let executor = WithFallback::new(pool, ThreadExecutor::new(launcher));

    let started = std::time::Instant::now();
    let execution = executor.execute(&buckets, &settings).unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(20));

    assert!(execution.fallback_used);
    assert_eq!(execution.strategy, "thread");
    assert_eq!(execution.report.total(), jobs.len());
    assert_eq!(execution.report.ok, jobs.len());
}

#[cfg(unix)]
#[test]
fn test_crashed_worker_counts_every_job_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let settings = worker_settings(dir.path());
    let jobs = four_jobs();
    let buckets = buckets_for(&jobs, 2);

    let crashed = SubprocessExecutor::new(shell("exit 3"))
        .execute(&buckets, &settings)
        .unwrap();
    assert_eq!(crashed.report.ok, 0);
    assert_eq!(crashed.report.fail, jobs.len());
    assert!(crashed
        .report
        .metrics
        .iter()
        .all(|m| m.error_kind == Some(ErrorKind::Job)));

    // 正常退出但没有写结果文件
    let silent = SubprocessExecutor::new(shell("true"))
        .execute(&buckets, &settings)
        .unwrap();
    assert_eq!(silent.report.fail, jobs.len());
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("batch.json");
    std::fs::write(
        &path,
        r#"{
            "data": "02-01-2025",
            "secaoDefault": "do1",
            "topics": [{"name": "Atos", "query": ""}],
            "combos": [
                {"key1": "Ministério da Saúde", "key2": "Portaria"},
                {"key1": "Ministério da Saúde", "key2": "Despacho"},
                {"key1": "Ministério da Fazenda", "key2": "Portaria"},
                {"key1": "Ministério da Fazenda", "key2": "Decreto"}
            ],
            "output": {"bulletin": "boletim.md"}
        }"#,
    )
    .unwrap();
    path
}

#[tokio::test]
async fn test_batch_end_to_end_with_aggregation() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let options = BatchOptions {
        config_path: write_config(dir.path()),
        out_dir: out_dir.clone(),
        parallel: Some(2),
        strategy: Some(StrategyKind::Thread),
        aggregate: true,
        ..Default::default()
    };
    let mut config = Config::default();
    config.min_bucket_size = 1;

    let processor = BatchProcessor::new(config, options)
        .unwrap()
        .with_launcher(Arc::new(FakeLauncher::new(PortalTree::sample())));
    let report = processor.run().await.unwrap();

    assert_eq!(report.total_jobs, 4);
    assert_eq!(report.ok, 3);
    assert_eq!(report.fail, 1);
    assert_eq!(report.ok + report.fail, report.total_jobs);
    assert_eq!(report.metrics.jobs.len(), 4);
    assert!(report.metrics.summary.is_some());

    let aggregated = report.aggregated.as_ref().unwrap();
    assert_eq!(aggregated.len(), 1);
    assert_eq!(aggregated[0].items, report.items_total);
    assert_eq!(report.deleted.len(), 3);
    assert!(report.deleted.iter().all(|p| !Path::new(p).exists()));

    let written: BatchReport = serde_json::from_str(
        &std::fs::read_to_string(out_dir.join("batch_report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(written.ok, 3);
    assert!(std::fs::read_to_string(out_dir.join("boletim.md"))
        .unwrap()
        .contains("Aviso geral"));
}
