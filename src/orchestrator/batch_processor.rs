//! 批量处理器 - 编排层
//!
//! ## 职责
//!
//! `batch` 子命令的完整生命周期：
//!
//! 1. **加载与展开**：读取批量配置，展开为任务列表，启动 worker 前校验
//! 2. **分桶**：按版面分组、按并发数切分
//! 3. **执行**：可选快速路径，否则交给配置的执行策略（含回退）
//! 4. **汇总**：构建报告、可选合并输出、写出报告和简报
//!
//! ## 错误处理
//!
//! 只有配置错误会返回给调用方；一旦开始执行，报告一定会写出，
//! 执行层的其他错误都按分桶丢失记入 `fail`。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::browser::{BrowserOptions, ChromiumLauncher};
use crate::config::{Config, StrategyKind};
use crate::error::{AppError, AppResult, ErrorKind};
use crate::infrastructure::BrowserLauncher;
use crate::models::job::Job;
use crate::models::loaders::load_batch_spec;
use crate::models::report::{BatchReport, PartialReport};
use crate::models::spec::BatchSpec;
use crate::orchestrator::aggregator::{
    aggregate_outputs, build_report, read_output, report_output_paths, write_report,
};
use crate::orchestrator::distributor::distribute;
use crate::orchestrator::executor::{
    Execution, Executor, ExecutorStrategy, FastPath, WithFallback, WorkerCommand,
};
use crate::orchestrator::expander::{check_jobs, expand};
use crate::orchestrator::payload::{WorkerBucket, WorkerSettings};
use crate::services::{generate_bulletin, BulletinKind, ExtractiveSummarizer};
use crate::utils::logging::{log_jobs_loaded, log_startup, print_final_stats};

/// `batch` 子命令的参数（命令行覆盖环境配置）
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub config_path: PathBuf,
    pub out_dir: PathBuf,
    pub parallel: Option<usize>,
    pub reuse_page: bool,
    pub strategy: Option<StrategyKind>,
    pub aggregate: bool,
    pub fast_path: bool,
}

/// 批量处理器
pub struct BatchProcessor {
    config: Config,
    options: BatchOptions,
    command: WorkerCommand,
    launcher: Arc<dyn BrowserLauncher>,
}

impl BatchProcessor {
    pub fn new(config: Config, options: BatchOptions) -> AppResult<Self> {
        let launcher = Arc::new(ChromiumLauncher::new(BrowserOptions::from_config(&config)));
        Ok(Self {
            config,
            options,
            command: WorkerCommand::current()?,
            launcher,
        })
    }

    /// 替换线程策略使用的浏览器启动器
    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// 替换子进程策略使用的 worker 命令
    pub fn with_command(mut self, command: WorkerCommand) -> Self {
        self.command = command;
        self
    }

    fn max_workers(&self) -> usize {
        self.options.parallel.unwrap_or(self.config.max_workers).max(1)
    }

    fn strategy_kind(&self) -> StrategyKind {
        self.options.strategy.unwrap_or(self.config.strategy)
    }

    fn worker_settings(&self, spec: &BatchSpec) -> WorkerSettings {
        let mut settings = WorkerSettings::from_config(&self.config, &self.options.out_dir);
        settings.flow.portal = spec.portal.clone();
        settings.flow.summary = spec.summary.clone();
        settings.flow.pattern = spec.output.pattern().to_string();
        settings.state_file = spec.state_file.as_ref().map(PathBuf::from);
        settings.reuse_page = self.options.reuse_page;
        settings
    }

    /// 运行整个批次，返回写出的报告
    pub async fn run(&self) -> AppResult<BatchReport> {
        let spec = load_batch_spec(&self.options.config_path).await?;
        let jobs = expand(&spec)?;
        check_jobs(&jobs)?;

        let bulletin = match &spec.output.bulletin {
            Some(name) => Some((
                self.options.out_dir.join(name),
                BulletinKind::from_path(Path::new(name))?,
            )),
            None => None,
        };

        let max_workers = self.max_workers();
        let kind = self.strategy_kind();
        log_startup(kind.as_str(), max_workers);

        let buckets: Vec<WorkerBucket> = distribute(&jobs, max_workers, self.config.min_bucket_size)
            .into_iter()
            .enumerate()
            .map(|(i, indices)| WorkerBucket {
                index: i + 1,
                jobs: indices.into_iter().map(|j| jobs[j].clone()).collect(),
            })
            .collect();
        log_jobs_loaded(jobs.len(), buckets.len());

        let out_dir = &self.options.out_dir;
        std::fs::create_dir_all(out_dir).map_err(|e| AppError::file(out_dir, e))?;
        let settings = self.worker_settings(&spec);

        let execution = self.execute(buckets, settings, kind, max_workers).await?;
        let mut report = build_report(
            jobs.len(),
            execution.report,
            &execution.strategy,
            execution.fallback_used,
        );

        if self.options.aggregate {
            if let Err(e) = aggregate_outputs(&mut report, out_dir) {
                error!("❌ 合并输出失败: {}", e);
            }
        }

        let report_path = out_dir.join(spec.output.report());
        write_report(&report, &report_path)?;

        if let Some((path, kind)) = bulletin {
            if let Err(e) = write_bulletin(&report, &path, kind, &spec) {
                error!("❌ 简报生成失败: {}", e);
            }
        }

        print_final_stats(
            report.ok,
            report.fail,
            report.total_jobs,
            report.items_total,
            &report_path.display().to_string(),
        );
        Ok(report)
    }

    /// 在阻塞线程中执行：先试快速路径，再交给配置的策略
    async fn execute(
        &self,
        buckets: Vec<WorkerBucket>,
        settings: WorkerSettings,
        kind: StrategyKind,
        max_workers: usize,
    ) -> AppResult<Execution> {
        let all_jobs: Vec<Job> = buckets.iter().flat_map(|b| b.jobs.iter().cloned()).collect();
        let fast = (self.options.fast_path || self.config.fast_path)
            .then(|| FastPath::new(self.command.clone(), Arc::clone(&self.launcher)));
        let strategy = ExecutorStrategy::build(
            kind,
            self.command.clone(),
            Arc::clone(&self.launcher),
            max_workers,
            self.config.pool_timeout,
        );

        let joined = tokio::task::spawn_blocking(move || match fast {
            Some(fast) => WithFallback::new(fast, strategy).execute(&buckets, &settings),
            None => strategy.execute(&buckets, &settings),
        })
        .await;

        let reason = match joined {
            Ok(Ok(execution)) => {
                info!(
                    "🏁 执行完成 (策略: {}{})",
                    execution.strategy,
                    if execution.fallback_used { ", 已回退" } else { "" }
                );
                return Ok(execution);
            }
            Ok(Err(e)) if e.kind() == ErrorKind::Config => return Err(e),
            Ok(Err(e)) => format!("[{}] {}", e.kind(), e),
            Err(e) => format!("执行线程异常: {}", e),
        };

        error!("❌ 执行失败，全部任务记为失败: {}", reason);
        Ok(Execution::new(
            kind.as_str(),
            PartialReport::lost_bucket(&all_jobs, &reason),
        ))
    }
}

fn write_bulletin(
    report: &BatchReport,
    path: &Path,
    kind: BulletinKind,
    spec: &BatchSpec,
) -> AppResult<()> {
    let mut outputs = Vec::new();
    for source in report_output_paths(report) {
        match read_output(Path::new(&source)) {
            Ok(output) => outputs.push(output),
            Err(e) => warn!("⚠️ 简报跳过 {}: {}", source, e),
        }
    }
    generate_bulletin(&outputs, path, kind, Some(&ExtractiveSummarizer), &spec.summary)
}
