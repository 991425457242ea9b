//! 命令行
//!
//! - `list` - 读取某一级下拉框的全部选项
//! - `run` - 执行单个任务
//! - `batch` - 按批量配置执行
//! - `plan` / `plan-from-pairs` / `plan-live` - 生成批量配置
//! - `report` - 由任务输出生成简报
//! - `worker` - 隐藏子命令，由子进程策略调用

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use crate::browser::{BrowserOptions, ChromiumLauncher};
use crate::config::{Config, StrategyKind};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{BrowserLauncher, BrowserSession, DomHandle};
use crate::models::job::Job;
use crate::models::loaders::save_batch_spec;
use crate::models::summary::SummaryConfig;
use crate::orchestrator::expander::{check_jobs, resolve_date};
use crate::orchestrator::{
    list_options, load_outputs, plan, plan_from_pairs, plan_live, run_single, BatchOptions,
    BatchProcessor, WorkerSettings,
};
use crate::services::{generate_bulletin, write_json_atomic, BulletinKind, ExtractiveSummarizer};
use crate::workflow::{CascadeOptions, FlowSettings};

/// 公报门户批量采集工具
#[derive(Debug, Parser)]
#[command(name = "dou_batch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// 读取某一级下拉框的选项并写为 JSON
    List(ListArgs),
    /// 执行单个任务
    Run(RunArgs),
    /// 按批量配置执行
    Batch(BatchArgs),
    /// key1 × key2 笛卡尔积生成批量配置
    Plan(PlanArgs),
    /// 由制表符分隔的键对文件生成批量配置
    PlanFromPairs(PlanFromPairsArgs),
    /// 从门户实时枚举第 1、2 级选项生成批量配置
    PlanLive(PlanLiveArgs),
    /// 由任务输出生成简报
    Report(ReportArgs),
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub data: String,
    #[arg(long)]
    pub secao: String,
    /// 要读取的层级（1..=3）
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub level: u8,
    #[arg(long)]
    pub key1: Option<String>,
    #[arg(long)]
    pub key2: Option<String>,
    /// 匹配下拉框标签的正则
    #[arg(long)]
    pub label: Option<String>,
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long)]
    pub data: String,
    #[arg(long)]
    pub secao: String,
    #[arg(long)]
    pub key1: String,
    #[arg(long)]
    pub key2: String,
    #[arg(long)]
    pub key3: Option<String>,
    #[arg(long, default_value = "")]
    pub query: String,
    #[arg(long, default_value = "run")]
    pub topic: String,
    /// 抓取详情页并生成摘要
    #[arg(long)]
    pub enrich: bool,
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[arg(long)]
    pub config: PathBuf,
    #[arg(long)]
    pub out_dir: PathBuf,
    /// 最大并发 worker 数（覆盖 MAX_WORKERS）
    #[arg(long)]
    pub parallel: Option<usize>,
    /// 同一版面的连续任务复用页面
    #[arg(long)]
    pub reuse_page: bool,
    /// 执行策略: subprocess | thread | process（覆盖 EXECUTOR_STRATEGY）
    #[arg(long)]
    pub strategy: Option<StrategyKind>,
    /// 按版面合并输出文件
    #[arg(long)]
    pub aggregate: bool,
    /// 先尝试单进程快速路径
    #[arg(long)]
    pub fast_path: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[arg(long)]
    pub out: PathBuf,
    #[arg(long, value_delimiter = ',', required = true)]
    pub key1: Vec<String>,
    #[arg(long, value_delimiter = ',', required = true)]
    pub key2: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    pub topics: Vec<String>,
    #[arg(long)]
    pub data: Option<String>,
    #[arg(long)]
    pub secao: Option<String>,
}

#[derive(Debug, Args)]
pub struct PlanFromPairsArgs {
    #[arg(long)]
    pub pairs: PathBuf,
    #[arg(long)]
    pub out: PathBuf,
    #[arg(long)]
    pub data: Option<String>,
    #[arg(long)]
    pub secao: Option<String>,
}

#[derive(Debug, Args)]
pub struct PlanLiveArgs {
    #[arg(long)]
    pub data: String,
    #[arg(long)]
    pub secao: String,
    #[arg(long)]
    pub out: PathBuf,
    /// 只枚举前 N 个第 1 级选项
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// 报告文件、任务输出文件或输出目录
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub out: PathBuf,
    /// md | html（缺省按输出扩展名）
    #[arg(long)]
    pub kind: Option<String>,
    /// 每条摘要的句数
    #[arg(long)]
    pub lines: Option<usize>,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    #[arg(long)]
    pub payload: PathBuf,
    #[arg(long)]
    pub result: PathBuf,
    #[arg(long)]
    pub fast: bool,
}

/// 执行除 `worker` 以外的子命令
pub async fn execute(command: Commands, config: Config) -> AppResult<()> {
    match command {
        Commands::List(args) => list(args, &config).await,
        Commands::Run(args) => run(args, &config).await,
        Commands::Batch(args) => batch(args, config).await,
        Commands::Plan(args) => {
            let spec = plan(&args.key1, &args.key2, &args.topics, args.data, args.secao)?;
            save_batch_spec(&spec, &args.out).await?;
            info!("📝 已生成 {} 个组合: {}", spec.combos.len(), args.out.display());
            Ok(())
        }
        Commands::PlanFromPairs(args) => {
            let text = tokio::fs::read_to_string(&args.pairs)
                .await
                .map_err(|e| AppError::config(format!("无法读取 {}: {}", args.pairs.display(), e)))?;
            let spec = plan_from_pairs(&text, args.data, args.secao)?;
            save_batch_spec(&spec, &args.out).await?;
            info!("📝 已生成 {} 个组合: {}", spec.combos.len(), args.out.display());
            Ok(())
        }
        Commands::PlanLive(args) => plan_live_command(args, &config).await,
        Commands::Report(args) => report(args),
        Commands::Worker(_) => Err(AppError::config("worker 子命令不能在异步运行时中执行")),
    }
}

fn flow_settings(config: &Config) -> FlowSettings {
    WorkerSettings::from_config(config, Path::new(".")).flow
}

/// 启动浏览器并打开一个页面
async fn open_page(config: &Config) -> AppResult<(Box<dyn BrowserSession>, Box<dyn DomHandle>)> {
    let launcher = ChromiumLauncher::new(BrowserOptions::from_config(config));
    let session = launcher.launch().await?;
    match session.new_page().await {
        Ok(page) => Ok((session, page)),
        Err(e) => {
            if let Err(close_err) = session.close().await {
                warn!("关闭浏览器失败: {}", close_err);
            }
            Err(e)
        }
    }
}

async fn shutdown(session: Box<dyn BrowserSession>, page: Box<dyn DomHandle>) {
    if let Err(e) = page.close().await {
        warn!("关闭页面失败: {}", e);
    }
    if let Err(e) = session.close().await {
        warn!("关闭浏览器失败: {}", e);
    }
}

async fn list(args: ListArgs, config: &Config) -> AppResult<()> {
    let job = Job {
        date: resolve_date(&args.data),
        section: args.secao,
        key1: args.key1,
        key2: args.key2,
        repeat_index: 1,
        ..Default::default()
    };
    let flow = flow_settings(config);
    let (session, page) = open_page(config).await?;
    let listed = list_options(
        page.as_ref(),
        &flow.base_url,
        flow.cascade_options(),
        &job,
        args.level,
        args.label.as_deref(),
    )
    .await;
    shutdown(session, page).await;

    let options = listed?;
    write_json_atomic(&args.out, &options)?;
    info!("📋 第 {} 级共 {} 个选项: {}", args.level, options.len(), args.out.display());
    Ok(())
}

async fn run(args: RunArgs, config: &Config) -> AppResult<()> {
    let job = Job {
        topic: args.topic,
        query: args.query,
        date: resolve_date(&args.data),
        section: args.secao,
        key1: Some(args.key1),
        key2: Some(args.key2),
        key3: args.key3,
        enrich: args.enrich,
        repeat_index: 1,
        ..Default::default()
    };
    check_jobs(std::slice::from_ref(&job))?;

    let launcher = ChromiumLauncher::new(BrowserOptions::from_config(config));
    let settings = WorkerSettings::from_config(config, Path::new("."));
    let metric = run_single(job, settings, &launcher, &args.out).await?;
    if metric.ok {
        info!("✅ 任务完成: {} 条 → {}", metric.items, args.out.display());
    } else {
        error!(
            "❌ 任务失败 [{}]: {}",
            metric.error_kind.map(|k| k.to_string()).unwrap_or_default(),
            metric.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn batch(args: BatchArgs, config: Config) -> AppResult<()> {
    let options = BatchOptions {
        config_path: args.config,
        out_dir: args.out_dir,
        parallel: args.parallel,
        reuse_page: args.reuse_page,
        strategy: args.strategy,
        aggregate: args.aggregate,
        fast_path: args.fast_path,
    };
    BatchProcessor::new(config, options)?.run().await?;
    Ok(())
}

async fn plan_live_command(args: PlanLiveArgs, config: &Config) -> AppResult<()> {
    let flow = flow_settings(config);
    let cascade: CascadeOptions = flow.cascade_options();
    let data = resolve_date(&args.data);
    let (session, page) = open_page(config).await?;
    let planned = plan_live(page.as_ref(), &flow.base_url, cascade, &data, &args.secao, args.limit).await;
    shutdown(session, page).await;

    let spec = planned?;
    save_batch_spec(&spec, &args.out).await?;
    info!("📝 已枚举 {} 个组合: {}", spec.combos.len(), args.out.display());
    Ok(())
}

fn report(args: ReportArgs) -> AppResult<()> {
    let kind = match &args.kind {
        Some(kind) => kind.parse()?,
        None => BulletinKind::from_path(&args.out)?,
    };
    let outputs = load_outputs(&args.input)?;
    if outputs.is_empty() {
        warn!("⚠️ {} 中没有可用的任务输出", args.input.display());
    }
    let summary = SummaryConfig {
        lines: args.lines.unwrap_or(SummaryConfig::default().lines).max(1),
        ..Default::default()
    };
    generate_bulletin(&outputs, &args.out, kind, Some(&ExtractiveSummarizer), &summary)
}
