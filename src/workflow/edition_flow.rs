//! 单任务处理流程 - 流程层
//!
//! 核心职责：定义"一个任务"的完整处理流程
//!
//! 流程顺序：
//! 1. 导航到版面（带重试）
//! 2. 级联选择 N1 → N2 → [N3]
//! 3. 提交查询，逐页读取列表
//! 4. 去重（账本）
//! 5. 可选：抓取详情并生成摘要
//! 6. 写出结果文件，记录指标

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{DomHandle, ListingEntry};
use crate::models::job::Job;
use crate::models::output::{Item, JobOutput, Selection};
use crate::models::portal::PortalProfile;
use crate::models::report::{JobMetric, Timings};
use crate::models::spec::DEFAULT_OUTPUT_PATTERN;
use crate::models::summary::SummaryConfig;
use crate::services::{
    content_hash, html_to_text, ContentFetcher, ExtractiveSummarizer, HttpFetcher, OutputWriter,
    Summarizer,
};
use crate::utils::truncate_text;
use crate::workflow::accumulator::{lock_accumulator, Accumulator};
use crate::workflow::cascade::{CascadeOptions, CascadeSelector};
use crate::workflow::job_ctx::JobCtx;

/// 导航重试的基础退避
const NAV_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// 单任务流程参数（随 worker 载荷序列化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSettings {
    pub base_url: String,
    pub nav_retries: u32,
    pub max_pages: usize,
    pub repopulation_timeout_ms: u64,
    pub repopulation_poll_ms: u64,
    #[serde(default)]
    pub portal: PortalProfile,
    #[serde(default)]
    pub summary: SummaryConfig,
    pub out_dir: PathBuf,
    pub pattern: String,
    /// 详情页缓存目录
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.in.gov.br/leiturajornal".to_string(),
            nav_retries: 3,
            max_pages: 5,
            repopulation_timeout_ms: 15_000,
            repopulation_poll_ms: 250,
            portal: PortalProfile::default(),
            summary: SummaryConfig::default(),
            out_dir: PathBuf::from("out"),
            pattern: DEFAULT_OUTPUT_PATTERN.to_string(),
            cache_dir: None,
        }
    }
}

impl FlowSettings {
    pub fn cascade_options(&self) -> CascadeOptions {
        CascadeOptions {
            repopulation_timeout: Duration::from_millis(self.repopulation_timeout_ms),
            poll_interval: Duration::from_millis(self.repopulation_poll_ms.max(1)),
        }
    }
}

/// 版面地址：`base?data=D&secao=S`
pub fn edition_url(base_url: &str, date: &str, section: &str) -> AppResult<String> {
    reqwest::Url::parse_with_params(base_url, &[("data", date), ("secao", section)])
        .map(String::from)
        .map_err(|e| AppError::config(format!("无效的 BASE_URL '{}': {}", base_url, e)))
}

/// 列表记录 → 结果条目（哈希：链接，否则标题+日期）
pub fn to_item(entry: ListingEntry) -> Item {
    let link = entry.link.filter(|l| !l.trim().is_empty());
    let hash = match &link {
        Some(link) => content_hash(&[link]),
        None => content_hash(&[&entry.title, entry.date.as_deref().unwrap_or("")]),
    };
    Item {
        titulo: entry.title.trim().to_string(),
        link,
        data_publicacao: entry.date,
        resumo: None,
        hash,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// 单任务处理流程
///
/// - 编排一个任务从导航到写文件的全过程
/// - 不持有页面，由调用方传入
/// - 任何错误都被分类记录为失败，不会影响同一分桶中的其他任务
pub struct EditionFlow {
    settings: FlowSettings,
    writer: OutputWriter,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    summarizer: Arc<dyn Summarizer>,
}

impl EditionFlow {
    /// 创建流程（详情抓取使用带缓存的 HTTP 抓取器）
    pub fn new(settings: FlowSettings) -> AppResult<Self> {
        let fetcher = HttpFetcher::new(settings.cache_dir.clone())?;
        Ok(Self::without_fetcher(settings).with_fetcher(Arc::new(fetcher)))
    }

    /// 创建不抓取详情的流程
    pub fn without_fetcher(settings: FlowSettings) -> Self {
        let writer = OutputWriter::new(settings.out_dir.clone(), settings.pattern.clone());
        Self {
            settings,
            writer,
            fetcher: None,
            summarizer: Arc::new(ExtractiveSummarizer),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// 执行一个任务并记录到累加器，返回该任务的指标
    pub async fn run(
        &self,
        page: &dyn DomHandle,
        job: &Job,
        ctx: &JobCtx,
        acc: &Mutex<Accumulator>,
    ) -> JobMetric {
        let started = Instant::now();
        let mut metric = JobMetric::for_job(job);

        match self.execute(page, job, ctx, acc, &mut metric.timings).await {
            Ok((items, path)) => {
                metric.ok = true;
                metric.items = items;
                metric.output = Some(path.display().to_string());
                info!("{} ✅ 完成，新增 {} 条 → {}", ctx, items, path.display());
            }
            Err(e) => {
                metric.error_kind = Some(e.kind());
                metric.level_failed = e.level_failed();
                metric.error = Some(e.to_string());
                error!("{} ❌ [{}] {}", ctx, e.kind(), e);
            }
        }
        metric.elapsed_ms = elapsed_ms(started);

        lock_accumulator(acc).record(metric.clone());
        metric
    }

    async fn execute(
        &self,
        page: &dyn DomHandle,
        job: &Job,
        ctx: &JobCtx,
        acc: &Mutex<Accumulator>,
        timings: &mut Timings,
    ) -> AppResult<(usize, PathBuf)> {
        // ========== 1. 导航 ==========
        let t = Instant::now();
        self.navigate(page, job, ctx).await?;
        timings.navigate_ms = elapsed_ms(t);

        // ========== 2. 级联选择 ==========
        let t = Instant::now();
        let selection = CascadeSelector::new(page, self.settings.cascade_options())
            .run(job)
            .await;
        timings.select_ms = elapsed_ms(t);
        if !selection.ok {
            let level = selection.level_failed.unwrap_or(1);
            return Err(AppError::selection(
                level,
                selection.reason.unwrap_or_else(|| "未知原因".to_string()),
            ));
        }
        debug!("{} 已解析的控件: {:?}", ctx, selection.resolved_labels);

        // ========== 3. 收集 ==========
        let t = Instant::now();
        let entries = self.collect(page, job, ctx).await?;
        let found = entries.len();
        let candidates = lock_accumulator(acc).unseen(entries.into_iter().map(to_item).collect());
        timings.collect_ms = elapsed_ms(t);
        info!(
            "{} 📄 读取 {} 条，其中 {} 条未见过",
            ctx,
            found,
            candidates.len()
        );

        // ========== 4. 摘要 ==========
        let mut candidates = candidates;
        if job.enrich && !candidates.is_empty() {
            let t = Instant::now();
            self.enrich(&mut candidates, job, ctx).await;
            timings.enrich_ms = elapsed_ms(t);
        }

        // ========== 5. 去重写账本 + 写文件 ==========
        let t = Instant::now();
        let result = self.commit(job, selection.selected_keys, candidates, acc);
        timings.write_ms = elapsed_ms(t);
        result
    }

    /// 导航到版面，失败时按指数退避重试
    async fn navigate(&self, page: &dyn DomHandle, job: &Job, ctx: &JobCtx) -> AppResult<()> {
        let url = edition_url(&self.settings.base_url, &job.date, &job.section)?;
        let attempts = self.settings.nav_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            debug!("{} 🌐 导航到 {} (第 {}/{} 次)", ctx, url, attempt + 1, attempts);
            match page.navigate(&url).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("{} ⚠️ 导航失败 (第 {}/{} 次): {}", ctx, attempt + 1, attempts, e);
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        sleep(NAV_BACKOFF_BASE * 2u32.saturating_pow(attempt)).await;
                    }
                }
            }
        }

        Err(AppError::Navigation {
            url,
            attempts,
            reason: last_error,
        })
    }

    /// 提交查询并逐页读取列表
    async fn collect(&self, page: &dyn DomHandle, job: &Job, ctx: &JobCtx) -> AppResult<Vec<ListingEntry>> {
        let profile = &self.settings.portal;

        if !job.query.trim().is_empty() && !page.submit_query(profile, &job.query).await? {
            warn!("{} ⚠️ 找不到搜索框，直接读取列表", ctx);
        }

        let max_pages = job.max_pages.unwrap_or(self.settings.max_pages).max(1);
        let mut entries = Vec::new();
        for page_no in 1..=max_pages {
            let batch = page.read_listing(profile).await?;
            debug!("{} 第 {} 页: {} 条", ctx, page_no, batch.len());
            entries.extend(batch);
            if page_no == max_pages || !page.next_page(profile).await? {
                break;
            }
        }
        Ok(entries)
    }

    /// 抓取详情并生成摘要；失败只记录日志
    async fn enrich(&self, items: &mut [Item], job: &Job, ctx: &JobCtx) {
        let Some(fetcher) = &self.fetcher else {
            warn!("{} ⚠️ 未配置抓取器，跳过摘要", ctx);
            return;
        };
        let config = SummaryConfig::for_job(&self.settings.summary, job);

        for item in items.iter_mut() {
            let Some(link) = item.link.as_deref() else {
                continue;
            };
            match fetcher.fetch(link).await {
                Ok(content) => {
                    let summary = self.summarizer.summarize(&html_to_text(&content.html), &config);
                    if !summary.is_empty() {
                        item.resumo = Some(summary);
                    }
                }
                Err(e) => warn!(
                    "{} ⚠️ [{}] 摘要抓取失败 {}: {}",
                    ctx,
                    e.kind(),
                    truncate_text(link, 80),
                    e
                ),
            }
        }
    }

    /// 在锁内完成去重、写账本和写文件
    fn commit(
        &self,
        job: &Job,
        selecoes: Vec<Selection>,
        candidates: Vec<Item>,
        acc: &Mutex<Accumulator>,
    ) -> AppResult<(usize, PathBuf)> {
        let mut guard = lock_accumulator(acc);
        let itens = guard.admit(candidates)?;
        let output = JobOutput {
            data: job.date.clone(),
            secao: job.section.clone(),
            selecoes,
            query: job.query.clone(),
            total: itens.len(),
            itens,
            enriquecido: job.enrich,
        };
        let path = self.writer.write(job, &output)?;
        Ok((output.total, path))
    }
}
