//! 汇总与报告 - 编排层
//!
//! 1. 合并各分桶的部分结果为 [`BatchReport`]，计算耗时统计
//! 2. 可选：把同一版面的任务文件流式合并为 `aggregated_{date}_{secao}.json`，
//!    删除被合并的文件并记入报告
//! 3. 写出报告文件（只要运行开始就一定写出）

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::output::{Item, JobOutput};
use crate::models::report::{
    AggregatedFile, BatchReport, JobMetric, Metrics, PartialReport, SummaryStats,
};
use crate::services::write_json_atomic;
use crate::utils::slugify;

/// 按 `p`（0..=1）取已排序样本的分位数，线性插值
fn percentile(sorted: &[u64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
        }
    }
}

/// 耗时统计；没有指标时返回 None
pub fn summary_stats(metrics: &[JobMetric]) -> Option<SummaryStats> {
    if metrics.is_empty() {
        return None;
    }
    let mut elapsed: Vec<u64> = metrics.iter().map(|m| m.elapsed_ms).collect();
    elapsed.sort_unstable();
    let sum: u64 = elapsed.iter().sum();

    Some(SummaryStats {
        jobs: metrics.len(),
        mean_ms: sum as f64 / metrics.len() as f64,
        median_ms: percentile(&elapsed, 0.5),
        p90_ms: percentile(&elapsed, 0.9),
        items_total: metrics.iter().map(|m| m.items).sum(),
    })
}

/// 由部分结果构建报告；指标按任务位置排序
pub fn build_report(
    total_jobs: usize,
    partial: PartialReport,
    strategy: &str,
    fallback_used: bool,
) -> BatchReport {
    let mut metrics = partial.metrics;
    metrics.sort_by_key(|m| (m.ordinal, m.repeat_index));
    let mut outputs = partial.outputs;
    outputs.sort();

    if partial.ok + partial.fail != total_jobs {
        warn!(
            "⚠️ 结果数 {} 与任务数 {} 不一致",
            partial.ok + partial.fail,
            total_jobs
        );
    }

    BatchReport {
        total_jobs,
        ok: partial.ok,
        fail: partial.fail,
        items_total: partial.items_total,
        outputs,
        metrics: Metrics {
            summary: summary_stats(&metrics),
            jobs: metrics,
        },
        aggregated: None,
        deleted: Vec::new(),
        strategy: strategy.to_string(),
        fallback_used,
    }
}

/// 写出报告
pub fn write_report(report: &BatchReport, path: &Path) -> AppResult<()> {
    write_json_atomic(path, report)?;
    info!("📝 报告已写入: {}", path.display());
    Ok(())
}

/// 合并文件的文件名
pub fn aggregated_name(data: &str, secao: &str) -> String {
    format!("aggregated_{}_{}.json", slugify(data), slugify(secao))
}

/// 只读取合并需要的字段
#[derive(Deserialize)]
struct OutputItems {
    #[serde(default)]
    itens: Vec<Item>,
    #[serde(default)]
    enriquecido: bool,
}

/// 把一组任务文件流式写入一个合并文件，返回写出的条目数
///
/// 每次只把一个源文件读入内存；跨文件按哈希去重。
fn merge_group(
    target: &Path,
    data: &str,
    secao: &str,
    sources: &[String],
) -> AppResult<usize> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir).map_err(|e| AppError::file(dir, e))?;
    let mut out = BufWriter::new(tmp);
    let io_err = |e: std::io::Error| AppError::file(target, e);

    write!(
        out,
        "{{\"data\":{},\"secao\":{},\"selecoes\":[],\"query\":\"\",\"itens\":[",
        serde_json::to_string(data)?,
        serde_json::to_string(secao)?
    )
    .map_err(io_err)?;

    let mut seen = HashSet::new();
    let mut written = 0usize;
    let mut enriched = false;
    for source in sources {
        let file = File::open(source).map_err(|e| AppError::file(source, e))?;
        let parsed: OutputItems = serde_json::from_reader(BufReader::new(file))?;
        enriched |= parsed.enriquecido;
        for item in parsed.itens {
            if !seen.insert(item.hash.clone()) {
                continue;
            }
            if written > 0 {
                out.write_all(b",").map_err(io_err)?;
            }
            serde_json::to_writer(&mut out, &item)?;
            written += 1;
        }
    }

    write!(
        out,
        "],\"total\":{},\"enriquecido\":{},\"fontes\":{}}}",
        written,
        enriched,
        serde_json::to_string(sources)?
    )
    .map_err(io_err)?;

    let tmp = out.into_inner().map_err(|e| io_err(e.into_error()))?;
    tmp.persist(target).map_err(|e| io_err(e.error))?;
    Ok(written)
}

/// 按版面合并任务文件，删除被合并的文件，结果记入报告
pub fn aggregate_outputs(report: &mut BatchReport, out_dir: &Path) -> AppResult<()> {
    let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for metric in report.metrics.jobs.iter().filter(|m| m.ok) {
        if let Some(path) = &metric.output {
            let entry = groups
                .entry((metric.data.clone(), metric.secao.clone()))
                .or_default();
            if !entry.contains(path) {
                entry.push(path.clone());
            }
        }
    }

    let mut aggregated = Vec::new();
    let mut deleted = Vec::new();
    for ((data, secao), sources) in groups {
        let target: PathBuf = out_dir.join(aggregated_name(&data, &secao));
        let items = merge_group(&target, &data, &secao, &sources)?;
        info!(
            "🗂️ 已合并 {} 个文件 → {} ({} 条)",
            sources.len(),
            target.display(),
            items
        );

        let target_str = target.display().to_string();
        for source in &sources {
            if *source == target_str {
                continue;
            }
            match fs::remove_file(source) {
                Ok(()) => deleted.push(source.clone()),
                Err(e) => warn!("⚠️ 无法删除 {}: {}", source, e),
            }
        }
        aggregated.push(AggregatedFile {
            path: target_str,
            data,
            secao,
            items,
            merged: sources,
        });
    }

    report.aggregated = Some(aggregated);
    report.deleted = deleted;
    Ok(())
}

/// 读取一个任务输出文件
pub fn read_output(path: &Path) -> AppResult<JobOutput> {
    let file = File::open(path).map_err(|e| AppError::file(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// 报告中当前有效的输出文件（合并后为合并文件）
pub fn report_output_paths(report: &BatchReport) -> Vec<String> {
    match &report.aggregated {
        Some(files) => files.iter().map(|f| f.path.clone()).collect(),
        None => report.outputs.clone(),
    }
}

/// 读取简报的输入
///
/// `input` 可以是报告文件（读取其中的有效输出）、单个任务文件，或包含任务文件的目录。
pub fn load_outputs(input: &Path) -> AppResult<Vec<JobOutput>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        let entries = fs::read_dir(input).map_err(|e| AppError::file(input, e))?;
        for entry in entries {
            let path = entry.map_err(|e| AppError::file(input, e))?.path();
            if path.extension().is_some_and(|e| e == "json") {
                paths.push(path);
            }
        }
        paths.sort();
    } else {
        let content = fs::read_to_string(input).map_err(|e| AppError::file(input, e))?;
        match serde_json::from_str::<BatchReport>(&content) {
            Ok(report) => paths.extend(report_output_paths(&report).into_iter().map(PathBuf::from)),
            Err(_) => return Ok(vec![serde_json::from_str(&content)?]),
        }
    }

    let mut outputs = Vec::new();
    for path in paths {
        match read_output(&path) {
            Ok(output) => outputs.push(output),
            Err(e) => warn!("⚠️ 跳过 {}: {}", path.display(), e),
        }
    }
    Ok(outputs)
}
