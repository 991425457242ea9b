use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::job::Job;

/// 单个任务各阶段耗时（毫秒）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    pub navigate_ms: u64,
    pub select_ms: u64,
    pub collect_ms: u64,
    pub enrich_ms: u64,
    pub write_ms: u64,
}

/// 单个任务的结果指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetric {
    pub ordinal: usize,
    pub topic: String,
    pub data: String,
    pub secao: String,
    pub repeat_index: u32,
    pub ok: bool,
    pub items: usize,
    #[serde(default)]
    pub output: Option<String>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_failed: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobMetric {
    /// 以任务信息初始化（尚未成功）
    pub fn for_job(job: &Job) -> Self {
        Self {
            ordinal: job.ordinal,
            topic: job.topic.clone(),
            data: job.date.clone(),
            secao: job.section.clone(),
            repeat_index: job.repeat_index,
            ok: false,
            items: 0,
            output: None,
            elapsed_ms: 0,
            timings: Timings::default(),
            error_kind: None,
            level_failed: None,
            error: None,
        }
    }

    /// 整个分桶没有产出结果时，为其中的任务生成失败记录
    pub fn worker_lost(job: &Job, reason: &str) -> Self {
        Self {
            error_kind: Some(ErrorKind::Job),
            error: Some(reason.to_string()),
            ..Self::for_job(job)
        }
    }
}

/// 一个执行单元（分桶/进程）的部分结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialReport {
    pub ok: usize,
    pub fail: usize,
    pub items_total: usize,
    pub outputs: Vec<String>,
    pub metrics: Vec<JobMetric>,
}

impl PartialReport {
    /// 记录一个任务的结果
    pub fn record(&mut self, metric: JobMetric) {
        if metric.ok {
            self.ok += 1;
            self.items_total += metric.items;
            if let Some(path) = &metric.output {
                self.outputs.push(path.clone());
            }
        } else {
            self.fail += 1;
        }
        self.metrics.push(metric);
    }

    /// 合并另一个部分结果
    pub fn merge(&mut self, other: PartialReport) {
        self.ok += other.ok;
        self.fail += other.fail;
        self.items_total += other.items_total;
        self.outputs.extend(other.outputs);
        self.metrics.extend(other.metrics);
    }

    /// 整个分桶丢失时的结果：每个任务记一次失败
    pub fn lost_bucket(jobs: &[Job], reason: &str) -> Self {
        let mut report = PartialReport::default();
        for job in jobs {
            report.record(JobMetric::worker_lost(job, reason));
        }
        report
    }

    /// 为还没有指标的任务补记失败，返回补记数量
    pub fn fill_missing(&mut self, jobs: &[Job], reason: &str) -> usize {
        let recorded: std::collections::HashSet<usize> =
            self.metrics.iter().map(|m| m.ordinal).collect();
        let mut filled = 0;
        for job in jobs.iter().filter(|j| !recorded.contains(&j.ordinal)) {
            self.record(JobMetric::worker_lost(job, reason));
            filled += 1;
        }
        filled
    }

    pub fn total(&self) -> usize {
        self.ok + self.fail
    }
}

/// 耗时统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub jobs: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p90_ms: f64,
    pub items_total: usize,
}

/// 报告中的指标段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub jobs: Vec<JobMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryStats>,
}

/// 按版面合并后的文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedFile {
    pub path: String,
    pub data: String,
    pub secao: String,
    pub items: usize,
    pub merged: Vec<String>,
}

/// 批量运行报告
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_jobs: usize,
    pub ok: usize,
    pub fail: usize,
    pub items_total: usize,
    pub outputs: Vec<String>,
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated: Option<Vec<AggregatedFile>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub fallback_used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(ordinal: usize) -> Job {
        Job {
            ordinal,
            topic: format!("t{}", ordinal),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_and_merge() {
        let mut a = PartialReport::default();
        let mut ok = JobMetric::for_job(&job(0));
        ok.ok = true;
        ok.items = 4;
        ok.output = Some("out/a.json".into());
        a.record(ok);
        a.record(JobMetric::for_job(&job(1)));

        let b = PartialReport::lost_bucket(&[job(2), job(3)], "worker crashed");

        a.merge(b);
        assert_eq!(a.ok, 1);
        assert_eq!(a.fail, 3);
        assert_eq!(a.items_total, 4);
        assert_eq!(a.outputs, vec!["out/a.json".to_string()]);
        assert_eq!(a.total(), 4);
        assert_eq!(a.metrics[3].error_kind, Some(ErrorKind::Job));
    }

    #[test]
    fn test_fill_missing_only_adds_unrecorded_jobs() {
        let mut report = PartialReport::default();
        let mut done = JobMetric::for_job(&job(0));
        done.ok = true;
        report.record(done);

        let filled = report.fill_missing(&[job(0), job(1), job(2)], "worker panicked");
        assert_eq!(filled, 2);
        assert_eq!((report.ok, report.fail), (1, 2));
    }
}
