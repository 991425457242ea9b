use serde::{Deserialize, Serialize};

use crate::models::job::Job;

/// 摘要选句方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// 取开头的句子
    Lead,
    /// 按关键词命中打分
    Keywords,
    /// 关键词命中与位置兼顾
    #[default]
    Balanced,
}

/// 摘要配置
///
/// 不可变，随参数传递；任务级覆盖通过 [`SummaryConfig::for_job`] 得到新值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_lines")]
    pub lines: usize,
    #[serde(default)]
    pub mode: SummaryMode,
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_lines() -> usize {
    3
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            lines: default_lines(),
            mode: SummaryMode::default(),
            keywords: Vec::new(),
        }
    }
}

impl SummaryConfig {
    /// 以 `base` 为底，叠加任务上的覆盖项
    pub fn for_job(base: &SummaryConfig, job: &Job) -> SummaryConfig {
        SummaryConfig {
            lines: job.summary_lines.unwrap_or(base.lines).max(1),
            mode: job.summary_mode.unwrap_or(base.mode),
            keywords: job
                .summary_keywords
                .clone()
                .unwrap_or_else(|| base.keywords.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_job_overrides_without_touching_base() {
        let base = SummaryConfig {
            lines: 5,
            mode: SummaryMode::Lead,
            keywords: vec!["portaria".into()],
        };
        let job = Job {
            summary_mode: Some(SummaryMode::Keywords),
            summary_keywords: Some(vec!["decreto".into()]),
            ..Default::default()
        };

        let derived = SummaryConfig::for_job(&base, &job);
        assert_eq!(derived.lines, 5);
        assert_eq!(derived.mode, SummaryMode::Keywords);
        assert_eq!(derived.keywords, vec!["decreto".to_string()]);
        assert_eq!(base.mode, SummaryMode::Lead);
    }
}
