use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::models::portal::PortalProfile;
use crate::models::summary::{SummaryConfig, SummaryMode};

/// 默认的输出文件名模板
pub const DEFAULT_OUTPUT_PATTERN: &str = "{topic}_{secao}_{date}_{idx}_r{rep}.json";
/// 默认的报告文件名
pub const DEFAULT_REPORT_NAME: &str = "batch_report.json";

/// 主题（topics×combos 模式中的一行）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub repeat: Option<u32>,
    #[serde(default, alias = "summaryLines")]
    pub summary_lines: Option<usize>,
    #[serde(default, alias = "summaryMode")]
    pub summary_mode: Option<SummaryMode>,
    #[serde(default, alias = "summaryKeywords")]
    pub summary_keywords: Option<Vec<String>>,
}

/// 输出配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    /// 每个任务输出文件名模板
    #[serde(default)]
    pub pattern: Option<String>,
    /// 报告文件名
    #[serde(default)]
    pub report: Option<String>,
    /// 简报文件（扩展名决定格式）
    #[serde(default)]
    pub bulletin: Option<String>,
}

impl OutputSpec {
    pub fn pattern(&self) -> &str {
        self.pattern.as_deref().unwrap_or(DEFAULT_OUTPUT_PATTERN)
    }

    pub fn report(&self) -> &str {
        self.report.as_deref().unwrap_or(DEFAULT_REPORT_NAME)
    }
}

/// 声明式批量配置
///
/// 加载后不可变。三种展开来源按优先级：`jobs` → `topics`×`combos` → `combos`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSpec {
    /// 全局日期
    #[serde(default, alias = "date")]
    pub data: Option<String>,
    /// 全局版面
    #[serde(default, rename = "secaoDefault", alias = "secao_default")]
    pub secao_default: Option<String>,
    #[serde(default)]
    pub defaults: Map<String, Value>,
    #[serde(default)]
    pub jobs: Vec<Map<String, Value>>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub combos: Vec<Map<String, Value>>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    /// 去重账本文件
    #[serde(default, alias = "stateFile")]
    pub state_file: Option<String>,
    #[serde(default)]
    pub output: OutputSpec,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub portal: PortalProfile,
}

fn default_repeat() -> u32 {
    1
}

impl Default for BatchSpec {
    fn default() -> Self {
        Self {
            data: None,
            secao_default: None,
            defaults: Map::new(),
            jobs: Vec::new(),
            topics: Vec::new(),
            combos: Vec::new(),
            repeat: default_repeat(),
            state_file: None,
            output: OutputSpec::default(),
            summary: SummaryConfig::default(),
            portal: PortalProfile::default(),
        }
    }
}

impl BatchSpec {
    /// 校验在任何 worker 启动前就能发现的配置问题
    pub fn validate(&self) -> AppResult<()> {
        if self.repeat == 0 {
            return Err(AppError::config("repeat 必须 >= 1"));
        }
        if let Some(topic) = self.topics.iter().find(|t| t.name.trim().is_empty()) {
            return Err(AppError::config(format!(
                "topic 缺少 name 字段: {:?}",
                topic
            )));
        }
        if self.topics.iter().any(|t| t.repeat == Some(0)) {
            return Err(AppError::config("topic 的 repeat 必须 >= 1"));
        }
        if !self.topics.is_empty() && self.combos.is_empty() && self.jobs.is_empty() {
            return Err(AppError::config("提供了 topics 但没有 combos"));
        }
        if let Some(pattern) = &self.output.pattern {
            if !pattern.contains("{idx}") && !pattern.contains("{rep}") {
                return Err(AppError::config(format!(
                    "输出模板 '{}' 必须包含 {{idx}} 或 {{rep}}，否则文件会互相覆盖",
                    pattern
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_config() {
        let spec: BatchSpec = serde_json::from_value(json!({
            "data": "02-01-2025",
            "secaoDefault": "do1",
            "defaults": {"key1Type": "text"},
            "topics": [{"name": "T1", "query": "decreto"}],
            "combos": [{"key1": "A"}],
            "repeat": 2,
            "state_file": "state.jsonl",
            "output": {"pattern": "{topic}_{idx}.json", "report": "r.json"}
        }))
        .unwrap();

        assert_eq!(spec.secao_default.as_deref(), Some("do1"));
        assert_eq!(spec.repeat, 2);
        assert_eq!(spec.output.report(), "r.json");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_specs() {
        let zero = BatchSpec {
            repeat: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let orphan_topics = BatchSpec {
            topics: vec![Topic {
                name: "T".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(orphan_topics.validate().is_err());

        let clobbering = BatchSpec {
            output: OutputSpec {
                pattern: Some("{topic}.json".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(clobbering.validate().is_err());
    }
}
