use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::summary::SummaryMode;

/// 下拉框选项的匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyType {
    /// `<option value>`
    Value,
    /// `data-value` 属性
    #[serde(alias = "data_value", alias = "data-value")]
    DataValue,
    /// 选项在列表中的位置
    #[serde(alias = "data_index", alias = "data-index", alias = "index")]
    DataIndex,
    /// 规范化后的可见文本
    Text,
}

impl KeyType {
    /// 未指定匹配方式时的尝试顺序
    pub const FALLBACK_ORDER: [KeyType; 4] = [
        KeyType::Value,
        KeyType::DataValue,
        KeyType::DataIndex,
        KeyType::Text,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Value => "value",
            KeyType::DataValue => "dataValue",
            KeyType::DataIndex => "dataIndex",
            KeyType::Text => "text",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 某一级下拉框的选择输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelKey {
    pub level: u8,
    pub key: String,
    pub key_type: Option<KeyType>,
    pub label: Option<String>,
}

/// 展开后的一个任务
///
/// 由展开器创建后只读；worker 只消费不修改。
/// 未识别的字段保留在 `extra` 中原样传递。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "data", alias = "date")]
    pub date: String,
    #[serde(default, rename = "secao", alias = "section")]
    pub section: String,

    #[serde(default)]
    pub key1: Option<String>,
    #[serde(default)]
    pub key1_type: Option<KeyType>,
    #[serde(default)]
    pub label1: Option<String>,
    #[serde(default)]
    pub key2: Option<String>,
    #[serde(default)]
    pub key2_type: Option<KeyType>,
    #[serde(default)]
    pub label2: Option<String>,
    #[serde(default)]
    pub key3: Option<String>,
    #[serde(default)]
    pub key3_type: Option<KeyType>,
    #[serde(default)]
    pub label3: Option<String>,

    /// 是否抓取详情页并生成摘要
    #[serde(default)]
    pub enrich: bool,
    #[serde(default, alias = "summary_lines")]
    pub summary_lines: Option<usize>,
    #[serde(default, alias = "summary_mode")]
    pub summary_mode: Option<SummaryMode>,
    #[serde(default, alias = "summary_keywords")]
    pub summary_keywords: Option<Vec<String>>,
    #[serde(default, alias = "max_pages")]
    pub max_pages: Option<usize>,

    /// 重复序号（从 1 开始）
    #[serde(default = "default_repeat_index")]
    pub repeat_index: u32,
    /// 组合序号（从 1 开始，topics×combos / combos 模式）
    #[serde(default)]
    pub combo_index: Option<usize>,
    /// 直接任务序号（从 1 开始，jobs 模式）
    #[serde(default)]
    pub job_index: Option<usize>,
    /// 在展开结果中的位置（从 0 开始）
    #[serde(default)]
    pub ordinal: usize,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_repeat_index() -> u32 {
    1
}

impl Job {
    /// 版面键 (date, section)
    pub fn edition(&self) -> (&str, &str) {
        (self.date.as_str(), self.section.as_str())
    }

    /// 用于文件名的序号：组合序号优先，其次直接任务序号，最后位置
    pub fn display_index(&self) -> usize {
        self.combo_index
            .or(self.job_index)
            .unwrap_or(self.ordinal + 1)
    }

    /// 第 `level` 级的选择输入；没有键时返回 None
    pub fn level_key(&self, level: u8) -> Option<LevelKey> {
        let (key, key_type, label) = match level {
            1 => (&self.key1, self.key1_type, &self.label1),
            2 => (&self.key2, self.key2_type, &self.label2),
            3 => (&self.key3, self.key3_type, &self.label3),
            _ => return None,
        };
        let key = key.as_ref().filter(|k| !k.trim().is_empty())?;
        Some(LevelKey {
            level,
            key: key.clone(),
            key_type,
            label: label.clone(),
        })
    }
}
