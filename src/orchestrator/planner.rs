//! 计划生成 - 编排层
//!
//! 生成 [`BatchSpec`]：
//! - `plan`：key1 列表 × key2 列表的笛卡尔积
//! - `plan_from_pairs`：每行 `key1<TAB>key2[<TAB>key3]`
//! - `plan_live`：从门户实时枚举第 1 级及其下的第 2 级选项
//!
//! 以及 `list`：读取某一级下拉框的全部选项。

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{DomHandle, OptionItem};
use crate::models::job::{Job, KeyType};
use crate::models::spec::{BatchSpec, Topic};
use crate::utils::normalize_text;
use crate::workflow::{edition_url, CascadeOptions, CascadeSelector};

/// 看起来是占位项的选项文本
const PLACEHOLDER_PREFIXES: [&str; 4] = ["selecione", "todos", "todas", "--"];

fn combo(keys: &[(&str, &str)]) -> Map<String, Value> {
    keys.iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

fn topics_from(names: &[String]) -> Vec<Topic> {
    names
        .iter()
        .filter(|n| !n.trim().is_empty())
        .map(|n| Topic {
            name: n.trim().to_string(),
            query: Some(n.trim().to_string()),
            ..Default::default()
        })
        .collect()
}

/// 占位选项（"Selecione..."、"Todos" 等）
pub fn is_placeholder(option: &OptionItem) -> bool {
    let text = normalize_text(&option.text);
    text.is_empty() || PLACEHOLDER_PREFIXES.iter().any(|p| text.starts_with(p))
}

/// key1 × key2 的笛卡尔积
pub fn plan(
    key1s: &[String],
    key2s: &[String],
    topics: &[String],
    data: Option<String>,
    secao: Option<String>,
) -> AppResult<BatchSpec> {
    if key1s.is_empty() || key2s.is_empty() {
        return Err(AppError::config("plan 需要至少一个 key1 和一个 key2"));
    }
    let combos = key1s
        .iter()
        .flat_map(|k1| {
            key2s
                .iter()
                .map(move |k2| combo(&[("key1", k1.as_str()), ("key2", k2.as_str())]))
        })
        .collect();

    Ok(BatchSpec {
        data,
        secao_default: secao,
        topics: topics_from(topics),
        combos,
        ..Default::default()
    })
}

/// 由制表符分隔的键对生成计划
pub fn plan_from_pairs(text: &str, data: Option<String>, secao: Option<String>) -> AppResult<BatchSpec> {
    let mut combos = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < 2 || fields[0].is_empty() || fields[1].is_empty() {
            return Err(AppError::config(format!(
                "第 {} 行应为 key1<TAB>key2[<TAB>key3]: {:?}",
                line_no + 1,
                line
            )));
        }
        let mut keys = vec![("key1", fields[0]), ("key2", fields[1])];
        if let Some(k3) = fields.get(2).filter(|k| !k.is_empty()) {
            keys.push(("key3", *k3));
        }
        combos.push(combo(&keys));
    }
    if combos.is_empty() {
        return Err(AppError::config("键对文件中没有任何组合"));
    }

    Ok(BatchSpec {
        data,
        secao_default: secao,
        combos,
        ..Default::default()
    })
}

/// 读取第 `level` 级下拉框的选项（先按给定的键完成前面各级）
pub async fn list_options(
    page: &dyn DomHandle,
    base_url: &str,
    cascade: CascadeOptions,
    job: &Job,
    level: u8,
    label: Option<&str>,
) -> AppResult<Vec<OptionItem>> {
    page.navigate(&edition_url(base_url, &job.date, &job.section)?).await?;
    let selector = CascadeSelector::new(page, cascade);

    for prior in 1..level {
        let key = job
            .level_key(prior)
            .ok_or_else(|| AppError::config(format!("列出第 {} 级前需要 key{}", level, prior)))?;
        let root = selector
            .resolve_level(prior, key.label.as_deref())
            .await?
            .ok_or_else(|| AppError::selection(prior, "找不到下拉框"))?;
        let next_label = if prior + 1 == level { label } else { None };
        let before = match selector.resolve_level(prior + 1, next_label).await? {
            Some(next) => page.read_options(&next).await?.len(),
            None => 0,
        };
        selector
            .select(&root, &key.key, key.key_type)
            .await?
            .ok_or_else(|| AppError::selection(prior, format!("没有可选的 '{}'", key.key)))?;
        selector.wait_repopulation(prior + 1, next_label, before).await?;
    }

    let root = selector
        .resolve_level(level, label)
        .await?
        .ok_or_else(|| AppError::selection(level, "找不到下拉框"))?;
    selector.options_of(&root).await
}

/// 从门户实时枚举：第 1 级每个选项 × 其下的第 2 级选项
pub async fn plan_live(
    page: &dyn DomHandle,
    base_url: &str,
    cascade: CascadeOptions,
    data: &str,
    secao: &str,
    limit: Option<usize>,
) -> AppResult<BatchSpec> {
    let probe = Job {
        date: data.to_string(),
        section: secao.to_string(),
        ..Default::default()
    };
    let level1: Vec<OptionItem> = list_options(page, base_url, cascade, &probe, 1, None)
        .await?
        .into_iter()
        .filter(|o| !is_placeholder(o))
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    info!("🔎 第 1 级共 {} 个选项", level1.len());

    let mut combos = Vec::new();
    for option in &level1 {
        let job = Job {
            key1: Some(option.text.clone()),
            key1_type: Some(KeyType::Text),
            ..probe.clone()
        };
        match list_options(page, base_url, cascade, &job, 2, None).await {
            Ok(level2) => {
                let level2: Vec<_> = level2.into_iter().filter(|o| !is_placeholder(o)).collect();
                info!("  {} → {} 个第 2 级选项", option.text, level2.len());
                for child in level2 {
                    let mut c = combo(&[("key1", option.text.as_str()), ("key2", child.text.as_str())]);
                    c.insert("key1Type".into(), Value::String(KeyType::Text.as_str().into()));
                    c.insert("key2Type".into(), Value::String(KeyType::Text.as_str().into()));
                    combos.push(c);
                }
            }
            Err(e) => warn!("⚠️ [{}] 无法读取 '{}' 下的第 2 级: {}", e.kind(), option.text, e),
        }
    }

    if combos.is_empty() {
        return Err(AppError::selection(2, "没有枚举到任何组合"));
    }
    Ok(BatchSpec {
        data: Some(data.to_string()),
        secao_default: Some(secao.to_string()),
        combos,
        ..Default::default()
    })
}
