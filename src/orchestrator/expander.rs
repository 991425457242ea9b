//! 任务展开器 - 编排层
//!
//! 把声明式的 [`BatchSpec`] 展开为任务列表。三种模式按优先级互斥：
//!
//! 1. `jobs`：每项叠加在 `defaults` 上，继承全局 data/secao，按 repeat 重复
//! 2. `topics × combos`：主题优先遍历，每个组合叠加在 `defaults` 上
//! 3. 只有 `combos`：主题默认为 `job{comboIndex}`
//!
//! 对同一输入，输出顺序和各序号始终一致（文件名由序号决定）。

use chrono::Local;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::job::Job;
use crate::models::spec::{BatchSpec, Topic};

type RawJob = Map<String, Value>;

/// 表示"今天"的日期写法
const TODAY_ALIASES: [&str; 2] = ["hoje", "today"];

/// 把 `hoje` / `today` 换成当天日期（DD-MM-YYYY），其他值原样返回
pub fn resolve_date(date: &str) -> String {
    let trimmed = date.trim();
    if TODAY_ALIASES.iter().any(|a| trimmed.eq_ignore_ascii_case(a)) {
        Local::now().format("%d-%m-%Y").to_string()
    } else {
        trimmed.to_string()
    }
}

/// 展开任务；没有产生任何任务时返回配置错误
pub fn expand(spec: &BatchSpec) -> AppResult<Vec<Job>> {
    let mut jobs = if !spec.jobs.is_empty() {
        expand_direct(spec)?
    } else if !spec.topics.is_empty() && !spec.combos.is_empty() {
        expand_topics_combos(spec)?
    } else if !spec.combos.is_empty() {
        expand_combos_only(spec)?
    } else {
        Vec::new()
    };

    if jobs.is_empty() {
        return Err(AppError::config(
            "没有可执行的任务：请提供 jobs，或 topics 与 combos，或 combos",
        ));
    }

    for (ordinal, job) in jobs.iter_mut().enumerate() {
        job.ordinal = ordinal;
    }
    debug!("展开得到 {} 个任务", jobs.len());
    Ok(jobs)
}

/// 检查每个任务都有版面信息（在启动任何 worker 之前调用）
pub fn check_jobs(jobs: &[Job]) -> AppResult<()> {
    for job in jobs {
        if job.date.is_empty() {
            return Err(AppError::config(format!(
                "任务 #{} ({}) 缺少 data",
                job.display_index(),
                job.topic
            )));
        }
        if job.section.is_empty() {
            return Err(AppError::config(format!(
                "任务 #{} ({}) 缺少 secao",
                job.display_index(),
                job.topic
            )));
        }
    }
    Ok(())
}

fn expand_direct(spec: &BatchSpec) -> AppResult<Vec<Job>> {
    let mut jobs = Vec::new();
    for (i, raw) in spec.jobs.iter().enumerate() {
        let mut merged = overlay(&spec.defaults, raw);
        let repeat = take_repeat(&mut merged)?.unwrap_or(spec.repeat);
        let template = finish(merged, spec, &format!("jobs[{}]", i))?;
        for rep in 1..=repeat {
            jobs.push(Job {
                job_index: Some(i + 1),
                repeat_index: rep,
                ..template.clone()
            });
        }
    }
    Ok(jobs)
}

fn expand_topics_combos(spec: &BatchSpec) -> AppResult<Vec<Job>> {
    let mut jobs = Vec::new();
    for topic in &spec.topics {
        for (ci, combo) in spec.combos.iter().enumerate() {
            let mut merged = overlay(&spec.defaults, combo);
            let combo_repeat = take_repeat(&mut merged)?;
            apply_topic(&mut merged, topic);
            let repeat = combo_repeat.or(topic.repeat).unwrap_or(spec.repeat);

            let template = finish(merged, spec, &format!("{} × combos[{}]", topic.name, ci))?;
            for rep in 1..=repeat {
                jobs.push(Job {
                    combo_index: Some(ci + 1),
                    repeat_index: rep,
                    ..template.clone()
                });
            }
        }
    }
    Ok(jobs)
}

fn expand_combos_only(spec: &BatchSpec) -> AppResult<Vec<Job>> {
    let mut jobs = Vec::new();
    for (ci, combo) in spec.combos.iter().enumerate() {
        let mut merged = overlay(&spec.defaults, combo);
        let repeat = take_repeat(&mut merged)?.unwrap_or(spec.repeat);
        if !has_text(&merged, "topic") {
            merged.insert("topic".into(), Value::String(format!("job{}", ci + 1)));
        }

        let template = finish(merged, spec, &format!("combos[{}]", ci))?;
        for rep in 1..=repeat {
            jobs.push(Job {
                combo_index: Some(ci + 1),
                repeat_index: rep,
                ..template.clone()
            });
        }
    }
    Ok(jobs)
}

/// `base` 的副本，再用 `over` 的键覆盖
fn overlay(base: &RawJob, over: &RawJob) -> RawJob {
    let mut merged = base.clone();
    for (k, v) in over {
        merged.insert(k.clone(), v.clone());
    }
    normalize_aliases(&mut merged);
    merged
}

/// 统一同义键，避免同一字段出现两次
fn normalize_aliases(raw: &mut RawJob) {
    for (alias, canonical) in [("date", "data"), ("section", "secao")] {
        if let Some(value) = raw.remove(alias) {
            raw.entry(canonical.to_string()).or_insert(value);
        }
    }
}

fn has_text(raw: &RawJob, key: &str) -> bool {
    raw.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

fn take_repeat(raw: &mut RawJob) -> AppResult<Option<u32>> {
    match raw.remove("repeat") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(r) if r >= 1 && r <= u64::from(u32::MAX) => Ok(Some(r as u32)),
            _ => Err(AppError::config(format!("repeat 必须是正整数: {}", n))),
        },
        Some(other) => Err(AppError::config(format!("repeat 必须是正整数: {}", other))),
    }
}

fn apply_topic(raw: &mut RawJob, topic: &Topic) {
    raw.insert("topic".into(), Value::String(topic.name.clone()));
    let query = topic
        .query
        .clone()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| topic.name.clone());
    raw.insert("query".into(), Value::String(query));

    if let Some(lines) = topic.summary_lines {
        raw.insert("summaryLines".into(), Value::from(lines));
    }
    if let Some(mode) = topic.summary_mode {
        if let Ok(v) = serde_json::to_value(mode) {
            raw.insert("summaryMode".into(), v);
        }
    }
    if let Some(keywords) = &topic.summary_keywords {
        raw.insert("summaryKeywords".into(), Value::from(keywords.clone()));
    }
}

/// 补全全局字段并转换为 [`Job`]
fn finish(mut raw: RawJob, spec: &BatchSpec, origin: &str) -> AppResult<Job> {
    if !has_text(&raw, "data") {
        if let Some(data) = &spec.data {
            raw.insert("data".into(), Value::String(data.clone()));
        }
    }
    if !has_text(&raw, "secao") {
        if let Some(secao) = &spec.secao_default {
            raw.insert("secao".into(), Value::String(secao.clone()));
        }
    }
    raw.remove("name");

    // 数字形式的键按字符串处理
    for key in ["key1", "key2", "key3", "data", "secao"] {
        if let Some(Value::Number(n)) = raw.get(key) {
            let s = n.to_string();
            raw.insert(key.to_string(), Value::String(s));
        }
    }

    let mut job: Job = serde_json::from_value(Value::Object(raw))
        .map_err(|e| AppError::config(format!("{} 无效: {}", origin, e)))?;
    job.date = resolve_date(&job.date);
    job.section = job.section.trim().to_string();
    Ok(job)
}
