//! 摘要服务 - 业务能力层
//!
//! 抽取式摘要：切句、打分、按原文顺序取前 N 句。

use std::sync::OnceLock;

use regex::Regex;

use crate::models::summary::{SummaryConfig, SummaryMode};
use crate::utils::normalize_text;

/// 摘要能力
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, config: &SummaryConfig) -> String;
}

/// 默认的抽取式摘要器
#[derive(Debug, Default, Clone)]
pub struct ExtractiveSummarizer;

fn sentence_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:[.!?;])\s+|\n+").expect("valid sentence regex"))
}

fn tag_stripper() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<[^>]+>")
            .expect("valid tag regex")
    })
}

/// 去掉 HTML 标记，保留可见文本
pub fn html_to_text(html: &str) -> String {
    let stripped = tag_stripper().replace_all(html, "\n");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_sentences(text: &str) -> Vec<String> {
    sentence_splitter()
        .split(text)
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| s.chars().count() >= 20)
        .collect()
}

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, text: &str, config: &SummaryConfig) -> String {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return String::new();
        }
        let wanted = config.lines.max(1);
        if sentences.len() <= wanted || config.mode == SummaryMode::Lead {
            return sentences.into_iter().take(wanted).collect::<Vec<_>>().join("\n");
        }

        let keywords: Vec<String> = config
            .keywords
            .iter()
            .map(|k| normalize_text(k))
            .filter(|k| !k.is_empty())
            .collect();
        let total = sentences.len() as f64;

        let mut scored: Vec<(usize, f64)> = sentences
            .iter()
            .enumerate()
            .map(|(i, sentence)| {
                let normalized = normalize_text(sentence);
                let hits = keywords
                    .iter()
                    .map(|k| normalized.matches(k.as_str()).count())
                    .sum::<usize>() as f64;
                let position = 1.0 - (i as f64 / total);
                let score = match config.mode {
                    SummaryMode::Keywords => hits + position * 0.01,
                    _ => hits + position,
                };
                (i, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut picked: Vec<usize> = scored.into_iter().take(wanted).map(|(i, _)| i).collect();
        picked.sort_unstable();

        picked
            .into_iter()
            .map(|i| sentences[i].clone())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
