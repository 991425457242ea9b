//! 简报生成服务 - 业务能力层
//!
//! 把任务输出（单个或合并后的）按版面分组渲染成 Markdown / HTML。

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::models::output::{Item, JobOutput};
use crate::models::summary::SummaryConfig;
use crate::services::summarizer::Summarizer;

/// 简报格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletinKind {
    Markdown,
    Html,
}

impl FromStr for BulletinKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(BulletinKind::Markdown),
            "html" | "htm" => Ok(BulletinKind::Html),
            "docx" => Err(AppError::config("不支持 DOCX 简报，请使用 md 或 html")),
            other => Err(AppError::config(format!("未知的简报格式: {}", other))),
        }
    }
}

impl BulletinKind {
    /// 由文件扩展名推断格式
    pub fn from_path(path: &Path) -> AppResult<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("md")
            .parse()
    }
}

fn item_summary(item: &Item, summarizer: Option<&dyn Summarizer>, config: &SummaryConfig) -> Option<String> {
    match (&item.resumo, summarizer) {
        (Some(resumo), Some(s)) => Some(s.summarize(resumo, config)).filter(|s| !s.is_empty()),
        (Some(resumo), None) => Some(resumo.clone()),
        _ => None,
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 渲染简报文本
pub fn render_bulletin(
    outputs: &[JobOutput],
    kind: BulletinKind,
    summarizer: Option<&dyn Summarizer>,
    config: &SummaryConfig,
) -> String {
    let mut groups: BTreeMap<(&str, &str), Vec<&Item>> = BTreeMap::new();
    for output in outputs {
        groups
            .entry((output.data.as_str(), output.secao.as_str()))
            .or_default()
            .extend(output.itens.iter());
    }

    let mut doc = String::new();
    match kind {
        BulletinKind::Markdown => {
            doc.push_str("# Boletim\n");
            for ((data, secao), items) in &groups {
                doc.push_str(&format!("\n## {} — {} ({} itens)\n\n", data, secao, items.len()));
                for item in items {
                    match &item.link {
                        Some(link) => doc.push_str(&format!("- [{}]({})\n", item.titulo, link)),
                        None => doc.push_str(&format!("- {}\n", item.titulo)),
                    }
                    if let Some(summary) = item_summary(item, summarizer, config) {
                        for line in summary.lines() {
                            doc.push_str(&format!("  > {}\n", line));
                        }
                    }
                }
            }
        }
        BulletinKind::Html => {
            doc.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Boletim</title></head><body>\n<h1>Boletim</h1>\n");
            for ((data, secao), items) in &groups {
                doc.push_str(&format!(
                    "<h2>{} — {} ({} itens)</h2>\n<ul>\n",
                    escape_html(data),
                    escape_html(secao),
                    items.len()
                ));
                for item in items {
                    let title = escape_html(&item.titulo);
                    match &item.link {
                        Some(link) => doc.push_str(&format!(
                            "<li><a href=\"{}\">{}</a>",
                            escape_html(link),
                            title
                        )),
                        None => doc.push_str(&format!("<li>{}", title)),
                    }
                    if let Some(summary) = item_summary(item, summarizer, config) {
                        doc.push_str(&format!("<blockquote>{}</blockquote>", escape_html(&summary)));
                    }
                    doc.push_str("</li>\n");
                }
                doc.push_str("</ul>\n");
            }
            doc.push_str("</body></html>\n");
        }
    }
    doc
}

/// 生成简报文件
pub fn generate_bulletin(
    outputs: &[JobOutput],
    path: &Path,
    kind: BulletinKind,
    summarizer: Option<&dyn Summarizer>,
    config: &SummaryConfig,
) -> AppResult<()> {
    let doc = render_bulletin(outputs, kind, summarizer, config);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AppError::file(parent, e))?;
    }
    std::fs::write(path, doc).map_err(|e| AppError::file(path, e))?;
    tracing::info!("📰 简报已生成: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(secao: &str, titles: &[&str]) -> JobOutput {
        JobOutput {
            data: "02-01-2025".into(),
            secao: secao.into(),
            selecoes: vec![],
            query: String::new(),
            total: titles.len(),
            itens: titles
                .iter()
                .map(|t| Item {
                    titulo: t.to_string(),
                    link: Some(format!("https://x/{}", t)),
                    data_publicacao: None,
                    resumo: None,
                    hash: t.to_string(),
                })
                .collect(),
            enriquecido: false,
        }
    }

    #[test]
    fn test_markdown_groups_by_edition() {
        let doc = render_bulletin(
            &[output("do1", &["a", "b"]), output("do2", &["c"]), output("do1", &["d"])],
            BulletinKind::Markdown,
            None,
            &SummaryConfig::default(),
        );
        assert!(doc.contains("## 02-01-2025 — do1 (3 itens)"));
        assert!(doc.contains("## 02-01-2025 — do2 (1 itens)"));
        assert!(doc.contains("- [c](https://x/c)"));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(BulletinKind::from_path(Path::new("b.html")).unwrap(), BulletinKind::Html);
        assert_eq!(BulletinKind::from_path(Path::new("b")).unwrap(), BulletinKind::Markdown);
        assert!("docx".parse::<BulletinKind>().is_err());
    }

    #[test]
    fn test_html_escapes_titles() {
        let doc = render_bulletin(
            &[output("do1", &["<b>"])],
            BulletinKind::Html,
            None,
            &SummaryConfig::default(),
        );
        assert!(doc.contains("&lt;b&gt;"));
    }
}
