//! 输出写入服务 - 业务能力层
//!
//! 只负责"把一个任务的结果写成文件"，文件名由模板和任务序号决定，
//! 因此无论完成顺序如何，结果都可按序号定位。

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::job::Job;
use crate::models::output::JobOutput;
use crate::utils::slugify;

/// 按模板渲染任务输出文件名
///
/// 支持 `{topic}` `{secao}` `{date}` `{idx}` `{rep}` `{key1}` `{key2}` `{key3}`。
pub fn render_output_name(pattern: &str, job: &Job) -> String {
    let key = |k: &Option<String>| k.as_deref().map(slugify).unwrap_or_default();
    let name = pattern
        .replace("{topic}", &slugify(&job.topic))
        .replace("{secao}", &slugify(&job.section))
        .replace("{date}", &slugify(&job.date))
        .replace("{idx}", &job.display_index().to_string())
        .replace("{rep}", &job.repeat_index.to_string())
        .replace("{key1}", &key(&job.key1))
        .replace("{key2}", &key(&job.key2))
        .replace("{key3}", &key(&job.key3));
    if name.ends_with(".json") {
        name
    } else {
        format!("{}.json", name)
    }
}

/// 输出写入器
pub struct OutputWriter {
    out_dir: PathBuf,
    pattern: String,
}

impl OutputWriter {
    pub fn new(out_dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            pattern: pattern.into(),
        }
    }

    pub fn path_for(&self, job: &Job) -> PathBuf {
        self.out_dir.join(render_output_name(&self.pattern, job))
    }

    /// 写入任务结果（先写临时文件再改名）
    pub fn write(&self, job: &Job, output: &JobOutput) -> AppResult<PathBuf> {
        let target = self.path_for(job);
        write_json_atomic(&target, output)?;
        debug!("已写入 {} ({} 条)", target.display(), output.total);
        Ok(target)
    }
}

/// 原子地写入 JSON 文件
pub fn write_json_atomic<T: serde::Serialize>(target: &Path, value: &T) -> AppResult<()> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| AppError::file(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AppError::file(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush().map_err(|e| AppError::file(target, e))?;
    tmp.persist(target)
        .map_err(|e| AppError::file(target, e.error))?;
    Ok(())
}
