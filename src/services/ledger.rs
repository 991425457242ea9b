//! 去重账本 - 业务能力层
//!
//! 只追加的内容哈希集合，以 JSON Lines 文件持久化（每行 `{"hash": "..."}`）。
//!
//! ## 一致性
//!
//! - 进程内：账本与报告累加器由同一把锁保护（见 `workflow::Accumulator`）
//! - 跨进程：没有实时同步。两个进程同时遇到同一条内容时会各自记录一次，
//!   文件中可能出现重复行；加载时按集合去重。这是为吞吐量接受的弱一致性。

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
struct LedgerLine {
    hash: String,
}

/// 去重账本
#[derive(Debug, Default)]
pub struct DedupLedger {
    path: Option<PathBuf>,
    seen: HashSet<String>,
}

impl DedupLedger {
    /// 仅内存账本（未配置 state_file 时）
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 打开账本文件并一次性读入内存；文件不存在时视为空
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let mut seen = HashSet::new();

        if path.exists() {
            let file = File::open(&path).map_err(|e| AppError::file(&path, e))?;
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| AppError::file(&path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LedgerLine>(&line) {
                    Ok(entry) => {
                        seen.insert(entry.hash);
                    }
                    Err(e) => warn!(
                        "账本 {} 第 {} 行无法解析，已跳过: {}",
                        path.display(),
                        line_no + 1,
                        e
                    ),
                }
            }
        } else if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AppError::file(parent, e))?;
        }

        debug!("账本 {} 已加载 {} 条哈希", path.display(), seen.len());
        Ok(Self {
            path: Some(path),
            seen,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn has(&self, hash: &str) -> bool {
        self.seen.contains(hash)
    }

    /// 添加一个哈希，首次出现时返回 true
    pub fn add(&mut self, hash: &str) -> AppResult<bool> {
        Ok(self.add_batch([hash])? == 1)
    }

    /// 批量添加，返回新增数量；只有新哈希会写入文件
    ///
    /// 文件写入成功后才更新内存集合，写入失败时两者都不变。
    pub fn add_batch<I, S>(&mut self, hashes: I) -> AppResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batch = HashSet::new();
        let mut fresh = Vec::new();
        for hash in hashes {
            let hash = hash.as_ref();
            if !self.seen.contains(hash) && batch.insert(hash.to_string()) {
                fresh.push(hash.to_string());
            }
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        if let Some(path) = &self.path {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| AppError::file(path, e))?;
            let mut writer = BufWriter::new(file);
            for hash in &fresh {
                let line = serde_json::to_string(&LedgerLine { hash: hash.clone() })?;
                writeln!(writer, "{}", line).map_err(|e| AppError::file(path, e))?;
            }
            writer.flush().map_err(|e| AppError::file(path, e))?;
        }
        let added = fresh.len();
        self.seen.extend(fresh);
        Ok(added)
    }
}

fn file_len(path: &Path) -> AppResult<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::file(path, e)),
    }
}

/// 账本文件在某一时刻的长度
///
/// 一次执行被整体作废时，用它撤销这次执行期间追加的哈希。
#[derive(Debug, Clone)]
pub struct LedgerMark {
    path: Option<PathBuf>,
    len: u64,
}

impl LedgerMark {
    pub fn take(path: Option<&Path>) -> AppResult<Self> {
        let len = match path {
            Some(p) => file_len(p)?.unwrap_or(0),
            None => 0,
        };
        Ok(Self {
            path: path.map(Path::to_path_buf),
            len,
        })
    }

    /// 截断回记录时的长度，返回撤销的字节数
    pub fn restore(&self) -> AppResult<u64> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        let current = match file_len(path)? {
            Some(len) if len > self.len => len,
            _ => return Ok(0),
        };
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| AppError::file(path, e))?;
        file.set_len(self.len).map_err(|e| AppError::file(path, e))?;
        debug!("账本 {} 已回退到 {} 字节", path.display(), self.len);
        Ok(current - self.len)
    }
}

/// 计算内容哈希（sha1 十六进制）
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha1::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\x1f");
        }
        hasher.update(part.trim().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
