//! 内容抓取服务 - 业务能力层
//!
//! 抓取详情页 HTML，带磁盘缓存（文件名为 URL 的 sha1）。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::services::ledger::content_hash;

/// 抓取结果
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub html: String,
    pub from_cache: bool,
}

/// 内容抓取能力
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> AppResult<FetchedContent>;
}

/// 基于 reqwest 的抓取器
pub struct HttpFetcher {
    client: reqwest::Client,
    cache_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(cache_dir: Option<PathBuf>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("dou_batch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::job(format!("无法创建HTTP客户端: {}", e)))?;
        Ok(Self { client, cache_dir })
    }

    fn cache_path(&self, url: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.html", content_hash(&[url]))))
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> AppResult<FetchedContent> {
        let cache_path = self.cache_path(url);
        if let Some(path) = &cache_path {
            if let Ok(html) = fs::read_to_string(path).await {
                debug!("缓存命中: {}", url);
                return Ok(FetchedContent {
                    html,
                    from_cache: true,
                });
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::job(format!("抓取 {} 失败: {}", url, e)))?;
        let html = response
            .text()
            .await
            .map_err(|e| AppError::job(format!("读取 {} 响应失败: {}", url, e)))?;

        if let Some(path) = &cache_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::file(parent, e))?;
            }
            fs::write(path, &html)
                .await
                .map_err(|e| AppError::file(path, e))?;
        }

        Ok(FetchedContent {
            html,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cached_content_is_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(Some(dir.path().to_path_buf())).unwrap();
        let url = "http://127.0.0.1:9/never-contacted";
        let cache_path = fetcher.cache_path(url).unwrap();
        std::fs::write(&cache_path, "<p>cached</p>").unwrap();

        let fetched = fetcher.fetch(url).await.unwrap();
        assert!(fetched.from_cache);
        assert_eq!(fetched.html, "<p>cached</p>");
    }
}
