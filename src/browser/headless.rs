use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::browser::BrowserOptions;
use crate::error::{AppError, AppResult};

/// 启动本地浏览器（默认无头）
pub async fn launch_browser(options: &BrowserOptions) -> AppResult<(Browser, JoinHandle<()>)> {
    info!(
        "🚀 启动浏览器 ({})...",
        if options.headful { "有界面" } else { "无头" }
    );

    let mut builder = BrowserConfig::builder();
    builder = if options.headful {
        builder.with_head()
    } else {
        builder.new_headless_mode()
    };
    if let Some(executable) = &options.executable {
        builder = builder.chrome_executable(Path::new(executable));
    }
    let config = builder
        .args(vec![
            "--disable-gpu",
            "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
            "--disable-dev-shm-usage", // 防止共享内存不足
        ])
        .build()
        .map_err(|e| {
            error!("配置浏览器失败: {}", e);
            AppError::browser(format!("配置浏览器失败: {}", e))
        })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        AppError::browser(format!("启动浏览器失败: {}", e))
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handle = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    Ok((browser, handle))
}
