//! chromiumoxide 会话 - 实现 [`BrowserLauncher`] / [`BrowserSession`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::CloseParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, GetBrowserContextsParams,
};
use chromiumoxide::Browser;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::browser::{connect_to_browser, launch_browser, BrowserOptions};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{BrowserLauncher, BrowserSession, DomHandle, JsExecutor};

/// 按配置启动或连接 Chromium
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    /// 启动或连接浏览器，返回具体的会话类型
    pub async fn open(&self) -> AppResult<ChromiumSession> {
        let (browser, handler) = match self.options.debug_port {
            Some(port) => connect_to_browser(port).await?,
            None => launch_browser(&self.options).await?,
        };
        Ok(ChromiumSession {
            browser: Arc::new(browser),
            handler,
            owned: self.options.debug_port.is_none(),
            slow_mo: Duration::from_millis(self.options.slow_mo_ms),
        })
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> AppResult<Box<dyn BrowserSession>> {
        Ok(Box::new(self.open().await?))
    }
}

/// 一个浏览器实例；每个页面位于独立的浏览器上下文中
pub struct ChromiumSession {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    /// 由本进程启动（连接到外部浏览器时不关闭它）
    owned: bool,
    slow_mo: Duration,
}

impl ChromiumSession {
    /// 浏览器中现存的独立上下文数（不含默认上下文）
    pub async fn context_count(&self) -> AppResult<usize> {
        let contexts = self.browser.execute(GetBrowserContextsParams::default()).await?;
        Ok(contexts.result.browser_context_ids.len())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self) -> AppResult<Box<dyn DomHandle>> {
        let context = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await?;
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.result.browser_context_id.clone())
            .build()
            .map_err(AppError::browser)?;
        let page = self.browser.new_page(params).await?;
        debug!("已在独立上下文中创建页面");
        Ok(Box::new(
            JsExecutor::new(page)
                .with_slow_mo(self.slow_mo)
                .with_context(Arc::clone(&self.browser), context.result.browser_context_id),
        ))
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        match this.context_count().await {
            Ok(0) => {}
            Ok(n) => warn!("关闭会话时仍有 {} 个浏览器上下文未释放", n),
            Err(e) => debug!("无法查询浏览器上下文: {}", e),
        }
        if this.owned {
            match Arc::try_unwrap(this.browser) {
                Ok(mut browser) => {
                    if let Err(e) = browser.close().await {
                        warn!("关闭浏览器失败: {}", e);
                    }
                    let _ = browser.wait().await;
                }
                // 仍有页面持有浏览器句柄
                Err(shared) => {
                    if let Err(e) = shared.execute(CloseParams::default()).await {
                        warn!("关闭浏览器失败: {}", e);
                    }
                }
            }
        }
        this.handler.abort();
        Ok(())
    }
}
