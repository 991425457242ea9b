//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，通过执行 JavaScript 实现 [`DomHandle`]。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::DisposeBrowserContextParams;
use chromiumoxide::{Browser, Page};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::time::sleep;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::dom::{DomHandle, DropdownRoot, ListingEntry, OptionItem};
use crate::models::portal::PortalProfile;

/// 提交查询或翻页后等待列表刷新的时间
const SETTLE_DELAY: Duration = Duration::from_millis(800);

const FIND_CONTROLS_JS: &str = r#"
(() => {
    const nodes = Array.from(document.querySelectorAll(
        'select, [role="combobox"], [aria-haspopup="listbox"], .dropdown'
    ));
    let seq = window.__cascadeSeq || 0;
    const out = [];
    for (const el of nodes) {
        const rect = el.getBoundingClientRect();
        if (rect.width === 0 && rect.height === 0) continue;
        if (!el.dataset.cascadeRef) {
            seq += 1;
            el.dataset.cascadeRef = String(seq);
        }
        const tag = el.tagName.toLowerCase();
        const kind = tag === 'select'
            ? 'native-select'
            : (el.getAttribute('role') === 'combobox' ? 'aria-combobox' : 'unknown');
        let label = el.getAttribute('aria-label') || '';
        if (!label && el.id) {
            const l = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
            if (l) label = l.innerText;
        }
        if (!label) {
            const lb = el.getAttribute('aria-labelledby');
            const l = lb ? document.getElementById(lb) : null;
            if (l) label = l.innerText;
        }
        if (!label) label = el.getAttribute('placeholder') || el.getAttribute('name') || '';
        out.push({
            kind,
            id: el.id || null,
            label: (label || '').trim(),
            x: rect.left + window.scrollX,
            y: rect.top + window.scrollY,
            ref: el.dataset.cascadeRef
        });
    }
    window.__cascadeSeq = seq;
    return out;
})()
"#;

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 把 DomHandle 的每个能力翻译成一段脚本
/// - 不认识 Job / Bucket
pub struct JsExecutor {
    page: Page,
    slow_mo: Duration,
    context: Option<PageContext>,
}

/// 页面所在的独立浏览器上下文，随页面一起释放
struct PageContext {
    browser: Arc<Browser>,
    id: BrowserContextId,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self {
            page,
            slow_mo: Duration::ZERO,
            context: None,
        }
    }

    /// 页面关闭时一并释放它所在的浏览器上下文
    pub fn with_context(mut self, browser: Arc<Browser>, id: BrowserContextId) -> Self {
        self.context = Some(PageContext { browser, id });
        self
    }

    /// 每个动作前额外等待（调试用）
    pub fn with_slow_mo(mut self, slow_mo: Duration) -> Self {
        self.slow_mo = slow_mo;
        self
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        if !self.slow_mo.is_zero() {
            sleep(self.slow_mo).await;
        }
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 对控件执行一段以 `el` 为参数的脚本，找不到元素时返回 false
    async fn with_element(&self, root: &DropdownRoot, body: &str) -> AppResult<bool> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector('[data-cascade-ref="' + {} + '"]');
                if (!el) return false;
                {}
            }})()
            "#,
            serde_json::to_string(&root.handle)?,
            body
        );
        let result = self.eval(js_code).await?;
        Ok(result.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl DomHandle for JsExecutor {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    async fn find_controls(&self) -> AppResult<Vec<DropdownRoot>> {
        self.eval_as(FIND_CONTROLS_JS).await
    }

    async fn read_options(&self, root: &DropdownRoot) -> AppResult<Vec<OptionItem>> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector('[data-cascade-ref="' + {} + '"]');
                if (!el) return [];
                if (el.tagName.toLowerCase() === 'select') {{
                    return Array.from(el.options).map((o, i) => ({{
                        value: o.value,
                        text: (o.text || '').trim(),
                        dataValue: o.dataset.value || null,
                        dataIndex: i
                    }}));
                }}
                const listId = el.getAttribute('aria-controls') || el.getAttribute('aria-owns');
                const list = listId ? document.getElementById(listId) : el.parentElement;
                if (!list) return [];
                return Array.from(list.querySelectorAll('[role="option"], li')).map((o, i) => ({{
                    value: o.getAttribute('value') || o.getAttribute('data-value') || '',
                    text: (o.innerText || '').trim(),
                    dataValue: o.getAttribute('data-value'),
                    dataIndex: i
                }}));
            }})()
            "#,
            serde_json::to_string(&root.handle)?
        );
        self.eval_as(js_code).await
    }

    async fn select_option(&self, root: &DropdownRoot, option: &OptionItem) -> AppResult<bool> {
        let body = format!(
            r#"
            const idx = {};
            if (el.tagName.toLowerCase() === 'select') {{
                el.selectedIndex = idx;
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return el.selectedIndex === idx;
            }}
            const listId = el.getAttribute('aria-controls') || el.getAttribute('aria-owns');
            const list = listId ? document.getElementById(listId) : el.parentElement;
            if (!list) return false;
            const opt = list.querySelectorAll('[role="option"], li')[idx];
            if (!opt) return false;
            opt.scrollIntoView({{ block: 'center' }});
            opt.click();
            return true;
            "#,
            option.data_index
        );
        self.with_element(root, &body).await
    }

    async fn click(&self, root: &DropdownRoot) -> AppResult<bool> {
        self.with_element(
            root,
            "el.scrollIntoView({ block: 'center' }); el.click(); return true;",
        )
        .await
    }

    async fn press_key(&self, root: &DropdownRoot, key: &str) -> AppResult<bool> {
        let body = format!(
            r#"
            el.focus();
            const key = {};
            el.dispatchEvent(new KeyboardEvent('keydown', {{ key, bubbles: true }}));
            el.dispatchEvent(new KeyboardEvent('keyup', {{ key, bubbles: true }}));
            return true;
            "#,
            serde_json::to_string(key)?
        );
        self.with_element(root, &body).await
    }

    async fn focus(&self, root: &DropdownRoot) -> AppResult<bool> {
        self.with_element(
            root,
            "el.focus(); el.dispatchEvent(new MouseEvent('mousedown', { bubbles: true })); return document.activeElement === el;",
        )
        .await
    }

    async fn submit_query(&self, profile: &PortalProfile, query: &str) -> AppResult<bool> {
        let js_code = format!(
            r#"
            (() => {{
                const input = document.querySelector({});
                if (!input) return false;
                input.focus();
                input.value = {};
                input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                const button = document.querySelector({});
                if (button) {{
                    button.click();
                }} else {{
                    input.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Enter', bubbles: true }}));
                    if (input.form) input.form.submit();
                }}
                return true;
            }})()
            "#,
            serde_json::to_string(&profile.search_input)?,
            serde_json::to_string(query)?,
            serde_json::to_string(&profile.search_button)?
        );
        let submitted = self.eval(js_code).await?.as_bool().unwrap_or(false);
        sleep(SETTLE_DELAY).await;
        Ok(submitted)
    }

    async fn read_listing(&self, profile: &PortalProfile) -> AppResult<Vec<ListingEntry>> {
        let js_code = format!(
            r#"
            (() => {{
                const text = (root, sel) => {{
                    const n = root.querySelector(sel);
                    return n ? (n.innerText || '').trim() : null;
                }};
                return Array.from(document.querySelectorAll({})).map(item => {{
                    const a = item.querySelector({});
                    return {{
                        title: text(item, {}) || (item.innerText || '').trim().split('\n')[0],
                        link: a ? a.href : null,
                        date: text(item, {})
                    }};
                }}).filter(e => e.title);
            }})()
            "#,
            serde_json::to_string(&profile.listing_item)?,
            serde_json::to_string(&profile.item_link)?,
            serde_json::to_string(&profile.item_title)?,
            serde_json::to_string(&profile.item_date)?
        );
        self.eval_as(js_code).await
    }

    async fn next_page(&self, profile: &PortalProfile) -> AppResult<bool> {
        let js_code = format!(
            r#"
            (() => {{
                const next = document.querySelector({});
                if (!next) return false;
                const style = window.getComputedStyle(next);
                if (next.disabled || next.getAttribute('aria-disabled') === 'true'
                    || style.display === 'none' || style.visibility === 'hidden') return false;
                next.click();
                return true;
            }})()
            "#,
            serde_json::to_string(&profile.next_page)?
        );
        let moved = self.eval(js_code).await?.as_bool().unwrap_or(false);
        if moved {
            sleep(SETTLE_DELAY).await;
        }
        Ok(moved)
    }

    async fn close(&self) -> AppResult<()> {
        let closed = self.page.clone().close().await;
        if let Some(context) = &self.context {
            context
                .browser
                .execute(DisposeBrowserContextParams::new(context.id.clone()))
                .await?;
            debug!("浏览器上下文已释放");
        }
        closed?;
        Ok(())
    }
}
