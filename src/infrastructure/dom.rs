//! 浏览器能力抽象 - 基础设施层
//!
//! 上层只通过这里的 trait 与页面交互，自动化库的细节留在适配器中
//! （见 [`JsExecutor`](crate::infrastructure::JsExecutor)）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::portal::PortalProfile;

/// 交互控件的类型，按排序优先级从高到低
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlKind {
    /// 原生 `<select>`
    NativeSelect,
    /// ARIA combobox
    AriaCombobox,
    /// 无法识别的下拉控件
    Unknown,
}

impl ControlKind {
    /// 排序权重：原生 select 优先
    pub fn rank(self) -> u8 {
        match self {
            ControlKind::NativeSelect => 0,
            ControlKind::AriaCombobox => 1,
            ControlKind::Unknown => 2,
        }
    }
}

/// 一个下拉控件的句柄
///
/// 每次选择后页面可能被重新渲染，使用前必须重新解析。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownRoot {
    pub kind: ControlKind,
    /// 稳定 id（若有）
    #[serde(default)]
    pub id: Option<String>,
    /// 推导出的可读标签
    #[serde(default)]
    pub label: String,
    /// 屏幕位置（用于排序和无 id 时去重）
    pub x: f64,
    pub y: f64,
    /// 适配器内部用于重新定位的引用
    #[serde(rename = "ref")]
    pub handle: String,
}

/// 下拉框中的一个选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionItem {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub data_value: Option<String>,
    pub data_index: usize,
}

/// 列表页中读取到的原始记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub title: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// 页面能力
///
/// 职责：
/// - 导航、查找控件、读取和选择选项
/// - 提交查询、读取列表、翻页
/// - 不认识 Job / Bucket，不处理流程
#[async_trait]
pub trait DomHandle: Send + Sync {
    /// 导航到指定地址并等待加载
    async fn navigate(&self, url: &str) -> AppResult<()>;

    /// 发现页面上的候选下拉控件（未排序、未去重）
    async fn find_controls(&self) -> AppResult<Vec<DropdownRoot>>;

    /// 读取控件当前的选项
    async fn read_options(&self, root: &DropdownRoot) -> AppResult<Vec<OptionItem>>;

    /// 选中指定选项，返回是否生效
    async fn select_option(&self, root: &DropdownRoot, option: &OptionItem) -> AppResult<bool>;

    /// 点击控件
    async fn click(&self, root: &DropdownRoot) -> AppResult<bool>;

    /// 在控件上按键
    async fn press_key(&self, root: &DropdownRoot, key: &str) -> AppResult<bool>;

    /// 聚焦控件
    async fn focus(&self, root: &DropdownRoot) -> AppResult<bool>;

    /// 输入并提交查询
    async fn submit_query(&self, profile: &PortalProfile, query: &str) -> AppResult<bool>;

    /// 读取当前列表页
    async fn read_listing(&self, profile: &PortalProfile) -> AppResult<Vec<ListingEntry>>;

    /// 翻到下一页，没有下一页时返回 false
    async fn next_page(&self, profile: &PortalProfile) -> AppResult<bool>;

    /// 关闭页面
    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}

/// 一个已启动的浏览器
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// 在独立的浏览器上下文中打开新页面
    async fn new_page(&self) -> AppResult<Box<dyn DomHandle>>;

    /// 关闭浏览器
    async fn close(self: Box<Self>) -> AppResult<()>;
}

/// 浏览器启动器
///
/// 每个 worker（线程或进程）各自调用一次 `launch`，浏览器不跨运行时共享。
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> AppResult<Box<dyn BrowserSession>>;
}
