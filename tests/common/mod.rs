//! 测试用的假门户
//!
//! 三个下拉框（Órgão / Tipo / Seção，原生 select 或 ARIA combobox），选项由上一级的选择决定；
//! 列表内容由当前选择生成，另有一组在所有组合中都出现的公共条目。
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dou_batch::error::{AppError, AppResult};
use dou_batch::infrastructure::{
    BrowserLauncher, BrowserSession, ControlKind, DomHandle, DropdownRoot, ListingEntry, OptionItem,
};
use dou_batch::models::job::Job;
use dou_batch::models::portal::PortalProfile;
use dou_batch::orchestrator::payload::WorkerSettings;
use dou_batch::workflow::FlowSettings;

const PLACEHOLDER: &str = "Selecione";
const LABELS: [&str; 3] = ["Órgão", "Tipo de Ato", "Seção"];

/// 门户的选项树与列表设置
#[derive(Debug, Clone, Default)]
pub struct PortalTree {
    /// 第 1 级 → 第 2 级
    pub level2: BTreeMap<String, Vec<String>>,
    /// (第 1 级, 第 2 级) → 第 3 级
    pub level3: BTreeMap<(String, String), Vec<String>>,
    /// 每个组合自己的条目数
    pub items_per_combo: usize,
    /// 所有组合都会列出的公共条目
    pub shared_items: Vec<String>,
    /// 前 N 次导航失败
    pub failing_navigations: usize,
    /// 使用 ARIA combobox：按 ArrowDown 展开后才能读到选项，Escape 收起，点击无效
    pub aria: bool,
}

impl PortalTree {
    /// 两个部委，各有两种文书；Saúde/Portaria 下还有第 3 级
    pub fn sample() -> Self {
        let mut level2 = BTreeMap::new();
        level2.insert(
            "Ministério da Saúde".to_string(),
            vec!["Portaria".to_string(), "Despacho".to_string()],
        );
        level2.insert(
            "Ministério da Fazenda".to_string(),
            vec!["Portaria".to_string(), "Instrução Normativa".to_string()],
        );
        let mut level3 = BTreeMap::new();
        level3.insert(
            ("Ministério da Saúde".to_string(), "Portaria".to_string()),
            vec!["Gabinete".to_string(), "Secretaria Executiva".to_string()],
        );
        Self {
            level2,
            level3,
            items_per_combo: 2,
            shared_items: vec!["Aviso geral".to_string()],
            failing_navigations: 0,
            aria: false,
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    selected: [Option<String>; 3],
    opened: [bool; 3],
    navigations: usize,
    queries: Vec<String>,
}

fn options(texts: impl IntoIterator<Item = String>) -> Vec<OptionItem> {
    std::iter::once(PLACEHOLDER.to_string())
        .chain(texts)
        .enumerate()
        .map(|(i, text)| OptionItem {
            value: if i == 0 { String::new() } else { format!("v{}", i) },
            text,
            data_value: None,
            data_index: i,
        })
        .collect()
}

/// 一个页面
pub struct FakePortal {
    tree: Arc<PortalTree>,
    state: Mutex<PageState>,
    navigations: Arc<AtomicUsize>,
}

impl FakePortal {
    pub fn new(tree: PortalTree) -> Self {
        Self::shared(Arc::new(tree), Arc::new(AtomicUsize::new(0)))
    }

    fn shared(tree: Arc<PortalTree>, navigations: Arc<AtomicUsize>) -> Self {
        Self {
            tree,
            state: Mutex::new(PageState::default()),
            navigations,
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn page_navigations(&self) -> usize {
        self.state.lock().unwrap().navigations
    }

    fn level_of(root: &DropdownRoot) -> usize {
        root.handle.trim_start_matches('n').parse().unwrap_or(0)
    }

    fn options_for(&self, level: usize, selected: &[Option<String>; 3]) -> Vec<OptionItem> {
        match level {
            1 => options(self.tree.level2.keys().cloned()),
            2 => match &selected[0] {
                Some(k1) => options(self.tree.level2.get(k1).cloned().unwrap_or_default()),
                None => options(Vec::new()),
            },
            3 => match (&selected[0], &selected[1]) {
                (Some(k1), Some(k2)) => options(
                    self.tree
                        .level3
                        .get(&(k1.clone(), k2.clone()))
                        .cloned()
                        .unwrap_or_default(),
                ),
                _ => options(Vec::new()),
            },
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl DomHandle for FakePortal {
    async fn navigate(&self, _url: &str) -> AppResult<()> {
        let attempt = self.navigations.fetch_add(1, Ordering::SeqCst);
        if attempt < self.tree.failing_navigations {
            return Err(AppError::browser("net::ERR_TIMED_OUT"));
        }
        let mut state = self.state.lock().unwrap();
        state.selected = Default::default();
        state.navigations += 1;
        Ok(())
    }

    async fn find_controls(&self) -> AppResult<Vec<DropdownRoot>> {
        Ok((1..=3)
            .map(|level| DropdownRoot {
                kind: if self.tree.aria {
                    ControlKind::AriaCombobox
                } else {
                    ControlKind::NativeSelect
                },
                id: Some(format!("sel-{}", level)),
                label: LABELS[level - 1].to_string(),
                x: 10.0,
                y: 100.0 * level as f64,
                handle: format!("n{}", level),
            })
            .collect())
    }

    async fn read_options(&self, root: &DropdownRoot) -> AppResult<Vec<OptionItem>> {
        let state = self.state.lock().unwrap();
        let level = Self::level_of(root);
        let opened = (1..=3).contains(&level) && state.opened[level - 1];
        if self.tree.aria && !opened {
            return Ok(Vec::new());
        }
        Ok(self.options_for(level, &state.selected))
    }

    async fn select_option(&self, root: &DropdownRoot, option: &OptionItem) -> AppResult<bool> {
        let level = Self::level_of(root);
        if !(1..=3).contains(&level) {
            return Ok(false);
        }
        let mut state = self.state.lock().unwrap();
        state.selected[level - 1] = Some(option.text.clone());
        state.opened = Default::default();
        for deeper in level..3 {
            state.selected[deeper] = None;
        }
        Ok(true)
    }

    async fn click(&self, _root: &DropdownRoot) -> AppResult<bool> {
        Ok(!self.tree.aria)
    }

    async fn press_key(&self, root: &DropdownRoot, key: &str) -> AppResult<bool> {
        let level = Self::level_of(root);
        if !(1..=3).contains(&level) {
            return Ok(false);
        }
        let open = match key {
            "ArrowDown" => true,
            "Escape" => false,
            _ => return Ok(false),
        };
        self.state.lock().unwrap().opened[level - 1] = open;
        Ok(true)
    }

    async fn focus(&self, _root: &DropdownRoot) -> AppResult<bool> {
        Ok(true)
    }

    async fn submit_query(&self, _profile: &PortalProfile, query: &str) -> AppResult<bool> {
        self.state.lock().unwrap().queries.push(query.to_string());
        Ok(true)
    }

    async fn read_listing(&self, _profile: &PortalProfile) -> AppResult<Vec<ListingEntry>> {
        let state = self.state.lock().unwrap();
        let path: Vec<&str> = state.selected.iter().flatten().map(String::as_str).collect();
        let combo = path.join(" / ");

        let own = (1..=self.tree.items_per_combo).map(|n| ListingEntry {
            title: format!("{} #{}", combo, n),
            link: Some(format!("https://portal.test/{}/{}", combo.replace(' ', "_"), n)),
            date: Some("02-01-2025".to_string()),
        });
        let shared = self.tree.shared_items.iter().map(|title| ListingEntry {
            title: title.clone(),
            link: Some(format!("https://portal.test/shared/{}", title.replace(' ', "_"))),
            date: Some("02-01-2025".to_string()),
        });
        Ok(own.chain(shared).collect())
    }

    async fn next_page(&self, _profile: &PortalProfile) -> AppResult<bool> {
        Ok(false)
    }
}

/// 假浏览器：每个页面共享同一棵选项树
pub struct FakeSession {
    tree: Arc<PortalTree>,
    navigations: Arc<AtomicUsize>,
    pages: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self) -> AppResult<Box<dyn DomHandle>> {
        self.pages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePortal::shared(
            Arc::clone(&self.tree),
            Arc::clone(&self.navigations),
        )))
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

/// 假启动器，记录启动次数和打开的页面数
pub struct FakeLauncher {
    tree: Arc<PortalTree>,
    navigations: Arc<AtomicUsize>,
    pub launches: AtomicUsize,
    pub pages: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(tree: PortalTree) -> Self {
        Self {
            tree: Arc::new(tree),
            navigations: Arc::new(AtomicUsize::new(0)),
            launches: AtomicUsize::new(0),
            pages: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> AppResult<Box<dyn BrowserSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            tree: Arc::clone(&self.tree),
            navigations: Arc::clone(&self.navigations),
            pages: Arc::clone(&self.pages),
        }))
    }
}

/// 快速的流程参数：输出写到 `out_dir`
pub fn flow_settings(out_dir: &std::path::Path) -> FlowSettings {
    FlowSettings {
        base_url: "https://portal.test/leiturajornal".to_string(),
        nav_retries: 3,
        max_pages: 2,
        repopulation_timeout_ms: 100,
        repopulation_poll_ms: 5,
        out_dir: out_dir.to_path_buf(),
        ..Default::default()
    }
}

pub fn worker_settings(out_dir: &std::path::Path) -> WorkerSettings {
    WorkerSettings {
        flow: flow_settings(out_dir),
        ..Default::default()
    }
}

pub fn job(ordinal: usize, key1: &str, key2: &str) -> Job {
    Job {
        topic: "atos".to_string(),
        date: "02-01-2025".to_string(),
        section: "do1".to_string(),
        key1: Some(key1.to_string()),
        key2: Some(key2.to_string()),
        repeat_index: 1,
        ordinal,
        combo_index: Some(ordinal + 1),
        ..Default::default()
    }
}
