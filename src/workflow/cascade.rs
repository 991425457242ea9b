//! 级联下拉选择状态机 - 流程层
//!
//! 状态顺序：
//! `Init → Resolve(1) → Select(1) → WaitRepopulation(2) → Resolve(2) → Select(2)
//!  → [WaitRepopulation(3) → Resolve(3) → Select(3)] → Ready`
//!
//! 任一级失败进入 `FailedAtLevel(n)` 并跳过剩余层级。第 3 级只有在任务提供了键时才执行。
//! 除浏览器状态外没有副作用。

use std::time::Duration;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::{ControlKind, DomHandle, DropdownRoot, OptionItem};
use crate::models::job::{Job, KeyType, LevelKey};
use crate::models::output::Selection;
use crate::utils::normalize_text;

/// 必须完成的层级数
const REQUIRED_LEVELS: u8 = 2;
/// 最多支持的层级数
const MAX_LEVELS: u8 = 3;

/// 状态机参数
#[derive(Debug, Clone, Copy)]
pub struct CascadeOptions {
    /// 等待下级下拉框重新填充的上限
    pub repopulation_timeout: Duration,
    /// 轮询间隔
    pub poll_interval: Duration,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        Self {
            repopulation_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// 状态机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeState {
    Init,
    Resolve(u8),
    Select(u8),
    WaitRepopulation(u8),
    Ready,
    FailedAtLevel(u8),
}

/// 一次级联选择的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    pub ok: bool,
    pub level_failed: Option<u8>,
    pub selected_keys: Vec<Selection>,
    pub resolved_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ========== 打开下拉框的策略 ==========

/// 打开 ARIA 下拉框的一种方式
#[async_trait]
pub trait OpenStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 执行打开动作，返回动作本身是否生效
    async fn open(&self, page: &dyn DomHandle, root: &DropdownRoot) -> AppResult<bool>;
}

/// 直接点击
pub struct ClickOpen;

/// 聚焦后按方向键
pub struct KeyboardOpen;

/// 先聚焦再点击
pub struct FocusClickOpen;

#[async_trait]
impl OpenStrategy for ClickOpen {
    fn name(&self) -> &'static str {
        "click"
    }

    async fn open(&self, page: &dyn DomHandle, root: &DropdownRoot) -> AppResult<bool> {
        page.click(root).await
    }
}

#[async_trait]
impl OpenStrategy for KeyboardOpen {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    async fn open(&self, page: &dyn DomHandle, root: &DropdownRoot) -> AppResult<bool> {
        page.press_key(root, "ArrowDown").await
    }
}

#[async_trait]
impl OpenStrategy for FocusClickOpen {
    fn name(&self) -> &'static str {
        "focus-click"
    }

    async fn open(&self, page: &dyn DomHandle, root: &DropdownRoot) -> AppResult<bool> {
        Ok(page.focus(root).await? && page.click(root).await?)
    }
}

/// 默认策略顺序
pub fn default_open_strategies() -> Vec<Box<dyn OpenStrategy>> {
    vec![
        Box::new(ClickOpen),
        Box::new(KeyboardOpen),
        Box::new(FocusClickOpen),
    ]
}

// ========== 纯函数：排序与匹配 ==========

/// 去重并排序候选控件
///
/// 有 id 的按 id 去重，否则按屏幕位置去重；
/// 排序键为 (类型优先级, y, x)：原生 select 在前，其次 ARIA combobox，最后未识别控件。
pub fn rank_controls(mut controls: Vec<DropdownRoot>) -> Vec<DropdownRoot> {
    let mut seen_ids = std::collections::HashSet::new();
    let mut seen_positions = std::collections::HashSet::new();
    controls.retain(|c| match &c.id {
        Some(id) if !id.is_empty() => seen_ids.insert(id.clone()),
        _ => seen_positions.insert((c.x.round() as i64, c.y.round() as i64)),
    });
    controls.sort_by(|a, b| {
        a.kind
            .rank()
            .cmp(&b.kind.rank())
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });
    controls
}

/// 在已排序的控件中选出第 `level` 级
///
/// 给出标签正则时取第一个标签匹配的控件，否则按层级位置取。
pub fn pick_control(ranked: &[DropdownRoot], level: u8, label: Option<&str>) -> Option<DropdownRoot> {
    if let Some(pattern) = label.filter(|p| !p.trim().is_empty()) {
        let found = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => ranked.iter().find(|c| re.is_match(&c.label)),
            Err(_) => {
                let needle = normalize_text(pattern);
                ranked
                    .iter()
                    .find(|c| normalize_text(&c.label).contains(&needle))
            }
        };
        if found.is_some() {
            return found.cloned();
        }
    }
    ranked.get(usize::from(level.saturating_sub(1))).cloned()
}

fn option_matches(option: &OptionItem, key: &str, key_type: KeyType) -> bool {
    let key = key.trim();
    match key_type {
        KeyType::Value => !option.value.is_empty() && option.value.trim() == key,
        KeyType::DataValue => option.data_value.as_deref().map(str::trim) == Some(key),
        KeyType::DataIndex => key.parse::<usize>().ok() == Some(option.data_index),
        KeyType::Text => normalize_text(&option.text) == normalize_text(key),
    }
}

/// 按匹配方式查找选项
///
/// 指定了 `key_type` 时只用该方式；未指定时依次尝试 value → dataValue → dataIndex → text。
pub fn match_option<'a>(
    options: &'a [OptionItem],
    key: &str,
    key_type: Option<KeyType>,
) -> Option<(&'a OptionItem, KeyType)> {
    let order: &[KeyType] = match &key_type {
        Some(t) => std::slice::from_ref(t),
        None => &KeyType::FALLBACK_ORDER,
    };
    order.iter().find_map(|t| {
        options
            .iter()
            .find(|o| option_matches(o, key, *t))
            .map(|o| (o, *t))
    })
}

// ========== 状态机 ==========

/// 级联选择器
pub struct CascadeSelector<'a> {
    page: &'a dyn DomHandle,
    options: CascadeOptions,
    strategies: Vec<Box<dyn OpenStrategy>>,
}

impl<'a> CascadeSelector<'a> {
    pub fn new(page: &'a dyn DomHandle, options: CascadeOptions) -> Self {
        Self {
            page,
            options,
            strategies: default_open_strategies(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn OpenStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// 解析第 `level` 级控件（每次都重新查询页面）
    pub async fn resolve_level(&self, level: u8, label: Option<&str>) -> AppResult<Option<DropdownRoot>> {
        let ranked = rank_controls(self.page.find_controls().await?);
        Ok(pick_control(&ranked, level, label))
    }

    /// 读取选项；非原生控件先按策略顺序尝试打开
    pub async fn options_of(&self, root: &DropdownRoot) -> AppResult<Vec<OptionItem>> {
        if root.kind == ControlKind::NativeSelect {
            return self.page.read_options(root).await;
        }
        let existing = self.page.read_options(root).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        for strategy in &self.strategies {
            match strategy.open(self.page, root).await {
                Ok(true) => {
                    let options = self.page.read_options(root).await?;
                    if !options.is_empty() {
                        debug!("打开策略 '{}' 成功 ({} 个选项)", strategy.name(), options.len());
                        return Ok(options);
                    }
                    debug!("打开策略 '{}' 执行后仍无选项", strategy.name());
                }
                Ok(false) => debug!("打开策略 '{}' 未生效", strategy.name()),
                Err(e) => warn!("打开策略 '{}' 出错: {}", strategy.name(), e),
            }
        }
        Ok(Vec::new())
    }

    /// 在控件上按键选择，返回实际使用的匹配方式
    pub async fn select(&self, root: &DropdownRoot, key: &str, key_type: Option<KeyType>) -> AppResult<Option<KeyType>> {
        let options = self.options_of(root).await?;
        let Some((option, used)) = match_option(&options, key, key_type) else {
            debug!(
                "控件 '{}' 的 {} 个选项中没有匹配 '{}' ({:?})",
                root.label,
                options.len(),
                key,
                key_type
            );
            return Ok(None);
        };
        if self.page.select_option(root, option).await? {
            Ok(Some(used))
        } else {
            Ok(None)
        }
    }

    /// 当前第 `level` 级控件的选项数（控件不存在时为 0）
    ///
    /// 非原生控件按打开策略展开后计数，计数后再收起。
    async fn option_count(&self, level: u8, label: Option<&str>) -> AppResult<usize> {
        let Some(root) = self.resolve_level(level, label).await? else {
            return Ok(0);
        };
        let count = self.options_of(&root).await?.len();
        if root.kind != ControlKind::NativeSelect && count > 0 {
            self.collapse(&root).await;
        }
        Ok(count)
    }

    async fn collapse(&self, root: &DropdownRoot) {
        if let Err(e) = self.page.press_key(root, "Escape").await {
            debug!("收起控件 '{}' 失败: {}", root.label, e);
        }
    }

    /// 等待第 `level` 级控件的选项数变化且非零
    ///
    /// 返回最终的选项数；超时不视为失败，由后续选择决定成败。
    pub async fn wait_repopulation(&self, level: u8, label: Option<&str>, previous: usize) -> AppResult<usize> {
        let deadline = Instant::now() + self.options.repopulation_timeout;
        loop {
            let count = self.option_count(level, label).await?;
            if count != previous && count > 0 {
                debug!("第 {} 级已重新填充: {} → {}", level, previous, count);
                return Ok(count);
            }
            if Instant::now() >= deadline {
                warn!(
                    "等待第 {} 级重新填充超时 ({:?})，当前选项数 {}",
                    level, self.options.repopulation_timeout, count
                );
                return Ok(count);
            }
            sleep(self.options.poll_interval).await;
        }
    }

    /// 对一个任务运行完整的级联选择
    pub async fn run(&self, job: &Job) -> SelectionResult {
        let keys: Vec<Option<LevelKey>> = (1..=MAX_LEVELS).map(|l| job.level_key(l)).collect();
        let key_for = |level: u8| keys[usize::from(level - 1)].as_ref();
        let last_level = if key_for(3).is_some() { 3 } else { REQUIRED_LEVELS };

        let mut result = SelectionResult::default();
        let mut state = CascadeState::Init;
        let mut current: Option<DropdownRoot> = None;

        loop {
            debug!("级联状态: {:?}", state);
            state = match state {
                CascadeState::Init => CascadeState::Resolve(1),

                CascadeState::Resolve(level) => {
                    let label = key_for(level).and_then(|k| k.label.as_deref());
                    match self.resolve_level(level, label).await {
                        Ok(Some(root)) => {
                            current = Some(root);
                            CascadeState::Select(level)
                        }
                        Ok(None) => {
                            result.reason = Some(format!("找不到第 {} 级下拉框", level));
                            CascadeState::FailedAtLevel(level)
                        }
                        Err(e) => {
                            result.reason = Some(e.to_string());
                            CascadeState::FailedAtLevel(level)
                        }
                    }
                }

                CascadeState::Select(level) => {
                    let Some(level_key) = key_for(level) else {
                        result.reason = Some(format!("缺少第 {} 级的键", level));
                        state = CascadeState::FailedAtLevel(level);
                        continue;
                    };
                    let Some(root) = current.take() else {
                        state = CascadeState::Resolve(level);
                        continue;
                    };

                    // 下一级在选择前的选项数，用于判断重新填充
                    let next_label = key_for(level + 1).and_then(|k| k.label.as_deref());
                    let previous = if level < last_level {
                        self.option_count(level + 1, next_label).await.unwrap_or(0)
                    } else {
                        0
                    };

                    match self.select_with_reresolve(level, &root, level_key).await {
                        Ok(Some((used, label))) => {
                            info!("✓ 第 {} 级已选择 '{}' ({})", level, level_key.key, used);
                            result.selected_keys.push(Selection {
                                level,
                                key_type: used.as_str().to_string(),
                                key: level_key.key.clone(),
                            });
                            result.resolved_labels.push(label);
                            if level < last_level {
                                self.wait_repopulation(level + 1, next_label, previous)
                                    .await
                                    .map(|_| CascadeState::WaitRepopulation(level + 1))
                                    .unwrap_or_else(|e| {
                                        result.reason = Some(e.to_string());
                                        CascadeState::FailedAtLevel(level + 1)
                                    })
                            } else {
                                CascadeState::Ready
                            }
                        }
                        Ok(None) => {
                            result.reason = Some(format!(
                                "第 {} 级没有可选的 '{}'",
                                level, level_key.key
                            ));
                            CascadeState::FailedAtLevel(level)
                        }
                        Err(e) => {
                            result.reason = Some(e.to_string());
                            CascadeState::FailedAtLevel(level)
                        }
                    }
                }

                CascadeState::WaitRepopulation(level) => CascadeState::Resolve(level),

                CascadeState::Ready => {
                    result.ok = true;
                    result.level_failed = None;
                    result.reason = None;
                    return result;
                }

                CascadeState::FailedAtLevel(level) => {
                    warn!(
                        "✗ 级联选择在第 {} 级失败: {}",
                        level,
                        result.reason.as_deref().unwrap_or("未知原因")
                    );
                    result.ok = false;
                    result.level_failed = Some(level);
                    return result;
                }
            };
        }
    }

    /// 选择一次；控件失效时重新解析后再试一次
    async fn select_with_reresolve(
        &self,
        level: u8,
        root: &DropdownRoot,
        level_key: &LevelKey,
    ) -> AppResult<Option<(KeyType, String)>> {
        if let Some(used) = self.select(root, &level_key.key, level_key.key_type).await? {
            return Ok(Some((used, root.label.clone())));
        }
        let Some(fresh) = self.resolve_level(level, level_key.label.as_deref()).await? else {
            return Ok(None);
        };
        if fresh == *root {
            return Ok(None);
        }
        debug!("第 {} 级控件已被替换，重新解析后重试", level);
        Ok(self
            .select(&fresh, &level_key.key, level_key.key_type)
            .await?
            .map(|used| (used, fresh.label.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(kind: ControlKind, id: Option<&str>, x: f64, y: f64, label: &str) -> DropdownRoot {
        DropdownRoot {
            kind,
            id: id.map(String::from),
            label: label.to_string(),
            x,
            y,
            handle: format!("{}-{}", x, y),
        }
    }

    fn opt(value: &str, text: &str, data_value: Option<&str>, data_index: usize) -> OptionItem {
        OptionItem {
            value: value.into(),
            text: text.into(),
            data_value: data_value.map(String::from),
            data_index,
        }
    }

    #[test]
    fn test_rank_controls_orders_and_dedups() {
        let ranked = rank_controls(vec![
            root(ControlKind::Unknown, None, 0.0, 10.0, "u"),
            root(ControlKind::AriaCombobox, Some("org"), 0.0, 50.0, "aria"),
            root(ControlKind::NativeSelect, Some("sec"), 0.0, 300.0, "second"),
            root(ControlKind::NativeSelect, Some("first"), 0.0, 100.0, "first"),
            root(ControlKind::NativeSelect, Some("first"), 5.0, 500.0, "dup id"),
            root(ControlKind::Unknown, None, 0.2, 10.3, "dup pos"),
        ]);
        let labels: Vec<_> = ranked.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["first", "second", "aria", "u"]);
    }

    #[test]
    fn test_pick_control_by_label_or_position() {
        let ranked = rank_controls(vec![
            root(ControlKind::NativeSelect, Some("a"), 0.0, 1.0, "Órgão"),
            root(ControlKind::NativeSelect, Some("b"), 0.0, 2.0, "Tipo de Ato"),
        ]);
        assert_eq!(pick_control(&ranked, 1, Some("tipo")).unwrap().label, "Tipo de Ato");
        assert_eq!(pick_control(&ranked, 2, None).unwrap().label, "Tipo de Ato");
        // 标签不匹配时回退到位置
        assert_eq!(pick_control(&ranked, 1, Some("nada")).unwrap().label, "Órgão");
        // 非法正则按文本包含匹配
        assert_eq!(pick_control(&ranked, 1, Some("tipo (")).map(|c| c.label), Some("Órgão".into()));
        assert!(pick_control(&ranked, 3, None).is_none());
    }

    #[test]
    fn test_match_option_priority() {
        let options = vec![
            opt("", "Selecione", None, 0),
            opt("10", "Ministério da Saúde", Some("ms"), 1),
            opt("2", "Ministério da Fazenda", Some("mf"), 2),
        ];

        let (o, t) = match_option(&options, "ministerio da saude", None).unwrap();
        assert_eq!((o.data_index, t), (1, KeyType::Text));

        // value 优先于 dataIndex
        let (o, t) = match_option(&options, "2", None).unwrap();
        assert_eq!((o.data_index, t), (2, KeyType::Value));

        let (o, t) = match_option(&options, "2", Some(KeyType::DataIndex)).unwrap();
        assert_eq!((o.data_index, t), (2, KeyType::DataIndex));

        let (o, _) = match_option(&options, "mf", Some(KeyType::DataValue)).unwrap();
        assert_eq!(o.value, "2");

        assert!(match_option(&options, "mf", Some(KeyType::Value)).is_none());
        assert!(match_option(&options, "", Some(KeyType::Value)).is_none());
    }
}
