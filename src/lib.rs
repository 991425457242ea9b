//! # DOU Batch
//!
//! 一个用于从级联下拉框驱动的公报门户批量采集记录的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `DomHandle` - 页面能力接口（导航、读取选项、选择、列表翻页）
//! - `JsExecutor` - 唯一的 page owner，通过 eval() 实现 `DomHandle`
//! - `browser/` - 启动或连接 Chromium
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个任务或单个文件
//! - `DedupLedger` - 去重账本（追加写的 JSONL 文件）
//! - `HttpFetcher` - 详情页抓取（带磁盘缓存）
//! - `ExtractiveSummarizer` - 抽取式摘要
//! - `OutputWriter` - 写任务输出文件
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整处理流程
//! - `CascadeSelector` - 级联下拉框状态机（N1 → N2 → [N3]）
//! - `EditionFlow` - 流程编排（导航 → 级联选择 → 查询 → 去重 → 写出）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/expander` - 批量配置展开为任务
//! - `orchestrator/distributor` - 按版面分桶
//! - `orchestrator/executor` - 三种执行策略与回退
//! - `orchestrator/aggregator` - 汇总报告
//! - `orchestrator/batch_processor` - 批量处理器，管理整个批次
//!
//! ## 模块结构

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, StrategyKind};
pub use error::{AppError, AppResult, ErrorKind};
pub use infrastructure::{BrowserLauncher, BrowserSession, DomHandle, JsExecutor};
pub use models::{BatchReport, BatchSpec, Job};
pub use orchestrator::{BatchOptions, BatchProcessor};
pub use workflow::{CascadeSelector, EditionFlow, JobCtx};
