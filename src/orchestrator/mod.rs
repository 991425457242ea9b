//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责把一份批量配置变成成百上千个浏览器任务，并发执行并汇总结果，
//! 是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `expander` - 任务展开
//! - `jobs` / `topics`×`combos` / `combos` 三种来源，按优先级取第一个非空的
//! - 叠加 `defaults`，按 `repeat` 复制
//!
//! ### `distributor` - 分桶
//! - 同一版面（date, secao）的任务放在一起，按并发数切分
//!
//! ### `executor` - 执行策略
//! - `subprocess` / `thread` / `process` 三种后端，外加回退装饰器与快速路径
//!
//! ### `worker` - 分桶执行
//! - 在一个浏览器中顺序执行一个分桶的任务；也是隐藏子命令 `worker` 的入口
//!
//! ### `aggregator` - 汇总
//! - 合并部分结果、计算统计、可选合并输出文件、写出报告
//!
//! ### `planner` - 计划生成
//! - `plan` / `plan-from-pairs` / `plan-live` / `list`
//!
//! ### `batch_processor` - 批量处理器
//! - 串起以上各步，`batch` 子命令的入口
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (BatchSpec → Vec<Job> → Vec<Bucket>)
//!     ↓
//! executor (subprocess / thread / process + fallback)
//!     ↓
//! worker (处理一个 Bucket)
//!     ↓
//! workflow::EditionFlow (处理单个 Job)
//!     ↓
//! services (能力层：ledger / fetcher / summarizer / writer)
//!     ↓
//! infrastructure (基础设施：DomHandle)
//! ```
//!
//! ## 设计原则
//!
//! 1. **进程间只交换文件**：载荷和结果都是序列化文件
//! 2. **任务只读**：展开后的任务被复制进载荷，不被修改
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod aggregator;
pub mod batch_processor;
pub mod distributor;
pub mod executor;
pub mod expander;
pub mod payload;
pub mod planner;
pub mod worker;

// 重新导出主要类型
pub use aggregator::{aggregate_outputs, build_report, load_outputs, summary_stats, write_report};
pub use batch_processor::{BatchOptions, BatchProcessor};
pub use distributor::{distribute, group_by_edition, Bucket};
pub use executor::{Execution, Executor, ExecutorStrategy, WorkerCommand};
pub use expander::{check_jobs, expand, resolve_date};
pub use payload::{WorkerBucket, WorkerPayload, WorkerSettings};
pub use planner::{list_options, plan, plan_from_pairs, plan_live};
pub use worker::{run_single, run_worker};
