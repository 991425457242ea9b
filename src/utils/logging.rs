/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AppError, AppResult};

/// 初始化 tracing
///
/// 终端输出到 stderr；若给出 `log_file`，同时以追加方式写入该文件。
/// 重复初始化时静默忽略（worker 子进程与测试都会调用）。
pub fn init_tracing(log_file: Option<&str>) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| AppError::file(path, e))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}

/// 初始化日志文件（写入带时间戳的头部）
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n批量采集日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|e| AppError::file(log_file_path, e))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(strategy: &str, max_workers: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量采集模式");
    info!("⚙️ 执行策略: {}", strategy);
    info!("📊 最大并发数: {}", max_workers);
    info!("{}", "=".repeat(60));
}

/// 记录任务展开结果
pub fn log_jobs_loaded(total: usize, buckets: usize) {
    info!("✓ 展开得到 {} 个任务", total);
    info!("📋 分为 {} 个分桶并发执行", buckets);
}

/// 记录分桶开始
pub fn log_bucket_start(bucket_num: usize, job_count: usize) {
    info!("{}", "─".repeat(60));
    info!("📦 分桶 {} 开始: {} 个任务", bucket_num, job_count);
}

/// 记录分桶完成
pub fn log_bucket_complete(bucket_num: usize, ok: usize, total: usize) {
    info!("✓ 分桶 {} 完成: 成功 {}/{}", bucket_num, ok, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(ok: usize, fail: usize, total: usize, items: usize, report_path: &str) {
    info!("{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", ok, total);
    info!("❌ 失败: {}", fail);
    info!("📰 条目总数: {}", items);
    info!("{}", "=".repeat(60));
    info!("报告已保存至: {}", report_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
