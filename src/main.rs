use anyhow::{Context, Result};
use clap::Parser;

use dou_batch::cli::{self, Cli, Commands};
use dou_batch::config::Config;
use dou_batch::orchestrator::run_worker;
use dou_batch::utils::{init_log_file, init_tracing};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // worker 子进程自己管理运行时
    if let Commands::Worker(args) = &cli.command {
        return run_worker(&args.payload, &args.result, args.fast)
            .with_context(|| format!("worker 执行失败: {}", args.payload.display()));
    }

    // 加载配置
    let config = Config::from_env().context("读取环境配置失败")?;

    // 初始化日志
    if let Some(log_file) = &config.log_file {
        init_log_file(log_file)?;
    }
    init_tracing(config.log_file.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("无法创建异步运行时")?;
    runtime.block_on(cli::execute(cli.command, config))?;

    Ok(())
}
