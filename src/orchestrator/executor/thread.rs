//! 线程策略：每个分桶一个 OS 线程
//!
//! 每个线程有自己的单线程运行时和浏览器；线程之间只共享累加器（一把锁）。
//! 账本在每次执行开始时加载一次。

use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{error, info};

use crate::error::AppResult;
use crate::infrastructure::BrowserLauncher;
use crate::orchestrator::executor::{Execution, Executor};
use crate::orchestrator::payload::{WorkerBucket, WorkerSettings};
use crate::orchestrator::worker::{current_thread_runtime, new_accumulator, run_bucket};
use crate::workflow::{lock_accumulator, Accumulator, EditionFlow};

pub struct ThreadExecutor {
    launcher: Arc<dyn BrowserLauncher>,
}

impl ThreadExecutor {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { launcher }
    }
}

fn run_in_thread(
    bucket: &WorkerBucket,
    settings: &WorkerSettings,
    launcher: &dyn BrowserLauncher,
    flow: &EditionFlow,
    acc: &Mutex<Accumulator>,
) {
    match current_thread_runtime() {
        Ok(runtime) => runtime.block_on(run_bucket(launcher, bucket, settings, flow, acc)),
        Err(e) => {
            error!("[分桶 {}] ❌ 无法创建运行时: {}", bucket.index, e);
            lock_accumulator(acc).fill_missing(&bucket.jobs, &format!("无法创建运行时: {}", e));
        }
    }
}

impl Executor for ThreadExecutor {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn execute(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<Execution> {
        info!("🧵 线程策略: 启动 {} 个线程", buckets.len());
        let acc = new_accumulator(settings)?.shared();
        let flow = Arc::new(EditionFlow::new(settings.flow.clone())?);

        let handles: Vec<_> = buckets
            .iter()
            .map(|bucket| {
                let bucket = bucket.clone();
                let settings = settings.clone();
                let launcher = Arc::clone(&self.launcher);
                let flow = Arc::clone(&flow);
                let acc = Arc::clone(&acc);
                let spawned = thread::Builder::new()
                    .name(format!("bucket-{}", bucket.index))
                    .spawn({
                        let bucket = bucket.clone();
                        move || run_in_thread(&bucket, &settings, launcher.as_ref(), &flow, &acc)
                    });
                (bucket, spawned)
            })
            .collect();

        for (bucket, spawned) in handles {
            let outcome = match spawned {
                Ok(handle) => handle.join().map_err(|_| "线程 panic".to_string()),
                Err(e) => Err(format!("无法创建线程: {}", e)),
            };
            if let Err(reason) = outcome {
                error!("[分桶 {}] ❌ {}", bucket.index, reason);
                lock_accumulator(&acc).fill_missing(&bucket.jobs, &reason);
            }
        }

        let report = lock_accumulator(&acc).take_report();
        Ok(Execution::new(self.name(), report))
    }
}
