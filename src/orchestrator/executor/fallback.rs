//! 回退装饰器
//!
//! 主策略失败（配置错误除外）时，把全部分桶交给备用策略重新执行。
//! 主策略的任何部分结果都被丢弃，备用策略的结果完整替代它；
//! 主策略期间追加到账本的哈希也会在重跑前撤销。

use tracing::{info, warn};

use crate::error::{AppResult, ErrorKind};
use crate::services::LedgerMark;
use crate::orchestrator::executor::{Execution, Executor};
use crate::orchestrator::payload::{WorkerBucket, WorkerSettings};

pub struct WithFallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P: Executor, F: Executor> WithFallback<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: Executor, F: Executor> Executor for WithFallback<P, F> {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    fn execute(&self, buckets: &[WorkerBucket], settings: &WorkerSettings) -> AppResult<Execution> {
        let mark = LedgerMark::take(settings.state_file.as_deref())?;
        match self.primary.execute(buckets, settings) {
            Ok(execution) => Ok(execution),
            Err(e) if e.kind() == ErrorKind::Config => Err(e),
            Err(e) => {
                warn!(
                    "⚠️ [{}] {} 策略失败: {}，全部 {} 个分桶改用 {} 策略重新执行",
                    e.kind(),
                    self.primary.name(),
                    e,
                    buckets.len(),
                    self.fallback.name()
                );
                let dropped = mark.restore()?;
                if dropped > 0 {
                    info!("↩️ 已撤销 {} 策略写入账本的 {} 字节", self.primary.name(), dropped);
                }
                let mut execution = self.fallback.execute(buckets, settings)?;
                execution.fallback_used = true;
                Ok(execution)
            }
        }
    }
}
