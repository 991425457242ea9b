//! 进程内累加器
//!
//! 去重账本和部分报告放在同一把锁后面：一个任务完成时两者在同一处被修改。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AppResult;
use crate::models::job::Job;
use crate::models::output::Item;
use crate::models::report::{JobMetric, PartialReport};
use crate::services::DedupLedger;

/// 账本 + 报告
#[derive(Debug, Default)]
pub struct Accumulator {
    ledger: DedupLedger,
    report: PartialReport,
}

/// 在线程间共享的累加器
pub type SharedAccumulator = Arc<Mutex<Accumulator>>;

impl Accumulator {
    pub fn new(ledger: DedupLedger) -> Self {
        Self {
            ledger,
            report: PartialReport::default(),
        }
    }

    pub fn shared(self) -> SharedAccumulator {
        Arc::new(Mutex::new(self))
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn report(&self) -> &PartialReport {
        &self.report
    }

    /// 去掉账本中已有的条目（不写入账本）
    pub fn unseen(&self, items: Vec<Item>) -> Vec<Item> {
        let mut local = HashSet::new();
        items
            .into_iter()
            .filter(|item| !self.ledger.has(&item.hash) && local.insert(item.hash.clone()))
            .collect()
    }

    /// 去重并把新哈希写入账本，返回新条目
    pub fn admit(&mut self, items: Vec<Item>) -> AppResult<Vec<Item>> {
        let fresh = self.unseen(items);
        self.ledger.add_batch(fresh.iter().map(|i| i.hash.as_str()))?;
        Ok(fresh)
    }

    /// 记录一个任务的结果
    pub fn record(&mut self, metric: JobMetric) {
        self.report.record(metric);
    }

    /// 为没有结果的任务补记失败
    pub fn fill_missing(&mut self, jobs: &[Job], reason: &str) -> usize {
        self.report.fill_missing(jobs, reason)
    }

    /// 取出当前累积的报告
    pub fn take_report(&mut self) -> PartialReport {
        std::mem::take(&mut self.report)
    }
}

/// 获取锁；持锁线程 panic 后仍继续使用其中的数据
pub fn lock_accumulator(acc: &Mutex<Accumulator>) -> MutexGuard<'_, Accumulator> {
    acc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(hash: &str) -> Item {
        Item {
            titulo: hash.to_uppercase(),
            link: None,
            data_publicacao: None,
            resumo: None,
            hash: hash.to_string(),
        }
    }

    #[test]
    fn test_admit_drops_seen_and_in_batch_duplicates() {
        let mut acc = Accumulator::new(DedupLedger::in_memory());
        let first = acc.admit(vec![item("h1"), item("h2"), item("h1")]).unwrap();
        assert_eq!(first.len(), 2);

        let second = acc.admit(vec![item("h2"), item("h3")]).unwrap();
        assert_eq!(second.iter().map(|i| i.hash.as_str()).collect::<Vec<_>>(), vec!["h3"]);
        assert_eq!(acc.ledger().len(), 3);
    }

    #[test]
    fn test_take_report_resets() {
        let mut acc = Accumulator::default();
        acc.record(JobMetric::for_job(&Default::default()));
        assert_eq!(acc.take_report().fail, 1);
        assert_eq!(acc.report().total(), 0);
    }
}
