//! 任务分桶 - 编排层
//!
//! 按版面 (date, section) 分组后切分为分桶，每个分桶交给一个 worker 顺序执行。
//! 任何分支下，返回的分桶都恰好覆盖全部任务下标一次。

use std::collections::HashMap;

use crate::models::job::Job;

/// 一个 worker 的任务下标列表
pub type Bucket = Vec<usize>;

/// 按版面分组，组和组内下标都保持首次出现的顺序
pub fn group_by_edition(jobs: &[Job]) -> Vec<Vec<usize>> {
    let mut slots: HashMap<(&str, &str), usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (idx, job) in jobs.iter().enumerate() {
        let slot = *slots.entry(job.edition()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(idx);
    }
    groups
}

/// 把 `items` 切成 `count` 段连续的子列表，长度相差不超过 1
fn split_even(items: &[usize], count: usize) -> Vec<Bucket> {
    let count = count.clamp(1, items.len().max(1));
    let base = items.len() / count;
    let extra = items.len() % count;
    let mut out = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let len = base + usize::from(i < extra);
        out.push(items[start..start + len].to_vec());
        start += len;
    }
    out
}

/// 分桶
///
/// - 单一版面：`min(workers, ceil(K / min_bucket))` 个分桶
/// - 版面数不超过 worker 数：每个版面一个分桶
/// - 版面数多于 worker 数：按 `ceil(N / bucket_count)` 切块后轮转分配
pub fn distribute(jobs: &[Job], wanted_workers: usize, min_bucket_size: usize) -> Vec<Bucket> {
    if jobs.is_empty() {
        return Vec::new();
    }
    let workers = wanted_workers.max(1);
    let min_size = min_bucket_size.max(1);
    let groups = group_by_edition(jobs);

    if groups.len() == 1 {
        let group = &groups[0];
        let count = workers.min(group.len().div_ceil(min_size)).max(1);
        return split_even(group, count);
    }

    if groups.len() <= workers {
        return groups;
    }

    let total = jobs.len();
    let bucket_count = workers.min(total.div_ceil(min_size)).max(1);
    let desired_size = total.div_ceil(bucket_count).max(1);

    let mut buckets: Vec<Bucket> = vec![Vec::new(); bucket_count];
    let mut slot = 0;
    for group in &groups {
        for chunk in group.chunks(desired_size) {
            buckets[slot].extend_from_slice(chunk);
            slot = (slot + 1) % bucket_count;
        }
    }
    buckets.retain(|b| !b.is_empty());
    buckets
}
