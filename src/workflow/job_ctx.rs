//! 任务处理上下文
//!
//! 封装"我正在处理第几个分桶里的哪个任务"这一信息

use std::fmt::Display;

use crate::models::job::Job;

/// 任务处理上下文
#[derive(Debug, Clone)]
pub struct JobCtx {
    /// 分桶序号（从1开始，仅用于日志显示）
    pub bucket_index: usize,

    /// 任务在展开结果中的位置
    pub ordinal: usize,

    /// 文件名中使用的序号
    pub display_index: usize,

    /// 主题
    pub topic: String,

    /// 重复序号
    pub repeat_index: u32,
}

impl JobCtx {
    /// 由任务创建上下文
    pub fn new(bucket_index: usize, job: &Job) -> Self {
        Self {
            bucket_index,
            ordinal: job.ordinal,
            display_index: job.display_index(),
            topic: job.topic.clone(),
            repeat_index: job.repeat_index,
        }
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[分桶 {} 任务#{} {} r{}]",
            self.bucket_index, self.display_index, self.topic, self.repeat_index
        )
    }
}
