pub mod job;
pub mod loaders;
pub mod output;
pub mod portal;
pub mod report;
pub mod spec;
pub mod summary;

pub use job::{Job, KeyType, LevelKey};
pub use loaders::{load_batch_spec, save_batch_spec};
pub use output::{Item, JobOutput, Selection};
pub use portal::PortalProfile;
pub use report::{AggregatedFile, BatchReport, JobMetric, Metrics, PartialReport, SummaryStats, Timings};
pub use spec::{BatchSpec, OutputSpec, Topic};
pub use summary::{SummaryConfig, SummaryMode};
