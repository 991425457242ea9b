pub mod accumulator;
pub mod cascade;
pub mod edition_flow;
pub mod job_ctx;

pub use accumulator::{lock_accumulator, Accumulator, SharedAccumulator};
pub use cascade::{CascadeOptions, CascadeSelector, CascadeState, OpenStrategy, SelectionResult};
pub use edition_flow::{edition_url, EditionFlow, FlowSettings};
pub use job_ctx::JobCtx;
