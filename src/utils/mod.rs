pub mod logging;
pub mod text;

pub use logging::{init_log_file, init_tracing, truncate_text};
pub use text::{normalize_text, slugify};
