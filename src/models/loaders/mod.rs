pub mod spec_loader;

pub use spec_loader::{load_batch_spec, save_batch_spec};
