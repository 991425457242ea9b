pub mod bulletin;
pub mod fetcher;
pub mod ledger;
pub mod output_writer;
pub mod summarizer;

pub use bulletin::{generate_bulletin, BulletinKind};
pub use fetcher::{ContentFetcher, FetchedContent, HttpFetcher};
pub use ledger::{content_hash, DedupLedger, LedgerMark};
pub use output_writer::{render_output_name, write_json_atomic, OutputWriter};
pub use summarizer::{html_to_text, ExtractiveSummarizer, Summarizer};
