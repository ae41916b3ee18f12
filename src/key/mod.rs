/// Composite keys and their extraction from delimited records.
mod core;
mod extract;


pub use core::Key;
pub use extract::{ExtractedKey, KeyExtractor, RecordStatus};
