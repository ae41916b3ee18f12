/// Record and field scanning over raw bytes, shared by the key extractor and
/// the bucket distributor so both agree on line and quote handling.
mod core;


pub use core::{
    FieldScanner, MAX_LINE_BYTES, Record, RecordCursor, ScanStats, align_to_record, count_records,
    next_record_start, translate_separators,
};
