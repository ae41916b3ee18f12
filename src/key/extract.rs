use crate::scan::{FieldScanner, MAX_LINE_BYTES};

use super::Key;

/// Outcome of parsing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Ok,
    /// Record exceeds the buffer inflation bound; skip it.
    LineTooLong,
    /// Fewer fields than the largest key column; missing components are
    /// empty byte strings.
    ShortLine,
}

#[derive(Debug)]
pub struct ExtractedKey {
    pub key: Key,
    pub status: RecordStatus,
    /// Unmatched double quote seen while scanning (encoding error counter).
    pub open_quote: bool,
}

/// Pulls the composite key out of a record. Field walking follows the file
/// order of the key columns even when the key order differs, so each record
/// is scanned once, left to right.
#[derive(Debug, Clone)]
pub struct KeyExtractor {
    /// Column index per key slot, in key order.
    key_fields: Vec<usize>,
    /// (column, key slot) sorted by column: the scan order.
    scan_order: Vec<(usize, usize)>,
    sep: u8,
}

impl KeyExtractor {
    pub fn new(key_fields: &[usize], sep: u8) -> Self {
        let mut scan_order: Vec<(usize, usize)> = key_fields
            .iter()
            .enumerate()
            .map(|(slot, &col)| (col, slot))
            .collect();
        scan_order.sort_unstable();
        KeyExtractor {
            key_fields: key_fields.to_vec(),
            scan_order,
            sep,
        }
    }

    pub fn separator(&self) -> u8 {
        self.sep
    }

    pub fn key_fields(&self) -> &[usize] {
        &self.key_fields
    }

    pub fn key_width(&self) -> usize {
        self.key_fields.len()
    }

    /// Extractor for the first `width` key components (root-key projection).
    pub fn project(&self, width: usize) -> KeyExtractor {
        KeyExtractor::new(&self.key_fields[..width.min(self.key_fields.len())], self.sep)
    }

    /// Parse one record (without its newline; `\r` already handled by the
    /// caller via [`crate::scan::Record::content`]).
    pub fn extract(&self, record: &[u8]) -> ExtractedKey {
        if record.len() > MAX_LINE_BYTES {
            return ExtractedKey {
                key: Key::new(),
                status: RecordStatus::LineTooLong,
                open_quote: false,
            };
        }

        let mut slots: Vec<Vec<u8>> = vec![Vec::new(); self.key_fields.len()];
        let mut scanner = FieldScanner::new(record, self.sep);
        let mut column = 0usize;
        let mut next = 0usize; // cursor into scan_order
        let mut missing = false;

        while next < self.scan_order.len() {
            let (wanted_col, _) = self.scan_order[next];
            // skip the columns between two key columns without materializing
            while column < wanted_col {
                if !scanner.skip_field() {
                    missing = true;
                    break;
                }
                column += 1;
            }
            if missing {
                break;
            }
            match scanner.next_field() {
                Some(value) => {
                    // the same column can feed several key slots
                    while next < self.scan_order.len() && self.scan_order[next].0 == column {
                        let slot = self.scan_order[next].1;
                        slots[slot] = value.to_vec();
                        next += 1;
                    }
                    column += 1;
                }
                None => {
                    missing = true;
                    break;
                }
            }
        }
        ExtractedKey {
            key: Key::from_fields(slots),
            status: if missing {
                RecordStatus::ShortLine
            } else {
                RecordStatus::Ok
            },
            open_quote: scanner.open_quote,
        }
    }
}
