/// Key-position lookup in a sorted file: for each sorted target key, the
/// position just past the last record with key less than or equal to it.
mod core;


pub use core::find_key_positions;
pub(crate) use core::find_key_positions_buffered;
