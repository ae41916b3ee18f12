/// Distinct-key extraction: write every distinct composite key of a sorted
/// file to an output key file.
mod core;

#[cfg(test)]
mod tests;

pub use core::extract_keys_to_file;
