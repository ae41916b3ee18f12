/// Mean key size and line count estimation by sampling disjoint buffers.
mod core;

#[cfg(test)]
mod tests;

pub use core::{KeySizeEstimate, evaluate_key_size};
