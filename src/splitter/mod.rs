/// Split-key selection from a sorted key sample.
mod core;


pub use core::{SKEW, choose_split_keys, required_sample_size};
