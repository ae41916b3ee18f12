/// Multi-table co-indexing: cut every related table on the same root-key
/// boundaries so parallel readers can process matching records together.
mod core;

#[cfg(test)]
mod tests;

pub use core::{ChunkDescriptor, ChunkPlan, IndexationConfig, TableSpec, compute_indexation};
