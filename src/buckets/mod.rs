/// Key-range buckets and the parallel record distributor.
mod core;
mod distribute;


pub use core::{Bucket, BucketSet};
pub use distribute::{DistributeOutcome, DistributeSpec, distribute};
