use std::path::PathBuf;

use crate::common;
use crate::key::Key;

/// One key-range container: records whose key falls between the bounds, plus
/// the spill files accumulated for it. A singleton bucket holds exactly one
/// key value and never needs sorting.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub id: usize,
    pub lower: Option<Key>,
    pub upper: Option<Key>,
    pub lower_exclusive: bool,
    pub upper_exclusive: bool,
    /// Spill files routed to this bucket, in worker order.
    pub chunk_files: Vec<PathBuf>,
    /// Bytes accumulated across the chunk files.
    pub size_bytes: u64,
    pub sorted_file: Option<PathBuf>,
    /// Whether the chunk files are owned temp files (deletable) or the
    /// caller's input.
    pub owns_files: bool,
}

impl Bucket {
    /// The open bucket covering the whole key space.
    pub fn whole_file() -> Self {
        Bucket {
            id: 0,
            lower: None,
            upper: None,
            lower_exclusive: false,
            upper_exclusive: false,
            chunk_files: Vec::new(),
            size_bytes: 0,
            sorted_file: None,
            owns_files: true,
        }
    }

    pub fn is_singleton(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lo), Some(up)) => lo == up && !self.lower_exclusive && !self.upper_exclusive,
            _ => false,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        if let Some(lower) = &self.lower {
            if self.lower_exclusive {
                if key <= lower {
                    return false;
                }
            } else if key < lower {
                return false;
            }
        }
        if let Some(upper) = &self.upper {
            if self.upper_exclusive {
                if key >= upper {
                    return false;
                }
            } else if key > upper {
                return false;
            }
        }
        true
    }
}

/// An ordered partition of a bucket's key range: open intervals between
/// consecutive split keys, with a singleton bucket standing alone at every
/// split key. Lookup is a binary search on the split-key array.
#[derive(Debug, Clone, Default)]
pub struct BucketSet {
    buckets: Vec<Bucket>,
    splits: Vec<Key>,
}

impl BucketSet {
    /// Partition `main`'s key range at `splits` (sorted, strictly
    /// increasing, all inside the range): for splits k1 < .. < kn this
    /// builds `(lower, k1) [k1] (k1, k2) [k2] .. (kn, upper)`.
    pub fn build(main: &Bucket, splits: &[Key]) -> Self {
        debug_assert!(splits.windows(2).all(|w| w[0] < w[1]));
        let mut buckets = Vec::with_capacity(2 * splits.len() + 1);
        let mut lower = main.lower.clone();
        let mut lower_exclusive = main.lower_exclusive;
        for split in splits {
            buckets.push(Bucket {
                id: buckets.len(),
                lower: lower.take(),
                upper: Some(split.clone()),
                lower_exclusive,
                upper_exclusive: true,
                chunk_files: Vec::new(),
                size_bytes: 0,
                sorted_file: None,
                owns_files: true,
            });
            buckets.push(Bucket {
                id: buckets.len(),
                lower: Some(split.clone()),
                upper: Some(split.clone()),
                lower_exclusive: false,
                upper_exclusive: false,
                chunk_files: Vec::new(),
                size_bytes: 0,
                sorted_file: None,
                owns_files: true,
            });
            lower = Some(split.clone());
            lower_exclusive = true;
        }
        buckets.push(Bucket {
            id: buckets.len(),
            lower,
            upper: main.upper.clone(),
            lower_exclusive,
            upper_exclusive: main.upper_exclusive,
            chunk_files: Vec::new(),
            size_bytes: 0,
            sorted_file: None,
            owns_files: true,
        });
        BucketSet {
            buckets,
            splits: splits.to_vec(),
        }
    }

    pub fn single(bucket: Bucket) -> Self {
        BucketSet {
            buckets: vec![bucket],
            splits: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Bucket {
        &mut self.buckets[index]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bucket> {
        self.buckets.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Bucket> {
        self.buckets.iter_mut()
    }

    pub fn into_buckets(self) -> Vec<Bucket> {
        self.buckets
    }

    /// Index of the bucket whose range contains `key`: one binary search on
    /// the split-key array. With the alternating open/singleton layout,
    /// `2i` is the open bucket below split `i` and `2i + 1` its singleton.
    pub fn bucket_index_for(&self, key: &Key) -> usize {
        let below = self.splits.partition_point(|s| s < key);
        if below < self.splits.len() && self.splits[below] == *key {
            2 * below + 1
        } else {
            2 * below
        }
    }

    /// First bucket whose accumulated size exceeds `max_size`.
    pub fn overweight(&self, max_size: u64) -> Option<usize> {
        self.buckets.iter().position(|b| b.size_bytes > max_size)
    }

    /// A fresh copy of the range structure with no files attached (worker
    /// locals).
    pub fn clone_empty(&self) -> BucketSet {
        let mut copy = self.clone();
        for bucket in copy.buckets.iter_mut() {
            bucket.chunk_files.clear();
            bucket.size_bytes = 0;
            bucket.sorted_file = None;
        }
        copy
    }

    /// Remove every owned file attached to the buckets (terminal cleanup).
    pub fn delete_files(&mut self) {
        for bucket in self.buckets.iter_mut() {
            if bucket.owns_files {
                for file in bucket.chunk_files.drain(..) {
                    common::remove_file_quiet(&file);
                }
            } else {
                bucket.chunk_files.clear();
            }
            if let Some(sorted) = bucket.sorted_file.take() {
                common::remove_file_quiet(&sorted);
            }
            bucket.size_bytes = 0;
        }
    }

    /// Bounds coherence: adjacent buckets share their bound with opposite
    /// exclusivity, and singletons sit between two open intervals.
    pub fn check(&self) -> bool {
        if self.buckets.is_empty() {
            return false;
        }
        for pair in self.buckets.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            match (&a.upper, &b.lower) {
                (Some(up), Some(lo)) => {
                    if up != lo || a.upper_exclusive == b.lower_exclusive {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}
