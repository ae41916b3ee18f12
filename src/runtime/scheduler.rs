use rayon::prelude::*;

use crate::error::SortResult;

/// One worker assignment: the half-open byte range `[begin, end)` of the
/// input. A record belongs to the task whose range contains its first byte,
/// so workers align forward to a record start before scanning (except at
/// offset 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRange {
    pub index: usize,
    pub begin: u64,
    pub end: u64,
}

/// Split `[0, file_size)` into buffer-aligned ranges in file order.
pub fn plan_ranges(file_size: u64, buffer_size: u64) -> Vec<TaskRange> {
    assert!(buffer_size > 0);
    let mut ranges = Vec::new();
    let mut begin = 0u64;
    while begin < file_size {
        let end = (begin + buffer_size).min(file_size);
        ranges.push(TaskRange {
            index: ranges.len(),
            begin,
            end,
        });
        begin = end;
    }
    ranges
}

/// Split `[0, file_size)` into `blocks` contiguous ranges of near-equal size
/// (used when each worker must carry state across its whole assignment).
pub fn plan_blocks(file_size: u64, blocks: usize) -> Vec<TaskRange> {
    assert!(blocks > 0);
    let blocks = blocks.min(file_size.max(1) as usize);
    let mut ranges = Vec::with_capacity(blocks);
    for i in 0..blocks {
        let begin = file_size * i as u64 / blocks as u64;
        let end = file_size * (i as u64 + 1) / blocks as u64;
        if end > begin {
            ranges.push(TaskRange {
                index: ranges.len(),
                begin,
                end,
            });
        }
    }
    ranges
}

/// Run every task on the worker pool and return outputs in submission order.
/// The first failing task aborts the whole run, mirroring the master loop's
/// task-failure handling.
pub fn run_ordered<T, O, F>(tasks: &[T], worker: F) -> SortResult<Vec<O>>
where
    T: Sync,
    O: Send,
    F: Fn(&T) -> SortResult<O> + Sync,
{
    tasks.par_iter().map(&worker).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_ranges_covers_file() {
        let ranges = plan_ranges(100, 32);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].begin, 0);
        assert_eq!(ranges[3].end, 100);
        for w in ranges.windows(2) {
            assert_eq!(w[0].end, w[1].begin);
        }
    }

    #[test]
    fn test_plan_ranges_exact_multiple() {
        let ranges = plan_ranges(64, 32);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1], TaskRange { index: 1, begin: 32, end: 64 });
    }

    #[test]
    fn test_plan_blocks_small_file() {
        let ranges = plan_blocks(3, 8);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges.last().unwrap().end, 3);
    }

    #[test]
    fn test_run_ordered_preserves_order() {
        let tasks: Vec<u64> = (0..64).collect();
        let out = run_ordered(&tasks, |&t| Ok(t * 2)).unwrap();
        assert_eq!(out, (0..64).map(|t| t * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_ordered_short_circuits() {
        let tasks: Vec<u64> = (0..8).collect();
        let res = run_ordered(&tasks, |&t| {
            if t == 5 {
                Err(crate::error::SortError::Interrupted)
            } else {
                Ok(t)
            }
        });
        assert!(res.is_err());
    }
}
