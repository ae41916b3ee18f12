use crate::key::Key;
use crate::runtime::random::ith_random_int;

/// Largest tolerated ratio of biggest bucket size to the mean.
pub const SKEW: f64 = 1.1;

/// Sample size needed so that `min_splits + 1` buckets respect [`SKEW`] with
/// high probability (DeWitt 1991, "Parallel sorting on a shared-nothing
/// architecture using probabilistic splitting"), plus a flat safety margin.
pub fn required_sample_size(min_splits: usize) -> u64 {
    let buckets = (min_splits + 1) as f64;
    let bound = buckets * 2.0 * (buckets / 1e-6).ln() / ((1.0 - 1.0 / SKEW).powi(2) * SKEW);
    bound.ceil() as u64 + 1000
}

/// Choose at most `max_splits` split keys from a globally sorted sample so
/// the induced buckets have near-equal population.
///
/// When the sample is large enough, cut spacing follows a staircase: the
/// first `worker_count` cuts grow arithmetically so first-pass work reaches
/// the workers at staggered times, the middle cruises between the min and max
/// chunk spacing, and the landing zone shrinks the spacing so workers finish
/// together. Cut positions are strictly increasing; equal-valued split keys
/// are dropped, which may reduce the final bucket count.
pub fn choose_split_keys(
    sample: &[Key],
    min_splits: usize,
    max_splits: usize,
    worker_count: usize,
) -> Vec<Key> {
    debug_assert!(min_splits <= max_splits);
    let mut splits: Vec<Key> = Vec::new();
    if sample.is_empty() || min_splits == 0 {
        return splits;
    }

    let len = sample.len();
    let chunk_min = len / max_splits.max(1);
    let chunk_max = len / min_splits;

    let push_distinct = |key: &Key, splits: &mut Vec<Key>| {
        if splits.last() != Some(key) {
            splits.push(key.clone());
        }
    };

    // sample too small for the probabilistic schedule: equal-width cuts
    if len <= chunk_min || chunk_min == 0 {
        let mut last_index: Option<usize> = None;
        for i in 0..min_splits {
            let index = (i + 1) * len / (min_splits + 1);
            if index < len && last_index != Some(index) {
                push_distinct(&sample[index], &mut splits);
                last_index = Some(index);
            }
        }
        return splits;
    }

    let step = (chunk_max - chunk_min) / worker_count.max(1);
    let landing = 2 * worker_count.max(1) * chunk_min;
    let mut index = 0usize;
    let mut spread = 0usize;
    let mut draw = 0u64;

    while index < len - chunk_min {
        if index < chunk_max && step > 0 {
            // opening staircase: each cut one step wider than the previous
            if index > 0 {
                spread += step;
            }
        } else if index > len.saturating_sub(landing) {
            // landing: small, nearly equal chunks
            spread = chunk_min / 2;
        } else {
            // cruise
            spread = chunk_max - chunk_min;
        }
        spread = spread.min(chunk_max - chunk_min);

        let mut advance = chunk_min + ith_random_int(draw, spread as u64) as usize;
        draw += 1;
        if advance > len - index {
            advance = (len - index) / 2;
        }
        if advance == 0 {
            break;
        }
        index += advance;
        if index >= len {
            break;
        }
        push_distinct(&sample[index], &mut splits);
        if splits.len() >= max_splits {
            break;
        }
    }
    splits
}
