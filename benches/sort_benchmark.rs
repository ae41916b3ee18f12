use criterion::{Criterion, black_box, criterion_group, criterion_main};

use xsort_rs::key::{Key, KeyExtractor};
use xsort_rs::splitter::choose_split_keys;

fn bench_key_extract(c: &mut Criterion) {
    let extractor = KeyExtractor::new(&[0, 2], b'\t');
    let line = b"customer_001234\t2024-06-01\torder_99\tsome payload field\t42";
    c.bench_function("extract_two_column_key", |b| {
        b.iter(|| {
            let parsed = extractor.extract(black_box(line));
            black_box(parsed.key);
        })
    });
}

fn bench_key_compare(c: &mut Criterion) {
    let a = Key::from_fields(vec![b"customer_001234".to_vec(), b"order_99".to_vec()]);
    let b_key = Key::from_fields(vec![b"customer_001234".to_vec(), b"order_98".to_vec()]);
    c.bench_function("compare_composite_keys", |b| {
        b.iter(|| black_box(black_box(&a).cmp(black_box(&b_key))))
    });
}

fn bench_choose_splits(c: &mut Criterion) {
    let sample: Vec<Key> = (0..100_000u64)
        .map(|i| Key::from_fields(vec![format!("k{:09}", i).into_bytes()]))
        .collect();
    c.bench_function("choose_splits_100k_sample", |b| {
        b.iter(|| black_box(choose_split_keys(black_box(&sample), 16, 64, 8)))
    });
}

criterion_group!(
    benches,
    bench_key_extract,
    bench_key_compare,
    bench_choose_splits
);
criterion_main!(benches);
