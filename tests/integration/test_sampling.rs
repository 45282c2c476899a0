//! Sample-cap early termination.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{SharedTransform, numbered_lines, quick_config, read_lines, write_lines};
use batchmap_lib::pipeline::{OrderedFileMapper, RunMetadata, SourceSet, UnorderedFileMapper};

const TOTAL: usize = 500_000;

/// Identity that counts its calls.
fn counting(calls: Arc<AtomicU64>) -> SharedTransform {
    Arc::new(move |line: &str| -> anyhow::Result<Vec<String>> {
        calls.fetch_add(1, Ordering::Relaxed);
        Ok(vec![line.to_string()])
    })
}

fn write_big_input(dir: &TempDir) -> std::path::PathBuf {
    let input = dir.path().join("big.txt");
    write_lines(&input, &numbered_lines("", TOTAL));
    input
}

#[rstest]
#[case(1, 1)]
#[case(4, 7)]
#[case(8, 500)]
fn test_ordered_sample_is_exact_prefix(#[case] threads: usize, #[case] batch_size: usize) {
    let dir = TempDir::new().unwrap();
    let input = write_big_input(&dir);
    let output = dir.path().join("out.txt");
    let calls = Arc::new(AtomicU64::new(0));

    let sources = SourceSet::new(&[&input]).unwrap();
    let config = quick_config(threads, batch_size).with_sample(Some(1_234));
    let meta: RunMetadata =
        OrderedFileMapper::new(sources, &output, counting(Arc::clone(&calls)), config)
            .run()
            .unwrap();

    assert_eq!(meta.lines_written, 1_234);
    assert_eq!(read_lines(&output), numbered_lines("", 1_234));
    assert!(calls.load(Ordering::Relaxed) < TOTAL as u64);
    assert!(meta.lines_read < TOTAL as u64);
}

#[rstest]
#[case(1, 1)]
#[case(4, 7)]
#[case(8, 500)]
fn test_unordered_sample_is_exact_count(#[case] threads: usize, #[case] batch_size: usize) {
    let dir = TempDir::new().unwrap();
    let input = write_big_input(&dir);
    let output = dir.path().join("out.txt");
    let calls = Arc::new(AtomicU64::new(0));

    let sources = SourceSet::new(&[&input]).unwrap();
    let config = quick_config(threads, batch_size)
        .with_sample(Some(1_234))
        .with_read_queue_capacity(1_000);
    let meta = UnorderedFileMapper::new(sources, &output, counting(Arc::clone(&calls)), config)
        .run()
        .unwrap();

    assert_eq!(meta.lines_written, 1_234);
    let lines = read_lines(&output);
    assert_eq!(lines.len(), 1_234);
    let unique: std::collections::HashSet<_> = lines.iter().collect();
    assert_eq!(unique.len(), 1_234);
    assert!(calls.load(Ordering::Relaxed) < TOTAL as u64);
}

#[test]
fn test_sample_larger_than_output_writes_everything() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("small.txt");
    write_lines(&input, &numbered_lines("", 10));
    let output = dir.path().join("out.txt");

    let sources = SourceSet::new(&[&input]).unwrap();
    let config = quick_config(2, 3).with_sample(Some(1_000));
    let meta = OrderedFileMapper::new(sources, &output, counting(Arc::default()), config)
        .run()
        .unwrap();
    assert_eq!(meta.lines_written, 10);
    assert_eq!(read_lines(&output), numbered_lines("", 10));
}
