//! Failure handling: fail-fast on errors, zero-row detection, and bad inputs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{
    failing_on, identity, numbered_lines, quick_config, read_lines, run_with_timeout, write_lines,
};
use batchmap_lib::errors::PipelineError;
use batchmap_lib::pipeline::{OrderedFileMapper, SourceSet, UnorderedFileMapper};

const TOTAL: usize = 1_000_000;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Ordered,
    Unordered,
}

fn run_mapper(
    mode: Mode,
    sources: SourceSet,
    output: &std::path::Path,
    transform: crate::helpers::SharedTransform,
    config: batchmap_lib::pipeline::PipelineConfig,
) -> batchmap_lib::errors::Result<batchmap_lib::pipeline::RunMetadata> {
    match mode {
        Mode::Ordered => OrderedFileMapper::new(sources, output, transform, config).run(),
        Mode::Unordered => UnorderedFileMapper::new(sources, output, transform, config).run(),
    }
}

/// A batch size far larger than the input never reserves the whole batch.
#[rstest]
#[case(Mode::Ordered)]
#[case(Mode::Unordered)]
fn test_huge_batch_size_completes(#[case] mode: Mode) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    write_lines(&input, &["first", "second"]);
    let output = dir.path().join("out.txt");

    let sources = SourceSet::new(&[&input]).unwrap();
    let config = quick_config(2, usize::MAX / 8);
    let out = output.clone();
    let meta = run_with_timeout(Duration::from_secs(30), move || {
        run_mapper(mode, sources, &out, identity(), config)
    })
    .expect("run with a huge batch size should not hang")
    .unwrap();

    assert_eq!(meta.lines_written, 2);
    let mut lines = read_lines(&output);
    lines.sort();
    assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
}

/// A failure early in a large input stops the run long before the input is
/// exhausted, and the transform's own error reaches the caller.
#[rstest]
#[case(Mode::Ordered)]
#[case(Mode::Unordered)]
fn test_transform_failure_fails_fast(#[case] mode: Mode) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("big.txt");
    write_lines(&input, &numbered_lines("", TOTAL));
    let output = dir.path().join("out.txt");

    let calls = Arc::new(AtomicU64::new(0));
    let transform = failing_on("1000", Arc::clone(&calls));
    let sources = SourceSet::new(&[&input]).unwrap();
    let config = quick_config(4, 10).with_read_queue_capacity(1_000);

    let result = run_with_timeout(Duration::from_secs(30), move || {
        run_mapper(mode, sources, &output, transform, config)
    })
    .expect("failed run should not hang");

    let err = result.unwrap_err();
    assert!(matches!(err, PipelineError::Transform { .. }), "unexpected error: {err:?}");
    assert!(err.to_string().contains("refusing to map '1000'"));
    assert!(
        calls.load(Ordering::Relaxed) < (TOTAL as u64) / 2,
        "transform kept running after the failure: {} calls",
        calls.load(Ordering::Relaxed)
    );
}

#[rstest]
#[case(Mode::Ordered)]
#[case(Mode::Unordered)]
fn test_panicking_transform_surfaces_as_error(#[case] mode: Mode) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    write_lines(&input, &numbered_lines("", 1_000));
    let output = dir.path().join("out.txt");

    let transform: crate::helpers::SharedTransform =
        Arc::new(|line: &str| -> anyhow::Result<Vec<String>> {
            assert_ne!(line, "500", "transform panicked on purpose");
            Ok(vec![line.to_string()])
        });
    let sources = SourceSet::new(&[&input]).unwrap();
    let result = run_with_timeout(Duration::from_secs(30), move || {
        run_mapper(mode, sources, &output, transform, quick_config(2, 5))
    })
    .expect("panicking run should not hang");
    assert!(matches!(result, Err(PipelineError::Panic { .. })), "unexpected result: {result:?}");
}

#[rstest]
#[case(Mode::Ordered)]
#[case(Mode::Unordered)]
fn test_no_output_is_a_failure(#[case] mode: Mode) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    write_lines(&input, &["", "  ", "\t"]);
    let output = dir.path().join("out.txt");

    let non_empty: crate::helpers::SharedTransform =
        Arc::new(|line: &str| -> anyhow::Result<Vec<String>> {
            Ok(if line.trim().is_empty() { Vec::new() } else { vec![line.to_string()] })
        });
    let sources = SourceSet::new(&[&input]).unwrap();
    let err = run_mapper(mode, sources, &output, non_empty, quick_config(2, 2)).unwrap_err();
    assert!(matches!(err, PipelineError::NoRowsWritten));
    assert_eq!(err.to_string(), "No rows have been written.");
}

#[rstest]
#[case(Mode::Ordered)]
#[case(Mode::Unordered)]
fn test_empty_input_is_a_failure(#[case] mode: Mode) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("empty.txt");
    write_lines::<&str>(&input, &[]);
    let output = dir.path().join("out.txt");

    let sources = SourceSet::new(&[&input]).unwrap();
    let err = run_mapper(mode, sources, &output, identity(), quick_config(2, 2)).unwrap_err();
    assert!(matches!(err, PipelineError::NoRowsWritten));
}

#[rstest]
#[case(Mode::Ordered)]
#[case(Mode::Unordered)]
fn test_corrupt_gzip_input_is_a_read_error(#[case] mode: Mode) {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("a.txt");
    write_lines(&good, &numbered_lines("", 100));
    let corrupt = dir.path().join("b.txt.gz");
    std::fs::write(&corrupt, b"\x1f\x8b\x08\x00this is not deflate data").unwrap();
    let output = dir.path().join("out.txt");

    let sources = SourceSet::new(&[&good, &corrupt]).unwrap();
    let result = run_with_timeout(Duration::from_secs(30), move || {
        run_mapper(mode, sources, &output, identity(), quick_config(2, 10))
    })
    .expect("failed run should not hang");
    match result {
        Err(PipelineError::Read { path, .. }) => assert_eq!(path, corrupt),
        other => panic!("expected a read error, got {other:?}"),
    }
}

#[test]
fn test_missing_input_is_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.txt");
    let err = SourceSet::new(&[&missing]).unwrap_err();
    assert!(matches!(err, PipelineError::MissingInput { ref path } if *path == missing));
}

#[test]
fn test_zero_batch_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    write_lines(&input, &["a"]);
    let output = dir.path().join("out.txt");

    let sources = SourceSet::new(&[&input]).unwrap();
    let config = quick_config(2, 0);
    let err = OrderedFileMapper::new(sources, &output, identity(), config).run().unwrap_err();
    assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    assert!(!output.exists(), "output should not be created for an invalid config");
}

#[test]
fn test_successful_run_after_failed_run_in_same_process() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    write_lines(&input, &numbered_lines("", 1_000));
    let failed = dir.path().join("failed.txt");
    let output = dir.path().join("out.txt");

    let transform = failing_on("3", Arc::new(AtomicU64::new(0)));
    let sources = SourceSet::new(&[&input]).unwrap();
    UnorderedFileMapper::new(sources.clone(), &failed, transform, quick_config(2, 10))
        .run()
        .unwrap_err();

    UnorderedFileMapper::new(sources, &output, identity(), quick_config(2, 10)).run().unwrap();
    assert_eq!(read_lines(&output).len(), 1_000);
}
