//! End-to-end tests for the unordered mapper.

use std::collections::HashSet;

use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{
    apply_serially, expand_or_drop, identity, jittered_identity, numbered_lines, quick_config,
    read_lines, read_sorted_lines, write_lines,
};
use batchmap_lib::pipeline::{SourceSet, UnorderedFileMapper};

#[test]
fn test_two_files_give_a_permutation() {
    let dir = TempDir::new().unwrap();
    write_lines(&dir.path().join("first.txt"), &["x", "y"]);
    write_lines(&dir.path().join("second.txt"), &["z"]);
    let output = dir.path().join("out.txt");

    let upper = std::sync::Arc::new(|line: &str| -> anyhow::Result<Vec<String>> {
        Ok(vec![line.to_uppercase()])
    });
    let sources = SourceSet::new(&[dir.path()]).unwrap();
    let meta = UnorderedFileMapper::new(sources, &output, upper, quick_config(4, 1)).run().unwrap();

    let lines = read_lines(&output);
    assert_eq!(lines.len(), 3);
    let unique: HashSet<_> = lines.iter().map(String::as_str).collect();
    assert_eq!(unique, HashSet::from(["X", "Y", "Z"]));
    assert_eq!(meta.files_read, 2);
    assert_eq!(meta.lines_written, 3);
}

/// Every configuration writes the same multiset of lines as a serial map.
#[rstest]
fn test_output_is_complete_for_any_configuration(
    #[values(1, 3, 8)] threads: usize,
    #[values(1, 4)] readers: usize,
    #[values(1, 50)] batch_size: usize,
) {
    let dir = TempDir::new().unwrap();
    let files: Vec<Vec<String>> = (0..6).map(|f| numbered_lines(&format!("{f}:"), 120)).collect();
    for (f, lines) in files.iter().enumerate() {
        write_lines(&dir.path().join(format!("{f}.txt")), lines);
    }
    let output = dir.path().join("out.txt");

    let transform = expand_or_drop();
    let mut expected = apply_serially(&*transform, &files.concat());
    expected.sort();

    let config = quick_config(threads, batch_size)
        .with_reader_threads(readers)
        .with_read_queue_capacity(16)
        .with_write_queue_capacity(2);
    let sources = SourceSet::new(&[dir.path()]).unwrap();
    let meta = UnorderedFileMapper::new(sources, &output, transform, config).run().unwrap();

    assert_eq!(read_sorted_lines(&output), expected);
    assert_eq!(meta.lines_read, 720);
    assert_eq!(meta.records_processed, 720);
    assert_eq!(meta.files_read, 6);
}

#[test]
fn test_lines_of_one_file_keep_relative_order_with_one_worker() {
    let dir = TempDir::new().unwrap();
    let lines = numbered_lines("only-", 500);
    write_lines(&dir.path().join("only.txt"), &lines);
    let output = dir.path().join("out.txt");

    let sources = SourceSet::new(&[dir.path()]).unwrap();
    UnorderedFileMapper::new(sources, &output, identity(), quick_config(1, 7)).run().unwrap();
    assert_eq!(read_lines(&output), lines);
}

#[test]
fn test_gzip_inputs_and_parallel_gzip_output() {
    let dir = TempDir::new().unwrap();
    let mut all = Vec::new();
    for f in 0..4 {
        let lines = numbered_lines(&format!("compressed file {f}, line "), 5_000);
        write_lines(&dir.path().join(format!("{f}.jsonl.gz")), &lines);
        all.extend(lines);
    }
    all.sort();
    let output = dir.path().join("out.txt.gz");

    let sources = SourceSet::new(&[dir.path()]).unwrap();
    let config = quick_config(4, 64).with_gzip_threads(2);
    UnorderedFileMapper::new(sources, &output, jittered_identity(), config).run().unwrap();
    assert_eq!(read_sorted_lines(&output), all);
}
