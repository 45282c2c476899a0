//! End-to-end tests for the order-preserving mapper.

use std::path::PathBuf;

use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{
    apply_serially, expand_or_drop, jittered_identity, length, numbered_lines, quick_config,
    read_lines, write_lines,
};
use batchmap_lib::pipeline::{OrderedFileMapper, SourceSet};

/// Writes `files` into a fresh directory as `{index:02}.txt` and returns their paths.
fn write_inputs(dir: &TempDir, files: &[Vec<String>]) -> Vec<PathBuf> {
    files
        .iter()
        .enumerate()
        .map(|(i, lines)| {
            let path = dir.path().join(format!("{i:02}.txt"));
            write_lines(&path, lines);
            path
        })
        .collect()
}

#[test]
fn test_lengths_in_input_order() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    write_lines(&input, &["a", "bb", "ccc"]);

    let sources = SourceSet::new(&[&input]).unwrap();
    let meta =
        OrderedFileMapper::new(sources, &output, length(), quick_config(4, 1)).run().unwrap();

    assert_eq!(read_lines(&output), vec!["1", "2", "3"]);
    assert_eq!(meta.lines_read, 3);
    assert_eq!(meta.records_processed, 3);
    assert_eq!(meta.lines_written, 3);
}

/// Output matches a serial application for every combination of pool size,
/// batch size, and submission queue length, including queues shorter than
/// the pool.
#[rstest]
fn test_output_matches_serial_application(
    #[values(1, 2, 4, 8)] threads: usize,
    #[values(1, 3, 64)] batch_size: usize,
    #[values(1, 2, 32)] queue_length: usize,
) {
    let dir = TempDir::new().unwrap();
    let files = vec![numbered_lines("a", 157), numbered_lines("bb", 0), numbered_lines("c", 90)];
    let inputs = write_inputs(&dir, &files);
    let output = dir.path().join("out.txt");

    let transform = expand_or_drop();
    let all_lines: Vec<String> = files.concat();
    let expected = apply_serially(&*transform, &all_lines);

    let config = quick_config(threads, batch_size).with_queue_length(queue_length);
    let sources = SourceSet::new(&inputs).unwrap();
    let meta = OrderedFileMapper::new(sources, &output, transform, config).run().unwrap();

    assert_eq!(read_lines(&output), expected);
    assert_eq!(meta.lines_read, all_lines.len() as u64);
    assert_eq!(meta.records_processed, all_lines.len() as u64);
    assert_eq!(meta.files_read, 3);
}

#[rstest]
#[case(2, 5)]
#[case(8, 1)]
#[case(8, 17)]
fn test_order_survives_uneven_task_durations(#[case] threads: usize, #[case] batch_size: usize) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    let lines = numbered_lines("line-", 400);
    write_lines(&input, &lines);

    let sources = SourceSet::new(&[&input]).unwrap();
    let config = quick_config(threads, batch_size);
    OrderedFileMapper::new(sources, &output, jittered_identity(), config).run().unwrap();
    assert_eq!(read_lines(&output), lines);
}

#[test]
fn test_directory_inputs_are_read_in_sorted_order() {
    let dir = TempDir::new().unwrap();
    let inputs = dir.path().join("inputs");
    std::fs::create_dir_all(inputs.join("m")).unwrap();
    write_lines(&inputs.join("z.txt"), &["z"]);
    write_lines(&inputs.join("a.txt"), &["a"]);
    write_lines(&inputs.join("m/b.tsv"), &["m/b"]);
    write_lines(&inputs.join("m/a.csv.gz"), &["m/a"]);
    write_lines(&inputs.join("skipped.bin"), &["never read"]);
    let output = dir.path().join("out.txt");

    let sources = SourceSet::new(&[&inputs]).unwrap();
    assert_eq!(sources.len(), 4);
    OrderedFileMapper::new(sources, &output, crate::helpers::identity(), quick_config(2, 1))
        .run()
        .unwrap();
    assert_eq!(read_lines(&output), vec!["a", "m/a", "m/b", "z"]);
}

#[rstest]
#[case(1)]
#[case(3)]
fn test_gzip_round_trip(#[case] gzip_threads: usize) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.txt.gz");
    let output = dir.path().join("out.txt.gz");
    // Enough output to span several parallel compression blocks.
    let lines = numbered_lines("a fairly long line of text to compress, number ", 20_000);
    write_lines(&input, &lines);

    let sources = SourceSet::new(&[&input]).unwrap();
    let config = quick_config(4, 100).with_gzip_threads(gzip_threads);
    OrderedFileMapper::new(sources, &output, crate::helpers::identity(), config).run().unwrap();
    assert_eq!(read_lines(&output), lines);
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::seq::SliceRandom;

    // Property: for any input split across files and any pool, batch, and
    // queue sizes, the ordered mapper writes exactly what a serial map would.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]
        #[test]
        fn proptest_ordered_output_equals_serial_map(
            file_sizes in prop::collection::vec(0usize..60, 1..5),
            threads in 1usize..6,
            batch_size in 1usize..20,
            queue_length in 1usize..6,
            seed in any::<u64>(),
        ) {
            let dir = TempDir::new().unwrap();
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let files: Vec<Vec<String>> = file_sizes
                .iter()
                .enumerate()
                .map(|(f, &n)| {
                    let mut lines = numbered_lines(&format!("f{f}-"), n);
                    lines.shuffle(&mut rng);
                    lines
                })
                .collect();
            let inputs = write_inputs(&dir, &files);
            let output = dir.path().join("out.txt");

            let transform = expand_or_drop();
            let expected = apply_serially(&*transform, &files.concat());
            let config = quick_config(threads, batch_size).with_queue_length(queue_length);
            let result = OrderedFileMapper::new(
                SourceSet::new(&inputs).unwrap(),
                &output,
                transform,
                config,
            )
            .run();

            if expected.is_empty() {
                prop_assert!(result.is_err(), "A run with no output should fail");
            } else {
                prop_assert!(result.is_ok(), "Run failed: {:?}", result.err());
                prop_assert_eq!(read_lines(&output), expected);
            }
        }
    }
}
