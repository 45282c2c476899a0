//! Builders and readers for line-oriented test inputs and outputs.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

/// Writes `lines` to `path`, one per line, gzip-compressed if the name ends in `.gz`.
pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) {
    let mut body = String::new();
    for line in lines {
        body.push_str(line.as_ref());
        body.push('\n');
    }
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
        encoder.write_all(body.as_bytes()).unwrap();
        encoder.finish().unwrap();
    } else {
        fs::write(path, body).unwrap();
    }
}

/// Lines `"{prefix}{i}"` for `i` in `0..n`.
pub fn numbered_lines(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

/// Reads every line of `path`, decompressing if the name ends in `.gz`.
pub fn read_lines(path: &Path) -> Vec<String> {
    let mut text = String::new();
    if path.extension().is_some_and(|ext| ext == "gz") {
        MultiGzDecoder::new(File::open(path).unwrap()).read_to_string(&mut text).unwrap();
    } else {
        text = fs::read_to_string(path).unwrap();
    }
    text.lines().map(String::from).collect()
}

/// [`read_lines`], sorted.
pub fn read_sorted_lines(path: &Path) -> Vec<String> {
    let mut lines = read_lines(path);
    lines.sort();
    lines
}
