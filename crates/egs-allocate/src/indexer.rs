use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AllocateError, IoContext};
use crate::stream::is_blank;

/// Number of examples (non-blank lines) in one example list.
pub fn count_examples(path: &Path) -> Result<u64, AllocateError> {
    let file = File::open(path).at_path(path)?;
    let mut reader = BufReader::new(file);
    let mut line: Vec<u8> = Vec::with_capacity(256);
    let mut count: u64 = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).at_path(path)? == 0 {
            break;
        }
        if !is_blank(&line) {
            count += 1;
        }
    }
    Ok(count)
}

/// Counts every stream in input order. Nothing is retained beyond the counts.
pub fn index_streams(paths: &[PathBuf]) -> Result<Vec<u64>, AllocateError> {
    let mut lengths = Vec::with_capacity(paths.len());
    for (stream, path) in paths.iter().enumerate() {
        let len = count_examples(path)?;
        info!(
            target: "egs_alloc",
            event = "stream_indexed",
            stream,
            path = %path.display(),
            examples = len,
            "indexed stream"
        );
        lengths.push(len);
    }
    Ok(lengths)
}
