use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use egs_core::types::{Block, StreamId};

use crate::error::{AllocateError, IoContext};

pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Strips surrounding ASCII whitespace, including the line terminator.
pub(crate) fn trim_line(mut line: &[u8]) -> &[u8] {
    while let Some((first, rest)) = line.split_first() {
        if !first.is_ascii_whitespace() {
            break;
        }
        line = rest;
    }
    while let Some((last, rest)) = line.split_last() {
        if !last.is_ascii_whitespace() {
            break;
        }
        line = rest;
    }
    line
}

/// Per-stream example accounting shared by every cell of a run.
///
/// Invariants:
/// - `remaining[i] <= totals[i]`
/// - `remaining[i]` is either zero or at least one block
/// - `taken[i]` is a multiple of the block size and is the next block's start offset
///
/// A stream whose remaining count drops below one block is snapped to zero;
/// its trailing examples are dropped, never emitted as a short block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    totals: Vec<u64>,
    remaining: Vec<u64>,
    taken: Vec<u64>,
    block_size: u64,
}

impl StreamState {
    pub fn new(totals: Vec<u64>, block_size: u64) -> Self {
        let remaining = totals
            .iter()
            .map(|&t| if t < block_size { 0 } else { t })
            .collect();
        let taken = vec![0; totals.len()];
        Self {
            totals,
            remaining,
            taken,
            block_size,
        }
    }

    pub fn num_streams(&self) -> usize {
        self.totals.len()
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn totals(&self) -> &[u64] {
        &self.totals
    }

    pub fn remaining(&self) -> &[u64] {
        &self.remaining
    }

    pub fn total_examples(&self) -> u64 {
        self.totals.iter().sum()
    }

    pub fn total_remaining(&self) -> u64 {
        self.remaining.iter().sum()
    }

    /// Examples emitted so far from `stream`; also its cursor position.
    pub fn taken(&self, stream: StreamId) -> u64 {
        self.taken[stream]
    }

    pub fn is_exhausted(&self, stream: StreamId) -> bool {
        self.remaining[stream] == 0
    }

    /// Examples of an exhausted stream that will never be emitted.
    pub fn dropped(&self, stream: StreamId) -> u64 {
        if self.is_exhausted(stream) {
            self.totals[stream] - self.taken[stream]
        } else {
            0
        }
    }

    /// Takes the next block from `stream` and updates its counters.
    pub fn take_block(&mut self, stream: StreamId) -> Result<Block, AllocateError> {
        let remaining = self.remaining[stream];
        if remaining < self.block_size || self.block_size == 0 {
            return Err(AllocateError::BlockUnavailable {
                stream,
                remaining,
                block_size: self.block_size,
            });
        }
        let block = Block::new(stream, self.taken[stream], self.block_size);
        self.taken[stream] += self.block_size;
        let left = remaining - self.block_size;
        self.remaining[stream] = if left < self.block_size { 0 } else { left };
        Ok(block)
    }
}

/// Sequential cursor over one stream's example list.
#[derive(Debug)]
pub struct StreamReader {
    stream: StreamId,
    path: PathBuf,
    reader: BufReader<File>,
    position: u64,
    buf: Vec<u8>,
}

impl StreamReader {
    pub fn open(stream: StreamId, path: &Path) -> Result<Self, AllocateError> {
        let file = File::open(path).at_path(path)?;
        Ok(Self {
            stream,
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            position: 0,
            buf: Vec::with_capacity(256),
        })
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Examples read so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The next example line, trimmed of surrounding whitespace, or `None` at
    /// end of file. Blank lines are skipped, matching `indexer::count_examples`,
    /// so `position` counts examples rather than physical lines.
    pub fn next_line(&mut self) -> Result<Option<&[u8]>, AllocateError> {
        loop {
            self.buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .at_path(&self.path)?;
            if n == 0 {
                return Ok(None);
            }
            if !is_blank(&self.buf) {
                break;
            }
        }
        self.position += 1;
        Ok(Some(trim_line(&self.buf)))
    }
}

/// One reader per stream, held for the run and released as streams run out.
#[derive(Debug)]
pub struct StreamReaders {
    readers: Vec<Option<StreamReader>>,
}

impl StreamReaders {
    pub fn open_all(paths: &[PathBuf]) -> Result<Self, AllocateError> {
        let readers = paths
            .iter()
            .enumerate()
            .map(|(stream, path)| StreamReader::open(stream, path).map(Some))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { readers })
    }

    pub fn get_mut(&mut self, stream: StreamId) -> Option<&mut StreamReader> {
        self.readers.get_mut(stream).and_then(Option::as_mut)
    }

    /// Closes the reader for `stream`.
    pub fn release(&mut self, stream: StreamId) {
        if let Some(slot) = self.readers.get_mut(stream) {
            slot.take();
        }
    }

    pub fn open_count(&self) -> usize {
        self.readers.iter().filter(|r| r.is_some()).count()
    }
}
