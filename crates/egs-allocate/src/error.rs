use std::path::{Path, PathBuf};

use egs_core::plan::PlanError;
use egs_core::types::{CellId, StreamId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocateError {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("invalid archive plan: {0}")]
    Plan(#[from] PlanError),
    #[error("got {weights} weights for {streams} input streams")]
    WeightCountMismatch { weights: usize, streams: usize },
    #[error("invalid weight {value:?} for stream {stream}")]
    InvalidWeight { stream: StreamId, value: String },
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{cell}: malformed line {line} in {}: {reason}", path.display())]
    MalformedCellLine {
        cell: CellId,
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error(
        "{cell}: stream {stream} ({}) ran dry at offset {offset}: wanted {wanted} keys, got {got}",
        path.display()
    )]
    StreamExhausted {
        cell: CellId,
        stream: StreamId,
        path: PathBuf,
        offset: u64,
        wanted: u64,
        got: u64,
    },
    #[error("{cell}: stream {stream} cursor is at {position} but the block starts at {start}")]
    CursorMismatch {
        cell: CellId,
        stream: StreamId,
        position: u64,
        start: u64,
    },
    #[error("{cell}: reader for stream {stream} was already closed")]
    ReaderClosed { cell: CellId, stream: StreamId },
    #[error("stream {stream} has {remaining} examples left, less than one block of {block_size}")]
    BlockUnavailable {
        stream: StreamId,
        remaining: u64,
        block_size: u64,
    },
    #[error("block selection called with zero remaining examples")]
    EmptySelection,
    #[error("{0} is outside the archive plan")]
    UnknownCell(CellId),
}

pub(crate) trait IoContext<T> {
    fn at_path(self, path: &Path) -> Result<T, AllocateError>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at_path(self, path: &Path) -> Result<T, AllocateError> {
        self.map_err(|source| AllocateError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
