use thiserror::Error;

/// Index of an input stream (one per language), in input order.
pub type StreamId = usize;

/// A contiguous run of examples taken from one stream; the unit of allocation.
///
/// `start` counts examples, i.e. non-blank lines. For a list without blank
/// lines it is the zero-based line number of the block's first example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    pub stream: StreamId,
    pub start: u64,
    pub len: u64, // half-open [start, start + len)
}

impl Block {
    pub fn new(stream: StreamId, start: u64, len: u64) -> Self {
        Self { stream, start, len }
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len)
    }

    /// `<stream_id> <start> <len>`, the line format of `ranges.*.txt`.
    pub fn to_range_line(&self) -> String {
        format!("{} {} {}", self.stream, self.start, self.len)
    }

    pub fn parse_range_line(line: &str) -> Result<Self, RangeLineError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(RangeLineError::FieldCount(fields.len()));
        }
        let stream = parse_field::<StreamId>("stream_id", fields[0])?;
        let start = parse_field::<u64>("start", fields[1])?;
        let len = parse_field::<u64>("len", fields[2])?;
        if len == 0 {
            return Err(RangeLineError::ZeroLength);
        }
        Ok(Self { stream, start, len })
    }
}

fn parse_field<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> Result<T, RangeLineError> {
    value.parse().map_err(|_| RangeLineError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeLineError {
    #[error("expected `<stream_id> <start> <len>`, got {0} fields")]
    FieldCount(usize),
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("block len must be > 0")]
    ZeroLength,
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<RangeLineError>,
    },
}

/// Parses a whole range manifest. Blank lines are skipped.
pub fn parse_ranges(text: &str) -> Result<Vec<Block>, RangeLineError> {
    let mut out = Vec::new();
    for (line_no, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let block = Block::parse_range_line(raw).map_err(|e| RangeLineError::AtLine {
            line: line_no + 1,
            source: Box::new(e),
        })?;
        out.push(block);
    }
    Ok(out)
}

/// One (job, archive) pairing of the allocation pass.
///
/// Both indices are 1-based since they appear verbatim in file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub job: u32,
    pub archive: u32,
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job {} archive {}", self.job, self.archive)
    }
}
