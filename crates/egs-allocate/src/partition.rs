use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use egs_core::plan::ArchivePlan;
use egs_core::types::{Block, CellId};
use egs_observe::metrics::ScopedTimer;
use tracing::{debug, info};

use crate::allocate::AllocateMetrics;
use crate::error::{AllocateError, IoContext};
use crate::sampler::BlockSampler;
use crate::stream::{StreamReaders, StreamState};

/// When a cell stops drawing blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellTarget {
    /// Stop once the emitted example count reaches the quota.
    Quota(u64),
    /// Keep drawing until every stream is exhausted.
    Drain,
}

/// Drives the sampler for one cell at a time and copies the chosen blocks'
/// lines into the cell's intermediate file as `<line> <stream_id>`.
pub struct PartitionWriter<'a> {
    state: &'a mut StreamState,
    readers: &'a mut StreamReaders,
    sampler: &'a mut BlockSampler,
    metrics: &'a AllocateMetrics,
}

impl<'a> PartitionWriter<'a> {
    pub fn new(
        state: &'a mut StreamState,
        readers: &'a mut StreamReaders,
        sampler: &'a mut BlockSampler,
        metrics: &'a AllocateMetrics,
    ) -> Self {
        Self {
            state,
            readers,
            sampler,
            metrics,
        }
    }

    /// Fills one cell and returns its blocks in emission order.
    pub fn write_cell(
        &mut self,
        cell: CellId,
        target: CellTarget,
        path: &Path,
    ) -> Result<Vec<Block>, AllocateError> {
        let _timer = ScopedTimer::new(&self.metrics.cell_time);
        let file = File::create(path).at_path(path)?;
        let mut out = BufWriter::new(file);

        let mut blocks: Vec<Block> = Vec::new();
        let mut emitted: u64 = 0;
        loop {
            if let CellTarget::Quota(quota) = target {
                if emitted >= quota {
                    break;
                }
            }
            let total = self.state.total_remaining();
            if total == 0 {
                debug!(
                    target: "egs_alloc",
                    event = "all_streams_exhausted",
                    job = cell.job,
                    archive = cell.archive,
                    "no examples left"
                );
                break;
            }
            let Some(stream) = self.sampler.select(self.state.remaining(), total)? else {
                break;
            };

            let block = self.state.take_block(stream)?;
            self.copy_block(cell, block, &mut out, path)?;
            emitted += block.len;
            blocks.push(block);
            self.metrics.blocks_emitted.inc();
            self.metrics.keys_written.inc_by(block.len);

            if self.state.is_exhausted(stream) {
                info!(
                    target: "egs_alloc",
                    event = "stream_exhausted",
                    stream,
                    job = cell.job,
                    archive = cell.archive,
                    emitted = self.state.taken(stream),
                    dropped = self.state.dropped(stream),
                    "done with stream"
                );
                self.readers.release(stream);
            }
        }

        out.flush().at_path(path)?;
        debug!(
            target: "egs_alloc",
            event = "cell_written",
            job = cell.job,
            archive = cell.archive,
            blocks = blocks.len() as u64,
            examples = emitted,
            "cell written"
        );
        Ok(blocks)
    }

    fn copy_block(
        &mut self,
        cell: CellId,
        block: Block,
        out: &mut impl Write,
        out_path: &Path,
    ) -> Result<(), AllocateError> {
        let Some(reader) = self.readers.get_mut(block.stream) else {
            return Err(AllocateError::ReaderClosed {
                cell,
                stream: block.stream,
            });
        };
        if reader.position() != block.start {
            return Err(AllocateError::CursorMismatch {
                cell,
                stream: block.stream,
                position: reader.position(),
                start: block.start,
            });
        }

        for got in 0..block.len {
            let Some(line) = reader.next_line()? else {
                return Err(AllocateError::StreamExhausted {
                    cell,
                    stream: reader.stream(),
                    path: reader.path().to_path_buf(),
                    offset: block.start + got,
                    wanted: block.len,
                    got,
                });
            };
            out.write_all(line).at_path(out_path)?;
            writeln!(out, " {}", block.stream).at_path(out_path)?;
        }
        Ok(())
    }
}

/// Every cell's blocks, kept for the merge pass.
#[derive(Debug, Clone)]
pub struct CellManifests {
    plan: ArchivePlan,
    cells: Vec<Vec<Block>>,
}

impl CellManifests {
    pub fn new(plan: ArchivePlan) -> Self {
        Self {
            plan,
            cells: vec![Vec::new(); plan.num_cells()],
        }
    }

    pub fn insert(&mut self, cell: CellId, blocks: Vec<Block>) -> Result<(), AllocateError> {
        let idx = self
            .plan
            .cell_index(cell)
            .ok_or(AllocateError::UnknownCell(cell))?;
        self.cells[idx] = blocks;
        Ok(())
    }

    pub fn get(&self, cell: CellId) -> Result<&[Block], AllocateError> {
        let idx = self
            .plan
            .cell_index(cell)
            .ok_or(AllocateError::UnknownCell(cell))?;
        Ok(&self.cells[idx])
    }

    /// Blocks of one archive, job by job, each job's in emission order.
    pub fn archive_blocks(&self, archive: u32) -> Result<Vec<Block>, AllocateError> {
        let mut out = Vec::new();
        for job in 1..=self.plan.num_jobs {
            out.extend_from_slice(self.get(CellId { job, archive })?);
        }
        Ok(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.cells.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FillPolicy;
    use std::path::PathBuf;

    fn write_stream(dir: &Path, name: &str, n: usize) -> anyhow::Result<PathBuf> {
        let path = dir.join(name);
        let body: String = (0..n).map(|i| format!("{name}-{i:04} ark:{i}\n")).collect();
        std::fs::write(&path, body)?;
        Ok(path)
    }

    #[test]
    fn quota_cell_stops_at_or_past_quota() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = write_stream(dir.path(), "a", 30)?;
        let mut state = StreamState::new(vec![30], 10);
        let mut readers = StreamReaders::open_all(&[a])?;
        let mut sampler = BlockSampler::new(1, FillPolicy::Sequential);
        let metrics = AllocateMetrics::default();
        let mut writer = PartitionWriter::new(&mut state, &mut readers, &mut sampler, &metrics);

        let cell = CellId { job: 1, archive: 1 };
        let out = dir.path().join("scp.1.1");
        let blocks = writer.write_cell(cell, CellTarget::Quota(15), &out)?;
        assert_eq!(blocks, vec![Block::new(0, 0, 10), Block::new(0, 10, 10)]);

        let text = std::fs::read_to_string(&out)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 20);
        assert_eq!(lines[0], "a-0000 ark:0 0");
        assert_eq!(lines[19], "a-0019 ark:19 0");
        assert_eq!(metrics.blocks_emitted.get(), 2);
        assert_eq!(metrics.keys_written.get(), 20);
        Ok(())
    }

    #[test]
    fn drain_cell_takes_everything_left_and_drops_the_tail() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = write_stream(dir.path(), "a", 25)?;
        let b = write_stream(dir.path(), "b", 10)?;
        let mut state = StreamState::new(vec![25, 10], 10);
        let mut readers = StreamReaders::open_all(&[a, b])?;
        let mut sampler = BlockSampler::new(3, FillPolicy::Random);
        let metrics = AllocateMetrics::default();

        let out = dir.path().join("scp.1.1");
        let blocks = {
            let mut writer =
                PartitionWriter::new(&mut state, &mut readers, &mut sampler, &metrics);
            writer.write_cell(CellId { job: 1, archive: 1 }, CellTarget::Drain, &out)?
        };
        assert_eq!(blocks.len(), 3);
        assert_eq!(state.total_remaining(), 0);
        assert_eq!(state.dropped(0), 5);
        assert_eq!(state.dropped(1), 0);
        assert_eq!(readers.open_count(), 0);

        let mut a_blocks: Vec<u64> = blocks
            .iter()
            .filter(|b| b.stream == 0)
            .map(|b| b.start)
            .collect();
        a_blocks.sort_unstable();
        assert_eq!(a_blocks, vec![0, 10]);
        Ok(())
    }

    #[test]
    fn short_list_is_an_accounting_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = write_stream(dir.path(), "a", 15)?;
        // Claim more examples than the file holds.
        let mut state = StreamState::new(vec![40], 10);
        let mut readers = StreamReaders::open_all(&[a.clone()])?;
        let mut sampler = BlockSampler::new(1, FillPolicy::Sequential);
        let metrics = AllocateMetrics::default();
        let mut writer = PartitionWriter::new(&mut state, &mut readers, &mut sampler, &metrics);

        let cell = CellId { job: 2, archive: 1 };
        let err = writer
            .write_cell(cell, CellTarget::Drain, &dir.path().join("scp.2.1"))
            .unwrap_err();
        match err {
            AllocateError::StreamExhausted {
                cell: c,
                stream,
                path,
                offset,
                got,
                ..
            } => {
                assert_eq!(c, cell);
                assert_eq!(stream, 0);
                assert_eq!(path, a);
                assert_eq!(offset, 15);
                assert_eq!(got, 5);
            }
            other => panic!("expected StreamExhausted, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn manifests_group_blocks_by_archive_in_job_order() -> anyhow::Result<()> {
        let plan = ArchivePlan::new(400, 200, 10, 2)?;
        let mut m = CellManifests::new(plan);
        m.insert(CellId { job: 1, archive: 2 }, vec![Block::new(0, 0, 10)])?;
        m.insert(
            CellId { job: 2, archive: 2 },
            vec![Block::new(1, 0, 10), Block::new(0, 10, 10)],
        )?;
        m.insert(CellId { job: 1, archive: 1 }, vec![Block::new(1, 10, 10)])?;

        assert_eq!(
            m.archive_blocks(2)?,
            vec![Block::new(0, 0, 10), Block::new(1, 0, 10), Block::new(0, 10, 10)]
        );
        assert_eq!(m.archive_blocks(1)?, vec![Block::new(1, 10, 10)]);
        assert_eq!(m.iter().count(), 4);
        assert!(matches!(
            m.insert(CellId { job: 3, archive: 1 }, Vec::new()),
            Err(AllocateError::UnknownCell(_))
        ));
        Ok(())
    }
}
