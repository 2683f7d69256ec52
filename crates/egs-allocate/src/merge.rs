use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use egs_core::types::CellId;
use egs_observe::metrics::ScopedTimer;
use tracing::info;

use crate::allocate::AllocateMetrics;
use crate::config::StreamWeight;
use crate::error::{AllocateError, IoContext};
use crate::layout::OutputLayout;
use crate::partition::CellManifests;
use crate::stream::trim_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub archive: u32,
    pub examples: u64,
    pub blocks: u64,
}

struct LineSink {
    path: PathBuf,
    out: BufWriter<File>,
}

impl LineSink {
    fn create(path: PathBuf) -> Result<Self, AllocateError> {
        let file = File::create(&path).at_path(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, parts: &[&[u8]]) -> Result<(), AllocateError> {
        for part in parts {
            self.out.write_all(part).at_path(&self.path)?;
        }
        self.out.write_all(b"\n").at_path(&self.path)
    }

    fn finish(mut self) -> Result<(), AllocateError> {
        self.out.flush().at_path(&self.path)
    }
}

/// `<reference line> <stream_id>` → (reference line, key, stream id).
fn split_cell_line(line: &[u8]) -> Result<(&[u8], &[u8], usize), &'static str> {
    let line = trim_line(line);
    let pos = line
        .iter()
        .rposition(|&b| b == b' ')
        .ok_or("missing stream id")?;
    let (reference, stream) = (trim_line(&line[..pos]), &line[pos + 1..]);
    let key_end = reference
        .iter()
        .position(u8::is_ascii_whitespace)
        .unwrap_or(reference.len());
    let key = &reference[..key_end];
    if key.is_empty() {
        return Err("missing example key");
    }
    let stream = std::str::from_utf8(stream)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or("stream id is not a number")?;
    Ok((reference, key, stream))
}

/// Folds every job's intermediate cell file for an archive into the archive's
/// reference list, output-label ark, weight ark and range manifest.
pub struct ArchiveMerger<'a> {
    layout: &'a OutputLayout,
    weights: Vec<String>,
    num_jobs: u32,
    metrics: &'a AllocateMetrics,
}

impl<'a> ArchiveMerger<'a> {
    pub fn new(
        layout: &'a OutputLayout,
        weights: &[StreamWeight],
        num_jobs: u32,
        metrics: &'a AllocateMetrics,
    ) -> Self {
        Self {
            layout,
            weights: weights.iter().map(|w| w.as_str().to_string()).collect(),
            num_jobs,
            metrics,
        }
    }

    /// Merges jobs `1..=num_jobs` of `archive` in order, deleting each cell
    /// file once it has been copied. All outputs are flushed before returning.
    pub fn merge_archive(
        &self,
        archive: u32,
        manifests: &CellManifests,
    ) -> Result<ArchiveStats, AllocateError> {
        let _timer = ScopedTimer::new(&self.metrics.merge_time);
        let mut scp = LineSink::create(self.layout.scp_path(archive))?;
        let mut output = LineSink::create(self.layout.output_ark_path(archive))?;
        let mut weight = LineSink::create(self.layout.weight_ark_path(archive))?;
        let mut ranges = LineSink::create(self.layout.ranges_path(archive))?;

        let mut examples: u64 = 0;
        for job in 1..=self.num_jobs {
            let cell = CellId { job, archive };
            let path = self.layout.cell_path(cell);
            examples += self.merge_cell(cell, &path, &mut scp, &mut output, &mut weight)?;
            std::fs::remove_file(&path).at_path(&path)?;
            self.metrics.cells_removed.inc();
        }

        let blocks = manifests.archive_blocks(archive)?;
        for block in &blocks {
            ranges.write_line(&[block.to_range_line().as_bytes()])?;
        }

        scp.finish()?;
        output.finish()?;
        weight.finish()?;
        ranges.finish()?;

        info!(
            target: "egs_alloc",
            event = "archive_merged",
            archive,
            examples,
            blocks = blocks.len() as u64,
            "archive merged"
        );
        Ok(ArchiveStats {
            archive,
            examples,
            blocks: blocks.len() as u64,
        })
    }

    fn merge_cell(
        &self,
        cell: CellId,
        path: &Path,
        scp: &mut LineSink,
        output: &mut LineSink,
        weight: &mut LineSink,
    ) -> Result<u64, AllocateError> {
        let file = File::open(path).at_path(path)?;
        let mut reader = BufReader::new(file);
        let mut buf: Vec<u8> = Vec::with_capacity(256);
        let mut line_no: usize = 0;
        let mut merged: u64 = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).at_path(path)? == 0 {
                break;
            }
            line_no += 1;
            let malformed = |reason: &str| AllocateError::MalformedCellLine {
                cell,
                path: path.to_path_buf(),
                line: line_no,
                reason: reason.to_string(),
            };

            let (reference, key, stream) = split_cell_line(&buf).map_err(malformed)?;
            let stream_weight = self
                .weights
                .get(stream)
                .ok_or_else(|| malformed("stream id out of range"))?;
            let label = format!("output-{stream}");

            scp.write_line(&[reference])?;
            output.write_line(&[key, b" ", label.as_bytes()])?;
            weight.write_line(&[key, b" ", stream_weight.as_bytes()])?;
            merged += 1;
        }
        self.metrics.keys_merged.inc_by(merged);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egs_core::plan::ArchivePlan;
    use egs_core::types::Block;

    fn weights(values: &[f64]) -> Vec<StreamWeight> {
        values.iter().copied().map(StreamWeight::from).collect()
    }

    #[test]
    fn cell_lines_split_on_the_last_space() {
        let (reference, key, stream) = split_cell_line(b"utt1 ark:/x/egs.1.ark:42 3").unwrap();
        assert_eq!(reference, b"utt1 ark:/x/egs.1.ark:42");
        assert_eq!(key, b"utt1");
        assert_eq!(stream, 3);

        let (reference, key, stream) = split_cell_line(b"utt2 0").unwrap();
        assert_eq!((reference, key, stream), (&b"utt2"[..], &b"utt2"[..], 0));

        assert!(split_cell_line(b"utt3").is_err());
        assert!(split_cell_line(b"utt3 x").is_err());
        assert!(split_cell_line(b" 1").is_err());
    }

    #[test]
    fn indented_cell_lines_keep_their_key() {
        let (reference, key, stream) = split_cell_line(b"  k2 ark:2 0").unwrap();
        assert_eq!((reference, key, stream), (&b"k2 ark:2"[..], &b"k2"[..], 0));
    }

    #[test]
    fn merge_writes_four_outputs_and_removes_cells() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = OutputLayout::new(dir.path(), "egs.");
        layout.create_dirs()?;

        let plan = ArchivePlan::new(8, 4, 10, 2)?;
        assert_eq!(plan.num_archives, 2);
        let mut manifests = CellManifests::new(plan);
        manifests.insert(CellId { job: 1, archive: 2 }, vec![Block::new(1, 0, 2)])?;
        manifests.insert(CellId { job: 2, archive: 2 }, vec![Block::new(0, 0, 2)])?;

        std::fs::write(
            layout.cell_path(CellId { job: 1, archive: 2 }),
            "b-0 ark:b:0 1\nb-1 ark:b:1 1\n",
        )?;
        std::fs::write(
            layout.cell_path(CellId { job: 2, archive: 2 }),
            "a-0 ark:a:0 0\na-1 ark:a:1 0\n",
        )?;

        let metrics = AllocateMetrics::default();
        let merger = ArchiveMerger::new(&layout, &weights(&[2.0, 0.5]), plan.num_jobs, &metrics);
        let stats = merger.merge_archive(2, &manifests)?;
        assert_eq!(
            stats,
            ArchiveStats {
                archive: 2,
                examples: 4,
                blocks: 2
            }
        );

        assert_eq!(
            std::fs::read_to_string(layout.scp_path(2))?,
            "b-0 ark:b:0\nb-1 ark:b:1\na-0 ark:a:0\na-1 ark:a:1\n"
        );
        assert_eq!(
            std::fs::read_to_string(layout.output_ark_path(2))?,
            "b-0 output-1\nb-1 output-1\na-0 output-0\na-1 output-0\n"
        );
        assert_eq!(
            std::fs::read_to_string(layout.weight_ark_path(2))?,
            "b-0 0.5\nb-1 0.5\na-0 2.0\na-1 2.0\n"
        );
        assert_eq!(
            std::fs::read_to_string(layout.ranges_path(2))?,
            "1 0 2\n0 0 2\n"
        );
        assert!(!layout.cell_path(CellId { job: 1, archive: 2 }).exists());
        assert!(!layout.cell_path(CellId { job: 2, archive: 2 }).exists());
        assert_eq!(metrics.cells_removed.get(), 2);
        assert_eq!(metrics.keys_merged.get(), 4);
        Ok(())
    }

    #[test]
    fn unknown_stream_id_is_reported_with_cell_and_line() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = OutputLayout::new(dir.path(), "egs.");
        layout.create_dirs()?;
        let plan = ArchivePlan::new(4, 4, 10, 1)?;
        let manifests = CellManifests::new(plan);
        let cell = CellId { job: 1, archive: 1 };
        std::fs::write(layout.cell_path(cell), "a-0 ark:a:0 0\na-1 ark:a:1 5\n")?;

        let metrics = AllocateMetrics::default();
        let merger = ArchiveMerger::new(&layout, &weights(&[1.0]), 1, &metrics);
        match merger.merge_archive(1, &manifests) {
            Err(AllocateError::MalformedCellLine { cell: c, line, .. }) => {
                assert_eq!(c, cell);
                assert_eq!(line, 2);
            }
            other => panic!("expected MalformedCellLine, got {other:?}"),
        }
        Ok(())
    }
}
