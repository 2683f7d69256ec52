use std::path::Path;

use egs_core::plan::ArchivePlan;
use egs_observe::metrics::{Counter, DurationAgg, DurationAggSnapshot};
use tracing::{info, warn};

use crate::config::AllocateConfig;
use crate::error::{AllocateError, IoContext};
use crate::indexer::index_streams;
use crate::layout::OutputLayout;
use crate::merge::{ArchiveMerger, ArchiveStats};
use crate::partition::{CellManifests, CellTarget, PartitionWriter};
use crate::sampler::BlockSampler;
use crate::stream::{StreamReaders, StreamState};

#[derive(Debug, Default)]
pub struct AllocateMetrics {
    pub blocks_emitted: Counter,
    pub keys_written: Counter,
    pub keys_merged: Counter,
    pub cells_removed: Counter,
    pub cell_time: DurationAgg,
    pub merge_time: DurationAgg,
}

#[derive(Debug, Clone)]
pub struct AllocateSummary {
    pub plan: ArchivePlan,
    pub stream_lengths: Vec<u64>,
    pub blocks_per_stream: Vec<u64>,
    /// Examples never emitted: each stream's sub-block tail, plus anything a
    /// stream still held when the run ended.
    pub dropped_per_stream: Vec<u64>,
    pub archives: Vec<ArchiveStats>,
    pub keys_merged: u64,
    pub cell_time: DurationAggSnapshot,
    pub merge_time: DurationAggSnapshot,
}

impl AllocateSummary {
    pub fn num_streams(&self) -> usize {
        self.stream_lengths.len()
    }

    pub fn total_blocks(&self) -> u64 {
        self.blocks_per_stream.iter().sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped_per_stream.iter().sum()
    }
}

fn write_scalar(path: &Path, value: u64) -> Result<(), AllocateError> {
    std::fs::write(path, format!("{value}\n")).at_path(path)
}

/// Runs the whole allocation: index, plan, fill every cell, merge every archive.
///
/// The run is all-or-nothing. On error, intermediate cell files and partially
/// written archives may be left behind; rerunning with the same inputs, config
/// and seed reproduces identical outputs.
pub fn allocate(cfg: &AllocateConfig) -> Result<AllocateSummary, AllocateError> {
    cfg.validate()?;
    let weights = cfg.stream_weights()?;
    let layout = OutputLayout::new(&cfg.egs_dir, cfg.prefix.as_str());

    let lengths = index_streams(&cfg.inputs)?;
    let total: u64 = lengths.iter().sum();
    let plan = ArchivePlan::new(total, cfg.samples_per_iter, cfg.max_archives, cfg.num_jobs)?;

    layout.create_dirs()?;
    write_scalar(&layout.num_tasks_path(), lengths.len() as u64)?;
    write_scalar(&layout.num_archives_path(), u64::from(plan.num_archives))?;

    info!(
        target: "egs_alloc",
        event = "allocate_start",
        egs_dir = %layout.egs_dir().display(),
        prefix = cfg.prefix.as_str(),
        streams = lengths.len() as u64,
        total_examples = total,
        num_archives = plan.num_archives,
        num_jobs = plan.num_jobs,
        cell_quota = plan.cell_quota,
        minibatch_size = cfg.minibatch_size,
        seed = cfg.seed,
        "allocation starting"
    );

    let mut state = StreamState::new(lengths.clone(), cfg.minibatch_size);
    let mut readers = StreamReaders::open_all(&cfg.inputs)?;
    for stream in 0..state.num_streams() {
        if state.is_exhausted(stream) {
            warn!(
                target: "egs_alloc",
                event = "stream_too_short",
                stream,
                examples = lengths[stream],
                minibatch_size = cfg.minibatch_size,
                "stream holds less than one block; skipping it"
            );
            readers.release(stream);
        }
    }

    let mut sampler = BlockSampler::new(cfg.seed, cfg.policy);
    let metrics = AllocateMetrics::default();
    let mut manifests = CellManifests::new(plan);

    info!(
        target: "egs_alloc",
        event = "cells_start",
        cells = plan.num_cells() as u64,
        policy = sampler.policy().as_str(),
        "writing {}scp.<job>.<archive> cell files",
        cfg.prefix
    );
    {
        let mut writer = PartitionWriter::new(&mut state, &mut readers, &mut sampler, &metrics);
        for cell in plan.cells() {
            // The final cell drains whatever the quotas left behind.
            let target = if plan.is_last_cell(cell) {
                CellTarget::Drain
            } else {
                CellTarget::Quota(plan.cell_quota)
            };
            let blocks = writer.write_cell(cell, target, &layout.cell_path(cell))?;
            manifests.insert(cell, blocks)?;
        }
    }
    drop(readers);

    let merger = ArchiveMerger::new(&layout, &weights, plan.num_jobs, &metrics);
    let mut archives = Vec::with_capacity(plan.num_archives as usize);
    for archive in 1..=plan.num_archives {
        archives.push(merger.merge_archive(archive, &manifests)?);
    }

    let block_size = state.block_size();
    let blocks_per_stream: Vec<u64> = (0..state.num_streams())
        .map(|s| state.taken(s) / block_size)
        .collect();
    let dropped_per_stream: Vec<u64> = (0..state.num_streams())
        .map(|s| state.totals()[s] - state.taken(s))
        .collect();

    let summary = AllocateSummary {
        plan,
        stream_lengths: lengths,
        blocks_per_stream,
        dropped_per_stream,
        archives,
        keys_merged: metrics.keys_merged.get(),
        cell_time: metrics.cell_time.snapshot(),
        merge_time: metrics.merge_time.snapshot(),
    };

    info!(
        target: "egs_alloc",
        event = "allocate_complete",
        prefix = cfg.prefix.as_str(),
        num_archives = plan.num_archives,
        blocks = summary.total_blocks(),
        examples = summary.keys_merged,
        dropped = summary.total_dropped(),
        cell_total_ms = summary.cell_time.total_ms(),
        cell_min_ms = summary.cell_time.min_ns / 1_000_000,
        cell_max_ms = summary.cell_time.max_ns / 1_000_000,
        merge_avg_ms = summary.merge_time.avg_ms(),
        "finished writing {p}*.scp, {p}output.*.ark and {p}weight.*.ark",
        p = cfg.prefix
    );
    Ok(summary)
}
