#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use egs_allocate::config::{
    parse_weights, DEFAULT_MAX_ARCHIVES, DEFAULT_MINIBATCH_SIZE, DEFAULT_NUM_JOBS,
    DEFAULT_PREFIX, DEFAULT_SAMPLES_PER_ITER, DEFAULT_SEED,
};
use egs_allocate::{allocate, AllocateConfig, FillPolicy};

/// Writes <prefix><n>.scp, <prefix>output.<n>.ark, <prefix>weight.<n>.ark and
/// temp/<prefix>ranges.<n>.txt for multilingual training.
#[derive(Debug, Parser)]
#[command(name = "egs-allocate")]
struct Args {
    /// Target number of examples in each archive (before merging examples).
    #[arg(long, env = "EGS_SAMPLES_PER_ITER", default_value_t = DEFAULT_SAMPLES_PER_ITER)]
    samples_per_iter: u64,

    /// Number of allocation jobs per archive; more jobs mix languages more finely.
    #[arg(long, env = "EGS_NUM_JOBS", default_value_t = DEFAULT_NUM_JOBS)]
    num_jobs: u32,

    /// true: draw languages by remaining examples; false: fill them in order.
    #[arg(long, env = "EGS_RANDOM_LANG", default_value = "true")]
    random_lang: String,

    #[arg(long, env = "EGS_MAX_ARCHIVES", default_value_t = DEFAULT_MAX_ARCHIVES)]
    max_archives: u32,

    #[arg(long, env = "EGS_SEED", default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Consecutive examples taken from one input list at a time. Only affects
    /// locality of disk access; need not equal the training minibatch size.
    #[arg(long, env = "EGS_MINIBATCH_SIZE", default_value_t = DEFAULT_MINIBATCH_SIZE)]
    minibatch_size: u64,

    /// Output file prefix, e.g. `egs.` or `combine.`.
    #[arg(long, env = "EGS_PREFIX", default_value = DEFAULT_PREFIX)]
    egs_prefix: String,

    /// Comma-separated weights, one per language, in input-list order.
    #[arg(long, env = "EGS_LANG2WEIGHT")]
    lang2weight: Option<String>,

    /// One egs.scp per input language.
    #[arg(required = true, num_args = 1..)]
    egs_scp_lists: Vec<PathBuf>,

    /// Output egs directory, e.g. exp/tdnn_multilingual_sp/egs.
    #[arg(required = true)]
    egs_dir: PathBuf,
}

fn main() -> Result<()> {
    egs_observe::logging::init_tracing();
    let args = Args::parse();

    let policy = FillPolicy::parse(&args.random_lang)?;
    let weights = args.lang2weight.as_deref().map(parse_weights).transpose()?;

    let cfg = AllocateConfig {
        prefix: args.egs_prefix,
        num_jobs: args.num_jobs,
        samples_per_iter: args.samples_per_iter,
        max_archives: args.max_archives,
        minibatch_size: args.minibatch_size,
        seed: args.seed,
        policy,
        weights,
        ..AllocateConfig::new(args.egs_scp_lists, args.egs_dir)
    };
    let summary = allocate(&cfg)?;

    println!(
        "streams={} archives={} blocks={} examples={} dropped={}",
        summary.num_streams(),
        summary.plan.num_archives,
        summary.total_blocks(),
        summary.keys_merged,
        summary.total_dropped()
    );
    Ok(())
}
