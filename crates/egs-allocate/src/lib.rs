#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

//! Allocates examples from several per-language example lists into training
//! archives, one fixed-size block at a time.
//!
//! A run has two passes. The allocation pass visits every (job, archive) cell
//! in row-major order, draws blocks against shared per-stream counters, and
//! writes each cell's keys to an intermediate file. The merge pass then folds
//! all jobs' cells for one archive into that archive's final outputs.

pub mod allocate;
pub mod config;
pub mod error;
pub mod indexer;
pub mod layout;
pub mod merge;
pub mod partition;
pub mod sampler;
pub mod stream;

pub use allocate::{allocate, AllocateMetrics, AllocateSummary};
pub use config::{AllocateConfig, FillPolicy, StreamWeight};
pub use error::AllocateError;
