use thiserror::Error;

use crate::types::CellId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("samples_per_iter must be > 0")]
    ZeroSamplesPerIter,
    #[error("max_archives must be > 0")]
    ZeroMaxArchives,
    #[error("num_jobs must be > 0")]
    ZeroJobs,
}

/// Archive count and per-cell quota for one allocation run.
///
/// Rounding rule: both quantities use integer (floor) division.
/// - `num_archives = clamp(total / samples_per_iter, 1, max_archives)`
/// - `cell_quota = total / (num_archives * num_jobs)`
///
/// Cells are visited row-major: job outer, archive inner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePlan {
    pub total_examples: u64,
    pub num_jobs: u32,
    pub num_archives: u32,
    pub cell_quota: u64,
}

impl ArchivePlan {
    pub fn new(
        total_examples: u64,
        samples_per_iter: u64,
        max_archives: u32,
        num_jobs: u32,
    ) -> Result<Self, PlanError> {
        if samples_per_iter == 0 {
            return Err(PlanError::ZeroSamplesPerIter);
        }
        if max_archives == 0 {
            return Err(PlanError::ZeroMaxArchives);
        }
        if num_jobs == 0 {
            return Err(PlanError::ZeroJobs);
        }

        let by_size = total_examples / samples_per_iter;
        let num_archives = by_size.clamp(1, u64::from(max_archives)) as u32;
        let cell_quota = total_examples / (u64::from(num_archives) * u64::from(num_jobs));
        Ok(Self {
            total_examples,
            num_jobs,
            num_archives,
            cell_quota,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.num_jobs as usize * self.num_archives as usize
    }

    /// Every cell in allocation order.
    pub fn cells(&self) -> impl Iterator<Item = CellId> {
        let num_archives = self.num_archives;
        (1..=self.num_jobs)
            .flat_map(move |job| (1..=num_archives).map(move |archive| CellId { job, archive }))
    }

    /// Row-major position of `cell`, or `None` if it is outside the plan.
    pub fn cell_index(&self, cell: CellId) -> Option<usize> {
        if cell.job == 0 || cell.job > self.num_jobs {
            return None;
        }
        if cell.archive == 0 || cell.archive > self.num_archives {
            return None;
        }
        Some((cell.job as usize - 1) * self.num_archives as usize + (cell.archive as usize - 1))
    }

    pub fn is_last_cell(&self, cell: CellId) -> bool {
        cell.job == self.num_jobs && cell.archive == self.num_archives
    }
}
