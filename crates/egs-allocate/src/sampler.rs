use egs_core::types::StreamId;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::config::FillPolicy;
use crate::error::AllocateError;

/// Picks the stream whose cumulative remaining mass covers `draw`.
///
/// Walks streams in index order with a running sum `c` and returns the first
/// non-empty stream with `draw <= c + remaining[i]`. The bound is inclusive, so
/// a draw landing exactly on a boundary goes to the lower stream: the first
/// non-empty stream covers one extra draw value and the last one covers one
/// fewer. Selection is only approximately proportional at block granularity
/// anyway, so the bias is kept as-is.
///
/// Empty streams add nothing to `c` and are never returned.
pub fn select_by_mass(remaining: &[u64], draw: u64) -> Option<StreamId> {
    let mut cumulative: u64 = 0;
    for (stream, &left) in remaining.iter().enumerate() {
        if left == 0 {
            continue;
        }
        if draw <= cumulative.saturating_add(left) {
            return Some(stream);
        }
        cumulative = cumulative.saturating_add(left);
    }
    None
}

pub fn select_first_nonempty(remaining: &[u64]) -> Option<StreamId> {
    remaining.iter().position(|&left| left > 0)
}

/// Chooses the source stream of each block. One seeded RNG serves the whole run.
#[derive(Debug, Clone)]
pub struct BlockSampler {
    rng: ChaCha8Rng,
    policy: FillPolicy,
}

impl BlockSampler {
    pub fn new(seed: u64, policy: FillPolicy) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            policy,
        }
    }

    pub fn policy(&self) -> FillPolicy {
        self.policy
    }

    /// `total_remaining` must equal the sum of `remaining` and be non-zero.
    pub fn select(
        &mut self,
        remaining: &[u64],
        total_remaining: u64,
    ) -> Result<Option<StreamId>, AllocateError> {
        if total_remaining == 0 {
            return Err(AllocateError::EmptySelection);
        }
        debug_assert_eq!(remaining.iter().sum::<u64>(), total_remaining);

        let picked = match self.policy {
            FillPolicy::Random => {
                let draw = self.rng.gen_range(0..total_remaining);
                select_by_mass(remaining, draw)
            }
            FillPolicy::Sequential => select_first_nonempty(remaining),
        };
        Ok(picked)
    }
}
