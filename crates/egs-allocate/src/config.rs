use std::path::PathBuf;

use crate::error::AllocateError;

pub const DEFAULT_NUM_JOBS: u32 = 20;
pub const DEFAULT_SAMPLES_PER_ITER: u64 = 40_000;
pub const DEFAULT_MAX_ARCHIVES: u32 = 1000;
pub const DEFAULT_MINIBATCH_SIZE: u64 = 512;
pub const DEFAULT_SEED: u64 = 1;
pub const DEFAULT_PREFIX: &str = "egs.";

/// How the next block's source stream is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    /// Draw a stream with probability proportional to its remaining examples.
    Random,
    /// Always take the first stream that still has examples.
    Sequential,
}

impl FillPolicy {
    /// Accepts the `--random-lang` spellings (`true`/`false`) as well as the policy names.
    pub fn parse(s: &str) -> Result<Self, AllocateError> {
        let s = s.trim().to_ascii_lowercase();
        let policy = match s.as_str() {
            "true" | "random" | "1" | "yes" => FillPolicy::Random,
            "false" | "sequential" | "0" | "no" => FillPolicy::Sequential,
            _ => {
                return Err(AllocateError::Config(format!(
                    "invalid fill policy {s:?} (expected: true|false|random|sequential)"
                )))
            }
        };
        Ok(policy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FillPolicy::Random => "random",
            FillPolicy::Sequential => "sequential",
        }
    }
}

/// One stream's weight: the parsed value and the text written to `weight.*.ark`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamWeight {
    pub value: f64,
    pub text: String,
}

impl StreamWeight {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<f64> for StreamWeight {
    fn from(value: f64) -> Self {
        Self {
            value,
            text: format_weight(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AllocateConfig {
    /// One example list per stream, in stream-id order.
    pub inputs: Vec<PathBuf>,
    pub egs_dir: PathBuf,
    /// Namespaces every produced file, e.g. `egs.` or `combine.`.
    pub prefix: String,
    pub num_jobs: u32,
    /// Target examples per archive. The archive count is `total / samples_per_iter`,
    /// rounded down, then clamped into `[1, max_archives]`.
    pub samples_per_iter: u64,
    pub max_archives: u32,
    /// Block size: consecutive examples taken from one stream at a time.
    pub minibatch_size: u64,
    pub seed: u64,
    pub policy: FillPolicy,
    /// Per-stream weights; `None` means 1.0 for every stream.
    pub weights: Option<Vec<StreamWeight>>,
}

impl AllocateConfig {
    pub fn new(inputs: Vec<PathBuf>, egs_dir: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            egs_dir: egs_dir.into(),
            prefix: DEFAULT_PREFIX.to_string(),
            num_jobs: DEFAULT_NUM_JOBS,
            samples_per_iter: DEFAULT_SAMPLES_PER_ITER,
            max_archives: DEFAULT_MAX_ARCHIVES,
            minibatch_size: DEFAULT_MINIBATCH_SIZE,
            seed: DEFAULT_SEED,
            policy: FillPolicy::Random,
            weights: None,
        }
    }

    pub fn validate(&self) -> Result<(), AllocateError> {
        if self.inputs.is_empty() {
            return Err(AllocateError::Config(
                "at least one input example list is required".to_string(),
            ));
        }
        for (name, value) in [
            ("num_jobs", u64::from(self.num_jobs)),
            ("samples_per_iter", self.samples_per_iter),
            ("max_archives", u64::from(self.max_archives)),
            ("minibatch_size", self.minibatch_size),
        ] {
            if value == 0 {
                return Err(AllocateError::Config(format!("{name} must be > 0")));
            }
        }
        if self.prefix.contains('/') || self.prefix.contains('\\') {
            return Err(AllocateError::Config(format!(
                "prefix must not contain a path separator: {:?}",
                self.prefix
            )));
        }
        self.stream_weights().map(|_| ())
    }

    /// The weight of every stream, defaulting to 1.0.
    pub fn stream_weights(&self) -> Result<Vec<StreamWeight>, AllocateError> {
        let streams = self.inputs.len();
        let Some(weights) = &self.weights else {
            return Ok(vec![StreamWeight::from(1.0); streams]);
        };
        if weights.len() != streams {
            return Err(AllocateError::WeightCountMismatch {
                weights: weights.len(),
                streams,
            });
        }
        for (stream, w) in weights.iter().enumerate() {
            if !w.value.is_finite() || w.value < 0.0 {
                return Err(AllocateError::InvalidWeight {
                    stream,
                    value: w.text.clone(),
                });
            }
        }
        Ok(weights.clone())
    }
}

/// Parses a comma-separated weight list such as `"2.0,0.5"`. Each entry keeps
/// its token as typed, so `2` is written back as `2`.
pub fn parse_weights(s: &str) -> Result<Vec<StreamWeight>, AllocateError> {
    s.split(',')
        .enumerate()
        .map(|(stream, raw)| {
            let raw = raw.trim();
            raw.parse::<f64>()
                .ok()
                .filter(|w| w.is_finite() && *w >= 0.0)
                .map(|value| StreamWeight {
                    value,
                    text: raw.to_string(),
                })
                .ok_or_else(|| AllocateError::InvalidWeight {
                    stream,
                    value: raw.to_string(),
                })
        })
        .collect()
}

/// Text of a weight given as a number; always carries a decimal point (`1.0`, `0.5`).
fn format_weight(w: f64) -> String {
    format!("{w:?}")
}
