use std::path::{Path, PathBuf};

use egs_core::types::CellId;

use crate::error::{AllocateError, IoContext};

/// File names produced under one egs directory for one prefix `P`.
///
/// - `P{a}.scp`, `Poutput.{a}.ark`, `Pweight.{a}.ark` in the egs dir
/// - `temp/Pranges.{a}.txt` and the intermediate `temp/Pscp.{job}.{a}`
/// - `info/Pnum_tasks`, `info/Pnum_archives`
#[derive(Debug, Clone)]
pub struct OutputLayout {
    egs_dir: PathBuf,
    prefix: String,
}

impl OutputLayout {
    pub fn new(egs_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            egs_dir: egs_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn egs_dir(&self) -> &Path {
        &self.egs_dir
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.egs_dir.join("temp")
    }

    pub fn info_dir(&self) -> PathBuf {
        self.egs_dir.join("info")
    }

    pub fn create_dirs(&self) -> Result<(), AllocateError> {
        for dir in [self.temp_dir(), self.info_dir()] {
            std::fs::create_dir_all(&dir).at_path(&dir)?;
        }
        Ok(())
    }

    pub fn cell_path(&self, cell: CellId) -> PathBuf {
        self.temp_dir().join(format!("{}scp.{}.{}", self.prefix, cell.job, cell.archive))
    }

    pub fn scp_path(&self, archive: u32) -> PathBuf {
        self.egs_dir.join(format!("{}{archive}.scp", self.prefix))
    }

    pub fn output_ark_path(&self, archive: u32) -> PathBuf {
        self.egs_dir.join(format!("{}output.{archive}.ark", self.prefix))
    }

    pub fn weight_ark_path(&self, archive: u32) -> PathBuf {
        self.egs_dir.join(format!("{}weight.{archive}.ark", self.prefix))
    }

    pub fn ranges_path(&self, archive: u32) -> PathBuf {
        self.temp_dir().join(format!("{}ranges.{archive}.txt", self.prefix))
    }

    pub fn num_tasks_path(&self) -> PathBuf {
        self.info_dir().join(format!("{}num_tasks", self.prefix))
    }

    pub fn num_archives_path(&self) -> PathBuf {
        self.info_dir().join(format!("{}num_archives", self.prefix))
    }
}
