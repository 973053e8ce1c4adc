use std::path::{Path, PathBuf};

use lin_reg::AlphaGrid;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How the ordered corpus is partitioned into train, select and test rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldScheme {
    /// One precomputed stimulus ordering per fold, split 80 / 10 / 10 by trials
    Stratified {
        /// Number of folds, each needs its own ordering
        num_folds: usize,
    },
    /// Contiguous blocks over the rows, one block held out per fold and
    /// halved into select and test rows
    KFold {
        /// Number of blocks
        k: usize,
    },
}

impl FoldScheme {
    /// Number of folds this scheme produces
    #[inline(always)]
    pub fn num_folds(&self) -> usize {
        match self {
            FoldScheme::Stratified { num_folds } => *num_folds,
            FoldScheme::KFold { k } => *k,
        }
    }
}

/// The parameters of a receptive field analysis run.
/// Passed explicitly to every entry point, nothing is read from globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Sampling rate of stimulus features and responses in Hz
    pub sample_rate: f64,
    /// Length of the delay window in seconds
    pub delay_seconds: f64,
    /// Append three lags beyond each end of the delay window
    pub boundary_lags: bool,

    /// Number of bins each pitch feature is discretized into
    pub num_bins: usize,
    /// Central percentage of the reference distribution the bins span
    pub bin_percent: f64,

    /// Exponent of the weakest ridge strength
    pub alpha_start: f64,
    /// Exponent of the strongest ridge strength
    pub alpha_stop: f64,
    /// Number of log spaced strengths
    pub num_alphas: usize,

    /// Fold layout
    pub fold_scheme: FoldScheme,
    /// Offset in samples between a stimulus sample and its response column
    pub response_offset: usize,

    /// Number of shuffled stimulus tables the null distribution is built from
    pub num_permutations: usize,
    /// Seed used whenever stimulus tables are shuffled
    pub seed: u64,
    /// Worker threads, defaults to the number of cpus minus two
    pub num_threads: Option<usize>,

    /// Root directory of the result store
    pub result_root: PathBuf,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            sample_rate: 100.0,
            delay_seconds: 0.4,
            boundary_lags: true,
            num_bins: 10,
            bin_percent: 95.0,
            alpha_start: 2.0,
            alpha_stop: 7.0,
            num_alphas: 10,
            fold_scheme: FoldScheme::Stratified { num_folds: 25 },
            response_offset: 50,
            num_permutations: 25,
            seed: 0,
            num_threads: None,
            result_root: PathBuf::from("results"),
        }
    }
}

impl Params {
    /// Read parameters from a json file, missing fields take their default
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let params: Params = serde_json::from_str(&content)?;
        params.validate()?;

        Ok(params)
    }

    /// Check every value is in its admissible range
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate > 0.0) {
            return Err(Error::InvalidConfig(format!("sample_rate {} <= 0", self.sample_rate)));
        }
        if self.num_delays() == 0 {
            return Err(Error::InvalidConfig(format!(
                "delay window of {}s at {}Hz holds no lag",
                self.delay_seconds, self.sample_rate
            )));
        }
        if self.num_bins == 0 {
            return Err(Error::InvalidConfig("num_bins must be positive".to_string()));
        }
        if !(self.bin_percent > 1.0 && self.bin_percent < 100.0) {
            return Err(Error::InvalidConfig(format!(
                "bin_percent {} outside (1, 100)",
                self.bin_percent
            )));
        }
        if self.fold_scheme.num_folds() == 0 {
            return Err(Error::InvalidConfig("at least one fold is required".to_string()));
        }
        if let FoldScheme::KFold { k } = self.fold_scheme {
            if k < 2 {
                return Err(Error::InvalidConfig(format!("k-fold needs k >= 2, got {k}")));
            }
        }
        if self.num_threads == Some(0) {
            return Err(Error::InvalidConfig("num_threads must be positive".to_string()));
        }
        self.alpha_grid()?;

        Ok(())
    }

    /// Number of lags in the delay window, without boundary lags
    #[inline(always)]
    pub fn num_delays(&self) -> usize {
        (self.delay_seconds * self.sample_rate).floor().max(0.0) as usize
    }

    /// The alpha grid described by these parameters
    pub fn alpha_grid(&self) -> Result<AlphaGrid> {
        Ok(AlphaGrid::logspace(self.alpha_start, self.alpha_stop, self.num_alphas)?)
    }
}
