use common::{Error, Result};
use nalgebra::{Const, DMatrix, Dim, Dyn, Matrix, VecStorage};

/// Number of extra lags appended beyond each end of the delay window
const NUM_BOUNDARY_LAGS: isize = 3;

/// The ordered lags a design matrix is expanded with.
/// A positive lag `d` lets row `t` see the stimulus at `t - d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delays {
    lags: Vec<isize>,
}

impl Delays {
    /// Explicit lags, in the order their blocks appear in the embedding
    pub fn new(lags: Vec<isize>) -> Result<Self> {
        if lags.is_empty() {
            return Err(Error::InvalidConfig("delay set is empty".to_string()));
        }
        Ok(Self { lags })
    }

    /// The lags `0..num_delays`
    pub fn window(num_delays: usize) -> Result<Self> {
        Self::new((0..num_delays as isize).collect())
    }

    /// The lags covering `seconds` at a sampling rate of `sample_rate`
    pub fn from_seconds(seconds: f64, sample_rate: f64) -> Result<Self> {
        Self::window((seconds * sample_rate).floor().max(0.0) as usize)
    }

    /// Add three lags before the first and after the last one, spaced by the
    /// step between the first two lags. They absorb edge effects of padded
    /// stimuli.
    pub fn with_boundary(self) -> Self {
        let step = match self.lags.as_slice() {
            [first, second, ..] => second - first,
            _ => 1,
        };
        let first = self.lags[0];
        let last = self.lags[self.lags.len() - 1];

        let mut lags: Vec<isize> = (1..=NUM_BOUNDARY_LAGS).rev().map(|i| first - i * step).collect();
        lags.extend_from_slice(&self.lags);
        lags.extend((1..=NUM_BOUNDARY_LAGS).map(|i| last + i * step));

        Self { lags }
    }

    /// The lags in block order
    #[inline(always)]
    pub fn lags(&self) -> &[isize] {
        &self.lags
    }

    /// Number of lags, i.e. blocks in the embedding
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.lags.len()
    }

    /// Always false, an empty delay set cannot be constructed
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.lags.is_empty()
    }

    /// Expand a `T x F` design into `T x (F * k)`, block `i` holding the
    /// design shifted by the `i`-th lag. Rows the shift exposes are zero.
    ///
    /// # Arguments
    /// inputs: Number of rows are the observed time steps and number of columns
    /// represent the features at each time step
    pub fn embed(&self, inputs: &DMatrix<f64>) -> DMatrix<f64> {
        let n_rows = inputs.nrows();
        let n_cols = inputs.ncols();
        let mut embedded: DMatrix<f64> = Matrix::from_element_generic(
            Dim::from_usize(n_rows),
            Dim::from_usize(n_cols * self.lags.len()),
            0.0,
        );

        for (block, lag) in self.lags.iter().enumerate() {
            let shift = lag.unsigned_abs().min(n_rows);
            for j in 0..n_cols {
                let mut column = vec![0.0; n_rows];
                let source = inputs.column(j);
                if *lag >= 0 {
                    for t in shift..n_rows {
                        column[t] = source[t - shift];
                    }
                } else {
                    for t in 0..n_rows - shift {
                        column[t] = source[t + shift];
                    }
                }
                let column: Matrix<f64, Dyn, Const<1>, VecStorage<f64, Dyn, Const<1>>> =
                    Matrix::from_vec_generic(Dim::from_usize(n_rows), Dim::from_usize(1), column);
                embedded.set_column(block * n_cols + j, &column);
            }
        }
        trace!("embedded {}x{} into {}x{}", n_rows, n_cols, n_rows, embedded.ncols());

        embedded
    }
}
