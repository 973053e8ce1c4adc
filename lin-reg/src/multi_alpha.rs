use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::{pearson_or_zero, AlphaGrid, LinRegError};

const TRAIN: [&str; 3] = ["train design columns", "train rows", "train channels"];
const SELECT: [&str; 3] = ["select design columns", "select rows", "select channels"];
const TEST: [&str; 3] = ["test design columns", "test rows", "test channels"];

/// Ridge regression solved for many strengths from one eigendecomposition.
///
/// With `X^T X = Q diag(L) Q^T` and `U = Q^T X^T Y`, the ridge solution for
/// strength `a` is `Q diag(1 / (L + a)) U`. The decomposition costs O(F^3) once,
/// every strength afterwards only O(F^2 * C).
///
/// All arithmetic is done in `f64`.
#[derive(Debug, Clone)]
pub struct MultiAlphaRidge {
    eigenvectors: DMatrix<f64>,
    eigenvalues: DVector<f64>,
    projected: DMatrix<f64>,
}

impl MultiAlphaRidge {
    /// Decompose the gram matrix of the training design
    ///
    /// # Arguments:
    /// design: `T x F` training design matrix
    /// targets: `T x C` training responses, one column per channel
    pub fn new(design: &DMatrix<f64>, targets: &DMatrix<f64>) -> Result<Self, LinRegError> {
        if design.nrows() != targets.nrows() {
            return Err(LinRegError::ShapeMismatch {
                what: "train design rows vs train target rows",
                expected: design.nrows(),
                got: targets.nrows(),
            });
        }

        let gram = design.tr_mul(design);
        let eigen = SymmetricEigen::new(gram);
        let projected = eigen.eigenvectors.tr_mul(&design.tr_mul(targets));

        Ok(Self {
            eigenvectors: eigen.eigenvectors,
            eigenvalues: eigen.eigenvalues,
            projected,
        })
    }

    /// Number of design columns
    #[inline(always)]
    pub fn num_features(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Number of target channels
    #[inline(always)]
    pub fn num_targets(&self) -> usize {
        self.projected.ncols()
    }

    /// The `F x C` ridge weights for one strength
    pub fn weights(&self, alpha: f64) -> DMatrix<f64> {
        let mut scaled = self.projected.clone();
        for (i, lambda) in self.eigenvalues.iter().enumerate() {
            scaled.row_mut(i).scale_mut(1.0 / (lambda + alpha));
        }

        &self.eigenvectors * scaled
    }

    /// Pick for every channel independently the strength whose weights
    /// correlate best with the responses of a held out split.
    /// Ties resolve to the lowest grid index.
    pub fn select_alphas(
        &self,
        grid: &AlphaGrid,
        design: &DMatrix<f64>,
        targets: &DMatrix<f64>,
    ) -> Result<AlphaSelection, LinRegError> {
        check_pair(design, targets, self.num_features(), self.num_targets(), SELECT)?;

        let n_targets = self.num_targets();
        let mut best_alphas = vec![0; n_targets];
        let mut correlations = vec![f64::NEG_INFINITY; n_targets];
        let mut weights: DMatrix<f64> = DMatrix::zeros(self.num_features(), n_targets);

        for (alpha_idx, alpha) in grid.alphas().iter().enumerate() {
            let wts = self.weights(*alpha);
            let pred = design * &wts;
            for chan in 0..n_targets {
                let r = pearson_or_zero(&pred.column(chan), &targets.column(chan));
                if r > correlations[chan] {
                    correlations[chan] = r;
                    best_alphas[chan] = alpha_idx;
                    weights.set_column(chan, &wts.column(chan));
                }
            }
            trace!("alpha {}: {:.3e} evaluated on {} rows", alpha_idx, alpha, design.nrows());
        }

        Ok(AlphaSelection {
            best_alphas,
            correlations,
            weights,
        })
    }
}

/// Outcome of the per channel strength selection
#[derive(Debug, Clone)]
pub struct AlphaSelection {
    /// Grid index of the chosen strength per channel
    pub best_alphas: Vec<usize>,
    /// Correlation on the selection split reached with the chosen strength
    pub correlations: Vec<f64>,
    /// `F x C` weights of the chosen strength per channel
    pub weights: DMatrix<f64>,
}

/// The train, select and test design/response pairs of one fold
#[derive(Debug, Clone, Copy)]
pub struct SplitData<'a> {
    /// Training design
    pub x_train: &'a DMatrix<f64>,
    /// Training responses
    pub y_train: &'a DMatrix<f64>,
    /// Design used for selecting the strength
    pub x_select: &'a DMatrix<f64>,
    /// Responses used for selecting the strength
    pub y_select: &'a DMatrix<f64>,
    /// Held out design
    pub x_test: &'a DMatrix<f64>,
    /// Held out responses
    pub y_test: &'a DMatrix<f64>,
}

/// The selected model of a single channel within one fold
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelModel {
    /// Index into the alpha grid
    pub alpha_index: usize,
    /// The weight vector of length F
    pub weights: DVector<f64>,
    /// Pearson's r on the test split, 0 when undefined
    pub test_correlation: f64,
}

/// Per channel result of fitting, selecting and scoring one fold.
/// `None` marks a channel without valid samples in one of the splits.
#[derive(Debug, Clone)]
pub struct RidgeCvFit {
    channels: Vec<Option<ChannelModel>>,
    num_features: usize,
}

impl RidgeCvFit {
    /// The per channel models
    #[inline(always)]
    pub fn channels(&self) -> &[Option<ChannelModel>] {
        &self.channels
    }

    /// Number of design columns every weight vector has
    #[inline(always)]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Test correlation per channel, NaN for degenerate channels
    pub fn test_correlations(&self) -> Vec<f64> {
        self.channels
            .iter()
            .map(|m| m.as_ref().map_or(f64::NAN, |m| m.test_correlation))
            .collect()
    }

    /// Selected grid index per channel, NaN for degenerate channels
    pub fn best_alphas(&self) -> Vec<f64> {
        self.channels
            .iter()
            .map(|m| m.as_ref().map_or(f64::NAN, |m| m.alpha_index as f64))
            .collect()
    }

    /// `C x F` weights, rows of degenerate channels are NaN
    pub fn weight_matrix(&self) -> DMatrix<f64> {
        let mut out = DMatrix::from_element(self.channels.len(), self.num_features, f64::NAN);
        for (chan, model) in self.channels.iter().enumerate() {
            if let Some(m) = model {
                out.set_row(chan, &m.weights.transpose());
            }
        }
        out
    }
}

/// Fit all strengths on the train split, select one per channel on the select
/// split and score it on the test split.
///
/// Channels are grouped by which rows hold finite responses. Each group shares
/// one decomposition over its valid rows, so a fully observed recording costs
/// exactly one decomposition. A channel lacking any valid row in one of the
/// splits is not fitted and reported as `None`.
pub fn fit_select_score(split: &SplitData, grid: &AlphaGrid) -> Result<RidgeCvFit, LinRegError> {
    let num_features = split.x_train.ncols();
    let num_channels = split.y_train.ncols();
    check_pair(split.x_train, split.y_train, num_features, num_channels, TRAIN)?;
    check_pair(split.x_select, split.y_select, num_features, num_channels, SELECT)?;
    check_pair(split.x_test, split.y_test, num_features, num_channels, TEST)?;

    let mut groups: BTreeMap<[Vec<usize>; 3], Vec<usize>> = BTreeMap::new();
    let mut channels: Vec<Option<ChannelModel>> = vec![None; num_channels];
    for chan in 0..num_channels {
        let rows = [
            finite_rows(split.y_train, chan),
            finite_rows(split.y_select, chan),
            finite_rows(split.y_test, chan),
        ];
        if rows.iter().any(|r| r.is_empty()) {
            warn!("channel {} has no valid samples in one of the splits, skipping it", chan);
            continue;
        }
        groups.entry(rows).or_default().push(chan);
    }
    debug!("fitting {} channels in {} row groups", num_channels, groups.len());

    for ([train_rows, select_rows, test_rows], chans) in groups.iter() {
        let x_train = split.x_train.select_rows(train_rows);
        let y_train = split.y_train.select_rows(train_rows).select_columns(chans);
        let x_select = split.x_select.select_rows(select_rows);
        let y_select = split.y_select.select_rows(select_rows).select_columns(chans);
        let x_test = split.x_test.select_rows(test_rows);
        let y_test = split.y_test.select_rows(test_rows).select_columns(chans);

        let ridge = MultiAlphaRidge::new(&x_train, &y_train)?;
        let selection = ridge.select_alphas(grid, &x_select, &y_select)?;
        let test_pred = &x_test * &selection.weights;

        for (i, chan) in chans.iter().enumerate() {
            channels[*chan] = Some(ChannelModel {
                alpha_index: selection.best_alphas[i],
                weights: selection.weights.column(i).into_owned(),
                test_correlation: pearson_or_zero(&test_pred.column(i), &y_test.column(i)),
            });
        }
    }

    Ok(RidgeCvFit {
        channels,
        num_features,
    })
}

fn finite_rows(m: &DMatrix<f64>, col: usize) -> Vec<usize> {
    m.column(col)
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, _)| i)
        .collect()
}

fn check_pair(
    design: &DMatrix<f64>,
    targets: &DMatrix<f64>,
    num_features: usize,
    num_targets: usize,
    what: [&'static str; 3],
) -> Result<(), LinRegError> {
    if design.ncols() != num_features {
        return Err(LinRegError::ShapeMismatch {
            what: what[0],
            expected: num_features,
            got: design.ncols(),
        });
    }
    if design.nrows() != targets.nrows() {
        return Err(LinRegError::ShapeMismatch {
            what: what[1],
            expected: design.nrows(),
            got: targets.nrows(),
        });
    }
    if targets.ncols() != num_targets {
        return Err(LinRegError::ShapeMismatch {
            what: what[2],
            expected: num_targets,
            got: targets.ncols(),
        });
    }
    Ok(())
}
