use common::{Error, Result};
use nalgebra::DMatrix;

/// Values outside the edges are moved this far inside before binning, at most
/// half the width of the outer bin
const CLIP_MARGIN: f64 = 1e-4;

/// Strictly increasing edges of `B` equal width bins
#[derive(Debug, Clone, PartialEq)]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    /// Use explicit edges
    ///
    /// # Errors
    /// If there are fewer than two edges or they are not strictly increasing
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::InvalidBinEdges(format!("{} edges make no bin", edges.len())));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(Error::InvalidBinEdges("edges must be finite".to_string()));
        }
        if let Some(w) = edges.windows(2).find(|w| w[1] <= w[0]) {
            return Err(Error::InvalidBinEdges(format!("{} does not exceed {}", w[1], w[0])));
        }
        Ok(Self { edges })
    }

    /// Equal width bins spanning the central `percent` of the values.
    /// NaN values are ignored.
    ///
    /// # Arguments:
    /// values: The reference distribution
    /// bins: Number of bins
    /// percent: The central percentage covered, in (1, 100)
    pub fn fit(values: &[f64], bins: usize, percent: f64) -> Result<Self> {
        if bins == 0 {
            return Err(Error::InvalidBinEdges("zero bins requested".to_string()));
        }
        if !(percent > 1.0 && percent < 100.0) {
            return Err(Error::InvalidBinEdges(format!("percent {percent} outside (1, 100)")));
        }
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return Err(Error::InvalidBinEdges("no finite reference values".to_string()));
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let tail = (100.0 - percent) / 2.0;
        let mut lo = percentile(&sorted, tail);
        let mut hi = percentile(&sorted, 100.0 - tail);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        debug!("fitted {} bins over [{:.4}, {:.4}] from {} values", bins, lo, hi, sorted.len());

        Self::new(edges)
    }

    /// Number of bins
    #[inline(always)]
    pub fn num_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// The edges, one more than there are bins
    #[inline(always)]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Index of the bin a value falls into after clipping it inside the
    /// edges, `None` for NaN.
    /// Bin `i` covers `[edge_i, edge_{i+1})`, the last bin also holds its upper edge.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        let n = self.edges.len();
        let (first, last) = (self.edges[0], self.edges[n - 1]);
        let v = if value < first {
            first + CLIP_MARGIN.min((self.edges[1] - first) / 2.0)
        } else if value > last {
            last - CLIP_MARGIN.min((last - self.edges[n - 2]) / 2.0)
        } else {
            value
        };
        let idx = self.edges.partition_point(|e| *e <= v).saturating_sub(1);

        Some(idx.min(self.num_bins() - 1))
    }

    /// One hot `N x B` encoding of the values.
    /// A NaN value, i.e. an unvoiced sample, yields an all zero row.
    pub fn encode(&self, values: &[f64]) -> DMatrix<f64> {
        let mut out: DMatrix<f64> = DMatrix::zeros(values.len(), self.num_bins());
        for (row, v) in values.iter().enumerate() {
            if let Some(col) = self.bin_index(*v) {
                out[(row, col)] = 1.0;
            }
        }
        out
    }
}

/// Linear interpolation between the closest ranks of sorted values
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// The bin edges of every binned pitch feature.
///
/// Fitted once on the complete reference corpus and then shared read only by
/// every fold and permutation. Refitting on fold data would leak the test
/// split into the encoding, so there is no way to alter the edges afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingEdges {
    abs_pitch: BinEdges,
    rel_pitch: BinEdges,
    pitch_change: BinEdges,
}

impl EncodingEdges {
    /// Fit all edge sets on the reference distributions
    pub fn fit(
        abs_pitch: &[f64],
        rel_pitch: &[f64],
        pitch_change: &[f64],
        bins: usize,
        percent: f64,
    ) -> Result<Self> {
        Ok(Self {
            abs_pitch: BinEdges::fit(abs_pitch, bins, percent)?,
            rel_pitch: BinEdges::fit(rel_pitch, bins, percent)?,
            pitch_change: BinEdges::fit(pitch_change, bins, percent)?,
        })
    }

    /// Use edges that were fitted elsewhere, they must agree in bin count
    pub fn from_edges(abs_pitch: BinEdges, rel_pitch: BinEdges, pitch_change: BinEdges) -> Result<Self> {
        for other in [&rel_pitch, &pitch_change] {
            if other.num_bins() != abs_pitch.num_bins() {
                return Err(Error::shape("bins per pitch feature", abs_pitch.num_bins(), other.num_bins()));
            }
        }
        Ok(Self {
            abs_pitch,
            rel_pitch,
            pitch_change,
        })
    }

    /// Bins per pitch feature
    #[inline(always)]
    pub fn num_bins(&self) -> usize {
        self.abs_pitch.num_bins()
    }

    /// Edges of the absolute pitch
    #[inline(always)]
    pub fn abs_pitch(&self) -> &BinEdges {
        &self.abs_pitch
    }

    /// Edges of the relative pitch
    #[inline(always)]
    pub fn rel_pitch(&self) -> &BinEdges {
        &self.rel_pitch
    }

    /// Edges of the pitch change
    #[inline(always)]
    pub fn pitch_change(&self) -> &BinEdges {
        &self.pitch_change
    }
}

#[cfg(test)]
mod tests {
    use round::round;

    use super::*;

    #[test]
    fn bin_edges_fit_percent_range() {
        if let Err(_) = pretty_env_logger::try_init() {}

        let values: Vec<f64> = (0..=100).map(|v| v as f64).collect();
        let edges = BinEdges::fit(&values, 10, 90.0).unwrap();
        let rounded: Vec<f64> = edges.edges().iter().map(|e| round(*e, 6)).collect();

        assert_eq!(edges.num_bins(), 10);
        assert_eq!(
            rounded,
            vec![5.0, 14.0, 23.0, 32.0, 41.0, 50.0, 59.0, 68.0, 77.0, 86.0, 95.0]
        );
    }

    #[test]
    fn bin_edges_fit_ignores_nan() {
        let edges = BinEdges::fit(&[f64::NAN, 1.0, 2.0, 3.0, f64::NAN], 2, 50.0).unwrap();

        assert_eq!(edges.edges(), &[1.5, 2.0, 2.5]);
    }

    #[test]
    fn bin_edges_fit_constant_values() {
        let edges = BinEdges::fit(&[4.0; 10], 2, 95.0).unwrap();

        assert_eq!(edges.edges(), &[3.5, 4.0, 4.5]);
    }

    #[test]
    fn bin_encoder_one_hot_inside() {
        let edges = BinEdges::new((0..=10).map(|e| e as f64).collect()).unwrap();
        let values = [0.0, 0.5, 3.2, 9.99, 10.0, 5.0];
        let m = edges.encode(&values);

        assert_eq!(m.shape(), (6, 10));
        for row in 0..m.nrows() {
            assert_eq!(m.row(row).sum(), 1.0);
        }
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(2, 3)], 1.0);
        assert_eq!(m[(3, 9)], 1.0);
        assert_eq!(m[(4, 9)], 1.0);
        assert_eq!(m[(5, 5)], 1.0);
    }

    #[test]
    fn bin_encoder_clips_outliers() {
        let edges = BinEdges::new(vec![-1.0, 0.0, 1.0]).unwrap();
        let m = edges.encode(&[-100.0, 100.0, f64::INFINITY, f64::NEG_INFINITY]);

        assert_eq!(m.row(0).iter().copied().collect::<Vec<f64>>(), vec![1.0, 0.0]);
        assert_eq!(m.row(1).iter().copied().collect::<Vec<f64>>(), vec![0.0, 1.0]);
        assert_eq!(m.row(2).iter().copied().collect::<Vec<f64>>(), vec![0.0, 1.0]);
        assert_eq!(m.row(3).iter().copied().collect::<Vec<f64>>(), vec![1.0, 0.0]);
    }

    #[test]
    fn bin_encoder_clips_into_narrow_outer_bins() {
        let edges = BinEdges::new(vec![0.0, 1e-6, 2e-6, 3e-6]).unwrap();

        assert_eq!(edges.bin_index(-5.0), Some(0));
        assert_eq!(edges.bin_index(5.0), Some(2));
        assert_eq!(edges.bin_index(1.5e-6), Some(1));
    }

    #[test]
    fn bin_encoder_unvoiced_row_is_empty() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        let m = edges.encode(&[f64::NAN, 1.5]);

        assert_eq!(m.row(0).sum(), 0.0);
        assert_eq!(m.row(1).sum(), 1.0);
    }

    #[test]
    fn bin_edges_reject_unordered() {
        assert!(BinEdges::new(vec![0.0]).is_err());
        assert!(BinEdges::new(vec![0.0, 0.0]).is_err());
        assert!(BinEdges::new(vec![1.0, 0.0]).is_err());
        assert!(BinEdges::fit(&[f64::NAN], 10, 95.0).is_err());
    }

    #[test]
    fn encoding_edges_require_equal_bins() {
        let two = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        let three = BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();

        assert!(EncodingEdges::from_edges(two.clone(), two.clone(), three).is_err());
        assert_eq!(EncodingEdges::from_edges(two.clone(), two.clone(), two).unwrap().num_bins(), 2);
    }
}
