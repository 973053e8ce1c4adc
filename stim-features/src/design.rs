use common::{Error, Result};
use nalgebra::DMatrix;

use crate::{EncodingEdges, FeatureBlock, FeatureVariant};

/// Column of the absolute pitch in the raw feature matrix
pub const ABS_PITCH: usize = 0;
/// Column of the relative pitch in the raw feature matrix
pub const REL_PITCH: usize = 1;
/// Column of the z-scored intensity in the raw feature matrix
pub const INTENSITY: usize = 2;
/// Column of the time offset within the stimulus, in seconds, in the raw feature matrix
pub const TIME_OFFSET: usize = 3;
/// Column of the absolute pitch change in the raw feature matrix
pub const PITCH_CHANGE: usize = 4;
/// Number of columns of the raw feature matrix
pub const NUM_RAW_FEATURES: usize = 5;

/// Build the design matrix of a feature variant, before delay embedding
///
/// # Arguments:
/// raw: `T x NUM_RAW_FEATURES` continuous features, NaN pitch marks unvoiced samples
/// edges: The frozen bin edges of the pitch features
/// variant: Which blocks to concatenate
/// sample_rate: Rate the time offsets were sampled at, used to detect onsets
pub fn construct_design(
    raw: &DMatrix<f64>,
    edges: &EncodingEdges,
    variant: FeatureVariant,
    sample_rate: f64,
) -> Result<DMatrix<f64>> {
    if raw.ncols() != NUM_RAW_FEATURES {
        return Err(Error::shape("raw stimulus feature columns", NUM_RAW_FEATURES, raw.ncols()));
    }
    let n_rows = raw.nrows();
    let num_bins = edges.num_bins();
    let column = |c: usize| -> Vec<f64> { raw.column(c).iter().copied().collect() };

    let rel_bins = edges.rel_pitch().encode(&column(REL_PITCH));
    let mut design: DMatrix<f64> = DMatrix::zeros(n_rows, variant.num_columns(num_bins));
    let mut offset = 0;
    for block in variant.blocks() {
        let width = block.num_columns(num_bins);
        match block {
            FeatureBlock::AbsPitch => {
                let bins = edges.abs_pitch().encode(&column(ABS_PITCH));
                design.columns_mut(offset, width).copy_from(&bins);
            }
            FeatureBlock::RelPitch => {
                design.columns_mut(offset, width).copy_from(&rel_bins);
            }
            FeatureBlock::PitchChange => {
                let bins = edges.pitch_change().encode(&column(PITCH_CHANGE));
                design.columns_mut(offset, width).copy_from(&bins);
            }
            FeatureBlock::Voiced => {
                for t in 0..n_rows {
                    if rel_bins.row(t).iter().any(|v| *v != 0.0) {
                        design[(t, offset)] = 1.0;
                    }
                }
            }
            FeatureBlock::Intensity => {
                for t in 0..n_rows {
                    design[(t, offset)] = raw[(t, INTENSITY)] / 2.0 + 0.75;
                }
            }
            FeatureBlock::Onset => {
                for t in 0..n_rows {
                    if (raw[(t, TIME_OFFSET)] * sample_rate).round() == 1.0 {
                        design[(t, offset)] = 1.0;
                    }
                }
            }
            FeatureBlock::Bias => {
                design.column_mut(offset).fill(1.0);
            }
        }
        offset += width;
    }
    debug!("constructed {} design of {}x{}", variant, design.nrows(), design.ncols());

    Ok(design)
}
