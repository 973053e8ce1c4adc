use common::{FoldScheme, Result};
use lin_reg::{fit_select_score, AlphaGrid, RidgeCvFit, SplitData};
use nalgebra::DMatrix;
use stim_features::{Delays, EncodingEdges, FeatureVariant};

use crate::{Corpus, FoldSplit, SplitRole};

const ROLES: [SplitRole; 3] = [SplitRole::Train, SplitRole::Select, SplitRole::Test];

/// The frozen, read only inputs every fold is fitted with
#[derive(Debug, Clone)]
pub struct FitContext {
    /// Bin edges of the pitch features
    pub edges: EncodingEdges,
    /// Ridge strengths to select from
    pub grid: AlphaGrid,
    /// Lags of the delay embedding
    pub delays: Delays,
    /// Sampling rate in Hz
    pub sample_rate: f64,
}

/// Fit, select and score every variant on one fold of a corpus.
/// Returns one fit per variant, in the order of `variants`.
pub fn fit_fold(
    ctx: &FitContext,
    corpus: &Corpus,
    scheme: FoldScheme,
    fold: usize,
    variants: &[FeatureVariant],
) -> Result<Vec<RidgeCvFit>> {
    let mut fits = Vec::with_capacity(variants.len());
    match scheme {
        FoldScheme::Stratified { .. } => {
            let split = FoldSplit::stratified(corpus.trial_starts(), corpus.num_rows())?;
            let rows: Vec<Vec<usize>> =
                ROLES.iter().map(|role| corpus.rows_with_intensity(split.rows(*role))).collect();
            let resps: Vec<DMatrix<f64>> = rows.iter().map(|r| corpus.responses_of(r)).collect();
            for variant in variants {
                let designs = rows
                    .iter()
                    .map(|r| corpus.design(r, &ctx.edges, &ctx.delays, *variant, ctx.sample_rate))
                    .collect::<Result<Vec<DMatrix<f64>>>>()?;
                fits.push(fit_split(ctx, &designs, &resps)?);
                info!("fold {}: fitted {}", fold, variant);
            }
        }
        FoldScheme::KFold { k } => {
            let kept = corpus.rows_with_intensity(0..corpus.num_rows());
            let split = FoldSplit::k_fold(kept.len(), k, fold)?;
            let responses = corpus.responses_of(&kept);
            let resps: Vec<DMatrix<f64>> =
                ROLES.iter().map(|role| responses.select_rows(&split.rows(*role))).collect();
            for variant in variants {
                let design =
                    corpus.design(&kept, &ctx.edges, &ctx.delays, *variant, ctx.sample_rate)?;
                let designs: Vec<DMatrix<f64>> =
                    ROLES.iter().map(|role| design.select_rows(&split.rows(*role))).collect();
                fits.push(fit_split(ctx, &designs, &resps)?);
                info!("fold {}: fitted {}", fold, variant);
            }
        }
    }

    Ok(fits)
}

fn fit_split(ctx: &FitContext, designs: &[DMatrix<f64>], resps: &[DMatrix<f64>]) -> Result<RidgeCvFit> {
    debug!(
        "split rows: train {}, select {}, test {}, {} features",
        designs[0].nrows(),
        designs[1].nrows(),
        designs[2].nrows(),
        designs[0].ncols()
    );
    let split = SplitData {
        x_train: &designs[0],
        y_train: &resps[0],
        x_select: &designs[1],
        y_select: &resps[1],
        x_test: &designs[2],
        y_test: &resps[2],
    };

    Ok(fit_select_score(&split, &ctx.grid)?)
}
