use std::{cmp::max, collections::BTreeMap, sync::Arc};

use common::{nan_mean, Error, FoldScheme, Params, Result};
use crossbeam::channel::unbounded;
use lin_reg::RidgeCvFit;
use nalgebra::DMatrix;
use ndarray::{Array1, Array3, ArrayD};
use stim_features::{Delays, EncodingEdges, FeatureVariant};
use threadpool::ThreadPool;

use crate::{
    fit_fold, store::matrix_array, Corpus, FitContext, FoldOrderings, ResultStore, StimulusTable,
    SubjectRecordings,
};

/// A comparison of a full model against one lacking a feature family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contrast {
    /// Key the contrast is stored under
    pub name: &'static str,
    /// The model with all features
    pub full: FeatureVariant,
    /// The model lacking the feature family of interest
    pub reduced: FeatureVariant,
}

/// The analyses that can be run, each a full variant and the contrasts
/// against its reduced variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analysis {
    /// Unique contributions of absolute and relative pitch
    AbsVersusRel,
    /// Unique contributions of relative pitch and pitch change
    RelVersusChange,
}

impl Analysis {
    /// The name the contrasts of this analysis are stored under
    pub fn name(&self) -> &'static str {
        match self {
            Analysis::AbsVersusRel => "abs_versus_rel",
            Analysis::RelVersusChange => "rel_versus_change",
        }
    }

    /// The fitted variants, the full one first
    pub fn variants(&self) -> [FeatureVariant; 3] {
        match self {
            Analysis::AbsVersusRel => {
                [FeatureVariant::All, FeatureVariant::AbsBin, FeatureVariant::RelBin]
            }
            Analysis::RelVersusChange => [
                FeatureVariant::AllWithChange,
                FeatureVariant::AbsRel,
                FeatureVariant::AbsChange,
            ],
        }
    }

    /// The variant with all features
    #[inline(always)]
    pub fn full_variant(&self) -> FeatureVariant {
        self.variants()[0]
    }

    /// Each contrast names the feature family whose unique share it measures
    pub fn contrasts(&self) -> [Contrast; 2] {
        let full = self.full_variant();
        match self {
            Analysis::AbsVersusRel => [
                Contrast {
                    name: "r2_abs",
                    full,
                    reduced: FeatureVariant::RelBin,
                },
                Contrast {
                    name: "r2_rel",
                    full,
                    reduced: FeatureVariant::AbsBin,
                },
            ],
            Analysis::RelVersusChange => [
                Contrast {
                    name: "r2_rel",
                    full,
                    reduced: FeatureVariant::AbsChange,
                },
                Contrast {
                    name: "r2_change",
                    full,
                    reduced: FeatureVariant::AbsRel,
                },
            ],
        }
    }
}

impl std::fmt::Display for Analysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The per fold results of one variant
#[derive(Debug, Clone)]
pub struct FoldResults {
    variant: FeatureVariant,
    correlations: DMatrix<f64>,
    best_alphas: DMatrix<f64>,
    weights: Vec<DMatrix<f64>>,
}

impl FoldResults {
    /// NaN filled results of `num_folds` folds
    pub fn new(
        variant: FeatureVariant,
        num_channels: usize,
        num_features: usize,
        num_folds: usize,
    ) -> Self {
        Self {
            variant,
            correlations: DMatrix::from_element(num_channels, num_folds, f64::NAN),
            best_alphas: DMatrix::from_element(num_channels, num_folds, f64::NAN),
            weights: vec![
                DMatrix::from_element(num_channels, num_features, f64::NAN);
                num_folds
            ],
        }
    }

    /// Record the fit of one fold
    pub fn insert(&mut self, fold: usize, fit: &RidgeCvFit) -> Result<()> {
        if fold >= self.num_folds() {
            return Err(Error::shape("fold index bound", self.num_folds(), fold));
        }
        let weights = fit.weight_matrix();
        if weights.shape() != self.weights[fold].shape() {
            return Err(Error::shape(
                format!("{} weight columns", self.variant),
                self.weights[fold].ncols(),
                weights.ncols(),
            ));
        }
        for (chan, (r, a)) in fit.test_correlations().into_iter().zip(fit.best_alphas()).enumerate() {
            self.correlations[(chan, fold)] = r;
            self.best_alphas[(chan, fold)] = a;
        }
        self.weights[fold] = weights;

        Ok(())
    }

    /// The variant these results belong to
    #[inline(always)]
    pub fn variant(&self) -> FeatureVariant {
        self.variant
    }

    /// Number of folds
    #[inline(always)]
    pub fn num_folds(&self) -> usize {
        self.weights.len()
    }

    /// `C x folds` test correlations
    #[inline(always)]
    pub fn correlations(&self) -> &DMatrix<f64> {
        &self.correlations
    }

    /// `C x folds` selected alpha grid indices
    #[inline(always)]
    pub fn best_alphas(&self) -> &DMatrix<f64> {
        &self.best_alphas
    }

    /// `C x F` weights of one fold
    #[inline(always)]
    pub fn weights(&self, fold: usize) -> Option<&DMatrix<f64>> {
        self.weights.get(fold)
    }

    /// `C x F` weights averaged over the folds, NaN excluded
    pub fn mean_weights(&self) -> DMatrix<f64> {
        let (rows, cols) = (self.correlations.nrows(), self.feature_count());
        DMatrix::from_fn(rows, cols, |c, f| nan_mean(self.weights.iter().map(|w| w[(c, f)])))
    }

    /// Per channel mean over folds of the squared test correlation
    pub fn mean_squared_correlation(&self) -> Vec<f64> {
        self.correlations
            .row_iter()
            .map(|row| nan_mean(row.iter().map(|r| r * r)))
            .collect()
    }

    /// The arrays stored for this variant: `r` (C x folds), `wts`
    /// (C x F x folds) and `best_alpha` (C x folds)
    pub fn to_arrays(&self) -> BTreeMap<String, ArrayD<f64>> {
        let (num_channels, num_features, num_folds) =
            (self.correlations.nrows(), self.feature_count(), self.num_folds());
        let wts = Array3::from_shape_fn((num_channels, num_features, num_folds), |(c, f, k)| {
            self.weights[k][(c, f)]
        });

        let mut arrays = BTreeMap::new();
        arrays.insert("r".to_string(), matrix_array(&self.correlations));
        arrays.insert("wts".to_string(), wts.into_dyn());
        arrays.insert("best_alpha".to_string(), matrix_array(&self.best_alphas));
        arrays
    }

    fn feature_count(&self) -> usize {
        self.weights.first().map_or(0, |w| w.ncols())
    }
}

/// Predict every channel's response to a delay embedded design
///
/// # Arguments:
/// weights: `C x F`, e.g. from [`FoldResults::mean_weights`]
/// design: `T x F`
///
/// # Returns:
/// `C x T` predictions
pub fn predict(weights: &DMatrix<f64>, design: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if weights.ncols() != design.ncols() {
        return Err(Error::shape("prediction design columns", weights.ncols(), design.ncols()));
    }
    Ok(weights * design.transpose())
}

/// Everything one cross validated analysis produced
#[derive(Debug, Clone)]
pub struct CvOutcome {
    analysis: Analysis,
    results: Vec<FoldResults>,
    contrasts: BTreeMap<&'static str, Vec<f64>>,
}

impl CvOutcome {
    fn new(analysis: Analysis, results: Vec<FoldResults>) -> Self {
        let mut contrasts = BTreeMap::new();
        for contrast in analysis.contrasts() {
            let full = results.iter().find(|r| r.variant == contrast.full);
            let reduced = results.iter().find(|r| r.variant == contrast.reduced);
            if let (Some(full), Some(reduced)) = (full, reduced) {
                // squared correlation differences approximate the unique explained variance
                let values = full
                    .correlations
                    .row_iter()
                    .zip(reduced.correlations.row_iter())
                    .map(|(f, r)| nan_mean(f.iter().zip(r.iter()).map(|(f, r)| f * f - r * r)))
                    .collect();
                contrasts.insert(contrast.name, values);
            }
        }

        Self {
            analysis,
            results,
            contrasts,
        }
    }

    /// The analysis that was run
    #[inline(always)]
    pub fn analysis(&self) -> Analysis {
        self.analysis
    }

    /// Results of all variants, the full one first
    #[inline(always)]
    pub fn results(&self) -> &[FoldResults] {
        &self.results
    }

    /// Results of the variant with all features
    #[inline(always)]
    pub fn full(&self) -> &FoldResults {
        &self.results[0]
    }

    /// Results of one variant
    pub fn variant(&self, variant: FeatureVariant) -> Option<&FoldResults> {
        self.results.iter().find(|r| r.variant == variant)
    }

    /// Per channel value of a contrast, averaged over folds
    pub fn contrast(&self, name: &str) -> Option<&[f64]> {
        self.contrasts.get(name).map(|c| c.as_slice())
    }

    /// All contrasts by name
    #[inline(always)]
    pub fn contrasts(&self) -> &BTreeMap<&'static str, Vec<f64>> {
        &self.contrasts
    }

    /// Write every variant under its own name and the contrasts under the
    /// analysis name
    pub fn save<S: ResultStore>(&self, store: &S, subject: &str) -> Result<()> {
        for result in self.results.iter() {
            store.save(subject, result.variant.name(), &result.to_arrays())?;
        }
        let contrasts = self
            .contrasts
            .iter()
            .map(|(name, values)| (name.to_string(), Array1::from_vec(values.clone()).into_dyn()))
            .collect();
        store.save(subject, self.analysis.name(), &contrasts)
    }
}

/// Runs the fold loop of an analysis over a subject's recordings
#[derive(Debug, Clone)]
pub struct CrossValidation {
    params: Params,
    ctx: Arc<FitContext>,
}

impl CrossValidation {
    /// Freeze the parameters and the bin edges for all following runs
    ///
    /// # Arguments:
    /// params: Validated before use
    /// edges: Fitted once on the reference stimulus table
    pub fn new(params: Params, edges: EncodingEdges) -> Result<Self> {
        params.validate()?;
        if edges.num_bins() != params.num_bins {
            return Err(Error::InvalidConfig(format!(
                "edges hold {} bins, parameters ask for {}",
                edges.num_bins(),
                params.num_bins
            )));
        }
        let mut delays = Delays::from_seconds(params.delay_seconds, params.sample_rate)?;
        if params.boundary_lags {
            delays = delays.with_boundary();
        }
        let ctx = FitContext {
            edges,
            grid: params.alpha_grid()?,
            delays,
            sample_rate: params.sample_rate,
        };

        Ok(Self {
            params,
            ctx: Arc::new(ctx),
        })
    }

    /// The parameters of this run
    #[inline(always)]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The frozen inputs shared by every fold
    #[inline(always)]
    pub fn context(&self) -> &FitContext {
        &self.ctx
    }

    /// Run all folds of an analysis and aggregate them
    ///
    /// # Errors
    /// MissingArtifact before any fitting if a fold ordering or stimulus is absent,
    /// ShapeMismatch if a design does not have the width its variant implies
    pub fn run(
        &self,
        analysis: Analysis,
        recordings: &SubjectRecordings,
        table: &StimulusTable,
        orderings: &FoldOrderings,
    ) -> Result<CvOutcome> {
        self.check_artifacts(recordings, table, orderings)?;
        let corpora = self.corpora(recordings, table, orderings)?;
        info!(
            "running {} on {} with {} folds",
            analysis,
            recordings.subject(),
            corpora.len()
        );
        let variants = analysis.variants();
        let fits = self.fit_folds(&corpora, &variants)?;

        let num_features = |v: FeatureVariant| v.num_features(self.ctx.edges.num_bins(), self.ctx.delays.len());
        let mut results: Vec<FoldResults> = variants
            .iter()
            .map(|v| FoldResults::new(*v, recordings.num_channels(), num_features(*v), fits.len()))
            .collect();
        for (fold, fold_fits) in fits.iter().enumerate() {
            for (result, fit) in results.iter_mut().zip(fold_fits.iter()) {
                result.insert(fold, fit)?;
            }
        }

        Ok(CvOutcome::new(analysis, results))
    }

    /// Run an analysis and persist its outcome under the subject's id
    pub fn run_and_save<S: ResultStore>(
        &self,
        analysis: Analysis,
        recordings: &SubjectRecordings,
        table: &StimulusTable,
        orderings: &FoldOrderings,
        store: &S,
    ) -> Result<CvOutcome> {
        let outcome = self.run(analysis, recordings, table, orderings)?;
        outcome.save(store, recordings.subject())?;
        info!("saved {} results of {}", analysis, recordings.subject());

        Ok(outcome)
    }

    /// Check every fold ordering exists and every stimulus used has features
    pub(crate) fn check_artifacts(
        &self,
        recordings: &SubjectRecordings,
        table: &StimulusTable,
        orderings: &FoldOrderings,
    ) -> Result<()> {
        let mut used: Vec<&String> = Vec::new();
        match self.params.fold_scheme {
            FoldScheme::Stratified { num_folds } => {
                for fold in 0..num_folds {
                    used.extend(orderings.get(fold)?.iter().filter(|id| recordings.get(id).is_some()));
                }
            }
            FoldScheme::KFold { .. } => used.extend(recordings.stimulus_ids()),
        }
        match used.into_iter().find(|id| table.get(id).is_none()) {
            Some(id) => Err(Error::MissingArtifact(format!("stimulus features of {id}"))),
            None => Ok(()),
        }
    }

    /// Extract one corpus per fold.
    /// K-fold runs share a single corpus in recording order.
    pub(crate) fn corpora(
        &self,
        recordings: &SubjectRecordings,
        table: &StimulusTable,
        orderings: &FoldOrderings,
    ) -> Result<Vec<Arc<Corpus>>> {
        match self.params.fold_scheme {
            FoldScheme::Stratified { num_folds } => {
                let ords = (0..num_folds).map(|f| orderings.get(f)).collect::<Result<Vec<_>>>()?;
                ords.into_iter()
                    .map(|o| Corpus::extract(recordings, table, o, &self.params).map(Arc::new))
                    .collect()
            }
            FoldScheme::KFold { k } => {
                let corpus = Arc::new(Corpus::extract(
                    recordings,
                    table,
                    recordings.stimulus_ids(),
                    &self.params,
                )?);
                Ok(vec![corpus; k])
            }
        }
    }

    /// Fit the folds in parallel, results are ordered by fold index
    fn fit_folds(
        &self,
        corpora: &[Arc<Corpus>],
        variants: &[FeatureVariant],
    ) -> Result<Vec<Vec<RidgeCvFit>>> {
        let pool = ThreadPool::new(self.num_threads());
        let scheme = self.params.fold_scheme;

        let (ch_fit_s, ch_fit_r) = unbounded();
        for (fold, corpus) in corpora.iter().enumerate() {
            let ch_fit_s = ch_fit_s.clone();
            let ctx = self.ctx.clone();
            let corpus = corpus.clone();
            let variants = variants.to_vec();
            pool.execute(move || {
                let fits = fit_fold(&ctx, &corpus, scheme, fold, &variants);
                // the receiver is gone once another fold failed
                let _ = ch_fit_s.send((fold, fits));
            });
        }
        drop(ch_fit_s);

        // drain every fold before reporting a failure so no job outlives the run
        let mut fits: Vec<Option<Vec<RidgeCvFit>>> = vec![None; corpora.len()];
        let mut failure = None;
        while let Ok((fold, res)) = ch_fit_r.recv() {
            match res {
                Ok(fit) => {
                    fits[fold] = Some(fit);
                    debug!("fold {} done", fold);
                }
                Err(e) => {
                    warn!("fold {} failed: {}", fold, e);
                    failure.get_or_insert(e);
                }
            }
        }
        pool.join();
        if let Some(e) = failure {
            return Err(e);
        }
        fits.into_iter()
            .enumerate()
            .map(|(fold, f)| f.ok_or(Error::FoldAborted(fold)))
            .collect()
    }

    fn num_threads(&self) -> usize {
        self.params.num_threads.unwrap_or_else(|| max(num_cpus::get().saturating_sub(2), 1))
    }
}

#[cfg(test)]
mod tests {
    use lin_reg::{fit_select_score, AlphaGrid, SplitData};
    use round::round;

    use super::*;
    use crate::{StimulusFeatures, Trial};

    fn results(variant: FeatureVariant, correlations: &[f64]) -> FoldResults {
        let mut res = FoldResults::new(variant, 2, 1, correlations.len() / 2);
        res.correlations = DMatrix::from_row_slice(2, correlations.len() / 2, correlations);
        res
    }

    #[test]
    fn analysis_layout() {
        assert_eq!(Analysis::AbsVersusRel.full_variant(), FeatureVariant::All);
        assert_eq!(Analysis::RelVersusChange.full_variant(), FeatureVariant::AllWithChange);
        for analysis in [Analysis::AbsVersusRel, Analysis::RelVersusChange] {
            for contrast in analysis.contrasts() {
                assert_eq!(contrast.full, analysis.full_variant());
                assert!(analysis.variants()[1..].contains(&contrast.reduced));
            }
        }
    }

    #[test]
    fn contrasts_abs_versus_rel() {
        let outcome = CvOutcome::new(
            Analysis::AbsVersusRel,
            vec![
                results(FeatureVariant::All, &[0.5, 0.7, 0.2, f64::NAN]),
                results(FeatureVariant::AbsBin, &[0.3, 0.5, 0.1, 0.1]),
                results(FeatureVariant::RelBin, &[0.4, 0.1, 0.0, 0.2]),
            ],
        );

        let r2_abs: Vec<f64> = outcome.contrast("r2_abs").unwrap().iter().map(|v| round(*v, 6)).collect();
        let r2_rel: Vec<f64> = outcome.contrast("r2_rel").unwrap().iter().map(|v| round(*v, 6)).collect();
        // fold means of r_all^2 - r_rel_bin^2, the NaN fold is excluded
        assert_eq!(r2_abs, vec![0.285, 0.04]);
        assert_eq!(r2_rel, vec![0.2, 0.03]);
        assert_eq!(outcome.contrasts().len(), 2);
    }

    #[test]
    fn contrasts_rel_versus_change_names() {
        let outcome = CvOutcome::new(
            Analysis::RelVersusChange,
            vec![
                results(FeatureVariant::AllWithChange, &[0.5, 0.5]),
                results(FeatureVariant::AbsRel, &[0.4, 0.3]),
                results(FeatureVariant::AbsChange, &[0.2, 0.1]),
            ],
        );

        assert_eq!(round(outcome.contrast("r2_rel").unwrap()[0], 6), 0.21);
        assert_eq!(round(outcome.contrast("r2_change").unwrap()[1], 6), 0.16);
        assert!(outcome.contrast("r2_abs").is_none());
    }

    #[test]
    fn fold_results_insert_and_arrays() {
        if let Err(_) = pretty_env_logger::try_init() {}

        let x = DMatrix::from_fn(40, 2, |i, j| ((i * (j + 2)) as f64 * 0.37).sin());
        let mut y = &x * DMatrix::from_row_slice(2, 2, &[1.0, 0.5, -0.5, 2.0]);
        y.column_mut(1).fill(f64::NAN);
        let split = SplitData {
            x_train: &x,
            y_train: &y,
            x_select: &x,
            y_select: &y,
            x_test: &x,
            y_test: &y,
        };
        let fit = fit_select_score(&split, &AlphaGrid::logspace(-3.0, 0.0, 4).unwrap()).unwrap();

        let mut res = FoldResults::new(FeatureVariant::All, 2, 2, 3);
        res.insert(0, &fit).unwrap();
        res.insert(2, &fit).unwrap();
        assert!(res.insert(3, &fit).is_err());

        assert!(res.correlations()[(0, 0)] > 0.99);
        assert!(res.correlations()[(0, 1)].is_nan());
        assert!(res.correlations()[(1, 0)].is_nan());
        assert_eq!(res.mean_weights().row(0), fit.weight_matrix().row(0));
        assert!(res.mean_weights().row(1).iter().all(|w| w.is_nan()));

        let arrays = res.to_arrays();
        assert_eq!(arrays["r"].shape(), &[2, 3]);
        assert_eq!(arrays["wts"].shape(), &[2, 2, 3]);
        assert_eq!(arrays["best_alpha"].shape(), &[2, 3]);
        assert_eq!(arrays["wts"][[0, 1, 2]], fit.weight_matrix()[(0, 1)]);
        assert!(arrays["wts"][[0, 1, 1]].is_nan());
    }

    #[test]
    fn fold_results_reject_wrong_width() {
        let x = DMatrix::from_fn(20, 3, |i, j| ((i + j) as f64).cos());
        let y = x.columns(0, 1).into_owned();
        let split = SplitData {
            x_train: &x,
            y_train: &y,
            x_select: &x,
            y_select: &y,
            x_test: &x,
            y_test: &y,
        };
        let fit = fit_select_score(&split, &AlphaGrid::default()).unwrap();

        let mut res = FoldResults::new(FeatureVariant::All, 1, 2, 1);
        assert!(matches!(res.insert(0, &fit), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn fit_folds_finish_every_fold_before_failing() {
        if let Err(_) = pretty_env_logger::try_init() {}

        let mut table = StimulusTable::new();
        let mut trials = Vec::new();
        for s in 0..12 {
            let n = 30;
            let rel: Vec<f64> = (0..n).map(|i| ((i + 2 * s) as f64 * 0.2).sin()).collect();
            let abs: Vec<f64> = rel.iter().map(|r| r + (s % 3) as f64).collect();
            let change: Vec<f64> = (0..n).map(|i| ((i + s) as f64 * 0.5).cos()).collect();
            let id = format!("s{s:02}");
            table.insert(id.clone(), StimulusFeatures::new(abs, rel, change, vec![0.0; n]).unwrap());
            let rec = DMatrix::from_fn(2, n + 10, |c, t| ((t + s) as f64 * 0.2 + c as f64).sin());
            trials.push(Trial {
                stimulus_id: id,
                repetitions: vec![rec],
            });
        }
        let recordings = SubjectRecordings::new("s1", trials).unwrap();
        let ids = recordings.stimulus_ids().to_vec();
        // the second fold holds a single trial, too few to split
        let orderings = FoldOrderings::new(vec![ids.clone(), ids[..1].to_vec(), ids.clone(), ids]);
        let params = Params {
            delay_seconds: 0.03,
            num_bins: 4,
            num_alphas: 3,
            response_offset: 2,
            fold_scheme: FoldScheme::Stratified { num_folds: 4 },
            num_threads: Some(2),
            ..Default::default()
        };
        let edges = table.fit_encoding(&params).unwrap();
        let cv = CrossValidation::new(params, edges).unwrap();
        let corpora = cv.corpora(&recordings, &table, &orderings).unwrap();

        let res = cv.fit_folds(&corpora, &Analysis::AbsVersusRel.variants());

        assert!(matches!(res, Err(Error::InvalidConfig(_))));
        // no job still holds its corpus
        assert!(corpora.iter().all(|c| Arc::strong_count(c) == 1));
    }

    #[test]
    fn predict_channels_by_time() {
        let weights = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.5, 0.5]);
        let design = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let pred = predict(&weights, &design).unwrap();

        assert_eq!(pred, DMatrix::from_row_slice(2, 3, &[1.0, 3.0, 5.0, 1.5, 3.5, 5.5]));
        assert!(predict(&weights, &DMatrix::zeros(3, 3)).is_err());
    }
}
