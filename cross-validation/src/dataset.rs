use std::collections::{BTreeMap, HashMap};

use common::{Error, Params, Result};
use nalgebra::DMatrix;
use stim_features::{
    construct_design, Delays, EncodingEdges, FeatureVariant, ABS_PITCH, INTENSITY,
    NUM_RAW_FEATURES, PITCH_CHANGE, REL_PITCH, TIME_OFFSET,
};

/// The continuous features of one stimulus, all sampled at the same rate.
/// Pitch values are NaN where the stimulus is unvoiced.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusFeatures {
    abs_pitch: Vec<f64>,
    rel_pitch: Vec<f64>,
    pitch_change: Vec<f64>,
    intensity: Vec<f64>,
}

impl StimulusFeatures {
    /// Bundle the feature contours, they must have the same length
    pub fn new(
        abs_pitch: Vec<f64>,
        rel_pitch: Vec<f64>,
        pitch_change: Vec<f64>,
        intensity: Vec<f64>,
    ) -> Result<Self> {
        let len = abs_pitch.len();
        for (what, other) in [
            ("relative pitch samples", rel_pitch.len()),
            ("pitch change samples", pitch_change.len()),
            ("intensity samples", intensity.len()),
        ] {
            if other != len {
                return Err(Error::shape(what, len, other));
            }
        }
        Ok(Self {
            abs_pitch,
            rel_pitch,
            pitch_change,
            intensity,
        })
    }

    /// Number of samples
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.abs_pitch.len()
    }

    /// Whether the stimulus holds no samples
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.abs_pitch.is_empty()
    }

    /// Absolute pitch contour
    #[inline(always)]
    pub fn abs_pitch(&self) -> &[f64] {
        &self.abs_pitch
    }

    /// Relative pitch contour
    #[inline(always)]
    pub fn rel_pitch(&self) -> &[f64] {
        &self.rel_pitch
    }

    /// Absolute pitch change contour
    #[inline(always)]
    pub fn pitch_change(&self) -> &[f64] {
        &self.pitch_change
    }

    /// z-scored intensity contour
    #[inline(always)]
    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }
}

/// The features of every stimulus, keyed by stimulus id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StimulusTable {
    stimuli: BTreeMap<String, StimulusFeatures>,
}

impl StimulusTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the features of a stimulus
    pub fn insert(&mut self, id: impl Into<String>, features: StimulusFeatures) {
        self.stimuli.insert(id.into(), features);
    }

    /// The features of a stimulus
    #[inline(always)]
    pub fn get(&self, id: &str) -> Option<&StimulusFeatures> {
        self.stimuli.get(id)
    }

    /// Iterate the stimuli in id order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StimulusFeatures)> {
        self.stimuli.iter()
    }

    /// Number of stimuli
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.stimuli.len()
    }

    /// Whether the table holds no stimulus
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }

    /// Fit the bin edges of all pitch features on the whole table.
    /// The result is meant to be frozen and shared by every fold and permutation.
    pub fn fit_encoding(&self, params: &Params) -> Result<EncodingEdges> {
        let collect = |f: fn(&StimulusFeatures) -> &[f64]| -> Vec<f64> {
            self.stimuli.values().flat_map(|s| f(s).iter().copied()).collect()
        };
        let edges = EncodingEdges::fit(
            &collect(StimulusFeatures::abs_pitch),
            &collect(StimulusFeatures::rel_pitch),
            &collect(StimulusFeatures::pitch_change),
            params.num_bins,
            params.bin_percent,
        )?;
        info!("fitted {} bins per pitch feature on {} stimuli", edges.num_bins(), self.len());

        Ok(edges)
    }
}

/// The recorded responses to one stimulus
#[derive(Debug, Clone)]
pub struct Trial {
    /// Id of the stimulus that was presented
    pub stimulus_id: String,
    /// One `channels x time` recording per presentation
    pub repetitions: Vec<DMatrix<f64>>,
}

/// All trials recorded from one subject
#[derive(Debug, Clone)]
pub struct SubjectRecordings {
    subject: String,
    num_channels: usize,
    trials: HashMap<String, Trial>,
    order: Vec<String>,
}

impl SubjectRecordings {
    /// Collect the trials of a subject, every recording needs the same channels
    /// and every stimulus may occur only once.
    pub fn new(subject: impl Into<String>, trials: Vec<Trial>) -> Result<Self> {
        let num_channels = trials
            .iter()
            .flat_map(|t| t.repetitions.iter())
            .map(|r| r.nrows())
            .next()
            .ok_or_else(|| Error::InvalidConfig("subject has no recorded repetition".to_string()))?;

        let mut order = Vec::with_capacity(trials.len());
        let mut by_id = HashMap::with_capacity(trials.len());
        for trial in trials {
            for rep in trial.repetitions.iter() {
                if rep.nrows() != num_channels {
                    return Err(Error::shape(
                        format!("channels recorded for {}", trial.stimulus_id),
                        num_channels,
                        rep.nrows(),
                    ));
                }
            }
            if by_id.contains_key(&trial.stimulus_id) {
                return Err(Error::InvalidConfig(format!(
                    "stimulus {} recorded twice",
                    trial.stimulus_id
                )));
            }
            order.push(trial.stimulus_id.clone());
            by_id.insert(trial.stimulus_id.clone(), trial);
        }

        Ok(Self {
            subject: subject.into(),
            num_channels,
            trials: by_id,
            order,
        })
    }

    /// Id of the subject, results are stored under it
    #[inline(always)]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Number of recording channels
    #[inline(always)]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Number of distinct stimuli
    #[inline(always)]
    pub fn num_trials(&self) -> usize {
        self.order.len()
    }

    /// The trial of a stimulus
    #[inline(always)]
    pub fn get(&self, stimulus_id: &str) -> Option<&Trial> {
        self.trials.get(stimulus_id)
    }

    /// Stimulus ids in the order the trials were given
    #[inline(always)]
    pub fn stimulus_ids(&self) -> &[String] {
        &self.order
    }
}

/// One precomputed stratified ordering of stimulus ids per fold
#[derive(Debug, Clone, Default)]
pub struct FoldOrderings {
    orderings: Vec<Vec<String>>,
}

impl FoldOrderings {
    /// Use the orderings, the position is the fold index
    pub fn new(orderings: Vec<Vec<String>>) -> Self {
        Self { orderings }
    }

    /// The ordering of a fold
    ///
    /// # Errors
    /// MissingArtifact if no ordering exists for this fold
    pub fn get(&self, fold: usize) -> Result<&[String]> {
        self.orderings
            .get(fold)
            .map(|o| o.as_slice())
            .ok_or_else(|| Error::MissingArtifact(format!("stratified ordering of fold {fold}")))
    }

    /// Number of orderings
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.orderings.len()
    }

    /// Whether there is no ordering
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.orderings.is_empty()
    }
}

/// The stimulus features and responses of one corpus ordering, stacked over
/// all trials and repetitions.
#[derive(Debug, Clone)]
pub struct Corpus {
    raw: DMatrix<f64>,
    responses: DMatrix<f64>,
    trial_starts: Vec<usize>,
}

impl Corpus {
    /// Stack the trials in the given order. Stimuli without recordings are
    /// skipped, every repetition of a trial is appended.
    /// The response to sample `i` is read from recording column
    /// `i + 1 + response_offset`. Repetitions too short for that get NaN responses.
    ///
    /// # Errors
    /// MissingArtifact if a recorded stimulus is absent from the table
    pub fn extract(
        recordings: &SubjectRecordings,
        table: &StimulusTable,
        ordering: &[String],
        params: &Params,
    ) -> Result<Self> {
        let mut trials = Vec::with_capacity(recordings.num_trials());
        for id in ordering {
            let Some(trial) = recordings.get(id) else {
                continue;
            };
            let features = table
                .get(id)
                .ok_or_else(|| Error::MissingArtifact(format!("stimulus features of {id}")))?;
            trials.push((trial, features));
        }
        let num_rows: usize = trials.iter().map(|(t, f)| f.len() * t.repetitions.len()).sum();
        let num_channels = recordings.num_channels();

        let mut raw: DMatrix<f64> = DMatrix::zeros(num_rows, NUM_RAW_FEATURES);
        let mut responses: DMatrix<f64> = DMatrix::from_element(num_rows, num_channels, f64::NAN);
        let mut trial_starts = Vec::with_capacity(trials.len());
        let mut row = 0;
        for (trial, features) in trials.iter() {
            trial_starts.push(row);
            let n = features.len();
            for rep in trial.repetitions.iter() {
                for i in 0..n {
                    raw[(row + i, ABS_PITCH)] = features.abs_pitch[i];
                    raw[(row + i, REL_PITCH)] = features.rel_pitch[i];
                    raw[(row + i, INTENSITY)] = features.intensity[i];
                    raw[(row + i, TIME_OFFSET)] = (i + 1) as f64 / params.sample_rate;
                    raw[(row + i, PITCH_CHANGE)] = features.pitch_change[i];
                }
                if n + params.response_offset < rep.ncols() {
                    for i in 0..n {
                        let col = i + 1 + params.response_offset;
                        for c in 0..num_channels {
                            responses[(row + i, c)] = rep[(c, col)];
                        }
                    }
                } else if n > 0 {
                    warn!(
                        "recording of {} holds {} samples, {} needed, responses set to NaN",
                        trial.stimulus_id,
                        rep.ncols(),
                        n + 1 + params.response_offset
                    );
                }
                row += n;
            }
        }
        debug!("extracted {} trials into {} rows x {} channels", trials.len(), num_rows, num_channels);

        Ok(Self {
            raw,
            responses,
            trial_starts,
        })
    }

    /// Number of stacked samples
    #[inline(always)]
    pub fn num_rows(&self) -> usize {
        self.raw.nrows()
    }

    /// Number of response channels
    #[inline(always)]
    pub fn num_channels(&self) -> usize {
        self.responses.ncols()
    }

    /// `T x NUM_RAW_FEATURES` continuous stimulus features
    #[inline(always)]
    pub fn raw(&self) -> &DMatrix<f64> {
        &self.raw
    }

    /// `T x C` responses
    #[inline(always)]
    pub fn responses(&self) -> &DMatrix<f64> {
        &self.responses
    }

    /// First row of every trial, in corpus order
    #[inline(always)]
    pub fn trial_starts(&self) -> &[usize] {
        &self.trial_starts
    }

    /// The given rows without those lacking an intensity value
    pub fn rows_with_intensity<I: IntoIterator<Item = usize>>(&self, rows: I) -> Vec<usize> {
        rows.into_iter().filter(|r| !self.raw[(*r, INTENSITY)].is_nan()).collect()
    }

    /// Encode and delay embed the given rows into the design of a variant.
    ///
    /// # Errors
    /// ShapeMismatch if the raw features are not `NUM_RAW_FEATURES` wide or the
    /// constructed width differs from the one the variant and delays imply
    pub fn design(
        &self,
        rows: &[usize],
        edges: &EncodingEdges,
        delays: &Delays,
        variant: FeatureVariant,
        sample_rate: f64,
    ) -> Result<DMatrix<f64>> {
        if self.raw.ncols() != NUM_RAW_FEATURES {
            return Err(Error::shape("corpus raw feature columns", NUM_RAW_FEATURES, self.raw.ncols()));
        }
        let raw = self.raw.select_rows(rows);
        let design = delays.embed(&construct_design(&raw, edges, variant, sample_rate)?);
        let expected = variant.num_features(edges.num_bins(), delays.len());
        if design.ncols() != expected {
            return Err(Error::shape(format!("{variant} design columns"), expected, design.ncols()));
        }
        Ok(design)
    }

    /// The responses of the given rows
    #[inline(always)]
    pub fn responses_of(&self, rows: &[usize]) -> DMatrix<f64> {
        self.responses.select_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use stim_features::BinEdges;

    use super::*;

    fn features(n: usize, base: f64) -> StimulusFeatures {
        StimulusFeatures::new(
            (0..n).map(|i| base + i as f64).collect(),
            (0..n).map(|i| i as f64 * 0.1).collect(),
            vec![0.0; n],
            vec![0.5; n],
        )
        .unwrap()
    }

    fn recording(channels: usize, len: usize, offset: f64) -> DMatrix<f64> {
        DMatrix::from_fn(channels, len, |c, t| offset + c as f64 * 1000.0 + t as f64)
    }

    fn params() -> Params {
        Params {
            response_offset: 2,
            ..Default::default()
        }
    }

    #[test]
    fn corpus_extract_layout() {
        if let Err(_) = pretty_env_logger::try_init() {}

        let mut table = StimulusTable::new();
        table.insert("a", features(3, 100.0));
        table.insert("b", features(2, 200.0));
        table.insert("unused", features(4, 0.0));
        let recordings = SubjectRecordings::new(
            "s1",
            vec![
                Trial {
                    stimulus_id: "a".to_string(),
                    repetitions: vec![recording(2, 10, 0.0), recording(2, 10, 0.5)],
                },
                Trial {
                    stimulus_id: "b".to_string(),
                    repetitions: vec![recording(2, 10, 0.0)],
                },
            ],
        )
        .unwrap();
        let ordering = vec!["b".to_string(), "missing".to_string(), "a".to_string()];

        let corpus = Corpus::extract(&recordings, &table, &ordering, &params()).unwrap();

        assert_eq!(corpus.num_rows(), 2 + 3 * 2);
        assert_eq!(corpus.num_channels(), 2);
        assert_eq!(corpus.trial_starts(), &[0, 2]);
        assert_eq!(corpus.raw()[(0, ABS_PITCH)], 200.0);
        assert_eq!(corpus.raw()[(2, ABS_PITCH)], 100.0);
        assert_eq!(corpus.raw()[(5, ABS_PITCH)], 100.0);
        assert_eq!(corpus.raw()[(1, TIME_OFFSET)], 0.02);
        // sample i maps to column i + 1 + offset
        assert_eq!(corpus.responses()[(0, 0)], 3.0);
        assert_eq!(corpus.responses()[(1, 1)], 1004.0);
        assert_eq!(corpus.responses()[(5, 0)], 3.5);
    }

    #[test]
    fn corpus_short_recording_is_nan() {
        let mut table = StimulusTable::new();
        table.insert("a", features(5, 1.0));
        let recordings = SubjectRecordings::new(
            "s1",
            vec![Trial {
                stimulus_id: "a".to_string(),
                repetitions: vec![recording(3, 7, 0.0)],
            }],
        )
        .unwrap();

        let corpus = Corpus::extract(&recordings, &table, &["a".to_string()], &params()).unwrap();

        assert_eq!(corpus.num_rows(), 5);
        assert!(corpus.responses().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn corpus_missing_stimulus_features() {
        let recordings = SubjectRecordings::new(
            "s1",
            vec![Trial {
                stimulus_id: "a".to_string(),
                repetitions: vec![recording(1, 20, 0.0)],
            }],
        )
        .unwrap();

        let res = Corpus::extract(&recordings, &StimulusTable::new(), &["a".to_string()], &params());

        assert!(matches!(res, Err(Error::MissingArtifact(_))));
    }

    fn edges() -> EncodingEdges {
        let e = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        EncodingEdges::from_edges(e.clone(), e.clone(), e).unwrap()
    }

    #[test]
    fn corpus_design_width() {
        let mut table = StimulusTable::new();
        table.insert("a", features(6, 0.0));
        let recordings = SubjectRecordings::new(
            "s1",
            vec![Trial {
                stimulus_id: "a".to_string(),
                repetitions: vec![recording(1, 20, 0.0)],
            }],
        )
        .unwrap();
        let corpus = Corpus::extract(&recordings, &table, &["a".to_string()], &params()).unwrap();
        let delays = Delays::window(3).unwrap();

        let design = corpus.design(&[0, 1, 2, 3], &edges(), &delays, FeatureVariant::All, 100.0).unwrap();

        assert_eq!(design.shape(), (4, FeatureVariant::All.num_features(2, 3)));
    }

    #[test]
    fn corpus_design_rejects_wrong_feature_width() {
        let corpus = Corpus {
            raw: DMatrix::zeros(4, NUM_RAW_FEATURES - 1),
            responses: DMatrix::zeros(4, 1),
            trial_starts: vec![0],
        };
        let delays = Delays::window(3).unwrap();

        let res = corpus.design(&[0, 1, 2, 3], &edges(), &delays, FeatureVariant::AbsRel, 100.0);

        assert!(matches!(res, Err(Error::ShapeMismatch { expected: NUM_RAW_FEATURES, got: 4, .. })));
    }

    #[test]
    fn recordings_reject_channel_mismatch() {
        let res = SubjectRecordings::new(
            "s1",
            vec![Trial {
                stimulus_id: "a".to_string(),
                repetitions: vec![recording(2, 5, 0.0), recording(3, 5, 0.0)],
            }],
        );

        assert!(matches!(res, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn fold_orderings_missing_fold() {
        let orderings = FoldOrderings::new(vec![vec!["a".to_string()]]);

        assert!(orderings.get(0).is_ok());
        assert!(matches!(orderings.get(1), Err(Error::MissingArtifact(_))));
    }

    #[test]
    fn stimulus_features_reject_unequal_lengths() {
        assert!(StimulusFeatures::new(vec![1.0; 3], vec![1.0; 3], vec![1.0; 2], vec![1.0; 3]).is_err());
    }
}
