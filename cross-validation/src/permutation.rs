use std::collections::BTreeMap;

use common::{Error, Result};
use nalgebra::DMatrix;

use crate::{
    store::matrix_array, Analysis, CrossValidation, FoldOrderings, PermutationTables, ResultStore,
    SubjectRecordings,
};

/// Key of the mean squared correlation of the full variant
pub const R2_ALL: &str = "r2_all";

/// `C x P` null statistics, one column per permutation
#[derive(Debug, Clone)]
pub struct NullDistribution {
    analysis: Analysis,
    statistics: BTreeMap<String, DMatrix<f64>>,
}

impl NullDistribution {
    fn new(analysis: Analysis, num_channels: usize, num_permutations: usize) -> Self {
        let statistics = std::iter::once(R2_ALL)
            .chain(analysis.contrasts().iter().map(|c| c.name))
            .map(|name| {
                (
                    name.to_string(),
                    DMatrix::from_element(num_channels, num_permutations, f64::NAN),
                )
            })
            .collect();
        Self {
            analysis,
            statistics,
        }
    }

    /// The null of one statistic, [`R2_ALL`] or a contrast name
    pub fn get(&self, statistic: &str) -> Option<&DMatrix<f64>> {
        self.statistics.get(statistic)
    }

    /// All statistics by name
    #[inline(always)]
    pub fn statistics(&self) -> &BTreeMap<String, DMatrix<f64>> {
        &self.statistics
    }

    /// Number of permutations
    pub fn num_permutations(&self) -> usize {
        self.statistics.values().next().map_or(0, |m| m.ncols())
    }

    /// The group the null distribution is stored under
    pub fn group(&self) -> String {
        format!("{}_permutations", self.analysis.name())
    }

    /// Persist every statistic as a `C x P` array
    pub fn save<S: ResultStore>(&self, store: &S, subject: &str) -> Result<()> {
        let arrays = self
            .statistics
            .iter()
            .map(|(name, m)| (name.clone(), matrix_array(m)))
            .collect();
        store.save(subject, &self.group(), &arrays)
    }
}

/// Per channel fraction of null statistics at least as large as the observed
/// one. NaN entries of the null are excluded, channels without any remaining
/// entry or with a NaN observation get NaN.
pub fn p_values(observed: &[f64], null: &DMatrix<f64>) -> Result<Vec<f64>> {
    if observed.len() != null.nrows() {
        return Err(Error::shape("null distribution channels", observed.len(), null.nrows()));
    }
    Ok(observed
        .iter()
        .zip(null.row_iter())
        .map(|(obs, row)| {
            let valid: Vec<f64> = row.iter().copied().filter(|v| !v.is_nan()).collect();
            if valid.is_empty() || obs.is_nan() {
                return f64::NAN;
            }
            valid.iter().filter(|v| **v >= *obs).count() as f64 / valid.len() as f64
        })
        .collect())
}

impl CrossValidation {
    /// Rerun all folds of an analysis once per shuffled stimulus table and
    /// record the mean squared correlation of the full variant and every
    /// contrast. Uses the first `num_permutations` tables.
    ///
    /// # Errors
    /// MissingArtifact before any fitting if a table, a fold ordering or a
    /// stimulus of a table is absent
    pub fn permutation_test(
        &self,
        analysis: Analysis,
        recordings: &SubjectRecordings,
        tables: &PermutationTables,
        orderings: &FoldOrderings,
    ) -> Result<NullDistribution> {
        let num_permutations = self.params().num_permutations;
        for perm in 0..num_permutations {
            self.check_artifacts(recordings, tables.get(perm)?, orderings)?;
        }

        let mut null = NullDistribution::new(analysis, recordings.num_channels(), num_permutations);
        for perm in 0..num_permutations {
            let outcome = self.run(analysis, recordings, tables.get(perm)?, orderings)?;
            let mut columns: Vec<(&str, Vec<f64>)> =
                vec![(R2_ALL, outcome.full().mean_squared_correlation())];
            for (name, values) in outcome.contrasts() {
                columns.push((*name, values.clone()));
            }
            for (name, values) in columns {
                if let Some(m) = null.statistics.get_mut(name) {
                    for (chan, v) in values.into_iter().enumerate() {
                        m[(chan, perm)] = v;
                    }
                }
            }
            info!("permutation {} of {} done", perm + 1, num_permutations);
        }

        Ok(null)
    }

    /// Run the permutation test and persist the null distribution under the
    /// subject's id
    pub fn permutation_test_and_save<S: ResultStore>(
        &self,
        analysis: Analysis,
        recordings: &SubjectRecordings,
        tables: &PermutationTables,
        orderings: &FoldOrderings,
        store: &S,
    ) -> Result<NullDistribution> {
        let null = self.permutation_test(analysis, recordings, tables, orderings)?;
        null.save(store, recordings.subject())?;

        Ok(null)
    }
}
