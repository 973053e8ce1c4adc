use common::{Error, Result};
use nanorand::{Rng, WyRand};

use crate::{StimulusFeatures, StimulusTable};

/// Number of duration strata contours are shuffled within
const NUM_DURATION_BINS: usize = 5;

/// Reassign the feature contours across stimuli of similar duration.
///
/// Stimuli are stratified into equal width duration bins and the donors are
/// permuted within each bin, so every stimulus keeps its length but receives
/// the contour of a stimulus of about the same length.
pub fn shuffle_contours(table: &StimulusTable, rng: &mut WyRand) -> Result<StimulusTable> {
    let lengths: Vec<usize> = table.iter().map(|(_, s)| s.len()).collect();
    let mut donors: Vec<usize> = (0..lengths.len()).collect();
    for stratum in duration_strata(&lengths) {
        let mut shuffled = stratum.clone();
        rng.shuffle(&mut shuffled);
        for (recipient, donor) in stratum.iter().zip(shuffled) {
            donors[*recipient] = donor;
        }
    }
    trace!("donors: {:?}", donors);

    reassign_contours(table, &donors)
}

/// Give stimulus `i`, in id order, the contour of stimulus `donors[i]`.
/// A longer donor is truncated. A shorter donor fills the first rows, the
/// remaining samples are unvoiced at the donor's lowest intensity.
pub fn reassign_contours(table: &StimulusTable, donors: &[usize]) -> Result<StimulusTable> {
    if donors.len() != table.len() {
        return Err(Error::shape("contour donors", table.len(), donors.len()));
    }
    let stimuli: Vec<(&String, &StimulusFeatures)> = table.iter().collect();

    let mut out = StimulusTable::new();
    for ((id, recipient), donor) in stimuli.iter().zip(donors) {
        let (_, donor) = stimuli
            .get(*donor)
            .ok_or_else(|| Error::shape("contour donor index bound", stimuli.len(), *donor))?;
        let n = recipient.len();
        let m = donor.len().min(n);
        let fill = |contour: &[f64], pad: f64| -> Vec<f64> {
            contour[..m].iter().copied().chain(std::iter::repeat(pad).take(n - m)).collect()
        };
        let lowest_intensity = donor
            .intensity()
            .iter()
            .copied()
            .fold(f64::NAN, f64::min);

        out.insert(
            id.as_str(),
            StimulusFeatures::new(
                fill(donor.abs_pitch(), f64::NAN),
                fill(donor.rel_pitch(), f64::NAN),
                fill(donor.pitch_change(), f64::NAN),
                fill(donor.intensity(), lowest_intensity),
            )?,
        );
    }

    Ok(out)
}

/// Indices of the stimuli in each of the equal width duration bins.
/// The upper edge is raised by one so the longest stimulus falls inside.
fn duration_strata(lengths: &[usize]) -> Vec<Vec<usize>> {
    let mut strata = vec![vec![]; NUM_DURATION_BINS];
    let (Some(min), Some(max)) = (lengths.iter().min(), lengths.iter().max()) else {
        return strata;
    };
    let (mut lo, mut hi) = (*min as f64, *max as f64);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / NUM_DURATION_BINS as f64;
    let mut edges: Vec<f64> = (0..=NUM_DURATION_BINS).map(|i| lo + width * i as f64).collect();
    edges[NUM_DURATION_BINS] += 1.0;

    for (i, len) in lengths.iter().enumerate() {
        let bin = edges.partition_point(|e| *e <= *len as f64).saturating_sub(1);
        strata[bin.min(NUM_DURATION_BINS - 1)].push(i);
    }
    strata
}

/// One shuffled stimulus table per permutation index
#[derive(Debug, Clone, Default)]
pub struct PermutationTables {
    tables: Vec<StimulusTable>,
}

impl PermutationTables {
    /// Use precomputed tables, the position is the permutation index
    pub fn new(tables: Vec<StimulusTable>) -> Self {
        Self { tables }
    }

    /// Shuffle the reference table `num_permutations` times.
    /// Permutation `i` is seeded with `seed + i`, so each table can be
    /// regenerated on its own.
    pub fn generate(table: &StimulusTable, num_permutations: usize, seed: u64) -> Result<Self> {
        let tables = (0..num_permutations)
            .map(|i| {
                let mut rng = WyRand::new_seed(seed.wrapping_add(i as u64));
                shuffle_contours(table, &mut rng)
            })
            .collect::<Result<Vec<StimulusTable>>>()?;
        info!("generated {} shuffled stimulus tables", tables.len());

        Ok(Self { tables })
    }

    /// The table of one permutation
    ///
    /// # Errors
    /// MissingArtifact if no table exists for this index
    pub fn get(&self, permutation: usize) -> Result<&StimulusTable> {
        self.tables
            .get(permutation)
            .ok_or_else(|| Error::MissingArtifact(format!("stimulus table of permutation {permutation}")))
    }

    /// Number of tables
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether there is no table
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stimulus(n: usize, base: f64) -> StimulusFeatures {
        StimulusFeatures::new(
            (0..n).map(|i| base + i as f64).collect(),
            (0..n).map(|i| base - i as f64).collect(),
            vec![base; n],
            (0..n).map(|i| base + 0.5 * i as f64).collect(),
        )
        .unwrap()
    }

    fn table() -> StimulusTable {
        let mut table = StimulusTable::new();
        for (i, n) in [10, 11, 12, 30, 31, 50, 52, 90, 100, 100].iter().enumerate() {
            table.insert(format!("s{i}"), stimulus(*n, i as f64 * 10.0));
        }
        table
    }

    #[test]
    fn duration_strata_equal_width() {
        let strata = duration_strata(&[98, 100, 131, 163, 200, 259]);

        assert_eq!(strata, vec![vec![0, 1], vec![2], vec![3], vec![4], vec![5]]);
        assert_eq!(duration_strata(&[5, 5]), vec![vec![], vec![], vec![0, 1], vec![], vec![]]);
    }

    #[test]
    fn identity_donors_reproduce_table() {
        let table = table();
        let donors: Vec<usize> = (0..table.len()).collect();

        assert_eq!(reassign_contours(&table, &donors).unwrap(), table);
    }

    #[test]
    fn shorter_donor_is_padded() {
        let mut table = StimulusTable::new();
        table.insert("a", stimulus(3, 1.0));
        table.insert("b", stimulus(5, 2.0));

        let out = reassign_contours(&table, &[1, 0]).unwrap();
        let a = out.get("a").unwrap();
        let b = out.get("b").unwrap();

        assert_eq!(a.abs_pitch(), &[2.0, 3.0, 4.0]);
        assert_eq!(b.len(), 5);
        assert_eq!(&b.abs_pitch()[..3], &[1.0, 2.0, 3.0]);
        assert!(b.abs_pitch()[3..].iter().all(|v| v.is_nan()));
        assert!(b.rel_pitch()[3..].iter().all(|v| v.is_nan()));
        assert!(b.pitch_change()[3..].iter().all(|v| v.is_nan()));
        assert_eq!(b.intensity(), &[1.0, 1.5, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn shuffle_keeps_lengths_and_strata() {
        if let Err(_) = pretty_env_logger::try_init() {}

        let table = table();
        let mut rng = WyRand::new_seed(42);
        let shuffled = shuffle_contours(&table, &mut rng).unwrap();

        assert_eq!(shuffled.len(), table.len());
        for ((id, orig), (sid, new)) in table.iter().zip(shuffled.iter()) {
            assert_eq!(id, sid);
            assert_eq!(orig.len(), new.len());
            // the donor's base value identifies it, donors share the stratum
            let donor = (new.pitch_change()[0] / 10.0) as usize;
            let donor_len = table.get(&format!("s{donor}")).unwrap().len();
            assert!((donor_len as isize - orig.len() as isize).abs() <= 18);
        }
    }

    #[test]
    fn permutation_tables_are_reproducible() {
        let table = table();
        let a = PermutationTables::generate(&table, 3, 7).unwrap();
        let b = PermutationTables::generate(&table, 3, 7).unwrap();

        assert_eq!(a.len(), 3);
        for i in 0..3 {
            assert_eq!(a.get(i).unwrap(), b.get(i).unwrap());
        }
        assert!(matches!(a.get(3), Err(Error::MissingArtifact(_))));
        assert!(PermutationTables::generate(&table, 0, 7).unwrap().is_empty());
    }
}
