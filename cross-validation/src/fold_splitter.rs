use std::ops::Range;

use common::{Error, Result};

/// The three roles the rows of a fold are assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitRole {
    /// Rows the ridge weights are fitted on
    Train,
    /// Rows the ridge strength is selected on
    Select,
    /// Held out rows the selected model is scored on
    Test,
}

/// Disjoint, order preserving row ranges of the three roles.
/// Together they cover `0..num_rows` without gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    train: Vec<Range<usize>>,
    select: Vec<Range<usize>>,
    test: Vec<Range<usize>>,
}

impl FoldSplit {
    /// Split trials of a stratified ordering into the first 80% for training,
    /// the next 10% for selection and the remainder for testing.
    /// With `n` trials the selection starts at trial `floor(0.8 n) - 1` and
    /// the test at trial `floor(0.9 n) - 1`.
    ///
    /// # Arguments:
    /// trial_starts: First row of every trial, increasing
    /// num_rows: Total number of rows
    pub fn stratified(trial_starts: &[usize], num_rows: usize) -> Result<Self> {
        let n = trial_starts.len();
        let select_trial = (0.8 * n as f64).floor() as usize;
        let test_trial = (0.9 * n as f64).floor() as usize;
        if select_trial == 0 || test_trial <= select_trial {
            return Err(Error::InvalidConfig(format!(
                "{n} trials are too few for a train, select and test split"
            )));
        }
        let select_start = trial_starts[select_trial - 1];
        let test_start = trial_starts[test_trial - 1];
        debug!(
            "stratified split of {} trials at rows {} and {} of {}",
            n, select_start, test_start, num_rows
        );

        Ok(Self {
            train: vec![0..select_start],
            select: vec![select_start..test_start],
            test: vec![test_start..num_rows],
        })
    }

    /// Hold out the `fold`-th of `k` contiguous blocks. The first
    /// `num_rows % k` blocks are one row longer. The held out block's first
    /// half, rounded half to even, selects and the rest tests.
    pub fn k_fold(num_rows: usize, k: usize, fold: usize) -> Result<Self> {
        if k < 2 || num_rows < k {
            return Err(Error::InvalidConfig(format!(
                "cannot split {num_rows} rows into {k} folds"
            )));
        }
        if fold >= k {
            return Err(Error::InvalidConfig(format!("fold {fold} out of {k}")));
        }
        let base = num_rows / k;
        let extra = num_rows % k;
        let block_len = |j: usize| base + usize::from(j < extra);
        let start: usize = (0..fold).map(block_len).sum();
        let end = start + block_len(fold);

        let len = end - start;
        let half = len / 2;
        let num_select = if len % 2 == 1 && half % 2 == 1 { half + 1 } else { half };

        let train = [0..start, end..num_rows].into_iter().filter(|r| !r.is_empty()).collect();
        Ok(Self {
            train,
            select: vec![start..start + num_select],
            test: vec![start + num_select..end],
        })
    }

    /// The ranges of one role
    pub fn ranges(&self, role: SplitRole) -> &[Range<usize>] {
        match role {
            SplitRole::Train => &self.train,
            SplitRole::Select => &self.select,
            SplitRole::Test => &self.test,
        }
    }

    /// The rows of one role in increasing order
    pub fn rows(&self, role: SplitRole) -> Vec<usize> {
        self.ranges(role).iter().flat_map(|r| r.clone()).collect()
    }

    /// Number of rows of one role
    pub fn len(&self, role: SplitRole) -> usize {
        self.ranges(role).iter().map(|r| r.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: [SplitRole; 3] = [SplitRole::Train, SplitRole::Select, SplitRole::Test];

    fn assert_partition(split: &FoldSplit, num_rows: usize) {
        let mut seen = vec![0; num_rows];
        for role in ROLES {
            let rows = split.rows(role);
            assert!(rows.windows(2).all(|w| w[0] < w[1]));
            for r in rows {
                seen[r] += 1;
            }
        }
        assert!(seen.iter().all(|s| *s == 1), "rows covered {:?}", seen);
    }

    #[test]
    fn stratified_boundaries() {
        if let Err(_) = pretty_env_logger::try_init() {}

        // 20 trials of 5 rows each
        let starts: Vec<usize> = (0..20).map(|i| i * 5).collect();
        let split = FoldSplit::stratified(&starts, 100).unwrap();

        assert_eq!(split.ranges(SplitRole::Train), &[0..75]);
        assert_eq!(split.ranges(SplitRole::Select), &[75..85]);
        assert_eq!(split.ranges(SplitRole::Test), &[85..100]);
        assert_partition(&split, 100);
    }

    #[test]
    fn stratified_uneven_trials() {
        let starts = [0, 3, 10, 11, 20, 26, 30, 41, 45, 50];
        let split = FoldSplit::stratified(&starts, 57).unwrap();

        assert_eq!(split.ranges(SplitRole::Train), &[0..41]);
        assert_eq!(split.ranges(SplitRole::Select), &[41..45]);
        assert_eq!(split.ranges(SplitRole::Test), &[45..57]);
        assert_partition(&split, 57);
    }

    #[test]
    fn stratified_too_few_trials() {
        assert!(FoldSplit::stratified(&[0, 4, 8], 12).is_err());
        assert!(FoldSplit::stratified(&[], 0).is_err());
    }

    #[test]
    fn k_fold_partitions_every_fold() {
        for num_rows in [10, 11, 23, 100] {
            for fold in 0..5 {
                let split = FoldSplit::k_fold(num_rows, 5, fold).unwrap();
                assert_partition(&split, num_rows);
            }
        }
    }

    #[test]
    fn k_fold_block_sizes() {
        // 23 rows: blocks of 5, 5, 5, 4, 4
        let first = FoldSplit::k_fold(23, 5, 0).unwrap();
        assert_eq!(first.ranges(SplitRole::Train), &[5..23]);
        assert_eq!(first.ranges(SplitRole::Select), &[0..2]);
        assert_eq!(first.ranges(SplitRole::Test), &[2..5]);

        let middle = FoldSplit::k_fold(23, 5, 3).unwrap();
        assert_eq!(middle.ranges(SplitRole::Train), &[0..15, 19..23]);
        assert_eq!(middle.ranges(SplitRole::Select), &[15..17]);
        assert_eq!(middle.ranges(SplitRole::Test), &[17..19]);
        assert_eq!(middle.len(SplitRole::Train), 19);
    }

    #[test]
    fn k_fold_select_rounds_half_to_even() {
        // held out block of 7 rows: 3.5 rounds to 4
        let split = FoldSplit::k_fold(14, 2, 1).unwrap();
        assert_eq!(split.len(SplitRole::Select), 4);
        assert_eq!(split.len(SplitRole::Test), 3);

        // held out block of 5 rows: 2.5 rounds to 2
        let split = FoldSplit::k_fold(10, 2, 0).unwrap();
        assert_eq!(split.len(SplitRole::Select), 2);
        assert_eq!(split.len(SplitRole::Test), 3);
    }

    #[test]
    fn k_fold_rejects_invalid() {
        assert!(FoldSplit::k_fold(3, 5, 0).is_err());
        assert!(FoldSplit::k_fold(10, 5, 5).is_err());
        assert!(FoldSplit::k_fold(10, 1, 0).is_err());
    }
}
