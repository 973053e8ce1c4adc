/// One group of design columns built from the raw stimulus features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureBlock {
    /// One hot bins of the absolute pitch
    AbsPitch,
    /// One hot bins of the relative pitch
    RelPitch,
    /// One hot bins of the absolute pitch change
    PitchChange,
    /// 1 where the sample is voiced, i.e. any relative pitch bin is active
    Voiced,
    /// The scaled intensity, `intensity / 2 + 0.75`
    Intensity,
    /// 1 on the first sample of every stimulus
    Onset,
    /// Constant 1
    Bias,
}

impl FeatureBlock {
    /// Number of design columns of this block
    #[inline(always)]
    pub fn num_columns(&self, num_bins: usize) -> usize {
        match self {
            FeatureBlock::AbsPitch | FeatureBlock::RelPitch | FeatureBlock::PitchChange => num_bins,
            FeatureBlock::Voiced
            | FeatureBlock::Intensity
            | FeatureBlock::Onset
            | FeatureBlock::Bias => 1,
        }
    }
}

/// The feature subsets models are fitted on. Each names the ordered blocks
/// its design matrix is concatenated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureVariant {
    /// Absolute and relative pitch
    All,
    /// Absolute pitch only
    AbsBin,
    /// Relative pitch only
    RelBin,
    /// Absolute and relative pitch, with onsets
    AbsRel,
    /// Absolute pitch and pitch change, with onsets
    AbsChange,
    /// Absolute pitch, relative pitch and pitch change, with onsets
    AllWithChange,
}

impl FeatureVariant {
    /// The name results of this variant are stored under
    pub fn name(&self) -> &'static str {
        match self {
            FeatureVariant::All => "all",
            FeatureVariant::AbsBin => "abs_bin",
            FeatureVariant::RelBin => "rel_bin",
            FeatureVariant::AbsRel => "abs_rel",
            FeatureVariant::AbsChange => "abs_change",
            FeatureVariant::AllWithChange => "all_with_change",
        }
    }

    /// The blocks in column order
    pub fn blocks(&self) -> &'static [FeatureBlock] {
        use FeatureBlock::*;

        match self {
            FeatureVariant::All => &[AbsPitch, RelPitch, Voiced, Intensity, Bias],
            FeatureVariant::AbsBin => &[AbsPitch, Voiced, Intensity, Bias],
            FeatureVariant::RelBin => &[RelPitch, Voiced, Intensity, Bias],
            FeatureVariant::AbsRel => &[AbsPitch, RelPitch, Voiced, Intensity, Onset, Bias],
            FeatureVariant::AbsChange => &[AbsPitch, PitchChange, Voiced, Intensity, Onset, Bias],
            FeatureVariant::AllWithChange => {
                &[AbsPitch, RelPitch, PitchChange, Voiced, Intensity, Onset, Bias]
            }
        }
    }

    /// Columns of the design before delay embedding
    pub fn num_columns(&self, num_bins: usize) -> usize {
        self.blocks().iter().map(|b| b.num_columns(num_bins)).sum()
    }

    /// Columns of the delay embedded design, the length of every weight vector
    #[inline(always)]
    pub fn num_features(&self, num_bins: usize, num_lags: usize) -> usize {
        self.num_columns(num_bins) * num_lags
    }
}

impl std::fmt::Display for FeatureVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_variant_widths() {
        assert_eq!(FeatureVariant::All.num_columns(10), 23);
        assert_eq!(FeatureVariant::All.num_features(10, 46), 1058);
        assert_eq!(FeatureVariant::AbsBin.num_features(10, 46), 598);
        assert_eq!(FeatureVariant::RelBin.num_features(10, 46), 598);
        assert_eq!(FeatureVariant::AbsRel.num_features(10, 46), 1104);
        assert_eq!(FeatureVariant::AbsChange.num_features(10, 46), 1104);
        assert_eq!(FeatureVariant::AllWithChange.num_features(10, 46), 1564);
    }

    #[test]
    fn feature_variant_names() {
        assert_eq!(FeatureVariant::AllWithChange.to_string(), "all_with_change");
        assert_eq!(FeatureVariant::RelBin.name(), "rel_bin");
    }
}
