//! Cross validated receptive field analyses: fold extraction and splitting,
//! the parallel fold loop, permutation tests and result persistence.

#![warn(unused_imports)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

mod dataset;
mod fold;
mod fold_splitter;
mod orchestrator;
mod permutation;
mod shuffle;
mod store;

pub use dataset::{
    Corpus, FoldOrderings, StimulusFeatures, StimulusTable, SubjectRecordings, Trial,
};
pub use fold::{fit_fold, FitContext};
pub use fold_splitter::{FoldSplit, SplitRole};
pub use orchestrator::{predict, Analysis, Contrast, CrossValidation, CvOutcome, FoldResults};
pub use permutation::{p_values, NullDistribution, R2_ALL};
pub use shuffle::{reassign_contours, shuffle_contours, PermutationTables};
pub use store::{JsonStore, ResultStore};
