//! Ridge regression building blocks for the receptive field models

#![warn(unused_imports)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

use nalgebra::{Const, DMatrix, Dyn, MatrixView};

mod alpha_grid;
mod correlation;
mod errors;
mod multi_alpha;
mod tikhonov_regularization;

pub use alpha_grid::AlphaGrid;
pub use correlation::{pearson, pearson_or_zero};
pub use errors::LinRegError;
pub use multi_alpha::{
    fit_select_score, AlphaSelection, ChannelModel, MultiAlphaRidge, RidgeCvFit, SplitData,
};
pub use tikhonov_regularization::TikhonovRegularization;

/// Generic way of performing linear regression and fitting the weight matrix
pub trait LinReg: Clone {
    /// Fit a weight matrix, mapping inputs to targets
    ///
    /// # Parameters
    /// design: Input data with one row per time step
    /// targets: Target data with one column per output channel
    fn fit_readout<'a>(
        &self,
        design: &'a MatrixView<'a, f64, Dyn, Dyn, Const<1>, Dyn>,
        targets: &'a MatrixView<'a, f64, Dyn, Dyn, Const<1>, Dyn>,
    ) -> Result<DMatrix<f64>, LinRegError>;
}
