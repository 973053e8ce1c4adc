//! This crate provides the functionality shared by the receptive field crates:
//! configuration, errors and NaN aware statistics.

#![warn(unused_imports)]
#![warn(missing_docs)]

mod errors;
mod params;
mod stats;

pub use errors::{Error, Result};
pub use params::{FoldScheme, Params};
pub use stats::nan_mean;
