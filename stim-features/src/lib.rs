//! Turns continuous stimulus features into the delay embedded design
//! matrices the ridge models are fitted on.

#![warn(unused_imports)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

mod bin_encoder;
mod delay_embedder;
mod design;
mod feature_variant;

pub use bin_encoder::{BinEdges, EncodingEdges};
pub use delay_embedder::Delays;
pub use design::{
    construct_design, ABS_PITCH, INTENSITY, NUM_RAW_FEATURES, PITCH_CHANGE, REL_PITCH, TIME_OFFSET,
};
pub use feature_variant::{FeatureBlock, FeatureVariant};
