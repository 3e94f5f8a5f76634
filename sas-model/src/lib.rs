//! Scattering models as values.
//!
//! A [`ScatteringModel`] bundles a parameter table ([`FitParam`]) with pure
//! form-factor and volume functions. The Monte-Carlo engine only sees the
//! active parameters; everything else is carried by the model value itself.

mod model;
mod params;
mod random;

pub mod models;

pub use model::ScatteringModel;
pub use models::{CylinderIsotropic, GaussianChain, Sphere};
pub use params::{FitParam, SampleMode};
pub use random::RandomSource;

pub use sas_data::Float;
