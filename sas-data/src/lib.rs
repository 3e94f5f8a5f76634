//! Measured small-angle scattering curves and their preparation.
//!
//! A [`RawCurve`] is the file content as loaded: q, I and optional σ and ψ
//! columns, possibly containing non-finite or non-positive entries.
//! [`Dataset::prepare`] applies the configured masks and the uncertainty
//! floor and yields the immutable working arrays every later stage reads.

mod dataset;

pub use dataset::{Dataset, MaskOptions, RawCurve};

use thiserror::Error;

/// The floating-point type used throughout the workspace.
pub type Float = f64;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("column length mismatch: q has {q} points, {name} has {len}")]
    LengthMismatch {
        q: usize,
        name: &'static str,
        len: usize,
    },
    #[error("no data points left after masking")]
    EmptyAfterMasking,
    #[error("uncertainty at point {index} is {sigma} after sanitation; must be positive")]
    NonPositiveSigma { index: usize, sigma: Float },
}
