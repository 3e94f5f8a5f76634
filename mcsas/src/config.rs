use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prelude::*;

#[derive(Debug, ValueEnum, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BinScale {
    Linear,
    Log,
}

#[derive(Debug, ValueEnum, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    Volume,
    Number,
}

/// Binning for one active parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HistogramSpec {
    pub bins: usize,
    pub scale: BinScale,
    /// Preferred weighting for reporting; both weightings are computed.
    pub weighting: Weighting,
}

impl Default for HistogramSpec {
    fn default() -> Self {
        HistogramSpec {
            bins: 50,
            scale: BinScale::Linear,
            weighting: Weighting::Volume,
        }
    }
}

/// Moment analysis over a sub-range of one active parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RangeSpec {
    /// Index into the active parameters.
    pub param: usize,
    pub min: Float,
    pub max: Float,
    pub weighting: Weighting,
}

/// All knobs of one analysis. Immutable once handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McConfig {
    /// Contributions per Monte-Carlo run.
    pub num_contribs: usize,
    /// Independent repetitions used to estimate the spread.
    pub num_reps: usize,
    pub max_iterations: usize,
    /// Reduced-χ² value at which a run counts as converged.
    pub convergence_target: Float,
    /// Extra attempts per repetition on non-convergence; a repetition is
    /// abandoned after `max_retries + 2` attempts.
    pub max_retries: usize,
    /// Power α applied to scatterer volumes to counter the V² weighting.
    pub compensation_exponent: Float,
    /// Scattering contrast Δρ².
    pub delta_rho_sq: Float,
    pub start_from_minimum: bool,
    pub find_background: bool,
    /// Drop the per-contribution intensity cache and recompute on demand.
    pub memsave: bool,
    pub mask: MaskOptions,
    /// One spec per active model parameter, in declaration order.
    pub histogram: Vec<HistogramSpec>,
    /// Optional moment analyses over sub-ranges.
    pub ranges: Vec<RangeSpec>,
    pub seed: u64,
}

impl Default for McConfig {
    fn default() -> Self {
        McConfig {
            num_contribs: 200,
            num_reps: 100,
            max_iterations: 100_000,
            convergence_target: 1.,
            max_retries: 5,
            compensation_exponent: 0.5,
            delta_rho_sq: 1.,
            start_from_minimum: false,
            find_background: true,
            memsave: false,
            mask: MaskOptions::default(),
            histogram: vec![HistogramSpec::default()],
            ranges: Vec::new(),
            seed: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },
    #[error("convergence target must be positive, got {0}")]
    Target(Float),
    #[error("compensation exponent must lie in (0, 1], got {0}")]
    CompensationExponent(Float),
    #[error("contrast delta_rho_sq must be positive, got {0}")]
    Contrast(Float),
    #[error("e_min must lie in (0, 1), got {0}")]
    EMin(Float),
    #[error("parameter {name}: invalid range [{min}, {max}]")]
    ParamRange {
        name: &'static str,
        min: Float,
        max: Float,
    },
    #[error("model has {expected} active parameters but {got} histogram specs")]
    HistogramSpecCount { expected: usize, got: usize },
    #[error("log-scaled histogram needs a positive lower bound for parameter {name}")]
    LogScaleNonPositive { name: &'static str },
    #[error("moment range {index}: active-parameter index {param} out of range")]
    RangeParam { index: usize, param: usize },
    #[error("prior row {row} has {got} values, model has {expected} active parameters")]
    PriorShape {
        row: usize,
        expected: usize,
        got: usize,
    },
}

impl McConfig {
    /// Full validation against the model; every error here is fatal before
    /// any Monte-Carlo work starts.
    pub fn validate<M: ScatteringModel + ?Sized>(&self, model: &M) -> Result<(), ConfigError> {
        for (name, v) in [
            ("num_contribs", self.num_contribs),
            ("num_reps", self.num_reps),
            ("max_iterations", self.max_iterations),
        ] {
            if v < 1 {
                return Err(ConfigError::ZeroCount { name });
            }
        }
        if !(self.convergence_target > 0.) {
            return Err(ConfigError::Target(self.convergence_target));
        }
        if !(self.compensation_exponent > 0. && self.compensation_exponent <= 1.) {
            return Err(ConfigError::CompensationExponent(self.compensation_exponent));
        }
        if !(self.delta_rho_sq > 0.) {
            return Err(ConfigError::Contrast(self.delta_rho_sq));
        }
        if !(self.mask.e_min > 0. && self.mask.e_min < 1.) {
            return Err(ConfigError::EMin(self.mask.e_min));
        }
        for p in model.params() {
            if !(p.min < p.max) || !p.min.is_finite() || !p.max.is_finite() {
                return Err(ConfigError::ParamRange {
                    name: p.name,
                    min: p.min,
                    max: p.max,
                });
            }
        }
        let active = model.active_params();
        if !active.is_empty() && self.histogram.len() != active.len() {
            return Err(ConfigError::HistogramSpecCount {
                expected: active.len(),
                got: self.histogram.len(),
            });
        }
        for (p, spec) in active.iter().zip(&self.histogram) {
            if spec.bins < 1 {
                return Err(ConfigError::ZeroCount { name: "bins" });
            }
            if spec.scale == BinScale::Log && p.min <= 0. {
                return Err(ConfigError::LogScaleNonPositive { name: p.name });
            }
        }
        for (index, r) in self.ranges.iter().enumerate() {
            if r.param >= active.len() {
                return Err(ConfigError::RangeParam {
                    index,
                    param: r.param,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sas_model::Sphere;

    #[test]
    fn default_config_is_valid() {
        let model = Sphere::default();
        assert!(McConfig::default().validate(&model).is_ok());
    }

    #[test]
    fn histogram_spec_count_must_match_active_params() {
        let model = Sphere::default();
        let cfg = McConfig {
            histogram: vec![HistogramSpec::default(); 2],
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(&model),
            Err(ConfigError::HistogramSpecCount {
                expected: 1,
                got: 2
            })
        ));
    }

    #[test]
    fn log_binning_requires_positive_minimum() {
        let model = Sphere::new(0., 1e-6);
        let cfg = McConfig {
            histogram: vec![HistogramSpec {
                scale: BinScale::Log,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(&model),
            Err(ConfigError::LogScaleNonPositive { name: "radius" })
        ));
    }

    #[test]
    fn bad_scalar_options_rejected() {
        let model = Sphere::default();
        let bad = [
            McConfig {
                num_contribs: 0,
                ..Default::default()
            },
            McConfig {
                convergence_target: 0.,
                ..Default::default()
            },
            McConfig {
                compensation_exponent: 1.5,
                ..Default::default()
            },
            McConfig {
                delta_rho_sq: -1.,
                ..Default::default()
            },
        ];
        for cfg in bad {
            assert!(cfg.validate(&model).is_err());
        }
    }

    #[test]
    fn range_param_index_checked() {
        let model = Sphere::default();
        let cfg = McConfig {
            ranges: vec![RangeSpec {
                param: 3,
                min: 0.,
                max: 1.,
                weighting: Weighting::Volume,
            }],
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(&model),
            Err(ConfigError::RangeParam { index: 0, param: 3 })
        ));
    }
}
