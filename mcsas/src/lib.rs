//! Monte-Carlo inversion of small-angle scattering curves.
//!
//! Given a measured curve I(q) ± σ(q) and a [`sas_model::ScatteringModel`],
//! the engine recovers a form-free size distribution: [`McSas::analyse`]
//! runs R independent contribution-swap optimizations, then histograms the
//! ensemble into volume- and number-weighted distributions with per-bin
//! observability limits.

mod analyse;
mod config;
mod driver;
mod histogram;
mod optimizer;
mod progress;
mod results;
mod scalebg;
mod stats;

pub use analyse::{McError, McSas};
pub use config::{BinScale, ConfigError, HistogramSpec, McConfig, RangeSpec, Weighting};
pub use histogram::{MeanStd, ParamHistogram, RangeMoments};
pub use optimizer::{Run, RunState};
pub use progress::{NoProgress, Progress, ProgressUpdate, StopFlag};
pub use results::{Ensemble, McResults, RepOutcome};
pub use scalebg::{Fit, FitError, ScaleBgFit};
pub use stats::RunStats;

mod prelude {
    pub(crate) use sas_data::{Dataset, Float, MaskOptions};
    pub(crate) use sas_model::{RandomSource, ScatteringModel};

    pub(crate) use crate::config::*;
    pub(crate) use crate::progress::{NoProgress, Progress, ProgressUpdate, StopFlag};
    pub(crate) use crate::scalebg::{Fit, FitError, ScaleBgFit};
}
