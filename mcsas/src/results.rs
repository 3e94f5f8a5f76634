use serde::Serialize;

use crate::histogram::{ParamHistogram, RangeMoments};
use crate::prelude::*;
use crate::stats::RunStats;
use crate::Run;

/// Outcome of one repetition slot.
#[derive(Debug, Clone)]
pub enum RepOutcome {
    Done(Run),
    /// Abandoned after exhausting all attempts.
    Failed,
    /// Never ran to completion because of cancellation.
    Skipped,
}

/// The repetitions of one analysis, indexed by repetition number.
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub outcomes: Vec<RepOutcome>,
    pub cancelled: bool,
    pub elapsed: f32,
}

impl Ensemble {
    pub fn completed(&self) -> impl Iterator<Item = (usize, &Run)> + '_ {
        self.outcomes.iter().enumerate().filter_map(|(i, o)| match o {
            RepOutcome::Done(run) => Some((i, run)),
            _ => None,
        })
    }

    pub fn num_completed(&self) -> usize {
        self.completed().count()
    }

    /// Repetitions abandoned for non-convergence (cancellation skips are
    /// not counted).
    pub fn discarded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RepOutcome::Failed))
            .count()
    }
}

/// Everything an analysis reports.
#[derive(Debug, Clone, Serialize)]
pub struct McResults {
    /// Masked q grid all curves live on.
    pub q: Vec<Float>,
    /// Ensemble mean and spread of the fitted curves.
    pub fit_mean: Vec<Float>,
    pub fit_std: Vec<Float>,
    /// Scale and background per completed repetition, from the
    /// histogrammer's authoritative refit.
    pub scales: Vec<[Float; 2]>,
    /// Contribution tables of the completed repetitions,
    /// `contribs[rep][contribution][active parameter]`. Feed back as
    /// priors to resume.
    pub contribs: Vec<Vec<Vec<Float>>>,
    pub mean_iterations: Float,
    /// Repetitions abandoned for non-convergence.
    pub discarded: usize,
    pub cancelled: bool,
    pub stats: RunStats,
    /// One histogram per active model parameter.
    pub histograms: Vec<ParamHistogram>,
    /// Moment analyses for the configured sub-ranges.
    pub moments: Vec<RangeMoments>,
}
