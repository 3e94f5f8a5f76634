//! One Monte-Carlo run: contribution-swap optimization of a fixed-size set
//! of scatterers against the measured curve.
//!
//! Each iteration proposes a replacement for one contribution (a rotating
//! index walks the set), rebuilds the total intensity incrementally in
//! O(M) instead of O(N·M), refits scale and background, and accepts the
//! swap iff the reduced χ² improves.

use std::borrow::Cow;
use std::f64::consts::PI;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Result of one repetition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// N rows of active-parameter values.
    pub rows: Vec<Vec<Float>>,
    /// Fitted curve Î = A·smear(It)/Vs + B on the masked q grid.
    pub fitted: Vec<Float>,
    pub fit: Fit,
    pub iterations: usize,
    /// Accepted swaps.
    pub moves: usize,
    pub state: RunState,
    /// Attempt index within the repetition; set by the driver.
    pub attempt: usize,
    pub elapsed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Converged,
    MaxIterations,
    Cancelled,
}

/// Storage strategy for per-contribution intensities.
///
/// The cached variant trades N·M floats of memory for O(M) outgoing-row
/// lookup; the memsave variant stores nothing and recomputes the outgoing
/// row from the model on every proposal.
pub(crate) trait IntensityStore {
    fn with_capacity(n: usize) -> Self;
    fn push(&mut self, ii: Vec<Float>);
    fn outgoing(&self, r: usize, recompute: impl FnOnce() -> Vec<Float>) -> Cow<'_, [Float]>;
    fn replace(&mut self, r: usize, ii: Vec<Float>);
}

pub(crate) struct CachedIntensities {
    iset: Vec<Vec<Float>>,
}

impl IntensityStore for CachedIntensities {
    fn with_capacity(n: usize) -> Self {
        CachedIntensities {
            iset: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, ii: Vec<Float>) {
        self.iset.push(ii);
    }

    fn outgoing(&self, r: usize, _recompute: impl FnOnce() -> Vec<Float>) -> Cow<'_, [Float]> {
        Cow::Borrowed(&self.iset[r])
    }

    fn replace(&mut self, r: usize, ii: Vec<Float>) {
        self.iset[r] = ii;
    }
}

pub(crate) struct RecomputedIntensities;

impl IntensityStore for RecomputedIntensities {
    fn with_capacity(_n: usize) -> Self {
        RecomputedIntensities
    }

    fn push(&mut self, _ii: Vec<Float>) {}

    fn outgoing(&self, _r: usize, recompute: impl FnOnce() -> Vec<Float>) -> Cow<'_, [Float]> {
        Cow::Owned(recompute())
    }

    fn replace(&mut self, _r: usize, _ii: Vec<Float>) {}
}

/// Per-contribution intensity F(q;p)²·V² for one row.
pub(crate) fn row_intensity<M: ScatteringModel + ?Sized>(
    model: &M,
    q: &[Float],
    row: &[Float],
    v: Float,
) -> Vec<Float> {
    let mut full = Vec::with_capacity(model.params().len());
    model.expand_into(row, &mut full);
    let ff = model.form_factor(q, &full);
    ff.into_iter().map(|f| f * f * v * v).collect()
}

/// Single-swap update of Vs = Σ Vᵢ². Approximate unless the outgoing row
/// dominates the sum; the scale factor absorbs the drift and the final
/// pass recomputes Vs exactly.
pub(crate) fn vs_update(vs: Float, v_out: Float, v_in: Float) -> Float {
    let s = vs.sqrt() - v_out;
    s * s + v_in * v_in
}

fn initial_rows<M: ScatteringModel + ?Sized>(
    model: &M,
    data: &Dataset,
    cfg: &McConfig,
    n: usize,
    prior: Option<&[Vec<Float>]>,
    rng: &mut RandomSource,
) -> Vec<Vec<Float>> {
    if let Some(prior) = prior {
        return resize_prior(prior, n, rng);
    }
    if cfg.start_from_minimum {
        let row: Vec<Float> = model
            .active_params()
            .iter()
            .map(|p| {
                if p.min > 0. {
                    p.min
                } else {
                    (PI / data.q_max()).min(p.max)
                }
            })
            .collect();
        return vec![row; n];
    }
    model.sample(n, rng)
}

/// Bring a prior contribution table to exactly `n` rows by random
/// duplication or random subselection (with replacement, as the original).
fn resize_prior(prior: &[Vec<Float>], n: usize, rng: &mut RandomSource) -> Vec<Vec<Float>> {
    if prior.len() == n {
        return prior.to_vec();
    }
    if prior.len() < n {
        debug!(
            "prior has {} rows, duplicating random rows up to {n}",
            prior.len()
        );
        let mut rows = prior.to_vec();
        while rows.len() < n {
            rows.push(prior[rng.integer(prior.len())].clone());
        }
        return rows;
    }
    debug!(
        "prior has {} rows, subselecting {n} random rows",
        prior.len()
    );
    (0..n).map(|_| prior[rng.integer(prior.len())].clone()).collect()
}

pub(crate) fn mc_fit<M: ScatteringModel + ?Sized, S: IntensityStore>(
    data: &Dataset,
    model: &M,
    cfg: &McConfig,
    n: usize,
    prior: Option<&[Vec<Float>]>,
    rng: &mut RandomSource,
    stop: &StopFlag,
) -> Result<Run, FitError> {
    let start = instant::Instant::now();
    let q = data.q();
    let m = q.len();
    let alpha = cfg.compensation_exponent;

    let mut rows = initial_rows(model, data, cfg, n, prior, rng);

    // Per-contribution compensated volumes and intensities, and their sums.
    let mut full = Vec::with_capacity(model.params().len());
    let mut vols = Vec::with_capacity(n);
    let mut store = S::with_capacity(n);
    let mut itot = vec![0.; m];
    for row in &rows {
        model.expand_into(row, &mut full);
        let v = model.volume(&full).powf(alpha);
        let ii = row_intensity(model, q, row, v);
        for (t, x) in itot.iter_mut().zip(&ii) {
            *t += x;
        }
        vols.push(v);
        store.push(ii);
    }
    let mut vsq: Float = vols.iter().map(|v| v * v).sum();

    let fitter = ScaleBgFit::new(data.i(), data.sigma(), cfg.find_background);
    let scaled = |it: &[Float], vs: Float| -> Vec<Float> {
        let mut ic = it.to_vec();
        model.smear(&mut ic);
        for x in &mut ic {
            *x /= vs;
        }
        ic
    };

    // Cold simplex first, then the exact linear solve. The simplex result
    // stands in when the linear system degenerates (e.g. a constant model
    // intensity with a free background).
    let ic0 = scaled(&itot, vsq);
    let guess = cold_guess(data.i(), &ic0);
    let cold = fitter.simplex(&ic0, guess)?;
    let mut fit = match fitter.linear(&ic0) {
        Ok(f) => f,
        Err(e) => {
            debug!("linear refinement failed ({e}), keeping simplex result");
            cold
        }
    };
    trace!("initial chi2 {:.6}", fit.chi_sq);

    let target = cfg.convergence_target;
    let mut iters = 0;
    let mut moves = 0;
    let mut non_accepted = 0usize;
    let mut r = 0;
    let mut cancelled = false;
    let mut cand = vec![0.; m];

    while n > 1 && fit.chi_sq > target && iters < cfg.max_iterations {
        if stop.is_stopped() {
            cancelled = true;
            break;
        }
        let rt = model.sample_row(rng);
        model.expand_into(&rt, &mut full);
        let vt = model.volume(&full).powf(alpha);
        let it_new = row_intensity(model, q, &rt, vt);

        {
            let io = store.outgoing(r, || row_intensity(model, q, &rows[r], vols[r]));
            for j in 0..m {
                cand[j] = itot[j] - io[j] + it_new[j];
            }
        }
        let vs_cand = vs_update(vsq, vols[r], vt);

        let trial = fitter.linear(&scaled(&cand, vs_cand))?;
        if trial.chi_sq < fit.chi_sq {
            rows[r] = rt;
            vols[r] = vt;
            store.replace(r, it_new);
            std::mem::swap(&mut itot, &mut cand);
            vsq = vs_cand;
            fit = trial;
            moves += 1;
            non_accepted = 0;
            trace!("improvement at iteration {iters}: chi2 {:.6} of {target}", fit.chi_sq);
        } else {
            non_accepted += 1;
        }
        r = (r + 1) % n;
        iters += 1;
    }

    let elapsed = start.elapsed().as_secs_f32();
    debug!(
        "{moves} accepted moves in {iters} iterations ({:.0}/s), {non_accepted} rejected since the last accepted one",
        iters as f32 / elapsed.max(1e-3)
    );
    let state = if cancelled {
        RunState::Cancelled
    } else if fit.chi_sq <= target || n <= 1 {
        RunState::Converged
    } else {
        RunState::MaxIterations
    };

    // Final pass from the exact volume sum; the incremental Vs is only ever
    // a fitting aid.
    let vs_exact: Float = vols.iter().map(|v| v * v).sum();
    let ifinal = scaled(&itot, vs_exact);
    let fit = fitter.linear(&ifinal)?;
    let fitted = ifinal
        .iter()
        .map(|x| fit.scale * x + fit.background)
        .collect();

    Ok(Run {
        rows,
        fitted,
        fit,
        iterations: iters,
        moves,
        state,
        attempt: 0,
        elapsed,
    })
}

fn cold_guess(i: &[Float], ic: &[Float]) -> (Float, Float) {
    let imax = i.iter().copied().fold(Float::MIN, Float::max);
    let icmax = ic.iter().copied().fold(Float::MIN, Float::max);
    let imin = i.iter().copied().fold(Float::MAX, Float::min);
    let scale = if icmax > 0. { imax / icmax } else { 1. };
    (scale, imin)
}
