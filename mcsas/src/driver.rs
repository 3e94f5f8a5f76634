//! Repeats the Monte-Carlo optimization to build an ensemble.
//!
//! Repetitions are independent: each owns its random stream (derived from
//! the master seed and the repetition index) and its mutable contribution
//! state, so they fan out over rayon without any ordering between them.
//! Results are stored by repetition index, which makes the output
//! independent of the worker count.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, warn};
use rayon::prelude::*;

use crate::optimizer::{mc_fit, CachedIntensities, RecomputedIntensities};
use crate::prelude::*;
use crate::results::{Ensemble, RepOutcome};
use crate::{Run, RunState};

pub(crate) fn run_repetitions<M: ScatteringModel>(
    data: &Dataset,
    model: &M,
    cfg: &McConfig,
    num_contribs: usize,
    num_reps: usize,
    priors: Option<&[Vec<Vec<Float>>]>,
    stop: &StopFlag,
    progress: &dyn Progress,
) -> Ensemble {
    let start = instant::Instant::now();
    let completed = AtomicUsize::new(0);

    let outcomes: Vec<RepOutcome> = (0..num_reps)
        .into_par_iter()
        .map(|rep| {
            if stop.is_stopped() {
                return RepOutcome::Skipped;
            }
            let mut rng = RandomSource::for_repetition(cfg.seed, rep as u64);
            let prior = priors.and_then(|p| (!p.is_empty()).then(|| &p[rep % p.len()][..]));
            let attempts = cfg.max_retries + 2;
            let mut last_chi = Float::NAN;

            for attempt in 0..attempts {
                if stop.is_stopped() {
                    return RepOutcome::Skipped;
                }
                let run = if cfg.memsave {
                    mc_fit::<_, RecomputedIntensities>(
                        data, model, cfg, num_contribs, prior, &mut rng, stop,
                    )
                } else {
                    mc_fit::<_, CachedIntensities>(
                        data, model, cfg, num_contribs, prior, &mut rng, stop,
                    )
                };
                match run {
                    Ok(mut run) => match run.state {
                        RunState::Converged => {
                            run.attempt = attempt;
                            report(progress, &start, &completed, rep, num_reps, true, &run);
                            return RepOutcome::Done(run);
                        }
                        RunState::Cancelled => return RepOutcome::Skipped,
                        RunState::MaxIterations => {
                            last_chi = run.fit.chi_sq;
                            debug!(
                                "repetition {rep} attempt {attempt}: max iterations at chi2 {:.4}",
                                run.fit.chi_sq
                            );
                        }
                    },
                    Err(e) => {
                        warn!("repetition {rep} attempt {attempt}: fit failed: {e}");
                    }
                }
            }
            warn!(
                "repetition {rep}: convergence criterion not reached within \
                 {attempts} attempts (last chi2 {last_chi:.4}), discarding"
            );
            let done = completed.load(Ordering::Relaxed);
            progress.repetition(&update(&start, done, rep, num_reps, false, last_chi));
            RepOutcome::Failed
        })
        .collect();

    Ensemble {
        outcomes,
        cancelled: stop.is_stopped(),
        elapsed: start.elapsed().as_secs_f32(),
    }
}

fn report(
    progress: &dyn Progress,
    start: &instant::Instant,
    completed: &AtomicUsize,
    rep: usize,
    total: usize,
    converged: bool,
    run: &Run,
) {
    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
    progress.repetition(&update(start, done, rep, total, converged, run.fit.chi_sq));
}

fn update(
    start: &instant::Instant,
    completed: usize,
    rep: usize,
    total: usize,
    converged: bool,
    chi_sq: Float,
) -> ProgressUpdate {
    let elapsed_s = start.elapsed().as_secs_f32();
    let mean_s = elapsed_s / completed.max(1) as f32;
    ProgressUpdate {
        rep,
        completed,
        total,
        converged,
        chi_sq,
        elapsed_s,
        mean_s,
        remaining_s: mean_s * total.saturating_sub(completed) as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McConfig;
    use sas_data::RawCurve;
    use sas_model::Sphere;

    fn dataset() -> Dataset {
        // Smooth curve: q·r stays below the first form-factor zero, so no
        // deep minima inflate the initial χ².
        let model = Sphere::default();
        let q: Vec<Float> = (1..=40).map(|j| j as Float * 3e6).collect();
        let ff = model.form_factor(&q, &[30e-9]);
        let v = model.volume(&[30e-9]);
        let i: Vec<Float> = ff.iter().map(|f| 1e3 * f * f * v * v).collect();
        let sigma: Vec<Float> = i.iter().map(|&x| 0.1 * x.abs()).collect();
        Dataset::prepare(
            &RawCurve {
                q,
                i,
                sigma: Some(sigma),
                psi: None,
            },
            &Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn results_are_indexed_by_repetition_and_deterministic() {
        let data = dataset();
        let model = Sphere::new(1e-8, 1e-7);
        let cfg = McConfig {
            num_contribs: 10,
            num_reps: 4,
            max_iterations: 10_000,
            convergence_target: 10.,
            seed: 21,
            ..Default::default()
        };
        let a = run_repetitions(
            &data,
            &model,
            &cfg,
            10,
            4,
            None,
            &StopFlag::new(),
            &NoProgress,
        );
        let b = run_repetitions(
            &data,
            &model,
            &cfg,
            10,
            4,
            None,
            &StopFlag::new(),
            &NoProgress,
        );
        assert_eq!(a.outcomes.len(), 4);
        for (x, y) in a.outcomes.iter().zip(&b.outcomes) {
            match (x, y) {
                (RepOutcome::Done(rx), RepOutcome::Done(ry)) => {
                    assert_eq!(rx.rows, ry.rows);
                    assert_eq!(rx.fit.chi_sq, ry.fit.chi_sq);
                }
                _ => panic!("expected both ensembles completed"),
            }
        }
    }

    #[test]
    fn unreachable_target_discards_all_repetitions() {
        let data = dataset();
        let model = Sphere::new(1e-9, 5e-7);
        let cfg = McConfig {
            num_contribs: 8,
            num_reps: 2,
            max_iterations: 50,
            convergence_target: 1e-12,
            max_retries: 0,
            seed: 5,
            ..Default::default()
        };
        let ens = run_repetitions(
            &data,
            &model,
            &cfg,
            8,
            2,
            None,
            &StopFlag::new(),
            &NoProgress,
        );
        assert_eq!(ens.discarded(), 2);
        assert_eq!(ens.num_completed(), 0);
        assert!(!ens.cancelled);
    }

    #[test]
    fn stop_before_start_skips_everything() {
        let data = dataset();
        let model = Sphere::new(1e-9, 5e-7);
        let cfg = McConfig {
            num_reps: 3,
            ..Default::default()
        };
        let stop = StopFlag::new();
        stop.stop();
        let ens = run_repetitions(&data, &model, &cfg, 10, 3, None, &stop, &NoProgress);
        assert!(ens.cancelled);
        assert_eq!(ens.num_completed(), 0);
        assert_eq!(ens.discarded(), 0);
    }
}
