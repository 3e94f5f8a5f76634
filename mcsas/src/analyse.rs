use log::info;
use thiserror::Error;

use crate::driver::run_repetitions;
use crate::histogram::Histogrammer;
use crate::prelude::*;
use crate::results::McResults;
use crate::stats::RunStats;

#[derive(Debug, Error)]
pub enum McError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] sas_data::DataError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error("cancelled before any repetition completed")]
    Cancelled,
}

/// Ties dataset, model, config and optional priors together and runs the
/// whole analysis: R Monte-Carlo repetitions followed by histogramming.
pub struct McSas<'a, M: ScatteringModel> {
    pub data: &'a Dataset,
    pub model: &'a M,
    pub config: &'a McConfig,
    /// Contribution tables from an earlier analysis; repetition r starts
    /// from table r mod len.
    pub priors: Option<&'a [Vec<Vec<Float>>]>,
}

impl<'a, M: ScatteringModel> McSas<'a, M> {
    pub fn analyse(
        &self,
        stop: &StopFlag,
        progress: &dyn Progress,
    ) -> Result<McResults, McError> {
        let cfg = self.config;
        cfg.validate(self.model)?;
        let k = self.model.active_count();
        if let Some(priors) = self.priors {
            for (t, table) in priors.iter().enumerate() {
                if let Some(row) = table.iter().find(|row| row.len() != k) {
                    return Err(ConfigError::PriorShape {
                        row: t,
                        expected: k,
                        got: row.len(),
                    }
                    .into());
                }
            }
        }

        // Without any active parameter there is nothing to distribute:
        // a single contribution, fitted once.
        let (num_contribs, num_reps) = if k == 0 {
            (1, 1)
        } else {
            (cfg.num_contribs, cfg.num_reps)
        };

        let ensemble = run_repetitions(
            self.data,
            self.model,
            cfg,
            num_contribs,
            num_reps,
            self.priors,
            stop,
            progress,
        );
        if ensemble.num_completed() == 0 && ensemble.cancelled {
            return Err(McError::Cancelled);
        }
        info!(
            "{} of {num_reps} repetitions completed in {:.1}s ({} discarded)",
            ensemble.num_completed(),
            ensemble.elapsed,
            ensemble.discarded()
        );

        let analysis = Histogrammer {
            data: self.data,
            model: self.model,
            cfg,
        }
        .analyse(&ensemble)?;

        let m = self.data.len();
        let curves: Vec<&[Float]> = ensemble.completed().map(|(_, r)| &r.fitted[..]).collect();
        let mut fit_mean = vec![0.; m];
        let mut fit_std = vec![0.; m];
        if !curves.is_empty() {
            let n = curves.len() as Float;
            for j in 0..m {
                let mean = curves.iter().map(|c| c[j]).sum::<Float>() / n;
                let var = curves.iter().map(|c| (c[j] - mean).powi(2)).sum::<Float>() / n;
                fit_mean[j] = mean;
                fit_std[j] = var.sqrt();
            }
        }

        let mut stats = RunStats::default();
        for (_, run) in ensemble.completed() {
            stats += RunStats {
                sample_size: 1,
                iterations: run.iterations,
                moves: run.moves,
                attempts: run.attempt + 1,
                discarded: 0,
                chi_sq: run.fit.chi_sq,
                elapsed: run.elapsed,
            };
        }
        stats.discarded = ensemble.discarded();
        stats.elapsed = ensemble.elapsed;
        let mean_iterations = stats.iterations as Float / ensemble.num_completed().max(1) as Float;

        Ok(McResults {
            q: self.data.q().to_vec(),
            fit_mean,
            fit_std,
            scales: analysis.scales,
            contribs: ensemble.completed().map(|(_, r)| r.rows.clone()).collect(),
            mean_iterations,
            discarded: ensemble.discarded(),
            cancelled: ensemble.cancelled,
            stats,
            histograms: analysis.histograms,
            moments: analysis.moments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use sas_data::RawCurve;
    use sas_model::Sphere;

    fn dataset() -> Dataset {
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
    fn invalid_config_is_fatal_before_any_work() {
        let data = dataset();
        let model = Sphere::new(1e-8, 1e-7);
        let cfg = McConfig {
            num_reps: 0,
            ..Default::default()
        };
        let mc = McSas {
            data: &data,
            model: &model,
            config: &cfg,
            priors: None,
        };
        assert!(matches!(
            mc.analyse(&StopFlag::new(), &NoProgress),
            Err(McError::Config(ConfigError::ZeroCount { name: "num_reps" }))
        ));
    }

    #[test]
    fn prior_row_width_checked() {
        let data = dataset();
        let model = Sphere::new(1e-8, 1e-7);
        let cfg = McConfig::default();
        let priors = vec![vec![vec![3e-8, 1.]]];
        let mc = McSas {
            data: &data,
            model: &model,
            config: &cfg,
            priors: Some(&priors),
        };
        assert!(matches!(
            mc.analyse(&StopFlag::new(), &NoProgress),
            Err(McError::Config(ConfigError::PriorShape {
                row: 0,
                expected: 1,
                got: 2
            }))
        ));
    }

    #[test]
    fn cancellation_before_start_is_an_error() {
        let data = dataset();
        let model = Sphere::new(1e-8, 1e-7);
        let cfg = McConfig::default();
        let stop = StopFlag::new();
        stop.stop();
        let mc = McSas {
            data: &data,
            model: &model,
            config: &cfg,
            priors: None,
        };
        assert!(matches!(
            mc.analyse(&stop, &NoProgress),
            Err(McError::Cancelled)
        ));
    }
}
