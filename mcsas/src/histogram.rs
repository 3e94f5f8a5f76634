//! Turns an ensemble of contribution tables into reported distributions.
//!
//! All quantities here are recomputed from the stored rows; the optimizer's
//! incremental bookkeeping is never trusted for reporting. Per repetition
//! that means one scale/background refit against the unscaled total
//! intensity, volume and number fractions per contribution, and the
//! observability limit: the smallest fraction a contribution would need to
//! rise above the local uncertainty anywhere in the curve.

use itertools::Itertools;
use log::warn;
use serde::Serialize;

use crate::optimizer::row_intensity;
use crate::prelude::*;
use crate::results::Ensemble;

/// Histogram of one active parameter over the whole ensemble.
#[derive(Debug, Clone, Serialize)]
pub struct ParamHistogram {
    pub param: String,
    pub scale: BinScale,
    /// Preferred weighting for reporting, straight from the config.
    pub weighting: Weighting,
    /// B+1 bin edges.
    pub edges: Vec<Float>,
    pub centers: Vec<Float>,
    pub widths: Vec<Float>,
    /// Per-bin sums for each completed repetition, `[bin][rep]`.
    pub vol_reps: Vec<Vec<Float>>,
    pub num_reps: Vec<Vec<Float>>,
    pub vol_mean: Vec<Float>,
    pub vol_std: Vec<Float>,
    pub num_mean: Vec<Float>,
    pub num_std: Vec<Float>,
    /// Minimum fraction per bin required for statistical significance,
    /// maximized over repetitions.
    pub vol_min_required: Vec<Float>,
    pub num_min_required: Vec<Float>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MeanStd {
    pub mean: Float,
    pub std: Float,
}

/// Distribution moments over one parameter sub-range.
#[derive(Debug, Clone, Serialize)]
pub struct RangeMoments {
    pub param: usize,
    pub weighting: Weighting,
    pub min: Float,
    pub max: Float,
    /// Total weight (volume or number fraction) inside the range.
    pub total: MeanStd,
    pub mean: MeanStd,
    pub variance: MeanStd,
    pub skew: MeanStd,
    pub kurtosis: MeanStd,
    pub partial_intensity_mean: Vec<Float>,
    pub partial_intensity_std: Vec<Float>,
}

/// Per-repetition fractions and observability limits.
struct RepFractions {
    vol: Vec<Float>,
    num: Vec<Float>,
    min_vol: Vec<Float>,
    min_num: Vec<Float>,
    fit: Fit,
}

pub(crate) struct Analysis {
    pub scales: Vec<[Float; 2]>,
    pub histograms: Vec<ParamHistogram>,
    pub moments: Vec<RangeMoments>,
}

pub(crate) struct Histogrammer<'a, M: ScatteringModel> {
    pub data: &'a Dataset,
    pub model: &'a M,
    pub cfg: &'a McConfig,
}

impl<'a, M: ScatteringModel> Histogrammer<'a, M> {
    pub fn analyse(&self, ensemble: &Ensemble) -> Result<Analysis, FitError> {
        let reps: Vec<&Vec<Vec<Float>>> =
            ensemble.completed().map(|(_, run)| &run.rows).collect();
        let fractions = reps
            .iter()
            .map(|rows| self.fractions(rows))
            .collect::<Result<Vec<_>, _>>()?;
        let scales = fractions
            .iter()
            .map(|f| [f.fit.scale, f.fit.background])
            .collect();

        let active = self.model.active_params();
        let mut histograms = Vec::with_capacity(active.len());
        for (j, (param, spec)) in active.iter().zip(&self.cfg.histogram).enumerate() {
            histograms.push(self.histogram(j, param.name, *spec, &reps, &fractions));
        }
        let moments = self
            .cfg
            .ranges
            .iter()
            .map(|spec| self.range_moments(spec, &reps, &fractions))
            .collect();

        Ok(Analysis {
            scales,
            histograms,
            moments,
        })
    }

    /// Volume/number fractions and observability limits for one repetition.
    fn fractions(&self, rows: &[Vec<Float>]) -> Result<RepFractions, FitError> {
        let q = self.data.q();
        let m = q.len();
        let n = rows.len();
        let alpha = self.cfg.compensation_exponent;

        let mut full = Vec::with_capacity(self.model.params().len());
        let mut vsa = Vec::with_capacity(n);
        let mut vpa = Vec::with_capacity(n);
        let mut itot = vec![0.; m];
        for row in rows {
            self.model.expand_into(row, &mut full);
            let v = self.model.volume(&full);
            let va = v.powf(alpha);
            let ii = row_intensity(self.model, q, row, va);
            for (t, x) in itot.iter_mut().zip(&ii) {
                *t += x;
            }
            vpa.push(v);
            vsa.push(va);
        }
        self.model.smear(&mut itot);

        let fitter = ScaleBgFit::new(self.data.i(), self.data.sigma(), self.cfg.find_background);
        let fit = fitter.linear(&itot)?;
        let a = fit.scale;

        let mut vol = Vec::with_capacity(n);
        for i in 0..n {
            vol.push(a * vsa[i] * vsa[i] / (vpa[i] * self.cfg.delta_rho_sq));
        }
        let total_num: Float = vol.iter().zip(&vpa).map(|(v, p)| v / p).sum();

        let mut num = Vec::with_capacity(n);
        let mut min_vol = Vec::with_capacity(n);
        let mut min_num = Vec::with_capacity(n);
        let sigma = self.data.sigma();
        for i in 0..n {
            // The contribution's own spectrum, for its observability limit.
            let ir = row_intensity(self.model, q, &rows[i], vsa[i]);
            let mut mv = Float::INFINITY;
            for j in 0..m {
                let denom = a * ir[j];
                if denom > 0. {
                    mv = mv.min(sigma[j] * vol[i] / denom);
                }
            }
            num.push(vol[i] / vpa[i] / total_num);
            min_vol.push(mv);
            min_num.push(mv / vpa[i] / total_num);
        }

        Ok(RepFractions {
            vol,
            num,
            min_vol,
            min_num,
            fit,
        })
    }

    fn histogram(
        &self,
        j: usize,
        name: &str,
        spec: HistogramSpec,
        reps: &[&Vec<Vec<Float>>],
        fractions: &[RepFractions],
    ) -> ParamHistogram {
        let param = self.model.active_params()[j];
        let edges = match spec.scale {
            BinScale::Linear => linspace(param.min, param.max, spec.bins + 1),
            BinScale::Log => linspace(param.min.log10(), param.max.log10(), spec.bins + 1)
                .into_iter()
                .map(|x| 10f64.powf(x))
                .collect(),
        };
        let centers = edges.iter().tuple_windows().map(|(a, b)| (a + b) / 2.).collect();
        let widths = edges.iter().tuple_windows().map(|(a, b)| b - a).collect();

        let nreps = reps.len();
        let mut vol_reps = vec![vec![0.; nreps]; spec.bins];
        let mut num_reps = vec![vec![0.; nreps]; spec.bins];
        let mut min_vol_bins = vec![vec![0.; nreps]; spec.bins];
        let mut min_num_bins = vec![vec![0.; nreps]; spec.bins];

        for (ri, (rows, frac)) in reps.iter().zip(fractions).enumerate() {
            for b in 0..spec.bins {
                let members: Vec<usize> = (0..rows.len())
                    .filter(|&i| edges[b] <= rows[i][j] && rows[i][j] < edges[b + 1])
                    .collect();
                let vsum: Float = members.iter().map(|&i| frac.vol[i]).sum();
                let nsum: Float = members.iter().map(|&i| frac.num[i]).sum();
                vol_reps[b][ri] = if vsum.is_finite() { vsum } else { 0. };
                num_reps[b][ri] = if nsum.is_finite() { nsum } else { 0. };
                if !members.is_empty() {
                    let c = members.len() as Float;
                    min_vol_bins[b][ri] =
                        members.iter().map(|&i| frac.min_vol[i]).sum::<Float>() / c;
                    min_num_bins[b][ri] =
                        members.iter().map(|&i| frac.min_num[i]).sum::<Float>() / c;
                }
            }
        }

        let (vol_mean, vol_std) = rows_mean_std(&vol_reps);
        let (num_mean, num_std) = rows_mean_std(&num_reps);
        let max_finite = |bins: &Vec<Vec<Float>>| -> Vec<Float> {
            bins.iter()
                .map(|per_rep| {
                    per_rep
                        .iter()
                        .copied()
                        .filter(|v| v.is_finite())
                        .fold(0., Float::max)
                })
                .collect()
        };

        ParamHistogram {
            param: name.to_string(),
            scale: spec.scale,
            weighting: spec.weighting,
            edges,
            centers,
            widths,
            vol_min_required: max_finite(&min_vol_bins),
            num_min_required: max_finite(&min_num_bins),
            vol_reps,
            num_reps,
            vol_mean,
            vol_std,
            num_mean,
            num_std,
        }
    }

    fn range_moments(
        &self,
        spec: &RangeSpec,
        reps: &[&Vec<Vec<Float>>],
        fractions: &[RepFractions],
    ) -> RangeMoments {
        let j = spec.param;
        let alpha = self.cfg.compensation_exponent;
        let m = self.data.len();
        let nreps = reps.len();

        let mut totals = Vec::with_capacity(nreps);
        let mut mus = Vec::with_capacity(nreps);
        let mut vars = Vec::with_capacity(nreps);
        let mut skews = Vec::with_capacity(nreps);
        let mut kurts = Vec::with_capacity(nreps);
        let mut partials: Vec<Vec<Float>> = Vec::with_capacity(nreps);

        for (rows, frac) in reps.iter().zip(fractions) {
            let sel: Vec<usize> = (0..rows.len())
                .filter(|&i| spec.min < rows[i][j] && rows[i][j] < spec.max)
                .collect();
            let w: Vec<Float> = sel
                .iter()
                .map(|&i| match spec.weighting {
                    Weighting::Volume => frac.vol[i],
                    Weighting::Number => frac.num[i],
                })
                .collect();
            let p: Vec<Float> = sel.iter().map(|&i| rows[i][j]).collect();

            let wsum: Float = w.iter().sum();
            let mu = p.iter().zip(&w).map(|(p, w)| p * w).sum::<Float>() / wsum;
            let var = p.iter().zip(&w).map(|(p, w)| (p - mu).powi(2) * w).sum::<Float>() / wsum;
            let sd = var.abs().sqrt();
            let skw =
                p.iter().zip(&w).map(|(p, w)| (p - mu).powi(3) * w).sum::<Float>() / (wsum * sd.powi(3));
            let krt =
                p.iter().zip(&w).map(|(p, w)| (p - mu).powi(4) * w).sum::<Float>() / (wsum * sd.powi(4));
            totals.push(wsum);
            mus.push(mu);
            vars.push(var);
            skews.push(skw);
            kurts.push(krt);

            // Partial intensity of the sub-population, on the fit's scale.
            let mut it = vec![0.; m];
            let mut vs = 0.;
            for &i in &sel {
                let mut full = Vec::new();
                self.model.expand_into(&rows[i], &mut full);
                let va = self.model.volume(&full).powf(alpha);
                let ii = row_intensity(self.model, self.data.q(), &rows[i], va);
                for (t, x) in it.iter_mut().zip(&ii) {
                    *t += x;
                }
                vs += va * va;
            }
            self.model.smear(&mut it);
            partials.push(it.into_iter().map(|x| frac.fit.scale * x / vs).collect());
        }

        if totals.iter().any(|t| *t == 0.) {
            warn!(
                "moment range [{}, {}] on parameter {} has empty repetitions",
                spec.min, spec.max, j
            );
        }

        let (partial_intensity_mean, partial_intensity_std) = rows_mean_std(
            &(0..m)
                .map(|qi| partials.iter().map(|p| p[qi]).collect())
                .collect::<Vec<Vec<Float>>>(),
        );

        RangeMoments {
            param: j,
            weighting: spec.weighting,
            min: spec.min,
            max: spec.max,
            total: mean_std_sample(&totals),
            mean: mean_std_sample(&mus),
            variance: mean_std_sample(&vars),
            skew: mean_std_sample(&skews),
            kurtosis: mean_std_sample(&kurts),
            partial_intensity_mean,
            partial_intensity_std,
        }
    }
}

fn linspace(a: Float, b: Float, n: usize) -> Vec<Float> {
    (0..n)
        .map(|j| a + (b - a) * j as Float / (n - 1) as Float)
        .collect()
}

/// Population mean and std of each row over its entries.
fn rows_mean_std(rows: &[Vec<Float>]) -> (Vec<Float>, Vec<Float>) {
    rows.iter()
        .map(|xs| {
            if xs.is_empty() {
                return (0., 0.);
            }
            let n = xs.len() as Float;
            let mean = xs.iter().sum::<Float>() / n;
            let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<Float>() / n;
            (mean, var.sqrt())
        })
        .unzip()
}

/// Ensemble mean with sample standard deviation (ddof = 1).
fn mean_std_sample(xs: &[Float]) -> MeanStd {
    if xs.is_empty() {
        return MeanStd { mean: 0., std: 0. };
    }
    let n = xs.len() as Float;
    let mean = xs.iter().sum::<Float>() / n;
    let std = if xs.len() > 1 {
        (xs.iter().map(|x| (x - mean).powi(2)).sum::<Float>() / (n - 1.)).sqrt()
    } else {
        0.
    };
    MeanStd { mean, std }
}
