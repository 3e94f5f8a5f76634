//! Scale and background refit.
//!
//! Matches a model intensity to the measured curve by optimizing the two
//! scalars of Î = A·Ic + B against χ². The model is linear in (A, B), so the
//! weighted normal equations give the exact minimizer; a Nelder-Mead simplex
//! on reduced χ² is kept for cold starts and as a fallback when the linear
//! system degenerates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prelude::*;

/// Result of one scale/background fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fit {
    pub scale: Float,
    pub background: Float,
    /// Reduced χ² = (1/M)·Σ((I − (A·Ic + B))/σ)².
    pub chi_sq: Float,
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error("uncertainties contain zero entries")]
    ZeroSigma,
    #[error("model intensity is identically zero")]
    ZeroIntensity,
    #[error("normal equations are singular")]
    Singular,
    #[error("fit produced a non-finite result")]
    NonFinite,
}

/// Fitter bound to one measured curve.
pub struct ScaleBgFit<'a> {
    i: &'a [Float],
    sigma: &'a [Float],
    find_background: bool,
}

impl<'a> ScaleBgFit<'a> {
    pub fn new(i: &'a [Float], sigma: &'a [Float], find_background: bool) -> Self {
        debug_assert_eq!(i.len(), sigma.len());
        ScaleBgFit {
            i,
            sigma,
            find_background,
        }
    }

    pub fn reduced_chi_sq(&self, ic: &[Float], scale: Float, background: Float) -> Float {
        let sum: Float = self
            .i
            .iter()
            .zip(ic)
            .zip(self.sigma)
            .map(|((&i, &c), &s)| {
                let r = (i - (scale * c + background)) / s;
                r * r
            })
            .sum();
        sum / self.i.len() as Float
    }

    fn check(&self, ic: &[Float]) -> Result<(), FitError> {
        if self.sigma.iter().any(|&s| s == 0.) {
            return Err(FitError::ZeroSigma);
        }
        if ic.iter().all(|&c| c == 0.) {
            return Err(FitError::ZeroIntensity);
        }
        Ok(())
    }

    /// Exact weighted linear least squares via the normal equations.
    pub fn linear(&self, ic: &[Float]) -> Result<Fit, FitError> {
        self.check(ic)?;
        let mut s = 0.;
        let mut sx = 0.;
        let mut sy = 0.;
        let mut sxx = 0.;
        let mut sxy = 0.;
        for ((&i, &c), &sig) in self.i.iter().zip(ic).zip(self.sigma) {
            let w = 1. / (sig * sig);
            s += w;
            sx += w * c;
            sy += w * i;
            sxx += w * c * c;
            sxy += w * c * i;
        }
        let (scale, background) = if self.find_background {
            let delta = s * sxx - sx * sx;
            if !delta.is_finite() || delta.abs() <= 1e-12 * s * sxx {
                return Err(FitError::Singular);
            }
            ((s * sxy - sx * sy) / delta, (sxx * sy - sx * sxy) / delta)
        } else {
            if !sxx.is_finite() || sxx == 0. {
                return Err(FitError::Singular);
            }
            (sxy / sxx, 0.)
        };
        let fit = Fit {
            scale,
            background,
            chi_sq: self.reduced_chi_sq(ic, scale, background),
        };
        if !fit.scale.is_finite() || !fit.background.is_finite() || !fit.chi_sq.is_finite() {
            return Err(FitError::NonFinite);
        }
        Ok(fit)
    }

    /// Nelder-Mead on reduced χ², robust against a poor starting point.
    pub fn simplex(&self, ic: &[Float], init: (Float, Float)) -> Result<Fit, FitError> {
        self.check(ic)?;
        let dim = if self.find_background { 2 } else { 1 };
        let eval = |x: &[Float; 2]| self.reduced_chi_sq(ic, x[0], if dim == 2 { x[1] } else { 0. });

        // Initial simplex: perturb each coordinate by 5% (a fixed small step
        // when the coordinate is zero).
        let x0 = [init.0, init.1];
        let mut pts: Vec<[Float; 2]> = vec![x0];
        for d in 0..dim {
            let mut x = x0;
            x[d] = if x[d] != 0. { 1.05 * x[d] } else { 2.5e-4 };
            pts.push(x);
        }
        let mut fs: Vec<Float> = pts.iter().map(eval).collect();

        for _ in 0..200 * dim {
            // Order best..worst.
            let mut order: Vec<usize> = (0..pts.len()).collect();
            order.sort_by(|&a, &b| fs[a].total_cmp(&fs[b]));
            let (best, worst) = (order[0], order[dim]);
            if (fs[worst] - fs[best]).abs() <= 1e-10 * (fs[best].abs() + 1e-12) {
                break;
            }
            // Centroid of all but the worst point.
            let mut cen = [0.; 2];
            for &p in order.iter().take(dim) {
                for d in 0..dim {
                    cen[d] += pts[p][d] / dim as Float;
                }
            }
            let shifted = |t: Float| {
                let mut x = [0.; 2];
                for d in 0..dim {
                    x[d] = cen[d] + t * (pts[worst][d] - cen[d]);
                }
                x
            };
            let refl = shifted(-1.);
            let f_refl = eval(&refl);
            if f_refl < fs[best] {
                let exp = shifted(-2.);
                let f_exp = eval(&exp);
                if f_exp < f_refl {
                    pts[worst] = exp;
                    fs[worst] = f_exp;
                } else {
                    pts[worst] = refl;
                    fs[worst] = f_refl;
                }
            } else if f_refl < fs[order[dim - 1]] {
                pts[worst] = refl;
                fs[worst] = f_refl;
            } else {
                let con = shifted(0.5);
                let f_con = eval(&con);
                if f_con < fs[worst] {
                    pts[worst] = con;
                    fs[worst] = f_con;
                } else {
                    // Shrink towards the best point.
                    for &p in &order[1..] {
                        for d in 0..dim {
                            pts[p][d] = pts[best][d] + 0.5 * (pts[p][d] - pts[best][d]);
                        }
                        fs[p] = eval(&pts[p]);
                    }
                }
            }
        }

        let best = fs
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let fit = Fit {
            scale: pts[best][0],
            background: if dim == 2 { pts[best][1] } else { 0. },
            chi_sq: fs[best],
        };
        if !fit.chi_sq.is_finite() {
            return Err(FitError::NonFinite);
        }
        Ok(fit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(scale: Float, background: Float) -> (Vec<Float>, Vec<Float>, Vec<Float>) {
        let ic: Vec<Float> = (0..40).map(|j| 1e3 * (-0.1 * j as Float).exp()).collect();
        let i: Vec<Float> = ic.iter().map(|&c| scale * c + background).collect();
        let sigma: Vec<Float> = i.iter().map(|&v| 0.01 * v.abs().max(1e-3)).collect();
        (i, sigma, ic)
    }

    #[test]
    fn linear_recovers_exact_scale_and_background() {
        let (i, sigma, ic) = synthetic(3.5, 20.);
        let fit = ScaleBgFit::new(&i, &sigma, true).linear(&ic).unwrap();
        assert!((fit.scale - 3.5).abs() < 1e-10);
        assert!((fit.background - 20.).abs() < 1e-8);
        assert!(fit.chi_sq < 1e-18);
    }

    #[test]
    fn background_pinned_to_zero_when_disabled() {
        let (i, sigma, ic) = synthetic(2.0, 0.);
        let fit = ScaleBgFit::new(&i, &sigma, false).linear(&ic).unwrap();
        assert_eq!(fit.background, 0.);
        assert!((fit.scale - 2.0).abs() < 1e-10);
    }

    #[test]
    fn simplex_approaches_linear_solution() {
        let (i, sigma, ic) = synthetic(3.5, 20.);
        let fitter = ScaleBgFit::new(&i, &sigma, true);
        let exact = fitter.linear(&ic).unwrap();
        let cold = fitter.simplex(&ic, (1., 0.)).unwrap();
        // The simplex is only expected to land in the neighbourhood.
        assert!((cold.scale - exact.scale).abs() / exact.scale < 0.05);
        assert!(cold.chi_sq < 1.);
    }

    #[test]
    fn zero_sigma_rejected() {
        let (i, mut sigma, ic) = synthetic(1., 0.);
        sigma[3] = 0.;
        assert!(matches!(
            ScaleBgFit::new(&i, &sigma, true).linear(&ic),
            Err(FitError::ZeroSigma)
        ));
    }

    #[test]
    fn zero_model_intensity_rejected() {
        let (i, sigma, _) = synthetic(1., 0.);
        let ic = vec![0.; i.len()];
        assert!(matches!(
            ScaleBgFit::new(&i, &sigma, true).linear(&ic),
            Err(FitError::ZeroIntensity)
        ));
        assert!(matches!(
            ScaleBgFit::new(&i, &sigma, true).simplex(&ic, (1., 0.)),
            Err(FitError::ZeroIntensity)
        ));
    }

    #[test]
    fn constant_model_intensity_is_singular_with_background() {
        let (i, sigma, _) = synthetic(1., 0.);
        let ic = vec![5.; i.len()];
        assert!(matches!(
            ScaleBgFit::new(&i, &sigma, true).linear(&ic),
            Err(FitError::Singular)
        ));
        // Without a background the degeneracy disappears.
        assert!(ScaleBgFit::new(&i, &sigma, false).linear(&ic).is_ok());
    }
}
