use std::f64::consts::{FRAC_PI_2, PI};

use crate::{FitParam, Float, SampleMode, ScatteringModel};

/// Cylinder with isotropically distributed orientation, parameterized by
/// radius and aspect ratio L/(2R). The orientation average integrates the
/// Pedersen (1997) cylinder amplitude over a midpoint grid of polar angles,
/// which keeps both sinψ and cosψ away from zero.
#[derive(Debug, Clone)]
pub struct CylinderIsotropic {
    params: [FitParam; 2],
    psi_steps: usize,
}

impl CylinderIsotropic {
    pub fn new(r_min: Float, r_max: Float, aspect: Float) -> Self {
        CylinderIsotropic {
            params: [
                FitParam::new("radius", "m", 1e-9, r_min, r_max)
                    .active()
                    .mode(SampleMode::Log),
                FitParam::new("aspect", "-", aspect, 1., 20.),
            ],
            psi_steps: 90,
        }
    }

    pub fn psi_steps(mut self, n: usize) -> Self {
        self.psi_steps = n.max(1);
        self
    }
}

impl Default for CylinderIsotropic {
    fn default() -> Self {
        CylinderIsotropic::new(1.0e-10, 1.0e-6, 10.)
    }
}

impl ScatteringModel for CylinderIsotropic {
    fn name(&self) -> &'static str {
        "cylinder"
    }

    fn params(&self) -> &[FitParam] {
        &self.params
    }

    fn form_factor(&self, q: &[Float], row: &[Float]) -> Vec<Float> {
        let (r, aspect) = (row[0], row[1]);
        let step = FRAC_PI_2 / self.psi_steps as Float;
        q.iter()
            .map(|&q| {
                let mut acc = 0.;
                for j in 0..self.psi_steps {
                    let psi = (j as Float + 0.5) * step;
                    let a_cross = sinc_j1(q * r * psi.sin());
                    // q * (L/2) * cos psi with L = 2 R aspect.
                    let a_len = sinc(q * r * aspect * psi.cos());
                    let f = a_cross * a_len;
                    acc += f * f;
                }
                (acc / self.psi_steps as Float).sqrt()
            })
            .collect()
    }

    fn volume(&self, row: &[Float]) -> Float {
        let (r, aspect) = (row[0], row[1]);
        PI * r * r * (2. * r * aspect)
    }
}

/// 2 J1(x)/x, continuous at 0.
fn sinc_j1(x: Float) -> Float {
    if x.abs() < 1e-8 {
        1.
    } else {
        2. * bessel_j1(x) / x
    }
}

/// sin(x)/x, continuous at 0.
fn sinc(x: Float) -> Float {
    if x.abs() < 1e-8 {
        1.
    } else {
        x.sin() / x
    }
}

/// J1 by the Abramowitz & Stegun 9.4 rational approximations
/// (|x| < 8 direct, else asymptotic form); ~1e-8 absolute accuracy.
fn bessel_j1(x: Float) -> Float {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let p1 = x * (72362614232.0
            + y * (-7895059235.0
                + y * (242396853.1 + y * (-2972611.439 + y * (15704.48260 + y * -30.16036606)))));
        let p2 = 144725228442.0
            + y * (2300535178.0 + y * (18583304.74 + y * (99447.43394 + y * (376.9991397 + y))));
        p1 / p2
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p1 = 1.0
            + y * (0.183105e-2
                + y * (-0.3516396496e-4 + y * (0.2457520174e-5 + y * -0.240337019e-6)));
        let p2 = 0.04687499995
            + y * (-0.2002690873e-3
                + y * (0.8449199096e-5 + y * (-0.88228987e-6 + y * 0.105787412e-6)));
        let ans = (0.636619772 / ax).sqrt() * (xx.cos() * p1 - z * xx.sin() * p2);
        if x < 0.0 {
            -ans
        } else {
            ans
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bessel_j1_reference_values() {
        // Abramowitz & Stegun table 9.1.
        for (x, want) in [(0.5, 0.2422685), (1.0, 0.4400506), (2.0, 0.5767248), (10.0, 0.0434727)] {
            assert!((bessel_j1(x) - want).abs() < 1e-6, "J1({x})");
        }
        assert_eq!(bessel_j1(0.), 0.);
        assert!((bessel_j1(-1.0) + 0.4400506).abs() < 1e-6);
    }

    #[test]
    fn form_factor_is_one_at_origin() {
        let m = CylinderIsotropic::default();
        let f = m.form_factor(&[0.], &[1e-9, 100.]);
        assert!((f[0] - 1.).abs() < 1e-12);
    }

    #[test]
    fn form_factor_decays() {
        let m = CylinderIsotropic::default();
        let f = m.form_factor(&[1e7, 1e8, 1e9], &[1e-9, 100.]);
        assert!(f[0] > f[1] && f[1] > f[2]);
        assert!(f.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn volume_uses_aspect() {
        let m = CylinderIsotropic::default();
        let v = m.volume(&[1e-9, 100.]);
        assert!((v - PI * 1e-18 * 2e-7).abs() / v < 1e-12);
    }

    #[test]
    fn inactive_aspect_comes_from_the_model_value() {
        let m = CylinderIsotropic::new(1e-10, 1e-6, 100.);
        assert_eq!(m.active_count(), 1);
        let mut full = Vec::new();
        m.expand_into(&[2e-9], &mut full);
        assert_eq!(full, vec![2e-9, 100.]);
    }
}
