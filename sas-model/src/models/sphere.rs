use std::f64::consts::PI;

use crate::{FitParam, Float, SampleMode, ScatteringModel};

/// Homogeneous sphere of radius r.
#[derive(Debug, Clone)]
pub struct Sphere {
    params: [FitParam; 1],
}

impl Sphere {
    /// Radius bounds in the same length unit as 1/q.
    pub fn new(r_min: Float, r_max: Float) -> Self {
        Sphere {
            params: [FitParam::new("radius", "m", 1., r_min, r_max)
                .active()
                .mode(SampleMode::Log)],
        }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Sphere::new(1.0e-9, 1.0e-5)
    }
}

impl ScatteringModel for Sphere {
    fn name(&self) -> &'static str {
        "sphere"
    }

    fn params(&self) -> &[FitParam] {
        &self.params
    }

    fn form_factor(&self, q: &[Float], row: &[Float]) -> Vec<Float> {
        let r = row[0];
        q.iter()
            .map(|&q| {
                let x = q * r;
                if x == 0. {
                    // lim x->0 of 3(sin x - x cos x)/x^3
                    1.
                } else {
                    3. * (x.sin() - x * x.cos()) / (x * x * x)
                }
            })
            .collect()
    }

    fn volume(&self, row: &[Float]) -> Float {
        let r = row[0];
        4. / 3. * PI * r * r * r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_factor_is_one_at_origin() {
        let m = Sphere::default();
        let f = m.form_factor(&[0.], &[50e-9]);
        assert_eq!(f[0], 1.);
    }

    #[test]
    fn form_factor_continuous_near_origin() {
        let m = Sphere::default();
        let f = m.form_factor(&[1e-3], &[50e-9]);
        assert!((f[0] - 1.).abs() < 1e-10);
    }

    #[test]
    fn first_zero_near_qr_4_493() {
        // 3(sin x - x cos x)/x^3 first vanishes at x = tan x, x ≈ 4.4934.
        let m = Sphere::default();
        let r = 10e-9;
        let f = m.form_factor(&[4.4934 / r], &[r]);
        assert!(f[0].abs() < 1e-4, "got {}", f[0]);
    }

    #[test]
    fn volume_of_unit_sphere() {
        let m = Sphere::default();
        assert!((m.volume(&[1.]) - 4. / 3. * PI).abs() < 1e-15);
    }
}
