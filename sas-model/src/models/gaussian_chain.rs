use crate::{FitParam, Float, SampleMode, ScatteringModel};

/// Flexible polymer chain obeying Gaussian statistics (Debye 1947).
///
/// The amplitude carries the excess scattering length
/// β = bp − k·Rg²·ηs, with the volume approximated as k·Rg².
#[derive(Debug, Clone)]
pub struct GaussianChain {
    params: [FitParam; 4],
}

impl GaussianChain {
    pub fn new(rg_min: Float, rg_max: Float) -> Self {
        GaussianChain {
            params: [
                FitParam::new("rg", "nm", 1., rg_min, rg_max)
                    .active()
                    .mode(SampleMode::Exponential),
                FitParam::new("bp", "cm", 100., 0.1, 1e3),
                FitParam::new("etas", "cm^-1", 1., 0.1, 10.),
                FitParam::new("k", "nm", 1., 0.1, 10.),
            ],
        }
    }
}

impl Default for GaussianChain {
    fn default() -> Self {
        GaussianChain::new(1., 1e2)
    }
}

impl ScatteringModel for GaussianChain {
    fn name(&self) -> &'static str {
        "gaussian-chain"
    }

    fn params(&self) -> &[FitParam] {
        &self.params
    }

    fn form_factor(&self, q: &[Float], row: &[Float]) -> Vec<Float> {
        let [rg, bp, etas, k] = [row[0], row[1], row[2], row[3]];
        let beta = bp - k * rg * rg * etas;
        q.iter()
            .map(|&q| {
                let u = (q * rg) * (q * rg);
                if u <= 0. {
                    beta
                } else {
                    beta * (2f64).sqrt() * ((-u).exp_m1() + u).sqrt() / u
                }
            })
            .collect()
    }

    fn volume(&self, row: &[Float]) -> Float {
        let (rg, k) = (row[0], row[3]);
        k * rg * rg
    }
}
