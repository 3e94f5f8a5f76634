use crate::{FitParam, Float, RandomSource};

/// Capability interface every scatterer shape implements.
///
/// `form_factor` and `volume` are pure; both receive a FULL parameter row in
/// declaration order (use [`ScatteringModel::expand_into`] to build one from
/// the active values the optimizer carries). `F(q=0)` is finite, with the
/// analytic limit evaluated where `q·r → 0` would otherwise divide by zero.
pub trait ScatteringModel: Sync {
    fn name(&self) -> &'static str;

    /// All parameters, in declaration order.
    fn params(&self) -> &[FitParam];

    /// Form factor F(q; p) for one full parameter row.
    fn form_factor(&self, q: &[Float], row: &[Float]) -> Vec<Float>;

    /// Geometric scatterer volume V(p) for one full parameter row.
    /// Size compensation (V^α) is applied by the caller.
    fn volume(&self, row: &[Float]) -> Float;

    /// Resolution smearing applied to a model intensity. Identity unless a
    /// model carries an instrument convolution.
    fn smear(&self, _i: &mut [Float]) {}

    fn active_params(&self) -> Vec<&FitParam> {
        self.params().iter().filter(|p| p.active).collect()
    }

    fn active_count(&self) -> usize {
        self.params().iter().filter(|p| p.active).count()
    }

    /// Draw one row of active-parameter values.
    fn sample_row(&self, rng: &mut RandomSource) -> Vec<Float> {
        self.params()
            .iter()
            .filter(|p| p.active)
            .map(|p| p.sample(rng))
            .collect()
    }

    /// Draw `n` rows of active-parameter values.
    fn sample(&self, n: usize, rng: &mut RandomSource) -> Vec<Vec<Float>> {
        (0..n).map(|_| self.sample_row(rng)).collect()
    }

    /// Merge a row of active values with the stored defaults into a full row.
    fn expand_into(&self, active: &[Float], full: &mut Vec<Float>) {
        full.clear();
        let mut next = active.iter();
        for p in self.params() {
            full.push(if p.active {
                *next.next().expect("active row shorter than active count")
            } else {
                p.value
            });
        }
    }
}
