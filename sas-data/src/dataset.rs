use log::warn;
use serde::{Deserialize, Serialize};

use crate::{DataError, Float};

/// A scattering curve as loaded from file, before any masking.
#[derive(Debug, Clone, Default)]
pub struct RawCurve {
    pub q: Vec<Float>,
    pub i: Vec<Float>,
    /// Per-point uncertainty. When absent, the uncertainty floor
    /// `e_min * |I|` is used instead.
    pub sigma: Option<Vec<Float>>,
    /// Azimuthal angle for oriented 2D data.
    pub psi: Option<Vec<Float>>,
}

/// Masking and sanitation options applied when preparing a [`Dataset`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaskOptions {
    /// Minimum fractional uncertainty: σ is raised to `e_min * |I|`.
    pub e_min: Float,
    /// Drop points with I == 0.
    pub mask_zero_i: bool,
    /// Drop points with I <= 0.
    pub mask_negative_i: bool,
    /// Keep only q within `[min, max]`.
    pub q_bounds: Option<[Float; 2]>,
    /// Keep only ψ within `(min, max]`; ignored for 1D data.
    pub psi_bounds: Option<[Float; 2]>,
}

impl Default for MaskOptions {
    fn default() -> Self {
        MaskOptions {
            e_min: 0.01,
            mask_zero_i: false,
            mask_negative_i: false,
            q_bounds: None,
            psi_bounds: None,
        }
    }
}

/// The masked, sanitized working arrays. Immutable after [`Dataset::prepare`];
/// all arrays have identical length.
#[derive(Debug, Clone)]
pub struct Dataset {
    q: Vec<Float>,
    i: Vec<Float>,
    sigma: Vec<Float>,
    psi: Option<Vec<Float>>,
    /// Indices into the raw arrays that survived masking.
    kept: Vec<usize>,
}

impl Dataset {
    pub fn prepare(raw: &RawCurve, opts: &MaskOptions) -> Result<Dataset, DataError> {
        let m = raw.q.len();
        if raw.i.len() != m {
            return Err(DataError::LengthMismatch {
                q: m,
                name: "I",
                len: raw.i.len(),
            });
        }
        if let Some(sigma) = &raw.sigma {
            if sigma.len() != m {
                return Err(DataError::LengthMismatch {
                    q: m,
                    name: "sigma",
                    len: sigma.len(),
                });
            }
        } else {
            warn!(
                "no uncertainty column provided, using {}% of intensity",
                opts.e_min * 100.
            );
        }
        if let Some(psi) = &raw.psi {
            if psi.len() != m {
                return Err(DataError::LengthMismatch {
                    q: m,
                    name: "psi",
                    len: psi.len(),
                });
            }
        }

        let mut kept = Vec::with_capacity(m);
        let mut floored = 0usize;
        let mut q = Vec::new();
        let mut i = Vec::new();
        let mut sigma = Vec::new();
        let mut psi = raw.psi.as_ref().map(|_| Vec::new());
        for idx in 0..m {
            let (qv, iv) = (raw.q[idx], raw.i[idx]);
            if !qv.is_finite() || qv < 0. || !iv.is_finite() {
                continue;
            }
            if opts.mask_zero_i && iv == 0. {
                continue;
            }
            if opts.mask_negative_i && iv <= 0. {
                continue;
            }
            if let Some([qmin, qmax]) = opts.q_bounds {
                if qv < qmin || qv > qmax {
                    continue;
                }
            }
            if let (Some(p), Some([pmin, pmax])) = (&raw.psi, opts.psi_bounds) {
                if p[idx] <= pmin || p[idx] > pmax {
                    continue;
                }
            }
            let floor = opts.e_min * iv.abs();
            let sv = match &raw.sigma {
                Some(e) if e[idx].is_finite() => {
                    if e[idx] < floor {
                        floored += 1;
                    }
                    e[idx].max(floor)
                }
                // Non-finite uncertainties carry no information; fall back
                // to the floor like a missing column.
                _ => floor,
            };
            kept.push(idx);
            q.push(qv);
            i.push(iv);
            sigma.push(sv);
            if let (Some(out), Some(p)) = (&mut psi, &raw.psi) {
                out.push(p[idx]);
            }
        }

        if floored > 0 {
            warn!(
                "minimum uncertainty ({}% of intensity) set for {floored} datapoints",
                opts.e_min * 100.
            );
        }
        if q.is_empty() {
            return Err(DataError::EmptyAfterMasking);
        }
        if let Some(idx) = sigma.iter().position(|&s| s <= 0.) {
            return Err(DataError::NonPositiveSigma {
                index: kept[idx],
                sigma: sigma[idx],
            });
        }

        Ok(Dataset {
            q,
            i,
            sigma,
            psi,
            kept,
        })
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    pub fn q(&self) -> &[Float] {
        &self.q
    }

    pub fn i(&self) -> &[Float] {
        &self.i
    }

    pub fn sigma(&self) -> &[Float] {
        &self.sigma
    }

    pub fn psi(&self) -> Option<&[Float]> {
        self.psi.as_deref()
    }

    /// Indices into the raw curve that survived masking.
    pub fn kept(&self) -> &[usize] {
        &self.kept
    }

    pub fn q_max(&self) -> Float {
        self.q.iter().copied().fold(0., Float::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawCurve {
        RawCurve {
            q: vec![0.1, 0.2, 0.3, 0.4],
            i: vec![4., 3., 2., 1.],
            sigma: Some(vec![0.5, 0.001, 0.5, 0.5]),
            psi: None,
        }
    }

    #[test]
    fn sigma_floor_applied() {
        let data = Dataset::prepare(&raw(), &MaskOptions::default()).unwrap();
        // 0.001 < 0.01 * 3.0, so the floor kicks in at index 1.
        assert!((data.sigma()[1] - 0.03).abs() < 1e-15);
        assert_eq!(data.sigma()[0], 0.5);
    }

    #[test]
    fn missing_sigma_column_uses_floor() {
        let mut r = raw();
        r.sigma = None;
        let data = Dataset::prepare(&r, &MaskOptions::default()).unwrap();
        for (got, want) in data.sigma().iter().zip([0.04, 0.03, 0.02, 0.01]) {
            assert!((got - want).abs() < 1e-15);
        }
    }

    #[test]
    fn negative_intensity_masked_on_request() {
        let mut r = raw();
        r.i[2] = -2.;
        let keep = Dataset::prepare(&r, &MaskOptions::default()).unwrap();
        assert_eq!(keep.len(), 4);
        let opts = MaskOptions {
            mask_negative_i: true,
            ..Default::default()
        };
        let drop = Dataset::prepare(&r, &opts).unwrap();
        assert_eq!(drop.len(), 3);
        assert_eq!(drop.kept(), &[0, 1, 3]);
    }

    #[test]
    fn q_bounds_clip() {
        let opts = MaskOptions {
            q_bounds: Some([0.15, 0.35]),
            ..Default::default()
        };
        let data = Dataset::prepare(&raw(), &opts).unwrap();
        assert_eq!(data.q(), &[0.2, 0.3]);
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut r = raw();
        r.i.pop();
        assert!(matches!(
            Dataset::prepare(&r, &MaskOptions::default()),
            Err(DataError::LengthMismatch { name: "I", .. })
        ));
    }

    #[test]
    fn empty_after_masking_rejected() {
        let opts = MaskOptions {
            q_bounds: Some([10., 20.]),
            ..Default::default()
        };
        assert!(matches!(
            Dataset::prepare(&raw(), &opts),
            Err(DataError::EmptyAfterMasking)
        ));
    }

    #[test]
    fn zero_intensity_with_zero_sigma_rejected() {
        let r = RawCurve {
            q: vec![0.1],
            i: vec![0.],
            sigma: Some(vec![0.]),
            psi: None,
        };
        assert!(matches!(
            Dataset::prepare(&r, &MaskOptions::default()),
            Err(DataError::NonPositiveSigma { index: 0, .. })
        ));
    }
}
