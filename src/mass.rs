//! Frequency-dependent homogenized tensors.
//!
//! The acoustic mass tensor of a cell with resonating inclusions is
//!
//! ```text
//! M(ω) = ρ̄ I - 1/|Y| Σ_k c_k(ω) m_k ⊗ m_k
//! ```
//!
//! with `m_k` the eigenmomenta of the valid modes and `c_k = ω² / (ω² - λ_k)`
//! for an elastic matrix. A damped liquid medium replaces `c_k` by
//! `ω² (ω² - γλ_k) / ((ω² - γλ_k)² + ω² η² λ_k²)`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::density::DensityVolumeInfo;
use crate::eigenmomenta::Eigenmomenta;
use crate::error::{PhononicError, PhononicResult};
use crate::evp::EigenSolution;

/// A tensor that can be evaluated at any non-resonant frequency.
///
/// Implementations must be free of interior mutability affecting the
/// result, so one instance can be shared by parallel interval workers.
pub trait FrequencyTensor: Sync {
    fn n_components(&self) -> usize;

    fn evaluate(&self, freq: f64) -> PhononicResult<DMatrix<f64>>;
}

/// Medium filling the matrix phase.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Medium {
    #[default]
    Elastic,
    /// Liquid with loss parameters `gamma` and `eta`.
    Liquid { gamma: f64, eta: f64 },
}

impl Medium {
    /// `(num, denom)` of the modal coefficient for eigenvalue `eig`.
    fn coefs(&self, f2: f64, eig: f64) -> (f64, f64) {
        match *self {
            Medium::Elastic => (f2, f2 - eig),
            Medium::Liquid { gamma, eta } => {
                let aux = f2 - gamma * eig;
                (f2 * aux, aux * aux + f2 * (eta * eta) * eig * eig)
            }
        }
    }
}

/// Keep only the eigenvalues whose eigenmomenta passed the threshold.
fn valid_eigs(evp: &EigenSolution, ema: &Eigenmomenta) -> PhononicResult<Vec<f64>> {
    if evp.n_eigs() != ema.n_eigs() {
        return Err(PhononicError::Dimension(format!(
            "{} eigenvalues but {} eigenmomenta",
            evp.n_eigs(),
            ema.n_eigs()
        )));
    }
    Ok(evp
        .eigs
        .iter()
        .zip(&ema.valid)
        .filter(|(_, ok)| **ok)
        .map(|(e, _)| *e)
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcousticMassTensor {
    eigs: Vec<f64>,
    /// `n_valid × n_components`.
    eigenmomenta: DMatrix<f64>,
    average_density: f64,
    total_volume: f64,
    medium: Medium,
}

impl AcousticMassTensor {
    pub fn new(evp: &EigenSolution, ema: &Eigenmomenta, dv_info: &DensityVolumeInfo) -> PhononicResult<Self> {
        Self::with_medium(evp, ema, dv_info, Medium::Elastic)
    }

    pub fn liquid(
        evp: &EigenSolution,
        ema: &Eigenmomenta,
        dv_info: &DensityVolumeInfo,
        gamma: f64,
        eta: f64,
    ) -> PhononicResult<Self> {
        Self::with_medium(evp, ema, dv_info, Medium::Liquid { gamma, eta })
    }

    pub fn with_medium(
        evp: &EigenSolution,
        ema: &Eigenmomenta,
        dv_info: &DensityVolumeInfo,
        medium: Medium,
    ) -> PhononicResult<Self> {
        let eigs = valid_eigs(evp, ema)?;
        Self::from_parts(
            eigs,
            ema.valid_rows(),
            dv_info.average_density,
            dv_info.total_volume,
            medium,
        )
    }

    /// Build from already filtered eigenvalues and eigenmomenta rows.
    pub fn from_parts(
        eigs: Vec<f64>,
        eigenmomenta: DMatrix<f64>,
        average_density: f64,
        total_volume: f64,
        medium: Medium,
    ) -> PhononicResult<Self> {
        if eigs.len() != eigenmomenta.nrows() {
            return Err(PhononicError::Dimension(format!(
                "{} eigenvalues but {} eigenmomenta rows",
                eigs.len(),
                eigenmomenta.nrows()
            )));
        }
        if !(total_volume > 0.0) {
            return Err(PhononicError::Config(format!(
                "total volume must be positive, got {total_volume}"
            )));
        }
        Ok(Self {
            eigs,
            eigenmomenta,
            average_density,
            total_volume,
            medium,
        })
    }

    pub fn eigs(&self) -> &[f64] {
        &self.eigs
    }

    pub fn medium(&self) -> Medium {
        self.medium
    }

    /// Modal coefficients `num / denom`, rejecting non-finite ones.
    fn coefficients(&self, freq: f64) -> PhononicResult<Vec<f64>> {
        let f2 = freq * freq;
        self.eigs
            .iter()
            .map(|&eig| {
                let (num, denom) = self.medium.coefs(f2, eig);
                let coef = num / denom;
                if coef.is_finite() {
                    Ok(coef)
                } else {
                    Err(PhononicError::NearResonance { freq, eigenvalue: eig })
                }
            })
            .collect()
    }
}

impl FrequencyTensor for AcousticMassTensor {
    fn n_components(&self) -> usize {
        self.eigenmomenta.ncols()
    }

    fn evaluate(&self, freq: f64) -> PhononicResult<DMatrix<f64>> {
        let ema = &self.eigenmomenta;
        let n_c = ema.ncols();
        let coefs = self.coefficients(freq)?;

        let mut fmass = DMatrix::zeros(n_c, n_c);
        for ir in 0..n_c {
            for ic in ir..n_c {
                let val: f64 = coefs
                    .iter()
                    .enumerate()
                    .map(|(k, c)| c * ema[(k, ir)] * ema[(k, ic)])
                    .sum();
                fmass[(ir, ic)] = val;
                fmass[(ic, ir)] = val;
            }
        }

        Ok(DMatrix::identity(n_c, n_c) * self.average_density - fmass / self.total_volume)
    }
}

/// Applied load tensor `I - ω²/|Y| Σ_k m_k ⊗ u_k / (ω² - λ_k)`, coupling the
/// mass eigenmomenta `m_k` with load eigenmomenta `u_k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedLoadTensor {
    eigs: Vec<f64>,
    eigenmomenta: DMatrix<f64>,
    ueigenmomenta: DMatrix<f64>,
    total_volume: f64,
}

impl AppliedLoadTensor {
    pub fn new(
        evp: &EigenSolution,
        ema: &Eigenmomenta,
        uema: &Eigenmomenta,
        dv_info: &DensityVolumeInfo,
    ) -> PhononicResult<Self> {
        let eigs = valid_eigs(evp, ema)?;
        if uema.n_eigs() != ema.n_eigs() {
            return Err(PhononicError::Dimension(format!(
                "{} mass eigenmomenta but {} load eigenmomenta",
                ema.n_eigs(),
                uema.n_eigs()
            )));
        }
        // Load rows follow the mass mask so both stay paired by mode.
        let eigenmomenta = ema.valid_rows();
        let ueigenmomenta = uema.rows_where(&ema.valid);
        if ueigenmomenta.shape() != eigenmomenta.shape() {
            return Err(PhononicError::Dimension(format!(
                "mass eigenmomenta {:?} and load eigenmomenta {:?} differ in shape",
                eigenmomenta.shape(),
                ueigenmomenta.shape()
            )));
        }
        Ok(Self {
            eigs,
            eigenmomenta,
            ueigenmomenta,
            total_volume: dv_info.total_volume,
        })
    }
}

impl FrequencyTensor for AppliedLoadTensor {
    fn n_components(&self) -> usize {
        self.eigenmomenta.ncols()
    }

    fn evaluate(&self, freq: f64) -> PhononicResult<DMatrix<f64>> {
        let (ema, uema) = (&self.eigenmomenta, &self.ueigenmomenta);
        let n_c = ema.ncols();
        let f2 = freq * freq;

        let mut inv_de = Vec::with_capacity(self.eigs.len());
        for &eig in &self.eigs {
            let val = 1.0 / (f2 - eig);
            if !val.is_finite() {
                return Err(PhononicError::NearResonance { freq, eigenvalue: eig });
            }
            inv_de.push(val);
        }

        let mut fload = DMatrix::zeros(n_c, n_c);
        for ir in 0..n_c {
            for ic in 0..n_c {
                let val: f64 = inv_de
                    .iter()
                    .enumerate()
                    .map(|(k, d)| ema[(k, ir)] * uema[(k, ic)] * d)
                    .sum();
                fload[(ir, ic)] = f2 * val;
            }
        }

        Ok(DMatrix::identity(n_c, n_c) - fload / self.total_volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_mode(medium: Medium) -> AcousticMassTensor {
        AcousticMassTensor::from_parts(
            vec![4.0],
            DMatrix::from_row_slice(1, 1, &[1.0]),
            2.0,
            1.0,
            medium,
        )
        .unwrap()
    }

    #[test]
    fn single_mode_matches_closed_form() {
        let mass = single_mode(Medium::Elastic);
        let f = 3.0;
        let expected = 2.0 - f * f / (f * f - 4.0);
        let m = mass.evaluate(f).unwrap();
        assert!((m[(0, 0)] - expected).abs() < 1e-14);
    }

    #[test]
    fn tensor_is_symmetric_and_repeatable() {
        let ema = DMatrix::from_row_slice(3, 2, &[1.0, 0.5, -0.2, 0.7, 0.3, 0.3]);
        let mass =
            AcousticMassTensor::from_parts(vec![1.0, 4.0, 9.0], ema, 3.0, 2.0, Medium::Elastic).unwrap();
        let a = mass.evaluate(1.7).unwrap();
        let b = mass.evaluate(1.7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[(0, 1)], a[(1, 0)]);
    }

    #[test]
    fn exact_resonance_is_an_error() {
        let mass = single_mode(Medium::Elastic);
        let err = mass.evaluate(2.0).unwrap_err();
        assert_eq!(err, PhononicError::NearResonance { freq: 2.0, eigenvalue: 4.0 });
    }

    #[test]
    fn undamped_liquid_reduces_to_elastic() {
        let elastic = single_mode(Medium::Elastic);
        let liquid = single_mode(Medium::Liquid { gamma: 1.0, eta: 0.0 });
        for f in [0.5, 1.5, 2.5, 7.0] {
            let a = elastic.evaluate(f).unwrap()[(0, 0)];
            let b = liquid.evaluate(f).unwrap()[(0, 0)];
            assert!((a - b).abs() < 1e-12, "f = {f}: {a} vs {b}");
        }
    }

    #[test]
    fn damping_removes_the_singularity() {
        let liquid = single_mode(Medium::Liquid { gamma: 1.0, eta: 0.1 });
        let m = liquid.evaluate(2.0).unwrap();
        assert!(m[(0, 0)].is_finite());
    }

    #[test]
    fn applied_load_matches_closed_form() {
        let evp = EigenSolution::new(vec![1.0, 4.0], DMatrix::identity(2, 2)).unwrap();
        let ema = Eigenmomenta::from_raw(DMatrix::from_row_slice(2, 1, &[1.0, 2.0]), 0.0, false);
        let uema = Eigenmomenta::from_raw(DMatrix::from_row_slice(2, 1, &[0.5, 0.5]), 0.0, false);
        let dv = DensityVolumeInfo {
            average_density: 1.0,
            total_volume: 2.0,
            volumes: Default::default(),
            densities: Default::default(),
        };
        let load = AppliedLoadTensor::new(&evp, &ema, &uema, &dv).unwrap();
        let f: f64 = 3.0;
        let expected = 1.0 - f * f * (0.5 / (9.0 - 1.0) + 1.0 / (9.0 - 4.0)) / 2.0;
        assert!((load.evaluate(f).unwrap()[(0, 0)] - expected).abs() < 1e-14);
        assert!(matches!(load.evaluate(1.0), Err(PhononicError::NearResonance { .. })));
    }

    #[test]
    fn applied_load_rows_follow_the_mass_mask() {
        let evp = EigenSolution::new(vec![1.0, 4.0], DMatrix::identity(2, 2)).unwrap();
        // Mass keeps mode 0, load would keep mode 1 on its own.
        let ema = Eigenmomenta::from_raw(DMatrix::from_row_slice(2, 1, &[1.0, 1e-9]), 1e-3, true);
        let uema = Eigenmomenta::from_raw(DMatrix::from_row_slice(2, 1, &[1e-9, 0.5]), 1e-3, true);
        assert_eq!(ema.valid, vec![true, false]);
        assert_eq!(uema.valid, vec![false, true]);
        let dv = DensityVolumeInfo {
            average_density: 1.0,
            total_volume: 1.0,
            volumes: Default::default(),
            densities: Default::default(),
        };
        let load = AppliedLoadTensor::new(&evp, &ema, &uema, &dv).unwrap();
        // Only mode 0 contributes, and its load momentum was zeroed.
        assert!((load.evaluate(3.0).unwrap()[(0, 0)] - 1.0).abs() < 1e-14);
        // The mass-masked resonance at f = 2 is gone.
        assert!(load.evaluate(2.0).is_ok());

        let short = Eigenmomenta::from_raw(DMatrix::from_row_slice(1, 1, &[0.5]), 0.0, false);
        assert!(matches!(
            AppliedLoadTensor::new(&evp, &ema, &short, &dv),
            Err(PhononicError::Dimension(_))
        ));
    }

    #[test]
    fn invalid_modes_are_dropped() {
        let evp = EigenSolution::new(vec![1.0, 4.0, 9.0], DMatrix::identity(3, 3)).unwrap();
        let ema = Eigenmomenta::from_raw(DMatrix::from_row_slice(3, 1, &[1.0, 1e-9, 2.0]), 1e-3, true);
        let dv = DensityVolumeInfo {
            average_density: 1.0,
            total_volume: 1.0,
            volumes: Default::default(),
            densities: Default::default(),
        };
        let mass = AcousticMassTensor::new(&evp, &ema, &dv).unwrap();
        assert_eq!(mass.eigs(), &[1.0, 9.0]);
        // The masked resonance at f = 2 no longer matters.
        assert!(mass.evaluate(2.0).is_ok());
    }
}
