//! Eigenvalue callbacks evaluated along the frequency axis.
//!
//! Two problems are supported:
//!
//! * plain: `M(ω) w = λ w`,
//! * full (dispersion): `ω² M(ω) w = η B w` for a supplied SPD matrix `B`.
//!
//! Each problem has a find-zero flavour (eigenvalues only) and a trace
//! flavour (trace-full also returns eigenvectors for the logs).

use nalgebra::linalg::SymmetricEigen;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{PhononicError, PhononicResult};
use crate::mass::FrequencyTensor;

/// Purpose of a callback; combined with the presence of `B` it selects the
/// concrete [`CallbackMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    FindZero,
    Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackMode {
    FindZero,
    FindZeroFull,
    Trace,
    TraceFull,
}

type Strategy = fn(&EigenCallback<'_>, f64) -> PhononicResult<TensorEigs>;

impl CallbackMode {
    pub fn select(kind: CallbackKind, full: bool) -> Self {
        match (kind, full) {
            (CallbackKind::FindZero, false) => CallbackMode::FindZero,
            (CallbackKind::FindZero, true) => CallbackMode::FindZeroFull,
            (CallbackKind::Trace, false) => CallbackMode::Trace,
            (CallbackKind::Trace, true) => CallbackMode::TraceFull,
        }
    }

    fn strategy(self) -> Strategy {
        match self {
            CallbackMode::FindZero => find_zero_callback,
            CallbackMode::FindZeroFull => find_zero_full_callback,
            CallbackMode::Trace => trace_callback,
            CallbackMode::TraceFull => trace_full_callback,
        }
    }
}

/// Ascending eigenvalues of the evaluated problem, with eigenvectors (as
/// columns) in trace-full mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorEigs {
    pub values: Vec<f64>,
    pub vectors: Option<DMatrix<f64>>,
}

impl TensorEigs {
    pub fn smallest(&self) -> f64 {
        self.values.first().copied().unwrap_or(f64::NAN)
    }

    pub fn largest(&self) -> f64 {
        self.values.last().copied().unwrap_or(f64::NAN)
    }
}

pub struct EigenCallback<'a> {
    tensor: &'a dyn FrequencyTensor,
    /// `L⁻¹` with `B = L Lᵀ`, present in the full modes.
    b_inv_factor: Option<DMatrix<f64>>,
    mode: CallbackMode,
}

impl<'a> EigenCallback<'a> {
    pub fn new(
        tensor: &'a dyn FrequencyTensor,
        mtx_b: Option<&DMatrix<f64>>,
        kind: CallbackKind,
    ) -> PhononicResult<Self> {
        let b_inv_factor = match mtx_b {
            Some(b) => {
                let n_c = tensor.n_components();
                if b.shape() != (n_c, n_c) {
                    return Err(PhononicError::Dimension(format!(
                        "B is {:?}, tensor is {n_c}x{n_c}",
                        b.shape()
                    )));
                }
                let chol = b
                    .clone()
                    .cholesky()
                    .ok_or_else(|| PhononicError::Numerical("B is not positive definite".into()))?;
                let l_inv = chol
                    .l()
                    .try_inverse()
                    .ok_or_else(|| PhononicError::Numerical("singular Cholesky factor of B".into()))?;
                Some(l_inv)
            }
            None => None,
        };
        Ok(Self {
            tensor,
            mode: CallbackMode::select(kind, b_inv_factor.is_some()),
            b_inv_factor,
        })
    }

    pub fn mode(&self) -> CallbackMode {
        self.mode
    }

    pub fn call(&self, freq: f64) -> PhononicResult<TensorEigs> {
        (self.mode.strategy())(self, freq)
    }

    /// Tracked eigenvalues only; the form the root finder consumes.
    pub fn eigenvalues(&self, freq: f64) -> PhononicResult<Vec<f64>> {
        Ok(self.call(freq)?.values)
    }

    fn full_operator(&self, freq: f64) -> PhononicResult<(DMatrix<f64>, &DMatrix<f64>)> {
        let l_inv = self
            .b_inv_factor
            .as_ref()
            .ok_or_else(|| PhononicError::Config("full callback without B matrix".into()))?;
        let a = self.tensor.evaluate(freq)? * (freq * freq);
        Ok((l_inv * a * l_inv.transpose(), l_inv))
    }
}

fn sorted_eigen(mtx: DMatrix<f64>, with_vectors: bool) -> PhononicResult<(Vec<f64>, Option<DMatrix<f64>>)> {
    let sym = 0.5 * (&mtx + mtx.transpose());
    let eig = SymmetricEigen::new(sym);

    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let values: Vec<f64> = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(PhononicError::Numerical(format!("non-finite tensor eigenvalue {bad}")));
    }

    let vectors = with_vectors.then(|| {
        let mut vecs = DMatrix::zeros(eig.eigenvectors.nrows(), order.len());
        for (col, &i) in order.iter().enumerate() {
            vecs.set_column(col, &eig.eigenvectors.column(i));
        }
        vecs
    });
    Ok((values, vectors))
}

fn find_zero_callback(cb: &EigenCallback<'_>, freq: f64) -> PhononicResult<TensorEigs> {
    let (values, _) = sorted_eigen(cb.tensor.evaluate(freq)?, false)?;
    Ok(TensorEigs { values, vectors: None })
}

fn find_zero_full_callback(cb: &EigenCallback<'_>, freq: f64) -> PhononicResult<TensorEigs> {
    let (c, _) = cb.full_operator(freq)?;
    let (values, _) = sorted_eigen(c, false)?;
    Ok(TensorEigs { values, vectors: None })
}

fn trace_callback(cb: &EigenCallback<'_>, freq: f64) -> PhononicResult<TensorEigs> {
    find_zero_callback(cb, freq)
}

fn trace_full_callback(cb: &EigenCallback<'_>, freq: f64) -> PhononicResult<TensorEigs> {
    let (c, l_inv) = cb.full_operator(freq)?;
    let (values, vectors) = sorted_eigen(c, true)?;
    // Back-transform y -> w = L⁻ᵀ y.
    let vectors = vectors.map(|y| l_inv.transpose() * y);
    Ok(TensorEigs { values, vectors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mass::{AcousticMassTensor, Medium};

    fn two_component() -> AcousticMassTensor {
        AcousticMassTensor::from_parts(
            vec![4.0],
            DMatrix::from_row_slice(1, 2, &[2.0, 0.0]),
            1.0,
            1.0,
            Medium::Elastic,
        )
        .unwrap()
    }

    #[test]
    fn plain_callback_sorts_eigenvalues() {
        let mass = two_component();
        let cb = EigenCallback::new(&mass, None, CallbackKind::FindZero).unwrap();
        assert_eq!(cb.mode(), CallbackMode::FindZero);
        let eigs = cb.call(3.0).unwrap();
        let m00 = 1.0 - 4.0 * 9.0 / 5.0;
        assert!((eigs.smallest() - m00).abs() < 1e-12);
        assert!((eigs.largest() - 1.0).abs() < 1e-12);
        assert!(eigs.vectors.is_none());
    }

    #[test]
    fn full_trace_returns_b_orthonormal_vectors() {
        let mass = two_component();
        let b = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.5]);
        let cb = EigenCallback::new(&mass, Some(&b), CallbackKind::Trace).unwrap();
        assert_eq!(cb.mode(), CallbackMode::TraceFull);

        let f = 3.0;
        let out = cb.call(f).unwrap();
        let vecs = out.vectors.unwrap();
        let a = mass.evaluate(f).unwrap() * (f * f);
        for (i, &eta) in out.values.iter().enumerate() {
            let w = vecs.column(i);
            let residual = &a * w - (&b * w) * eta;
            assert!(residual.norm() < 1e-9);
            assert!(((w.transpose() * &b * w)[(0, 0)] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn full_mode_checks_b_shape() {
        let mass = two_component();
        let b = DMatrix::identity(3, 3);
        assert!(matches!(
            EigenCallback::new(&mass, Some(&b), CallbackKind::FindZero),
            Err(PhononicError::Dimension(_))
        ));
    }

    #[test]
    fn callback_propagates_resonance_error() {
        let mass = two_component();
        let cb = EigenCallback::new(&mass, None, CallbackKind::Trace).unwrap();
        assert!(matches!(cb.call(2.0), Err(PhononicError::NearResonance { .. })));
    }
}
