//! Christoffel acoustic tensor of a homogenized medium and polarization
//! angles of its waves.
//!
//! Material tensors use symmetric (Voigt-like) storage: in 2D the strain
//! components are ordered `11, 22, 12`, in 3D `11, 22, 33, 12, 13, 23`.

use std::f64::consts::FRAC_PI_2;
use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{PhononicError, PhononicResult};

/// Symmetric storage index of the tensor component `(i, j)`.
pub fn coor_to_sym(i: usize, j: usize, dim: usize) -> usize {
    if i == j {
        i
    } else {
        dim + i + j - 1
    }
}

fn sym_size(dim: usize) -> usize {
    dim * (dim + 1) / 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChristoffelMode {
    #[default]
    Simple,
    /// Elasticity stiffened by piezo-electric coupling.
    Piezo,
}

/// Homogenized material coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialCoefs {
    /// Elasticity `C`, `sym × sym`.
    pub elastic: DMatrix<f64>,
    /// Piezo coupling `G`, `dim × sym`.
    pub coupling: Option<DMatrix<f64>>,
    /// Dielectric tensor `D`, `dim × dim`.
    pub dielectric: Option<DMatrix<f64>>,
}

impl MaterialCoefs {
    pub fn elastic(elastic: DMatrix<f64>) -> Self {
        Self {
            elastic,
            coupling: None,
            dielectric: None,
        }
    }

    pub fn piezo(elastic: DMatrix<f64>, coupling: DMatrix<f64>, dielectric: DMatrix<f64>) -> Self {
        Self {
            elastic,
            coupling: Some(coupling),
            dielectric: Some(dielectric),
        }
    }
}

fn check_shape(name: &str, mtx: &DMatrix<f64>, shape: (usize, usize)) -> PhononicResult<()> {
    if mtx.shape() != shape {
        return Err(PhononicError::Dimension(format!(
            "{name} tensor is {:?}, expected {shape:?}",
            mtx.shape()
        )));
    }
    Ok(())
}

/// Christoffel acoustic tensor for the incident wave direction `iw_dir`
/// (a unit vector).
///
/// Simple mode: `Γ_ik = C_ijkl n_j n_l`. Piezo mode adds `γ_i γ_k / ξ` with
/// `γ_i = G_k(ij) n_j n_k` and `ξ = D_kl n_k n_l`.
pub fn compute_cat(coefs: &MaterialCoefs, iw_dir: &DVector<f64>, mode: ChristoffelMode) -> PhononicResult<DMatrix<f64>> {
    let dim = iw_dir.len();
    if !(2..=3).contains(&dim) {
        return Err(PhononicError::Dimension(format!("direction must be 2D or 3D, got {dim}D")));
    }
    let n_sym = sym_size(dim);
    let mtx_c = &coefs.elastic;
    check_shape("elastic", mtx_c, (n_sym, n_sym))?;

    let mut cat = DMatrix::zeros(dim, dim);
    for ii in 0..dim {
        for ij in 0..dim {
            let ir = coor_to_sym(ii, ij, dim);
            for ik in 0..dim {
                for il in 0..dim {
                    let ic = coor_to_sym(ik, il, dim);
                    cat[(ii, ik)] += mtx_c[(ir, ic)] * iw_dir[ij] * iw_dir[il];
                }
            }
        }
    }

    if mode == ChristoffelMode::Piezo {
        let (mtx_g, mtx_d) = match (&coefs.coupling, &coefs.dielectric) {
            (Some(g), Some(d)) => (g, d),
            _ => {
                return Err(PhononicError::Config(
                    "piezo mode needs coupling and dielectric tensors".to_string(),
                ))
            }
        };
        check_shape("coupling", mtx_g, (dim, n_sym))?;
        check_shape("dielectric", mtx_d, (dim, dim))?;

        let xi = iw_dir.dot(&(mtx_d * iw_dir));
        let mut gamma = DVector::<f64>::zeros(dim);
        for ii in 0..dim {
            for ij in 0..dim {
                let ir = coor_to_sym(ii, ij, dim);
                for ik in 0..dim {
                    gamma[ii] += mtx_g[(ik, ir)] * iw_dir[ij] * iw_dir[ik];
                }
            }
        }

        let stiffening = &gamma * gamma.transpose() / xi;
        if stiffening.iter().any(|v| !v.is_finite()) {
            return Err(PhononicError::Numerical(format!(
                "dielectric form vanishes in direction {:?}",
                iw_dir.as_slice()
            )));
        }
        cat += stiffening;
    }

    Ok(cat)
}

/// Angles in `[0, π/2]` between `iw_dir` and each column of every matrix in
/// `vecs`: row `ir` of the result holds the angles of `vecs[ir]`.
/// Vector lengths do not matter, so eigenvectors can be passed directly.
pub fn polarization_angles(iw_dir: &DVector<f64>, vecs: &[DMatrix<f64>]) -> PhononicResult<DMatrix<f64>> {
    let dim = iw_dir.len();
    let norm = iw_dir.norm();
    if !(norm > 0.0) {
        return Err(PhononicError::Numerical("zero incident wave direction".to_string()));
    }
    let dir = iw_dir / norm;

    let n_cols = vecs.first().map_or(0, |v| v.ncols());
    let mut pa = DMatrix::zeros(vecs.len(), n_cols);
    for (ir, vec) in vecs.iter().enumerate() {
        if vec.nrows() != dim || vec.ncols() != n_cols {
            return Err(PhononicError::Dimension(format!(
                "wave vectors {ir} are {:?}, expected ({dim}, {n_cols})",
                vec.shape()
            )));
        }
        for ic in 0..n_cols {
            let vv = vec.column(ic);
            let vnorm = vv.norm();
            if !(vnorm > 0.0) {
                return Err(PhononicError::Numerical(format!("zero wave vector {ic} at sample {ir}")));
            }
            let cos = (dir.dot(&vv) / vnorm).clamp(-1.0, 1.0);
            let mut val = cos.acos();
            if val > FRAC_PI_2 {
                val = PI - val;
            }
            pa[(ir, ic)] = val;
        }
    }
    Ok(pa)
}

/// [`polarization_angles`] for each interval's traced eigenvectors.
pub fn compute_polarization_angles(
    iw_dir: &DVector<f64>,
    wave_vectors: &[Vec<DMatrix<f64>>],
) -> PhononicResult<Vec<DMatrix<f64>>> {
    wave_vectors
        .iter()
        .map(|vecs| polarization_angles(iw_dir, vecs))
        .collect()
}
