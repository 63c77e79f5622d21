//! Unit-cell eigenproblem `K φ = λ M φ`.
//!
//! The band-gap core only consumes eigenvalues and eigenvectors; the solvers
//! here are the default collaborators producing them from assembled
//! stiffness and mass matrices. Any other solver can be plugged in through
//! [`UnitCellEigensolver`].

use log::{debug, info};
use nalgebra::linalg::SymmetricEigen;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::convert::serial::convert_csr_dense;
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

use crate::config::EvpOptions;
use crate::error::{PhononicError, PhononicResult};
use crate::types::{EigensolverKind, LANCZOS_DOF_THRESHOLD, LANCZOS_TOL, MAX_LANCZOS_ITER};

/// Eigenvalues (ascending, clamped to `>= 0`) and matching eigenvectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenSolution {
    pub eigs: Vec<f64>,
    /// `eigs` scaled by `elasticity_contrast / scale_epsilon²`.
    pub eigs_rescaled: Vec<f64>,
    /// One eigenvector per column, `n_dof × n_eigs`.
    pub eig_vectors: DMatrix<f64>,
}

impl EigenSolution {
    /// Wrap an externally computed solution.
    pub fn new(eigs: Vec<f64>, eig_vectors: DMatrix<f64>) -> PhononicResult<Self> {
        if eigs.len() != eig_vectors.ncols() {
            return Err(PhononicError::Dimension(format!(
                "{} eigenvalues but {} eigenvectors",
                eigs.len(),
                eig_vectors.ncols()
            )));
        }
        if let Some(bad) = eigs.iter().find(|e| !e.is_finite()) {
            return Err(PhononicError::Numerical(format!("non-finite eigenvalue {bad}")));
        }
        Ok(Self {
            eigs_rescaled: eigs.clone(),
            eigs,
            eig_vectors,
        })
    }

    pub fn n_eigs(&self) -> usize {
        self.eigs.len()
    }

    pub fn n_dof(&self) -> usize {
        self.eig_vectors.nrows()
    }

    /// Resonance frequencies `sqrt(λ)`.
    pub fn frequencies(&self) -> Vec<f64> {
        self.eigs.iter().map(|e| e.sqrt()).collect()
    }
}

/// A generalized symmetric eigensolver for the unit-cell problem.
pub trait UnitCellEigensolver {
    fn name(&self) -> &'static str;

    /// Return ascending eigenvalues and M-orthonormal eigenvectors (as
    /// columns). `n_eigs = None` requests all of them.
    fn solve(
        &self,
        k: &CsrMatrix<f64>,
        m: &CsrMatrix<f64>,
        n_eigs: Option<usize>,
    ) -> PhononicResult<(Vec<f64>, DMatrix<f64>)>;
}

fn check_square_pair(k: &CsrMatrix<f64>, m: &CsrMatrix<f64>) -> PhononicResult<usize> {
    let n = k.nrows();
    if k.ncols() != n || m.nrows() != n || m.ncols() != n {
        return Err(PhononicError::Dimension(format!(
            "stiffness {}x{} and mass {}x{} must be square and equal",
            k.nrows(),
            k.ncols(),
            m.nrows(),
            m.ncols()
        )));
    }
    if n == 0 {
        return Err(PhononicError::Dimension("empty eigenproblem".to_string()));
    }
    Ok(n)
}

fn sort_pairs(eigenvalues: Vec<f64>, vectors: Vec<DVector<f64>>, n: usize, keep: usize) -> (Vec<f64>, DMatrix<f64>) {
    let mut pairs: Vec<(f64, DVector<f64>)> = eigenvalues.into_iter().zip(vectors).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let keep = keep.min(pairs.len());

    let eigs: Vec<f64> = pairs.iter().take(keep).map(|(l, _)| *l).collect();
    let mut mtx = DMatrix::zeros(n, keep);
    for (i, (_, v)) in pairs.iter().take(keep).enumerate() {
        mtx.set_column(i, v);
    }
    (eigs, mtx)
}

/// Dense solver: `M = L Lᵀ`, eigendecomposition of `L⁻¹ K L⁻ᵀ`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseEigensolver;

impl UnitCellEigensolver for DenseEigensolver {
    fn name(&self) -> &'static str {
        EigensolverKind::Dense.name()
    }

    fn solve(
        &self,
        k: &CsrMatrix<f64>,
        m: &CsrMatrix<f64>,
        n_eigs: Option<usize>,
    ) -> PhononicResult<(Vec<f64>, DMatrix<f64>)> {
        let n = check_square_pair(k, m)?;
        let k = convert_csr_dense(k);
        let m = convert_csr_dense(m);

        let chol = m
            .cholesky()
            .ok_or_else(|| PhononicError::Numerical("mass matrix is not positive definite".into()))?;
        let l_inv = chol
            .l()
            .try_inverse()
            .ok_or_else(|| PhononicError::Numerical("singular Cholesky factor".into()))?;
        let l_inv_t = l_inv.transpose();
        let a = &l_inv * k * &l_inv_t;
        let a = 0.5 * (&a + a.transpose());

        let eig = SymmetricEigen::new(a);
        let vectors: Vec<DVector<f64>> = (0..n)
            .map(|i| &l_inv_t * eig.eigenvectors.column(i))
            .collect();

        Ok(sort_pairs(
            eig.eigenvalues.iter().copied().collect(),
            vectors,
            n,
            n_eigs.unwrap_or(n),
        ))
    }
}

/// Shift-invert Lanczos: `(K - σM)⁻¹ M x = θ x`, `λ = σ + 1/θ`.
///
/// Finds the eigenvalues closest to `shift`, which is what a unit-cell scan
/// over a frequency window needs.
#[derive(Debug, Clone, Copy)]
pub struct LanczosEigensolver {
    pub shift: f64,
}

impl Default for LanczosEigensolver {
    fn default() -> Self {
        Self { shift: 0.0 }
    }
}

/// Build the shifted matrix (K - sigma * M) as a dense matrix for factorization.
fn build_shifted_matrix_dense(k: &CsrMatrix<f64>, m: &CsrMatrix<f64>, sigma: f64) -> DMatrix<f64> {
    let n = k.nrows();
    let mut a = DMatrix::zeros(n, n);

    for (i, row) in k.row_iter().enumerate() {
        for (&col, &val) in row.col_indices().iter().zip(row.values().iter()) {
            a[(i, col)] += val;
        }
    }

    for (i, row) in m.row_iter().enumerate() {
        for (&col, &val) in row.col_indices().iter().zip(row.values().iter()) {
            a[(i, col)] -= sigma * val;
        }
    }

    a
}

impl UnitCellEigensolver for LanczosEigensolver {
    fn name(&self) -> &'static str {
        EigensolverKind::Lanczos.name()
    }

    fn solve(
        &self,
        k: &CsrMatrix<f64>,
        m: &CsrMatrix<f64>,
        n_eigs: Option<usize>,
    ) -> PhononicResult<(Vec<f64>, DMatrix<f64>)> {
        let n = check_square_pair(k, m)?;
        let num_modes = n_eigs.unwrap_or(n).min(n);
        let num_lanczos = (num_modes + 10).min(n).min(MAX_LANCZOS_ITER);
        let sigma = self.shift;

        // K - σM may be singular when σ hits an eigenvalue; nudge the diagonal.
        let a_shifted = build_shifted_matrix_dense(k, m, sigma);
        let lu = a_shifted.clone().lu();
        let lu = if lu.is_invertible() {
            lu
        } else {
            let mut a_reg = a_shifted;
            for i in 0..n {
                a_reg[(i, i)] += 1e-8 * a_reg[(i, i)].abs().max(1e-8);
            }
            let lu_reg = a_reg.lu();
            if !lu_reg.is_invertible() {
                return Err(PhononicError::Numerical(format!(
                    "shifted matrix K - {sigma}M is singular"
                )));
            }
            lu_reg
        };

        let mut v_prev = DVector::zeros(n);
        let mut v_curr = DVector::from_fn(n, |i, _| ((i * 7 + 13) % 101) as f64 / 100.0 - 0.5);

        let mv = m * &v_curr;
        let norm = v_curr.dot(&mv).sqrt();
        if !(norm > 1e-14) {
            return Err(PhononicError::Numerical("degenerate Lanczos start vector".into()));
        }
        v_curr /= norm;

        let mut v_matrix = DMatrix::zeros(n, num_lanczos);
        let mut mv_matrix = DMatrix::zeros(n, num_lanczos);
        let mut alpha = Vec::with_capacity(num_lanczos);
        let mut beta: Vec<f64> = Vec::with_capacity(num_lanczos);

        for j in 0..num_lanczos {
            v_matrix.set_column(j, &v_curr);
            let mv_curr = m * &v_curr;
            mv_matrix.set_column(j, &mv_curr);

            let w = lu
                .solve(&mv_curr)
                .ok_or_else(|| PhononicError::Numerical("shift-invert solve failed".into()))?;

            let alpha_j = v_curr.dot(&(m * &w));
            alpha.push(alpha_j);

            let mut w_orth = w - alpha_j * &v_curr;
            if j > 0 {
                w_orth -= beta[j - 1] * &v_prev;
            }
            // Full reorthogonalization against the cached M*v products.
            for c in 0..=j {
                let coeff = w_orth.dot(&mv_matrix.column(c));
                w_orth -= coeff * v_matrix.column(c);
            }

            let beta_j = w_orth.dot(&(m * &w_orth)).sqrt();
            if beta_j < LANCZOS_TOL {
                break;
            }
            beta.push(beta_j);
            v_prev = v_curr;
            v_curr = w_orth / beta_j;
        }

        let m_lanczos = alpha.len();
        let mut t_mat = DMatrix::zeros(m_lanczos, m_lanczos);
        for i in 0..m_lanczos {
            t_mat[(i, i)] = alpha[i];
            if i < beta.len() && i + 1 < m_lanczos {
                t_mat[(i, i + 1)] = beta[i];
                t_mat[(i + 1, i)] = beta[i];
            }
        }

        let eig = SymmetricEigen::new(t_mat);
        let mut lambdas = Vec::with_capacity(m_lanczos);
        let mut vectors = Vec::with_capacity(m_lanczos);
        for i in 0..m_lanczos {
            let theta = eig.eigenvalues[i];
            if theta.abs() <= 1e-14 {
                continue;
            }
            let s_col = eig.eigenvectors.column(i);
            let mut y = DVector::zeros(n);
            for c in 0..m_lanczos {
                y += s_col[c] * v_matrix.column(c);
            }
            let norm_m = y.dot(&(m * &y)).sqrt();
            if norm_m > 1e-14 {
                lambdas.push(sigma + 1.0 / theta);
                vectors.push(y / norm_m);
            }
        }

        // Keep the modes closest to the shift, then report them ascending.
        let mut order: Vec<usize> = (0..lambdas.len()).collect();
        order.sort_by(|&a, &b| (lambdas[a] - sigma).abs().total_cmp(&(lambdas[b] - sigma).abs()));
        order.truncate(num_modes);
        let lambdas_kept = order.iter().map(|&i| lambdas[i]).collect();
        let vectors_kept = order.iter().map(|&i| vectors[i].clone()).collect();

        Ok(sort_pairs(lambdas_kept, vectors_kept, n, num_modes))
    }
}

/// Pick the solver named by `kind` for a problem with `n_dof` unknowns.
pub fn select_eigensolver(kind: EigensolverKind, n_dof: usize) -> Box<dyn UnitCellEigensolver> {
    let use_lanczos = match kind {
        EigensolverKind::Dense => false,
        EigensolverKind::Lanczos => true,
        EigensolverKind::Auto => n_dof > LANCZOS_DOF_THRESHOLD,
    };
    if use_lanczos {
        Box::new(LanczosEigensolver::default())
    } else {
        Box::new(DenseEigensolver)
    }
}

/// Solve the unit-cell eigenproblem, clamp negative eigenvalues to zero and
/// rescale by `elasticity_contrast / scale_epsilon²`.
pub fn solve_unit_cell(
    solver: &dyn UnitCellEigensolver,
    k: &CsrMatrix<f64>,
    m: &CsrMatrix<f64>,
    n_eigs: Option<usize>,
    opts: &EvpOptions,
) -> PhononicResult<EigenSolution> {
    opts.validate()?;
    info!("[evp] computing resonance frequencies ({})...", solver.name());
    let (mut eigs, eig_vectors) = solver.solve(k, m, n_eigs)?;

    if let Some(bad) = eigs.iter().find(|e| !e.is_finite()) {
        return Err(PhononicError::Numerical(format!(
            "eigensolver {} returned non-finite eigenvalue {bad}",
            solver.name()
        )));
    }
    let n_clamped = eigs.iter().filter(|e| **e < 0.0).count();
    for e in eigs.iter_mut() {
        if *e < 0.0 {
            *e = 0.0;
        }
    }
    if n_clamped > 0 {
        debug!("[evp] clamped {n_clamped} negative eigenvalues to zero");
    }

    let epsilon2 = opts.scale_epsilon * opts.scale_epsilon;
    let factor = opts.elasticity_contrast / epsilon2;
    let eigs_rescaled: Vec<f64> = eigs.iter().map(|e| factor * e).collect();
    info!("[evp] number of eigenfrequencies: {}", eigs.len());
    debug!("[evp] eigenvalues: {eigs:?}");
    debug!("[evp] rescaled eigenvalues: {eigs_rescaled:?}");

    Ok(EigenSolution {
        eigs,
        eigs_rescaled,
        eig_vectors,
    })
}
