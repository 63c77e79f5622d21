//! Eigenmomenta: projections of unit-cell eigenvectors onto a linear
//! functional (typically the density-weighted average displacement).
//!
//! Evaluation goes through an explicit [`EvaluationContext`]. The context is
//! borrowed mutably for the whole loop because assigning a variable state is
//! a side effect; parallel callers must give every worker its own context.

use std::collections::HashMap;

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::EigenmomentaOptions;
use crate::error::{PhononicError, PhononicResult};
use crate::evp::EigenSolution;
use crate::types::MOMENTA_LOG_EVERY;

/// Problem context able to evaluate named expressions against the current
/// state of its variables.
pub trait EvaluationContext {
    /// Number of field components of variable `var_name`.
    fn n_components(&self, var_name: &str) -> PhononicResult<usize>;

    /// Make `state` the current value of `var_name`.
    fn set_variable(&mut self, var_name: &str, state: &DVector<f64>) -> PhononicResult<()>;

    /// Evaluate `expression`, returning one value per component.
    fn evaluate(&mut self, expression: &str) -> PhononicResult<Vec<f64>>;
}

/// Per-eigenvector transform applied before evaluation.
///
/// `shape` is `(n_nodes, n_components)`. Returning `true` as the second
/// element marks the mode as trivially zero; it is then never evaluated.
pub trait EigenvectorTransform {
    fn transform(&self, vec: &DVector<f64>, shape: (usize, usize)) -> (DVector<f64>, bool);
}

impl<F> EigenvectorTransform for F
where
    F: Fn(&DVector<f64>, (usize, usize)) -> (DVector<f64>, bool),
{
    fn transform(&self, vec: &DVector<f64>, shape: (usize, usize)) -> (DVector<f64>, bool) {
        self(vec, shape)
    }
}

struct Variable {
    n_components: usize,
    state: DVector<f64>,
}

struct Functional {
    var_name: String,
    weights: DMatrix<f64>,
}

/// Context whose expressions are fixed linear functionals `W u`, with `W`
/// of shape `n_components × n_dof`.
#[derive(Default)]
pub struct LinearFunctionalContext {
    variables: HashMap<String, Variable>,
    functionals: HashMap<String, Functional>,
}

impl LinearFunctionalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, n_dof: usize, n_components: usize) -> Self {
        self.variables.insert(
            name.into(),
            Variable {
                n_components,
                state: DVector::zeros(n_dof),
            },
        );
        self
    }

    pub fn with_functional(
        mut self,
        expression: impl Into<String>,
        var_name: impl Into<String>,
        weights: DMatrix<f64>,
    ) -> Self {
        self.functionals.insert(
            expression.into(),
            Functional {
                var_name: var_name.into(),
                weights,
            },
        );
        self
    }

    /// Weighted sum over nodes per component for an interleaved DOF layout
    /// (`dof = node * n_components + component`). With nodal masses as
    /// weights this is the eigenmomentum `∫ ρ φ`.
    pub fn nodal_sum_weights(node_weights: &[f64], n_components: usize) -> DMatrix<f64> {
        let n_dof = node_weights.len() * n_components;
        let mut w = DMatrix::zeros(n_components, n_dof);
        for (node, &weight) in node_weights.iter().enumerate() {
            for c in 0..n_components {
                w[(c, node * n_components + c)] = weight;
            }
        }
        w
    }

    fn variable(&self, var_name: &str) -> PhononicResult<&Variable> {
        self.variables
            .get(var_name)
            .ok_or_else(|| PhononicError::Config(format!("unknown variable `{var_name}`")))
    }
}

impl EvaluationContext for LinearFunctionalContext {
    fn n_components(&self, var_name: &str) -> PhononicResult<usize> {
        Ok(self.variable(var_name)?.n_components)
    }

    fn set_variable(&mut self, var_name: &str, state: &DVector<f64>) -> PhononicResult<()> {
        let var = self
            .variables
            .get_mut(var_name)
            .ok_or_else(|| PhononicError::Config(format!("unknown variable `{var_name}`")))?;
        if var.state.len() != state.len() {
            return Err(PhononicError::Dimension(format!(
                "variable `{var_name}` has {} DOFs, got a state of length {}",
                var.state.len(),
                state.len()
            )));
        }
        var.state.copy_from(state);
        Ok(())
    }

    fn evaluate(&mut self, expression: &str) -> PhononicResult<Vec<f64>> {
        let fun = self
            .functionals
            .get(expression)
            .ok_or_else(|| PhononicError::Config(format!("unknown expression `{expression}`")))?;
        let var = self.variable(&fun.var_name)?;
        if fun.weights.ncols() != var.state.len() {
            return Err(PhononicError::Dimension(format!(
                "expression `{expression}` expects {} DOFs, variable `{}` has {}",
                fun.weights.ncols(),
                fun.var_name,
                var.state.len()
            )));
        }
        Ok((&fun.weights * &var.state).iter().copied().collect())
    }
}

/// Evaluate the eigenmomentum of every eigenvector column.
///
/// Returns an `n_eigs × n_components` matrix. Modes flagged zero by
/// `transform` get a zero row and skip evaluation.
pub fn compute_eigenmomenta<C: EvaluationContext + ?Sized>(
    expression: &str,
    var_name: &str,
    ctx: &mut C,
    eig_vectors: &DMatrix<f64>,
    transform: Option<&dyn EigenvectorTransform>,
) -> PhononicResult<DMatrix<f64>> {
    let (n_dof, n_eigs) = eig_vectors.shape();
    let n_c = ctx.n_components(var_name)?;
    if n_c == 0 || n_dof % n_c != 0 {
        return Err(PhononicError::Dimension(format!(
            "{n_dof} DOFs cannot be split into {n_c} components"
        )));
    }
    let shape = (n_dof / n_c, n_c);

    let mut eigenmomenta = DMatrix::zeros(n_eigs, n_c);
    for ii in 0..n_eigs {
        if ii % MOMENTA_LOG_EVERY == 0 {
            debug!(
                "[eigenmomenta] {} of {} ({:.1}%)",
                ii,
                n_eigs,
                100.0 * ii as f64 / (n_eigs.max(2) - 1) as f64
            );
        }

        let column = eig_vectors.column(ii).into_owned();
        let (vec_phi, is_zero) = match transform {
            Some(t) => t.transform(&column, shape),
            None => (column, false),
        };
        if is_zero {
            continue;
        }

        ctx.set_variable(var_name, &vec_phi)?;
        let val = ctx.evaluate(expression)?;
        if val.len() != n_c {
            return Err(PhononicError::Dimension(format!(
                "expression `{expression}` returned {} values, expected {n_c}",
                val.len()
            )));
        }
        for (ic, v) in val.into_iter().enumerate() {
            eigenmomenta[(ii, ic)] = v;
        }
    }

    Ok(eigenmomenta)
}

/// Thresholded eigenmomenta with their validity mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eigenmomenta {
    /// `n_eigs × n_components`; invalid rows are zero.
    pub eigenmomenta: DMatrix<f64>,
    pub valid: Vec<bool>,
    pub n_zeroed: usize,
}

impl Eigenmomenta {
    /// Apply the norm threshold to raw momenta and zero the rows under it.
    pub fn from_raw(mut eigenmomenta: DMatrix<f64>, threshold: f64, threshold_is_relative: bool) -> Self {
        let mag: Vec<f64> = eigenmomenta.row_iter().map(|row| row.norm()).collect();
        let tol = if threshold_is_relative {
            threshold * mag.iter().copied().fold(0.0, f64::max)
        } else {
            threshold
        };

        let valid: Vec<bool> = mag.iter().map(|&m| !(m < tol)).collect();
        let mut n_zeroed = 0;
        for (ii, ok) in valid.iter().enumerate() {
            if !ok {
                eigenmomenta.row_mut(ii).fill(0.0);
                n_zeroed += 1;
            }
        }

        info!(
            "[eigenmomenta] {} of {} eigenmomenta zeroed (under {:.2e})",
            n_zeroed,
            valid.len(),
            tol
        );

        Self {
            eigenmomenta,
            valid,
            n_zeroed,
        }
    }

    /// Evaluate and threshold in one go.
    pub fn compute<C: EvaluationContext + ?Sized>(
        evp: &EigenSolution,
        ctx: &mut C,
        opts: &EigenmomentaOptions,
        transform: Option<&dyn EigenvectorTransform>,
    ) -> PhononicResult<Self> {
        opts.validate()?;
        info!("[eigenmomenta] computing eigenmomenta...");
        let raw = compute_eigenmomenta(
            &opts.expression,
            &opts.var_name,
            ctx,
            &evp.eig_vectors,
            transform,
        )?;
        Ok(Self::from_raw(raw, opts.threshold, opts.threshold_is_relative))
    }

    pub fn n_eigs(&self) -> usize {
        self.valid.len()
    }

    pub fn n_components(&self) -> usize {
        self.eigenmomenta.ncols()
    }

    pub fn n_valid(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Rows of the valid modes only.
    pub fn valid_rows(&self) -> DMatrix<f64> {
        self.rows_where(&self.valid)
    }

    /// Rows of the modes flagged in `mask`, which must have one entry per
    /// mode.
    pub fn rows_where(&self, mask: &[bool]) -> DMatrix<f64> {
        let rows: Vec<usize> = (0..self.n_eigs()).filter(|&i| mask[i]).collect();
        self.eigenmomenta.select_rows(rows.iter())
    }
}
