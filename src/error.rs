//! Error hierarchy for band-gap computations.

use thiserror::Error;

/// Root error type for all band-gap failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhononicError {
    /// Missing or invalid option, expression or variable.
    #[error("config error: {0}")]
    Config(String),

    /// A region references a material property that is not configured.
    #[error("region `{region}`: material `{material}` has no property `{property}`")]
    MissingMaterial {
        region: String,
        material: String,
        property: String,
    },

    /// Summed region volumes disagree with the cell volume.
    #[error("total volume mismatch: regions sum to {computed:e}, cell volume is {expected:e}")]
    VolumeMismatch { computed: f64, expected: f64 },

    /// The tensor was queried at (numerically) a resonance frequency.
    #[error("frequency {freq:e} too close to resonance (eigenvalue {eigenvalue:e})")]
    NearResonance { freq: f64, eigenvalue: f64 },

    /// Boundary flags that the detector can never legitimately produce.
    #[error("impossible band gap combination: {gmin}, {gmax}")]
    ImpossibleGap { gmin: u8, gmax: u8 },

    /// Requested eigenvalue index range is empty or out of bounds.
    #[error("invalid eigenvalue range [{start}, {end}) for {n_eigs} eigenvalues")]
    DegenerateEigRange { start: i64, end: i64, n_eigs: usize },

    /// Bisection exceeded its iteration cap.
    #[error("zero search in ]{f0:e}, {f1:e}[ did not terminate after {iterations} steps")]
    BisectionLimit { f0: f64, f1: f64, iterations: usize },

    /// Shapes of collaborating inputs do not fit together.
    #[error("dimension mismatch: {0}")]
    Dimension(String),

    /// Factorization failure or NaN/Inf in a computed quantity.
    #[error("numerical error: {0}")]
    Numerical(String),
}

pub type PhononicResult<T> = Result<T, PhononicError>;
