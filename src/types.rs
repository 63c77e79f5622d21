//! Constants and core enums for the band-gap library.

use serde::{Deserialize, Serialize};

/// Default frequency tolerance for root bracketing.
pub const DEFAULT_FEPS: f64 = 1e-8;

/// Default eigenvalue tolerance below which a tensor eigenvalue counts as zero.
pub const DEFAULT_ZEPS: f64 = 1e-8;

/// Default eigenmomentum threshold.
pub const DEFAULT_MOMENTUM_THRESHOLD: f64 = 1e-4;

/// Default frequency margins, in per cent of the resonance range.
pub const DEFAULT_FREQ_MARGINS: (f64, f64) = (5.0, 5.0);

/// Default sampling step, in per cent of the frequency range with margins.
pub const DEFAULT_FREQ_STEP: f64 = 5.0;

/// Lower bound on the number of logged frequencies in a wide interval.
pub const MIN_INTERVAL_SAMPLES: usize = 100;

/// Upper bound on the number of logged frequencies in one interval.
pub const MAX_INTERVAL_SAMPLES: usize = 1000;

/// Relative offset of the two probe frequencies used in narrow intervals.
pub const NARROW_INTERVAL_OFFSET: f64 = 1e-8;

/// Relative tolerance between summed region volumes and the cell volume.
pub const VOLUME_REL_TOL: f64 = 1e-14;

/// Bisection steps allowed before the root search is declared divergent.
pub const MAX_BISECTION_ITER: usize = 2000;

/// Progress is logged every this many eigenvectors.
pub const MOMENTA_LOG_EVERY: usize = 100;

/// DOF threshold above which `EigensolverKind::Auto` picks Lanczos.
pub const LANCZOS_DOF_THRESHOLD: usize = 500;

/// Maximum Lanczos iterations.
pub const MAX_LANCZOS_ITER: usize = 300;

/// Convergence tolerance for Lanczos.
pub const LANCZOS_TOL: f64 = 1e-10;

/// Solver used for the unit-cell eigenproblem `K φ = λ M φ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EigensolverKind {
    /// Cholesky reduction followed by a full symmetric eigendecomposition.
    Dense,
    /// Shift-invert Lanczos around a target eigenvalue.
    Lanczos,
    /// Choose from the problem size.
    #[default]
    Auto,
}

impl EigensolverKind {
    pub fn name(&self) -> &'static str {
        match self {
            EigensolverKind::Dense => "dense",
            EigensolverKind::Lanczos => "lanczos",
            EigensolverKind::Auto => "auto",
        }
    }
}

/// Band-gap detection flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapMode {
    /// One boundary pair per resonance interval, located by bisection.
    #[default]
    Normal,
    /// Sub-gaps read directly off the sampled trace (damped liquid inclusions).
    Liquid,
}

/// Which extremal eigenvalue of the mass tensor a root search follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedEig {
    Smallest,
    Largest,
}

impl TrackedEig {
    /// Pick the tracked value from an ascending eigenvalue slice.
    pub fn pick(&self, eigs: &[f64]) -> Option<f64> {
        match self {
            TrackedEig::Smallest => eigs.first().copied(),
            TrackedEig::Largest => eigs.last().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_eig_picks_extremes() {
        let eigs = [-2.0, 0.5, 3.0];
        assert_eq!(TrackedEig::Smallest.pick(&eigs), Some(-2.0));
        assert_eq!(TrackedEig::Largest.pick(&eigs), Some(3.0));
        assert_eq!(TrackedEig::Largest.pick(&[]), None);
    }
}
