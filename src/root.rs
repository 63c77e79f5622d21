//! Bisection search for the zero of an extremal tensor eigenvalue.

use serde::{Deserialize, Serialize};

use crate::error::{PhononicError, PhononicResult};
use crate::types::{TrackedEig, MAX_BISECTION_ITER};

/// How a gap boundary was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryFlag {
    /// The tracked eigenvalue crosses zero inside the interval.
    Crossing,
    /// The search ran into the upper end: eigenvalue stays negative.
    Negative,
    /// The search ran into the lower end: eigenvalue stays positive.
    Positive,
}

impl BoundaryFlag {
    /// Numeric code: 0 crossing, 1 negative, 2 positive.
    pub fn code(self) -> u8 {
        match self {
            BoundaryFlag::Crossing => 0,
            BoundaryFlag::Negative => 1,
            BoundaryFlag::Positive => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BoundaryFlag::Crossing),
            1 => Some(BoundaryFlag::Negative),
            2 => Some(BoundaryFlag::Positive),
            _ => None,
        }
    }
}

/// One end of a (sub-)gap: flag, frequency and tracked eigenvalue there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapBoundary {
    pub flag: BoundaryFlag,
    pub freq: f64,
    pub eig: f64,
}

impl GapBoundary {
    pub fn new(flag: BoundaryFlag, freq: f64, eig: f64) -> Self {
        Self { flag, freq, eig }
    }
}

/// For `f ∈ ]f0, f1[` find where the smallest or largest eigenvalue returned
/// by `eigenvalues` vanishes.
///
/// | tracked  | flag     | meaning                                         |
/// |----------|----------|-------------------------------------------------|
/// | both     | Crossing | eigenvalue -> 0 inside the interval             |
/// | smallest | Negative | f -> f1, smallest eigenvalue < 0                |
/// | smallest | Positive | f -> f0, smallest eigenvalue > 0                |
/// | largest  | Negative | f -> f1, largest eigenvalue < 0                 |
/// | largest  | Positive | f -> f0, largest eigenvalue > 0                 |
///
/// With a positive `feps` the search always ends; `feps = 0` at `f0 = 0`
/// can bisect forever, which the iteration cap turns into
/// [`PhononicError::BisectionLimit`].
pub fn find_zero<F>(
    f0: f64,
    f1: f64,
    eigenvalues: F,
    feps: f64,
    zeps: f64,
    tracked: TrackedEig,
) -> PhononicResult<GapBoundary>
where
    F: FnMut(f64) -> PhononicResult<Vec<f64>>,
{
    find_zero_capped(f0, f1, eigenvalues, feps, zeps, tracked, MAX_BISECTION_ITER)
}

/// [`find_zero`] with an explicit iteration cap.
pub fn find_zero_capped<F>(
    f0: f64,
    f1: f64,
    mut eigenvalues: F,
    feps: f64,
    zeps: f64,
    tracked: TrackedEig,
    max_iter: usize,
) -> PhononicResult<GapBoundary>
where
    F: FnMut(f64) -> PhononicResult<Vec<f64>>,
{
    let (mut fm, mut fp) = (f0, f1);

    for _ in 0..max_iter {
        let f = 0.5 * (fm + fp);
        let meigs = eigenvalues(f)?;
        let val = tracked.pick(&meigs).ok_or_else(|| {
            PhononicError::Dimension(format!("no eigenvalues returned at frequency {f:e}"))
        })?;

        if val.abs() < zeps || (fp - fm) < fm.abs() * f64::EPSILON {
            return Ok(GapBoundary::new(BoundaryFlag::Crossing, f, val));
        }

        let near_start = (f - f0) < feps;
        let near_end = (f1 - f) < feps;
        match tracked {
            TrackedEig::Smallest => {
                if near_start {
                    return Ok(GapBoundary::new(BoundaryFlag::Positive, f0, val));
                } else if near_end {
                    return Ok(GapBoundary::new(BoundaryFlag::Negative, f1, val));
                }
            }
            TrackedEig::Largest => {
                if near_end {
                    return Ok(GapBoundary::new(BoundaryFlag::Negative, f1, val));
                } else if near_start {
                    return Ok(GapBoundary::new(BoundaryFlag::Positive, f0, val));
                }
            }
        }

        if val > 0.0 {
            fp = f;
        } else {
            fm = f;
        }
    }

    Err(PhononicError::BisectionLimit {
        f0,
        f1,
        iterations: max_iter,
    })
}
