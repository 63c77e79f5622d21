//! Phononic band-gap detection for periodic composites.
//!
//! Starting from the unit-cell eigenproblem `K φ = λ M φ`, the crate
//! projects eigenvectors to eigenmomenta, assembles the frequency-dependent
//! acoustic mass tensor of the homogenized medium, traces its spectrum
//! between consecutive resonances and classifies every interval into
//! propagation zones and weak/strong band gaps.
//!
//! Pipeline:
//!
//! 1. [`evp::solve_unit_cell`] → [`EigenSolution`]
//! 2. [`Eigenmomenta::compute`] with an [`EvaluationContext`]
//! 3. [`DensityVolumeInfo::compute`]
//! 4. [`AcousticMassTensor::new`] (or the liquid / applied-load variants)
//! 5. [`band_gaps`] → [`BandGapsResult`]
//!
//! Interval detection runs on the Rayon pool when the `parallel` feature is
//! enabled (the default).

pub mod band_gaps;
pub mod callbacks;
pub mod christoffel;
pub mod classify;
pub mod config;
pub mod density;
pub mod detect;
pub mod eigenmomenta;
pub mod error;
pub mod evp;
pub mod mass;
pub mod root;
pub mod types;

pub use band_gaps::{band_gaps, cut_freq_range, fix_eig_range, BandGapsResult, FrequencyInfo};
pub use callbacks::{CallbackKind, CallbackMode, EigenCallback, TensorEigs};
pub use christoffel::{compute_cat, compute_polarization_angles, ChristoffelMode, MaterialCoefs};
pub use classify::{describe_gaps, gap_zones, GapKind, GapKinds, GapZone, ZoneKind};
pub use config::{BandGapOptions, EigenmomentaOptions, EvpOptions, MaterialsConfig};
pub use density::{DensitySource, DensityVolumeInfo};
pub use detect::{detect_band_gaps, split_chunks, Detection, GapResult, IntervalLog};
pub use eigenmomenta::{
    compute_eigenmomenta, Eigenmomenta, EigenvectorTransform, EvaluationContext, LinearFunctionalContext,
};
pub use error::{PhononicError, PhononicResult};
pub use evp::{EigenSolution, UnitCellEigensolver};
pub use mass::{AcousticMassTensor, AppliedLoadTensor, FrequencyTensor, Medium};
pub use root::{find_zero, BoundaryFlag, GapBoundary};
pub use types::{EigensolverKind, GapMode, TrackedEig};
