//! Band-gap driver: resonance range preparation, detection and
//! classification in one call.

use log::{debug, info, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::classify::{gap_zones, GapKinds, GapZone};
use crate::config::BandGapOptions;
use crate::detect::{detect_band_gaps, GapResult, IntervalLog};
use crate::eigenmomenta::Eigenmomenta;
use crate::error::{PhononicError, PhononicResult};
use crate::evp::EigenSolution;
use crate::mass::FrequencyTensor;

/// Frequency ranges derived from the resonances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyInfo {
    /// Resonance frequencies of the scanned eigenvalue range.
    pub freq_range_initial: Vec<f64>,
    /// The same with masked resonances removed.
    pub freq_range: Vec<f64>,
    /// `freq_range` with the outer margins prepended/appended and repeated
    /// values merged; consecutive entries delimit the scanned intervals.
    pub freq_range_margins: Vec<f64>,
}

/// Resolve the requested eigenvalue slice `[start, end)` for `n_eigs`
/// eigenvalues. A negative end counts from the back (`end += n_eigs + 1`).
pub fn fix_eig_range(eig_range: Option<(i64, i64)>, n_eigs: usize) -> PhononicResult<(usize, usize)> {
    let (start, mut end) = eig_range.unwrap_or((0, n_eigs as i64));
    if end < 0 {
        end += n_eigs as i64 + 1;
    }
    if start < 0 || start >= end || end > n_eigs as i64 {
        return Err(PhononicError::DegenerateEigRange { start, end, n_eigs });
    }
    Ok((start as usize, end as usize))
}

/// Eigenvalues strictly inside `(min_freq², max_freq²)`: their frequencies and
/// the matching index slice.
pub fn select_fixed_range(eigs: &[f64], fixed: (f64, f64)) -> PhononicResult<(Vec<f64>, (usize, usize))> {
    let (mine, maxe) = fixed;
    let (lo, hi) = (mine * mine, maxe * maxe);
    let ii: Vec<usize> = (0..eigs.len()).filter(|&i| eigs[i] > lo && eigs[i] < hi).collect();
    match (ii.first(), ii.last()) {
        (Some(&first), Some(&last)) => {
            let freqs = ii.iter().map(|&i| eigs[i].sqrt()).collect();
            Ok((freqs, (first, last + 1)))
        }
        _ => Err(PhononicError::DegenerateEigRange {
            start: 0,
            end: 0,
            n_eigs: eigs.len(),
        }),
    }
}

/// Cut off masked resonances; the margins are kept as if nothing was cut.
///
/// Without a fixed range the margins extend the resonance range by
/// `freq_margins` (fractions of its width), clipped so that they never reach
/// the neighbouring resonances outside `eig_range` and stay above `feps`.
pub fn cut_freq_range(
    freq_range_initial: &[f64],
    eigs: &[f64],
    valid: &[bool],
    freq_margins: (f64, f64),
    eig_range: (usize, usize),
    fixed_eig_range: Option<(f64, f64)>,
    feps: f64,
) -> PhononicResult<FrequencyInfo> {
    let n_eigs = eigs.len();
    let (start, end) = eig_range;
    if valid.len() != n_eigs || end > n_eigs || freq_range_initial.len() != end - start {
        return Err(PhononicError::Dimension(format!(
            "{} frequencies for eigenvalue range [{start}, {end}) of {n_eigs} eigenvalues ({} flags)",
            freq_range_initial.len(),
            valid.len()
        )));
    }
    let valid_slice = &valid[start..end];

    let masked: Vec<usize> = (0..valid_slice.len()).filter(|&i| !valid_slice[i]).collect();
    info!("[band_gaps] masked resonance frequencies in range: {masked:?}");

    let (prev_eig, next_eig) = match fixed_eig_range {
        Some(fixed) => fixed,
        None => {
            let min_freq = freq_range_initial[0];
            let max_freq = freq_range_initial[freq_range_initial.len() - 1];
            let width = max_freq - min_freq;
            let mut prev_eig = min_freq - freq_margins.0 * width;
            let mut next_eig = max_freq + freq_margins.1 * width;

            if start > 0 {
                prev_eig = prev_eig.max(eigs[start - 1].sqrt() + feps);
            }
            if end < n_eigs {
                next_eig = next_eig.min(eigs[end].sqrt() - feps);
            }

            let prev_eig = prev_eig.max(feps);
            let next_eig = next_eig.max(feps).max(prev_eig + feps);
            (prev_eig, next_eig)
        }
    };

    let freq_range: Vec<f64> = freq_range_initial
        .iter()
        .zip(valid_slice)
        .filter(|(_, ok)| **ok)
        .map(|(f, _)| *f)
        .collect();

    let mut freq_range_margins = Vec::with_capacity(freq_range.len() + 2);
    freq_range_margins.push(prev_eig);
    freq_range_margins.extend_from_slice(&freq_range);
    freq_range_margins.push(next_eig);
    // Repeated resonances (or a margin on a resonance) would give empty
    // intervals.
    let n_ends = freq_range_margins.len();
    freq_range_margins.dedup();
    if freq_range_margins.len() < n_ends {
        debug!(
            "[band_gaps] merged {} repeated interval end points",
            n_ends - freq_range_margins.len()
        );
    }

    Ok(FrequencyInfo {
        freq_range_initial: freq_range_initial.to_vec(),
        freq_range,
        freq_range_margins,
    })
}

/// Everything [`band_gaps`] found, with the inputs needed to interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandGapsResult {
    pub logs: Vec<IntervalLog>,
    pub gaps: Vec<GapResult>,
    pub kinds: Vec<GapKinds>,
    pub zones: Vec<GapZone>,
    pub valid: Vec<bool>,
    /// Scanned eigenvalue slice `[start, end)`.
    pub eig_range: (usize, usize),
    pub n_eigs: usize,
    pub n_zeroed: usize,
    #[serde(flatten)]
    pub freq_info: FrequencyInfo,
    pub opts: BandGapOptions,
}

impl BandGapsResult {
    pub fn to_json(&self) -> PhononicResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PhononicError::Config(format!("JSON serialization error: {e}")))
    }
}

/// Detect and classify the band gaps of `tensor` between the valid
/// resonances of `evp`.
///
/// `ema` supplies the validity mask the tensor was built with; `mtx_b`
/// switches to the dispersion form of the tensor eigenproblem.
pub fn band_gaps(
    evp: &EigenSolution,
    ema: &Eigenmomenta,
    tensor: &dyn FrequencyTensor,
    opts: &BandGapOptions,
    mtx_b: Option<&DMatrix<f64>>,
) -> PhononicResult<BandGapsResult> {
    opts.validate()?;
    let eigs = &evp.eigs;
    let n_eigs = eigs.len();
    if ema.n_eigs() != n_eigs {
        return Err(PhononicError::Dimension(format!(
            "{n_eigs} eigenvalues but {} eigenmomenta",
            ema.n_eigs()
        )));
    }

    let mut eig_range = fix_eig_range(opts.eig_range, n_eigs)?;
    let freq_range_initial = match opts.fixed_eig_range {
        Some(fixed) => {
            let (freqs, range) = select_fixed_range(eigs, fixed)?;
            eig_range = range;
            freqs
        }
        None => eigs[eig_range.0..eig_range.1].iter().map(|e| e.sqrt()).collect(),
    };
    info!(
        "[band_gaps] initial freq. range     : [{:8.3}, {:8.3}]",
        freq_range_initial[0],
        freq_range_initial[freq_range_initial.len() - 1]
    );

    let freq_info = cut_freq_range(
        &freq_range_initial,
        eigs,
        &ema.valid,
        opts.margin_fractions(),
        eig_range,
        opts.fixed_eig_range,
        opts.feps,
    )?;
    match (freq_info.freq_range.first(), freq_info.freq_range.last()) {
        (Some(lo), Some(hi)) => info!("[band_gaps] freq. range             : [{lo:8.3}, {hi:8.3}]"),
        _ => warn!("[band_gaps] freq. range             : all masked!"),
    }

    let detection = detect_band_gaps(tensor, &freq_info.freq_range_margins, opts, mtx_b)?;
    let zones = gap_zones(&freq_info.freq_range_margins, &detection.gaps, &detection.kinds)?;

    Ok(BandGapsResult {
        logs: detection.logs,
        gaps: detection.gaps,
        kinds: detection.kinds,
        zones,
        valid: ema.valid.clone(),
        eig_range,
        n_eigs,
        n_zeroed: ema.n_zeroed,
        freq_info,
        opts: opts.clone(),
    })
}
