//! Band-gap detection over the resonance intervals.
//!
//! Each interval `]f0, f1[` between consecutive valid resonances is sampled,
//! the extremal eigenvalues of the tensor are traced, and the interval ends
//! are classified from the trace, refined by bisection where an eigenvalue
//! changes sign.
//!
//! ## Parallelization
//!
//! Intervals are independent. With the `parallel` feature they are
//! processed on the Rayon pool and merged back in interval order.

use std::f64::consts::PI;

use log::{debug, info};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::callbacks::{CallbackKind, EigenCallback, TensorEigs};
use crate::classify::{describe_gaps, GapKinds};
use crate::config::BandGapOptions;
use crate::error::{PhononicError, PhononicResult};
use crate::mass::FrequencyTensor;
use crate::root::{find_zero, BoundaryFlag, GapBoundary};
use crate::types::{
    GapMode, TrackedEig, MAX_INTERVAL_SAMPLES, MIN_INTERVAL_SAMPLES, NARROW_INTERVAL_OFFSET,
};

/// Boundaries of one interval: a single `(gmin, gmax)` pair, or the list of
/// sub-gaps found in liquid mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GapResult {
    Single(GapBoundary, GapBoundary),
    Multiple(Vec<(GapBoundary, GapBoundary)>),
}

/// Sampled trace of one interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalLog {
    pub freqs: Vec<f64>,
    /// Ascending tensor eigenvalues at each frequency.
    pub eigs: Vec<Vec<f64>>,
    /// Eigenvectors at each frequency (full trace only).
    pub eig_vectors: Option<Vec<DMatrix<f64>>>,
}

impl IntervalLog {
    fn push(&mut self, freq: f64, data: TensorEigs) {
        self.insert(self.freqs.len(), freq, data);
    }

    fn insert(&mut self, at: usize, freq: f64, data: TensorEigs) {
        self.freqs.insert(at, freq);
        self.eigs.insert(at, data.values);
        if let Some(vecs) = data.vectors {
            self.eig_vectors.get_or_insert_with(Vec::new).insert(at, vecs);
        }
    }

    /// Insert a sample keeping the frequencies sorted.
    fn insert_sorted(&mut self, freq: f64, data: TensorEigs) {
        let at = self.freqs.partition_point(|&f| f < freq);
        self.insert(at, freq, data);
    }
}

/// Output of [`detect_band_gaps`], one entry per interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub logs: Vec<IntervalLog>,
    pub gaps: Vec<GapResult>,
    pub kinds: Vec<GapKinds>,
}

/// Frequencies logged inside `]f0, f1[`.
///
/// Wide intervals get `clamp((f1 - f0) / df, 100, 1000)` samples on a
/// sine-warped grid that clusters towards both ends, where the tensor
/// eigenvalues vary fastest; the ends themselves are kept `feps` away.
/// Narrow intervals are probed at two points straddling the midpoint.
pub fn sample_frequencies(f0: f64, f1: f64, df: f64, feps: f64) -> Vec<f64> {
    let f_delta = f1 - f0;
    if f_delta > 2.0 * feps {
        let num = (f_delta / df).clamp(MIN_INTERVAL_SAMPLES as f64, MAX_INTERVAL_SAMPLES as f64) as usize;
        let width = f_delta - 2.0 * feps;
        (0..num)
            .map(|i| {
                let a = i as f64 / (num - 1) as f64;
                f0 + feps + 0.5 * (((a - 0.5) * PI).sin() + 1.0) * width
            })
            .collect()
    } else {
        let f_mid = 0.5 * (f0 + f1);
        vec![
            f_mid - NARROW_INTERVAL_OFFSET * f_delta,
            f_mid + NARROW_INTERVAL_OFFSET * f_delta,
        ]
    }
}

/// Split an ascending index list into runs of consecutive numbers.
pub fn split_chunks(indx: &[usize]) -> Vec<Vec<usize>> {
    let mut chunks: Vec<Vec<usize>> = Vec::new();
    for &i in indx {
        match chunks.last_mut() {
            Some(chunk) if chunk.last().map_or(false, |&last| last + 1 == i) => chunk.push(i),
            _ => chunks.push(vec![i]),
        }
    }
    chunks
}

fn first_last(log: &IntervalLog) -> PhononicResult<(&[f64], &[f64])> {
    match (log.eigs.first(), log.eigs.last()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Ok((a.as_slice(), b.as_slice())),
        _ => Err(PhononicError::Dimension("empty eigenvalue trace".to_string())),
    }
}

fn smallest(eigs: &[f64]) -> f64 {
    eigs[0]
}

fn largest(eigs: &[f64]) -> f64 {
    eigs[eigs.len() - 1]
}

fn detect_normal(
    log: &mut IntervalLog,
    trace: &EigenCallback<'_>,
    fz: &EigenCallback<'_>,
    opts: &BandGapOptions,
) -> PhononicResult<GapResult> {
    let lf0 = log.freqs[0];
    let lf1 = log.freqs[log.freqs.len() - 1];
    let (log0, log1) = first_last(log)?;

    if smallest(log0) > 0.0 {
        // No gap.
        return Ok(GapResult::Single(
            GapBoundary::new(BoundaryFlag::Positive, lf0, smallest(log0)),
            GapBoundary::new(BoundaryFlag::Positive, lf0, largest(log0)),
        ));
    }
    if largest(log1) < 0.0 {
        // Strong gap over the whole interval.
        return Ok(GapResult::Single(
            GapBoundary::new(BoundaryFlag::Negative, lf1, smallest(log1)),
            GapBoundary::new(BoundaryFlag::Negative, lf1, largest(log1)),
        ));
    }

    debug!("[band_gaps] finding zero of the largest eig...");
    let gmax = find_zero(lf0, lf1, |f| fz.eigenvalues(f), opts.feps, opts.zeps, TrackedEig::Largest)?;
    log.insert_sorted(gmax.freq, trace.call(gmax.freq)?);

    let gmin = match gmax.flag {
        BoundaryFlag::Crossing | BoundaryFlag::Positive => {
            debug!("[band_gaps] finding zero of the smallest eig...");
            let gmin = find_zero(lf0, lf1, |f| fz.eigenvalues(f), opts.feps, opts.zeps, TrackedEig::Smallest)?;
            log.insert_sorted(gmin.freq, trace.call(gmin.freq)?);
            gmin
        }
        // Both extremal eigenvalues are negative up to f1.
        BoundaryFlag::Negative => GapBoundary::new(BoundaryFlag::Negative, gmax.freq, gmax.eig),
    };

    Ok(GapResult::Single(gmin, gmax))
}

fn detect_liquid(log: &IntervalLog) -> PhononicResult<GapResult> {
    let (log0, log1) = first_last(log)?;
    let lf0 = log.freqs[0];
    let lf1 = log.freqs[log.freqs.len() - 1];

    let mut si = Vec::new();
    let mut li = Vec::new();
    for (i, eigs) in log.eigs.iter().enumerate() {
        if eigs.is_empty() {
            return Err(PhononicError::Dimension(format!("no eigenvalues at sample {i}")));
        }
        if smallest(eigs) < 0.0 {
            si.push(i);
        }
        if largest(eigs) < 0.0 {
            li.push(i);
        }
    }

    if si.is_empty() {
        return Ok(GapResult::Single(
            GapBoundary::new(BoundaryFlag::Positive, lf0, smallest(log0)),
            GapBoundary::new(BoundaryFlag::Positive, lf0, largest(log0)),
        ));
    }
    if li.len() == log.eigs.len() {
        return Ok(GapResult::Single(
            GapBoundary::new(BoundaryFlag::Negative, lf1, smallest(log1)),
            GapBoundary::new(BoundaryFlag::Negative, lf1, largest(log1)),
        ));
    }

    let wi: Vec<usize> = si.iter().copied().filter(|i| li.binary_search(i).is_err()).collect();
    let at = |i: usize, flag| GapBoundary::new(flag, log.freqs[i], largest(&log.eigs[i]));

    let mut subgaps = Vec::new();
    for chunk in split_chunks(&li) {
        let (i0, i1) = (chunk[0], chunk[chunk.len() - 1]);
        subgaps.push((at(i0, BoundaryFlag::Negative), at(i1, BoundaryFlag::Negative)));
    }
    for chunk in split_chunks(&wi) {
        let (i0, i1) = (chunk[0], chunk[chunk.len() - 1]);
        subgaps.push((at(i0, BoundaryFlag::Crossing), at(i1, BoundaryFlag::Positive)));
    }
    Ok(GapResult::Multiple(subgaps))
}

/// Trace one interval and determine its gap boundaries.
pub fn detect_interval(
    trace: &EigenCallback<'_>,
    fz: &EigenCallback<'_>,
    f0: f64,
    f1: f64,
    df: f64,
    opts: &BandGapOptions,
) -> PhononicResult<(IntervalLog, GapResult)> {
    info!("[band_gaps] interval: ]{f0:.8}, {f1:.8}[...");
    let log_freqs = sample_frequencies(f0, f1, df, opts.feps);
    debug!("[band_gaps] n_logged: {}", log_freqs.len());

    let mut log = IntervalLog::default();
    for f in log_freqs {
        log.push(f, trace.call(f)?);
    }

    let gap = match opts.gap_mode {
        GapMode::Normal => detect_normal(&mut log, trace, fz, opts)?,
        GapMode::Liquid => detect_liquid(&log)?,
    };
    debug!("[band_gaps] ]{f0:.8}, {f1:.8}[ -> {gap:?}");

    Ok((log, gap))
}

/// Sequential interval processing.
#[cfg(not(feature = "parallel"))]
fn detect_intervals_batch(
    trace: &EigenCallback<'_>,
    fz: &EigenCallback<'_>,
    freq_range_margins: &[f64],
    df: f64,
    opts: &BandGapOptions,
) -> PhononicResult<Vec<(IntervalLog, GapResult)>> {
    freq_range_margins
        .windows(2)
        .map(|w| detect_interval(trace, fz, w[0], w[1], df, opts))
        .collect()
}

/// Parallel interval processing; results keep the interval order.
#[cfg(feature = "parallel")]
fn detect_intervals_batch(
    trace: &EigenCallback<'_>,
    fz: &EigenCallback<'_>,
    freq_range_margins: &[f64],
    df: f64,
    opts: &BandGapOptions,
) -> PhononicResult<Vec<(IntervalLog, GapResult)>> {
    freq_range_margins
        .par_windows(2)
        .map(|w| detect_interval(trace, fz, w[0], w[1], df, opts))
        .collect()
}

/// Detect band gaps in every interval delimited by `freq_range_margins`
/// (valid resonance frequencies with the outer margins prepended/appended).
///
/// With `mtx_b` the dispersion problem `ω² M(ω) w = η B w` is traced instead
/// of `M(ω) w = λ w`, and the logs carry its eigenvectors.
pub fn detect_band_gaps(
    tensor: &dyn FrequencyTensor,
    freq_range_margins: &[f64],
    opts: &BandGapOptions,
    mtx_b: Option<&DMatrix<f64>>,
) -> PhononicResult<Detection> {
    opts.validate()?;
    if tensor.n_components() == 0 {
        return Err(PhononicError::Dimension("tensor has no components".to_string()));
    }
    if freq_range_margins.len() < 2 {
        return Err(PhononicError::Config(format!(
            "need at least two interval end points, got {}",
            freq_range_margins.len()
        )));
    }
    if let Some(w) = freq_range_margins.windows(2).find(|w| !(w[0] < w[1])) {
        return Err(PhononicError::Config(format!(
            "interval end points must increase, got {} then {}",
            w[0], w[1]
        )));
    }

    info!("[band_gaps] eigensolver: {}", opts.eigensolver.name());
    let min_freq = freq_range_margins[0];
    let max_freq = freq_range_margins[freq_range_margins.len() - 1];
    info!("[band_gaps] freq. range with margins: [{min_freq:8.3}, {max_freq:8.3}]");

    let df = opts.step_fraction() * (max_freq - min_freq);
    let fz = EigenCallback::new(tensor, mtx_b, CallbackKind::FindZero)?;
    let trace = EigenCallback::new(tensor, mtx_b, CallbackKind::Trace)?;

    let (logs, gaps): (Vec<IntervalLog>, Vec<GapResult>) =
        detect_intervals_batch(&trace, &fz, freq_range_margins, df, opts)?
            .into_iter()
            .unzip();
    let kinds = describe_gaps(&gaps)?;

    Ok(Detection { logs, gaps, kinds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::GapKind;
    use crate::mass::{AcousticMassTensor, Medium};

    fn one_mode(momentum: f64, medium: Medium) -> AcousticMassTensor {
        AcousticMassTensor::from_parts(
            vec![4.0],
            DMatrix::from_row_slice(1, 1, &[momentum]),
            1.0,
            1.0,
            medium,
        )
        .unwrap()
    }

    #[test]
    fn chunks_split_on_gaps() {
        assert_eq!(split_chunks(&[]), Vec::<Vec<usize>>::new());
        assert_eq!(split_chunks(&[3]), vec![vec![3]]);
        assert_eq!(
            split_chunks(&[0, 1, 2, 5, 6, 9]),
            vec![vec![0, 1, 2], vec![5, 6], vec![9]]
        );
    }

    #[test]
    fn wide_interval_sampling() {
        let freqs = sample_frequencies(1.0, 2.0, 0.05, 1e-6);
        assert_eq!(freqs.len(), MIN_INTERVAL_SAMPLES);
        assert!((freqs[0] - (1.0 + 1e-6)).abs() < 1e-12);
        assert!((freqs[freqs.len() - 1] - (2.0 - 1e-6)).abs() < 1e-12);
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
        // Clustered towards the ends.
        let first_step = freqs[1] - freqs[0];
        let mid_step = freqs[50] - freqs[49];
        assert!(first_step < mid_step);

        let dense = sample_frequencies(0.0, 100.0, 1e-3, 1e-8);
        assert_eq!(dense.len(), MAX_INTERVAL_SAMPLES);
    }

    #[test]
    fn narrow_interval_sampling() {
        let freqs = sample_frequencies(0.0, 1e-9, 0.1, 1e-8);
        assert_eq!(freqs.len(), 2);
        assert!(freqs[0] < freqs[1]);
        assert!(freqs[0] > 0.0 && freqs[1] < 1e-9);
    }

    #[test]
    fn single_mode_crossing_is_located() {
        // M(f) = 1 - 0.01 f²/(f² - 4): zero at f = 2/sqrt(0.99).
        let mass = one_mode(0.1, Medium::Elastic);
        let opts = BandGapOptions::default();
        let det = detect_band_gaps(&mass, &[0.5, 2.0, 5.0], &opts, None).unwrap();

        assert_eq!(det.kinds[0], GapKinds::Single(GapKind::Propagation));
        assert_eq!(det.kinds[1], GapKinds::Single(GapKind::StrongWeakPropagation));

        let expected = 2.0 / 0.99_f64.sqrt();
        match &det.gaps[1] {
            GapResult::Single(gmin, gmax) => {
                assert!((gmin.freq - expected).abs() < 1e-6);
                assert!((gmax.freq - expected).abs() < 1e-6);
            }
            other => panic!("unexpected gap {other:?}"),
        }

        // Both roots were inserted into the sorted log.
        let log = &det.logs[1];
        assert_eq!(log.freqs.len(), log.eigs.len());
        assert!(log.freqs.windows(2).all(|w| w[0] <= w[1]));
        assert!(log.freqs.iter().any(|f| (f - expected).abs() < 1e-6));
        assert!(log.eig_vectors.is_none());
    }

    #[test]
    fn liquid_mode_reports_subgaps() {
        // Damped single mode: strongly negative just above resonance only.
        let mass = one_mode(0.5, Medium::Liquid { gamma: 1.0, eta: 0.01 });
        let opts = BandGapOptions {
            gap_mode: GapMode::Liquid,
            ..Default::default()
        };
        let det = detect_band_gaps(&mass, &[1.0, 3.0], &opts, None).unwrap();
        match &det.kinds[0] {
            GapKinds::Multiple(kinds) => assert_eq!(kinds, &vec![GapKind::InnerStrong]),
            other => panic!("unexpected kinds {other:?}"),
        }
        match &det.gaps[0] {
            GapResult::Multiple(sub) => {
                let (g0, g1) = sub[0];
                assert!(g0.freq > 2.0 && g1.freq > g0.freq);
            }
            other => panic!("unexpected gap {other:?}"),
        }
    }

    #[test]
    fn liquid_mode_splits_strong_and_weak_chunks() {
        // Decoupled polarizations: component 0 resonates at f = 2, component
        // 1 at f = 3. Above f = 2 component 0 stays negative, so component 1
        // decides between weak and strong.
        let mass = AcousticMassTensor::from_parts(
            vec![4.0, 9.0],
            DMatrix::from_row_slice(2, 2, &[1.2, 0.0, 0.0, 1.2]),
            1.0,
            1.0,
            Medium::Liquid { gamma: 1.0, eta: 0.05 },
        )
        .unwrap();
        let opts = BandGapOptions {
            gap_mode: GapMode::Liquid,
            ..Default::default()
        };
        let det = detect_band_gaps(&mass, &[2.5, 3.0, 4.5], &opts, None).unwrap();

        assert_eq!(
            det.kinds,
            vec![
                GapKinds::Multiple(vec![GapKind::InnerWeak]),
                GapKinds::Multiple(vec![GapKind::InnerStrong, GapKind::InnerWeak]),
            ]
        );
        assert!(det.logs.iter().all(|log| log.eigs.iter().all(|e| e.len() == 2)));

        // Below f = 3 the whole interval is one weak chunk.
        let freqs = &det.logs[0].freqs;
        match &det.gaps[0] {
            GapResult::Multiple(sub) => {
                assert_eq!(sub.len(), 1);
                let (gmin, gmax) = sub[0];
                assert_eq!((gmin.flag, gmin.freq), (BoundaryFlag::Crossing, freqs[0]));
                assert_eq!((gmax.flag, gmax.freq), (BoundaryFlag::Positive, freqs[freqs.len() - 1]));
            }
            other => panic!("unexpected gap {other:?}"),
        }

        // Above f = 3: a short weak chunk, then strong up to the end.
        let freqs = &det.logs[1].freqs;
        match &det.gaps[1] {
            GapResult::Multiple(sub) => {
                let ((s0, s1), (w0, w1)) = (sub[0], sub[1]);
                assert_eq!((s0.flag, s1.flag), (BoundaryFlag::Negative, BoundaryFlag::Negative));
                assert_eq!((w0.flag, w1.flag), (BoundaryFlag::Crossing, BoundaryFlag::Positive));
                assert_eq!(w0.freq, freqs[0]);
                assert!(w1.freq > 3.0 && w1.freq < s0.freq);
                assert!(s0.freq < 3.1);
                assert_eq!(s1.freq, freqs[freqs.len() - 1]);
                assert!(s1.eig < 0.0);
            }
            other => panic!("unexpected gap {other:?}"),
        }
    }

    #[test]
    fn full_mode_logs_eigenvectors() {
        let mass = one_mode(0.1, Medium::Elastic);
        let b = DMatrix::from_element(1, 1, 2.0);
        let det = detect_band_gaps(&mass, &[0.5, 1.5], &BandGapOptions::default(), Some(&b)).unwrap();
        let log = &det.logs[0];
        let vecs = log.eig_vectors.as_ref().unwrap();
        assert_eq!(vecs.len(), log.freqs.len());
        assert_eq!(det.kinds[0], GapKinds::Single(GapKind::Propagation));
    }

    #[test]
    fn non_increasing_end_points_are_rejected() {
        let mass = one_mode(0.1, Medium::Elastic);
        let err = detect_band_gaps(&mass, &[1.0, 1.0], &BandGapOptions::default(), None).unwrap_err();
        assert!(matches!(err, PhononicError::Config(_)));
    }
}
