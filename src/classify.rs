//! Naming of detected gaps.
//!
//! A boundary pair `(gmin, gmax)` is mapped to a gap kind, and a kind can be
//! unrolled into typed frequency zones of its interval.

use serde::{Deserialize, Serialize};

use crate::detect::GapResult;
use crate::error::{PhononicError, PhononicResult};
use crate::root::{BoundaryFlag, GapBoundary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GapKind {
    Propagation,
    FullWeak,
    WeakPropagation,
    FullStrong,
    StrongWeak,
    StrongWeakPropagation,
    InnerStrong,
    InnerWeak,
}

impl GapKind {
    pub fn code(&self) -> &'static str {
        match self {
            GapKind::Propagation => "p",
            GapKind::FullWeak => "w",
            GapKind::WeakPropagation => "wp",
            GapKind::FullStrong => "s",
            GapKind::StrongWeak => "sw",
            GapKind::StrongWeakPropagation => "swp",
            GapKind::InnerStrong => "is",
            GapKind::InnerWeak => "iw",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            GapKind::Propagation => "propagation zone",
            GapKind::FullWeak => "full weak band gap",
            GapKind::WeakPropagation => "weak band gap + propagation zone",
            GapKind::FullStrong => {
                "full strong band gap (due to end of freq. range or too large thresholds)"
            }
            GapKind::StrongWeak => "strong band gap + weak band gap",
            GapKind::StrongWeakPropagation => "strong band gap + weak band gap + propagation zone",
            GapKind::InnerStrong => "inner strong band gap",
            GapKind::InnerWeak => "inner weak band gap",
        }
    }

    /// Kind of a whole-interval boundary pair.
    pub fn classify(gmin: BoundaryFlag, gmax: BoundaryFlag) -> PhononicResult<Self> {
        use crate::root::BoundaryFlag::*;
        match (gmin, gmax) {
            (Positive, Positive) => Ok(GapKind::Propagation),
            (Negative, Positive) => Ok(GapKind::FullWeak),
            (Crossing, Positive) => Ok(GapKind::WeakPropagation),
            (Negative, Negative) => Ok(GapKind::FullStrong),
            (Negative, Crossing) => Ok(GapKind::StrongWeak),
            (Crossing, Crossing) => Ok(GapKind::StrongWeakPropagation),
            _ => Err(PhononicError::ImpossibleGap {
                gmin: gmin.code(),
                gmax: gmax.code(),
            }),
        }
    }

    /// Kind of a liquid-mode sub-gap.
    pub fn classify_subgap(gmin: BoundaryFlag, gmax: BoundaryFlag) -> PhononicResult<Self> {
        use crate::root::BoundaryFlag::*;
        match (gmin, gmax) {
            (Positive, Positive) => Ok(GapKind::Propagation),
            (Negative, Negative) => Ok(GapKind::InnerStrong),
            (Crossing, Positive) => Ok(GapKind::InnerWeak),
            _ => Err(PhononicError::ImpossibleGap {
                gmin: gmin.code(),
                gmax: gmax.code(),
            }),
        }
    }

    /// Split the interval `]f0, f1[` into strong/weak/propagation zones.
    pub fn zones(&self, f0: f64, f1: f64, gmin: &GapBoundary, gmax: &GapBoundary) -> Vec<GapZone> {
        let zone = |kind, lo, hi| GapZone { kind, lo, hi };
        match self {
            GapKind::Propagation => vec![zone(ZoneKind::Propagation, f0, f1)],
            GapKind::FullWeak => vec![zone(ZoneKind::Weak, f0, f1)],
            GapKind::FullStrong => vec![zone(ZoneKind::Strong, f0, f1)],
            GapKind::WeakPropagation => vec![
                zone(ZoneKind::Weak, f0, gmin.freq),
                zone(ZoneKind::Propagation, gmin.freq, f1),
            ],
            GapKind::StrongWeak => vec![
                zone(ZoneKind::Strong, f0, gmax.freq),
                zone(ZoneKind::Weak, gmax.freq, f1),
            ],
            GapKind::StrongWeakPropagation => vec![
                zone(ZoneKind::Strong, f0, gmax.freq),
                zone(ZoneKind::Weak, gmax.freq, gmin.freq),
                zone(ZoneKind::Propagation, gmin.freq, f1),
            ],
            GapKind::InnerStrong => vec![zone(ZoneKind::Strong, gmin.freq, gmax.freq)],
            GapKind::InnerWeak => vec![zone(ZoneKind::Weak, gmin.freq, gmax.freq)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneKind {
    Strong,
    Weak,
    Propagation,
}

/// A frequency range `[lo, hi]` of uniform wave behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapZone {
    pub kind: ZoneKind,
    pub lo: f64,
    pub hi: f64,
}

/// Classification of one resonance interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapKinds {
    Single(GapKind),
    Multiple(Vec<GapKind>),
}

/// Classify every detected interval; an unknown flag pair is an error.
pub fn describe_gaps(gaps: &[GapResult]) -> PhononicResult<Vec<GapKinds>> {
    gaps.iter()
        .map(|gap| match gap {
            GapResult::Single(gmin, gmax) => GapKind::classify(gmin.flag, gmax.flag).map(GapKinds::Single),
            GapResult::Multiple(subgaps) => subgaps
                .iter()
                .map(|(gmin, gmax)| GapKind::classify_subgap(gmin.flag, gmax.flag))
                .collect::<PhononicResult<Vec<_>>>()
                .map(GapKinds::Multiple),
        })
        .collect()
}

/// Zones of all intervals, in frequency order; `freq_range_margins` are the
/// interval end points the gaps were detected in.
pub fn gap_zones(
    freq_range_margins: &[f64],
    gaps: &[GapResult],
    kinds: &[GapKinds],
) -> PhononicResult<Vec<GapZone>> {
    if gaps.len() != kinds.len() || freq_range_margins.len() != gaps.len() + 1 {
        return Err(PhononicError::Dimension(format!(
            "{} frequencies, {} gaps and {} kinds do not describe the same intervals",
            freq_range_margins.len(),
            gaps.len(),
            kinds.len()
        )));
    }

    let mut zones = Vec::new();
    for (ii, (gap, kind)) in gaps.iter().zip(kinds).enumerate() {
        let (f0, f1) = (freq_range_margins[ii], freq_range_margins[ii + 1]);
        match (gap, kind) {
            (GapResult::Single(gmin, gmax), GapKinds::Single(k)) => {
                zones.extend(k.zones(f0, f1, gmin, gmax));
            }
            (GapResult::Multiple(subgaps), GapKinds::Multiple(ks)) if subgaps.len() == ks.len() => {
                let mut sub: Vec<GapZone> = subgaps
                    .iter()
                    .zip(ks)
                    .flat_map(|((gmin, gmax), k)| k.zones(f0, f1, gmin, gmax))
                    .collect();
                sub.sort_by(|a, b| a.lo.total_cmp(&b.lo));
                zones.extend(sub);
            }
            _ => {
                return Err(PhononicError::Dimension(format!(
                    "interval {ii}: gap and kind shapes differ"
                )))
            }
        }
    }
    Ok(zones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::BoundaryFlag::*;

    const FLAGS: [BoundaryFlag; 3] = [Crossing, Negative, Positive];

    fn b(flag: BoundaryFlag, freq: f64) -> GapBoundary {
        GapBoundary::new(flag, freq, 0.0)
    }

    #[test]
    fn table_codes() {
        let cases = [
            ((Positive, Positive), "p"),
            ((Negative, Positive), "w"),
            ((Crossing, Positive), "wp"),
            ((Negative, Negative), "s"),
            ((Negative, Crossing), "sw"),
            ((Crossing, Crossing), "swp"),
        ];
        for ((gmin, gmax), code) in cases {
            assert_eq!(GapKind::classify(gmin, gmax).unwrap().code(), code);
        }
    }

    #[test]
    fn remaining_pairs_are_impossible() {
        let mut n_err = 0;
        for gmin in FLAGS {
            for gmax in FLAGS {
                if let Err(err) = GapKind::classify(gmin, gmax) {
                    assert_eq!(
                        err,
                        PhononicError::ImpossibleGap {
                            gmin: gmin.code(),
                            gmax: gmax.code()
                        }
                    );
                    n_err += 1;
                }
            }
        }
        // (0,1), (2,0), (2,1)
        assert_eq!(n_err, 3);
    }

    #[test]
    fn subgap_table() {
        assert_eq!(GapKind::classify_subgap(Negative, Negative).unwrap().code(), "is");
        assert_eq!(GapKind::classify_subgap(Crossing, Positive).unwrap().code(), "iw");
        assert_eq!(GapKind::classify_subgap(Positive, Positive).unwrap().code(), "p");
        assert!(GapKind::classify_subgap(Negative, Crossing).is_err());
    }

    #[test]
    fn describe_mixed_results() {
        let gaps = vec![
            GapResult::Single(b(Positive, 1.0), b(Positive, 1.0)),
            GapResult::Multiple(vec![
                (b(Negative, 2.1), b(Negative, 2.5)),
                (b(Crossing, 2.5), b(Positive, 2.9)),
            ]),
        ];
        let kinds = describe_gaps(&gaps).unwrap();
        assert_eq!(
            kinds,
            vec![
                GapKinds::Single(GapKind::Propagation),
                GapKinds::Multiple(vec![GapKind::InnerStrong, GapKind::InnerWeak]),
            ]
        );

        let zones = gap_zones(&[1.0, 2.0, 3.0], &gaps, &kinds).unwrap();
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0], GapZone { kind: ZoneKind::Propagation, lo: 1.0, hi: 2.0 });
        assert_eq!(zones[1].kind, ZoneKind::Strong);
        assert_eq!(zones[2], GapZone { kind: ZoneKind::Weak, lo: 2.5, hi: 2.9 });
    }

    #[test]
    fn describe_rejects_impossible_pair() {
        let gaps = vec![GapResult::Single(b(Positive, 1.0), b(Crossing, 1.5))];
        assert_eq!(
            describe_gaps(&gaps).unwrap_err(),
            PhononicError::ImpossibleGap { gmin: 2, gmax: 0 }
        );
    }

    #[test]
    fn swp_zones_follow_boundaries() {
        let gmin = b(Crossing, 2.6);
        let gmax = b(Crossing, 2.3);
        let zones = GapKind::StrongWeakPropagation.zones(2.0, 3.0, &gmin, &gmax);
        let kinds: Vec<ZoneKind> = zones.iter().map(|z| z.kind).collect();
        assert_eq!(kinds, vec![ZoneKind::Strong, ZoneKind::Weak, ZoneKind::Propagation]);
        assert_eq!((zones[1].lo, zones[1].hi), (2.3, 2.6));
    }
}
