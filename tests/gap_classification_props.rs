use nalgebra::DMatrix;
use phonon_bandgaps::{
    describe_gaps, detect_band_gaps, AcousticMassTensor, BandGapOptions, BoundaryFlag, GapBoundary, GapKind,
    GapKinds, GapMode, GapResult, Medium,
};
use proptest::prelude::*;

const MAX_MODES: usize = 3;
const MAX_COMPONENTS: usize = 3;

/// Strictly increasing eigenvalues with well separated resonances.
fn eigenvalues() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.5f64..5.0, 1..=MAX_MODES).prop_map(|steps| {
        let mut acc = 0.0;
        steps
            .into_iter()
            .map(|s| {
                acc += s;
                acc
            })
            .collect()
    })
}

fn margins(eigs: &[f64]) -> Vec<f64> {
    let freqs: Vec<f64> = eigs.iter().map(|e| e.sqrt()).collect();
    let mut out = vec![0.5 * freqs[0]];
    out.extend_from_slice(&freqs);
    out.push(freqs[freqs.len() - 1] + 1.0);
    out
}

fn boundary(flag: BoundaryFlag) -> GapBoundary {
    GapBoundary::new(flag, 1.0, 0.0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn detected_flag_pairs_are_always_classified(
        eigs in eigenvalues(),
        n_components in 1usize..=MAX_COMPONENTS,
        momenta in prop::collection::vec(-2.0f64..2.0, MAX_MODES * MAX_COMPONENTS),
        density in 0.5f64..3.0,
        volume in 0.5f64..2.0,
    ) {
        let n_modes = eigs.len();
        let ema = DMatrix::from_row_slice(n_modes, n_components, &momenta[..n_modes * n_components]);
        let mass = AcousticMassTensor::from_parts(eigs.clone(), ema, density, volume, Medium::Elastic).unwrap();
        let freqs = margins(&eigs);

        let det = detect_band_gaps(&mass, &freqs, &BandGapOptions::default(), None);
        prop_assert!(det.is_ok(), "{:?}", det.as_ref().err());
        let det = det.unwrap();
        prop_assert_eq!(det.gaps.len(), freqs.len() - 1);
        prop_assert_eq!(det.kinds.len(), det.gaps.len());

        for log in &det.logs {
            prop_assert!(log.freqs.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(log.freqs.len(), log.eigs.len());
        }
        for gap in &det.gaps {
            prop_assert!(matches!(gap, GapResult::Single(..)));
        }
    }

    #[test]
    fn liquid_detection_is_always_classified(
        eigs in eigenvalues(),
        momenta in prop::collection::vec(-2.0f64..2.0, MAX_MODES),
        eta in 0.0f64..0.2,
    ) {
        let n_modes = eigs.len();
        let ema = DMatrix::from_row_slice(n_modes, 1, &momenta[..n_modes]);
        let medium = Medium::Liquid { gamma: 1.0, eta };
        let mass = AcousticMassTensor::from_parts(eigs.clone(), ema, 1.0, 1.0, medium).unwrap();
        let opts = BandGapOptions { gap_mode: GapMode::Liquid, ..Default::default() };

        let det = detect_band_gaps(&mass, &margins(&eigs), &opts, None);
        prop_assert!(det.is_ok(), "{:?}", det.as_ref().err());
    }
}

/// Every pair the normal-mode detector emits has a kind, and each kind comes
/// from exactly one pair.
#[test]
fn producible_pairs_cover_the_table() {
    use phonon_bandgaps::BoundaryFlag::{Crossing, Negative, Positive};

    let producible = [
        (Positive, Positive),
        (Negative, Negative),
        (Negative, Positive),
        (Crossing, Positive),
        (Negative, Crossing),
        (Crossing, Crossing),
    ];
    let gaps: Vec<GapResult> = producible
        .iter()
        .map(|&(gmin, gmax)| GapResult::Single(boundary(gmin), boundary(gmax)))
        .collect();
    let kinds = describe_gaps(&gaps).unwrap();

    let mut codes: Vec<&str> = kinds
        .iter()
        .map(|k| match k {
            GapKinds::Single(kind) => kind.code(),
            GapKinds::Multiple(_) => "",
        })
        .collect();
    codes.sort_unstable();
    assert_eq!(codes, vec!["p", "s", "sw", "swp", "w", "wp"]);
    assert_eq!(GapKind::FullWeak.description(), "full weak band gap");
}
