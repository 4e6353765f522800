use proptest::prelude::*;
use sweep_core::stabilize::{StabilityCfg, StabilityDetector};
use sweep_core::trajectory::Trajectory;

proptest! {
    // Trajectory lengths are exact, whatever the parameters.
    #[test]
    fn ramp_length_matches_points(
        start in -10.0f64..10.0,
        end in -10.0f64..10.0,
        points in 0usize..500,
    ) {
        prop_assert_eq!(Trajectory::ramp(start, end, points).count(), points);
    }

    #[test]
    fn ramp_stays_within_endpoints(
        start in -10.0f64..10.0,
        end in -10.0f64..10.0,
        points in 1usize..200,
    ) {
        let lo = start.min(end) - 1e-9;
        let hi = start.max(end) + 1e-9;
        for v in Trajectory::ramp(start, end, points) {
            prop_assert!(v >= lo && v <= hi, "{v} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn hysteresis_has_tiled_length_and_bounded_excursion(
        amplitude in 0.0f64..10.0,
        n in 1usize..50,
        loops in 1usize..5,
    ) {
        let traj = Trajectory::hysteresis(amplitude, n, loops);
        prop_assert_eq!(traj.len(), n + loops * 4 * n + n);
        for v in traj {
            prop_assert!(v.abs() <= amplitude + 1e-9);
        }
    }

    #[test]
    fn hysteresis_starts_and_ends_at_zero(
        amplitude in 0.1f64..10.0,
        n in 2usize..50,
        loops in 1usize..5,
    ) {
        let pts: Vec<f64> = Trajectory::hysteresis(amplitude, n, loops).collect();
        prop_assert_eq!(pts[0], 0.0);
        prop_assert_eq!(*pts.last().unwrap(), 0.0);
    }

    // The detector never fires before a full window of in-band samples.
    #[test]
    fn detector_needs_a_full_window(
        target in -100.0f64..100.0,
        window in 2usize..30,
    ) {
        let mut d = StabilityDetector::new(StabilityCfg {
            window,
            approach_band: 1.0,
            slope_limit: 1.0,
        });
        for i in 0..window - 1 {
            prop_assert!(!d.observe(target, target, target), "fired at sample {i}");
        }
        prop_assert!(d.observe(target, target, target));
    }

    // A drifting series steeper than the limit never reads as stable.
    #[test]
    fn detector_rejects_fast_drift(
        slope in 0.01f64..1.0,
        window in 3usize..20,
    ) {
        let mut d = StabilityDetector::new(StabilityCfg {
            window,
            approach_band: f64::INFINITY,
            slope_limit: slope / 2.0,
        });
        for i in 0..window * 3 {
            let y = slope * i as f64;
            prop_assert!(!d.observe(0.0, 0.0, y));
        }
    }
}
